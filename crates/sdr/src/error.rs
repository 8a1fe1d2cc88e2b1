// Copyright 2025-2026 CEMAXECUTER LLC

use std::io;

/// Result type for bridge and driver operations.
pub type SdrResult<T> = Result<T, SdrError>;

#[derive(Debug, thiserror::Error)]
pub enum SdrError {
    /// Negative status returned by the driver's async read.
    #[error("driver returned status {0}")]
    Driver(i32),

    #[error("no supported devices found")]
    NoDevices,

    #[error("no device matching '{0}'")]
    DeviceNotFound(String),

    #[error("device open failed: error code {0}")]
    OpenFailed(i32),

    #[error("{op} failed (error code {code})")]
    Operation { op: &'static str, code: i32 },

    #[error("failed to spawn streaming thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("device already has a running stream")]
    DeviceBusy,

    #[error("streaming thread panicked")]
    ThreadPanicked,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
