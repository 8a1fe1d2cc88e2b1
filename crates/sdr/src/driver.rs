// Copyright 2025-2026 CEMAXECUTER LLC

use std::os::raw::{c_int, c_uchar, c_void};

/// Callback a driver invokes for every filled transfer: data, length in bytes, context.
pub type ReadAsyncCb = unsafe extern "C" fn(buf: *mut c_uchar, len: u32, ctx: *mut c_void);

/// Transfer count librtlsdr substitutes when asked for 0.
pub const DEFAULT_BUF_NUMBER: u32 = 15;

/// Transfer length librtlsdr substitutes when asked for 0 or a non-multiple of 512.
pub const DEFAULT_BUF_LENGTH: u32 = 16 * 32 * 512;

/// librtlsdr's answer to a cancel or read on a device in the wrong async state.
pub const ASYNC_BUSY: c_int = -2;

/// An SDR driver exposing a blocking, callback-driven read loop.
///
/// `read_async` runs on the calling thread until the driver stops, either on
/// its own or because `cancel_async` was called from another thread.
///
/// # Safety
///
/// [`start_async_read`](crate::bridge::start_async_read) is safe to call on
/// top of any implementation, so implementations must uphold:
///
/// * `cb` is only invoked while `read_async` is still running, never after it
///   returns, and always with the `ctx` it was given.
/// * Every invocation passes either a null `buf` or one valid for reads of
///   `len` bytes for the duration of that invocation.
pub unsafe trait AsyncDriver: Send + Sync {
    /// Opened device as the driver sees it.
    type Device: Send + Sync;

    /// Start streaming and block until stopped.
    ///
    /// # Safety
    ///
    /// `ctx` is handed back to `cb` on every transfer. It must stay valid,
    /// and be what `cb` expects, until this call returns.
    unsafe fn read_async(
        &self,
        dev: &Self::Device,
        cb: ReadAsyncCb,
        ctx: *mut c_void,
        buf_num: u32,
        buf_len: u32,
    ) -> c_int;

    /// Ask a running `read_async` on `dev` to return. Negative if nothing is running.
    fn cancel_async(&self, dev: &Self::Device) -> c_int;
}

/// Apply librtlsdr's defaulting rules to requested buffer parameters.
pub fn effective_buffers(buf_num: u32, buf_len: u32) -> (u32, u32) {
    let num = if buf_num == 0 { DEFAULT_BUF_NUMBER } else { buf_num };
    let len = if buf_len == 0 || buf_len % 512 != 0 {
        DEFAULT_BUF_LENGTH
    } else {
        buf_len
    };
    (num, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_buffers_defaults() {
        assert_eq!(effective_buffers(0, 0), (15, 262144));
        assert_eq!(effective_buffers(4, 1000), (4, DEFAULT_BUF_LENGTH));
        assert_eq!(effective_buffers(32, 16384), (32, 16384));
    }
}
