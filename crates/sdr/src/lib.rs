pub mod bridge;
pub mod driver;
pub mod error;
pub mod file;
pub mod iq;
pub mod mock;
pub mod ring;
pub mod search;
pub mod stream;
pub mod tuner;

#[cfg(feature = "rtlsdr")]
pub mod rtlsdr;

pub use bridge::{start_async_read, BufferHandler, Status};
pub use driver::AsyncDriver;
pub use error::{SdrError, SdrResult};
pub use stream::{AsyncStream, SampleBuf, StreamConfig, StreamId};
