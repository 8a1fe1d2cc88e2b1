// Copyright 2025-2026 CEMAXECUTER LLC

//! Forwarding bridge onto a driver's async read.
//!
//! The driver wants a C callback and an opaque context pointer. The bridge
//! supplies a trampoline that is fixed per handler type and points the
//! context at the caller's handler, so each call gets its own sink and no
//! process-wide state is needed to find it again.

use std::os::raw::{c_int, c_uchar, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::slice;

use crate::driver::{AsyncDriver, ReadAsyncCb};
use crate::error::{SdrError, SdrResult};

/// Receives each filled transfer. Runs on the driver's streaming thread, so it
/// must not block for long.
pub trait BufferHandler {
    fn on_buffer(&mut self, buf: &[u8]);
}

impl<F> BufferHandler for F
where
    F: FnMut(&[u8]),
{
    fn on_buffer(&mut self, buf: &[u8]) {
        self(buf)
    }
}

/// Driver status passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Status(c_int);

impl Status {
    pub fn from_code(code: c_int) -> Self {
        Status(code)
    }

    pub fn code(self) -> i32 {
        self.0
    }

    /// Non-negative: streaming ran until stopped without a driver fault.
    pub fn is_ok(self) -> bool {
        self.0 >= 0
    }

    pub fn into_result(self) -> SdrResult<i32> {
        if self.is_ok() {
            Ok(self.0)
        } else {
            Err(SdrError::Driver(self.0))
        }
    }
}

/// What the context pointer actually points at for one bridge call.
struct CallContext<'a, H> {
    handler: &'a mut H,
    poisoned: bool,
}

unsafe extern "C" fn forward_buffer<H: BufferHandler>(
    buf: *mut c_uchar,
    len: u32,
    ctx: *mut c_void,
) {
    if ctx.is_null() {
        return;
    }
    let call = &mut *(ctx as *mut CallContext<'_, H>);
    if call.poisoned {
        return;
    }

    let data: &[u8] = if buf.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(buf, len as usize)
    };

    // Unwinding into the driver's C frames is undefined; stop delivering instead
    let handler = &mut *call.handler;
    if panic::catch_unwind(AssertUnwindSafe(|| handler.on_buffer(data))).is_err() {
        log::error!("buffer handler panicked; ignoring remaining transfers");
        call.poisoned = true;
    }
}

/// The callback the bridge registers for handlers of type `H`.
pub fn callback_for<H: BufferHandler>() -> ReadAsyncCb {
    forward_buffer::<H>
}

/// Start the driver's async read on `dev` and block until it returns.
///
/// `buf_num` and `buf_len` are forwarded as given; any defaulting or rejection
/// is the driver's business. Every transfer reaches `handler` as a slice
/// borrowed from driver memory. The return value is the driver's status.
pub fn start_async_read<D, H>(
    driver: &D,
    dev: &D::Device,
    buf_num: u32,
    buf_len: u32,
    handler: &mut H,
) -> Status
where
    D: AsyncDriver + ?Sized,
    H: BufferHandler,
{
    let mut call = CallContext {
        handler,
        poisoned: false,
    };
    let ctx = &mut call as *mut CallContext<'_, H> as *mut c_void;

    // `call` outlives the driver call, which is the only place ctx is used
    let code = unsafe { driver.read_async(dev, callback_for::<H>(), ctx, buf_num, buf_len) };
    Status(code)
}
