// Copyright 2025-2026 CEMAXECUTER LLC

//! Recording stand-in for a real driver.

use std::os::raw::{c_int, c_void};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::driver::{AsyncDriver, ReadAsyncCb, ASYNC_BUSY};

/// One observed `read_async` invocation. Pointers are kept as addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAsyncCall {
    pub device: u32,
    pub callback: usize,
    pub ctx: usize,
    pub buf_num: u32,
    pub buf_len: u32,
}

pub struct MockDevice {
    id: u32,
    running: AtomicBool,
    cancelled: AtomicBool,
}

impl MockDevice {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Scripted driver: delivers its buffers in order, then either returns the
/// configured status or, if `block_until_cancel` is set, waits for a cancel.
pub struct MockDriver {
    status: c_int,
    buffers: Vec<Vec<u8>>,
    block_until_cancel: bool,
    calls: Mutex<Vec<ReadAsyncCall>>,
    delivered: Mutex<Vec<usize>>,
    cancels: Mutex<usize>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            status: 0,
            buffers: Vec::new(),
            block_until_cancel: false,
            calls: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
            cancels: Mutex::new(0),
        }
    }

    pub fn with_status(mut self, status: c_int) -> Self {
        self.status = status;
        self
    }

    pub fn with_buffers(mut self, buffers: Vec<Vec<u8>>) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn block_until_cancel(mut self) -> Self {
        self.block_until_cancel = true;
        self
    }

    pub fn calls(&self) -> Vec<ReadAsyncCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Addresses of the driver-owned buffers handed to the callback.
    pub fn delivered_ptrs(&self) -> Vec<usize> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.lock().map(|c| *c).unwrap_or(0)
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

// Callbacks only run inside read_async, over this driver's own buffers.
unsafe impl AsyncDriver for MockDriver {
    type Device = MockDevice;

    unsafe fn read_async(
        &self,
        dev: &MockDevice,
        cb: ReadAsyncCb,
        ctx: *mut c_void,
        buf_num: u32,
        buf_len: u32,
    ) -> c_int {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ReadAsyncCall {
                device: dev.id,
                callback: cb as usize,
                ctx: ctx as usize,
                buf_num,
                buf_len,
            });
        }

        if dev.running.swap(true, Ordering::SeqCst) {
            return ASYNC_BUSY;
        }
        dev.cancelled.store(false, Ordering::SeqCst);

        for buf in &self.buffers {
            if dev.cancelled.load(Ordering::SeqCst) {
                break;
            }
            if let Ok(mut delivered) = self.delivered.lock() {
                delivered.push(buf.as_ptr() as usize);
            }
            // The callback only reads; the cast mirrors the C signature
            cb(buf.as_ptr() as *mut u8, buf.len() as u32, ctx);
        }

        if self.block_until_cancel {
            while !dev.cancelled.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        dev.running.store(false, Ordering::SeqCst);
        self.status
    }

    fn cancel_async(&self, dev: &MockDevice) -> c_int {
        if let Ok(mut cancels) = self.cancels.lock() {
            *cancels += 1;
        }
        if !dev.running.load(Ordering::SeqCst) {
            return ASYNC_BUSY;
        }
        dev.cancelled.store(true, Ordering::SeqCst);
        0
    }
}
