// Copyright 2025-2026 CEMAXECUTER LLC

use std::sync::{Arc, RwLock};

use slice_ring_buf::SliceRB;

use crate::bridge::BufferHandler;

/// Fixed-slot circular store of the most recent transfers.
///
/// Each transfer occupies exactly one `slot_len`-byte slot: longer transfers
/// are truncated, shorter ones zero-filled.
pub struct SampleRing {
    slots: usize,
    slot_len: usize,
    buf: SliceRB<u8>,
    // Zero padding for short transfers
    pad: Vec<u8>,
    count: u64,
}

impl SampleRing {
    pub fn new(slots: usize, slot_len: usize) -> Self {
        let slots = slots.max(1);
        let slot_len = slot_len.max(1);
        Self {
            slots,
            slot_len,
            buf: SliceRB::<u8>::from_len(slots * slot_len),
            pad: vec![0u8; slot_len],
            count: 0,
        }
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn slot_len(&self) -> usize {
        self.slot_len
    }

    /// Total transfers written since creation.
    pub fn count(&self) -> u64 {
        self.count
    }

    fn slot_offset(&self, index: u64) -> isize {
        ((index % self.slots as u64) as usize * self.slot_len) as isize
    }

    pub fn push(&mut self, data: &[u8]) {
        let start = self.slot_offset(self.count);
        let n = data.len().min(self.slot_len);

        self.buf.write_latest(&data[..n], start);
        if n < self.slot_len {
            self.buf.write_latest(&self.pad[n..], start + n as isize);
        }

        self.count += 1;
    }

    /// Most recently written slot.
    pub fn latest(&self) -> Option<&[u8]> {
        if self.count == 0 {
            return None;
        }
        // Slots never straddle the end of the ring
        let (head, _) = self.buf.as_slices(self.slot_offset(self.count - 1));
        Some(&head[..self.slot_len])
    }

    /// Copy `out.len()` bytes starting at byte `offset`, wrapping past the end.
    pub fn read(&self, offset: usize, out: &mut [u8]) {
        let offset = offset % (self.slots * self.slot_len);
        self.buf.read_into(out, offset as isize);
    }
}

impl BufferHandler for SampleRing {
    fn on_buffer(&mut self, buf: &[u8]) {
        self.push(buf);
    }
}

/// A ring shared between the streaming thread and readers.
#[derive(Clone)]
pub struct SharedRing(Arc<RwLock<SampleRing>>);

impl SharedRing {
    pub fn new(slots: usize, slot_len: usize) -> Self {
        SharedRing(Arc::new(RwLock::new(SampleRing::new(slots, slot_len))))
    }

    /// Run `f` with read access. None if a writer panicked mid-update.
    pub fn with<R>(&self, f: impl FnOnce(&SampleRing) -> R) -> Option<R> {
        self.0.read().ok().map(|ring| f(&ring))
    }
}

impl BufferHandler for SharedRing {
    fn on_buffer(&mut self, buf: &[u8]) {
        match self.0.write() {
            Ok(mut ring) => ring.push(buf),
            Err(_) => log::warn!("sample ring poisoned; transfer discarded"),
        }
    }
}
