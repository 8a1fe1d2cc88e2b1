// Copyright 2025-2026 CEMAXECUTER LLC

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::bridge::{start_async_read, BufferHandler, Status};
use crate::driver::AsyncDriver;
use crate::error::{SdrError, SdrResult};

const CANCEL_RETRY: Duration = Duration::from_millis(10);

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

// Addresses of devices with a live AsyncStream
static CLAIMED_DEVICES: Mutex<Vec<usize>> = Mutex::new(Vec::new());

/// Exclusive hold on a device for the lifetime of one stream. `cancel_async`
/// stops every read on a device, so two streams on one device cannot be
/// stopped independently.
struct DeviceClaim(usize);

impl DeviceClaim {
    fn acquire<T>(device: &Arc<T>) -> SdrResult<Self> {
        let addr = Arc::as_ptr(device) as *const () as usize;
        let mut claimed = CLAIMED_DEVICES.lock().unwrap_or_else(|e| e.into_inner());
        if claimed.contains(&addr) {
            return Err(SdrError::DeviceBusy);
        }
        claimed.push(addr);
        Ok(DeviceClaim(addr))
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        let mut claimed = CLAIMED_DEVICES.lock().unwrap_or_else(|e| e.into_inner());
        claimed.retain(|&a| a != self.0);
    }
}

/// Identifies the stream a buffer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    fn next() -> Self {
        StreamId(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rx-{}", self.0)
    }
}

/// Owned copy of one transfer, raw CU8 bytes as the driver delivered them.
#[derive(Debug, Clone)]
pub struct SampleBuf {
    pub stream: StreamId,
    /// Transfer index within the stream, counting dropped transfers too
    pub seq: u64,
    pub data: Vec<u8>,
}

impl SampleBuf {
    /// Number of complex samples (data.len() / 2)
    pub fn num_samples(&self) -> usize {
        self.data.len() / 2
    }
}

/// Copies transfers into a bounded channel. Never blocks the driver: when
/// the queue is full the transfer is dropped and counted.
pub struct ChannelSink {
    stream: StreamId,
    seq: u64,
    tx: Sender<SampleBuf>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    pub fn new(stream: StreamId, tx: Sender<SampleBuf>, dropped: Arc<AtomicU64>) -> Self {
        Self {
            stream,
            seq: 0,
            tx,
            dropped,
        }
    }

    /// Transfers seen so far, delivered or not.
    pub fn transfers(&self) -> u64 {
        self.seq
    }
}

impl BufferHandler for ChannelSink {
    fn on_buffer(&mut self, buf: &[u8]) {
        let seq = self.seq;
        self.seq += 1;

        let msg = SampleBuf {
            stream: self.stream,
            seq,
            data: buf.to_vec(),
        };
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            // Nobody listening any more; keep draining until cancelled
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Buffer parameters for the driver plus the depth of the delivery queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Transfer count; 0 lets the driver choose
    pub buf_num: u32,
    /// Transfer length in bytes; 0 lets the driver choose
    pub buf_len: u32,
    pub queue_depth: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buf_num: 0,
            buf_len: 0,
            queue_depth: 64,
        }
    }
}

/// A driver async read running on its own thread, with an explicit stop.
pub struct AsyncStream<D>
where
    D: AsyncDriver + 'static,
    D::Device: 'static,
{
    id: StreamId,
    driver: Arc<D>,
    device: Arc<D::Device>,
    thread: Option<JoinHandle<Status>>,
    rx: Receiver<SampleBuf>,
    dropped: Arc<AtomicU64>,
    // Released after the thread is joined
    _claim: DeviceClaim,
}

impl<D> AsyncStream<D>
where
    D: AsyncDriver + 'static,
    D::Device: 'static,
{
    pub fn start(driver: Arc<D>, device: Arc<D::Device>, config: StreamConfig) -> SdrResult<Self> {
        if config.queue_depth == 0 {
            return Err(SdrError::InvalidArgument(
                "queue depth must be at least 1".to_string(),
            ));
        }

        let claim = DeviceClaim::acquire(&device)?;
        let id = StreamId::next();
        let (tx, rx) = bounded::<SampleBuf>(config.queue_depth);
        let dropped = Arc::new(AtomicU64::new(0));

        let thread_driver = driver.clone();
        let thread_device = device.clone();
        let thread_dropped = dropped.clone();

        let thread = thread::Builder::new()
            .name(id.to_string())
            .spawn(move || {
                let mut sink = ChannelSink::new(id, tx, thread_dropped);
                log::info!(
                    "{}: async read starting (buffers={}, length={})",
                    id,
                    config.buf_num,
                    config.buf_len
                );

                let status = start_async_read(
                    &*thread_driver,
                    &*thread_device,
                    config.buf_num,
                    config.buf_len,
                    &mut sink,
                );

                if status.is_ok() {
                    log::info!("{}: async read returned after {} transfers", id, sink.transfers());
                } else {
                    log::error!("{}: async read failed with status {}", id, status.code());
                }
                status
            })
            .map_err(SdrError::Spawn)?;

        Ok(Self {
            id,
            driver,
            device,
            thread: Some(thread),
            rx,
            dropped,
            _claim: claim,
        })
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn receiver(&self) -> &Receiver<SampleBuf> {
        &self.rx
    }

    /// Transfers discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// True once the driver's read has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Cancel the read and wait for the thread. Returns the driver's status.
    pub fn stop(mut self) -> SdrResult<Status> {
        self.finish(true)
    }

    /// Wait for the driver to return on its own, without cancelling.
    pub fn wait(mut self) -> SdrResult<Status> {
        self.finish(false)
    }

    fn finish(&mut self, cancel: bool) -> SdrResult<Status> {
        let handle = self.thread.take().ok_or(SdrError::ThreadPanicked)?;

        if cancel {
            // A cancel that lands before the driver is running is a no-op, so retry
            while !handle.is_finished() {
                let r = self.driver.cancel_async(&self.device);
                log::debug!("{}: cancel_async -> {}", self.id, r);
                thread::sleep(CANCEL_RETRY);
            }
        }

        handle.join().map_err(|_| SdrError::ThreadPanicked)
    }
}

impl<D> Drop for AsyncStream<D>
where
    D: AsyncDriver + 'static,
    D::Device: 'static,
{
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.finish(true) {
                log::warn!("{}: {}", self.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockDriver};

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn test_stream_delivers_tagged_buffers() {
        let driver = Arc::new(
            MockDriver::new()
                .with_buffers(vec![vec![1; 8], vec![2; 8], vec![3; 8]])
                .block_until_cancel(),
        );
        let device = Arc::new(MockDevice::new(0));
        let stream = AsyncStream::start(driver.clone(), device.clone(), StreamConfig::default())
            .unwrap();
        let id = stream.id();

        for expected in 0..3u64 {
            let buf = stream.receiver().recv_timeout(RECV_TIMEOUT).unwrap();
            assert_eq!(buf.stream, id);
            assert_eq!(buf.seq, expected);
            assert_eq!(buf.data, vec![expected as u8 + 1; 8]);
            assert_eq!(buf.num_samples(), 4);
        }

        let status = stream.stop().unwrap();
        assert!(status.is_ok());
        assert!(driver.cancel_count() >= 1);
        assert!(!device.is_running());
    }

    #[test]
    fn test_stream_ids_are_unique() {
        let driver = Arc::new(MockDriver::new());
        let a = AsyncStream::start(driver.clone(), Arc::new(MockDevice::new(0)), StreamConfig::default())
            .unwrap();
        let b = AsyncStream::start(driver, Arc::new(MockDevice::new(1)), StreamConfig::default())
            .unwrap();
        assert_ne!(a.id(), b.id());
        a.wait().unwrap();
        b.wait().unwrap();
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let driver = Arc::new(
            MockDriver::new().with_buffers(vec![vec![0; 4], vec![1; 4], vec![2; 4]]),
        );
        let config = StreamConfig {
            queue_depth: 1,
            ..StreamConfig::default()
        };
        let stream = AsyncStream::start(driver, Arc::new(MockDevice::new(0)), config).unwrap();

        while !stream.is_finished() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(stream.dropped(), 2);

        let first = stream.receiver().recv_timeout(RECV_TIMEOUT).unwrap();
        assert_eq!(first.seq, 0);
        assert!(stream.receiver().try_recv().is_err());
        stream.wait().unwrap();
    }

    #[test]
    fn test_wait_returns_driver_error() {
        let driver = Arc::new(MockDriver::new().with_status(-1));
        let stream = AsyncStream::start(driver, Arc::new(MockDevice::new(9)), StreamConfig::default())
            .unwrap();
        let status = stream.wait().unwrap();
        assert_eq!(status.code(), -1);
    }

    #[test]
    fn test_drop_cancels_running_stream() {
        let driver = Arc::new(MockDriver::new().block_until_cancel());
        let device = Arc::new(MockDevice::new(0));
        let stream = AsyncStream::start(driver.clone(), device.clone(), StreamConfig::default())
            .unwrap();
        drop(stream);
        assert!(driver.cancel_count() >= 1);
        assert!(!device.is_running());
    }

    #[test]
    fn test_second_stream_on_device_rejected() {
        let driver = Arc::new(MockDriver::new().block_until_cancel());
        let device = Arc::new(MockDevice::new(0));
        let first = AsyncStream::start(driver.clone(), device.clone(), StreamConfig::default())
            .unwrap();
        while !device.is_running() {
            thread::sleep(Duration::from_millis(1));
        }

        let second = AsyncStream::start(driver.clone(), device.clone(), StreamConfig::default());
        assert!(matches!(second, Err(SdrError::DeviceBusy)));
        assert_eq!(driver.cancel_count(), 0);
        assert!(device.is_running());
        assert!(!first.is_finished());

        first.stop().unwrap();
        assert!(!device.is_running());

        // Released once the first stream is stopped
        let again = AsyncStream::start(driver, device, StreamConfig::default()).unwrap();
        again.stop().unwrap();
    }

    #[test]
    fn test_zero_queue_depth_rejected() {
        let config = StreamConfig {
            queue_depth: 0,
            ..StreamConfig::default()
        };
        let r = AsyncStream::start(Arc::new(MockDriver::new()), Arc::new(MockDevice::new(0)), config);
        assert!(matches!(r, Err(SdrError::InvalidArgument(_))));
    }
}
