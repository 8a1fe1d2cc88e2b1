// Copyright 2025-2026 CEMAXECUTER LLC

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::os::raw::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::driver::{effective_buffers, AsyncDriver, ReadAsyncCb, ASYNC_BUSY};

const READ_FAILED: c_int = -1;

/// A CU8 capture file standing in for an opened device.
pub struct ReplayDevice {
    path: PathBuf,
    /// Complex samples per second to pace delivery at; None = as fast as possible
    sample_rate: Option<u32>,
    looped: bool,
    running: AtomicBool,
    cancel: AtomicBool,
}

impl ReplayDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sample_rate: None,
            looped: false,
            running: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
        }
    }

    pub fn with_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate).filter(|&r| r > 0);
        self
    }

    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Driver that plays a file back through the async read callback, one
/// `buf_len` chunk per transfer, with librtlsdr's buffer defaults.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileReplay;

impl FileReplay {
    /// Fill `buf` as far as the file allows. Returns bytes read; 0 at EOF.
    fn read_chunk(reader: &mut BufReader<File>, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    unsafe fn replay(
        dev: &ReplayDevice,
        cb: ReadAsyncCb,
        ctx: *mut c_void,
        buf_len: usize,
    ) -> c_int {
        let file = match File::open(&dev.path) {
            Ok(f) => f,
            Err(e) => {
                log::error!("failed to open {}: {}", dev.path.display(), e);
                return READ_FAILED;
            }
        };
        let mut reader = BufReader::with_capacity(1024 * 1024, file);
        let mut buf = vec![0u8; buf_len];

        let chunk_period = dev
            .sample_rate
            .map(|rate| Duration::from_secs_f64((buf_len / 2) as f64 / rate as f64));
        let mut next_due = Instant::now();
        let mut transfers: u64 = 0;

        while !dev.cancel.load(Ordering::SeqCst) {
            let n = match Self::read_chunk(&mut reader, &mut buf) {
                Ok(n) => n,
                Err(e) => {
                    log::error!("read error on {}: {}", dev.path.display(), e);
                    return READ_FAILED;
                }
            };

            if n == 0 {
                if dev.looped && transfers > 0 {
                    if let Err(e) = reader.seek(SeekFrom::Start(0)) {
                        log::error!("rewind failed on {}: {}", dev.path.display(), e);
                        return READ_FAILED;
                    }
                    continue;
                }
                log::info!("end of file: {}", dev.path.display());
                break;
            }

            if let Some(period) = chunk_period {
                let now = Instant::now();
                if next_due > now {
                    std::thread::sleep(next_due - now);
                }
                next_due += period;
            }

            cb(buf.as_mut_ptr(), n as u32, ctx);
            transfers += 1;
        }

        log::debug!("replay of {} delivered {} transfers", dev.path.display(), transfers);
        0
    }
}

// Callbacks only run inside read_async, over the local chunk buffer.
unsafe impl AsyncDriver for FileReplay {
    type Device = ReplayDevice;

    unsafe fn read_async(
        &self,
        dev: &ReplayDevice,
        cb: ReadAsyncCb,
        ctx: *mut c_void,
        buf_num: u32,
        buf_len: u32,
    ) -> c_int {
        if dev.running.swap(true, Ordering::SeqCst) {
            return ASYNC_BUSY;
        }
        dev.cancel.store(false, Ordering::SeqCst);

        let (buf_num, buf_len) = effective_buffers(buf_num, buf_len);
        log::info!(
            "replaying {} ({} x {} bytes, {})",
            dev.path.display(),
            buf_num,
            buf_len,
            match dev.sample_rate {
                Some(rate) => format!("{} S/s", rate),
                None => "unpaced".to_string(),
            }
        );

        let r = Self::replay(dev, cb, ctx, buf_len as usize);
        dev.running.store(false, Ordering::SeqCst);
        r
    }

    fn cancel_async(&self, dev: &ReplayDevice) -> c_int {
        if !dev.running.load(Ordering::SeqCst) {
            return ASYNC_BUSY;
        }
        dev.cancel.store(true, Ordering::SeqCst);
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::start_async_read;
    use crate::driver::DEFAULT_BUF_LENGTH;
    use crate::stream::{AsyncStream, StreamConfig};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn capture(bytes: &[u8]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_replay_chunks_file() {
        let bytes: Vec<u8> = (0..1200u32).map(|i| (i % 251) as u8).collect();
        let file = capture(&bytes);
        let dev = ReplayDevice::new(file.path());

        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let status = start_async_read(&FileReplay, &dev, 4, 512, &mut |buf: &[u8]| {
            chunks.push(buf.to_vec())
        });

        assert_eq!(status.code(), 0);
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![512, 512, 176]);
        assert_eq!(chunks.concat(), bytes);
        assert!(!dev.is_running());
    }

    #[test]
    fn test_replay_default_length() {
        let bytes = vec![128u8; DEFAULT_BUF_LENGTH as usize + 10];
        let file = capture(&bytes);
        let dev = ReplayDevice::new(file.path());

        let mut lens = Vec::new();
        // 1000 is not a multiple of 512, so the default applies
        start_async_read(&FileReplay, &dev, 0, 1000, &mut |buf: &[u8]| lens.push(buf.len()));
        assert_eq!(lens, vec![DEFAULT_BUF_LENGTH as usize, 10]);
    }

    #[test]
    fn test_replay_missing_file() {
        let dev = ReplayDevice::new("/nonexistent/capture.cu8");
        let mut called = false;
        let status = start_async_read(&FileReplay, &dev, 1, 512, &mut |_: &[u8]| called = true);
        assert_eq!(status.code(), -1);
        assert!(!called);
    }

    #[test]
    fn test_cancel_idle_device() {
        let dev = ReplayDevice::new("unused.cu8");
        assert_eq!(FileReplay.cancel_async(&dev), ASYNC_BUSY);
    }

    #[test]
    fn test_looped_replay_stops_on_cancel() {
        let file = capture(&[127u8; 1024]);
        let dev = Arc::new(ReplayDevice::new(file.path()).with_rate(256_000).looped(true));
        let config = StreamConfig {
            buf_num: 2,
            buf_len: 512,
            queue_depth: 8,
        };
        let stream = AsyncStream::start(Arc::new(FileReplay), dev.clone(), config).unwrap();

        // More transfers than the file holds proves it looped
        for _ in 0..4 {
            let buf = stream.receiver().recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(buf.data.len(), 512);
        }

        let status = stream.stop().unwrap();
        assert_eq!(status.code(), 0);
        assert!(!dev.is_running());
    }
}
