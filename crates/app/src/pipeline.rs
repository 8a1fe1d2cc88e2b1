use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::RecvTimeoutError;

use rtl_bridge::driver::effective_buffers;
use rtl_bridge::iq::{cu8_to_complex, mean_power_db};
use rtl_bridge::ring::SampleRing;
use rtl_bridge::{AsyncDriver, AsyncStream, Status, StreamConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STATS_INTERVAL: Duration = Duration::from_secs(1);
const RING_SLOTS: usize = 8;

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub stream: StreamConfig,
    /// Raw CU8 output file
    pub output: Option<PathBuf>,
    pub duration: Option<Duration>,
    pub max_buffers: Option<u64>,
    pub print_stats: bool,
    /// Set from outside (Ctrl-C) to end the capture
    pub stop: Arc<AtomicBool>,
}

#[derive(Debug, Clone)]
pub struct CaptureSummary {
    pub status: Status,
    pub buffers: u64,
    pub bytes: u64,
    pub dropped: u64,
    /// Power of the most recent transfer
    pub power_db: Option<f32>,
}

/// Stream from `device` until the driver stops, the duration elapses, enough
/// buffers have arrived or `opts.stop` is raised, writing every transfer to
/// the output file.
pub fn run_capture<D>(
    driver: Arc<D>,
    device: Arc<D::Device>,
    opts: &CaptureOptions,
) -> Result<CaptureSummary, String>
where
    D: AsyncDriver + 'static,
    D::Device: 'static,
{
    let mut writer: Option<BufWriter<File>> = if let Some(path) = &opts.output {
        let file = File::create(path).map_err(|e| format!("failed to create {}: {}", path.display(), e))?;
        Some(BufWriter::new(file))
    } else {
        None
    };

    let (_, slot_len) = effective_buffers(opts.stream.buf_num, opts.stream.buf_len);
    let mut ring = SampleRing::new(RING_SLOTS, slot_len as usize);

    let stream = AsyncStream::start(driver, device, opts.stream)
        .map_err(|e| format!("failed to start stream: {}", e))?;
    let id = stream.id();
    log::info!("{} started", id);

    let start = Instant::now();
    let deadline = opts.duration.map(|d| start + d);
    let mut last_stats = Instant::now();
    let mut buffers: u64 = 0;
    let mut bytes: u64 = 0;
    let mut write_error = None;

    loop {
        if opts.stop.load(Ordering::SeqCst) {
            log::info!("{}: interrupted", id);
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("{}: capture duration reached", id);
            break;
        }

        match stream.receiver().recv_timeout(POLL_INTERVAL) {
            Ok(buf) => {
                if let Some(w) = writer.as_mut() {
                    if let Err(e) = w.write_all(&buf.data) {
                        write_error = Some(format!("write failed: {}", e));
                        break;
                    }
                }
                ring.push(&buf.data);
                buffers += 1;
                bytes += buf.data.len() as u64;

                if opts.max_buffers.is_some_and(|max| buffers >= max) {
                    log::info!("{}: captured {} buffers", id, buffers);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            // Driver returned and every queued transfer has been drained
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if opts.print_stats && last_stats.elapsed() >= STATS_INTERVAL {
            last_stats = Instant::now();
            let elapsed = start.elapsed().as_secs_f64();
            log::info!(
                "{}: {} buffers, {:.1} MB, {:.2} MB/s, {} dropped",
                id,
                buffers,
                bytes as f64 / 1e6,
                bytes as f64 / 1e6 / elapsed.max(1e-9),
                stream.dropped(),
            );
        }
    }

    let dropped = stream.dropped();
    let status = stream
        .stop()
        .map_err(|e| format!("failed to stop stream: {}", e))?;

    if let Some(e) = write_error {
        return Err(e);
    }
    if let Some(mut w) = writer {
        w.flush().map_err(|e| format!("flush failed: {}", e))?;
    }

    let power_db = ring
        .latest()
        .map(|slot| mean_power_db(&cu8_to_complex(slot)));

    Ok(CaptureSummary {
        status,
        buffers,
        bytes,
        dropped,
        power_db,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtl_bridge::file::{FileReplay, ReplayDevice};
    use rtl_bridge::mock::{MockDevice, MockDriver};
    use std::io::Read;

    fn opts(output: Option<PathBuf>) -> CaptureOptions {
        CaptureOptions {
            stream: StreamConfig {
                buf_num: 4,
                buf_len: 512,
                queue_depth: 16,
            },
            output,
            duration: Some(Duration::from_secs(10)),
            max_buffers: None,
            print_stats: false,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_capture_stops_at_max_buffers() {
        let driver = Arc::new(
            MockDriver::new()
                .with_buffers(vec![vec![10; 512], vec![20; 512], vec![30; 512]])
                .block_until_cancel(),
        );
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mock.cu8");

        let mut o = opts(Some(out.clone()));
        o.max_buffers = Some(2);
        let summary = run_capture(driver.clone(), Arc::new(MockDevice::new(0)), &o).unwrap();

        assert_eq!(summary.buffers, 2);
        assert_eq!(summary.bytes, 1024);
        assert!(summary.status.is_ok());
        assert!(driver.cancel_count() >= 1);

        let mut written = Vec::new();
        File::open(&out).unwrap().read_to_end(&mut written).unwrap();
        assert_eq!(written.len(), 1024);
        assert!(written[..512].iter().all(|&b| b == 10));
        assert!(written[512..].iter().all(|&b| b == 20));
    }

    #[test]
    fn test_replay_capture_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.cu8");
        let output = dir.path().join("out.cu8");
        let bytes: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 256) as u8).collect();
        std::fs::write(&input, &bytes).unwrap();

        let summary = run_capture(
            Arc::new(FileReplay),
            Arc::new(ReplayDevice::new(&input)),
            &opts(Some(output.clone())),
        )
        .unwrap();

        assert_eq!(summary.status.code(), 0);
        assert_eq!(summary.buffers, 4);
        assert_eq!(summary.bytes, 2000);
        assert_eq!(summary.dropped, 0);
        assert!(summary.power_db.is_some());
        assert_eq!(std::fs::read(&output).unwrap(), bytes);
    }

    #[test]
    fn test_stop_flag_ends_capture_and_flushes() {
        let driver = Arc::new(
            MockDriver::new()
                .with_buffers(vec![vec![1; 512], vec![2; 512], vec![3; 512]])
                .block_until_cancel(),
        );
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("interrupted.cu8");
        let o = opts(Some(out.clone()));

        let stop = o.stop.clone();
        let interrupter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            stop.store(true, Ordering::SeqCst);
        });

        let started = Instant::now();
        let summary = run_capture(driver.clone(), Arc::new(MockDevice::new(0)), &o).unwrap();
        interrupter.join().unwrap();

        // Well short of the 10 s duration
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(summary.buffers, 3);
        assert_eq!(summary.bytes, 1536);
        assert!(summary.status.is_ok());
        assert!(driver.cancel_count() >= 1);

        let written = std::fs::read(&out).unwrap();
        assert_eq!(written.len(), 1536);
        assert!(written[1024..].iter().all(|&b| b == 3));
    }

    #[test]
    fn test_driver_error_reported_in_summary() {
        let driver = Arc::new(MockDriver::new().with_status(-1));
        let summary = run_capture(driver, Arc::new(MockDevice::new(0)), &opts(None)).unwrap();
        assert_eq!(summary.status.code(), -1);
        assert_eq!(summary.buffers, 0);
        assert!(summary.power_db.is_none());
    }
}
