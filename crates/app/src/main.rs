mod config;
mod pipeline;

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use config::{AppConfig, Overrides};
use pipeline::{CaptureOptions, CaptureSummary};
use rtl_bridge::file::{FileReplay, ReplayDevice};

#[derive(Parser, Debug)]
#[command(name = "rtl-capture")]
#[command(about = "Stream raw IQ from an RTL-SDR through the async read bridge")]
struct Cli {
    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Device index or (partial) serial number
    #[arg(short = 'd', long)]
    device: Option<String>,

    /// Center frequency in Hz
    #[arg(short = 'f', long)]
    freq: Option<u32>,

    /// Sample rate in Hz
    #[arg(short = 's', long)]
    rate: Option<u32>,

    /// Tuner gain in dB (0 = automatic)
    #[arg(short = 'g', long)]
    gain: Option<f32>,

    /// Frequency correction in ppm
    #[arg(short = 'p', long, allow_hyphen_values = true)]
    ppm: Option<i32>,

    /// Number of driver transfer buffers (0 = driver default)
    #[arg(short = 'b', long)]
    buffers: Option<u32>,

    /// Transfer length in bytes (0 = driver default)
    #[arg(short = 'l', long)]
    buffer_length: Option<u32>,

    /// Stop after this many transfers
    #[arg(short = 'n', long)]
    max_buffers: Option<u64>,

    /// Stop after this many seconds
    #[arg(short = 't', long)]
    duration: Option<f64>,

    /// Replay a CU8 capture instead of opening hardware
    #[arg(short = 'r', long)]
    replay: Option<PathBuf>,

    /// Loop the replay file until stopped
    #[arg(long = "loop")]
    looped: bool,

    /// Replay as fast as possible instead of at the sample rate
    #[arg(long)]
    fast: bool,

    /// Raw CU8 output file
    #[arg(short = 'w', long)]
    write: Option<PathBuf>,

    /// List attached devices and exit
    #[arg(long)]
    list: bool,

    /// Print statistics
    #[arg(long)]
    stats: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            device: self.device.clone(),
            center_frequency: self.freq,
            sample_rate: self.rate,
            gain: self.gain,
            ppm: self.ppm,
            buffer_count: self.buffers,
            buffer_length: self.buffer_length,
            output: self.write.clone(),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    if let Err(e) = run(&cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    if cli.list {
        return list_devices();
    }

    let mut cfg = match &cli.config {
        Some(path) => AppConfig::from_toml_file(path)?,
        None => AppConfig::default(),
    };
    cfg.apply(cli.overrides());

    if let Some(secs) = cli.duration {
        if !(secs.is_finite() && secs > 0.0) {
            return Err(format!("invalid duration: {}", secs));
        }
    }

    // Ctrl-C ends the capture through the normal stop and flush path
    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| format!("failed to install Ctrl-C handler: {}", e))?;

    let opts = CaptureOptions {
        stream: cfg.stream.stream_config(),
        output: cfg.output.path.clone(),
        duration: cli.duration.map(Duration::from_secs_f64),
        max_buffers: cli.max_buffers,
        print_stats: cli.stats,
        stop,
    };

    log::debug!("configuration: {:?}", cfg);
    log::debug!("tuner: {:?}", cfg.device.tuner());

    let summary = if let Some(path) = &cli.replay {
        let mut device = ReplayDevice::new(path).looped(cli.looped);
        if !cli.fast {
            device = device.with_rate(cfg.device.sample_rate);
        }
        pipeline::run_capture(Arc::new(FileReplay), Arc::new(device), &opts)?
    } else {
        capture_hardware(&cfg, &opts)?
    };

    report(&summary);
    summary
        .status
        .into_result()
        .map(|_| ())
        .map_err(|e| format!("streaming ended abnormally: {}", e))
}

#[cfg(feature = "rtlsdr")]
fn capture_hardware(cfg: &AppConfig, opts: &CaptureOptions) -> Result<CaptureSummary, String> {
    use rtl_bridge::rtlsdr::{open_configured, RtlSdr};

    let device = open_configured(&cfg.device.query, &cfg.device.tuner())
        .map_err(|e| format!("failed to set up device '{}': {}", cfg.device.query, e))?;
    pipeline::run_capture(Arc::new(RtlSdr), Arc::new(device), opts)
}

#[cfg(not(feature = "rtlsdr"))]
fn capture_hardware(_cfg: &AppConfig, _opts: &CaptureOptions) -> Result<CaptureSummary, String> {
    Err("built without RTL-SDR support; rebuild with --features rtlsdr or use --replay <file>".to_string())
}

#[cfg(feature = "rtlsdr")]
fn list_devices() -> Result<(), String> {
    let devices = rtl_bridge::rtlsdr::list_devices();
    if devices.is_empty() {
        return Err("no supported devices found".to_string());
    }
    for d in devices {
        println!("{}: {} ({}, {}, SN: {})", d.index, d.name, d.manufacturer, d.product, d.serial);
    }
    Ok(())
}

#[cfg(not(feature = "rtlsdr"))]
fn list_devices() -> Result<(), String> {
    Err("built without RTL-SDR support".to_string())
}

fn report(summary: &CaptureSummary) {
    log::info!(
        "done: {} buffers, {} bytes, {} dropped, driver status {}",
        summary.buffers,
        summary.bytes,
        summary.dropped,
        summary.status.code()
    );
    if let Some(p) = summary.power_db {
        log::info!("last transfer power: {:.1} dBFS", p);
    }
}
