// Copyright 2025-2026 CEMAXECUTER LLC

use std::path::{Path, PathBuf};

use rtl_bridge::tuner::TunerSettings;
use rtl_bridge::StreamConfig;
use serde::Deserialize;

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub stream: StreamSection,
    pub output: OutputConfig,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct DeviceConfig {
    /// Device index or (partial) serial
    pub query: String,
    pub center_frequency: u32,
    pub sample_rate: u32,
    /// dB, 0 = automatic
    pub gain: f32,
    pub ppm: i32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let tuner = TunerSettings::default();
        Self {
            query: "0".to_string(),
            center_frequency: tuner.center_frequency,
            sample_rate: tuner.sample_rate,
            gain: tuner.gain,
            ppm: tuner.ppm,
        }
    }
}

impl DeviceConfig {
    pub fn tuner(&self) -> TunerSettings {
        TunerSettings {
            center_frequency: self.center_frequency,
            sample_rate: self.sample_rate,
            gain: self.gain,
            ppm: self.ppm,
        }
    }
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct StreamSection {
    /// 0 = driver default
    pub buffer_count: u32,
    /// Bytes per transfer, 0 = driver default
    pub buffer_length: u32,
    pub queue_depth: usize,
}

impl Default for StreamSection {
    fn default() -> Self {
        let defaults = StreamConfig::default();
        Self {
            buffer_count: defaults.buf_num,
            buffer_length: defaults.buf_len,
            queue_depth: defaults.queue_depth,
        }
    }
}

impl StreamSection {
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            buf_num: self.buffer_count,
            buf_len: self.buffer_length,
            queue_depth: self.queue_depth,
        }
    }
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct OutputConfig {
    pub path: Option<PathBuf>,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub device: Option<String>,
    pub center_frequency: Option<u32>,
    pub sample_rate: Option<u32>,
    pub gain: Option<f32>,
    pub ppm: Option<i32>,
    pub buffer_count: Option<u32>,
    pub buffer_length: Option<u32>,
    pub output: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, String> {
        toml::from_str(s).map_err(|e| format!("failed to parse config: {}", e))
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, String> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Self::from_toml_str(&s)
    }

    pub fn apply(&mut self, o: Overrides) {
        if let Some(v) = o.device {
            self.device.query = v;
        }
        if let Some(v) = o.center_frequency {
            self.device.center_frequency = v;
        }
        if let Some(v) = o.sample_rate {
            self.device.sample_rate = v;
        }
        if let Some(v) = o.gain {
            self.device.gain = v;
        }
        if let Some(v) = o.ppm {
            self.device.ppm = v;
        }
        if let Some(v) = o.buffer_count {
            self.stream.buffer_count = v;
        }
        if let Some(v) = o.buffer_length {
            self.stream.buffer_length = v;
        }
        if o.output.is_some() {
            self.output.path = o.output;
        }
    }
}
