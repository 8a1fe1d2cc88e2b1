// Copyright 2025-2026 CEMAXECUTER LLC

/// Tuner gain: automatic, or manual in tenths of a dB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    Auto,
    Manual(i32),
}

impl Gain {
    /// 0 dB selects automatic gain.
    pub fn from_db(db: f32) -> Self {
        if db == 0.0 {
            Gain::Auto
        } else {
            Gain::Manual((db * 10.0).round() as i32)
        }
    }
}

/// Radio settings applied before streaming.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunerSettings {
    /// Center frequency in Hz
    pub center_frequency: u32,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Gain in dB; 0 = automatic
    pub gain: f32,
    /// Frequency correction in ppm
    pub ppm: i32,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            center_frequency: 1_575_420_000,
            sample_rate: 2_048_000,
            gain: 0.0,
            ppm: 0,
        }
    }
}

impl TunerSettings {
    pub fn gain(&self) -> Gain {
        Gain::from_db(self.gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_from_db() {
        assert_eq!(Gain::from_db(0.0), Gain::Auto);
        assert_eq!(Gain::from_db(49.6), Gain::Manual(496));
        assert_eq!(Gain::from_db(-1.0), Gain::Manual(-10));
    }
}
