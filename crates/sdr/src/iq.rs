// Copyright 2025-2026 CEMAXECUTER LLC

use num_complex::Complex32;

/// Convert interleaved unsigned 8-bit IQ (RTL-SDR native) to complex samples
/// in [-1, 1]. A trailing odd byte is ignored.
pub fn cu8_to_complex(buf: &[u8]) -> Vec<Complex32> {
    buf.chunks_exact(2)
        .map(|iq| Complex32::new(scale(iq[0]), scale(iq[1])))
        .collect()
}

#[inline]
fn scale(x: u8) -> f32 {
    (x as f32 - 127.5) / 127.5
}

/// Mean power in dB (full scale = 0 dB).
pub fn mean_power_db(samples: &[Complex32]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let sum: f32 = samples.iter().map(|s| s.norm_sqr()).sum();
    10.0 * (sum / samples.len() as f32).log10()
}
