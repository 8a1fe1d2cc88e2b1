// Copyright 2025-2026 CEMAXECUTER LLC

use crate::error::{SdrError, SdrResult};

/// Information about a detected RTL-SDR device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
}

/// Resolve a user-supplied device query to an index.
///
/// Tried in order: a plain index, an exact serial, a serial prefix, a serial
/// suffix. The first device that matches wins.
pub fn find_device(devices: &[DeviceInfo], query: &str) -> SdrResult<u32> {
    if devices.is_empty() {
        return Err(SdrError::NoDevices);
    }

    if let Ok(index) = query.parse::<u32>() {
        if (index as usize) < devices.len() {
            return Ok(devices[index as usize].index);
        }
    }

    let by_serial = |matches: &dyn Fn(&str) -> bool| {
        devices.iter().find(|d| matches(d.serial.as_str())).map(|d| d.index)
    };

    by_serial(&|s| s == query)
        .or_else(|| by_serial(&|s| s.starts_with(query)))
        .or_else(|| by_serial(&|s| s.ends_with(query)))
        .ok_or_else(|| SdrError::DeviceNotFound(query.to_string()))
}

/// Supported gain closest to `target` (both in tenths of a dB).
pub fn nearest_gain(gains: &[i32], target: i32) -> Option<i32> {
    let mut best = *gains.first()?;
    for &g in &gains[1..] {
        if target.abs_diff(g) < target.abs_diff(best) {
            best = g;
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuner::Gain;

    fn dev(index: u32, serial: &str) -> DeviceInfo {
        DeviceInfo {
            index,
            name: "Generic RTL2832U OEM".to_string(),
            manufacturer: "Realtek".to_string(),
            product: "RTL2838UHIDIR".to_string(),
            serial: serial.to_string(),
        }
    }

    #[test]
    fn test_find_by_index() {
        let devices = [dev(0, "00000001"), dev(1, "00000002")];
        assert_eq!(find_device(&devices, "1").unwrap(), 1);
        assert_eq!(find_device(&devices, "0").unwrap(), 0);
    }

    #[test]
    fn test_find_by_serial_order() {
        let devices = [dev(0, "77771111"), dev(1, "1111"), dev(2, "11112222")];
        // Out-of-range index falls through to serial matching
        assert_eq!(find_device(&devices, "1111").unwrap(), 1);
        assert_eq!(find_device(&devices, "7777").unwrap(), 0);
        assert_eq!(find_device(&devices, "2222").unwrap(), 2);
    }

    #[test]
    fn test_find_prefix_before_suffix() {
        let devices = [dev(0, "0042"), dev(1, "4200")];
        assert_eq!(find_device(&devices, "42").unwrap_or(99), 1);
    }

    #[test]
    fn test_find_errors() {
        assert!(matches!(find_device(&[], "0"), Err(SdrError::NoDevices)));
        let devices = [dev(0, "00000001")];
        assert!(matches!(
            find_device(&devices, "abc"),
            Err(SdrError::DeviceNotFound(q)) if q == "abc"
        ));
    }

    #[test]
    fn test_nearest_gain() {
        let gains = [0, 9, 14, 27, 37, 77, 87, 125, 144, 157, 166, 197];
        assert_eq!(nearest_gain(&gains, 400), Some(197));
        assert_eq!(nearest_gain(&gains, 30), Some(27));
        assert_eq!(nearest_gain(&gains, -10), Some(0));
        // Ties keep the earlier gain
        assert_eq!(nearest_gain(&[10, 20], 15), Some(10));
        assert_eq!(nearest_gain(&[], 15), None);
    }

    #[test]
    fn test_nearest_gain_extreme_targets() {
        // E4000 reports negative gains; user targets saturate at the i32 range
        let gains = [-10, 15, 40];
        let Gain::Manual(huge) = Gain::from_db(1e10) else {
            panic!("expected manual gain");
        };
        assert_eq!(nearest_gain(&gains, huge), Some(40));
        assert_eq!(nearest_gain(&gains, i32::MIN), Some(-10));
        assert_eq!(nearest_gain(&[i32::MIN, i32::MAX], 0), Some(i32::MAX));
    }
}
