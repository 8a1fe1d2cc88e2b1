// Copyright 2025-2026 CEMAXECUTER LLC

//! librtlsdr backend. Linked by build.rs when the `rtlsdr` feature is on.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::ptr;

use crate::driver::{AsyncDriver, ReadAsyncCb};
use crate::error::{SdrError, SdrResult};
use crate::search::{find_device, nearest_gain, DeviceInfo};
use crate::tuner::{Gain, TunerSettings};

type RtlsdrDev = c_void;

extern "C" {
    fn rtlsdr_get_device_count() -> c_uint;
    fn rtlsdr_get_device_name(index: c_uint) -> *const c_char;
    fn rtlsdr_get_device_usb_strings(
        index: c_uint,
        manufact: *mut c_char,
        product: *mut c_char,
        serial: *mut c_char,
    ) -> c_int;
    fn rtlsdr_open(dev: *mut *mut RtlsdrDev, index: c_uint) -> c_int;
    fn rtlsdr_close(dev: *mut RtlsdrDev) -> c_int;
    fn rtlsdr_set_center_freq(dev: *mut RtlsdrDev, freq: u32) -> c_int;
    fn rtlsdr_get_center_freq(dev: *mut RtlsdrDev) -> u32;
    fn rtlsdr_set_sample_rate(dev: *mut RtlsdrDev, rate: u32) -> c_int;
    fn rtlsdr_get_sample_rate(dev: *mut RtlsdrDev) -> u32;
    fn rtlsdr_set_freq_correction(dev: *mut RtlsdrDev, ppm: c_int) -> c_int;
    fn rtlsdr_set_tuner_gain_mode(dev: *mut RtlsdrDev, manual: c_int) -> c_int;
    fn rtlsdr_set_tuner_gain(dev: *mut RtlsdrDev, gain: c_int) -> c_int;
    fn rtlsdr_get_tuner_gains(dev: *mut RtlsdrDev, gains: *mut c_int) -> c_int;
    fn rtlsdr_reset_buffer(dev: *mut RtlsdrDev) -> c_int;
    fn rtlsdr_read_async(
        dev: *mut RtlsdrDev,
        cb: ReadAsyncCb,
        ctx: *mut c_void,
        buf_num: u32,
        buf_len: u32,
    ) -> c_int;
    fn rtlsdr_cancel_async(dev: *mut RtlsdrDev) -> c_int;
}

fn check(op: &'static str, code: c_int) -> SdrResult<()> {
    if code < 0 {
        Err(SdrError::Operation { op, code })
    } else {
        Ok(())
    }
}

fn cstr_buf(buf: &[c_char]) -> String {
    let bytes: Vec<u8> = buf
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// List all RTL-SDR devices librtlsdr can see
pub fn list_devices() -> Vec<DeviceInfo> {
    let count = unsafe { rtlsdr_get_device_count() };
    let mut devices = Vec::with_capacity(count as usize);

    for index in 0..count {
        let name_ptr = unsafe { rtlsdr_get_device_name(index) };
        let name = if name_ptr.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(name_ptr) }.to_string_lossy().into_owned()
        };

        // librtlsdr writes at most 256 bytes per string
        let mut manufact = [0 as c_char; 256];
        let mut product = [0 as c_char; 256];
        let mut serial = [0 as c_char; 256];
        let r = unsafe {
            rtlsdr_get_device_usb_strings(
                index,
                manufact.as_mut_ptr(),
                product.as_mut_ptr(),
                serial.as_mut_ptr(),
            )
        };
        if r != 0 {
            log::warn!("device {}: usb strings unavailable ({})", index, r);
        }

        devices.push(DeviceInfo {
            index,
            name,
            manufacturer: cstr_buf(&manufact),
            product: cstr_buf(&product),
            serial: cstr_buf(&serial),
        });
    }

    devices
}

/// Opened RTL-SDR. Closed on drop.
pub struct RtlSdrDevice {
    dev: *mut RtlsdrDev,
    index: u32,
}

// librtlsdr serialises control transfers internally, and cancel_async is
// documented as callable from another thread while read_async runs.
unsafe impl Send for RtlSdrDevice {}
unsafe impl Sync for RtlSdrDevice {}

impl RtlSdrDevice {
    pub fn open(index: u32) -> SdrResult<Self> {
        let mut dev: *mut RtlsdrDev = ptr::null_mut();
        let r = unsafe { rtlsdr_open(&mut dev, index) };
        if r < 0 || dev.is_null() {
            return Err(SdrError::OpenFailed(r));
        }
        log::info!("RTL-SDR {} opened", index);
        Ok(Self { dev, index })
    }

    /// Open by index or (partial) serial, see [`find_device`].
    pub fn open_matching(query: &str) -> SdrResult<Self> {
        let devices = list_devices();
        for d in &devices {
            log::info!(
                "  {}: {}, {}, SN: {}",
                d.index,
                d.manufacturer,
                d.product,
                d.serial
            );
        }
        let index = find_device(&devices, query)?;
        if let Some(d) = devices.iter().find(|d| d.index == index) {
            log::info!("using device {}: {}", index, d.name);
        }
        Self::open(index)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn set_center_freq(&self, freq_hz: u32) -> SdrResult<()> {
        check("rtlsdr_set_center_freq", unsafe {
            rtlsdr_set_center_freq(self.dev, freq_hz)
        })?;
        log::info!("tuned to {} Hz", unsafe { rtlsdr_get_center_freq(self.dev) });
        Ok(())
    }

    pub fn set_sample_rate(&self, rate_hz: u32) -> SdrResult<()> {
        check("rtlsdr_set_sample_rate", unsafe {
            rtlsdr_set_sample_rate(self.dev, rate_hz)
        })?;
        log::info!("sample rate {} S/s", unsafe { rtlsdr_get_sample_rate(self.dev) });
        Ok(())
    }

    /// Supported tuner gains in tenths of a dB.
    pub fn tuner_gains(&self) -> SdrResult<Vec<i32>> {
        let count = unsafe { rtlsdr_get_tuner_gains(self.dev, ptr::null_mut()) };
        check("rtlsdr_get_tuner_gains", count)?;
        let mut gains = vec![0 as c_int; count as usize];
        let n = unsafe { rtlsdr_get_tuner_gains(self.dev, gains.as_mut_ptr()) };
        check("rtlsdr_get_tuner_gains", n)?;
        gains.truncate(n as usize);
        Ok(gains)
    }

    pub fn set_gain(&self, gain: Gain) -> SdrResult<()> {
        match gain {
            Gain::Auto => {
                check("rtlsdr_set_tuner_gain_mode", unsafe {
                    rtlsdr_set_tuner_gain_mode(self.dev, 0)
                })?;
                log::info!("tuner gain set to automatic");
            }
            Gain::Manual(tenths) => {
                check("rtlsdr_set_tuner_gain_mode", unsafe {
                    rtlsdr_set_tuner_gain_mode(self.dev, 1)
                })?;
                let gains = self.tuner_gains()?;
                let chosen = nearest_gain(&gains, tenths).ok_or_else(|| {
                    SdrError::InvalidArgument("tuner reports no supported gains".to_string())
                })?;
                check("rtlsdr_set_tuner_gain", unsafe {
                    rtlsdr_set_tuner_gain(self.dev, chosen)
                })?;
                log::info!("tuner gain set to {:.1} dB", chosen as f32 / 10.0);
            }
        }
        Ok(())
    }

    /// 0 ppm leaves the device's correction alone.
    pub fn set_ppm(&self, ppm: i32) -> SdrResult<()> {
        if ppm == 0 {
            return Ok(());
        }
        check("rtlsdr_set_freq_correction", unsafe {
            rtlsdr_set_freq_correction(self.dev, ppm)
        })?;
        log::info!("tuner error set to {} ppm", ppm);
        Ok(())
    }

    pub fn reset_buffer(&self) -> SdrResult<()> {
        check("rtlsdr_reset_buffer", unsafe { rtlsdr_reset_buffer(self.dev) })
    }

    /// Frequency, rate, gain, ppm, then a buffer reset.
    pub fn configure(&self, settings: &TunerSettings) -> SdrResult<()> {
        self.set_center_freq(settings.center_frequency)?;
        self.set_sample_rate(settings.sample_rate)?;
        self.set_gain(settings.gain())?;
        self.set_ppm(settings.ppm)?;
        self.reset_buffer()
    }
}

impl Drop for RtlSdrDevice {
    fn drop(&mut self) {
        let r = unsafe { rtlsdr_close(self.dev) };
        if r != 0 {
            log::warn!("rtlsdr_close({}) returned {}", self.index, r);
        }
    }
}

/// librtlsdr's async read, unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct RtlSdr;

// librtlsdr calls back from within rtlsdr_read_async with its own transfer buffers.
unsafe impl AsyncDriver for RtlSdr {
    type Device = RtlSdrDevice;

    unsafe fn read_async(
        &self,
        dev: &RtlSdrDevice,
        cb: ReadAsyncCb,
        ctx: *mut c_void,
        buf_num: u32,
        buf_len: u32,
    ) -> c_int {
        rtlsdr_read_async(dev.dev, cb, ctx, buf_num, buf_len)
    }

    fn cancel_async(&self, dev: &RtlSdrDevice) -> c_int {
        unsafe { rtlsdr_cancel_async(dev.dev) }
    }
}

/// Open `query`, apply `settings`, ready for streaming.
pub fn open_configured(query: &str, settings: &TunerSettings) -> SdrResult<RtlSdrDevice> {
    let dev = RtlSdrDevice::open_matching(query)?;
    dev.configure(settings)?;
    Ok(dev)
}
