//! Capture driver adapter.
//!
//! A [`ReaderDriver`] enumerates and opens devices; a [`FingerprintReader`]
//! is one open handle. Handles are only ever held through a [`ReaderGuard`],
//! which closes them on every exit path.

pub mod v4l2;

pub use v4l2::V4lDriver;

use std::time::Duration;
use image::GrayImage;
use serde::Serialize;
use crate::common::{FingerprintError, Result};

pub const RESULT_SUCCESS: i32 = 0;
pub const RESULT_TIMED_OUT: i32 = 1;
pub const RESULT_DEVICE_FAILURE: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureQuality {
    Good,
    Poor,
    TimedOut,
    Error,
}

/// One raw capture. Never persisted.
#[derive(Debug, Clone)]
pub struct CaptureSample {
    pub image: Option<GrayImage>,
    pub quality: CaptureQuality,
    pub quality_score: f32,
    pub result_code: i32,
}

impl CaptureSample {
    pub fn captured(image: GrayImage, quality: CaptureQuality, quality_score: f32) -> Self {
        Self {
            image: Some(image),
            quality,
            quality_score,
            result_code: RESULT_SUCCESS,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            image: None,
            quality: CaptureQuality::TimedOut,
            quality_score: 0.0,
            result_code: RESULT_TIMED_OUT,
        }
    }

    pub fn failed(result_code: i32) -> Self {
        Self {
            image: None,
            quality: CaptureQuality::Error,
            quality_score: 0.0,
            result_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Driver-specific locator, e.g. `/dev/video2`.
    pub id: String,
    pub name: String,
    pub serial_number: Option<String>,
}

pub trait FingerprintReader {
    fn info(&self) -> &DeviceInfo;

    /// Blocks until a finger is captured or `timeout` elapses. Expiry is a
    /// `TimedOut` sample, not an error.
    fn capture(&mut self, timeout: Duration) -> Result<CaptureSample>;

    fn close(&mut self);
}

pub trait ReaderDriver: Send + Sync {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn FingerprintReader>>;
}

/// Scoped reader handle; `Drop` releases the device exactly once.
pub struct ReaderGuard {
    reader: Option<Box<dyn FingerprintReader>>,
}

impl ReaderGuard {
    /// Opens the first enumerated device. Additional readers are ignored.
    pub fn open_first(driver: &dyn ReaderDriver) -> Result<Self> {
        let devices = driver.list_devices()?;
        let device = devices.first().ok_or(FingerprintError::NoDeviceFound)?;

        tracing::debug!("Opening reader {} ({})", device.id, device.name);
        let reader = driver.open(device)?;
        Ok(Self { reader: Some(reader) })
    }

    pub fn reader(&mut self) -> Result<&mut dyn FingerprintReader> {
        match self.reader.as_mut() {
            Some(reader) => Ok(reader.as_mut()),
            None => Err(FingerprintError::Device("Reader already released".into())),
        }
    }
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
            tracing::debug!("Released reader {}", reader.info().id);
        }
    }
}

/// Runs `op` with the first reader open and releases it afterwards,
/// whether `op` returns, fails or panics.
pub fn with_reader<T>(
    driver: &dyn ReaderDriver,
    op: impl FnOnce(&mut dyn FingerprintReader) -> Result<T>,
) -> Result<T> {
    let mut guard = ReaderGuard::open_first(driver)?;
    op(guard.reader()?)
}
