//! Scripted reader, tag extractor and table matcher for orchestrator tests.

use crate::common::{FingerprintError, Result};
use crate::core::extractor::{Descriptor, FeatureExtractor};
use crate::core::matcher::{Matcher, Score};
use crate::reader::{
    CaptureQuality, CaptureSample, DeviceInfo, FingerprintReader, ReaderDriver, RESULT_DEVICE_FAILURE,
};
use image::{GrayImage, Luma};
use std::collections::{HashMap, VecDeque};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub enum Stripes {
    Vertical,
    Horizontal,
    Diagonal,
}

pub fn blank_image(size: u32) -> GrayImage {
    GrayImage::from_pixel(size, size, Luma([200]))
}

/// Sinusoidal ridges with an 8 px period.
pub fn stripe_image(size: u32, stripes: Stripes) -> GrayImage {
    GrayImage::from_fn(size, size, |x, y| {
        let t = match stripes {
            Stripes::Vertical => x as f32,
            Stripes::Horizontal => y as f32,
            Stripes::Diagonal => (x + y) as f32,
        };
        Luma([(128.0 + 100.0 * (2.0 * PI * t / 8.0).sin()).round() as u8])
    })
}

pub fn ridge_sample(stripes: Stripes) -> CaptureSample {
    CaptureSample::captured(stripe_image(128, stripes), CaptureQuality::Good, 0.9)
}

/// A tiny capture whose pixels all carry `tag`; see [`TagExtractor`].
pub fn good(tag: u8) -> Result<CaptureSample> {
    Ok(CaptureSample::captured(GrayImage::from_pixel(4, 4, Luma([tag])), CaptureQuality::Good, 0.9))
}

pub fn poor(tag: u8) -> Result<CaptureSample> {
    Ok(CaptureSample::captured(GrayImage::from_pixel(4, 4, Luma([tag])), CaptureQuality::Poor, 0.2))
}

pub fn timed_out() -> Result<CaptureSample> {
    Ok(CaptureSample::timed_out())
}

/// A frame the reader delivered but could not decode.
pub fn frame_fault() -> Result<CaptureSample> {
    Ok(CaptureSample::failed(RESULT_DEVICE_FAILURE))
}

pub fn device_error() -> Result<CaptureSample> {
    Err(FingerprintError::Device("USB transfer failed".into()))
}

/// Descriptor is the capture's tag byte; tag 0 fails extraction.
#[derive(Debug, Default, Clone, Copy)]
pub struct TagExtractor;

impl FeatureExtractor for TagExtractor {
    fn extract(&self, sample: &CaptureSample) -> Result<Descriptor> {
        let image = sample.image.as_ref()
            .ok_or_else(|| FingerprintError::ExtractionFailed("no image".into()))?;
        match image.get_pixel(0, 0)[0] {
            0 => Err(FingerprintError::ExtractionFailed("smudged".into())),
            tag => Ok(Descriptor::from_bytes(vec![tag])),
        }
    }

    fn fuse(&self, samples: &[Descriptor]) -> Result<Descriptor> {
        let first = samples.first()
            .ok_or_else(|| FingerprintError::ExtractionFailed("no samples".into()))?;
        Ok(first.clone())
    }
}

/// Looks up `(stored tag, live tag)`; unknown pairs score `Score::MAX`.
#[derive(Debug, Default, Clone)]
pub struct TableMatcher {
    scores: HashMap<(u8, u8), i32>,
}

impl TableMatcher {
    pub fn with(mut self, stored: u8, live: u8, score: i32) -> Self {
        self.scores.insert((stored, live), score);
        self
    }
}

impl Matcher for TableMatcher {
    fn compare(&self, stored: &Descriptor, live: &Descriptor) -> Score {
        let key = (stored.as_bytes()[0], live.as_bytes()[0]);
        self.scores.get(&key).map(|&s| Score::new(s)).unwrap_or(Score::MAX)
    }
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    captures: AtomicUsize,
    closes: AtomicUsize,
}

/// Replays a fixed capture script; an exhausted script times out.
#[derive(Clone)]
pub struct ScriptedDriver {
    devices: Vec<DeviceInfo>,
    script: Arc<Mutex<VecDeque<Result<CaptureSample>>>>,
    counters: Arc<Counters>,
    open_error: Option<String>,
}

impl ScriptedDriver {
    pub fn new(script: Vec<Result<CaptureSample>>) -> Self {
        Self {
            devices: vec![DeviceInfo {
                id: "/dev/scripted0".into(),
                name: "Scripted Reader".into(),
                serial_number: Some("SN-0001".into()),
            }],
            script: Arc::new(Mutex::new(script.into())),
            counters: Arc::new(Counters::default()),
            open_error: None,
        }
    }

    pub fn without_devices() -> Self {
        let mut driver = Self::new(Vec::new());
        driver.devices.clear();
        driver
    }

    pub fn with_devices(mut self, ids: &[&str]) -> Self {
        self.devices = ids
            .iter()
            .map(|id| DeviceInfo { id: id.to_string(), name: format!("Reader {}", id), serial_number: None })
            .collect();
        self
    }

    pub fn failing_open(mut self, reason: &str) -> Self {
        self.open_error = Some(reason.to_string());
        self
    }

    pub fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn capture_count(&self) -> usize {
        self.counters.captures.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

impl ReaderDriver for ScriptedDriver {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn FingerprintReader>> {
        if let Some(reason) = &self.open_error {
            return Err(FingerprintError::OpenFailed(reason.clone()));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedReader {
            info: device.clone(),
            script: Arc::clone(&self.script),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct ScriptedReader {
    info: DeviceInfo,
    script: Arc<Mutex<VecDeque<Result<CaptureSample>>>>,
    counters: Arc<Counters>,
}

impl FingerprintReader for ScriptedReader {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn capture(&mut self, _timeout: Duration) -> Result<CaptureSample> {
        self.counters.captures.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(CaptureSample::timed_out()))
    }

    fn close(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}
