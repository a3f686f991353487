use crate::common::{FingerprintError, Result};
use crate::common::config::ReaderConfig;
use crate::core::quality::QualityAssessment;
use crate::reader::{CaptureSample, DeviceInfo, FingerprintReader, ReaderDriver, RESULT_DEVICE_FAILURE};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};
use image::{GrayImage, ImageBuffer, Luma};
use std::fs;
use std::io;
use std::time::{Duration, Instant};

const GREY: [u8; 4] = *b"GREY";
const Y8: [u8; 4] = *b"Y8  ";
const Y16: [u8; 4] = *b"Y16 ";
const YUYV: [u8; 4] = *b"YUYV";

fn is_supported(fourcc: &FourCC) -> bool {
    matches!(fourcc.repr, GREY | Y8 | Y16 | YUYV)
}

/// Optical readers that enumerate as V4L2 capture devices.
pub struct V4lDriver {
    config: ReaderConfig,
}

impl V4lDriver {
    pub fn new(config: &ReaderConfig) -> Self {
        Self { config: config.clone() }
    }
}

impl ReaderDriver for V4lDriver {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut devices = Vec::new();

        // Scan /dev/video* devices
        for entry in fs::read_dir("/dev")? {
            let entry = entry?;
            let path = entry.path();
            let filename = path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("");

            let index = match filename.strip_prefix("video").and_then(|s| s.parse::<u32>().ok()) {
                Some(index) => index,
                None => continue,
            };

            let device = match Device::with_path(&path) {
                Ok(device) => device,
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            let caps = match device.query_caps() {
                Ok(caps) => caps,
                Err(_) => continue,
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }

            // Fingerprint sensors deliver grayscale (or at least luma) frames
            let formats = device.enum_formats().unwrap_or_default();
            if !formats.iter().any(|fmt| is_supported(&fmt.fourcc)) {
                continue;
            }

            devices.push((index, DeviceInfo {
                id: path.display().to_string(),
                name: caps.card.clone(),
                serial_number: Some(caps.bus.clone()).filter(|bus| !bus.is_empty()),
            }));
        }

        // Sort by index so the first reader is stable across calls
        devices.sort_by_key(|(index, _)| *index);
        Ok(devices.into_iter().map(|(_, info)| info).collect())
    }

    fn open(&self, info: &DeviceInfo) -> Result<Box<dyn FingerprintReader>> {
        let device = Device::with_path(&info.id)
            .map_err(|e| FingerprintError::OpenFailed(format!("{}: {}", info.id, e)))?;

        lock_exclusive(&device, &info.id)?;

        let mut fmt = device.format()
            .map_err(|e| FingerprintError::OpenFailed(format!("Failed to get format: {}", e)))?;

        if self.config.width > 0 && self.config.height > 0 {
            fmt.width = self.config.width;
            fmt.height = self.config.height;
        }

        // Prefer native grayscale when the sensor offers it
        let formats = device.enum_formats().unwrap_or_default();
        if formats.iter().any(|f| f.fourcc.repr == GREY) {
            fmt.fourcc = FourCC::new(&GREY);
        }

        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format on {}: {}. Using device defaults.", info.id, e);
        }

        let format = device.format()
            .map_err(|e| FingerprintError::OpenFailed(format!("Failed to get final format: {}", e)))?;

        if !is_supported(&format.fourcc) {
            return Err(FingerprintError::OpenFailed(format!(
                "Unsupported pixel format {} on {}",
                format.fourcc.str().unwrap_or("UNKNOWN"), info.id
            )));
        }

        tracing::debug!(
            "Reader {} opened at {}x{} {}",
            info.id, format.width, format.height, format.fourcc.str().unwrap_or("?")
        );

        Ok(Box::new(V4lReader {
            device,
            info: info.clone(),
            format,
            config: self.config.clone(),
        }))
    }
}

/// Advisory lock on the device fd. The kernel drops it when the fd closes,
/// including when the process is killed.
fn lock_exclusive(device: &Device, id: &str) -> Result<()> {
    let fd = device.handle().fd();
    // SAFETY: fd is owned by `device` and stays open for the duration of the call.
    let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(FingerprintError::OpenFailed(format!(
            "{} is in use by another session: {}", id, err
        )));
    }
    Ok(())
}

pub struct V4lReader {
    device: Device,
    info: DeviceInfo,
    format: v4l::Format,
    config: ReaderConfig,
}

impl FingerprintReader for V4lReader {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn capture(&mut self, timeout: Duration) -> Result<CaptureSample> {
        let started = Instant::now();

        let mut stream = v4l::io::mmap::Stream::with_buffers(&mut self.device, Type::VideoCapture, 4)
            .map_err(|e| FingerprintError::Device(format!("Failed to create stream: {}", e)))?;

        // Each dequeue polls for at most the time left, so a stalled sensor
        // still ends in a timed-out sample.
        for _ in 0..self.config.warmup_frames {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Ok(CaptureSample::timed_out());
            }
            stream.set_timeout(remaining);
            if frame_or_timeout(stream.next(), "warmup frame")?.is_none() {
                return Ok(CaptureSample::timed_out());
            }
        }

        loop {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Ok(CaptureSample::timed_out());
            }
            stream.set_timeout(remaining);

            let Some((buf, _meta)) = frame_or_timeout(stream.next(), "frame")? else {
                return Ok(CaptureSample::timed_out());
            };
            let image = match frame_to_gray(buf, &self.format) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!("Dropping capture from {}: {}", self.info.id, e);
                    return Ok(CaptureSample::failed(RESULT_DEVICE_FAILURE));
                }
            };

            let assessment = QualityAssessment::assess(&image, self.config.presence_threshold);
            if !assessment.finger_present() {
                continue;
            }

            let quality = assessment.classify(self.config.min_quality);
            tracing::debug!("Finger detected: {}", assessment.describe());
            return Ok(CaptureSample::captured(image, quality, assessment.overall_score));
        }
    }

    fn close(&mut self) {
        // The fd (and its flock) is released when `device` drops
        tracing::trace!("Closing reader {}", self.info.id);
    }
}

/// `Ok(None)` when the poll deadline passed without a frame.
fn frame_or_timeout<T>(next: io::Result<T>, what: &str) -> Result<Option<T>> {
    match next {
        Ok(frame) => Ok(Some(frame)),
        Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
        Err(e) => Err(FingerprintError::Device(format!("Failed to capture {}: {}", what, e))),
    }
}

fn frame_to_gray(data: &[u8], format: &v4l::Format) -> Result<GrayImage> {
    let pixels = (format.width * format.height) as usize;

    let luma: Vec<u8> = match format.fourcc.repr {
        GREY | Y8 => data.get(..pixels).map(|s| s.to_vec()),
        // Little-endian 16-bit samples, keep the high byte
        Y16 => (data.len() >= pixels * 2)
            .then(|| data.chunks_exact(2).take(pixels).map(|px| px[1]).collect()),
        // Y0 U Y1 V, luma at even offsets
        YUYV => (data.len() >= pixels * 2)
            .then(|| data.iter().step_by(2).take(pixels).copied().collect()),
        _ => None,
    }
    .ok_or_else(|| FingerprintError::Device(format!(
        "Short or unsupported frame ({} bytes for {}x{} {})",
        data.len(), format.width, format.height, format.fourcc.str().unwrap_or("?")
    )))?;

    ImageBuffer::<Luma<u8>, _>::from_raw(format.width, format.height, luma)
        .ok_or_else(|| FingerprintError::Device("Failed to create grayscale image buffer".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(fourcc: &[u8; 4], width: u32, height: u32) -> v4l::Format {
        v4l::Format::new(width, height, FourCC::new(fourcc))
    }

    #[test]
    fn yuyv_frames_keep_luma_only() {
        let data = [10, 200, 20, 201, 30, 202, 40, 203];
        let image = frame_to_gray(&data, &format(b"YUYV", 2, 2)).unwrap();
        assert_eq!(image.as_raw(), &vec![10, 20, 30, 40]);
    }

    #[test]
    fn y16_frames_keep_high_byte() {
        let data = [0x01, 0x80, 0xff, 0x10];
        let image = frame_to_gray(&data, &format(b"Y16 ", 2, 1)).unwrap();
        assert_eq!(image.as_raw(), &vec![0x80, 0x10]);
    }

    #[test]
    fn poll_timeout_ends_the_wait_without_error() {
        let stalled: io::Result<u8> = Err(io::Error::new(io::ErrorKind::TimedOut, "VIDIOC_DQBUF"));
        assert!(frame_or_timeout(stalled, "frame").unwrap().is_none());

        assert_eq!(frame_or_timeout(Ok(7u8), "frame").unwrap(), Some(7));
    }

    #[test]
    fn other_stream_failures_are_device_errors() {
        let unplugged: io::Result<u8> = Err(io::Error::new(io::ErrorKind::Other, "ENODEV"));
        let err = frame_or_timeout(unplugged, "frame").unwrap_err();
        assert_eq!(err.code(), "DEVICE_ERROR");
    }

    #[test]
    fn short_frames_are_device_errors() {
        let err = frame_to_gray(&[0; 3], &format(b"GREY", 2, 2)).unwrap_err();
        assert_eq!(err.code(), "DEVICE_ERROR");
    }
}
