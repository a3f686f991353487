use crate::common::{FingerprintError, Result};
use crate::reader::CaptureSample;
use image::imageops::{self, FilterType};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use ndarray::Array3;
use std::f32::consts::PI;

pub const DESCRIPTOR_VERSION: u8 = 1;
const MAGIC: [u8; 3] = *b"FPD";
const HEADER_LEN: usize = 6;

const NORMALIZED_SIZE: u32 = 128;
const GRID: usize = 8;
const BINS: usize = 8;
/// Each non-empty cell histogram is scaled to this total.
const CELL_MASS: f32 = 255.0;
const MIN_GRADIENT: f32 = 16.0;
/// Mean gradient magnitude per pixel for a cell to count as ridge area.
const MIN_CELL_ENERGY: f32 = 8.0;
const MIN_RIDGE_CELLS: f32 = 0.25;

/// Opaque match-ready feature data. Only the extractor and matcher look inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor(Vec<u8>);

impl Descriptor {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

pub trait FeatureExtractor: Send + Sync {
    /// Turns one capture into a descriptor. Failure is retryable.
    fn extract(&self, sample: &CaptureSample) -> Result<Descriptor>;

    /// Combines accepted enrollment samples into one enrollment descriptor.
    fn fuse(&self, samples: &[Descriptor]) -> Result<Descriptor>;
}

/// Per-cell ridge orientation histograms over a normalized image.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrientationExtractor;

impl OrientationExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureExtractor for OrientationExtractor {
    fn extract(&self, sample: &CaptureSample) -> Result<Descriptor> {
        let image = sample.image.as_ref().ok_or_else(|| {
            FingerprintError::ExtractionFailed("sample carries no image".into())
        })?;

        let resized = imageops::resize(image, NORMALIZED_SIZE, NORMALIZED_SIZE, FilterType::Triangle);
        let gx = horizontal_sobel(&resized);
        let gy = vertical_sobel(&resized);

        let cell = NORMALIZED_SIZE as usize / GRID;
        let mut cells = Array3::<f32>::zeros((GRID, GRID, BINS));

        for (x, y, dx) in gx.enumerate_pixels() {
            let dx = dx[0] as f32;
            let dy = gy.get_pixel(x, y)[0] as f32;
            let magnitude = (dx * dx + dy * dy).sqrt();
            if magnitude < MIN_GRADIENT {
                continue;
            }

            // Orientation modulo pi: a ridge edge and its opposite side share a bin
            let orientation = dy.atan2(dx).rem_euclid(PI);
            let bin = ((orientation / PI * BINS as f32) as usize).min(BINS - 1);
            cells[[y as usize / cell, x as usize / cell, bin]] += magnitude;
        }

        let min_cell_total = MIN_CELL_ENERGY * (cell * cell) as f32;
        let mut ridge_cells = 0usize;
        for mut histogram in cells.rows_mut() {
            let total: f32 = histogram.sum();
            if total >= min_cell_total {
                ridge_cells += 1;
                histogram.mapv_inplace(|v| v / total * CELL_MASS);
            } else {
                histogram.fill(0.0);
            }
        }

        if (ridge_cells as f32) < MIN_RIDGE_CELLS * (GRID * GRID) as f32 {
            return Err(FingerprintError::ExtractionFailed(format!(
                "insufficient ridge detail ({} of {} cells)", ridge_cells, GRID * GRID
            )));
        }

        Ok(CellHistograms { values: cells }.encode())
    }

    /// Element-wise average of the samples' histograms, renormalized per cell.
    fn fuse(&self, samples: &[Descriptor]) -> Result<Descriptor> {
        let first = samples.first().ok_or_else(|| {
            FingerprintError::ExtractionFailed("no samples to fuse".into())
        })?;
        let mut fused = CellHistograms::decode(first)?;

        for sample in &samples[1..] {
            let next = CellHistograms::decode(sample)?;
            if next.values.dim() != fused.values.dim() {
                return Err(FingerprintError::ExtractionFailed(
                    "enrollment samples have different descriptor shapes".into()
                ));
            }
            fused.values += &next.values;
        }

        for mut histogram in fused.values.rows_mut() {
            let total: f32 = histogram.sum();
            if total > 0.0 {
                histogram.mapv_inplace(|v| v / total * CELL_MASS);
            }
        }

        Ok(fused.encode())
    }
}

/// Decoded view of a v1 descriptor, indexed `[row, col, bin]`.
#[derive(Debug, Clone)]
pub(crate) struct CellHistograms {
    pub(crate) values: Array3<f32>,
}

impl CellHistograms {
    pub(crate) fn decode(descriptor: &Descriptor) -> Result<Self> {
        let bytes = descriptor.as_bytes();
        if bytes.len() < HEADER_LEN || bytes[..3] != MAGIC {
            return Err(FingerprintError::ExtractionFailed("not a fingerprint descriptor".into()));
        }
        if bytes[3] != DESCRIPTOR_VERSION {
            return Err(FingerprintError::ExtractionFailed(format!(
                "unsupported descriptor version {}", bytes[3]
            )));
        }

        let grid = bytes[4] as usize;
        let bins = bytes[5] as usize;
        let body = &bytes[HEADER_LEN..];
        if grid == 0 || bins == 0 || body.len() != grid * grid * bins {
            return Err(FingerprintError::ExtractionFailed("truncated descriptor".into()));
        }

        let values = Array3::from_shape_vec(
            (grid, grid, bins),
            body.iter().map(|&v| v as f32).collect(),
        )
        .map_err(|e| FingerprintError::ExtractionFailed(e.to_string()))?;

        Ok(Self { values })
    }

    pub(crate) fn encode(&self) -> Descriptor {
        let (grid, _, bins) = self.values.dim();
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.values.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.push(DESCRIPTOR_VERSION);
        bytes.push(grid as u8);
        bytes.push(bins as u8);
        bytes.extend(self.values.iter().map(|v| v.round().clamp(0.0, 255.0) as u8));
        Descriptor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{blank_image, ridge_sample, stripe_image, Stripes};
    use crate::reader::{CaptureQuality, CaptureSample};

    #[test]
    fn ridge_pattern_produces_v1_descriptor() {
        let descriptor = OrientationExtractor.extract(&ridge_sample(Stripes::Vertical)).unwrap();
        let bytes = descriptor.as_bytes();
        assert_eq!(&bytes[..4], b"FPD\x01");
        assert_eq!(bytes.len(), HEADER_LEN + GRID * GRID * BINS);
    }

    #[test]
    fn extraction_is_deterministic() {
        let a = OrientationExtractor.extract(&ridge_sample(Stripes::Horizontal)).unwrap();
        let b = OrientationExtractor.extract(&ridge_sample(Stripes::Horizontal)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn blank_capture_fails_extraction_even_if_marked_good() {
        let sample = CaptureSample::captured(blank_image(128), CaptureQuality::Good, 1.0);
        let err = OrientationExtractor.extract(&sample).unwrap_err();
        assert_eq!(err.code(), "EXTRACTION_FAILED");
    }

    #[test]
    fn timed_out_sample_cannot_be_extracted() {
        assert!(OrientationExtractor.extract(&CaptureSample::timed_out()).is_err());
    }

    #[test]
    fn fusing_identical_samples_is_identity() {
        let one = OrientationExtractor.extract(&ridge_sample(Stripes::Vertical)).unwrap();
        let fused = OrientationExtractor
            .fuse(&[one.clone(), one.clone(), one.clone(), one.clone()])
            .unwrap();
        assert_eq!(CellHistograms::decode(&fused).unwrap().values.dim(), (GRID, GRID, BINS));
        assert_eq!(fused, one);
    }

    #[test]
    fn fusion_rejects_foreign_descriptors() {
        let one = OrientationExtractor.extract(&ridge_sample(Stripes::Vertical)).unwrap();
        let foreign = Descriptor::from_bytes(b"not a template".to_vec());
        assert!(OrientationExtractor.fuse(&[one, foreign]).is_err());
        assert!(OrientationExtractor.fuse(&[]).is_err());
    }

    #[test]
    fn stripe_image_is_square() {
        let image = stripe_image(64, Stripes::Vertical);
        assert_eq!(image.dimensions(), (64, 64));
    }
}
