use crate::reader::CaptureQuality;
use image::GrayImage;

const BLOCK_SIZE: u32 = 16;
/// Fraction of ridge blocks below which no finger is considered present.
const MIN_COVERAGE: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct QualityAssessment {
    pub brightness_score: f32,
    pub contrast_score: f32,
    /// Fraction of blocks carrying ridge texture.
    pub coverage: f32,
    pub overall_score: f32,
}

impl QualityAssessment {
    /// `presence_threshold` is the local standard deviation, as a fraction of
    /// 64 grey levels, that a block needs to count as ridge texture.
    pub fn assess(image: &GrayImage, presence_threshold: f32) -> Self {
        let (mean, std_dev) = mean_and_std(image, 0, 0, image.width(), image.height());

        // Normalize brightness score (ideal mean around 127.5 for 8-bit images)
        let brightness_score = 1.0 - ((mean - 127.5).abs() / 127.5).min(1.0);
        // 64 is a reasonable std dev for good contrast
        let contrast_score = (std_dev / 64.0).min(1.0);

        let coverage = ridge_coverage(image, presence_threshold * 64.0);

        let overall_score = brightness_score * 0.2
            + contrast_score * 0.3
            + coverage * 0.5;

        Self {
            brightness_score,
            contrast_score,
            coverage,
            overall_score,
        }
    }

    pub fn finger_present(&self) -> bool {
        self.coverage >= MIN_COVERAGE
    }

    pub fn classify(&self, min_quality: f32) -> CaptureQuality {
        if self.overall_score >= min_quality {
            CaptureQuality::Good
        } else {
            CaptureQuality::Poor
        }
    }

    pub fn describe(&self) -> String {
        let quality_level = if self.overall_score >= 0.8 {
            "Excellent"
        } else if self.overall_score >= 0.6 {
            "Good"
        } else if self.overall_score >= 0.4 {
            "Poor"
        } else {
            "Very Poor"
        };

        format!(
            "Quality: {} (score: {:.2}, coverage: {:.0}%)",
            quality_level, self.overall_score, self.coverage * 100.0
        )
    }
}

fn ridge_coverage(image: &GrayImage, min_std_dev: f32) -> f32 {
    let blocks_x = image.width() / BLOCK_SIZE;
    let blocks_y = image.height() / BLOCK_SIZE;
    let total = blocks_x * blocks_y;
    if total == 0 {
        return 0.0;
    }

    let mut ridge_blocks = 0u32;
    for by in 0..blocks_y {
        for bx in 0..blocks_x {
            let (_, std_dev) = mean_and_std(
                image,
                bx * BLOCK_SIZE,
                by * BLOCK_SIZE,
                (bx + 1) * BLOCK_SIZE,
                (by + 1) * BLOCK_SIZE,
            );
            if std_dev > min_std_dev {
                ridge_blocks += 1;
            }
        }
    }

    ridge_blocks as f32 / total as f32
}

fn mean_and_std(image: &GrayImage, x1: u32, y1: u32, x2: u32, y2: u32) -> (f32, f32) {
    let mut sum = 0u64;
    let mut sum_sq = 0u64;
    let mut count = 0u64;

    for y in y1..y2.min(image.height()) {
        for x in x1..x2.min(image.width()) {
            let pixel = image.get_pixel(x, y)[0] as u64;
            sum += pixel;
            sum_sq += pixel * pixel;
            count += 1;
        }
    }

    if count == 0 {
        return (0.0, 0.0);
    }

    let mean = sum as f32 / count as f32;
    let variance = ((sum_sq as f32 / count as f32) - (mean * mean)).max(0.0);
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{blank_image, stripe_image, Stripes};

    #[test]
    fn blank_platen_has_no_finger() {
        let assessment = QualityAssessment::assess(&blank_image(128), 0.15);
        assert_eq!(assessment.coverage, 0.0);
        assert!(!assessment.finger_present());
        assert_eq!(assessment.classify(0.5), CaptureQuality::Poor);
    }

    #[test]
    fn full_ridge_pattern_is_good() {
        let assessment = QualityAssessment::assess(&stripe_image(128, Stripes::Vertical), 0.15);
        assert!(assessment.finger_present());
        assert!(assessment.coverage > 0.99);
        assert_eq!(assessment.classify(0.5), CaptureQuality::Good);
    }
}
