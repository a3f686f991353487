use std::fmt;

/// Why a capture attempt did not produce a usable descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryReason {
    PoorQuality(f32),
    TimedOut,
    ExtractionFailed(String),
    DeviceError(String),
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoorQuality(score) => write!(f, "poor quality capture ({:.2})", score),
            Self::TimedOut => write!(f, "timeout, no finger detected"),
            Self::ExtractionFailed(reason) => write!(f, "failed to process fingerprint ({})", reason),
            Self::DeviceError(reason) => write!(f, "capture issue ({})", reason),
        }
    }
}

/// Human-readable orchestrator events. The helper prints these to stderr.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    PlaceFinger { sample: usize, of: usize },
    SampleAccepted { sample: usize, of: usize, quality: f32 },
    Retry { sample: usize, attempt: u32, max_attempts: u32, reason: RetryReason },
    Fusing,
    Scanning { purpose: &'static str },
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlaceFinger { sample, of } => {
                write!(f, "Capture {} of {} - Place finger on scanner...", sample, of)
            }
            Self::SampleAccepted { sample, of, quality } => {
                write!(f, "Sample {}/{} captured successfully (quality {:.2})", sample, of, quality)
            }
            Self::Retry { sample, attempt, max_attempts, reason } => write!(
                f,
                "Sample {}: {}, attempt {}/{}",
                sample, reason, attempt, max_attempts
            ),
            Self::Fusing => write!(f, "Creating enrollment template..."),
            Self::Scanning { purpose } => write!(f, "Place finger on scanner for {}...", purpose),
        }
    }
}

/// Progress sink that drops every event.
pub fn ignore(_: &Progress) {}
