use thiserror::Error;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("No fingerprint readers found")]
    NoDeviceFound,

    #[error("Failed to open reader: {0}")]
    OpenFailed(String),

    #[error("Reader error: {0}")]
    Device(String),

    #[error("Reader is busy with another request")]
    DeviceBusy,

    #[error("Feature extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Identity '{0}' already has a registered fingerprint")]
    AlreadyEnrolled(String),

    #[error("Invalid identity '{0}'")]
    InvalidIdentity(String),

    #[error("Failed to capture sample {sample} after {attempts} attempts")]
    EnrollmentFailed { sample: usize, attempts: u32 },

    #[error("Corrupt template {path}: {reason}")]
    CorruptTemplate { path: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Fingerprint helper not available: {0}")]
    BridgeUnavailable(String),

    #[error("Fingerprint helper timed out after {0}s")]
    BridgeTimeout(u64),

    #[error("Fingerprint helper protocol error: {0}")]
    BridgeProtocol(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl FingerprintError {
    /// Stable machine-readable code carried in the `error` field of results.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoDeviceFound | Self::OpenFailed(_) => "DEVICE_NOT_READY",
            Self::Device(_) => "DEVICE_ERROR",
            Self::DeviceBusy => "DEVICE_BUSY",
            Self::ExtractionFailed(_) => "EXTRACTION_FAILED",
            Self::AlreadyEnrolled(_) => "ALREADY_ENROLLED",
            Self::InvalidIdentity(_) => "INVALID_IDENTITY",
            Self::EnrollmentFailed { .. } => "ENROLLMENT_FAILED",
            Self::CorruptTemplate { .. } => "TEMPLATE_CORRUPT",
            Self::Storage(_) | Self::Io(_) | Self::Json(_) => "STORAGE_ERROR",
            Self::BridgeUnavailable(_) => "BRIDGE_UNAVAILABLE",
            Self::BridgeTimeout(_) => "BRIDGE_TIMEOUT",
            Self::BridgeProtocol(_) => "BRIDGE_PROTOCOL",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Image(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, FingerprintError>;
