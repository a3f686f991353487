//! Template Store: one durable template per identity.

pub mod file_store;
pub mod memory_store;

pub use file_store::FileTemplateStore;
pub use memory_store::MemoryTemplateStore;

use crate::common::{FingerprintError, Result};
use crate::core::extractor::Descriptor;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const TEMPLATE_ID_PREFIX: &str = "FP-";
const MAX_IDENTITY_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub template_id: String,
    pub identity: String,
    pub descriptor: Descriptor,
    pub created_at: DateTime<Utc>,
}

/// Implementations must make `save` an atomic check-then-write per identity.
pub trait TemplateStore: Send + Sync {
    /// Stores a new template and returns its id. Never overwrites: an
    /// existing record for `identity` fails with `AlreadyEnrolled`.
    fn save(&self, identity: &str, descriptor: &Descriptor) -> Result<String>;

    fn load(&self, identity: &str) -> Result<Option<Template>>;

    /// Every readable template, in a stable order.
    fn load_all(&self) -> Result<Vec<Template>>;

    /// Returns whether a record existed.
    fn delete(&self, identity: &str) -> Result<bool>;
}

/// Identities become file names, so only `[A-Za-z0-9._-]` is allowed
/// and a leading `.` is rejected.
pub fn validate_identity(identity: &str) -> Result<()> {
    let valid = !identity.is_empty()
        && identity.len() <= MAX_IDENTITY_LEN
        && !identity.starts_with('.')
        && identity
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(FingerprintError::InvalidIdentity(identity.to_string()))
    }
}

pub fn new_template_id(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4().simple())
}
