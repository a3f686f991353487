use super::{new_template_id, validate_identity, Template, TemplateStore, TEMPLATE_ID_PREFIX};
use crate::common::paths::TEMPLATE_EXTENSION;
use crate::common::{FingerprintError, Result};
use crate::core::extractor::Descriptor;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// On-disk layout of one `<identity>.fpt` file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateRecord {
    template_id: String,
    identity: String,
    descriptor: String,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
}

/// One JSON file per identity. Records are published with an atomic
/// no-clobber rename, so a reader never sees a half-written template and
/// two processes cannot both create the same identity.
pub struct FileTemplateStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTemplateStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!("Template store at {:?}", dir);
        Ok(Self { dir, write_lock: Mutex::new(()) })
    }

    fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", identity, TEMPLATE_EXTENSION))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| FingerprintError::Storage("template store lock poisoned".into()))
    }

    fn read_record(path: &Path) -> Result<Template> {
        let corrupt = |reason: String| FingerprintError::CorruptTemplate {
            path: path.display().to_string(),
            reason,
        };

        let contents = fs::read_to_string(path)?;
        let record: TemplateRecord = serde_json::from_str(&contents)
            .map_err(|e| corrupt(e.to_string()))?;
        let bytes = STANDARD
            .decode(record.descriptor.as_bytes())
            .map_err(|e| corrupt(format!("descriptor is not base64: {}", e)))?;

        if let Some(expected) = &record.digest {
            if *expected != digest_hex(&bytes) {
                return Err(corrupt("descriptor digest mismatch".into()));
            }
        }

        Ok(Template {
            template_id: record.template_id,
            identity: record.identity,
            descriptor: Descriptor::from_bytes(bytes),
            created_at: record.created_at,
        })
    }
}

impl TemplateStore for FileTemplateStore {
    fn save(&self, identity: &str, descriptor: &Descriptor) -> Result<String> {
        validate_identity(identity)?;
        let _guard = self.lock()?;

        let path = self.path_for(identity);
        if path.exists() {
            return Err(FingerprintError::AlreadyEnrolled(identity.to_string()));
        }

        let template_id = new_template_id(TEMPLATE_ID_PREFIX);
        let record = TemplateRecord {
            template_id: template_id.clone(),
            identity: identity.to_string(),
            descriptor: STANDARD.encode(descriptor.as_bytes()),
            created_at: Utc::now(),
            digest: Some(digest_hex(descriptor.as_bytes())),
        };
        let json = serde_json::to_vec_pretty(&record)?;

        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(&json)?;
        temp.as_file().sync_all()?;

        temp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                FingerprintError::AlreadyEnrolled(identity.to_string())
            } else {
                FingerprintError::Storage(format!("Failed to publish template: {}", e.error))
            }
        })?;

        tracing::info!("Stored template {} for {}", template_id, identity);
        Ok(template_id)
    }

    fn load(&self, identity: &str) -> Result<Option<Template>> {
        validate_identity(identity)?;
        let path = self.path_for(identity);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_record(&path).map(Some)
    }

    fn load_all(&self) -> Result<Vec<Template>> {
        let mut templates = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                continue;
            }
            match Self::read_record(&path) {
                Ok(template) => templates.push(template),
                Err(e) => tracing::warn!("Skipping unreadable template: {}", e),
            }
        }

        templates.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        Ok(templates)
    }

    fn delete(&self, identity: &str) -> Result<bool> {
        validate_identity(identity)?;
        let _guard = self.lock()?;

        match fs::remove_file(self.path_for(identity)) {
            Ok(()) => {
                tracing::info!("Deleted template for {}", identity);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
