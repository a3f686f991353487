use super::{new_template_id, validate_identity, Template, TemplateStore, TEMPLATE_ID_PREFIX};
use crate::common::{FingerprintError, Result};
use crate::core::extractor::Descriptor;
use chrono::Utc;
use std::sync::Mutex;

/// Process-local store; `load_all` returns templates in insertion order.
pub struct MemoryTemplateStore {
    templates: Mutex<Vec<Template>>,
    id_prefix: &'static str,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::with_id_prefix(TEMPLATE_ID_PREFIX)
    }

    pub fn with_id_prefix(id_prefix: &'static str) -> Self {
        Self { templates: Mutex::new(Vec::new()), id_prefix }
    }

    pub fn len(&self) -> usize {
        self.templates.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Template>>> {
        self.templates
            .lock()
            .map_err(|_| FingerprintError::Storage("template store lock poisoned".into()))
    }
}

impl Default for MemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn save(&self, identity: &str, descriptor: &Descriptor) -> Result<String> {
        validate_identity(identity)?;
        let mut templates = self.lock()?;
        if templates.iter().any(|t| t.identity == identity) {
            return Err(FingerprintError::AlreadyEnrolled(identity.to_string()));
        }

        let template_id = new_template_id(self.id_prefix);
        templates.push(Template {
            template_id: template_id.clone(),
            identity: identity.to_string(),
            descriptor: descriptor.clone(),
            created_at: Utc::now(),
        });
        Ok(template_id)
    }

    fn load(&self, identity: &str) -> Result<Option<Template>> {
        validate_identity(identity)?;
        Ok(self.lock()?.iter().find(|t| t.identity == identity).cloned())
    }

    fn load_all(&self) -> Result<Vec<Template>> {
        Ok(self.lock()?.clone())
    }

    fn delete(&self, identity: &str) -> Result<bool> {
        validate_identity(identity)?;
        let mut templates = self.lock()?;
        let before = templates.len();
        templates.retain(|t| t.identity != identity);
        Ok(templates.len() != before)
    }
}
