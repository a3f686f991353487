use crate::common::config::Config;
use crate::common::{FingerprintError, Result};
use crate::core::extractor::{Descriptor, FeatureExtractor};
use crate::core::progress::{self, Progress, RetryReason};
use crate::reader::{with_reader, CaptureQuality, FingerprintReader, ReaderDriver};
use crate::storage::{validate_identity, TemplateStore};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct EnrollmentSettings {
    pub required_samples: usize,
    pub max_attempts_per_sample: u32,
    pub capture_timeout: Duration,
}

impl EnrollmentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            required_samples: config.enrollment.required_samples,
            max_attempts_per_sample: config.enrollment.max_attempts_per_sample,
            capture_timeout: Duration::from_millis(config.reader.capture_timeout_ms),
        }
    }
}

impl Default for EnrollmentSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub template_id: String,
    pub identity: String,
}

/// Builds one template from several live captures. All or nothing: the
/// store is only written after every sample was accepted and fused.
pub struct EnrollmentOrchestrator<'a> {
    driver: &'a dyn ReaderDriver,
    extractor: &'a dyn FeatureExtractor,
    store: &'a dyn TemplateStore,
    settings: EnrollmentSettings,
    progress: &'a dyn Fn(&Progress),
}

impl<'a> EnrollmentOrchestrator<'a> {
    pub fn new(
        driver: &'a dyn ReaderDriver,
        extractor: &'a dyn FeatureExtractor,
        store: &'a dyn TemplateStore,
        settings: EnrollmentSettings,
    ) -> Self {
        Self { driver, extractor, store, settings, progress: &progress::ignore }
    }

    pub fn on_progress(mut self, progress: &'a dyn Fn(&Progress)) -> Self {
        self.progress = progress;
        self
    }

    pub fn enroll(&self, identity: &str) -> Result<Enrollment> {
        validate_identity(identity)?;
        if self.store.load(identity)?.is_some() {
            return Err(FingerprintError::AlreadyEnrolled(identity.to_string()));
        }

        tracing::info!(
            "Enrolling {} ({} samples, {} attempts each)",
            identity, self.settings.required_samples, self.settings.max_attempts_per_sample
        );
        let samples = with_reader(self.driver, |reader| self.collect_samples(reader))?;

        (self.progress)(&Progress::Fusing);
        let descriptor = self.extractor.fuse(&samples)?;
        let template_id = self.store.save(identity, &descriptor)?;

        Ok(Enrollment { template_id, identity: identity.to_string() })
    }

    fn collect_samples(&self, reader: &mut dyn FingerprintReader) -> Result<Vec<Descriptor>> {
        let required = self.settings.required_samples;
        let max_attempts = self.settings.max_attempts_per_sample;
        let mut accepted = Vec::with_capacity(required);

        for sample in 1..=required {
            let mut attempt = 0;
            let descriptor = loop {
                if attempt == max_attempts {
                    tracing::warn!("Sample {} failed after {} attempts", sample, attempt);
                    return Err(FingerprintError::EnrollmentFailed { sample, attempts: attempt });
                }
                attempt += 1;

                (self.progress)(&Progress::PlaceFinger { sample, of: required });
                match self.attempt(reader) {
                    Ok((descriptor, quality)) => {
                        (self.progress)(&Progress::SampleAccepted { sample, of: required, quality });
                        break descriptor;
                    }
                    Err(reason) => {
                        tracing::debug!("Sample {} attempt {} rejected: {}", sample, attempt, reason);
                        (self.progress)(&Progress::Retry { sample, attempt, max_attempts, reason });
                    }
                }
            };
            accepted.push(descriptor);
        }

        Ok(accepted)
    }

    fn attempt(&self, reader: &mut dyn FingerprintReader) -> std::result::Result<(Descriptor, f32), RetryReason> {
        let sample = reader
            .capture(self.settings.capture_timeout)
            .map_err(|e| RetryReason::DeviceError(e.to_string()))?;

        match sample.quality {
            CaptureQuality::Good => {}
            CaptureQuality::Poor => return Err(RetryReason::PoorQuality(sample.quality_score)),
            CaptureQuality::TimedOut => return Err(RetryReason::TimedOut),
            CaptureQuality::Error => {
                return Err(RetryReason::DeviceError(format!("result code {}", sample.result_code)))
            }
        }

        let descriptor = self
            .extractor
            .extract(&sample)
            .map_err(|e| RetryReason::ExtractionFailed(e.to_string()))?;
        Ok((descriptor, sample.quality_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{device_error, frame_fault, good, poor, timed_out, ScriptedDriver, TagExtractor};
    use crate::storage::MemoryTemplateStore;
    use std::cell::RefCell;

    fn enroll(driver: &ScriptedDriver, store: &MemoryTemplateStore, identity: &str) -> Result<Enrollment> {
        EnrollmentOrchestrator::new(driver, &TagExtractor, store, EnrollmentSettings::default())
            .enroll(identity)
    }

    #[test]
    fn four_good_captures_enroll_once() {
        let store = MemoryTemplateStore::new();
        let driver = ScriptedDriver::new(vec![good(1), good(1), good(1), good(1)]);

        let enrollment = enroll(&driver, &store, "E-1").unwrap();
        assert!(enrollment.template_id.starts_with("FP-"));
        assert_eq!(enrollment.identity, "E-1");
        assert_eq!(driver.capture_count(), 4);
        assert_eq!(driver.close_count(), 1);

        let again = ScriptedDriver::new(vec![good(2), good(2), good(2), good(2)]);
        let err = enroll(&again, &store, "E-1").unwrap_err();
        assert_eq!(err.code(), "ALREADY_ENROLLED");
        assert_eq!(again.open_count(), 0);

        let stored = store.load("E-1").unwrap().unwrap();
        assert_eq!(stored.template_id, enrollment.template_id);
        assert_eq!(stored.descriptor.as_bytes(), &[1]);
    }

    #[test]
    fn timeout_counts_as_a_retry() {
        let store = MemoryTemplateStore::new();
        let driver = ScriptedDriver::new(vec![timed_out(), good(1), good(1), good(1), good(1)]);
        enroll(&driver, &store, "E-1").unwrap();
        assert_eq!(driver.capture_count(), 5);
    }

    #[test]
    fn every_failure_kind_is_retried() {
        let store = MemoryTemplateStore::new();
        let driver = ScriptedDriver::new(vec![
            poor(1), good(1),
            good(0), good(1),
            device_error(), good(1),
            timed_out(), frame_fault(), good(1),
        ]);
        enroll(&driver, &store, "E-1").unwrap();
        assert_eq!(driver.capture_count(), 9);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn exhausted_last_sample_leaves_no_template() {
        let store = MemoryTemplateStore::new();
        let driver = ScriptedDriver::new(vec![
            good(1), good(1), good(1),
            poor(1), good(0), timed_out(),
        ]);

        let err = enroll(&driver, &store, "E-1").unwrap_err();
        assert_eq!(err.code(), "ENROLLMENT_FAILED");
        assert_eq!(err.to_string(), "Failed to capture sample 4 after 3 attempts");
        assert_eq!(driver.capture_count(), 6);
        assert_eq!(driver.close_count(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn missing_reader_fails_fast() {
        let store = MemoryTemplateStore::new();
        let err = enroll(&ScriptedDriver::without_devices(), &store, "E-1").unwrap_err();
        assert_eq!(err.code(), "DEVICE_NOT_READY");

        let busy = ScriptedDriver::new(Vec::new()).failing_open("device or resource busy");
        assert_eq!(enroll(&busy, &store, "E-1").unwrap_err().code(), "DEVICE_NOT_READY");
        assert!(store.is_empty());
    }

    #[test]
    fn progress_reports_each_step() {
        let store = MemoryTemplateStore::new();
        let driver = ScriptedDriver::new(vec![good(1), timed_out(), good(1)]);
        let events = RefCell::new(Vec::new());
        let record = |p: &Progress| events.borrow_mut().push(p.clone());
        let settings = EnrollmentSettings { required_samples: 2, ..EnrollmentSettings::default() };

        EnrollmentOrchestrator::new(&driver, &TagExtractor, &store, settings)
            .on_progress(&record)
            .enroll("E-4")
            .unwrap();

        let events = events.into_inner();
        assert_eq!(events.first(), Some(&Progress::PlaceFinger { sample: 1, of: 2 }));
        assert!(events.contains(&Progress::Retry {
            sample: 2,
            attempt: 1,
            max_attempts: 3,
            reason: RetryReason::TimedOut,
        }));
        assert_eq!(events.last(), Some(&Progress::Fusing));
    }
}
