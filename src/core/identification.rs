use crate::common::Result;
use crate::core::extractor::{Descriptor, FeatureExtractor};
use crate::core::matcher::{MatchPolicy, Matcher, Score};
use crate::core::progress::{self, Progress, RetryReason};
use crate::reader::{with_reader, CaptureQuality, ReaderDriver};
use crate::storage::{Template, TemplateStore};
use std::time::Duration;

pub const NOT_ENROLLED_MESSAGE: &str = "No fingerprint template found for this identity";

/// Result of one verify or identify call. A negative result is not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub matched: bool,
    pub identity: Option<String>,
    pub score: Option<Score>,
    pub message: String,
}

impl MatchOutcome {
    fn no_match(message: impl Into<String>) -> Self {
        Self { matched: false, identity: None, score: None, message: message.into() }
    }
}

/// 1:1 verification and 1:N identification. Both capture exactly one live
/// sample per call and never write to the store.
pub struct IdentificationOrchestrator<'a> {
    driver: &'a dyn ReaderDriver,
    extractor: &'a dyn FeatureExtractor,
    matcher: &'a dyn Matcher,
    policy: MatchPolicy,
    store: &'a dyn TemplateStore,
    capture_timeout: Duration,
    progress: &'a dyn Fn(&Progress),
}

impl<'a> IdentificationOrchestrator<'a> {
    pub fn new(
        driver: &'a dyn ReaderDriver,
        extractor: &'a dyn FeatureExtractor,
        matcher: &'a dyn Matcher,
        policy: MatchPolicy,
        store: &'a dyn TemplateStore,
        capture_timeout: Duration,
    ) -> Self {
        Self {
            driver,
            extractor,
            matcher,
            policy,
            store,
            capture_timeout,
            progress: &progress::ignore,
        }
    }

    pub fn on_progress(mut self, progress: &'a dyn Fn(&Progress)) -> Self {
        self.progress = progress;
        self
    }

    pub fn verify(&self, identity: &str) -> Result<MatchOutcome> {
        let template = match self.store.load(identity)? {
            Some(template) => template,
            None => return Ok(MatchOutcome::no_match(NOT_ENROLLED_MESSAGE)),
        };

        let live = match self.capture_live("verification")? {
            Ok(live) => live,
            Err(reason) => return Ok(unusable_capture(reason)),
        };

        let result = self.policy.evaluate(self.matcher.compare(&template.descriptor, &live));
        tracing::info!("Verify {}: score {} matched {}", identity, result.score, result.matched);

        Ok(MatchOutcome {
            matched: result.matched,
            identity: result.matched.then(|| identity.to_string()),
            score: Some(result.score),
            message: if result.matched {
                "Fingerprint verified".to_string()
            } else {
                "Fingerprint does not match".to_string()
            },
        })
    }

    pub fn identify(&self) -> Result<MatchOutcome> {
        let templates = self.store.load_all()?;
        if templates.is_empty() {
            return Ok(MatchOutcome::no_match("No enrolled fingerprints"));
        }

        let live = match self.capture_live("identification")? {
            Ok(live) => live,
            Err(reason) => return Ok(unusable_capture(reason)),
        };

        let Some((best, score)) = self.best_candidate(&templates, &live) else {
            return Ok(MatchOutcome::no_match("No enrolled fingerprints"));
        };
        let result = self.policy.evaluate(score);
        tracing::info!(
            "Identify over {} templates: best {} score {} matched {}",
            templates.len(), best.identity, result.score, result.matched
        );

        if result.matched {
            Ok(MatchOutcome {
                matched: true,
                identity: Some(best.identity.clone()),
                score: Some(result.score),
                message: format!("Identified {}", best.identity),
            })
        } else {
            Ok(MatchOutcome {
                matched: false,
                identity: None,
                score: Some(result.score),
                message: "No matching fingerprint found".to_string(),
            })
        }
    }

    /// Lowest score wins; on ties the earlier template is kept.
    fn best_candidate<'t>(&self, templates: &'t [Template], live: &Descriptor) -> Option<(&'t Template, Score)> {
        let mut best: Option<(&Template, Score)> = None;
        for template in templates {
            let score = self.matcher.compare(&template.descriptor, live);
            tracing::debug!("  {} -> {}", template.identity, score);
            if best.map_or(true, |(_, current)| score < current) {
                best = Some((template, score));
            }
        }
        best
    }

    /// Outer error: reader unavailable or failed. Inner error: the capture
    /// happened but is not usable for matching.
    fn capture_live(&self, purpose: &'static str) -> Result<std::result::Result<Descriptor, RetryReason>> {
        (self.progress)(&Progress::Scanning { purpose });
        let sample = with_reader(self.driver, |reader| reader.capture(self.capture_timeout))?;

        let usable = match sample.quality {
            CaptureQuality::Good => self
                .extractor
                .extract(&sample)
                .map_err(|e| RetryReason::ExtractionFailed(e.to_string())),
            CaptureQuality::Poor => Err(RetryReason::PoorQuality(sample.quality_score)),
            CaptureQuality::TimedOut => Err(RetryReason::TimedOut),
            CaptureQuality::Error => {
                Err(RetryReason::DeviceError(format!("result code {}", sample.result_code)))
            }
        };
        Ok(usable)
    }
}

fn unusable_capture(reason: RetryReason) -> MatchOutcome {
    tracing::info!("Live capture unusable: {}", reason);
    MatchOutcome::no_match(format!("No usable fingerprint captured: {}", reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::DEFAULT_FAR_THRESHOLD;
    use crate::core::testing::{device_error, frame_fault, good, poor, ScriptedDriver, TableMatcher, TagExtractor};
    use crate::storage::MemoryTemplateStore;

    const TIMEOUT: Duration = Duration::from_millis(10_000);

    fn store_with(entries: &[(&str, u8)]) -> MemoryTemplateStore {
        let store = MemoryTemplateStore::new();
        for (identity, tag) in entries {
            store.save(identity, &Descriptor::from_bytes(vec![*tag])).unwrap();
        }
        store
    }

    fn orchestrator<'a>(
        driver: &'a ScriptedDriver,
        matcher: &'a TableMatcher,
        store: &'a MemoryTemplateStore,
    ) -> IdentificationOrchestrator<'a> {
        IdentificationOrchestrator::new(
            driver,
            &TagExtractor,
            matcher,
            MatchPolicy::new(DEFAULT_FAR_THRESHOLD),
            store,
            TIMEOUT,
        )
    }

    #[test]
    fn verify_without_template_is_a_plain_no_match() {
        let store = MemoryTemplateStore::new();
        let driver = ScriptedDriver::new(vec![good(7)]);
        let matcher = TableMatcher::default();

        let outcome = orchestrator(&driver, &matcher, &store).verify("E-2").unwrap();
        assert!(!outcome.matched);
        assert_eq!(outcome.message, NOT_ENROLLED_MESSAGE);
        assert_eq!(driver.open_count(), 0);
    }

    #[test]
    fn identify_picks_lowest_score_under_threshold() {
        let store = store_with(&[("E-1", 1), ("E-3", 3)]);
        let driver = ScriptedDriver::new(vec![good(7)]);
        let matcher = TableMatcher::default().with(1, 7, 15_000).with(3, 7, 40_000);

        let outcome = orchestrator(&driver, &matcher, &store).identify().unwrap();
        assert!(outcome.matched);
        assert_eq!(outcome.identity.as_deref(), Some("E-1"));
        assert_eq!(outcome.score, Some(Score::new(15_000)));
        assert_eq!(driver.capture_count(), 1);
    }

    #[test]
    fn best_candidate_above_threshold_is_not_returned() {
        let store = store_with(&[("E-1", 1)]);
        let driver = ScriptedDriver::new(vec![good(7)]);
        let matcher = TableMatcher::default().with(1, 7, 30_000);

        let outcome = orchestrator(&driver, &matcher, &store).identify().unwrap();
        assert!(!outcome.matched);
        assert_eq!(outcome.identity, None);
        assert_eq!(outcome.score, Some(Score::new(30_000)));
    }

    #[test]
    fn identify_with_empty_store_never_captures() {
        let store = MemoryTemplateStore::new();
        let driver = ScriptedDriver::new(vec![good(7)]);
        let matcher = TableMatcher::default();

        let outcome = orchestrator(&driver, &matcher, &store).identify().unwrap();
        assert!(!outcome.matched);
        assert_eq!(driver.capture_count(), 0);
        assert_eq!(driver.open_count(), 0);
    }

    #[test]
    fn one_capture_serves_every_comparison() {
        let store = store_with(&[("E-1", 1), ("E-2", 2), ("E-3", 3), ("E-4", 4)]);
        let driver = ScriptedDriver::new(vec![good(7), good(7)]);
        let matcher = TableMatcher::default().with(4, 7, 100);

        let outcome = orchestrator(&driver, &matcher, &store).identify().unwrap();
        assert_eq!(outcome.identity.as_deref(), Some("E-4"));
        assert_eq!(driver.capture_count(), 1);
        assert_eq!(driver.close_count(), 1);
    }

    #[test]
    fn ties_go_to_the_first_template() {
        let store = store_with(&[("E-5", 5), ("E-6", 6)]);
        let driver = ScriptedDriver::new(vec![good(7)]);
        let matcher = TableMatcher::default().with(5, 7, 900).with(6, 7, 900);

        let outcome = orchestrator(&driver, &matcher, &store).identify().unwrap();
        assert_eq!(outcome.identity.as_deref(), Some("E-5"));
    }

    #[test]
    fn repeated_verify_is_stable_and_read_only() {
        let store = store_with(&[("E-1", 1)]);
        let driver = ScriptedDriver::new(vec![good(9), good(9), good(9)]);
        let matcher = TableMatcher::default().with(1, 9, 50_000);
        let orchestrator = orchestrator(&driver, &matcher, &store);

        let before = store.load_all().unwrap();
        let outcomes: Vec<_> = (0..3).map(|_| orchestrator.verify("E-1").unwrap()).collect();

        for outcome in &outcomes {
            assert!(!outcome.matched);
            assert_eq!(outcome.score, Some(Score::new(50_000)));
        }
        assert_eq!(store.load_all().unwrap(), before);
    }

    #[test]
    fn poor_live_capture_is_a_no_match_not_an_error() {
        let store = store_with(&[("E-1", 1)]);
        let driver = ScriptedDriver::new(vec![poor(1)]);
        let matcher = TableMatcher::default().with(1, 1, 0);

        let outcome = orchestrator(&driver, &matcher, &store).verify("E-1").unwrap();
        assert!(!outcome.matched);
        assert_eq!(outcome.score, None);
        assert_eq!(driver.capture_count(), 1);
    }

    #[test]
    fn undecodable_frame_is_a_no_match() {
        let store = store_with(&[("E-1", 1)]);
        let driver = ScriptedDriver::new(vec![frame_fault()]);
        let matcher = TableMatcher::default().with(1, 1, 0);

        let outcome = orchestrator(&driver, &matcher, &store).identify().unwrap();
        assert!(!outcome.matched);
        assert!(outcome.message.contains("result code 2"));
        assert_eq!(driver.close_count(), 1);
    }

    #[test]
    fn reader_failures_surface_as_errors() {
        let store = store_with(&[("E-1", 1)]);
        let matcher = TableMatcher::default();

        let driver = ScriptedDriver::new(vec![device_error()]);
        let err = orchestrator(&driver, &matcher, &store).identify().unwrap_err();
        assert_eq!(err.code(), "DEVICE_ERROR");
        assert_eq!(driver.close_count(), 1);

        let absent = ScriptedDriver::without_devices();
        let err = orchestrator(&absent, &matcher, &store).verify("E-1").unwrap_err();
        assert_eq!(err.code(), "DEVICE_NOT_READY");
    }
}
