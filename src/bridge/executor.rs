use super::protocol::{BridgeCommand, BridgeResult, DeviceStatus, TemplateSummary};
use crate::common::config::Config;
use crate::common::{FingerprintError, Result};
use crate::core::enrollment::{EnrollmentOrchestrator, EnrollmentSettings};
use crate::core::extractor::{FeatureExtractor, OrientationExtractor};
use crate::core::identification::IdentificationOrchestrator;
use crate::core::matcher::{HistogramMatcher, MatchPolicy, Matcher};
use crate::core::progress::Progress;
use crate::reader::{ReaderDriver, ReaderGuard, V4lDriver};
use crate::storage::{FileTemplateStore, TemplateStore};
use std::path::PathBuf;
use std::time::Duration;

/// Runs one [`BridgeCommand`] against a reader and a template store.
/// The helper binary and the in-process simulation both go through here.
pub struct Bridge {
    driver: Box<dyn ReaderDriver>,
    extractor: Box<dyn FeatureExtractor>,
    matcher: Box<dyn Matcher>,
    store: Box<dyn TemplateStore>,
    config: Config,
    simulation: bool,
}

impl Bridge {
    pub fn new(
        driver: Box<dyn ReaderDriver>,
        extractor: Box<dyn FeatureExtractor>,
        matcher: Box<dyn Matcher>,
        store: Box<dyn TemplateStore>,
        config: Config,
    ) -> Self {
        Self { driver, extractor, matcher, store, config, simulation: false }
    }

    /// V4L2 reader, orientation descriptors and a file store.
    pub fn with_hardware(config: Config, templates_dir: PathBuf) -> Result<Self> {
        let store = FileTemplateStore::open(templates_dir)?;
        Ok(Self::new(
            Box::new(V4lDriver::new(&config.reader)),
            Box::new(OrientationExtractor::new()),
            Box::new(HistogramMatcher::new()),
            Box::new(store),
            config,
        ))
    }

    /// Marks every result as produced in simulation mode.
    pub fn simulated(mut self) -> Self {
        self.simulation = true;
        self
    }

    /// Never fails: errors become `success: false` results.
    pub fn execute(&self, command: &BridgeCommand, progress: &dyn Fn(&Progress)) -> BridgeResult {
        tracing::debug!("Executing {:?}", command);
        let result = match self.run(command, progress) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("{} failed: {}", command.name(), e);
                BridgeResult::from_error(&e)
            }
        };

        if self.simulation {
            result.with_simulation(true)
        } else {
            result
        }
    }

    fn run(&self, command: &BridgeCommand, progress: &dyn Fn(&Progress)) -> Result<BridgeResult> {
        match command {
            BridgeCommand::Status => self.status().map(BridgeResult::status),
            BridgeCommand::Enroll { identity } => {
                let settings = EnrollmentSettings::from_config(&self.config);
                EnrollmentOrchestrator::new(
                    self.driver.as_ref(),
                    self.extractor.as_ref(),
                    self.store.as_ref(),
                    settings,
                )
                .on_progress(progress)
                .enroll(identity)
                .map(BridgeResult::enrolled)
            }
            BridgeCommand::Verify { identity } => self
                .identification(progress)
                .verify(identity)
                .map(BridgeResult::match_outcome),
            BridgeCommand::Identify => self
                .identification(progress)
                .identify()
                .map(BridgeResult::match_outcome),
            BridgeCommand::Delete { identity } => {
                self.store.delete(identity).map(BridgeResult::deleted)
            }
            BridgeCommand::List => {
                let templates = self.store.load_all()?;
                Ok(BridgeResult::listing(templates.iter().map(TemplateSummary::from).collect()))
            }
        }
    }

    fn identification<'a>(&'a self, progress: &'a dyn Fn(&Progress)) -> IdentificationOrchestrator<'a> {
        IdentificationOrchestrator::new(
            self.driver.as_ref(),
            self.extractor.as_ref(),
            self.matcher.as_ref(),
            MatchPolicy::from_config(&self.config.matching),
            self.store.as_ref(),
            Duration::from_millis(self.config.reader.capture_timeout_ms),
        )
        .on_progress(progress)
    }

    /// Enumerates readers and probes the first one with an open/close cycle.
    fn status(&self) -> Result<DeviceStatus> {
        let devices = self.driver.list_devices()?;
        let Some(device) = devices.first() else {
            return Ok(DeviceStatus {
                connected: false,
                ready: false,
                name: "None".into(),
                serial_number: None,
                message: "No fingerprint readers connected".into(),
            });
        };

        let (ready, message) = match ReaderGuard::open_first(self.driver.as_ref()) {
            Ok(_guard) => (true, "Device is ready for fingerprint capture".to_string()),
            Err(FingerprintError::NoDeviceFound) => (false, "Reader disappeared during probe".to_string()),
            Err(e) => (false, e.to_string()),
        };

        Ok(DeviceStatus {
            connected: true,
            ready,
            name: device.name.clone(),
            serial_number: device.serial_number.clone(),
            message,
        })
    }
}
