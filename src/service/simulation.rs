//! Simulation Mode: the real bridge executor over a synthetic reader and
//! an in-memory store.
//!
//! Every capture is the same synthetic print, so verify matches any
//! enrolled identity and identify resolves to the first one enrolled. This
//! is a development affordance, not a security feature; every result is
//! flagged `simulation: true`.

use super::backend::BridgeBackend;
use crate::bridge::{Bridge, BridgeCommand, BridgeResult};
use crate::common::config::Config;
use crate::common::{FingerprintError, Result};
use crate::core::extractor::OrientationExtractor;
use crate::core::matcher::HistogramMatcher;
use crate::core::progress::Progress;
use crate::reader::{CaptureQuality, CaptureSample, DeviceInfo, FingerprintReader, ReaderDriver};
use crate::storage::MemoryTemplateStore;
use async_trait::async_trait;
use image::{GrayImage, Luma};
use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Duration;

pub const SIMULATED_TEMPLATE_PREFIX: &str = "FP-SIM-";
pub const SIMULATED_DEVICE_NAME: &str = "Simulated Fingerprint Reader";
const SIMULATION_STATUS_MESSAGE: &str =
    "Running in simulation mode - connect real device for production";

const PRINT_SIZE: u32 = 256;
const RIDGE_PERIOD: f32 = 14.0;

/// Concentric ridges around an off-center core, roughly a whorl.
fn synthetic_print() -> GrayImage {
    let (cx, cy) = (PRINT_SIZE as f32 * 0.48, PRINT_SIZE as f32 * 0.55);
    GrayImage::from_fn(PRINT_SIZE, PRINT_SIZE, |x, y| {
        let r = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        Luma([(128.0 + 100.0 * (2.0 * PI * r / RIDGE_PERIOD).sin()).round() as u8])
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedDriver;

impl ReaderDriver for SimulatedDriver {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo {
            id: "simulated0".into(),
            name: SIMULATED_DEVICE_NAME.into(),
            serial_number: Some("SIM-0000".into()),
        }])
    }

    fn open(&self, device: &DeviceInfo) -> Result<Box<dyn FingerprintReader>> {
        Ok(Box::new(SimulatedReader { info: device.clone() }))
    }
}

struct SimulatedReader {
    info: DeviceInfo,
}

impl FingerprintReader for SimulatedReader {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn capture(&mut self, _timeout: Duration) -> Result<CaptureSample> {
        Ok(CaptureSample::captured(synthetic_print(), CaptureQuality::Good, 1.0))
    }

    fn close(&mut self) {}
}

/// In-process backend used once the service is in simulation mode.
pub struct SimulatedBridge {
    bridge: Arc<Bridge>,
}

impl SimulatedBridge {
    pub fn new(config: Config) -> Self {
        let bridge = Bridge::new(
            Box::new(SimulatedDriver),
            Box::new(OrientationExtractor::new()),
            Box::new(HistogramMatcher::new()),
            Box::new(MemoryTemplateStore::with_id_prefix(SIMULATED_TEMPLATE_PREFIX)),
            config,
        )
        .simulated();
        Self { bridge: Arc::new(bridge) }
    }
}

fn log_progress(progress: &Progress) {
    tracing::info!("[simulation] {}", progress);
}

#[async_trait]
impl BridgeBackend for SimulatedBridge {
    async fn execute(&self, command: &BridgeCommand) -> Result<BridgeResult> {
        let bridge = Arc::clone(&self.bridge);
        let owned = command.clone();
        let mut result = tokio::task::spawn_blocking(move || bridge.execute(&owned, &log_progress))
            .await
            .map_err(|e| FingerprintError::Other(anyhow::anyhow!("simulation task failed: {}", e)))?;

        if *command == BridgeCommand::Status {
            result.message = Some(SIMULATION_STATUS_MESSAGE.into());
        }
        Ok(result)
    }
}
