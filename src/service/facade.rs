use super::backend::{BridgeBackend, ProcessBridge};
use super::simulation::SimulatedBridge;
use crate::bridge::{BridgeCommand, BridgeResult};
use crate::common::config::Config;
use crate::common::FingerprintError;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    Real,
    Simulated,
}

/// Routes commands to the helper process or to the simulation.
///
/// The mode only ever moves from `Real` to `Simulated`: either at startup
/// when the helper is missing, or on the first failed spawn. It never
/// probes the helper again for the lifetime of this instance.
pub struct FingerprintService {
    mode: RwLock<BridgeMode>,
    real: Option<Arc<dyn BridgeBackend>>,
    simulation: Arc<dyn BridgeBackend>,
    device_slot: Semaphore,
    device_wait: Duration,
}

impl FingerprintService {
    pub fn new(
        real: Option<Arc<dyn BridgeBackend>>,
        simulation: Arc<dyn BridgeBackend>,
        device_wait: Duration,
    ) -> Self {
        let mode = if real.is_some() { BridgeMode::Real } else { BridgeMode::Simulated };
        Self {
            mode: RwLock::new(mode),
            real,
            simulation,
            device_slot: Semaphore::new(1),
            device_wait,
        }
    }

    /// Real mode when `helper` exists on disk, simulation otherwise.
    pub fn from_config(config: &Config, helper: PathBuf, config_path: Option<PathBuf>, dev: bool) -> Self {
        let simulation: Arc<dyn BridgeBackend> = Arc::new(SimulatedBridge::new(config.clone()));
        let device_wait = Duration::from_millis(config.service.device_lock_timeout_ms);

        if !helper.exists() {
            tracing::warn!("Fingerprint helper not found at {}", helper.display());
            tracing::warn!("Running in SIMULATION MODE; restart the service after installing the helper");
            return Self::new(None, simulation, device_wait);
        }

        tracing::info!("Fingerprint helper found at {}", helper.display());
        let process = ProcessBridge::new(helper, Duration::from_secs(config.service.helper_timeout_secs))
            .with_config_path(config_path)
            .with_dev(dev);
        Self::new(Some(Arc::new(process)), simulation, device_wait)
    }

    pub async fn mode(&self) -> BridgeMode {
        *self.mode.read().await
    }

    /// Always produces a structured result.
    pub async fn execute(&self, command: BridgeCommand) -> BridgeResult {
        if let (BridgeMode::Real, Some(real)) = (self.mode().await, &self.real) {
            let _permit = if command.needs_device() {
                match tokio::time::timeout(self.device_wait, self.device_slot.acquire()).await {
                    Ok(Ok(permit)) => Some(permit),
                    Ok(Err(_)) | Err(_) => {
                        tracing::warn!("Rejecting {}: reader busy", command.name());
                        return BridgeResult::from_error(&FingerprintError::DeviceBusy);
                    }
                }
            } else {
                None
            };

            match real.execute(&command).await {
                Ok(result) => return result,
                Err(FingerprintError::BridgeUnavailable(reason)) => {
                    tracing::error!("Failed to execute fingerprint helper: {}", reason);
                    self.enter_simulation().await;
                }
                Err(e) => {
                    tracing::error!("{} failed: {}", command.name(), e);
                    return BridgeResult::from_error(&e);
                }
            }
        }

        self.simulation
            .execute(&command)
            .await
            .unwrap_or_else(|e| BridgeResult::from_error(&e))
    }

    async fn enter_simulation(&self) {
        let mut mode = self.mode.write().await;
        if *mode == BridgeMode::Real {
            tracing::warn!("Falling back to SIMULATION MODE until restart");
            *mode = BridgeMode::Simulated;
        }
    }
}
