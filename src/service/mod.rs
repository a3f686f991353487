//! Local Service Façade.

pub mod backend;
pub mod facade;
pub mod routes;
pub mod simulation;

pub use backend::{BridgeBackend, ProcessBridge};
pub use facade::{BridgeMode, FingerprintService};
pub use routes::build_router;
pub use simulation::SimulatedBridge;
