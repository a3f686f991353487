//! Bridge Process Boundary: the command vocabulary shared by the helper
//! binary and the service, and the executor that runs it.

pub mod executor;
pub mod protocol;

pub use executor::Bridge;
pub use protocol::{BridgeCommand, BridgeResult, DeviceStatus, TemplateSummary};
