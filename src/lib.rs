// Core modules
pub mod bridge;
pub mod common;
pub mod core;
pub mod reader;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use bridge::{Bridge, BridgeCommand, BridgeResult};
pub use common::{Config, DataPaths, FingerprintError, Result};
pub use core::{Descriptor, MatchPolicy, MatchOutcome, Score};
pub use reader::{ReaderDriver, V4lDriver};
pub use service::{build_router, BridgeMode, FingerprintService};
pub use storage::{FileTemplateStore, MemoryTemplateStore, TemplateStore};
