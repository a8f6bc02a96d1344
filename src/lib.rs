// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod kind;
pub mod logging;
pub mod recorder;
pub mod response;
pub mod runtime;
pub mod source;
pub mod stimulus;
pub mod store;

pub use controller::{SequenceController, SessionEvent, SessionState, SessionStatus, SessionSummary};
pub use error::{DrillError, InsufficientPool, PersistFailure, Result};
pub use kind::{Phase, TestConfig, TestKind};
