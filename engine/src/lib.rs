//! DiagnOStiX diagnostic execution engine
//!
//! Resolves a tool identifier to a native probe or an external script, runs
//! it under a deadline, normalizes what it printed and keeps the result as a
//! short-lived artifact.

pub mod artifacts;
pub mod config;
pub mod engine;
pub mod error;
pub mod external;
pub mod health;
pub mod logging;
pub mod normalize;
pub mod probes;
pub mod registry;
pub mod server;
pub mod sink;

pub use engine::{Engine, ExecutionRequest, ExecutionResult, ExitStatus};
pub use error::EngineError;
