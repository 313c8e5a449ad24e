//! Engine: configuration, tick loop and reporting

pub mod config;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod report;

pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, SettlementEngine, TickResult};
pub use report::EfficiencyReport;
