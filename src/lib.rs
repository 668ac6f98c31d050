//! Tokmeter Library
//!
//! Measures the token usage and monetary cost of LLM API calls a
//! monitored program makes, by observing its traffic through an
//! interception layer

pub mod config;
pub mod intercept;
pub mod models;
pub mod services;
pub mod utils;

// Re-export common types
pub use config::{MonitorSettings, PricingRule, PricingTable};
pub use intercept::{HttpIntercept, InterceptEvent, InterceptLayer};
pub use services::{BeamClient, CostCalculator, FlowCorrelator, HistoryStore, MonitorSession, MonitoredCommand};
pub use utils::error::{MonitorError, MonitorResult};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get version information
pub fn version_info() -> String {
    format!("{} v{} - {}", NAME, VERSION, DESCRIPTION)
}
