//! Configuration module

pub mod pricing;
pub mod settings;

pub use pricing::{PricingRule, PricingTable};
pub use settings::MonitorSettings;
