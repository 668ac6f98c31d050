//! Data models module
//!
//! Defines the wire structures observed on monitored flows and the
//! session-level records derived from them

pub mod api;
pub mod session;
