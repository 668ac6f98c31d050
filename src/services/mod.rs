//! Service layer module
//!
//! Contains the flow correlator, streaming assembler, history store,
//! cost calculator, beam client, and the session coordinator

pub mod assembler;
pub mod beam;
pub mod correlator;
pub mod cost;
pub mod history;
pub mod monitor;

pub use beam::BeamClient;
pub use correlator::FlowCorrelator;
pub use cost::CostCalculator;
pub use history::HistoryStore;
pub use monitor::{MonitorSession, MonitoredCommand, SessionState};
