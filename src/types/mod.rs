//! Shared data structures for the digital-twin orchestration core
//!
//! - Telemetry: Reading, PersonnelStatus, StateVector, unit activity
//! - Decision: policy action, shadow verdict, the Decision record
//! - Events: live-feed wire messages

mod decision;
mod events;
mod telemetry;

pub use decision::*;
pub use events::*;
pub use telemetry::*;
