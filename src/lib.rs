//! Flux Deviation Library
//!
//! Acceptance checks for FluxAggregator price feeds: compares individual
//! oracle submissions with their round aggregate and flags the ones that
//! deviate beyond a per-feed threshold.

pub mod chain;
pub mod config;
pub mod error;
pub mod oracle;
pub mod report;
pub mod scenario;
pub mod types;

pub use error::{ContractCall, EventIterationError, OracleError};
