//! Seller payout settlement
//!
//! The balance ledger's hardest subsystem: admin decisions on withdrawal
//! requests, the gateway transfer lifecycle, withholding tax recording,
//! and timeout reconciliation.

pub mod engine;
pub mod status_map;
pub mod sweeper;
pub mod types;
pub mod validation;

pub use engine::{PayoutEngine, PayoutOutcome};
pub use sweeper::Sweeper;
