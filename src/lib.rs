//! Sokoni backend: seller balance ledger and payout settlement engine
//!
//! Moves money out of seller balances through an external transfer
//! gateway: admin approval/rejection/reversal of withdrawal requests,
//! withholding tax recording, an append-only ledger log, and a background
//! sweeper that refunds requests the gateway never resolves.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod notifications;
pub mod payments;
pub mod payouts;

pub use config::Config;
pub use error::{AppError, AppResult};
