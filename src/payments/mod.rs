//! Transfer gateway integration module
//!
//! Provides the unified contract the payout engine uses to move money out
//! through an external transfer provider, plus the concrete Paystack
//! implementation.

pub mod error;
pub mod providers;
pub mod traits;
pub mod types;
