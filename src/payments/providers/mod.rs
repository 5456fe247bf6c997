//! Transfer provider implementations
//!
//! Concrete implementations of the TransferGateway trait.

pub mod paystack;

pub use paystack::PaystackGateway;
