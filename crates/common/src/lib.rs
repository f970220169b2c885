//! Common types, protocol definitions, and errors shared across `payment-svc` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
