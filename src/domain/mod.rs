//! Domain layer for the chatcheck run engine
//!
//! Run entities, the status state machine, and the ports through which the
//! engine reaches storage and the AI collaborators.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
