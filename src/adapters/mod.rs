//! Adapters for external systems.

pub mod openai;
pub mod scripted;
pub mod sqlite;
