//! CLI command implementations.

pub mod baseline;
pub mod evaluation;
pub mod init;
pub mod run;
