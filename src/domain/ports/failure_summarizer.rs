//! Failure summarizer port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Compresses several failure reasons into a single human-readable one.
///
/// Callers only invoke this with two or more reasons.
#[async_trait]
pub trait FailureSummarizer: Send + Sync {
    /// One reason standing for all of `reasons`.
    async fn summarize(&self, reasons: &[String]) -> DomainResult<String>;
}
