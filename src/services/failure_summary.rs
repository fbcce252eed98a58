//! Combining several failure reasons into one status_info string.

use crate::domain::ports::FailureSummarizer;

/// Reduce `reasons` to a single string.
///
/// One reason passes through unchanged; several go to the summarizer. A
/// summarizer failure falls back to joining the reasons and never fails the
/// caller.
pub async fn summarize_reasons(summarizer: &dyn FailureSummarizer, reasons: &[String]) -> Option<String> {
    match reasons {
        [] => None,
        [only] => Some(only.clone()),
        several => match summarizer.summarize(several).await {
            Ok(summary) if !summary.trim().is_empty() => Some(summary),
            Ok(_) => Some(several.join("; ")),
            Err(e) => {
                tracing::warn!(error = %e, reasons = several.len(), "Failure summarizer unavailable, joining reasons");
                Some(several.join("; "))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::scripted::JoiningSummarizer;
    use crate::domain::errors::{DomainError, DomainResult};
    use async_trait::async_trait;

    struct BrokenSummarizer;

    #[async_trait]
    impl FailureSummarizer for BrokenSummarizer {
        async fn summarize(&self, _reasons: &[String]) -> DomainResult<String> {
            Err(DomainError::ExecutionFailed("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_single_reason_passes_through() {
        let reasons = vec!["greeting was rude".to_string()];
        let summary = summarize_reasons(&BrokenSummarizer, &reasons).await;
        assert_eq!(summary.as_deref(), Some("greeting was rude"));
    }

    #[tokio::test]
    async fn test_no_reasons() {
        assert_eq!(summarize_reasons(&JoiningSummarizer, &[]).await, None);
    }

    #[tokio::test]
    async fn test_summarizer_failure_falls_back_to_join() {
        let reasons = vec!["a".to_string(), "b".to_string()];
        let summary = summarize_reasons(&BrokenSummarizer, &reasons).await;
        assert_eq!(summary.as_deref(), Some("a; b"));
    }
}
