//! Failure summarizer backed by chat completions.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::client::{ChatMessage, OpenAiClient};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::FailureSummarizer;

const SYSTEM_PROMPT: &str = "Summarize the following reasons why a test failed into a single sentence. Respond only \
with JSON of the form {\"summary\": \"...\"}.";

/// Failure summarizer backed by a chat completions model.
pub struct OpenAiSummarizer {
    client: Arc<OpenAiClient>,
}

impl OpenAiSummarizer {
    /// Summarizer sending requests through `client`.
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FailureSummarizer for OpenAiSummarizer {
    async fn summarize(&self, reasons: &[String]) -> DomainResult<String> {
        if let [only] = reasons {
            return Ok(only.clone());
        }

        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(reasons.join("\n"))];
        let value = self.client.complete_json(&messages).await?;
        value
            .get("summary")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|summary| !summary.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DomainError::UnparseableResponse(format!("no summary in {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::openai::client::test_support::{completion_body, config};
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn test_summarizes_several_reasons() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("wrong refund window".to_string()))
            .with_status(200)
            .with_body(completion_body(&json!({ "summary": "Terse and wrong about refunds." })))
            .create_async()
            .await;
        let summarizer = OpenAiSummarizer::new(Arc::new(OpenAiClient::new(&config(server.url())).unwrap()));

        let reasons = vec!["too terse".to_string(), "wrong refund window".to_string()];
        assert_eq!(summarizer.summarize(&reasons).await.unwrap(), "Terse and wrong about refunds.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_single_reason_skips_the_model() {
        let mut server = Server::new_async().await;
        let mock = server.mock("POST", "/chat/completions").expect(0).create_async().await;
        let summarizer = OpenAiSummarizer::new(Arc::new(OpenAiClient::new(&config(server.url())).unwrap()));

        let reasons = vec!["too terse".to_string()];
        assert_eq!(summarizer.summarize(&reasons).await.unwrap(), "too terse");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_blank_summary_is_unparseable() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion_body(&json!({ "summary": "  " })))
            .create_async()
            .await;
        let summarizer = OpenAiSummarizer::new(Arc::new(OpenAiClient::new(&config(server.url())).unwrap()));

        let reasons = vec!["a".to_string(), "b".to_string()];
        assert!(matches!(
            summarizer.summarize(&reasons).await,
            Err(DomainError::UnparseableResponse(_))
        ));
    }
}
