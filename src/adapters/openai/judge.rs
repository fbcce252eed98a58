//! Judge backed by chat completions.

use async_trait::async_trait;
use std::sync::Arc;

use super::client::{ChatMessage, OpenAiClient};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Transcript;
use crate::domain::ports::{Judge, Verdict};

const SYSTEM_PROMPT: &str = "You decide whether a TEST conversation between a user and a chatbot matches a \
BASELINE conversation. Compare every chatbot response in TEST with the corresponding response in BASELINE. \
If a response has no corresponding response in BASELINE, or any response fails the success criteria, the test \
fails. Reason carefully before deciding. Respond only with JSON, either {\"pass\": true} or \
{\"pass\": false, \"reason\": \"...\"} where reason is a two sentence explanation of why the test failed.\n\n\
The success criteria for the conversation is: ";

/// Judge backed by a chat completions model.
pub struct OpenAiJudge {
    client: Arc<OpenAiClient>,
}

impl OpenAiJudge {
    /// Judge sending requests through `client`.
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Judge for OpenAiJudge {
    async fn evaluate(&self, success_criteria: &str, baseline: &Transcript, candidate: &Transcript) -> DomainResult<Verdict> {
        let messages = [
            ChatMessage::system(format!("{SYSTEM_PROMPT}{success_criteria}")),
            ChatMessage::user(format!(
                "BASELINE: {}\n\nTEST: {}",
                serde_json::to_string(baseline)?,
                serde_json::to_string(candidate)?
            )),
        ];

        let value = self.client.complete_json(&messages).await?;
        serde_json::from_value::<Verdict>(value.clone())
            .map_err(|e| DomainError::UnparseableResponse(format!("{e}: {value}")))
    }
}
