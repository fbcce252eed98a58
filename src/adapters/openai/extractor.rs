//! Conversation extractor backed by chat completions.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::client::{ChatMessage, OpenAiClient};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Transcript, Turn};
use crate::domain::ports::{ConversationExtractor, Extraction, SelectorHint};

const SYSTEM_PROMPT: &str = "You parse a conversation between a user and a chatbot out of a blob of HTML. Remove \
markup and page artifacts only; do not condense or drop any text of the conversation. Use the fact that the \
conversation is between a user and a chatbot to infer authors when the markup is unclear. Respond only with JSON \
of the form {\"conversation\": {\"0\": {\"author\": \"user\", \"message\": \"...\"}, \"1\": {\"author\": \"bot\", \
\"message\": \"...\"}}}.";

const LEARN_SELECTOR_PROMPT: &str = "\nAlso report a CSS selector that, passed to document.querySelectorAll on \
pages of this site, returns every element of the conversation regardless of its length or content. Add it to the \
JSON under the key \"selector\".";

/// Conversation extractor backed by a chat completions model.
pub struct OpenAiExtractor {
    client: Arc<OpenAiClient>,
}

impl OpenAiExtractor {
    /// Extractor sending requests through `client`.
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConversationExtractor for OpenAiExtractor {
    async fn extract(&self, html: &str, hint: SelectorHint<'_>) -> DomainResult<Extraction> {
        let system = match hint {
            SelectorHint::Learn => format!("{SYSTEM_PROMPT}{LEARN_SELECTOR_PROMPT}"),
            SelectorHint::Known(selector) => {
                format!("{SYSTEM_PROMPT}\nThe conversation elements match the CSS selector `{selector}`.")
            }
        };
        let messages = [ChatMessage::system(system), ChatMessage::user(html)];

        let value = self.client.complete_json(&messages).await?;
        let transcript = parse_conversation(&value)?;
        let selector = if hint.wants_selector() {
            value.get("selector").and_then(Value::as_str).map(str::to_string)
        } else {
            None
        };

        Ok(Extraction { transcript, selector })
    }
}

/// Read `conversation` as either an index-keyed object or an array of turns.
/// A missing conversation is an empty transcript.
fn parse_conversation(value: &Value) -> DomainResult<Transcript> {
    let turns: Vec<&Value> = match value.get("conversation") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(map)) => {
            let mut indexed = map
                .iter()
                .map(|(key, turn)| {
                    key.trim()
                        .parse::<u64>()
                        .map(|index| (index, turn))
                        .map_err(|_| unparseable(format!("non-numeric conversation key {key:?}")))
                })
                .collect::<DomainResult<Vec<_>>>()?;
            indexed.sort_by_key(|(index, _)| *index);
            indexed.into_iter().map(|(_, turn)| turn).collect()
        }
        Some(other) => return Err(unparseable(format!("conversation is not a list: {other}"))),
    };

    turns.into_iter().map(parse_turn).collect()
}

fn parse_turn(turn: &Value) -> DomainResult<Turn> {
    let field = |name: &str| {
        turn.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| unparseable(format!("turn without {name}: {turn}")))
    };
    Ok(Turn::new(field("author")?, field("message")?))
}

fn unparseable(message: String) -> DomainError {
    DomainError::UnparseableResponse(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::openai::client::test_support::{completion_body, config};
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn test_object_keys_sort_numerically() {
        let mut conversation = serde_json::Map::new();
        for i in 0..12 {
            conversation.insert(i.to_string(), json!({ "author": "user", "message": format!("m{i}") }));
        }
        let transcript = parse_conversation(&json!({ "conversation": conversation })).unwrap();

        let messages: Vec<&str> = transcript.turns().iter().map(|t| t.message.as_str()).collect();
        assert_eq!(messages[2], "m2");
        assert_eq!(messages[10], "m10");
        assert_eq!(transcript.len(), 12);
    }

    #[test]
    fn test_array_and_missing_conversation() {
        let transcript = parse_conversation(&json!({
            "conversation": [{ "author": "user", "message": "hi" }, { "author": "bot", "message": "hello" }]
        }))
        .unwrap();
        assert_eq!(transcript.turns(), &[Turn::user("hi"), Turn::bot("hello")]);

        assert!(parse_conversation(&json!({})).unwrap().is_empty());
        assert!(parse_conversation(&json!({ "conversation": "hi" })).is_err());
        assert!(parse_conversation(&json!({ "conversation": [{ "author": "user" }] })).is_err());
    }

    #[tokio::test]
    async fn test_selector_reported_only_when_learning() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion_body(&json!({
                "conversation": { "0": { "author": "user", "message": "hi" } },
                "selector": "div.chat > p"
            })))
            .create_async()
            .await;
        let extractor = OpenAiExtractor::new(Arc::new(OpenAiClient::new(&config(server.url())).unwrap()));

        let learned = extractor.extract("<div/>", SelectorHint::Learn).await.unwrap();
        assert_eq!(learned.selector.as_deref(), Some("div.chat > p"));

        let reused = extractor.extract("<div/>", SelectorHint::Known("div.chat > p")).await.unwrap();
        assert_eq!(reused.selector, None);
        assert_eq!(reused.transcript.turns(), &[Turn::user("hi")]);
    }

    #[tokio::test]
    async fn test_known_selector_is_passed_to_the_model() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex("ul\\.messages".to_string()))
            .with_status(200)
            .with_body(completion_body(&json!({ "conversation": [] })))
            .create_async()
            .await;
        let extractor = OpenAiExtractor::new(Arc::new(OpenAiClient::new(&config(server.url())).unwrap()));

        let extraction = extractor.extract("<ul/>", SelectorHint::Known("ul.messages")).await.unwrap();
        assert!(extraction.transcript.is_empty());
        mock.assert_async().await;
    }
}
