//! OpenAI chat completions adapters for the judge, extractor and summarizer ports.

pub mod client;
pub mod errors;
pub mod extractor;
pub mod judge;
pub mod summarizer;

pub use client::{ChatMessage, OpenAiClient, API_KEY_ENV};
pub use errors::OpenAiError;
pub use extractor::OpenAiExtractor;
pub use judge::OpenAiJudge;
pub use summarizer::OpenAiSummarizer;
