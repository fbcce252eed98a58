//! Port trait definitions (Hexagonal Architecture)
//!
//! Async interfaces the run engine depends on:
//! - Judge: natural-language verdict on a candidate conversation
//! - ConversationExtractor: HTML capture to transcript
//! - FailureSummarizer: compresses several failure reasons into one
//! - RunRepository / CatalogRepository: persistence

pub mod catalog_repository;
pub mod conversation_extractor;
pub mod failure_summarizer;
pub mod judge;
pub mod run_repository;

pub use catalog_repository::CatalogRepository;
pub use conversation_extractor::{ConversationExtractor, Extraction, SelectorHint};
pub use failure_summarizer::FailureSummarizer;
pub use judge::{Judge, Verdict};
pub use run_repository::RunRepository;
