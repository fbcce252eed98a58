//! Deterministic collaborators for tests and offline runs.
//!
//! - [`ScriptedJudge`] honours the literal criteria `"always pass"` and
//!   `"always fail"`, otherwise replays a script of verdicts.
//! - [`ScriptedExtractor`] reads captures written as `author: message` lines.
//! - [`JoiningSummarizer`] joins reasons with `"; "`.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Transcript, Turn};
use crate::domain::ports::{ConversationExtractor, Extraction, FailureSummarizer, Judge, SelectorHint, Verdict};

/// Criterion the scripted judge always passes.
pub const ALWAYS_PASS: &str = "always pass";
/// Criterion the scripted judge always fails.
pub const ALWAYS_FAIL: &str = "always fail";

/// One scripted judge response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedVerdict {
    /// Passing verdict
    Pass,
    /// Failing verdict with this reason
    Fail(String),
    /// Failing verdict without a reason
    FailWithoutReason,
    /// Reply that does not decode into a verdict
    Unparseable,
    /// Judge request failure with this message
    Unavailable(String),
}

/// Judge whose answers are fixed up front.
pub struct ScriptedJudge {
    script: Mutex<VecDeque<ScriptedVerdict>>,
    fallback: ScriptedVerdict,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl Default for ScriptedJudge {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedJudge {
    /// Judge with an empty script; unscripted calls pass.
    pub fn new() -> Self {
        Self::with_script(Vec::new())
    }

    /// Judge answering with `script` in order, then passing.
    pub fn with_script(script: Vec<ScriptedVerdict>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: ScriptedVerdict::Pass,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Verdict returned once the script runs out.
    pub fn with_fallback(mut self, fallback: ScriptedVerdict) -> Self {
        self.fallback = fallback;
        self
    }

    /// Sleep before answering, to widen race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of evaluate calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn evaluate(&self, success_criteria: &str, _baseline: &Transcript, _candidate: &Transcript) -> DomainResult<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let verdict = match success_criteria.trim().to_lowercase().as_str() {
            ALWAYS_PASS => ScriptedVerdict::Pass,
            ALWAYS_FAIL => ScriptedVerdict::Fail("criterion is always fail".to_string()),
            _ => self.script.lock().await.pop_front().unwrap_or_else(|| self.fallback.clone()),
        };

        match verdict {
            ScriptedVerdict::Pass => Ok(Verdict::pass()),
            ScriptedVerdict::Fail(reason) => Ok(Verdict::fail(reason)),
            ScriptedVerdict::FailWithoutReason => Ok(Verdict { pass: false, reason: None }),
            ScriptedVerdict::Unparseable => Err(DomainError::UnparseableResponse("scripted".to_string())),
            ScriptedVerdict::Unavailable(message) => Err(DomainError::ExecutionFailed(message)),
        }
    }
}

/// Extractor for plain-text captures of `author: message` lines.
///
/// Lines without a colon are ignored, so markup-only captures produce an
/// empty transcript.
pub struct ScriptedExtractor {
    selector: String,
    failing: bool,
    hints: Mutex<Vec<Option<String>>>,
}

impl ScriptedExtractor {
    /// Extractor that reports `selector` whenever one is requested.
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            failing: false,
            hints: Mutex::new(Vec::new()),
        }
    }

    /// Extractor whose every call fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new("")
        }
    }

    /// Selector hint seen by each call, `None` where one was requested.
    pub async fn hints(&self) -> Vec<Option<String>> {
        self.hints.lock().await.clone()
    }

    /// Transcript of `author: message` lines; markup lines are skipped.
    pub fn parse(capture: &str) -> Transcript {
        capture
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(author, message)| Turn::new(author.trim(), message.trim()))
            .filter(|turn| !turn.author.is_empty() && !turn.author.contains('<'))
            .collect()
    }
}

#[async_trait]
impl ConversationExtractor for ScriptedExtractor {
    async fn extract(&self, html: &str, hint: SelectorHint<'_>) -> DomainResult<Extraction> {
        let seen = match hint {
            SelectorHint::Learn => None,
            SelectorHint::Known(selector) => Some(selector.to_string()),
        };
        self.hints.lock().await.push(seen);

        if self.failing {
            return Err(DomainError::ExecutionFailed("scripted extractor failure".to_string()));
        }

        Ok(Extraction {
            transcript: Self::parse(html),
            selector: hint.wants_selector().then(|| self.selector.clone()),
        })
    }
}

/// Summarizer that joins reasons in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoiningSummarizer;

#[async_trait]
impl FailureSummarizer for JoiningSummarizer {
    async fn summarize(&self, reasons: &[String]) -> DomainResult<String> {
        Ok(reasons.join("; "))
    }
}
