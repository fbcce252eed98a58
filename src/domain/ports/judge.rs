//! Judge port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::Transcript;

/// Decision for one baseline/candidate pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the candidate satisfies the criterion
    pub pass: bool,
    /// Why it does not, when it fails
    #[serde(default)]
    pub reason: Option<String>,
}

impl Verdict {
    /// Passing verdict.
    pub fn pass() -> Self {
        Self { pass: true, reason: None }
    }

    /// Failing verdict with a reason.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            reason: Some(reason.into()),
        }
    }
}

/// Decides whether a replayed conversation satisfies a success criterion
/// relative to a baseline conversation.
///
/// Implementations return `DomainError::UnparseableResponse` when the
/// underlying decision procedure produced no usable verdict. Any other error
/// is treated as the judge being unavailable.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Judge `candidate` against `baseline` under `success_criteria`.
    async fn evaluate(
        &self,
        success_criteria: &str,
        baseline: &Transcript,
        candidate: &Transcript,
    ) -> DomainResult<Verdict>;
}
