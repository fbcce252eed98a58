//! Catalog entities: bots, suites, tests and baselines.
//!
//! These are owned by the surrounding application; the run engine only reads
//! them, except for the bot's learned extraction selector and a baseline's
//! resolved transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transcript::Transcript;

/// Criterion applied when a test does not define its own.
pub const DEFAULT_SUCCESS_CRITERIA: &str = "Evaluate whether the REPLAYED response to each question matches the BASELINE \
     response in the following categories: tone, intent, sentiment, and most importantly factual information. \
     If any of these categories do not match then fail the test.";

/// A chatbot under test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bot {
    /// Bot id
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Learned selector hint for transcript extraction. A cache, not a source of truth.
    pub query_selector: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Bot {
    /// New bot without a learned selector.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            query_selector: None,
            created_at: Utc::now(),
        }
    }

    /// Seed the extraction selector.
    pub fn with_query_selector(mut self, selector: impl Into<String>) -> Self {
        self.query_selector = Some(selector.into());
        self
    }
}

/// A group of tests for one bot, carrying defaults for its tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suite {
    /// Suite id
    pub id: Uuid,
    /// Bot the suite tests
    pub bot_id: Uuid,
    /// Display name
    pub name: String,
    /// Criterion for tests that use the default
    pub default_success_criteria: String,
    /// Evaluations per variant run for tests that use the default
    pub default_iteration_count: u32,
    /// Variant runs per test run for tests that use the default
    pub default_variant_count: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Suite {
    /// New suite with the stock criterion and counts of one.
    pub fn new(bot_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bot_id,
            name: name.into(),
            default_success_criteria: DEFAULT_SUCCESS_CRITERIA.to_string(),
            default_iteration_count: 1,
            default_variant_count: 1,
            created_at: Utc::now(),
        }
    }

    /// Replace the default criterion.
    pub fn with_default_success_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.default_success_criteria = criteria.into();
        self
    }

    /// Replace the default iteration and variant counts.
    pub fn with_default_counts(mut self, iteration_count: u32, variant_count: u32) -> Self {
        self.default_iteration_count = iteration_count;
        self.default_variant_count = variant_count;
        self
    }

    /// Check the name and that both default counts are positive.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Suite name cannot be empty".to_string());
        }
        if self.default_iteration_count == 0 || self.default_variant_count == 0 {
            return Err("Suite default counts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// A single regression test. Each setting falls back to the suite default
/// while its `use_default_*` flag is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Test {
    /// Test id
    pub id: Uuid,
    /// Owning suite
    pub suite_id: Uuid,
    /// Display name
    pub name: String,
    /// Criterion the judge applies
    pub success_criteria: String,
    /// Take the criterion from the suite
    pub use_default_success_criteria: bool,
    /// Evaluations per variant run
    pub iteration_count: u32,
    /// Take the iteration count from the suite
    pub use_default_iteration_count: bool,
    /// Variant runs per test run
    pub variant_count: u32,
    /// Take the variant count from the suite
    pub use_default_variant_count: bool,
    /// Whether suite runs include this test.
    pub full_run_enabled: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Settings resolved against the owning suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveTestSettings {
    /// Criterion the judge applies
    pub success_criteria: String,
    /// Evaluations per variant run
    pub iteration_count: u32,
    /// Variant runs per test run
    pub variant_count: u32,
}

impl Test {
    /// New test using every suite default and included in full runs.
    pub fn new(suite_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            suite_id,
            name: name.into(),
            success_criteria: String::new(),
            use_default_success_criteria: true,
            iteration_count: 1,
            use_default_iteration_count: true,
            variant_count: 1,
            use_default_variant_count: true,
            full_run_enabled: true,
            created_at: Utc::now(),
        }
    }

    /// Use an own criterion instead of the suite default.
    pub fn with_success_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.success_criteria = criteria.into();
        self.use_default_success_criteria = false;
        self
    }

    /// Use an own iteration count instead of the suite default.
    pub fn with_iteration_count(mut self, count: u32) -> Self {
        self.iteration_count = count;
        self.use_default_iteration_count = false;
        self
    }

    /// Use an own variant count instead of the suite default.
    pub fn with_variant_count(mut self, count: u32) -> Self {
        self.variant_count = count;
        self.use_default_variant_count = false;
        self
    }

    /// Leave the test out of suite runs.
    pub fn excluded_from_full_runs(mut self) -> Self {
        self.full_run_enabled = false;
        self
    }

    /// Resolve each setting against `suite`.
    pub fn effective(&self, suite: &Suite) -> EffectiveTestSettings {
        EffectiveTestSettings {
            success_criteria: if self.use_default_success_criteria {
                suite.default_success_criteria.clone()
            } else {
                self.success_criteria.clone()
            },
            iteration_count: if self.use_default_iteration_count {
                suite.default_iteration_count
            } else {
                self.iteration_count
            },
            variant_count: if self.use_default_variant_count {
                suite.default_variant_count
            } else {
                self.variant_count
            },
        }
    }

    /// Check the name and every setting the test overrides.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Test name cannot be empty".to_string());
        }
        if !self.use_default_success_criteria && self.success_criteria.trim().is_empty() {
            return Err("Test success criteria cannot be empty".to_string());
        }
        if !self.use_default_iteration_count && self.iteration_count == 0 {
            return Err("Test iteration count must be at least 1".to_string());
        }
        if !self.use_default_variant_count && self.variant_count == 0 {
            return Err("Test variant count must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Reference conversation defining correct behavior for a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// Baseline id
    pub id: Uuid,
    /// Owning test
    pub test_id: Uuid,
    /// Display name
    pub name: String,
    /// Captured HTML of the reference conversation
    pub html_capture: String,
    /// Resolved transcript; evaluations cannot match until this is set.
    pub transcript: Option<Transcript>,
    /// Creation time; judging walks baselines in this order
    pub created_at: DateTime<Utc>,
}

impl Baseline {
    /// New unresolved baseline.
    pub fn new(test_id: Uuid, name: impl Into<String>, html_capture: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_id,
            name: name.into(),
            html_capture: html_capture.into(),
            transcript: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a resolved transcript.
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Whether the baseline can be judged against.
    pub fn is_resolved(&self) -> bool {
        self.transcript.is_some()
    }
}
