//! Pure roll-up of terminal children into a parent decision.
//!
//! The same routine serves all three parent levels. A level is bound by
//! implementing [`RollupChild`] for its child type and [`RollupParent`] for
//! itself; nothing in here touches storage.

use crate::domain::models::{Evaluation, RunRef, RunState, RunStatus, SuiteRun, TestRun, VariantRun};

/// What the roll-up needs to know about one child.
pub trait RollupChild {
    /// Current status of the child.
    fn status(&self) -> RunStatus;

    /// Fractional contribution of a Mixed child.
    fn pass_rate(&self) -> Option<f64>;

    /// Elapsed time this child contributes to the parent's average.
    fn elapsed_seconds(&self) -> Option<f64>;

    /// Reason the child carries, if any.
    fn status_info(&self) -> Option<&str>;
}

/// What the roll-up needs to know about the parent.
pub trait RollupParent {
    /// Pointer to the parent run.
    fn run_ref(&self) -> RunRef;

    /// Stored status block of the parent.
    fn state(&self) -> &RunState;

    /// Child count fixed when the parent was created.
    fn expected_children(&self) -> u32;

    /// Next level up, if this run belongs to one.
    fn parent_ref(&self) -> Option<RunRef>;
}

/// Result of rolling up one parent's current child set.
#[derive(Debug, Clone, PartialEq)]
pub enum RollupDecision {
    /// Children missing or still running; nothing may be written.
    Waiting {
        /// Children already settled
        terminal: usize,
        /// Children the parent expects
        expected: usize,
    },
    /// At least one child errored.
    Errored,
    /// No child errored but at least one was stopped.
    Stopped,
    /// Every child settled and none errored or stopped
    Scored {
        /// Mean pass contribution of the children
        pass_rate: f64,
        /// Mean elapsed time of the children that report one
        average_elapsed_seconds: Option<f64>,
        /// Reasons carried by failing and mixed children, in child order.
        failure_reasons: Vec<String>,
    },
}

/// Roll up `children` of a parent that expects `expected` of them.
pub fn roll_up<C: RollupChild>(expected: u32, children: &[C]) -> RollupDecision {
    let expected = expected as usize;
    let terminal = children.iter().filter(|c| c.status().is_terminal()).count();

    if children.is_empty() || children.len() < expected || terminal < children.len() {
        return RollupDecision::Waiting { terminal, expected };
    }

    let mut error_flag = false;
    let mut stopped = false;
    let mut contributions = Vec::with_capacity(children.len());
    let mut elapsed = Vec::with_capacity(children.len());
    let mut failure_reasons = Vec::new();

    for child in children {
        let contribution = match child.status() {
            RunStatus::Pass => Some(1.0),
            RunStatus::Fail => Some(0.0),
            RunStatus::Mixed => {
                // A Mixed child without a rate cannot be counted.
                error_flag |= child.pass_rate().is_none();
                child.pass_rate()
            }
            RunStatus::Error => {
                error_flag = true;
                None
            }
            RunStatus::Stopped => {
                stopped = true;
                None
            }
            RunStatus::Running => None,
        };

        if let Some(value) = contribution {
            contributions.push(value);
            elapsed.extend(child.elapsed_seconds());
            if child.status() != RunStatus::Pass {
                if let Some(info) = child.status_info().filter(|s| !s.trim().is_empty()) {
                    failure_reasons.push(info.to_string());
                }
            }
        }
    }

    if error_flag {
        return RollupDecision::Errored;
    }
    if stopped {
        return RollupDecision::Stopped;
    }

    RollupDecision::Scored {
        pass_rate: mean(&contributions).unwrap_or(0.0),
        average_elapsed_seconds: mean(&elapsed),
        failure_reasons,
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl RollupChild for Evaluation {
    fn status(&self) -> RunStatus {
        self.status
    }

    fn pass_rate(&self) -> Option<f64> {
        None
    }

    fn elapsed_seconds(&self) -> Option<f64> {
        Some(self.replayed_elapsed_seconds)
    }

    fn status_info(&self) -> Option<&str> {
        self.status_info.as_deref()
    }
}

impl RollupChild for RunState {
    fn status(&self) -> RunStatus {
        self.status
    }

    fn pass_rate(&self) -> Option<f64> {
        self.pass_rate
    }

    fn elapsed_seconds(&self) -> Option<f64> {
        self.average_elapsed_seconds
    }

    fn status_info(&self) -> Option<&str> {
        self.status_info.as_deref()
    }
}

macro_rules! rollup_child_via_state {
    ($($run:ty),*) => {
        $(
            impl RollupChild for $run {
                fn status(&self) -> RunStatus {
                    self.state.status
                }

                fn pass_rate(&self) -> Option<f64> {
                    self.state.pass_rate
                }

                fn elapsed_seconds(&self) -> Option<f64> {
                    self.state.average_elapsed_seconds
                }

                fn status_info(&self) -> Option<&str> {
                    self.state.status_info.as_deref()
                }
            }
        )*
    };
}

rollup_child_via_state!(VariantRun, TestRun);

impl RollupParent for VariantRun {
    fn run_ref(&self) -> RunRef {
        RunRef::variant_run(self.id)
    }

    fn state(&self) -> &RunState {
        &self.state
    }

    fn expected_children(&self) -> u32 {
        self.expected_children
    }

    fn parent_ref(&self) -> Option<RunRef> {
        Some(RunRef::test_run(self.test_run_id))
    }
}

impl RollupParent for TestRun {
    fn run_ref(&self) -> RunRef {
        RunRef::test_run(self.id)
    }

    fn state(&self) -> &RunState {
        &self.state
    }

    fn expected_children(&self) -> u32 {
        self.expected_children
    }

    fn parent_ref(&self) -> Option<RunRef> {
        self.suite_run_id.map(RunRef::suite_run)
    }
}

impl RollupParent for SuiteRun {
    fn run_ref(&self) -> RunRef {
        RunRef::suite_run(self.id)
    }

    fn state(&self) -> &RunState {
        &self.state
    }

    fn expected_children(&self) -> u32 {
        self.expected_children
    }

    fn parent_ref(&self) -> Option<RunRef> {
        None
    }
}
