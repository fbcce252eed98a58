//! Manual stop of suite runs and test runs against in-flight judging.

mod common;

use std::time::Duration;

use chatcheck::adapters::scripted::ScriptedJudge;
use chatcheck::adapters::sqlite::create_migrated_test_pool;
use chatcheck::domain::models::{JudgingConfig, RunStatus, STOPPED_BY_USER};
use chatcheck::domain::ports::RunRepository;
use chatcheck::services::status_aggregator::CHILD_STOPPED_INFO;
use chatcheck::DomainError;
use common::{environment, Dispatch, Harness, CAPTURE};
use uuid::Uuid;

#[tokio::test]
async fn test_stop_suite_run_stops_only_running_test_runs() {
    let h = Harness::new(ScriptedJudge::new()).await;
    let mut tests = Vec::new();
    for name in ["greeting", "refund", "escalation"] {
        let (test, _) = h.add_test(h.test(name).with_success_criteria("always pass"), 1).await;
        tests.push(test);
    }

    let env = environment();
    let suite_run = h.service.start_suite_run(h.suite.id, env).await.unwrap();
    assert_eq!(suite_run.expected_children, 3);

    let mut test_runs = Vec::new();
    for test in &tests {
        test_runs.push(h.service.start_test_run(test.id, env, Some(suite_run.id)).await.unwrap());
    }

    let finished = h.service.start_variant_run(test_runs[0].id, Uuid::new_v4()).await.unwrap();
    h.service.submit_evaluation(finished.id, CAPTURE.to_string(), 1.0).await.unwrap();
    assert_eq!(
        h.service.get_run_state(test_runs[0].run_ref()).await.unwrap().status,
        RunStatus::Pass
    );

    let report = h.service.stop_run(suite_run.run_ref()).await.unwrap();
    assert!(report.stopped);
    assert_eq!(report.cascaded, vec![test_runs[1].id, test_runs[2].id]);

    let suite_state = h.service.get_run_state(suite_run.run_ref()).await.unwrap();
    assert_eq!(suite_state.status, RunStatus::Stopped);
    assert_eq!(suite_state.status_info.as_deref(), Some(STOPPED_BY_USER));
    assert_eq!(suite_state.pass_rate, None);
    assert!(suite_state.completed_at.is_some());

    assert_eq!(
        h.service.get_run_state(test_runs[0].run_ref()).await.unwrap().status,
        RunStatus::Pass
    );
    for test_run in &test_runs[1..] {
        let state = h.service.get_run_state(test_run.run_ref()).await.unwrap();
        assert_eq!(state.status, RunStatus::Stopped);
        assert_eq!(state.status_info.as_deref(), Some(STOPPED_BY_USER));
    }

    let err = h
        .service
        .start_test_run(tests[1].id, env, Some(suite_run.id))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_evaluations_under_stopped_test_run_are_not_judged() {
    let h = Harness::new(ScriptedJudge::new()).await;
    let (test, _) = h
        .add_test(h.test("refund").with_success_criteria("always pass").with_iteration_count(2), 1)
        .await;

    let test_run = h.service.start_test_run(test.id, environment(), None).await.unwrap();
    let variant_run = h.service.start_variant_run(test_run.id, Uuid::new_v4()).await.unwrap();
    h.service.stop_run(test_run.run_ref()).await.unwrap();

    let evaluation = h
        .service
        .submit_evaluation(variant_run.id, CAPTURE.to_string(), 1.0)
        .await
        .unwrap();

    let stored = h.runs.get_evaluation(evaluation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Running);
    assert_eq!(h.judge.calls(), 0);
    assert_eq!(
        h.service.get_run_state(variant_run.run_ref()).await.unwrap().status,
        RunStatus::Running
    );
}

#[tokio::test]
async fn test_stop_during_judging_discards_the_result() {
    common::setup_test_logging();
    let pool = create_migrated_test_pool().await.unwrap();
    let judge = ScriptedJudge::new().with_delay(Duration::from_millis(300));
    let h = Harness::build(pool, judge, Dispatch::Queued(JudgingConfig::default())).await;
    let (test, _) = h
        .add_test(h.test("slow judge").with_success_criteria("always pass"), 1)
        .await;

    let env = environment();
    let suite_run = h.service.start_suite_run(h.suite.id, env).await.unwrap();
    let test_run = h.service.start_test_run(test.id, env, Some(suite_run.id)).await.unwrap();
    let variant_run = h.service.start_variant_run(test_run.id, Uuid::new_v4()).await.unwrap();
    let evaluation = h
        .service
        .submit_evaluation(variant_run.id, CAPTURE.to_string(), 1.0)
        .await
        .unwrap();

    // Wait until the worker is inside the judge call.
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.judge.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("judge was never called");

    let report = h.service.stop_run(test_run.run_ref()).await.unwrap();
    assert!(report.stopped);
    let parent = report.parent.expect("suite run should be re-aggregated");
    assert!(parent.outcome.became_terminal());

    h.settle().await;

    let stored = h.runs.get_evaluation(evaluation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Running);
    assert_eq!(stored.completed_at, None);
    assert_eq!(
        h.service.get_run_state(variant_run.run_ref()).await.unwrap().status,
        RunStatus::Running
    );

    let suite_state = h.service.get_run_state(suite_run.run_ref()).await.unwrap();
    assert_eq!(suite_state.status, RunStatus::Stopped);
    assert_eq!(suite_state.status_info.as_deref(), Some(CHILD_STOPPED_INFO));
}

#[tokio::test]
async fn test_stopping_a_finished_run_is_a_no_op() {
    let h = Harness::new(ScriptedJudge::new()).await;
    let (test, _) = h.add_test(h.test("quick").with_success_criteria("always pass"), 1).await;

    let test_run = h.service.start_test_run(test.id, environment(), None).await.unwrap();
    let variant_run = h.service.start_variant_run(test_run.id, Uuid::new_v4()).await.unwrap();
    h.service.submit_evaluation(variant_run.id, CAPTURE.to_string(), 1.0).await.unwrap();

    let before = h.service.get_run_state(test_run.run_ref()).await.unwrap();
    assert_eq!(before.status, RunStatus::Pass);

    let report = h.service.stop_run(test_run.run_ref()).await.unwrap();
    assert!(!report.stopped);
    assert_eq!(report.parent, None);
    assert_eq!(h.service.get_run_state(test_run.run_ref()).await.unwrap(), before);
}
