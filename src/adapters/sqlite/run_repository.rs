//! SQLite implementation of the RunRepository.
//!
//! Every terminal write is a compare-and-set on `status = 'running'`, so the
//! row itself is the single-writer lock for its own completion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    format_datetime, parse_count, parse_datetime, parse_optional_datetime, parse_optional_json,
    parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Evaluation, RunLevel, RunRef, RunState, RunStatus, SuiteRun, TestRun, VariantRun,
};
use crate::domain::ports::RunRepository;

/// `RunRepository` on SQLite.
#[derive(Clone)]
pub struct SqliteRunRepository {
    pool: SqlitePool,
}

impl SqliteRunRepository {
    /// Repository over a migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn run_table(level: RunLevel) -> &'static str {
    match level {
        RunLevel::VariantRun => "variant_runs",
        RunLevel::TestRun => "test_runs",
        RunLevel::SuiteRun => "suite_runs",
    }
}

const STATE_COLUMNS: &str = "status, status_info, pass_rate, average_elapsed_seconds, created_at, completed_at";

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn create_suite_run(&self, run: &SuiteRun) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO suite_runs (id, suite_id, environment_id, expected_children, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.suite_id.to_string())
        .bind(run.environment_id.to_string())
        .bind(i64::from(run.expected_children))
        .bind(run.state.status.as_str())
        .bind(format_datetime(&run.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_suite_run(&self, id: Uuid) -> DomainResult<Option<SuiteRun>> {
        let row: Option<SuiteRunRow> = sqlx::query_as(&format!(
            "SELECT id, suite_id, environment_id, expected_children, {STATE_COLUMNS} FROM suite_runs WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn create_test_run(&self, run: &TestRun) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO test_runs (id, test_id, environment_id, suite_run_id, expected_children, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.test_id.to_string())
        .bind(run.environment_id.to_string())
        .bind(run.suite_run_id.map(|id| id.to_string()))
        .bind(i64::from(run.expected_children))
        .bind(run.state.status.as_str())
        .bind(format_datetime(&run.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_test_run(&self, id: Uuid) -> DomainResult<Option<TestRun>> {
        let row: Option<TestRunRow> = sqlx::query_as(&format!(
            "SELECT id, test_id, environment_id, suite_run_id, expected_children, {STATE_COLUMNS} FROM test_runs WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_test_runs(&self, suite_run_id: Uuid) -> DomainResult<Vec<TestRun>> {
        let rows: Vec<TestRunRow> = sqlx::query_as(&format!(
            "SELECT id, test_id, environment_id, suite_run_id, expected_children, {STATE_COLUMNS} FROM test_runs WHERE suite_run_id = ? ORDER BY created_at, rowid"
        ))
        .bind(suite_run_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_variant_run(&self, run: &VariantRun) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO variant_runs (id, test_run_id, variant_id, expected_children, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.test_run_id.to_string())
        .bind(run.variant_id.to_string())
        .bind(i64::from(run.expected_children))
        .bind(run.state.status.as_str())
        .bind(format_datetime(&run.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_variant_run(&self, id: Uuid) -> DomainResult<Option<VariantRun>> {
        let row: Option<VariantRunRow> = sqlx::query_as(&format!(
            "SELECT id, test_run_id, variant_id, expected_children, {STATE_COLUMNS} FROM variant_runs WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_variant_runs(&self, test_run_id: Uuid) -> DomainResult<Vec<VariantRun>> {
        let rows: Vec<VariantRunRow> = sqlx::query_as(&format!(
            "SELECT id, test_run_id, variant_id, expected_children, {STATE_COLUMNS} FROM variant_runs WHERE test_run_id = ? ORDER BY created_at, rowid"
        ))
        .bind(test_run_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_evaluation(&self, evaluation: &Evaluation) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO evaluations (id, variant_run_id, html_capture, replayed_elapsed_seconds, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(evaluation.id.to_string())
        .bind(evaluation.variant_run_id.to_string())
        .bind(&evaluation.html_capture)
        .bind(evaluation.replayed_elapsed_seconds)
        .bind(evaluation.status.as_str())
        .bind(format_datetime(&evaluation.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_evaluation(&self, id: Uuid) -> DomainResult<Option<Evaluation>> {
        let row: Option<EvaluationRow> = sqlx::query_as(&format!("SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_evaluations(&self, variant_run_id: Uuid) -> DomainResult<Vec<Evaluation>> {
        let rows: Vec<EvaluationRow> = sqlx::query_as(&format!(
            "SELECT {EVALUATION_COLUMNS} FROM evaluations WHERE variant_run_id = ? ORDER BY created_at, rowid"
        ))
        .bind(variant_run_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn complete_evaluation(&self, evaluation: &Evaluation) -> DomainResult<bool> {
        let completed_at = evaluation.completed_at.ok_or_else(|| {
            DomainError::ValidationFailed(format!("evaluation {} has no completed_at", evaluation.id))
        })?;
        if !evaluation.is_terminal() {
            return Err(DomainError::ValidationFailed(format!(
                "evaluation {} is still running",
                evaluation.id
            )));
        }
        let transcript_json = evaluation
            .transcript
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"UPDATE evaluations
               SET status = ?, status_info = ?, transcript = ?, matched_baseline_id = ?, completed_at = ?
               WHERE id = ? AND status = 'running'
                 AND NOT EXISTS (
                     SELECT 1 FROM variant_runs vr
                     JOIN test_runs tr ON tr.id = vr.test_run_id
                     WHERE vr.id = evaluations.variant_run_id AND tr.status = 'stopped'
                 )"#,
        )
        .bind(evaluation.status.as_str())
        .bind(&evaluation.status_info)
        .bind(transcript_json)
        .bind(evaluation.matched_baseline_id.map(|id| id.to_string()))
        .bind(format_datetime(&completed_at))
        .bind(evaluation.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_run(&self, run: RunRef, state: &RunState) -> DomainResult<bool> {
        RunState::running().check_completion(state)?;
        let completed_at = state
            .completed_at
            .ok_or_else(|| DomainError::ValidationFailed(format!("{run} has no completed_at")))?;

        let result = sqlx::query(&format!(
            r#"UPDATE {}
               SET status = ?, status_info = ?, pass_rate = ?, average_elapsed_seconds = ?, completed_at = ?
               WHERE id = ? AND status = 'running'"#,
            run_table(run.level)
        ))
        .bind(state.status.as_str())
        .bind(&state.status_info)
        .bind(state.pass_rate)
        .bind(state.average_elapsed_seconds)
        .bind(format_datetime(&completed_at))
        .bind(run.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn stop_test_run(&self, id: Uuid, status_info: &str, at: DateTime<Utc>) -> DomainResult<bool> {
        let result = sqlx::query(
            r#"UPDATE test_runs
               SET status = 'stopped', status_info = ?, pass_rate = NULL, average_elapsed_seconds = NULL, completed_at = ?
               WHERE id = ? AND status = 'running'"#,
        )
        .bind(status_info)
        .bind(format_datetime(&at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn stop_suite_run(&self, id: Uuid, status_info: &str, at: DateTime<Utc>) -> DomainResult<Option<Vec<Uuid>>> {
        let at = format_datetime(&at);
        let mut tx = self.pool.begin().await?;

        let suite = sqlx::query(
            r#"UPDATE suite_runs
               SET status = 'stopped', status_info = ?, pass_rate = NULL, average_elapsed_seconds = NULL, completed_at = ?
               WHERE id = ? AND status = 'running'"#,
        )
        .bind(status_info)
        .bind(&at)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        if suite.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let running: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM test_runs WHERE suite_run_id = ? AND status = 'running' ORDER BY created_at, rowid",
        )
        .bind(id.to_string())
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"UPDATE test_runs
               SET status = 'stopped', status_info = ?, pass_rate = NULL, average_elapsed_seconds = NULL, completed_at = ?
               WHERE suite_run_id = ? AND status = 'running'"#,
        )
        .bind(status_info)
        .bind(&at)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        running.iter().map(|(id,)| parse_uuid(id)).collect::<DomainResult<Vec<_>>>().map(Some)
    }
}

const EVALUATION_COLUMNS: &str = "id, variant_run_id, html_capture, replayed_elapsed_seconds, status, status_info, \
    transcript, matched_baseline_id, created_at, completed_at";

fn parse_status(s: &str) -> DomainResult<RunStatus> {
    RunStatus::from_str(s).ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {s}")))
}

fn parse_state(
    status: &str,
    status_info: Option<String>,
    pass_rate: Option<f64>,
    average_elapsed_seconds: Option<f64>,
    completed_at: Option<String>,
) -> DomainResult<RunState> {
    Ok(RunState {
        status: parse_status(status)?,
        status_info,
        pass_rate,
        average_elapsed_seconds,
        completed_at: parse_optional_datetime(completed_at)?,
    })
}

#[derive(sqlx::FromRow)]
struct SuiteRunRow {
    id: String,
    suite_id: String,
    environment_id: String,
    expected_children: i64,
    status: String,
    status_info: Option<String>,
    pass_rate: Option<f64>,
    average_elapsed_seconds: Option<f64>,
    created_at: String,
    completed_at: Option<String>,
}

impl TryFrom<SuiteRunRow> for SuiteRun {
    type Error = DomainError;

    fn try_from(row: SuiteRunRow) -> Result<Self, Self::Error> {
        Ok(SuiteRun {
            id: parse_uuid(&row.id)?,
            suite_id: parse_uuid(&row.suite_id)?,
            environment_id: parse_uuid(&row.environment_id)?,
            expected_children: parse_count(row.expected_children, "expected_children")?,
            state: parse_state(
                &row.status,
                row.status_info,
                row.pass_rate,
                row.average_elapsed_seconds,
                row.completed_at,
            )?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TestRunRow {
    id: String,
    test_id: String,
    environment_id: String,
    suite_run_id: Option<String>,
    expected_children: i64,
    status: String,
    status_info: Option<String>,
    pass_rate: Option<f64>,
    average_elapsed_seconds: Option<f64>,
    created_at: String,
    completed_at: Option<String>,
}

impl TryFrom<TestRunRow> for TestRun {
    type Error = DomainError;

    fn try_from(row: TestRunRow) -> Result<Self, Self::Error> {
        Ok(TestRun {
            id: parse_uuid(&row.id)?,
            test_id: parse_uuid(&row.test_id)?,
            environment_id: parse_uuid(&row.environment_id)?,
            suite_run_id: parse_optional_uuid(row.suite_run_id)?,
            expected_children: parse_count(row.expected_children, "expected_children")?,
            state: parse_state(
                &row.status,
                row.status_info,
                row.pass_rate,
                row.average_elapsed_seconds,
                row.completed_at,
            )?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VariantRunRow {
    id: String,
    test_run_id: String,
    variant_id: String,
    expected_children: i64,
    status: String,
    status_info: Option<String>,
    pass_rate: Option<f64>,
    average_elapsed_seconds: Option<f64>,
    created_at: String,
    completed_at: Option<String>,
}

impl TryFrom<VariantRunRow> for VariantRun {
    type Error = DomainError;

    fn try_from(row: VariantRunRow) -> Result<Self, Self::Error> {
        Ok(VariantRun {
            id: parse_uuid(&row.id)?,
            test_run_id: parse_uuid(&row.test_run_id)?,
            variant_id: parse_uuid(&row.variant_id)?,
            expected_children: parse_count(row.expected_children, "expected_children")?,
            state: parse_state(
                &row.status,
                row.status_info,
                row.pass_rate,
                row.average_elapsed_seconds,
                row.completed_at,
            )?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EvaluationRow {
    id: String,
    variant_run_id: String,
    html_capture: String,
    replayed_elapsed_seconds: f64,
    status: String,
    status_info: Option<String>,
    transcript: Option<String>,
    matched_baseline_id: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl TryFrom<EvaluationRow> for Evaluation {
    type Error = DomainError;

    fn try_from(row: EvaluationRow) -> Result<Self, Self::Error> {
        Ok(Evaluation {
            id: parse_uuid(&row.id)?,
            variant_run_id: parse_uuid(&row.variant_run_id)?,
            html_capture: row.html_capture,
            replayed_elapsed_seconds: row.replayed_elapsed_seconds,
            status: parse_status(&row.status)?,
            status_info: row.status_info,
            transcript: parse_optional_json(row.transcript)?,
            matched_baseline_id: parse_optional_uuid(row.matched_baseline_id)?,
            created_at: parse_datetime(&row.created_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteCatalogRepository};
    use crate::domain::models::{Bot, EvaluationOutcome, Suite, Test, STOPPED_BY_USER};
    use crate::domain::ports::CatalogRepository;

    struct Fixture {
        repo: SqliteRunRepository,
        test_id: Uuid,
        suite_id: Uuid,
    }

    async fn setup() -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        let catalog = SqliteCatalogRepository::new(pool.clone());
        let bot = Bot::new("bot");
        catalog.create_bot(&bot).await.unwrap();
        let suite = Suite::new(bot.id, "suite");
        catalog.create_suite(&suite).await.unwrap();
        let test = Test::new(suite.id, "test");
        catalog.create_test(&test).await.unwrap();

        Fixture {
            repo: SqliteRunRepository::new(pool),
            test_id: test.id,
            suite_id: suite.id,
        }
    }

    #[tokio::test]
    async fn test_complete_run_is_compare_and_set() {
        let fx = setup().await;
        let test_run = TestRun::new(fx.test_id, Uuid::new_v4(), 1);
        fx.repo.create_test_run(&test_run).await.unwrap();

        let now = Utc::now();
        let first = RunState::scored(1.0, Some(2.0), None, now);
        let second = RunState::errored("late writer", now);

        assert!(fx.repo.complete_run(test_run.run_ref(), &first).await.unwrap());
        assert!(!fx.repo.complete_run(test_run.run_ref(), &second).await.unwrap());

        let stored = fx.repo.get_test_run(test_run.id).await.unwrap().unwrap();
        assert_eq!(stored.state.status, RunStatus::Pass);
        assert_eq!(stored.state.pass_rate, Some(1.0));
        assert_eq!(stored.state.average_elapsed_seconds, Some(2.0));
        assert!(stored.state.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_complete_run_rejects_running_state() {
        let fx = setup().await;
        let test_run = TestRun::new(fx.test_id, Uuid::new_v4(), 1);
        fx.repo.create_test_run(&test_run).await.unwrap();

        let result = fx.repo.complete_run(test_run.run_ref(), &RunState::running()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_evaluation_write_discarded_after_stop() {
        let fx = setup().await;
        let test_run = TestRun::new(fx.test_id, Uuid::new_v4(), 1);
        fx.repo.create_test_run(&test_run).await.unwrap();
        let variant_run = VariantRun::new(test_run.id, Uuid::new_v4(), 1);
        fx.repo.create_variant_run(&variant_run).await.unwrap();
        let mut evaluation = Evaluation::new(variant_run.id, "<html/>", 1.0);
        fx.repo.create_evaluation(&evaluation).await.unwrap();

        assert!(fx.repo.stop_test_run(test_run.id, STOPPED_BY_USER, Utc::now()).await.unwrap());

        evaluation
            .complete(EvaluationOutcome::Fail { reason: Some("nope".to_string()) }, Utc::now())
            .unwrap();
        assert!(!fx.repo.complete_evaluation(&evaluation).await.unwrap());

        let stored = fx.repo.get_evaluation(evaluation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_stop_suite_run_cascades_to_running_test_runs_only() {
        let fx = setup().await;
        let suite_run = SuiteRun::new(fx.suite_id, Uuid::new_v4(), 3);
        fx.repo.create_suite_run(&suite_run).await.unwrap();

        let done = TestRun::new(fx.test_id, suite_run.environment_id, 1).in_suite_run(suite_run.id);
        let open_a = TestRun::new(fx.test_id, suite_run.environment_id, 1).in_suite_run(suite_run.id);
        let open_b = TestRun::new(fx.test_id, suite_run.environment_id, 1).in_suite_run(suite_run.id);
        for run in [&done, &open_a, &open_b] {
            fx.repo.create_test_run(run).await.unwrap();
        }
        fx.repo
            .complete_run(done.run_ref(), &RunState::scored(1.0, Some(1.0), None, Utc::now()))
            .await
            .unwrap();

        let stopped = fx
            .repo
            .stop_suite_run(suite_run.id, STOPPED_BY_USER, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stopped, vec![open_a.id, open_b.id]);

        let runs = fx.repo.list_test_runs(suite_run.id).await.unwrap();
        assert_eq!(runs[0].state.status, RunStatus::Pass);
        assert!(runs[1..].iter().all(|r| r.state.status == RunStatus::Stopped
            && r.state.status_info.as_deref() == Some(STOPPED_BY_USER)));

        let again = fx.repo.stop_suite_run(suite_run.id, STOPPED_BY_USER, Utc::now()).await.unwrap();
        assert!(again.is_none());
    }
}
