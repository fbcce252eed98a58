//! SQLite implementation of the CatalogRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_count, parse_datetime, parse_optional_json, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Baseline, Bot, Suite, Test, Transcript};
use crate::domain::ports::CatalogRepository;

/// `CatalogRepository` on SQLite.
#[derive(Clone)]
pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    /// Repository over a migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn create_bot(&self, bot: &Bot) -> DomainResult<()> {
        sqlx::query("INSERT INTO bots (id, name, query_selector, created_at) VALUES (?, ?, ?, ?)")
            .bind(bot.id.to_string())
            .bind(&bot.name)
            .bind(&bot.query_selector)
            .bind(format_datetime(&bot.created_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_bot(&self, id: Uuid) -> DomainResult<Option<Bot>> {
        let row: Option<BotRow> =
            sqlx::query_as("SELECT id, name, query_selector, created_at FROM bots WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn set_bot_selector(&self, bot_id: Uuid, selector: &str) -> DomainResult<()> {
        let result = sqlx::query("UPDATE bots SET query_selector = ? WHERE id = ?")
            .bind(selector)
            .bind(bot_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::BotNotFound(bot_id));
        }
        Ok(())
    }

    async fn create_suite(&self, suite: &Suite) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO suites (id, bot_id, name, default_success_criteria, default_iteration_count, default_variant_count, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(suite.id.to_string())
        .bind(suite.bot_id.to_string())
        .bind(&suite.name)
        .bind(&suite.default_success_criteria)
        .bind(i64::from(suite.default_iteration_count))
        .bind(i64::from(suite.default_variant_count))
        .bind(format_datetime(&suite.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_suite(&self, id: Uuid) -> DomainResult<Option<Suite>> {
        let row: Option<SuiteRow> = sqlx::query_as(
            "SELECT id, bot_id, name, default_success_criteria, default_iteration_count, default_variant_count, created_at FROM suites WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn create_test(&self, test: &Test) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO tests (id, suite_id, name, success_criteria, use_default_success_criteria,
                   iteration_count, use_default_iteration_count, variant_count, use_default_variant_count,
                   full_run_enabled, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(test.id.to_string())
        .bind(test.suite_id.to_string())
        .bind(&test.name)
        .bind(&test.success_criteria)
        .bind(test.use_default_success_criteria)
        .bind(i64::from(test.iteration_count))
        .bind(test.use_default_iteration_count)
        .bind(i64::from(test.variant_count))
        .bind(test.use_default_variant_count)
        .bind(test.full_run_enabled)
        .bind(format_datetime(&test.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_test(&self, id: Uuid) -> DomainResult<Option<Test>> {
        let row: Option<TestRow> = sqlx::query_as(&format!("SELECT {TEST_COLUMNS} FROM tests WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_tests(&self, suite_id: Uuid) -> DomainResult<Vec<Test>> {
        let rows: Vec<TestRow> = sqlx::query_as(&format!(
            "SELECT {TEST_COLUMNS} FROM tests WHERE suite_id = ? ORDER BY created_at, rowid"
        ))
        .bind(suite_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_baseline(&self, baseline: &Baseline) -> DomainResult<()> {
        let transcript_json = baseline
            .transcript
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO baselines (id, test_id, name, html_capture, transcript, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(baseline.id.to_string())
        .bind(baseline.test_id.to_string())
        .bind(&baseline.name)
        .bind(&baseline.html_capture)
        .bind(transcript_json)
        .bind(format_datetime(&baseline.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_baseline(&self, id: Uuid) -> DomainResult<Option<Baseline>> {
        let row: Option<BaselineRow> = sqlx::query_as(
            "SELECT id, test_id, name, html_capture, transcript, created_at FROM baselines WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_baselines(&self, test_id: Uuid) -> DomainResult<Vec<Baseline>> {
        let rows: Vec<BaselineRow> = sqlx::query_as(
            "SELECT id, test_id, name, html_capture, transcript, created_at FROM baselines WHERE test_id = ? ORDER BY created_at, rowid",
        )
        .bind(test_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_baseline_transcript(&self, baseline_id: Uuid, transcript: &Transcript) -> DomainResult<()> {
        let result = sqlx::query("UPDATE baselines SET transcript = ? WHERE id = ?")
            .bind(serde_json::to_string(transcript)?)
            .bind(baseline_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::BaselineNotFound(baseline_id));
        }
        Ok(())
    }
}

const TEST_COLUMNS: &str = "id, suite_id, name, success_criteria, use_default_success_criteria, \
    iteration_count, use_default_iteration_count, variant_count, use_default_variant_count, \
    full_run_enabled, created_at";

#[derive(sqlx::FromRow)]
struct BotRow {
    id: String,
    name: String,
    query_selector: Option<String>,
    created_at: String,
}

impl TryFrom<BotRow> for Bot {
    type Error = DomainError;

    fn try_from(row: BotRow) -> Result<Self, Self::Error> {
        Ok(Bot {
            id: parse_uuid(&row.id)?,
            name: row.name,
            query_selector: row.query_selector,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SuiteRow {
    id: String,
    bot_id: String,
    name: String,
    default_success_criteria: String,
    default_iteration_count: i64,
    default_variant_count: i64,
    created_at: String,
}

impl TryFrom<SuiteRow> for Suite {
    type Error = DomainError;

    fn try_from(row: SuiteRow) -> Result<Self, Self::Error> {
        Ok(Suite {
            id: parse_uuid(&row.id)?,
            bot_id: parse_uuid(&row.bot_id)?,
            name: row.name,
            default_success_criteria: row.default_success_criteria,
            default_iteration_count: parse_count(row.default_iteration_count, "default_iteration_count")?,
            default_variant_count: parse_count(row.default_variant_count, "default_variant_count")?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TestRow {
    id: String,
    suite_id: String,
    name: String,
    success_criteria: String,
    use_default_success_criteria: bool,
    iteration_count: i64,
    use_default_iteration_count: bool,
    variant_count: i64,
    use_default_variant_count: bool,
    full_run_enabled: bool,
    created_at: String,
}

impl TryFrom<TestRow> for Test {
    type Error = DomainError;

    fn try_from(row: TestRow) -> Result<Self, Self::Error> {
        Ok(Test {
            id: parse_uuid(&row.id)?,
            suite_id: parse_uuid(&row.suite_id)?,
            name: row.name,
            success_criteria: row.success_criteria,
            use_default_success_criteria: row.use_default_success_criteria,
            iteration_count: parse_count(row.iteration_count, "iteration_count")?,
            use_default_iteration_count: row.use_default_iteration_count,
            variant_count: parse_count(row.variant_count, "variant_count")?,
            use_default_variant_count: row.use_default_variant_count,
            full_run_enabled: row.full_run_enabled,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BaselineRow {
    id: String,
    test_id: String,
    name: String,
    html_capture: String,
    transcript: Option<String>,
    created_at: String,
}

impl TryFrom<BaselineRow> for Baseline {
    type Error = DomainError;

    fn try_from(row: BaselineRow) -> Result<Self, Self::Error> {
        Ok(Baseline {
            id: parse_uuid(&row.id)?,
            test_id: parse_uuid(&row.test_id)?,
            name: row.name,
            html_capture: row.html_capture,
            transcript: parse_optional_json(row.transcript)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
