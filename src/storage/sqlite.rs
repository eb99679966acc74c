//! SQLite storage backend.
//!
//! Timestamps are stored as Unix milliseconds so `ORDER BY` and `MAX()` work
//! on plain integers. The typed metadata structs are stored as JSON text.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};
use uuid::Uuid;

use super::{EvaluationStore, GradingSessionRef, timestamp_now};
use crate::error::{StorageError, StorageResult};
use crate::evaluation::{
    AgentResponse, HumanGrade, NewAgentResponse, NewHumanGrade, NewTestCase, TestCase,
};

const SCHEMA: [&str; 7] = [
    "CREATE TABLE IF NOT EXISTS evaluation_test_cases (
        id TEXT PRIMARY KEY NOT NULL,
        case_name TEXT NOT NULL,
        input_text TEXT NOT NULL,
        context_data TEXT,
        expected_behavior TEXT,
        category TEXT,
        difficulty_level INTEGER,
        created_by TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS agent_responses (
        id TEXT PRIMARY KEY NOT NULL,
        test_case_id TEXT NOT NULL REFERENCES evaluation_test_cases(id),
        agent_version TEXT NOT NULL,
        response_text TEXT NOT NULL,
        response_metadata TEXT,
        generated_at INTEGER NOT NULL,
        session_id TEXT NOT NULL,
        experiment_id TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_agent_responses_session ON agent_responses(session_id)",
    "CREATE TABLE IF NOT EXISTS human_grades (
        id TEXT PRIMARY KEY NOT NULL,
        response_id TEXT NOT NULL REFERENCES agent_responses(id),
        grader_id TEXT NOT NULL,
        score INTEGER NOT NULL,
        feedback TEXT,
        grading_criteria TEXT NOT NULL,
        graded_at INTEGER NOT NULL,
        grading_session_id TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_human_grades_grader ON human_grades(grader_id, graded_at)",
    "CREATE INDEX IF NOT EXISTS idx_human_grades_session ON human_grades(grading_session_id)",
    "CREATE INDEX IF NOT EXISTS idx_human_grades_response ON human_grades(response_id)",
];

const TEST_CASE_COLUMNS: &str = "id, case_name, input_text, context_data, expected_behavior, category, difficulty_level, created_by, created_at, updated_at, is_active";
const RESPONSE_COLUMNS: &str = "id, test_case_id, agent_version, response_text, response_metadata, generated_at, session_id, experiment_id";
const GRADE_COLUMNS: &str = "id, response_id, grader_id, score, feedback, grading_criteria, graded_at, grading_session_id";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `database_url` and applies the schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        info!("Connecting to SQLite database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    #[cfg(test)]
    /// A private in-memory database. One connection, kept alive for the pool's lifetime,
    /// since every new SQLite memory connection starts empty.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("SQLite schema ready");
        Ok(())
    }

    async fn fetch_grades(&self, filter: &str, value: &str) -> StorageResult<Vec<HumanGrade>> {
        let sql = format!("SELECT {GRADE_COLUMNS} FROM human_grades WHERE {filter}");
        let rows = sqlx::query_as::<_, GradeRow>(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(HumanGrade::try_from).collect()
    }
}

#[async_trait]
impl EvaluationStore for SqliteStore {
    async fn create_test_case(&self, test_case: NewTestCase) -> StorageResult<TestCase> {
        let now = timestamp_now();
        let record = TestCase {
            id: Uuid::new_v4(),
            case_name: test_case.case_name,
            input_text: test_case.input_text,
            context_data: test_case.context_data,
            expected_behavior: test_case.expected_behavior,
            category: test_case.category,
            difficulty_level: test_case.difficulty_level,
            created_by: test_case.created_by,
            created_at: now,
            updated_at: now,
            is_active: true,
        };

        sqlx::query(&format!(
            "INSERT INTO evaluation_test_cases ({TEST_CASE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(record.id.to_string())
        .bind(&record.case_name)
        .bind(&record.input_text)
        .bind(to_json(&record.context_data)?)
        .bind(&record.expected_behavior)
        .bind(&record.category)
        .bind(record.difficulty_level)
        .bind(&record.created_by)
        .bind(record.created_at.timestamp_millis())
        .bind(record.updated_at.timestamp_millis())
        .bind(record.is_active)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_test_case(&self, id: Uuid) -> StorageResult<Option<TestCase>> {
        let row = sqlx::query_as::<_, TestCaseRow>(&format!(
            "SELECT {TEST_CASE_COLUMNS} FROM evaluation_test_cases WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TestCase::try_from).transpose()
    }

    async fn deactivate_test_case(&self, id: Uuid) -> StorageResult<TestCase> {
        let result = sqlx::query(
            "UPDATE evaluation_test_cases SET is_active = 0, updated_at = ? WHERE id = ?",
        )
        .bind(timestamp_now().timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::TestCaseNotFound(id));
        }

        self.get_test_case(id)
            .await?
            .ok_or(StorageError::TestCaseNotFound(id))
    }

    async fn create_agent_response(
        &self,
        response: NewAgentResponse,
    ) -> StorageResult<AgentResponse> {
        if self.get_test_case(response.test_case_id).await?.is_none() {
            return Err(StorageError::TestCaseNotFound(response.test_case_id));
        }

        let record = AgentResponse {
            id: Uuid::new_v4(),
            test_case_id: response.test_case_id,
            agent_version: response.agent_version,
            response_text: response.response_text,
            response_metadata: response.response_metadata,
            generated_at: response.generated_at,
            session_id: response.session_id,
            experiment_id: response.experiment_id,
        };

        sqlx::query(&format!(
            "INSERT INTO agent_responses ({RESPONSE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(record.id.to_string())
        .bind(record.test_case_id.to_string())
        .bind(&record.agent_version)
        .bind(&record.response_text)
        .bind(to_json(&record.response_metadata)?)
        .bind(record.generated_at.timestamp_millis())
        .bind(&record.session_id)
        .bind(&record.experiment_id)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_agent_response(&self, id: Uuid) -> StorageResult<Option<AgentResponse>> {
        let row = sqlx::query_as::<_, ResponseRow>(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM agent_responses WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(AgentResponse::try_from).transpose()
    }

    async fn responses_by_session(&self, session_id: &str) -> StorageResult<Vec<AgentResponse>> {
        let rows = sqlx::query_as::<_, ResponseRow>(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM agent_responses WHERE session_id = ? ORDER BY generated_at ASC, rowid ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AgentResponse::try_from).collect()
    }

    async fn create_human_grade(&self, grade: NewHumanGrade) -> StorageResult<HumanGrade> {
        if self.get_agent_response(grade.response_id).await?.is_none() {
            return Err(StorageError::ResponseNotFound(grade.response_id));
        }

        let record = HumanGrade {
            id: Uuid::new_v4(),
            response_id: grade.response_id,
            grader_id: grade.grader_id,
            score: grade.score,
            feedback: grade.feedback,
            grading_criteria: grade.grading_criteria,
            graded_at: grade.graded_at,
            grading_session_id: grade.grading_session_id,
        };

        sqlx::query(&format!(
            "INSERT INTO human_grades ({GRADE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(record.id.to_string())
        .bind(record.response_id.to_string())
        .bind(&record.grader_id)
        .bind(record.score)
        .bind(&record.feedback)
        .bind(serde_json::to_string(&record.grading_criteria)?)
        .bind(record.graded_at.timestamp_millis())
        .bind(&record.grading_session_id)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn grades_by_response(&self, response_id: Uuid) -> StorageResult<Vec<HumanGrade>> {
        self.fetch_grades("response_id = ? ORDER BY rowid ASC", &response_id.to_string())
            .await
    }

    async fn grades_by_grader(&self, grader_id: &str) -> StorageResult<Vec<HumanGrade>> {
        self.fetch_grades("grader_id = ? ORDER BY graded_at DESC, rowid DESC", grader_id)
            .await
    }

    async fn grades_by_session(&self, session_id: &str) -> StorageResult<Vec<HumanGrade>> {
        self.fetch_grades("grading_session_id = ? ORDER BY rowid ASC", session_id)
            .await
    }

    async fn recent_grading_sessions(
        &self,
        grader_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<GradingSessionRef>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT grading_session_id, MAX(graded_at) AS last_graded_at
             FROM human_grades
             WHERE grader_id = ? AND grading_session_id <> ''
             GROUP BY grading_session_id
             ORDER BY last_graded_at DESC, grading_session_id ASC
             LIMIT ?",
        )
        .bind(grader_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(session_id, last_graded_at)| {
                Ok(GradingSessionRef {
                    session_id,
                    last_graded_at: from_millis("human_grades", last_graded_at)?,
                })
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("SQLite connection closed");
    }
}

fn to_json<T: Serialize>(value: &Option<T>) -> StorageResult<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StorageError::from)
}

fn from_json<T: DeserializeOwned>(value: Option<String>) -> StorageResult<Option<T>> {
    value
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(StorageError::from)
}

fn parse_uuid(table: &'static str, raw: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StorageError::CorruptRow {
        table,
        message: format!("invalid id '{raw}': {e}"),
    })
}

fn from_millis(table: &'static str, millis: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| StorageError::CorruptRow {
        table,
        message: format!("timestamp out of range: {millis}"),
    })
}

#[derive(sqlx::FromRow)]
struct TestCaseRow {
    id: String,
    case_name: String,
    input_text: String,
    context_data: Option<String>,
    expected_behavior: Option<String>,
    category: Option<String>,
    difficulty_level: Option<i32>,
    created_by: Option<String>,
    created_at: i64,
    updated_at: i64,
    is_active: bool,
}

impl TryFrom<TestCaseRow> for TestCase {
    type Error = StorageError;

    fn try_from(row: TestCaseRow) -> Result<Self, Self::Error> {
        const TABLE: &str = "evaluation_test_cases";
        Ok(TestCase {
            id: parse_uuid(TABLE, &row.id)?,
            case_name: row.case_name,
            input_text: row.input_text,
            context_data: from_json(row.context_data)?,
            expected_behavior: row.expected_behavior,
            category: row.category,
            difficulty_level: row.difficulty_level,
            created_by: row.created_by,
            created_at: from_millis(TABLE, row.created_at)?,
            updated_at: from_millis(TABLE, row.updated_at)?,
            is_active: row.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResponseRow {
    id: String,
    test_case_id: String,
    agent_version: String,
    response_text: String,
    response_metadata: Option<String>,
    generated_at: i64,
    session_id: String,
    experiment_id: Option<String>,
}

impl TryFrom<ResponseRow> for AgentResponse {
    type Error = StorageError;

    fn try_from(row: ResponseRow) -> Result<Self, Self::Error> {
        const TABLE: &str = "agent_responses";
        Ok(AgentResponse {
            id: parse_uuid(TABLE, &row.id)?,
            test_case_id: parse_uuid(TABLE, &row.test_case_id)?,
            agent_version: row.agent_version,
            response_text: row.response_text,
            response_metadata: from_json(row.response_metadata)?,
            generated_at: from_millis(TABLE, row.generated_at)?,
            session_id: row.session_id,
            experiment_id: row.experiment_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GradeRow {
    id: String,
    response_id: String,
    grader_id: String,
    score: i32,
    feedback: Option<String>,
    grading_criteria: String,
    graded_at: i64,
    grading_session_id: String,
}

impl TryFrom<GradeRow> for HumanGrade {
    type Error = StorageError;

    fn try_from(row: GradeRow) -> Result<Self, Self::Error> {
        const TABLE: &str = "human_grades";
        Ok(HumanGrade {
            id: parse_uuid(TABLE, &row.id)?,
            response_id: parse_uuid(TABLE, &row.response_id)?,
            grader_id: row.grader_id,
            score: row.score,
            feedback: row.feedback,
            // Criteria that fail to parse still count as a grade; they are skipped at aggregation.
            grading_criteria: serde_json::from_str(&row.grading_criteria).unwrap_or_default(),
            graded_at: from_millis(TABLE, row.graded_at)?,
            grading_session_id: row.grading_session_id,
        })
    }
}
