//! Persistence for test cases, generated responses and human grades.
//!
//! Two backends sit behind [`EvaluationStore`]: [`memory::MemoryStore`] for
//! tests and throwaway runs, [`sqlite::SqliteStore`] for anything that must
//! survive the process. The backend is chosen once at startup and injected.

pub mod memory;
pub mod sqlite;

#[cfg(test)]
pub mod test_utils;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::evaluation::{
    AgentResponse, HumanGrade, NewAgentResponse, NewHumanGrade, NewTestCase, TestCase,
};

/// A grading session id with the newest grade timestamp it has seen.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingSessionRef {
    pub session_id: String,
    pub last_graded_at: DateTime<Utc>,
}

#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn create_test_case(&self, test_case: NewTestCase) -> StorageResult<TestCase>;

    async fn get_test_case(&self, id: Uuid) -> StorageResult<Option<TestCase>>;

    /// Soft delete; test cases are never removed.
    async fn deactivate_test_case(&self, id: Uuid) -> StorageResult<TestCase>;

    /// Fails with `TestCaseNotFound` when the owning test case does not exist.
    async fn create_agent_response(&self, response: NewAgentResponse)
    -> StorageResult<AgentResponse>;

    async fn get_agent_response(&self, id: Uuid) -> StorageResult<Option<AgentResponse>>;

    /// Ordered by generation time, oldest first.
    async fn responses_by_session(&self, session_id: &str) -> StorageResult<Vec<AgentResponse>>;

    /// Fails with `ResponseNotFound` when the graded response does not exist.
    async fn create_human_grade(&self, grade: NewHumanGrade) -> StorageResult<HumanGrade>;

    async fn grades_by_response(&self, response_id: Uuid) -> StorageResult<Vec<HumanGrade>>;

    /// Newest first.
    async fn grades_by_grader(&self, grader_id: &str) -> StorageResult<Vec<HumanGrade>>;

    async fn grades_by_session(&self, session_id: &str) -> StorageResult<Vec<HumanGrade>>;

    /// Distinct grading sessions of one grader, newest grade first, at most `limit`.
    async fn recent_grading_sessions(
        &self,
        grader_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<GradingSessionRef>>;

    async fn close(&self) {}
}

/// Current time at millisecond precision, the resolution every backend keeps.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
