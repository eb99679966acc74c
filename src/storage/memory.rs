use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EvaluationStore, GradingSessionRef, timestamp_now};
use crate::error::{StorageError, StorageResult};
use crate::evaluation::{
    AgentResponse, HumanGrade, NewAgentResponse, NewHumanGrade, NewTestCase, TestCase,
};

#[derive(Default)]
struct Tables {
    test_cases: HashMap<Uuid, TestCase>,
    responses: HashMap<Uuid, AgentResponse>,
    // Insertion order breaks timestamp ties the same way SQLite's rowid does.
    grades: Vec<HumanGrade>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut grades: Vec<HumanGrade>) -> Vec<HumanGrade> {
    grades.reverse();
    grades.sort_by(|a, b| b.graded_at.cmp(&a.graded_at));
    grades
}

#[async_trait]
impl EvaluationStore for MemoryStore {
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

        let mut tables = self.tables.write().await;
        tables.test_cases.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_test_case(&self, id: Uuid) -> StorageResult<Option<TestCase>> {
        Ok(self.tables.read().await.test_cases.get(&id).cloned())
    }

    async fn deactivate_test_case(&self, id: Uuid) -> StorageResult<TestCase> {
        let mut tables = self.tables.write().await;
        let test_case = tables
            .test_cases
            .get_mut(&id)
            .ok_or(StorageError::TestCaseNotFound(id))?;
        test_case.is_active = false;
        test_case.updated_at = timestamp_now();
        Ok(test_case.clone())
    }

    async fn create_agent_response(
        &self,
        response: NewAgentResponse,
    ) -> StorageResult<AgentResponse> {
        let mut tables = self.tables.write().await;
        if !tables.test_cases.contains_key(&response.test_case_id) {
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
        tables.responses.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_agent_response(&self, id: Uuid) -> StorageResult<Option<AgentResponse>> {
        Ok(self.tables.read().await.responses.get(&id).cloned())
    }

    async fn responses_by_session(&self, session_id: &str) -> StorageResult<Vec<AgentResponse>> {
        let tables = self.tables.read().await;
        let mut responses: Vec<AgentResponse> = tables
            .responses
            .values()
            .filter(|response| response.session_id == session_id)
            .cloned()
            .collect();
        responses.sort_by(|a, b| {
            a.generated_at
                .cmp(&b.generated_at)
                .then_with(|| a.response_name().cmp(&b.response_name()))
        });
        Ok(responses)
    }

    async fn create_human_grade(&self, grade: NewHumanGrade) -> StorageResult<HumanGrade> {
        let mut tables = self.tables.write().await;
        if !tables.responses.contains_key(&grade.response_id) {
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
        tables.grades.push(record.clone());
        Ok(record)
    }

    async fn grades_by_response(&self, response_id: Uuid) -> StorageResult<Vec<HumanGrade>> {
        let tables = self.tables.read().await;
        Ok(tables
            .grades
            .iter()
            .filter(|grade| grade.response_id == response_id)
            .cloned()
            .collect())
    }

    async fn grades_by_grader(&self, grader_id: &str) -> StorageResult<Vec<HumanGrade>> {
        let tables = self.tables.read().await;
        let grades = tables
            .grades
            .iter()
            .filter(|grade| grade.grader_id == grader_id)
            .cloned()
            .collect();
        Ok(newest_first(grades))
    }

    async fn grades_by_session(&self, session_id: &str) -> StorageResult<Vec<HumanGrade>> {
        let tables = self.tables.read().await;
        Ok(tables
            .grades
            .iter()
            .filter(|grade| grade.grading_session_id == session_id)
            .cloned()
            .collect())
    }

    async fn recent_grading_sessions(
        &self,
        grader_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<GradingSessionRef>> {
        let tables = self.tables.read().await;
        let mut latest: HashMap<&str, GradingSessionRef> = HashMap::new();

        for grade in tables
            .grades
            .iter()
            .filter(|grade| grade.grader_id == grader_id && !grade.grading_session_id.is_empty())
        {
            latest
                .entry(grade.grading_session_id.as_str())
                .and_modify(|session| {
                    if grade.graded_at > session.last_graded_at {
                        session.last_graded_at = grade.graded_at;
                    }
                })
                .or_insert_with(|| GradingSessionRef {
                    session_id: grade.grading_session_id.clone(),
                    last_graded_at: grade.graded_at,
                });
        }

        let mut sessions: Vec<GradingSessionRef> = latest.into_values().collect();
        sessions.sort_by(|a, b| {
            b.last_graded_at
                .cmp(&a.last_graded_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        sessions.truncate(limit);
        Ok(sessions)
    }
}
