//! The evaluation workflow: generate a pair, persist it as a session, collect
//! grades and report on them.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    agent::Persona,
    aggregator::GradeAggregator,
    error::{ServiceError, ServiceResult, StorageError},
    evaluation::{
        AgentResponse, ContextData, EvaluationSession, EvaluationStats, GradingCriteria,
        HumanGrade, NewAgentResponse, NewHumanGrade, NewTestCase, ResponseLabel,
        ResponseMetadata, ResponseSource, SessionSummary, TestCase, Winner,
    },
    generator::{ComparisonResponses, RequestContext, ResponseGenerator},
    legacy_backend::{GradeSubmission, LegacyBackend},
    storage::{EvaluationStore, timestamp_now},
};

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 10;

const CASE_NAME_CHARS: usize = 60;

#[derive(Debug, Clone, Default)]
pub struct EvaluationRequest {
    pub document: String,
    pub user_id: Option<String>,
    /// Overrides the name derived from the document.
    pub case_name: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartedEvaluation {
    pub session_id: String,
    pub test_case: TestCase,
    pub response_1: AgentResponse,
    pub response_2: AgentResponse,
    pub is_simulated: bool,
}

#[derive(Debug, Clone)]
pub struct GradeRequest {
    pub response_id: Uuid,
    pub grader_id: String,
    pub score: i32,
    pub feedback: Option<String>,
    pub session_id: String,
    pub response_label: ResponseLabel,
    pub comparison_winner: Option<Winner>,
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonRatings {
    pub score_a: i32,
    pub score_b: i32,
    pub comment_a: Option<String>,
    pub comment_b: Option<String>,
}

pub struct EvaluationService {
    generator: ResponseGenerator,
    store: Arc<dyn EvaluationStore>,
    aggregator: GradeAggregator,
    legacy: Option<Arc<dyn LegacyBackend>>,
}

impl EvaluationService {
    pub fn new(generator: ResponseGenerator, store: Arc<dyn EvaluationStore>) -> Self {
        Self {
            generator,
            aggregator: GradeAggregator::new(Arc::clone(&store)),
            store,
            legacy: None,
        }
    }

    /// Grades for responses the legacy backend produced are forwarded to it.
    pub fn with_legacy_backend(mut self, legacy: Arc<dyn LegacyBackend>) -> Self {
        self.legacy = Some(legacy);
        self
    }

    pub async fn start_evaluation(
        &self,
        request: EvaluationRequest,
    ) -> ServiceResult<StartedEvaluation> {
        let session_id = Uuid::new_v4().to_string();
        let context = RequestContext {
            session_id: Some(session_id.clone()),
            user_id: request.user_id.clone(),
        };

        let responses = self
            .generator
            .generate_comparison_responses(&request.document, &context)
            .await?;

        let case_name = request
            .case_name
            .unwrap_or_else(|| case_name_for(&request.document));
        let test_case = self
            .store
            .create_test_case(NewTestCase {
                case_name,
                input_text: request.document.clone(),
                context_data: Some(ContextData {
                    subject: subject_line(&request.document).map(str::to_string),
                    user_id: request.user_id.clone(),
                    session_id: Some(session_id.clone()),
                    ..Default::default()
                }),
                expected_behavior: None,
                category: request.category,
                difficulty_level: None,
                created_by: request.user_id,
            })
            .await?;

        let generated_at = timestamp_now();
        let response_1 = self
            .store
            .create_agent_response(new_response(
                &test_case,
                &session_id,
                &responses,
                ResponseLabel::Response1,
                generated_at,
            ))
            .await?;
        let response_2 = self
            .store
            .create_agent_response(new_response(
                &test_case,
                &session_id,
                &responses,
                ResponseLabel::Response2,
                generated_at,
            ))
            .await?;

        info!(
            session_id = %session_id,
            test_case_id = %test_case.id,
            source = %responses.source,
            "Started evaluation session"
        );

        Ok(StartedEvaluation {
            session_id,
            test_case,
            response_1,
            response_2,
            is_simulated: responses.is_simulated(),
        })
    }

    pub async fn record_grade(&self, request: GradeRequest) -> ServiceResult<HumanGrade> {
        validate_score(request.score)?;

        let response = self
            .store
            .get_agent_response(request.response_id)
            .await?
            .ok_or(StorageError::ResponseNotFound(request.response_id))?;
        check_grade_target(&response, &request)?;
        self.ensure_not_graded(
            &response,
            &request.grader_id,
            &request.session_id,
            request.response_label,
        )
        .await?;

        let grade = self
            .store
            .create_human_grade(NewHumanGrade {
                response_id: request.response_id,
                grader_id: request.grader_id,
                score: request.score,
                feedback: request.feedback,
                grading_criteria: GradingCriteria {
                    response_name: Some(request.response_label),
                    comparison_winner: request.comparison_winner,
                },
                graded_at: timestamp_now(),
                grading_session_id: request.session_id,
            })
            .await?;

        info!(
            grade_id = %grade.id,
            response_id = %grade.response_id,
            grader_id = %grade.grader_id,
            score = grade.score,
            "Recorded grade"
        );

        self.forward_grade(&response, &grade).await;
        Ok(grade)
    }

    /// Grades both responses of a session in one go.
    pub async fn record_comparison(
        &self,
        session_id: &str,
        grader_id: &str,
        ratings: ComparisonRatings,
    ) -> ServiceResult<(HumanGrade, HumanGrade)> {
        validate_score(ratings.score_a)?;
        validate_score(ratings.score_b)?;

        let responses = self.store.responses_by_session(session_id).await?;
        if responses.is_empty() {
            return Err(ServiceError::SessionNotFound(session_id.to_string()));
        }
        let response_1 = labelled(&responses, session_id, ResponseLabel::Response1)?;
        let response_2 = labelled(&responses, session_id, ResponseLabel::Response2)?;
        // Both checks run before either write so a rejected rating leaves nothing behind.
        self.ensure_not_graded(response_1, grader_id, session_id, ResponseLabel::Response1)
            .await?;
        self.ensure_not_graded(response_2, grader_id, session_id, ResponseLabel::Response2)
            .await?;

        let winner = Winner::decide(ratings.score_a, ratings.score_b);
        let grade_1 = self
            .record_grade(GradeRequest {
                response_id: response_1.id,
                grader_id: grader_id.to_string(),
                score: ratings.score_a,
                feedback: ratings.comment_a,
                session_id: session_id.to_string(),
                response_label: ResponseLabel::Response1,
                comparison_winner: Some(winner),
            })
            .await?;
        let grade_2 = self
            .record_grade(GradeRequest {
                response_id: response_2.id,
                grader_id: grader_id.to_string(),
                score: ratings.score_b,
                feedback: ratings.comment_b,
                session_id: session_id.to_string(),
                response_label: ResponseLabel::Response2,
                comparison_winner: Some(winner),
            })
            .await?;

        Ok((grade_1, grade_2))
    }

    pub async fn compute_stats(&self, grader_id: &str) -> ServiceResult<EvaluationStats> {
        Ok(self.aggregator.compute_stats(grader_id).await?)
    }

    pub async fn recent_sessions(
        &self,
        grader_id: &str,
        limit: usize,
    ) -> ServiceResult<Vec<SessionSummary>> {
        Ok(self.aggregator.recent_sessions(grader_id, limit).await?)
    }

    pub async fn get_session(&self, session_id: &str) -> ServiceResult<EvaluationSession> {
        let responses = self.store.responses_by_session(session_id).await?;
        let Some(first) = responses.first() else {
            return Err(ServiceError::SessionNotFound(session_id.to_string()));
        };

        let test_case = self
            .store
            .get_test_case(first.test_case_id)
            .await?
            .ok_or_else(|| ServiceError::MalformedSession {
                session_id: session_id.to_string(),
                message: format!("test case {} is missing", first.test_case_id),
            })?;
        let grades = self.store.grades_by_session(session_id).await?;

        Ok(EvaluationSession {
            session_id: session_id.to_string(),
            test_case,
            responses,
            grades,
        })
    }

    pub async fn deactivate_test_case(&self, id: Uuid) -> ServiceResult<TestCase> {
        let test_case = self.store.deactivate_test_case(id).await?;
        info!(test_case_id = %id, "Deactivated test case");
        Ok(test_case)
    }

    /// `None` when no legacy backend is configured.
    pub async fn legacy_reachable(&self) -> Option<bool> {
        match &self.legacy {
            Some(legacy) => Some(legacy.ping().await),
            None => None,
        }
    }

    pub async fn close(&self) {
        self.store.close().await;
    }

    /// One grade per grader for each response and for each label of a session.
    async fn ensure_not_graded(
        &self,
        response: &AgentResponse,
        grader_id: &str,
        session_id: &str,
        label: ResponseLabel,
    ) -> ServiceResult<()> {
        let already_graded = || ServiceError::AlreadyGraded {
            grader_id: grader_id.to_string(),
            session_id: session_id.to_string(),
            label,
        };

        let response_grades = self.store.grades_by_response(response.id).await?;
        if response_grades
            .iter()
            .any(|grade| grade.grader_id == grader_id)
        {
            return Err(already_graded());
        }

        let session_grades = self.store.grades_by_session(session_id).await?;
        if session_grades.iter().any(|grade| {
            grade.grader_id == grader_id && grade.grading_criteria.response_name == Some(label)
        }) {
            return Err(already_graded());
        }

        Ok(())
    }

    async fn forward_grade(&self, response: &AgentResponse, grade: &HumanGrade) {
        let (Some(legacy), Some(backend_response_id)) =
            (&self.legacy, response.backend_response_id())
        else {
            return;
        };

        let submission = GradeSubmission {
            response_id: backend_response_id.to_string(),
            score: grade.score,
            feedback: grade.feedback.clone(),
            grading_criteria: grade.grading_criteria.clone(),
        };
        match legacy.submit_grade(&submission).await {
            Ok(()) => debug!(backend_response_id, "Forwarded grade to legacy backend"),
            Err(e) => warn!(backend_response_id, error = %e, "Failed to forward grade"),
        }
    }
}

fn validate_score(score: i32) -> ServiceResult<()> {
    if (MIN_SCORE..=MAX_SCORE).contains(&score) {
        Ok(())
    } else {
        Err(ServiceError::InvalidScore {
            score,
            min: MIN_SCORE,
            max: MAX_SCORE,
        })
    }
}

fn check_grade_target(response: &AgentResponse, request: &GradeRequest) -> ServiceResult<()> {
    if response.session_id != request.session_id {
        return Err(ServiceError::GradeMismatch {
            response_id: response.id,
            message: format!(
                "response belongs to session {}, not {}",
                response.session_id, request.session_id
            ),
        });
    }
    if let Some(label) = response
        .response_name()
        .filter(|label| *label != request.response_label)
    {
        return Err(ServiceError::GradeMismatch {
            response_id: response.id,
            message: format!("response is {label}, not {}", request.response_label),
        });
    }
    Ok(())
}

fn labelled<'a>(
    responses: &'a [AgentResponse],
    session_id: &str,
    label: ResponseLabel,
) -> ServiceResult<&'a AgentResponse> {
    responses
        .iter()
        .find(|response| response.response_name() == Some(label))
        .ok_or_else(|| ServiceError::MalformedSession {
            session_id: session_id.to_string(),
            message: format!("no response labelled {label}"),
        })
}

fn new_response(
    test_case: &TestCase,
    session_id: &str,
    responses: &ComparisonResponses,
    label: ResponseLabel,
    generated_at: chrono::DateTime<chrono::Utc>,
) -> NewAgentResponse {
    let (agent_version, text, persona) = match label {
        ResponseLabel::Response1 => (
            &responses.agent_a,
            &responses.response_a,
            Persona::document_assistant(),
        ),
        ResponseLabel::Response2 => (
            &responses.agent_b,
            &responses.response_b,
            Persona::legal_advisor(),
        ),
    };

    NewAgentResponse {
        test_case_id: test_case.id,
        agent_version: agent_version.clone(),
        response_text: text.clone(),
        response_metadata: Some(ResponseMetadata {
            response_name: Some(label),
            source: Some(responses.source),
            model: responses.model.clone(),
            temperature: (responses.source == ResponseSource::Api).then_some(persona.temperature),
            backend_response_id: responses.backend_response_id.clone(),
        }),
        generated_at,
        session_id: session_id.to_string(),
        experiment_id: None,
    }
}

fn subject_line(document: &str) -> Option<&str> {
    document.lines().map(str::trim).find_map(|line| {
        let prefix = line.get(..8)?;
        if !prefix.eq_ignore_ascii_case("subject:") {
            return None;
        }
        let subject = line[8..].trim();
        (!subject.is_empty()).then_some(subject)
    })
}

/// Display name for a document: its subject line, else its first line.
pub fn case_name_for(document: &str) -> String {
    if let Some(subject) = subject_line(document) {
        return subject.to_string();
    }
    document
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(CASE_NAME_CHARS).collect())
        .unwrap_or_else(|| "Untitled".to_string())
}
