use std::{collections::HashMap, sync::Arc};

use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::{
    error::StorageResult,
    evaluation::{EvaluationStats, HumanGrade, ResponseLabel, SessionSummary, Winner},
    storage::{EvaluationStore, GradingSessionRef},
};

const UNKNOWN_CASE_NAME: &str = "Unknown";

/// Turns one grader's raw grades into statistics and session summaries.
///
/// Only sessions with exactly two grades count. Anything else is a comparison
/// still in progress (or a duplicate submission) and is left out entirely.
pub struct GradeAggregator {
    store: Arc<dyn EvaluationStore>,
}

impl GradeAggregator {
    pub fn new(store: Arc<dyn EvaluationStore>) -> Self {
        Self { store }
    }

    pub async fn compute_stats(&self, grader_id: &str) -> StorageResult<EvaluationStats> {
        let grades = self.store.grades_by_grader(grader_id).await?;
        Ok(summarize_grades(&grades))
    }

    pub async fn recent_sessions(
        &self,
        grader_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<SessionSummary>> {
        let sessions = self.store.recent_grading_sessions(grader_id, limit).await?;

        let summaries = tokio_stream::iter(sessions)
            .then(|session| self.summarize_session(grader_id, session));
        tokio::pin!(summaries);

        let mut results = Vec::new();
        while let Some(summary) = summaries.next().await {
            if let Some(summary) = summary? {
                results.push(summary);
            }
        }

        Ok(results)
    }

    async fn summarize_session(
        &self,
        grader_id: &str,
        session: GradingSessionRef,
    ) -> StorageResult<Option<SessionSummary>> {
        let grades: Vec<HumanGrade> = self
            .store
            .grades_by_session(&session.session_id)
            .await?
            .into_iter()
            .filter(|grade| grade.grader_id == grader_id)
            .collect();

        if grades.len() != 2 {
            debug!(
                session_id = %session.session_id,
                grades = grades.len(),
                "Skipping incomplete session"
            );
            return Ok(None);
        }

        let Some(response) = self.store.get_agent_response(grades[0].response_id).await? else {
            warn!(
                session_id = %session.session_id,
                response_id = %grades[0].response_id,
                "Graded response is missing"
            );
            return Ok(None);
        };

        let case_name = self
            .store
            .get_test_case(response.test_case_id)
            .await?
            .map(|test_case| test_case.case_name)
            .unwrap_or_else(|| UNKNOWN_CASE_NAME.to_string());

        let graded: Vec<&HumanGrade> = grades.iter().collect();
        let response_1 = find_label(&graded, ResponseLabel::Response1);
        let response_2 = find_label(&graded, ResponseLabel::Response2);
        let winner = Winner::decide(
            response_1.map(|grade| grade.score).unwrap_or(0),
            response_2.map(|grade| grade.score).unwrap_or(0),
        );

        Ok(Some(SessionSummary {
            id: session.session_id,
            test_case_id: response.test_case_id,
            case_name,
            winner,
            model_a_rating: response_1.map(|grade| grade.score),
            model_b_rating: response_2.map(|grade| grade.score),
            model_a_comment: response_1.and_then(|grade| grade.feedback.clone()),
            model_b_comment: response_2.and_then(|grade| grade.feedback.clone()),
            graded_at: session.last_graded_at,
            created_at: session.last_graded_at,
        }))
    }
}

fn find_label<'a>(grades: &[&'a HumanGrade], label: ResponseLabel) -> Option<&'a HumanGrade> {
    grades
        .iter()
        .copied()
        .find(|grade| grade.grading_criteria.response_name == Some(label))
}

/// Pure aggregation over one grader's grades.
pub fn summarize_grades(grades: &[HumanGrade]) -> EvaluationStats {
    let mut sessions: HashMap<&str, Vec<&HumanGrade>> = HashMap::new();
    for grade in grades {
        if grade.grading_session_id.is_empty() {
            continue;
        }
        sessions
            .entry(grade.grading_session_id.as_str())
            .or_default()
            .push(grade);
    }

    let mut total_comparisons = 0;
    let mut model_a_wins = 0;
    let mut model_b_wins = 0;
    let mut score_sum = 0i64;
    let mut score_count = 0usize;

    for (session_id, session_grades) in &sessions {
        if session_grades.len() != 2 {
            continue;
        }

        let (Some(response_1), Some(response_2)) = (
            find_label(session_grades, ResponseLabel::Response1),
            find_label(session_grades, ResponseLabel::Response2),
        ) else {
            debug!(session_id = %session_id, "Skipping session with malformed grading criteria");
            continue;
        };

        total_comparisons += 1;
        match Winner::decide(response_1.score, response_2.score) {
            Winner::ModelA => model_a_wins += 1,
            Winner::ModelB => model_b_wins += 1,
        }
        score_sum += i64::from(response_1.score) + i64::from(response_2.score);
        score_count += 2;
    }

    let average_score = if score_count > 0 {
        round_to_tenth(score_sum as f64 / score_count as f64)
    } else {
        0.0
    };

    EvaluationStats {
        total_comparisons,
        average_score,
        model_a_wins,
        model_b_wins,
        preferred_model: if model_a_wins >= model_b_wins {
            ResponseLabel::Response1
        } else {
            ResponseLabel::Response2
        },
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        memory::MemoryStore,
        test_utils::{at, seed_complete_session, seed_grade, seed_responses},
    };

    fn aggregator() -> (Arc<MemoryStore>, GradeAggregator) {
        let store = Arc::new(MemoryStore::new());
        let aggregator = GradeAggregator::new(store.clone());
        (store, aggregator)
    }

    #[tokio::test]
    async fn test_no_grades() {
        let (_, aggregator) = aggregator();
        let stats = aggregator.compute_stats("nobody").await.unwrap();
        assert_eq!(
            stats,
            EvaluationStats {
                total_comparisons: 0,
                average_score: 0.0,
                model_a_wins: 0,
                model_b_wins: 0,
                preferred_model: ResponseLabel::Response1,
            }
        );
    }

    #[tokio::test]
    async fn test_three_sessions_with_tie() {
        let (store, aggregator) = aggregator();
        seed_complete_session(store.as_ref(), "alice", "s1", 8, 6, 0).await;
        seed_complete_session(store.as_ref(), "alice", "s2", 5, 5, 10).await;
        seed_complete_session(store.as_ref(), "alice", "s3", 9, 7, 20).await;

        let stats = aggregator.compute_stats("alice").await.unwrap();
        assert_eq!(stats.total_comparisons, 3);
        assert_eq!(stats.model_a_wins, 3);
        assert_eq!(stats.model_b_wins, 0);
        assert_eq!(stats.average_score, 6.7);
        assert_eq!(stats.preferred_model, ResponseLabel::Response1);
    }

    #[tokio::test]
    async fn test_response_two_preferred() {
        let (store, aggregator) = aggregator();
        seed_complete_session(store.as_ref(), "alice", "s1", 6, 7, 0).await;
        seed_complete_session(store.as_ref(), "alice", "s2", 2, 9, 10).await;
        seed_complete_session(store.as_ref(), "alice", "s3", 7, 7, 20).await;

        let stats = aggregator.compute_stats("alice").await.unwrap();
        assert_eq!(stats.model_a_wins, 1);
        assert_eq!(stats.model_b_wins, 2);
        assert_eq!(stats.preferred_model, ResponseLabel::Response2);
        assert_eq!(stats.average_score, 6.3);
    }

    #[tokio::test]
    async fn test_equal_wins_prefer_response_one() {
        let (store, aggregator) = aggregator();
        seed_complete_session(store.as_ref(), "alice", "s1", 3, 8, 0).await;
        seed_complete_session(store.as_ref(), "alice", "s2", 8, 3, 10).await;

        let stats = aggregator.compute_stats("alice").await.unwrap();
        assert_eq!(stats.model_a_wins, 1);
        assert_eq!(stats.model_b_wins, 1);
        assert_eq!(stats.preferred_model, ResponseLabel::Response1);
    }

    #[tokio::test]
    async fn test_single_grade_session_is_invisible() {
        let (store, aggregator) = aggregator();
        seed_complete_session(store.as_ref(), "alice", "complete", 4, 6, 0).await;
        let (_, response_1, _) = seed_responses(store.as_ref(), "half").await;
        seed_grade(
            store.as_ref(),
            &response_1,
            "alice",
            Some(ResponseLabel::Response1),
            10,
            at(50),
        )
        .await;

        let stats = aggregator.compute_stats("alice").await.unwrap();
        assert_eq!(stats.total_comparisons, 1);
        assert_eq!(stats.average_score, 5.0);
        assert_eq!(stats.model_b_wins, 1);

        let sessions = aggregator.recent_sessions("alice", 10).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "complete");
    }

    #[tokio::test]
    async fn test_malformed_criteria_are_skipped() {
        let (store, aggregator) = aggregator();
        seed_complete_session(store.as_ref(), "alice", "good", 9, 1, 0).await;
        let (_, response_1, response_2) = seed_responses(store.as_ref(), "bad").await;
        seed_grade(store.as_ref(), &response_1, "alice", None, 1, at(5)).await;
        seed_grade(
            store.as_ref(),
            &response_2,
            "alice",
            Some(ResponseLabel::Response2),
            10,
            at(6),
        )
        .await;

        let stats = aggregator.compute_stats("alice").await.unwrap();
        assert_eq!(stats.total_comparisons, 1);
        assert_eq!(stats.model_a_wins, 1);
        assert_eq!(stats.average_score, 5.0);

        let sessions = aggregator.recent_sessions("alice", 10).await.unwrap();
        let bad = sessions.iter().find(|s| s.id == "bad").unwrap();
        assert_eq!(bad.model_a_rating, None);
        assert_eq!(bad.model_b_rating, Some(10));
        assert_eq!(bad.winner, Winner::ModelB);
    }

    #[tokio::test]
    async fn test_recent_sessions_order_limit_and_grader() {
        let (store, aggregator) = aggregator();
        for (index, session) in ["s0", "s1", "s2", "s3", "s4", "s5", "s6"].iter().enumerate() {
            seed_complete_session(store.as_ref(), "alice", session, 7, 7, index as i64 * 10)
                .await;
        }
        seed_complete_session(store.as_ref(), "bob", "bobs", 1, 2, 500).await;

        let sessions = aggregator.recent_sessions("alice", 5).await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s6", "s5", "s4", "s3", "s2"]);
        assert!(
            sessions
                .windows(2)
                .all(|pair| pair[0].graded_at >= pair[1].graded_at)
        );
        assert!(sessions.iter().all(|s| s.winner == Winner::ModelA));
    }

    #[tokio::test]
    async fn test_recent_session_fields() {
        let (store, aggregator) = aggregator();
        let test_case = seed_complete_session(store.as_ref(), "alice", "s1", 6, 7, 0).await;

        let sessions = aggregator.recent_sessions("alice", 5).await.unwrap();
        assert_eq!(sessions.len(), 1);
        let summary = &sessions[0];
        assert_eq!(summary.test_case_id, test_case.id);
        assert_eq!(summary.case_name, "Case s1");
        assert_eq!(summary.winner, Winner::ModelB);
        assert_eq!(summary.model_a_rating, Some(6));
        assert_eq!(summary.model_b_rating, Some(7));
        assert_eq!(summary.model_a_comment.as_deref(), Some("feedback 6"));
        assert_eq!(summary.model_b_comment.as_deref(), Some("feedback 7"));
        assert_eq!(summary.graded_at, at(0) + chrono::Duration::seconds(1));
        assert_eq!(summary.created_at, summary.graded_at);
    }

    #[tokio::test]
    async fn test_other_graders_do_not_complete_a_session() {
        let (store, aggregator) = aggregator();
        let (_, response_1, response_2) = seed_responses(store.as_ref(), "shared").await;
        seed_grade(
            store.as_ref(),
            &response_1,
            "alice",
            Some(ResponseLabel::Response1),
            8,
            at(0),
        )
        .await;
        seed_grade(
            store.as_ref(),
            &response_2,
            "bob",
            Some(ResponseLabel::Response2),
            3,
            at(1),
        )
        .await;

        assert!(aggregator.recent_sessions("alice", 5).await.unwrap().is_empty());
        assert_eq!(aggregator.compute_stats("bob").await.unwrap().total_comparisons, 0);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_to_tenth(6.666_666), 6.7);
        assert_eq!(round_to_tenth(6.25), 6.3);
        assert_eq!(round_to_tenth(5.0), 5.0);
    }
}
