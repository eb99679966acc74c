//! Fixtures shared by store, aggregator and service tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::EvaluationStore;
use crate::evaluation::{
    AgentResponse, GradingCriteria, HumanGrade, NewAgentResponse, NewHumanGrade, NewTestCase,
    ResponseLabel, ResponseMetadata, ResponseSource, TestCase, Winner,
};

/// Fixed base time so ordering assertions do not depend on the clock.
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub async fn seed_test_case(store: &dyn EvaluationStore, case_name: &str) -> TestCase {
    store
        .create_test_case(NewTestCase {
            case_name: case_name.to_string(),
            input_text: format!("Hi Manny,\n{case_name}\nThank you,\nRebecca Collins"),
            category: Some("Buyer Inquiry".to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub async fn seed_response(
    store: &dyn EvaluationStore,
    test_case: &TestCase,
    session_id: &str,
    label: ResponseLabel,
) -> AgentResponse {
    let agent_version = match label {
        ResponseLabel::Response1 => "compose_agent_simulated",
        ResponseLabel::Response2 => "research_agent_simulated",
    };
    store
        .create_agent_response(NewAgentResponse {
            test_case_id: test_case.id,
            agent_version: agent_version.to_string(),
            response_text: format!("Dear Rebecca Collins, {label}"),
            response_metadata: Some(ResponseMetadata {
                response_name: Some(label),
                source: Some(ResponseSource::Simulated),
                ..Default::default()
            }),
            generated_at: at(0),
            session_id: session_id.to_string(),
            experiment_id: None,
        })
        .await
        .unwrap()
}

/// One test case named after the session with its two responses.
pub async fn seed_responses(
    store: &dyn EvaluationStore,
    session_id: &str,
) -> (TestCase, AgentResponse, AgentResponse) {
    let test_case = seed_test_case(store, &format!("Case {session_id}")).await;
    let response_1 = seed_response(store, &test_case, session_id, ResponseLabel::Response1).await;
    let response_2 = seed_response(store, &test_case, session_id, ResponseLabel::Response2).await;
    (test_case, response_1, response_2)
}

pub async fn seed_grade(
    store: &dyn EvaluationStore,
    response: &AgentResponse,
    grader_id: &str,
    label: Option<ResponseLabel>,
    score: i32,
    graded_at: DateTime<Utc>,
) -> HumanGrade {
    store
        .create_human_grade(NewHumanGrade {
            response_id: response.id,
            grader_id: grader_id.to_string(),
            score,
            feedback: Some(format!("feedback {score}")),
            grading_criteria: GradingCriteria {
                response_name: label,
                comparison_winner: None,
            },
            graded_at,
            grading_session_id: response.session_id.clone(),
        })
        .await
        .unwrap()
}

/// A fully graded comparison: Response 1 graded at `minute`, Response 2 one second later.
pub async fn seed_complete_session(
    store: &dyn EvaluationStore,
    grader_id: &str,
    session_id: &str,
    score_1: i32,
    score_2: i32,
    minute: i64,
) -> TestCase {
    let (test_case, response_1, response_2) = seed_responses(store, session_id).await;
    seed_grade(
        store,
        &response_1,
        grader_id,
        Some(ResponseLabel::Response1),
        score_1,
        at(minute),
    )
    .await;
    seed_grade(
        store,
        &response_2,
        grader_id,
        Some(ResponseLabel::Response2),
        score_2,
        at(minute) + Duration::seconds(1),
    )
    .await;
    test_case
}

/// Behaviour every `EvaluationStore` backend must share.
pub mod conformance {
    use super::*;
    use crate::error::StorageError;
    use uuid::Uuid;

    pub async fn round_trip_records(store: &dyn EvaluationStore) {
        let (test_case, response_1, response_2) = seed_responses(store, "session-1").await;

        let loaded = store.get_test_case(test_case.id).await.unwrap().unwrap();
        assert_eq!(loaded, test_case);
        assert!(loaded.is_active);

        let loaded = store.get_agent_response(response_2.id).await.unwrap().unwrap();
        assert_eq!(loaded, response_2);
        assert_eq!(loaded.response_name(), Some(ResponseLabel::Response2));

        let session = store.responses_by_session("session-1").await.unwrap();
        assert_eq!(session, vec![response_1.clone(), response_2]);

        let grade = store
            .create_human_grade(NewHumanGrade {
                response_id: response_1.id,
                grader_id: "grader-1".to_string(),
                score: 8,
                feedback: None,
                grading_criteria: GradingCriteria {
                    response_name: Some(ResponseLabel::Response1),
                    comparison_winner: Some(Winner::ModelA),
                },
                graded_at: at(5),
                grading_session_id: "session-1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(
            store.grades_by_response(response_1.id).await.unwrap(),
            vec![grade]
        );

        assert!(store.get_test_case(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.get_agent_response(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.responses_by_session("missing").await.unwrap().is_empty());
    }

    pub async fn foreign_keys_are_checked(store: &dyn EvaluationStore) {
        let orphan_case = Uuid::new_v4();
        let err = store
            .create_agent_response(NewAgentResponse {
                test_case_id: orphan_case,
                agent_version: "compose_agent".to_string(),
                response_text: "text".to_string(),
                response_metadata: None,
                generated_at: at(0),
                session_id: "s".to_string(),
                experiment_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TestCaseNotFound(id) if id == orphan_case));

        let orphan_response = Uuid::new_v4();
        let err = store
            .create_human_grade(NewHumanGrade {
                response_id: orphan_response,
                grader_id: "grader".to_string(),
                score: 5,
                feedback: None,
                grading_criteria: GradingCriteria::default(),
                graded_at: at(0),
                grading_session_id: "s".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ResponseNotFound(id) if id == orphan_response));
    }

    pub async fn grade_queries(store: &dyn EvaluationStore) {
        let (_, response_1, response_2) = seed_responses(store, "session-q").await;
        let first = seed_grade(
            store,
            &response_1,
            "alice",
            Some(ResponseLabel::Response1),
            6,
            at(1),
        )
        .await;
        let second = seed_grade(
            store,
            &response_2,
            "alice",
            Some(ResponseLabel::Response2),
            9,
            at(3),
        )
        .await;
        let other = seed_grade(
            store,
            &response_2,
            "bob",
            Some(ResponseLabel::Response2),
            2,
            at(2),
        )
        .await;

        let alice = store.grades_by_grader("alice").await.unwrap();
        assert_eq!(alice, vec![second.clone(), first.clone()]);

        let session = store.grades_by_session("session-q").await.unwrap();
        assert_eq!(session, vec![first, second, other]);

        assert!(store.grades_by_grader("nobody").await.unwrap().is_empty());
    }

    pub async fn recent_grading_sessions(store: &dyn EvaluationStore) {
        seed_complete_session(store, "alice", "old", 5, 5, 0).await;
        seed_complete_session(store, "alice", "new", 7, 3, 30).await;
        seed_complete_session(store, "alice", "middle", 4, 8, 10).await;
        seed_complete_session(store, "bob", "bobs", 9, 9, 60).await;

        let sessions = store.recent_grading_sessions("alice", 10).await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "middle", "old"]);
        assert_eq!(sessions[0].last_graded_at, at(30) + Duration::seconds(1));

        let limited = store.recent_grading_sessions("alice", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].session_id, "middle");

        assert!(store.recent_grading_sessions("carol", 5).await.unwrap().is_empty());
    }

    pub async fn deactivate_test_case(store: &dyn EvaluationStore) {
        let test_case = seed_test_case(store, "retired").await;
        let updated = store.deactivate_test_case(test_case.id).await.unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.input_text, test_case.input_text);

        let loaded = store.get_test_case(test_case.id).await.unwrap().unwrap();
        assert!(!loaded.is_active);

        let missing = Uuid::new_v4();
        assert!(matches!(
            store.deactivate_test_case(missing).await,
            Err(StorageError::TestCaseNotFound(id)) if id == missing
        ));
    }
}
