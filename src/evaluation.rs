use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Which side of a comparison a response or grade belongs to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResponseLabel {
    #[serde(rename = "Response 1")]
    Response1,
    #[serde(rename = "Response 2")]
    Response2,
}

impl ResponseLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseLabel::Response1 => "Response 1",
            ResponseLabel::Response2 => "Response 2",
        }
    }
}

impl fmt::Display for ResponseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Response 1" | "1" => Ok(ResponseLabel::Response1),
            "Response 2" | "2" => Ok(ResponseLabel::Response2),
            other => Err(format!("Unknown response label: {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Winner {
    #[serde(rename = "modelA")]
    ModelA,
    #[serde(rename = "modelB")]
    ModelB,
}

impl Winner {
    /// Ties go to Response 1.
    pub fn decide(response_1_score: i32, response_2_score: i32) -> Self {
        if response_1_score >= response_2_score {
            Winner::ModelA
        } else {
            Winner::ModelB
        }
    }

    pub fn label(&self) -> ResponseLabel {
        match self {
            Winner::ModelA => ResponseLabel::Response1,
            Winner::ModelB => ResponseLabel::Response2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Winner::ModelA => "modelA",
            Winner::ModelB => "modelB",
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Winner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "modelA" => Ok(Winner::ModelA),
            "modelB" => Ok(Winner::ModelB),
            other => Err(format!("Unknown winner tag: {other}")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Api,
    Simulated,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Api => "api",
            ResponseSource::Simulated => "simulated",
        }
    }
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown or non-string values deserialize to `None` so one bad row never
/// poisons a whole aggregation read.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|value| value.as_str())
        .and_then(|value| value.parse().ok()))
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub response_name: Option<ResponseLabel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ResponseSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_response_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradingCriteria {
    #[serde(default, deserialize_with = "lenient")]
    pub response_name: Option<ResponseLabel>,
    #[serde(default, deserialize_with = "lenient")]
    pub comparison_winner: Option<Winner>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: Uuid,
    pub case_name: String,
    pub input_text: String,
    pub context_data: Option<ContextData>,
    pub expected_behavior: Option<String>,
    pub category: Option<String>,
    pub difficulty_level: Option<i32>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewTestCase {
    pub case_name: String,
    pub input_text: String,
    pub context_data: Option<ContextData>,
    pub expected_behavior: Option<String>,
    pub category: Option<String>,
    pub difficulty_level: Option<i32>,
    pub created_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub id: Uuid,
    pub test_case_id: Uuid,
    pub agent_version: String,
    pub response_text: String,
    pub response_metadata: Option<ResponseMetadata>,
    pub generated_at: DateTime<Utc>,
    pub session_id: String,
    pub experiment_id: Option<String>,
}

impl AgentResponse {
    pub fn response_name(&self) -> Option<ResponseLabel> {
        self.response_metadata
            .as_ref()
            .and_then(|metadata| metadata.response_name)
    }

    pub fn backend_response_id(&self) -> Option<&str> {
        self.response_metadata
            .as_ref()
            .and_then(|metadata| metadata.backend_response_id.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct NewAgentResponse {
    pub test_case_id: Uuid,
    pub agent_version: String,
    pub response_text: String,
    pub response_metadata: Option<ResponseMetadata>,
    pub generated_at: DateTime<Utc>,
    pub session_id: String,
    pub experiment_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HumanGrade {
    pub id: Uuid,
    pub response_id: Uuid,
    pub grader_id: String,
    pub score: i32,
    pub feedback: Option<String>,
    pub grading_criteria: GradingCriteria,
    pub graded_at: DateTime<Utc>,
    pub grading_session_id: String,
}

#[derive(Debug, Clone)]
pub struct NewHumanGrade {
    pub response_id: Uuid,
    pub grader_id: String,
    pub score: i32,
    pub feedback: Option<String>,
    pub grading_criteria: GradingCriteria,
    pub graded_at: DateTime<Utc>,
    pub grading_session_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Created,
    PartiallyGraded,
    Complete,
    Overgraded,
}

impl SessionState {
    pub fn from_grade_count(count: usize) -> Self {
        match count {
            0 => SessionState::Created,
            1 => SessionState::PartiallyGraded,
            2 => SessionState::Complete,
            _ => SessionState::Overgraded,
        }
    }
}

/// A test case, its two responses and whatever grades have arrived so far.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSession {
    pub session_id: String,
    pub test_case: TestCase,
    pub responses: Vec<AgentResponse>,
    pub grades: Vec<HumanGrade>,
}

impl EvaluationSession {
    pub fn state(&self) -> SessionState {
        SessionState::from_grade_count(self.grades.len())
    }

    pub fn response(&self, label: ResponseLabel) -> Option<&AgentResponse> {
        self.responses
            .iter()
            .find(|response| response.response_name() == Some(label))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationStats {
    pub total_comparisons: usize,
    pub average_score: f64,
    #[serde(rename = "modelAWins")]
    pub model_a_wins: usize,
    #[serde(rename = "modelBWins")]
    pub model_b_wins: usize,
    pub preferred_model: ResponseLabel,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub test_case_id: Uuid,
    pub case_name: String,
    pub winner: Winner,
    #[serde(rename = "modelARating")]
    pub model_a_rating: Option<i32>,
    #[serde(rename = "modelBRating")]
    pub model_b_rating: Option<i32>,
    #[serde(rename = "modelAComment")]
    pub model_a_comment: Option<String>,
    #[serde(rename = "modelBComment")]
    pub model_b_comment: Option<String>,
    pub graded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_winner_tie_goes_to_response_one() {
        assert_eq!(Winner::decide(7, 7), Winner::ModelA);
        assert_eq!(Winner::decide(6, 7), Winner::ModelB);
        assert_eq!(Winner::decide(9, 1), Winner::ModelA);
        assert_eq!(Winner::decide(1, 10), Winner::ModelB);
        assert_eq!(Winner::ModelB.label(), ResponseLabel::Response2);
    }

    #[test]
    fn test_grading_criteria_wire_format() {
        let criteria = GradingCriteria {
            response_name: Some(ResponseLabel::Response2),
            comparison_winner: Some(Winner::ModelA),
        };
        let json = serde_json::to_value(&criteria).unwrap();
        assert_eq!(json["responseName"], "Response 2");
        assert_eq!(json["comparisonWinner"], "modelA");
    }

    #[test]
    fn test_grading_criteria_tolerates_bad_values() {
        let criteria: GradingCriteria =
            serde_json::from_str(r#"{"responseName": "Response 3", "comparisonWinner": 4}"#)
                .unwrap();
        assert_eq!(criteria, GradingCriteria::default());

        let criteria: GradingCriteria = serde_json::from_str("{}").unwrap();
        assert!(criteria.response_name.is_none());
    }

    #[test]
    fn test_context_data_keeps_unknown_keys() {
        let context: ContextData =
            serde_json::from_str(r#"{"subject": "Closing", "priority": "high"}"#).unwrap();
        assert_eq!(context.subject.as_deref(), Some("Closing"));
        assert_eq!(context.extra["priority"], "high");
    }

    #[test]
    fn test_session_state_from_grade_count() {
        assert_eq!(SessionState::from_grade_count(0), SessionState::Created);
        assert_eq!(SessionState::from_grade_count(1), SessionState::PartiallyGraded);
        assert_eq!(SessionState::from_grade_count(2), SessionState::Complete);
        assert_eq!(SessionState::from_grade_count(3), SessionState::Overgraded);
    }

    #[test]
    fn test_stats_field_names() {
        let stats = EvaluationStats {
            total_comparisons: 1,
            average_score: 6.5,
            model_a_wins: 1,
            model_b_wins: 0,
            preferred_model: ResponseLabel::Response1,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalComparisons"], 1);
        assert_eq!(json["modelAWins"], 1);
        assert_eq!(json["modelBWins"], 0);
        assert_eq!(json["preferredModel"], "Response 1");
    }
}
