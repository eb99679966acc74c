//! Client for the older evaluation backend.
//!
//! The generator probes it before spending provider calls: an auth or
//! availability failure here sends the whole comparison down the simulated
//! path. Grades for responses it produced are forwarded back to it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error::LegacyError, evaluation::GradingCriteria};

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyReply {
    pub response_id: String,
    pub text: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct GradeSubmission {
    pub response_id: String,
    pub score: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub grading_criteria: GradingCriteria,
}

#[async_trait::async_trait]
pub trait LegacyBackend: Send + Sync {
    async fn create_session(&self, user_id: &str) -> Result<String, LegacyError>;

    async fn send_message(&self, session_id: &str, content: &str)
    -> Result<LegacyReply, LegacyError>;

    async fn submit_grade(&self, submission: &GradeSubmission) -> Result<(), LegacyError>;

    async fn ping(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CreatedSession {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageResult {
    id: String,
    response: String,
}

pub struct HttpLegacyBackend {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpLegacyBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|token| !token.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    async fn post(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, LegacyError> {
        let token = self.token.as_deref().ok_or(LegacyError::Authentication)?;

        let response = self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            warn!(endpoint, %status, "Legacy backend rejected credentials");
            return Err(LegacyError::Authentication);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LegacyError::Unavailable {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl LegacyBackend for HttpLegacyBackend {
    async fn create_session(&self, user_id: &str) -> Result<String, LegacyError> {
        let response = self
            .post("/chats", &serde_json::json!({ "user_id": user_id }))
            .await?;
        let envelope: Envelope<CreatedSession> = response
            .json()
            .await
            .map_err(|e| LegacyError::Malformed(e.to_string()))?;
        debug!(session_id = %envelope.result.id, "Legacy session created");
        Ok(envelope.result.id)
    }

    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<LegacyReply, LegacyError> {
        let response = self
            .post(
                &format!("/chats/{session_id}/messages"),
                &serde_json::json!({ "content": content }),
            )
            .await?;
        let envelope: Envelope<MessageResult> = response
            .json()
            .await
            .map_err(|e| LegacyError::Malformed(e.to_string()))?;
        Ok(LegacyReply {
            response_id: envelope.result.id,
            text: envelope.result.response,
        })
    }

    async fn submit_grade(&self, submission: &GradeSubmission) -> Result<(), LegacyError> {
        let body =
            serde_json::to_value(submission).map_err(|e| LegacyError::Malformed(e.to_string()))?;
        self.post("/evaluations/grade", &body).await?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        match self
            .client
            .get(format!("{}/ping", self.base_url))
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response
                .text()
                .await
                .map(|body| body.trim() == "\"pong\"")
                .unwrap_or(false),
            Ok(response) => {
                debug!(status = %response.status(), "Legacy backend ping failed");
                false
            }
            Err(e) => {
                debug!(error = %e, "Legacy backend unreachable");
                false
            }
        }
    }
}
