use thiserror::Error;
use uuid::Uuid;

use crate::evaluation::ResponseLabel;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    #[error("Test case not found: {0}")]
    TestCaseNotFound(Uuid),

    #[error("Agent response not found: {0}")]
    ResponseNotFound(Uuid),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Document text is empty")]
    EmptyDocument,

    #[error("Template pool '{0}' has no entries")]
    EmptyTemplatePool(&'static str),
}

#[derive(Error, Debug)]
pub enum LegacyError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Authentication failed")]
    Authentication,

    #[error("Legacy backend unavailable: {status} {message}")]
    Unavailable { status: u16, message: String },

    #[error("Malformed legacy backend payload: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Score {score} is outside the allowed range {min}..={max}")]
    InvalidScore { score: i32, min: i32, max: i32 },

    #[error("Evaluation session not found: {0}")]
    SessionNotFound(String),

    #[error("Evaluation session {session_id} is malformed: {message}")]
    MalformedSession { session_id: String, message: String },

    #[error("Grader {grader_id} has already graded {label} of session {session_id}")]
    AlreadyGraded {
        grader_id: String,
        session_id: String,
        label: ResponseLabel,
    },

    #[error("Response {response_id} does not match the grade request: {message}")]
    GradeMismatch { response_id: Uuid, message: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;
