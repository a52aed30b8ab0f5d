use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StreamdexError {
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Consumer group {group} not found on topic {topic}")]
    GroupNotFound { topic: String, group: String },

    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("Missing required field {field} for entity {entity}")]
    MissingField { entity: String, field: String },

    #[error("Malformed stream entry: {0}")]
    MalformedEntry(String),

    #[error("Document {id} not found in {entity}")]
    DocumentNotFound { entity: String, id: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Field not found in schema: {0}")]
    FieldNotFound(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Tantivy error: {0}")]
    Tantivy(String),

    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, StreamdexError>;

impl From<std::io::Error> for StreamdexError {
    fn from(e: std::io::Error) -> Self {
        StreamdexError::Io(e.to_string())
    }
}

impl From<tantivy::TantivyError> for StreamdexError {
    fn from(e: tantivy::TantivyError) -> Self {
        StreamdexError::Tantivy(e.to_string())
    }
}

impl From<tantivy::query::QueryParserError> for StreamdexError {
    fn from(e: tantivy::query::QueryParserError) -> Self {
        StreamdexError::QueryParse(e.to_string())
    }
}

impl From<serde_json::Error> for StreamdexError {
    fn from(e: serde_json::Error) -> Self {
        StreamdexError::Json(e.to_string())
    }
}

impl StreamdexError {
    /// Errors that mean the change log itself is unusable. The consumption
    /// loop stops on these instead of moving on to the next entry.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StreamdexError::Transport(_)
                | StreamdexError::Io(_)
                | StreamdexError::TopicNotFound(_)
                | StreamdexError::GroupNotFound { .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            StreamdexError::TopicNotFound(_) => StatusCode::NOT_FOUND,
            StreamdexError::GroupNotFound { .. } => StatusCode::NOT_FOUND,
            StreamdexError::UnknownEntity(_) => StatusCode::NOT_FOUND,
            StreamdexError::MissingField { .. } => StatusCode::BAD_REQUEST,
            StreamdexError::MalformedEntry(_) => StatusCode::BAD_REQUEST,
            StreamdexError::DocumentNotFound { .. } => StatusCode::NOT_FOUND,
            StreamdexError::InvalidDocument(_) => StatusCode::BAD_REQUEST,
            StreamdexError::FieldNotFound(_) => StatusCode::BAD_REQUEST,
            StreamdexError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StreamdexError::Tantivy(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StreamdexError::QueryParse(_) => StatusCode::BAD_REQUEST,
            StreamdexError::Json(_) => StatusCode::BAD_REQUEST,
            StreamdexError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            StreamdexError::TopicNotFound(_) => "topic_not_found",
            StreamdexError::GroupNotFound { .. } => "group_not_found",
            StreamdexError::UnknownEntity(_) => "unknown_entity",
            StreamdexError::MissingField { .. } => "missing_field",
            StreamdexError::MalformedEntry(_) => "malformed_entry",
            StreamdexError::DocumentNotFound { .. } => "document_not_found",
            StreamdexError::InvalidDocument(_) => "invalid_document",
            StreamdexError::FieldNotFound(_) => "field_not_found",
            StreamdexError::Io(_) => "io_error",
            StreamdexError::Tantivy(_) => "internal_error",
            StreamdexError::QueryParse(_) => "query_parse_error",
            StreamdexError::Json(_) => "json_error",
            StreamdexError::Transport(_) => "transport_error",
        }
    }
}

// Axum IntoResponse implementation (feature-gated)
#[cfg(feature = "axum-support")]
use axum::response::{IntoResponse, Json, Response};
#[cfg(feature = "axum-support")]
use serde::Serialize;

#[cfg(feature = "axum-support")]
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub request_id: String,
}

#[cfg(feature = "axum-support")]
impl IntoResponse for StreamdexError {
    fn into_response(self) -> Response {
        let error_response = ErrorResponse {
            error: self.error_code().to_string(),
            message: self.to_string(),
            request_id: format!("req_sdx_{}", uuid::Uuid::new_v4()),
        };
        (self.status_code(), Json(error_response)).into_response()
    }
}
