//! Error types for post and image operations

use thiserror::Error;

/// Failure of a single HTTP exchange (fetch, upload, or API call).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Post create/edit (or board/post lookup) was rejected or never reached the backend.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The backend answered with a non-success status.
    #[error("backend rejected request with HTTP {status}{}", describe(.error_code, .message))]
    Rejected {
        status: u16,
        error_code: Option<String>,
        message: Option<String>,
    },

    #[error("backend unreachable: {0}")]
    Unreachable(#[source] TransportError),

    #[error("malformed backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

fn describe(error_code: &Option<String>, message: &Option<String>) -> String {
    match (error_code, message) {
        (Some(code), Some(msg)) => format!(" ({code}): {msg}"),
        (Some(code), None) => format!(" ({code})"),
        (None, Some(msg)) => format!(": {msg}"),
        (None, None) => String::new(),
    }
}

/// Per-image upload failure. Collected in outcomes, never raised.
#[derive(Debug, Error)]
pub enum UploadFailure {
    #[error("backend issued no upload target")]
    MissingTarget,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Every local id up to `i64::MAX` has been handed out in this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no local image ids left in this session")]
pub struct LocalIdExhausted;

/// Errors that abort a session operation.
#[derive(Debug, Error)]
pub enum PostError {
    #[error("failed to load image {filename}: {source}")]
    ImageLoadFailure {
        filename: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to load board {board_id}: {source}")]
    BoardLoadFailure {
        board_id: i64,
        #[source]
        source: SubmitError,
    },

    #[error("failed to load post {post_id}: {source}")]
    PostLoadFailure {
        post_id: i64,
        #[source]
        source: SubmitError,
    },

    #[error("post submission failed: {0}")]
    SubmitFailure(#[from] SubmitError),

    #[error(transparent)]
    LocalIdExhausted(#[from] LocalIdExhausted),

    #[error("session already submitted post {post_id}")]
    AlreadySubmitted { post_id: i64 },
}

pub type Result<T> = std::result::Result<T, PostError>;
