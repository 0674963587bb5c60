//! Error type for chat operations.

use crate::provider::ProviderError;
use crate::session::StoreError;
use thiserror::Error;

/// Message returned when clear/delete are called without a session id.
pub const SESSION_ID_REQUIRED: &str = "session_id is required";

/// Errors surfaced by [`crate::ChatService`].
#[derive(Error, Debug)]
pub enum ChatError {
    /// The completion service failed while producing the reply.
    #[error("Completion failed: {0}")]
    Provider(#[from] ProviderError),

    /// The session store failed.
    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    /// The request is missing something it needs.
    #[error("{0}")]
    Validation(String),
}

impl ChatError {
    /// HTTP status code for this error. Validation problems are reported in
    /// the body of a 200, matching what existing clients expect.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 200,
            Self::Provider(_) => 502,
            Self::Store(_) => 503,
        }
    }

    /// Stable machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "missing_session_id",
            Self::Provider(_) => "completion_failed",
            Self::Store(_) => "session_store_unavailable",
        }
    }
}
