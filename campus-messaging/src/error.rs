use campus_shared::errors::{AppError, ErrorCode};

/// Errors surfaced by the message distribution engine.
///
/// Projection-side failures (a single member's index update failing during
/// fan-out) are deliberately NOT represented here: the dispatcher logs them
/// and moves on, and device sync replay reconciles the gap.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("message store unavailable")]
    StoreUnavailable,

    #[error("collaborator unavailable: {0}")]
    Collaborator(#[source] anyhow::Error),
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::Validation(msg) => AppError::Validation(msg.clone()),
            EngineError::PermissionDenied(what) => {
                AppError::new(ErrorCode::Forbidden, format!("permission denied: {what}"))
            }
            EngineError::NotFound(what) => {
                let code = match *what {
                    "message" => ErrorCode::MessageNotFound,
                    "conversation" => ErrorCode::ConversationNotFound,
                    "device" => ErrorCode::DeviceNotRegistered,
                    _ => ErrorCode::NotFound,
                };
                AppError::new(code, format!("{what} not found"))
            }
            EngineError::StoreUnavailable => AppError::new(
                ErrorCode::MessageStoreUnavailable,
                "message store unavailable",
            ),
            EngineError::Collaborator(e) => {
                tracing::error!(error = %e, "collaborator call failed");
                AppError::new(ErrorCode::ServiceUnavailable, "upstream service unavailable")
            }
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
