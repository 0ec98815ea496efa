use serenity::http::HttpError;
use serenity::model::ModelError;

/// Outcome of a failed call across the chat-platform boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("missing permission")]
    PermissionDenied,
    #[error("not found")]
    NotFound,
    #[error("timed out")]
    Timeout,
    #[error("platform error: {0}")]
    Other(String),
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

impl From<serenity::Error> for PlatformError {
    fn from(err: serenity::Error) -> Self {
        match &err {
            serenity::Error::Http(HttpError::UnsuccessfulRequest(resp)) => {
                match resp.status_code.as_u16() {
                    401 | 403 => PlatformError::PermissionDenied,
                    404 => PlatformError::NotFound,
                    _ => PlatformError::Other(err.to_string()),
                }
            }
            serenity::Error::Model(ModelError::InvalidPermissions { .. }) => {
                PlatformError::PermissionDenied
            }
            _ => PlatformError::Other(err.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for PlatformError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        PlatformError::Timeout
    }
}
