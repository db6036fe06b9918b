use thiserror::Error;

/// Every failure the controller can surface to the user.
///
/// None of these are fatal: the shell shows `to_string()` as a notification
/// and the user may retry.
#[derive(Debug, Error)]
pub enum DashError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("You must log in first")]
    NotAuthenticated,

    #[error("Upload a file first")]
    NoActiveFile,

    #[error("Apply the train/test split first")]
    SplitNotApplied,

    #[error("No fitted model available")]
    NoModel,

    #[error("Model run {0} not found in history")]
    RunNotFound(i64),

    #[error("No run recorded for model {0}")]
    ModelNotFound(i64),

    #[error("Result discarded: the session changed while the request was in flight")]
    Stale,

    #[error("Server error ({status}): {message}")]
    Request { status: u16, message: String },

    /// The server answered 2xx but reported `success: false`.
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Connection error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl DashError {
    pub fn validation(message: impl Into<String>) -> Self {
        DashError::Validation(message.into())
    }

    /// True for errors raised before any request was sent.
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            DashError::Validation(_)
                | DashError::NotAuthenticated
                | DashError::NoActiveFile
                | DashError::SplitNotApplied
                | DashError::NoModel
        )
    }
}

impl From<reqwest::Error> for DashError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DashError::Decode(err.to_string())
        } else {
            DashError::Network(err.to_string())
        }
    }
}

impl From<DashError> for String {
    fn from(err: DashError) -> Self {
        err.to_string()
    }
}
