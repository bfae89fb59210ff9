//! Error types for the Sail test harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    #[error("Unknown server launcher: {0}")]
    UnknownLauncher(String),

    #[error("WebDriver error: {0}")]
    WebDriver(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    /// The recorder answered the stop call with a non-2xx status.
    #[error("Recorder stop failed with HTTP {status}: {body}")]
    RecorderStop { status: u16, body: String },

    /// The stop call never got an answer.
    #[error("Recorder stop request failed: {0}")]
    RecorderTransport(String),

    #[error("Recording already in progress")]
    RecordingInProgress,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl E2eError {
    /// Errors raised by the recording hook rather than by the example body.
    pub fn is_recorder_error(&self) -> bool {
        matches!(
            self,
            E2eError::RecorderStop { .. }
                | E2eError::RecorderTransport(_)
                | E2eError::RecordingInProgress
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
