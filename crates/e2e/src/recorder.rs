//! Remote AppMap recording around feature examples
//!
//! The application server exposes a recorder at `/_appmap/record`:
//! `POST` starts a recording and `DELETE` stops it, answering with the
//! serialized AppMap. Only one recording can be open per server, so a
//! [`Recorder`] is the single handle through which examples reach it.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::example::guarded;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    Idle,
    Recording,
}

/// Artifact returned by a successful stop call
#[derive(Debug, Clone)]
pub struct Recording {
    pub body: String,
    pub path: Option<PathBuf>,
}

/// What happened inside a recorded example
#[derive(Debug)]
pub struct RecordedOutcome {
    /// Result of the example body
    pub body: E2eResult<()>,

    /// Result of the stop call
    pub recording: E2eResult<Recording>,
}

impl RecordedOutcome {
    /// Collapse into one result, preferring the body's failure.
    ///
    /// The stop error is only returned when the body passed; callers that
    /// need both should read the fields directly.
    pub fn into_result(self) -> E2eResult<Recording> {
        match (self.body, self.recording) {
            (Err(e), _) => Err(e),
            (Ok(()), recording) => recording,
        }
    }
}

/// Handle to the recorder on one application server
pub struct Recorder {
    client: reqwest::Client,
    url: String,
    artifact_dir: Option<PathBuf>,
    state: Mutex<RecorderState>,
}

impl Recorder {
    pub fn new(host: &str, port: u16, path: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("http://{}:{}{}", host, port, path),
            artifact_dir: None,
            state: Mutex::new(RecorderState::Idle),
        }
    }

    /// Write every stopped recording under `dir`
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn state(&self) -> RecorderState {
        *self.state.lock().await
    }

    /// Begin a recording. Transport failures are logged, not returned.
    pub async fn start(&self) -> E2eResult<()> {
        let mut state = self.state.lock().await;
        self.begin(&mut state).await
    }

    /// End the current recording and return its artifact
    pub async fn stop(&self, label: &str) -> E2eResult<Recording> {
        let mut state = self.state.lock().await;
        self.end(&mut state, label).await
    }

    /// Run `body` between a start and a stop call.
    ///
    /// The recorder stays locked for the whole example, so concurrent
    /// callers queue up behind it. The stop call is issued on every exit
    /// path, including a panicking body.
    pub async fn record_around<F, Fut>(&self, label: &str, body: F) -> RecordedOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = E2eResult<()>>,
    {
        let mut state = self.state.lock().await;

        if let Err(e) = self.begin(&mut state).await {
            return RecordedOutcome {
                body: Ok(()),
                recording: Err(e),
            };
        }

        let body_result = guarded(body()).await;

        let recording = self.end(&mut state, label).await;

        if let (Err(body_err), Err(stop_err)) = (&body_result, &recording) {
            error!(
                "{}: example failed ({}) and recording could not be stopped ({})",
                label, body_err, stop_err
            );
        }

        RecordedOutcome {
            body: body_result,
            recording,
        }
    }

    async fn begin(&self, state: &mut RecorderState) -> E2eResult<()> {
        if *state == RecorderState::Recording {
            return Err(E2eError::RecordingInProgress);
        }

        match self.client.post(&self.url).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("Recording started at {}", self.url);
            }
            Ok(resp) => {
                warn!("Recorder start returned {}, continuing", resp.status());
            }
            Err(e) => {
                warn!("Recorder start failed, continuing: {}", e);
            }
        }

        *state = RecorderState::Recording;
        Ok(())
    }

    async fn end(&self, state: &mut RecorderState, label: &str) -> E2eResult<Recording> {
        // The example is over whatever the recorder answers.
        *state = RecorderState::Idle;

        let resp = self
            .client
            .delete(&self.url)
            .send()
            .await
            .map_err(|e| E2eError::RecorderTransport(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| E2eError::RecorderTransport(e.to_string()))?;

        if !status.is_success() {
            error!("Recorder stop for {} returned {}", label, status);
            return Err(E2eError::RecorderStop {
                status: status.as_u16(),
                body,
            });
        }

        let path = match &self.artifact_dir {
            Some(dir) => Some(write_artifact(dir, label, &body).await?),
            None => None,
        };

        info!("Recording for {} stopped ({} bytes)", label, body.len());
        Ok(Recording { body, path })
    }
}

async fn write_artifact(dir: &Path, label: &str, body: &str) -> E2eResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}-remote.appmap.json", slug(label)));
    tokio::fs::write(&path, body).await?;
    debug!("AppMap written to {}", path.display());
    Ok(path)
}

/// File-name-safe form of an example label
pub fn slug(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut last_underscore = false;
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore && !out.is_empty() {
            out.push('_');
            last_underscore = true;
        }
    }
    out.trim_end_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug() {
        assert_eq!(slug("Settings page / shows a boolean"), "settings_page_shows_a_boolean");
        assert_eq!(slug("  edit!  "), "edit");
    }

    #[test]
    fn test_url_is_built_from_host_and_port() {
        let recorder = Recorder::new("127.0.0.1", 4567, "/_appmap/record");
        assert_eq!(recorder.url(), "http://127.0.0.1:4567/_appmap/record");
    }

    #[tokio::test]
    async fn test_start_swallows_unreachable_recorder() {
        // Nothing listens on port 9 on loopback.
        let recorder = Recorder::new("127.0.0.1", 9, "/_appmap/record");
        recorder.start().await.unwrap();
        assert_eq!(recorder.state().await, RecorderState::Recording);
        assert!(matches!(
            recorder.start().await,
            Err(E2eError::RecordingInProgress)
        ));

        let stop = recorder.stop("unreachable").await;
        assert!(matches!(stop, Err(E2eError::RecorderTransport(_))));
        assert_eq!(recorder.state().await, RecorderState::Idle);
    }

    #[test]
    fn test_outcome_prefers_body_error() {
        let outcome = RecordedOutcome {
            body: Err(E2eError::AssertionFailed("expected true".to_string())),
            recording: Err(E2eError::RecorderStop {
                status: 500,
                body: String::new(),
            }),
        };
        match outcome.into_result() {
            Err(E2eError::AssertionFailed(msg)) => assert_eq!(msg, "expected true"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
