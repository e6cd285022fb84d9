//! Job submission over HTTP
//!
//! Local inputs go to `POST {base}/api/transcribe` as a multipart upload,
//! remote references to `POST {base}/api/transcribe/youtube`. Both answer
//! with the same result body, or `{ "error": ... }` with a non-success status.

use super::helpers::join_path;
use super::identity::ClientIdentity;
use super::messages::{ErrorPayload, ResultPayload, TranscriptionResult, GENERIC_FAILURE_MESSAGE};
use crate::error::SessionError;
use anyhow::Context;
use reqwest::multipart::{Form, Part};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

const LOCAL_ENDPOINT: &str = "api/transcribe";
const REMOTE_ENDPOINT: &str = "api/transcribe/youtube";

/// Substrings identifying a supported remote video locator
const REMOTE_URL_PATTERNS: [&str; 2] = ["youtube.com/watch", "youtu.be/"];

/// What to transcribe
#[derive(Debug, Clone, PartialEq)]
pub enum JobInput {
    /// Local media file, read when the job is submitted
    LocalFile(PathBuf),
    /// Media already held in memory
    LocalBytes { file_name: String, bytes: Vec<u8> },
    /// Remote video locator
    RemoteUrl(String),
}

/// Per-job options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOptions {
    pub diarization_enabled: bool,
    /// Language code hint; `None` lets the backend detect it
    pub language_hint: Option<String>,
}

/// A transcription request, immutable once submitted
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub input: JobInput,
    pub options: JobOptions,
}

impl Job {
    pub fn local_file(path: impl Into<PathBuf>, options: JobOptions) -> Self {
        Self {
            input: JobInput::LocalFile(path.into()),
            options,
        }
    }

    pub fn local_bytes(file_name: impl Into<String>, bytes: Vec<u8>, options: JobOptions) -> Self {
        Self {
            input: JobInput::LocalBytes {
                file_name: file_name.into(),
                bytes,
            },
            options,
        }
    }

    pub fn remote(url: impl Into<String>, options: JobOptions) -> Self {
        Self {
            input: JobInput::RemoteUrl(url.into().trim().to_string()),
            options,
        }
    }

    /// Client-side checks run before anything is sent
    pub fn validate(&self) -> Result<(), SessionError> {
        match &self.input {
            JobInput::RemoteUrl(url) => validate_remote_url(url),
            JobInput::LocalFile(path) if path.as_os_str().is_empty() => Err(
                SessionError::Validation("No input file selected".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Language hint, if one was given
    fn language(&self) -> Option<&str> {
        self.options
            .language_hint
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

/// Check a remote locator against the recognized video-hosting patterns
pub fn validate_remote_url(url: &str) -> Result<(), SessionError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(SessionError::Validation(
            "Please enter a YouTube video link".to_string(),
        ));
    }
    if !REMOTE_URL_PATTERNS.iter().any(|p| url.contains(p)) {
        return Err(SessionError::Validation(
            "Please enter a valid YouTube video link".to_string(),
        ));
    }
    Ok(())
}

/// The request/response transport used to submit jobs
pub trait SubmissionApi: Send + Sync + 'static {
    /// Submit `job`, tagged with `identity`, and wait for its result
    fn submit(
        &self,
        job: Arc<Job>,
        identity: ClientIdentity,
    ) -> impl Future<Output = Result<TranscriptionResult, SessionError>> + Send;
}

/// Submission over HTTP multipart
#[derive(Debug, Clone)]
pub struct HttpSubmitter {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpSubmitter {
    pub fn new(
        base_url: &Url,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to create HTTP client for HttpSubmitter")?;

        Ok(Self {
            base_url: base_url.clone(),
            client,
        })
    }

    fn endpoint(&self, suffix: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&join_path(self.base_url.path(), suffix));
        url
    }

    async fn build_request(
        &self,
        job: &Job,
        identity: &ClientIdentity,
    ) -> Result<(Url, Form), SessionError> {
        let (endpoint, form) = match &job.input {
            JobInput::LocalFile(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    SessionError::Validation(format!("Failed to read {}: {}", path.display(), e))
                })?;
                let part = Part::bytes(bytes).file_name(file_name_of(path));
                (self.endpoint(LOCAL_ENDPOINT), Form::new().part("file", part))
            }
            JobInput::LocalBytes { file_name, bytes } => {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                (self.endpoint(LOCAL_ENDPOINT), Form::new().part("file", part))
            }
            JobInput::RemoteUrl(url) => (
                self.endpoint(REMOTE_ENDPOINT),
                Form::new().text("url", url.clone()),
            ),
        };

        let mut form = form
            .text(
                "enable_diarization",
                job.options.diarization_enabled.to_string(),
            )
            .text("client_id", identity.to_string());
        if let Some(language) = job.language() {
            form = form.text("language", language.to_string());
        }

        Ok((endpoint, form))
    }
}

impl SubmissionApi for HttpSubmitter {
    #[instrument(skip(self, job, identity), fields(client_id = %identity))]
    async fn submit(
        &self,
        job: Arc<Job>,
        identity: ClientIdentity,
    ) -> Result<TranscriptionResult, SessionError> {
        job.validate()?;
        let (endpoint, form) = self.build_request(&job, &identity).await?;

        info!(endpoint = %endpoint, "Submitting transcription job");
        let response = self
            .client
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                warn!("Submission request failed: {}", e);
                SessionError::Transport(format!("Network error: {}", e))
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| SessionError::Transport(format!("Failed to read response: {}", e)))?;
        debug!(status = status.as_u16(), body_len = body.len(), "Submission response");

        parse_submission_response(status, &body)
    }
}

/// Map a submission response to the result or the failure it carries
pub(crate) fn parse_submission_response(
    status: reqwest::StatusCode,
    body: &[u8],
) -> Result<TranscriptionResult, SessionError> {
    if status.is_success() {
        let payload: ResultPayload = serde_json::from_slice(body).map_err(|e| {
            SessionError::Transport(format!("Invalid response from server: {}", e))
        })?;
        return payload.into_result().map_err(SessionError::Remote);
    }

    match serde_json::from_slice::<ErrorPayload>(body) {
        Ok(payload) if payload.error.as_deref().is_some_and(|e| !e.is_empty()) => {
            Err(SessionError::Remote(payload.message()))
        }
        _ => {
            warn!(status = status.as_u16(), "Submission failed without error body");
            Err(SessionError::Transport(GENERIC_FAILURE_MESSAGE.to_string()))
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}
