//! Transcription session controller
//!
//! Owns the session state machine and merges two independent inputs into
//! one [`SegmentStore`]:
//! - the submission call, resolved on a spawned task, and
//! - push channel messages, forwarded from the channel's reader task.
//!
//! Both arrive as [`ControllerEvent`]s on one queue and are applied in order
//! by whoever drives [`SessionController::process_next`], so all mutation
//! happens on a single logical loop. Whichever completion signal arrives
//! first wins; the other is ignored once the session is no longer active.

use super::channel::PushChannel;
use super::identity::ClientIdentity;
use super::messages::{
    clamp_progress, format_time, ArtifactFormat, PushMessage, Segment, SegmentId,
    TranscriptionResult,
};
use super::store::SegmentStore;
use super::submission::{Job, SubmissionApi};
use crate::error::{ConfigError, SessionError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingSubmission,
    Transcribing,
    Complete,
    Failed,
}

impl SessionState {
    /// A job is in flight and still accepts events
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::AwaitingSubmission | SessionState::Transcribing
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingSubmission => "awaiting_submission",
            SessionState::Transcribing => "transcribing",
            SessionState::Complete => "complete",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A segment as the presentation layer should show it
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSegment {
    pub id: SegmentId,
    /// `None` when the label should be hidden
    pub speaker_label: Option<String>,
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl RenderedSegment {
    fn from_segment(segment: &Segment, diarization_enabled: bool) -> Self {
        let speaker_label = (diarization_enabled || segment.has_known_speaker())
            .then(|| segment.speaker.clone());
        Self {
            id: segment.id(),
            speaker_label,
            text: segment.text.clone(),
            start: segment.start,
            end: segment.end,
        }
    }

    /// `MM:SS - MM:SS`
    pub fn time_range(&self) -> String {
        format!("{} - {}", format_time(self.start), format_time(self.end))
    }
}

/// Presentation callbacks, invoked after each mutation
///
/// Observers only read; every method defaults to a no-op.
pub trait SessionObserver: Send {
    fn on_progress(&mut self, _fraction: f64) {}
    fn on_segment_rendered(&mut self, _segment: &RenderedSegment) {}
    fn on_full_text_rendered(&mut self, _text: &str) {}
    fn on_complete(&mut self) {}
    /// The session failed; progress indication should be hidden
    fn on_failed(&mut self, _message: &str) {}
    fn on_reset(&mut self) {}
}

/// Inputs applied by the controller loop
#[derive(Debug)]
pub enum ControllerEvent {
    Push(PushMessage),
    SubmissionResolved {
        /// Job generation the call was issued for
        generation: u64,
        outcome: Result<TranscriptionResult, SessionError>,
    },
}

/// Where a completion signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompletionSource {
    Submission,
    Push,
}

/// Drives one transcription job at a time
pub struct SessionController<A: SubmissionApi> {
    identity: ClientIdentity,
    api: Arc<A>,
    observer: Box<dyn SessionObserver>,
    state: SessionState,
    job: Option<Arc<Job>>,
    /// Bumped on every new job and reset; stale submission results carry an older value
    generation: u64,
    store: SegmentStore,
    progress: f64,
    last_result: Option<TranscriptionResult>,
    channel: Option<PushChannel>,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl<A: SubmissionApi> SessionController<A> {
    /// Create a controller with a freshly generated client identity
    pub fn new(api: A, observer: impl SessionObserver + 'static) -> Self {
        Self::with_identity(ClientIdentity::generate(), api, observer)
    }

    pub fn with_identity(
        identity: ClientIdentity,
        api: A,
        observer: impl SessionObserver + 'static,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            identity,
            api: Arc::new(api),
            observer: Box::new(observer),
            state: SessionState::Idle,
            job: None,
            generation: 0,
            store: SegmentStore::new(),
            progress: 0.0,
            last_result: None,
            channel: None,
            events_tx,
            events_rx,
        }
    }

    /// Hand the push channel to this controller and connect it for our identity
    ///
    /// The channel outlives individual jobs and is only closed by
    /// [`shutdown`](Self::shutdown) or when the controller is dropped.
    pub fn attach_channel(&mut self, mut channel: PushChannel) -> Result<(), ConfigError> {
        let events_tx = self.events_tx.clone();
        channel.on_event(move |message| {
            let _ = events_tx.send(ControllerEvent::Push(message));
        });
        channel.connect(&self.identity)?;
        self.channel = Some(channel);
        Ok(())
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Last displayed progress fraction, already clamped
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_deref()
    }

    /// Result accepted for the current session, if it completed
    pub fn last_result(&self) -> Option<&TranscriptionResult> {
        self.last_result.as_ref()
    }

    fn diarization_enabled(&self) -> bool {
        self.job
            .as_ref()
            .is_some_and(|job| job.options.diarization_enabled)
    }

    /// Start a job, superseding whatever came before
    ///
    /// Validation failures never reach the network: the session goes to
    /// [`SessionState::Failed`] and the error is returned as well.
    pub fn start_transcription(&mut self, job: Job) -> Result<(), SessionError> {
        self.generation += 1;
        self.discard_queued_events();
        self.store.reset();
        self.last_result = None;
        let job = Arc::new(job);
        self.job = Some(job.clone());

        if let Err(e) = job.validate() {
            warn!(generation = self.generation, "Job rejected before submission: {}", e);
            self.fail(e.clone());
            return Err(e);
        }

        info!(
            client_id = %self.identity,
            generation = self.generation,
            diarization = job.options.diarization_enabled,
            "Starting transcription"
        );
        self.state = SessionState::AwaitingSubmission;
        self.set_progress(0.0);
        self.ensure_channel();
        self.spawn_submission(job);
        Ok(())
    }

    fn ensure_channel(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            if let Err(e) = channel.connect(&self.identity) {
                warn!("Push channel unavailable for this job: {}", e);
            }
        }
    }

    fn spawn_submission(&self, job: Arc<Job>) {
        let api = Arc::clone(&self.api);
        let identity = self.identity.clone();
        let events_tx = self.events_tx.clone();
        let generation = self.generation;

        tokio::spawn(async move {
            let outcome = api.submit(job, identity).await;
            if events_tx
                .send(ControllerEvent::SubmissionResolved {
                    generation,
                    outcome,
                })
                .is_err()
            {
                debug!(generation, "Controller gone before submission resolved");
            }
        });
    }

    /// Drop the current job and its content; pending results become stale
    pub fn reset(&mut self) {
        self.generation += 1;
        self.discard_queued_events();
        self.state = SessionState::Idle;
        self.job = None;
        self.store.reset();
        self.last_result = None;
        self.progress = 0.0;
        info!(generation = self.generation, "Session reset");
        self.observer.on_reset();
    }

    /// Drop everything queued for the previous job
    ///
    /// Push messages carry no job id, so anything received before the
    /// generation changed belongs to the old job.
    fn discard_queued_events(&mut self) {
        let mut discarded = 0usize;
        while self.events_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, generation = self.generation, "Discarded queued events");
        }
    }

    /// Wait for the next event and apply it
    pub async fn process_next(&mut self) {
        // The controller holds a sender, so the queue never closes
        if let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
        }
    }

    /// Apply events until the current job completes or fails
    pub async fn run_until_settled(&mut self) -> SessionState {
        while self.state.is_active() {
            self.process_next().await;
        }
        self.state
    }

    /// Apply one event to the session
    pub fn handle_event(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Push(message) => self.handle_push(message),
            ControllerEvent::SubmissionResolved {
                generation,
                outcome,
            } => {
                if generation != self.generation || !self.state.is_active() {
                    debug!(
                        generation,
                        current = self.generation,
                        state = %self.state,
                        "Ignoring submission result"
                    );
                    return;
                }
                match outcome {
                    Ok(result) => self.complete(result, CompletionSource::Submission),
                    Err(e) => self.fail(e),
                }
            }
        }
    }

    fn handle_push(&mut self, message: PushMessage) {
        if !self.state.is_active() {
            debug!(kind = message.kind(), state = %self.state, "Ignoring push message");
            return;
        }

        match message {
            PushMessage::Progress(fraction) => {
                self.state = SessionState::Transcribing;
                self.set_progress(fraction);
            }
            PushMessage::Segment(segment) => {
                self.state = SessionState::Transcribing;
                self.render_segment(segment);
            }
            PushMessage::Complete(result) => self.complete(result, CompletionSource::Push),
            PushMessage::Error(message) => self.fail(SessionError::Remote(message)),
        }
    }

    fn set_progress(&mut self, fraction: f64) {
        self.progress = clamp_progress(fraction);
        self.observer.on_progress(self.progress);
    }

    fn render_segment(&mut self, segment: Segment) {
        let id = segment.id();
        self.store.upsert(segment);
        if let Some(stored) = self.store.get(id) {
            let rendered = RenderedSegment::from_segment(stored, self.diarization_enabled());
            self.observer.on_segment_rendered(&rendered);
        }
    }

    fn complete(&mut self, result: TranscriptionResult, source: CompletionSource) {
        if self.store.is_empty() {
            debug!(?source, segments = result.segments.len(), "Rendering full result");
            if result.segments.is_empty() {
                self.store.set_full_text(result.full_text.clone());
                self.observer.on_full_text_rendered(&result.full_text);
            } else {
                for segment in &result.segments {
                    self.render_segment(segment.clone());
                }
            }
        } else {
            debug!(?source, "Content already rendered incrementally, marking complete only");
        }

        self.last_result = Some(result);
        self.state = SessionState::Complete;
        self.set_progress(1.0);
        info!(generation = self.generation, ?source, "Transcription complete");
        self.observer.on_complete();
    }

    fn fail(&mut self, err: SessionError) {
        error!(generation = self.generation, "Transcription failed: {}", err);
        self.state = SessionState::Failed;
        self.progress = 0.0;
        self.observer.on_failed(err.message());
    }

    /// Exportable content for `format`
    ///
    /// The backend's artifact when it sent one, otherwise the rendered
    /// plain-text view. `None` when nothing has been rendered.
    pub fn export(&self, format: ArtifactFormat) -> Option<String> {
        if let Some(artifact) = self
            .last_result
            .as_ref()
            .and_then(|result| result.artifact(format))
        {
            return Some(artifact.to_string());
        }
        if self.store.is_empty() {
            return None;
        }
        Some(self.store.plain_text(self.diarization_enabled()))
    }

    /// Stop the push channel's reconnect loop
    pub fn shutdown(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.shutdown();
        }
    }
}
