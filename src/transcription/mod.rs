//! Transcription session client
//!
//! Submits jobs to the transcription backend over HTTP and listens for
//! incremental results on a per-client WebSocket push channel. The
//! [`SessionController`] merges both into a single consistent view, and the
//! push channel reconnects automatically on connection loss.

mod channel;
mod controller;
mod helpers;
mod identity;
mod messages;
mod store;
mod submission;

pub use channel::{
    build_push_url, ChannelConfig, PushChannel, PushHandler, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_RECONNECT_DELAY,
};
pub use controller::{
    ControllerEvent, RenderedSegment, SessionController, SessionObserver,
    SessionState,
};
pub use identity::ClientIdentity;
pub use messages::{
    clamp_progress, format_time, progress_percent, ArtifactFormat, PushMessage, Segment,
    SegmentId, TranscriptionResult, GENERIC_FAILURE_MESSAGE, UNKNOWN_SPEAKER,
};
pub use store::{SegmentStore, Upsert};
pub use submission::{
    validate_remote_url, HttpSubmitter, Job, JobInput, JobOptions, SubmissionApi,
};
