//! Wire types shared by the submission call and the push channel
//!
//! Push messages arrive as `{ "type": ..., "data": {...} }` and are decoded
//! into [`PushMessage`] here, so nothing downstream handles untyped JSON.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Speaker label meaning "speaker identity not determined"
pub const UNKNOWN_SPEAKER: &str = "UNKNOWN";

/// Message used when the backend fails without saying why
pub const GENERIC_FAILURE_MESSAGE: &str = "Transcription failed";

fn unknown_speaker() -> String {
    UNKNOWN_SPEAKER.to_string()
}

/// Idempotency key of a segment: its start offset in whole milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment-{}", self.0)
    }
}

/// One timed, speaker-attributed span of transcript text
///
/// Segments from the push channel may omit `speaker` and may carry extra
/// fields (e.g. an upstream numeric `id`); both are tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default = "unknown_speaker")]
    pub speaker: String,
    #[serde(default)]
    pub text: String,
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds
    pub end: f64,
}

impl Segment {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
            start,
            end,
        }
    }

    /// Derived id, truncating the start offset to milliseconds
    pub fn id(&self) -> SegmentId {
        let start = if self.start.is_finite() { self.start.max(0.0) } else { 0.0 };
        SegmentId((start * 1000.0).floor() as u64)
    }

    pub fn has_known_speaker(&self) -> bool {
        self.speaker != UNKNOWN_SPEAKER
    }

    /// Clamp offsets so that `0 <= start <= end`
    pub(crate) fn normalized(mut self) -> Self {
        if !self.start.is_finite() || self.start < 0.0 {
            self.start = 0.0;
        }
        if !self.end.is_finite() || self.end < self.start {
            self.end = self.start;
        }
        self
    }
}

/// Export formats the backend may precompute
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactFormat {
    Text,
    Subtitle,
}

impl ArtifactFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactFormat::Text => "text",
            ArtifactFormat::Subtitle => "subtitle",
        }
    }

    /// File extension used when persisting this format
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Text => "txt",
            ArtifactFormat::Subtitle => "srt",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArtifactFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ArtifactFormat::Text),
            "subtitle" | "srt" => Ok(ArtifactFormat::Subtitle),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// Final transcript of a job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptionResult {
    /// Undivided transcript, used when no segmentation is available
    pub full_text: String,
    pub segments: Vec<Segment>,
    pub artifacts: BTreeMap<ArtifactFormat, String>,
}

impl TranscriptionResult {
    pub fn artifact(&self, format: ArtifactFormat) -> Option<&str> {
        self.artifacts.get(&format).map(String::as_str)
    }
}

/// Result body as sent by the backend, on either channel
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResultPayload {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub srt: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ResultPayload {
    /// Split into the result or the error message it carries
    pub(crate) fn into_result(self) -> Result<TranscriptionResult, String> {
        if let Some(error) = self.error {
            if error.is_empty() {
                return Err(GENERIC_FAILURE_MESSAGE.to_string());
            }
            return Err(error);
        }

        let mut artifacts = BTreeMap::new();
        if let Some(srt) = self.srt.filter(|s| !s.is_empty()) {
            artifacts.insert(ArtifactFormat::Subtitle, srt);
        }

        Ok(TranscriptionResult {
            full_text: self.text,
            segments: self.segments,
            artifacts,
        })
    }
}

/// Structured error body, `{ "error": "...", "detail": "..." }`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorPayload {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub detail: Option<String>,
}

impl ErrorPayload {
    pub(crate) fn message(self) -> String {
        self.error
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ProgressPayload {
    progress: f64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum WirePushMessage {
    Progress(ProgressPayload),
    Segment(Segment),
    Complete(ResultPayload),
    Error(ErrorPayload),
}

/// Inbound push channel message, validated
#[derive(Debug, Clone, PartialEq)]
pub enum PushMessage {
    /// Raw progress fraction as sent; clamping is the controller's job
    Progress(f64),
    Segment(Segment),
    Complete(TranscriptionResult),
    Error(String),
}

impl PushMessage {
    /// Decode a text frame from the push channel
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let wire: WirePushMessage = serde_json::from_str(text)?;
        Ok(match wire {
            WirePushMessage::Progress(p) => PushMessage::Progress(p.progress),
            WirePushMessage::Segment(segment) => PushMessage::Segment(segment),
            WirePushMessage::Complete(payload) => match payload.into_result() {
                Ok(result) => PushMessage::Complete(result),
                Err(error) => PushMessage::Error(error),
            },
            WirePushMessage::Error(payload) => PushMessage::Error(payload.message()),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PushMessage::Progress(_) => "progress",
            PushMessage::Segment(_) => "segment",
            PushMessage::Complete(_) => "complete",
            PushMessage::Error(_) => "error",
        }
    }
}

/// Clamp a progress fraction into `[0, 1]`; NaN counts as no progress
pub fn clamp_progress(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

/// Whole percent shown for a progress fraction
pub fn progress_percent(fraction: f64) -> u8 {
    (clamp_progress(fraction) * 100.0).round() as u8
}

/// Format seconds as `MM:SS`
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_id_truncates_to_milliseconds() {
        let segment = Segment::new(UNKNOWN_SPEAKER, "hi", 1.5009, 2.0);
        assert_eq!(segment.id(), SegmentId(1500));
        assert_eq!(segment.id().to_string(), "segment-1500");
    }

    #[test]
    fn test_segment_without_speaker_defaults_to_unknown() {
        let json = r#"{"id": 3, "seek": 0, "text": "hello", "start": 0.0, "end": 1.2}"#;
        let segment: Segment = serde_json::from_str(json).unwrap();
        assert_eq!(segment.speaker, UNKNOWN_SPEAKER);
        assert!(!segment.has_known_speaker());
        assert_eq!(segment.id(), SegmentId(0));
    }

    #[test]
    fn test_normalized_clamps_offsets() {
        let segment = Segment::new("SPEAKER_00", "x", -1.0, -3.0).normalized();
        assert_eq!(segment.start, 0.0);
        assert_eq!(segment.end, 0.0);

        let segment = Segment::new("SPEAKER_00", "x", 4.0, 2.0).normalized();
        assert_eq!(segment.end, 4.0);
    }

    #[test]
    fn test_parse_progress() {
        let msg = PushMessage::parse(r#"{"type": "progress", "data": {"progress": 0.5}}"#).unwrap();
        assert_eq!(msg, PushMessage::Progress(0.5));
    }

    #[test]
    fn test_parse_segment() {
        let msg = PushMessage::parse(
            r#"{"type": "segment", "data": {"text": "hi", "start": 1.5, "end": 2.0}}"#,
        )
        .unwrap();
        match msg {
            PushMessage::Segment(segment) => {
                assert_eq!(segment.text, "hi");
                assert_eq!(segment.id(), SegmentId(1500));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_complete_with_srt() {
        let json = r#"{"type": "complete", "data": {
            "text": "hello world",
            "segments": [{"speaker": "SPEAKER_01", "start": 0, "end": 2, "text": "hello world"}],
            "srt": "1\n00:00:00,000 --> 00:00:02,000\nhello world\n"
        }}"#;
        match PushMessage::parse(json).unwrap() {
            PushMessage::Complete(result) => {
                assert_eq!(result.full_text, "hello world");
                assert_eq!(result.segments.len(), 1);
                assert!(result.artifact(ArtifactFormat::Subtitle).is_some());
                assert!(result.artifact(ArtifactFormat::Text).is_none());
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_parse_complete_carrying_error_becomes_error() {
        let json = r#"{"type": "complete", "data": {"error": "model crashed"}}"#;
        assert_eq!(
            PushMessage::parse(json).unwrap(),
            PushMessage::Error("model crashed".to_string())
        );

        let json = r#"{"type": "complete", "data": {"error": "", "text": "x"}}"#;
        assert_eq!(
            PushMessage::parse(json).unwrap(),
            PushMessage::Error(GENERIC_FAILURE_MESSAGE.to_string())
        );
    }

    #[test]
    fn test_parse_error_without_message_uses_generic() {
        let msg = PushMessage::parse(r#"{"type": "error", "data": {}}"#).unwrap();
        assert_eq!(msg, PushMessage::Error(GENERIC_FAILURE_MESSAGE.to_string()));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(PushMessage::parse("not json").is_err());
        assert!(PushMessage::parse(r#"{"type": "unknown", "data": {}}"#).is_err());
        assert!(PushMessage::parse(r#"{"type": "progress", "data": {}}"#).is_err());
    }

    #[test]
    fn test_progress_clamping() {
        assert_eq!(progress_percent(1.4), 100);
        assert_eq!(progress_percent(-0.2), 0);
        assert_eq!(progress_percent(0.456), 46);
        assert_eq!(clamp_progress(f64::NAN), 0.0);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "00:00");
        assert_eq!(format_time(2.9), "00:02");
        assert_eq!(format_time(754.2), "12:34");
    }

    #[test]
    fn test_artifact_format_from_str() {
        assert_eq!("srt".parse::<ArtifactFormat>(), Ok(ArtifactFormat::Subtitle));
        assert_eq!("Text".parse::<ArtifactFormat>(), Ok(ArtifactFormat::Text));
        assert!("pdf".parse::<ArtifactFormat>().is_err());
    }
}
