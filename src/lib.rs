//! Client-side controller for remote transcription jobs
//!
//! A job is submitted over HTTP while a per-client WebSocket push channel
//! delivers progress and partial segments. [`transcription::SessionController`]
//! merges both into one idempotent view for a presentation layer.

#![deny(clippy::all)]

pub mod config;
pub mod error;
pub mod storage;
pub mod transcription;

pub use error::{ConfigError, ParseError, SessionError, StorageError};
