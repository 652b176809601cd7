//! Error types for callrecorder
//!
//! Uses thiserror for ergonomic error definitions. Each pipeline stage has
//! its own enum so callers can tell a lost buffer from a failed package.

use thiserror::Error;

/// Top-level error type for the callrecorder application
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Call {0} has already been terminated")]
    CallTerminated(String),

    #[error("Media pipeline error: {0}")]
    Media(#[from] MediaError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Packaging error: {0}")]
    Packaging(#[from] PackagingError),

    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while ingesting and writing media buffers
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("No socket mapping for {kind} media source {msi}")]
    UnmappedSource { kind: &'static str, msi: u32 },

    #[error("No participant owns media source {0}")]
    UnknownParticipant(u32),

    #[error("Failed to write '{key}': {message}")]
    Write { key: String, message: String },

    #[error("Failed to finalize '{key}': {message}")]
    Finalize { key: String, message: String },

    #[error("{0} lane is draining, buffer dropped")]
    Draining(&'static str),

    #[error("{0} lane consumer has stopped")]
    LaneClosed(&'static str),

    #[error("Call has ended, {0} buffer dropped")]
    CallEnded(&'static str),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to socket subscription control
#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("Invalid media type for subscription: {0}")]
    InvalidMediaType(String),

    #[error("No VBSS socket configured for this call")]
    NoVbssSocket,

    #[error("Platform rejected the request: {0}")]
    Platform(String),
}

/// Errors raised while packaging a finished call
#[derive(Error, Debug)]
pub enum PackagingError {
    #[error("Recording files for call {call_id} were not complete after {waited_secs}s")]
    FilesIncomplete { call_id: String, waited_secs: u64 },

    #[error("Call {0} has no audio recording")]
    MissingAudio(String),

    #[error("Archive creation failed: {0}")]
    Archive(String),

    #[error("'zip' not found in PATH. Install it via your package manager.")]
    ArchiverNotFound,

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the blob store collaborator
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid blob key: '{0}'")]
    InvalidKey(String),

    #[error("Invalid mapping record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using RecorderError
pub type Result<T> = std::result::Result<T, RecorderError>;
