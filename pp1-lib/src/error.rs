use crate::command::CommandId;
use std::io;
use strum_macros::Display;
use thiserror::Error;

/// Coarse classification of a [`PP1Error`], for callers that branch on the
/// failure rather than on its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    NotConnected,
    Disconnected,
    MalformedResponse,
    UploadRejected,
    CoordinateOutOfRange,
    TransferIncomplete,
    EmptyPattern,
    Transport,
    Config,
}

/// The step of the upload sequence an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UploadStep {
    Delete,
    Announce,
    Transfer,
    Identify,
    Layout,
}

/// The primary error type for the `pp1-lib` library.
#[derive(Error, Debug)]
pub enum PP1Error {
    #[error("Machine is not connected")]
    NotConnected,

    #[error("Machine disconnected before the command was sent")]
    Disconnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response to {command:?}: {message}")]
    MalformedResponse { command: CommandId, message: String },

    #[error("Insufficient data for {command:?}: expected at least {expected} bytes, got {actual}")]
    InsufficientData {
        command: CommandId,
        expected: usize,
        actual: usize,
    },

    #[error("Machine rejected the {step} step with code {code:#04x}")]
    UploadRejected { step: UploadStep, code: u8 },

    #[error("Upload failed during the {step} step: {source}")]
    UploadFailed {
        step: UploadStep,
        #[source]
        source: Box<PP1Error>,
    },

    #[error("Transfer ended after {sent} of {total} bytes without a completion signal")]
    TransferIncomplete { sent: usize, total: usize },

    #[error("Pattern is empty")]
    EmptyPattern,

    #[error("Stitch {index} at ({x}, {y}) is outside the encodable range of ±{limit}")]
    CoordinateOutOfRange { index: usize, x: i64, y: i64, limit: i32 },

    #[error("Invalid PEN data: {0}")]
    InvalidPen(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PP1Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PP1Error::NotConnected => ErrorKind::NotConnected,
            PP1Error::Disconnected => ErrorKind::Disconnected,
            PP1Error::Transport(_) | PP1Error::Io(_) => ErrorKind::Transport,
            PP1Error::MalformedResponse { .. }
            | PP1Error::InsufficientData { .. }
            | PP1Error::InvalidPen(_) => ErrorKind::MalformedResponse,
            PP1Error::UploadRejected { .. } => ErrorKind::UploadRejected,
            PP1Error::UploadFailed { source, .. } => source.kind(),
            PP1Error::TransferIncomplete { .. } => ErrorKind::TransferIncomplete,
            PP1Error::EmptyPattern => ErrorKind::EmptyPattern,
            PP1Error::CoordinateOutOfRange { .. } => ErrorKind::CoordinateOutOfRange,
            PP1Error::Config(_) | PP1Error::Json(_) => ErrorKind::Config,
        }
    }

    /// The upload step this error aborted, if it came from an upload.
    pub fn upload_step(&self) -> Option<UploadStep> {
        match self {
            PP1Error::UploadRejected { step, .. } | PP1Error::UploadFailed { step, .. } => Some(*step),
            PP1Error::TransferIncomplete { .. } => Some(UploadStep::Transfer),
            _ => None,
        }
    }

    /// Whether repeating the failed call as-is is safe.
    ///
    /// Reads are idempotent. An upload that got past the delete step may have
    /// left a partial pattern on the machine and needs an explicit delete first.
    pub fn is_retry_safe(&self) -> bool {
        match self.upload_step() {
            Some(UploadStep::Delete) => true,
            Some(_) => false,
            None => !matches!(
                self.kind(),
                ErrorKind::CoordinateOutOfRange | ErrorKind::EmptyPattern | ErrorKind::Config
            ),
        }
    }

    pub(crate) fn at_step(self, step: UploadStep) -> PP1Error {
        match self {
            PP1Error::UploadRejected { .. } | PP1Error::UploadFailed { .. } | PP1Error::TransferIncomplete { .. } => {
                self
            }
            other => PP1Error::UploadFailed {
                step,
                source: Box::new(other),
            },
        }
    }
}
