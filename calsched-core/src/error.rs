//! Error taxonomy for the calsched reconciliation core.
//!
//! Mirrors the stable string codes in spec.md §7: invariant violations and
//! safety stops are always fatal, source malformation is fatal per-document
//! but recoverable per-row (collected as warnings instead, see [`Warning`]),
//! and IO/JSON failures leave prior state intact because every write goes
//! through [`crate::store::StateStore`]'s atomic replace.

use thiserror::Error;

/// Structured context attached to an [`Error::InvariantViolation`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationContext {
    pub id: Option<String>,
    pub field: Option<String>,
    pub stored: Option<String>,
    pub computed: Option<String>,
}

impl ViolationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_stored(mut self, stored: impl Into<String>) -> Self {
        self.stored = Some(stored.into());
        self
    }

    pub fn with_computed(mut self, computed: impl Into<String>) -> Self {
        self.computed = Some(computed.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Fatal, never recovered: identity missing/incomplete/duplicate/mutated,
    /// forbidden field in identity, stored hash mismatch, sub-event missing
    /// state hash, managed event with zero sub-events.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        message: String,
        context: ViolationContext,
    },

    /// Fatal: Reconciler saw two non-empty sources sharing no identities, or
    /// Differ saw an attempt to convert an unmanaged event to managed.
    #[error("safety stop: {0}")]
    SafetyStop(String),

    /// Fatal per-document: an ICS row with no UID, a scheduler row with no
    /// target, or an orphan cancellation/override referring to an unknown
    /// parent UID.
    #[error("source malformed: {0}")]
    SourceMalformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn invariant(message: impl Into<String>, context: ViolationContext) -> Self {
        Error::InvariantViolation {
            message: message.into(),
            context,
        }
    }

    /// Stable string code, shared with the CLI for exit-code mapping (§6).
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvariantViolation { .. } => "invariant_violation",
            Error::SafetyStop(_) => "safety_stop",
            Error::SourceMalformed(_) => "source_malformed",
            Error::Io(_) => "io_error",
            Error::Json(_) => "io_error",
            Error::Config(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A recoverable, per-row source-malformation note collected during
/// snapshotting/normalization instead of aborting the pipeline (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    pub row_uid: Option<String>,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Warning {
            message: message.into(),
            row_uid: None,
        }
    }

    pub fn for_uid(message: impl Into<String>, uid: impl Into<String>) -> Self {
        Warning {
            message: message.into(),
            row_uid: Some(uid.into()),
        }
    }
}
