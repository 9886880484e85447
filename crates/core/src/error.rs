//! Engine error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// The commercial document families the engine manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Client,
    Quote,
    Amendment,
    Invoice,
    CreditNote,
    Deposit,
    Payment,
}

impl core::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            DocumentKind::Client => "client",
            DocumentKind::Quote => "quote",
            DocumentKind::Amendment => "amendment",
            DocumentKind::Invoice => "invoice",
            DocumentKind::CreditNote => "credit note",
            DocumentKind::Deposit => "deposit",
            DocumentKind::Payment => "payment",
        };
        f.write_str(label)
    }
}

/// Engine-level error.
///
/// Keep this focused on deterministic business failures (immutability,
/// transition legality, numbering conflicts, validation). Every variant
/// carries enough context for an outer layer to build a user-facing message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A locked document was written outside its field whitelist.
    #[error("{document} {number:?} is immutable; rejected fields: {fields:?}")]
    ImmutableDocument {
        document: DocumentKind,
        number: Option<String>,
        fields: Vec<String>,
    },

    /// A status change is not in the allowed transition table.
    #[error("{document} {number:?} cannot transition from {from} to {to}")]
    IllegalTransition {
        document: DocumentKind,
        number: Option<String>,
        from: String,
        to: String,
    },

    /// A signing transition failed its precondition check.
    #[error("{document} cannot be signed: {reason}")]
    SigningPrecondition {
        document: DocumentKind,
        reason: String,
    },

    /// A duplicate document number was detected at commit.
    ///
    /// This denotes a benign race (two writers picked the same sequence),
    /// not a logic fault; callers retry with a fresh sequence read.
    #[error("document number already taken: {number}")]
    NumberingConflict { number: String },

    /// A referenced document or line does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A value failed validation (e.g. empty reason, negative percentage).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The persistence layer failed (lock poisoning, corrupt snapshot).
    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    pub fn immutable(
        document: DocumentKind,
        number: Option<&str>,
        fields: Vec<String>,
    ) -> Self {
        Self::ImmutableDocument {
            document,
            number: number.map(str::to_owned),
            fields,
        }
    }

    pub fn illegal_transition(
        document: DocumentKind,
        number: Option<&str>,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::IllegalTransition {
            document,
            number: number.map(str::to_owned),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn signing_precondition(document: DocumentKind, reason: impl Into<String>) -> Self {
        Self::SigningPrecondition {
            document,
            reason: reason.into(),
        }
    }

    pub fn numbering_conflict(number: impl Into<String>) -> Self {
        Self::NumberingConflict {
            number: number.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
