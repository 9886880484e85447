//! Shared immutability-guard machinery.
//!
//! French invoicing law makes an issued invoice or signed contract legally
//! immutable: it can only be corrected through a new linked document. The
//! guard enforces this at write time. Each document type describes itself
//! through [`GuardedDocument`] (its status lifecycle, its field diff and a
//! per-type whitelist of fields that stay writable after locking), and
//! [`guard_write`] provides the single rejection path all of them share.
//!
//! The lock is always derived from the **persisted** status, never the one
//! being written, so the guard must run against the last committed snapshot
//! of the document (read-before-write, inside the same transaction).

use crate::error::{DocumentKind, EngineError, EngineResult};

/// Contract a document type implements to be protected by the guard.
pub trait GuardedDocument {
    /// Status enum of the document's lifecycle.
    type Status: Copy + PartialEq + core::fmt::Display;

    /// Enumeration of the document's mutable fields, used for diffing.
    /// `'static` because [`GuardedDocument::whitelist`] borrows for that long.
    type Field: Copy + PartialEq + core::fmt::Display + 'static;

    /// Which document family this is (for error reporting).
    fn kind() -> DocumentKind;

    /// Human-readable number, if one has been assigned.
    fn number(&self) -> Option<&str>;

    fn status(&self) -> Self::Status;

    /// Whether the document's current status locks it against edits.
    fn is_locked(&self) -> bool;

    /// Fields that remain writable once the document is locked.
    fn whitelist() -> &'static [Self::Field];

    /// Fields whose values differ between the persisted and proposed copies.
    fn changed_fields(persisted: &Self, proposed: &Self) -> Vec<Self::Field>;

    /// Whether `from -> to` appears in the allowed transition table.
    fn transition_allowed(from: Self::Status, to: Self::Status) -> bool;
}

/// Validate a proposed write against the persisted copy of a document.
///
/// Two independent checks, both on every write:
/// - a status change must be in the type's transition table, whitelist or not;
/// - if the persisted status locks the document, every changed field must be
///   whitelisted, otherwise the write fails with `ImmutableDocument`.
pub fn guard_write<D: GuardedDocument>(persisted: &D, proposed: &D) -> EngineResult<()> {
    let from = persisted.status();
    let to = proposed.status();
    if from != to && !D::transition_allowed(from, to) {
        return Err(EngineError::illegal_transition(
            D::kind(),
            persisted.number(),
            from,
            to,
        ));
    }

    if persisted.is_locked() {
        let offending: Vec<String> = D::changed_fields(persisted, proposed)
            .into_iter()
            .filter(|field| !D::whitelist().contains(field))
            .map(|field| field.to_string())
            .collect();
        if !offending.is_empty() {
            return Err(EngineError::immutable(
                D::kind(),
                persisted.number(),
                offending,
            ));
        }
    }

    Ok(())
}
