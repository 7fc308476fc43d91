//! Error types for collection holders.
//!
//! Two failure surfaces exist: the received gate (a blocked `wait_data`
//! can be cancelled) and the transform functions injected into
//! derivations (a single bad element must not corrupt a batch).

use std::fmt;

use thiserror::Error;

/// Errors surfaced by holder operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HolderError {
    /// The wait for the first data batch was cancelled via
    /// [`cancel`](crate::MapHolder::cancel) before any data arrived.
    #[error("wait for first data batch was cancelled")]
    WaitCancelled,
}

/// A transform function inside a derivation failed for one entry.
///
/// The derivation does not upsert the offending key; the rest of the
/// batch is unaffected. Instances are handed to the error sink the
/// derivation was constructed with.
#[derive(Debug, Error)]
#[error("transform failed for key {key:?}: {error}")]
pub struct TransformError<K: fmt::Debug> {
    /// The key whose value could not be transformed.
    pub key: K,
    /// The failure reported by the transform function.
    pub error: anyhow::Error,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
