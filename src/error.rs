//! Crate-wide error taxonomy.
//!
//! Mirrors the propagation policy in the specification: transient errors
//! are retried and never escape their component, permanent per-target
//! errors remove one service from the current cycle, cycle-fatal errors
//! abort the cycle while leaving the Aggregator's prior snapshot intact,
//! and process-fatal errors exit the binary with code 1.

use thiserror::Error;

/// An error surfaced by a pipeline component.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// A network/IO error that a component's own retry budget already
    /// exhausted. Recorded as a per-service failure, never escalated.
    #[error("transient failure for {target}: {source}")]
    Transient {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    /// A 4xx, unparseable body, or persistent per-identity I/O error.
    /// The owning service is absent from this cycle's overviews.
    #[error("permanent failure for {target}: {reason}")]
    PermanentPerTarget { target: String, reason: String },

    /// ClusterIndex unavailable, storage root unwritable, or similar.
    /// The cycle aborts; the Aggregator keeps its last-good snapshot.
    #[error("cycle aborted: {0}")]
    CycleFatal(String),

    /// Impossible configuration or a panic in a supervised component.
    /// The process exits with code 1.
    #[error("fatal initialisation error: {0}")]
    ProcessFatal(String),
}

pub type Result<T> = std::result::Result<T, GovernanceError>;

impl GovernanceError {
    /// Maps to the process exit code defined in the specification's
    /// external interfaces section.
    pub fn exit_code(&self) -> i32 {
        match self {
            GovernanceError::ProcessFatal(_) => 1,
            _ => 0,
        }
    }
}
