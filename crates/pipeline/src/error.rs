//! Pipeline error types

use crate::registry::Handle;

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors from the pipeline interface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// A close delimiter arrived while the connection's nesting depth
    /// was already zero. The producer and the pipeline disagree on
    /// scope boundaries; continuing would attribute commands to the
    /// wrong block, so no recovery is attempted inside the pipeline.
    /// The transport decides whether this aborts the process or only
    /// the offending connection.
    #[error("unpaired close delimiter on connection {handle}")]
    ProtocolViolation { handle: Handle },

    /// Operation referenced a handle that is not registered. Indicates
    /// a transport bug, not data corruption; recoverable.
    #[error("unknown connection handle {0}")]
    UnknownHandle(Handle),
}
