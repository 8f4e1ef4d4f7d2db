//! Error types for driver operations

use thiserror::Error;

/// Errors reported by the driver and its host boundary
#[derive(Error, Debug)]
pub enum UartError {
    /// A host resource (identity, node, attribute, mapping) could not be
    /// acquired or looked up
    #[error("resource unavailable: {what}")]
    ResourceUnavailable {
        /// Which resource failed
        what: String,
    },

    /// The caller's buffer could not be accessed
    #[error("copy fault: caller buffer inaccessible")]
    CopyFault {
        /// Underlying I/O failure from the caller-copy boundary
        #[source]
        source: std::io::Error,
    },

    /// Unrecognized control opcode
    #[error("invalid command opcode {opcode:#06x}")]
    InvalidCommand {
        /// The rejected opcode
        opcode: u32,
    },

    /// Hardware readiness flag did not appear within the poll budget
    #[error("hardware not ready: {operation} timed out after {polls} polls")]
    NotReady {
        /// Operation that was waiting
        operation: &'static str,
        /// Number of polls performed before giving up
        polls: u32,
    },

    /// Request rejected before any hardware access
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Why the request was rejected
        reason: &'static str,
    },

    /// Operation attempted while the register mapping is not installed
    #[error("device not active")]
    NotActive,

    /// Configuration error
    #[error("configuration error: {reason}")]
    Config {
        /// What failed validation
        reason: String,
    },

    /// IO error from host or mapping plumbing
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error
    #[error("system call error: {source}")]
    Sys {
        /// Source nix error
        #[from]
        source: nix::Error,
    },
}

/// Result type for driver operations
pub type UartResult<T> = Result<T, UartError>;
