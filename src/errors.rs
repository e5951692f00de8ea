//! Error types for link-layer operations
//!
//! Only two failures are ever visible to a caller of a healthy session:
//! transport I/O errors and an exhausted retry budget. Framing and checksum
//! problems are absorbed by the parser and the ARQ loop and never surface.
use std::io;

use thiserror::Error;

use crate::session::{Role, SessionState};

/// Result type alias for link-layer operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Link-layer error enumeration
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O failure on the underlying byte channel
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Retry budget exhausted without a qualifying reply
    #[error("link timeout: no {awaiting} after {attempts} transmission(s)")]
    LinkTimeout {
        /// Number of times the frame went out on the wire
        attempts: u32,
        /// Human-readable name of the reply that never came
        awaiting: &'static str,
    },

    /// Operation is reserved for the other end of the link
    #[error("{operation} is not available to the {role} role")]
    WrongRole {
        /// Operation that was attempted
        operation: &'static str,
        /// Role of the session it was attempted on
        role: Role,
    },

    /// Operation requires an open session
    #[error("session is not open (state: {state})")]
    NotOpen {
        /// State the session was in
        state: SessionState,
    },

    /// Payload exceeds the configured maximum information field
    #[error("payload of {size} bytes exceeds the {max} byte maximum")]
    PayloadTooLarge {
        /// Size of the rejected payload
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Configuration a session cannot run with
    #[error("invalid link configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with it
        reason: &'static str,
    },
}

impl LinkError {
    /// True for the retry-budget-exhausted case
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::LinkTimeout { .. })
    }
}

/// Malformed byte sequences detected while recognising a frame.
///
/// These are recovered locally by resynchronising the parser.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// An ESCAPE byte was the last byte of the stuffed region
    #[error("escape byte with no following byte")]
    DanglingEscape,

    /// Closing delimiter arrived with no information field at all
    #[error("information frame closed with an empty data field")]
    EmptyInformationField,

    /// Data field grew past the largest frame the receiver accepts
    #[error("data field exceeds {limit} stuffed bytes")]
    Oversized {
        /// Largest accepted stuffed data field
        limit: usize,
    },
}
