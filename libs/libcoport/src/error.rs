//! Error types for coport operations

use crate::port::PortKind;
use thiserror::Error;

/// Coport engine error types
///
/// Every failure is local to the calling operation. None of them leave a
/// port in a different state than before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoportError {
    /// Port is closed or closing
    #[error("Pipe closed")]
    PipeClosed,

    /// Transfer cannot proceed without blocking (ring or stream full, or no
    /// poll match in non-blocking mode)
    #[error("Operation would block")]
    WouldBlock,

    /// Handle, rights, payload or buffer rejected before any mutation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Port table for this kind is exhausted
    #[error("Capacity exceeded for {0} ports")]
    CapacityExceeded(PortKind),
}

/// Result type for coport operations
pub type Result<T> = std::result::Result<T, CoportError>;

/// Numeric status codes surfaced to callers that marshal results as integers
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    WouldBlock = -11,
    InvalidArgument = -22,
    CapacityExceeded = -28,
    PipeClosed = -32,
}

impl ErrorCode {
    /// Raw integer value
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

impl CoportError {
    /// Shorthand for an invalid-argument error
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    /// Check if retrying (or polling first) can make the operation succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }

    /// Convert to the caller-facing status code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::PipeClosed => ErrorCode::PipeClosed,
            Self::WouldBlock => ErrorCode::WouldBlock,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::CapacityExceeded(_) => ErrorCode::CapacityExceeded,
        }
    }
}
