//! Core error type.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::protocol::FrameError;
use crate::transport::TransportError;

/// Coarse classification of a failure, used for reporting and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad user input; the device was not contacted.
    Usage,
    /// Fuse table or chip identity does not match what was declared.
    ConfigIntegrity,
    /// File, OS or link failure.
    Transport,
    /// File size differs from the region size (strict mode only).
    SizeMismatch,
    /// Readback differs from what was written.
    VerifyMismatch,
}

#[derive(Error, Debug)]
pub enum ProgError {
    #[error("{0}")]
    Usage(String),

    #[error(
        "fuse_decls are not sorted: `{name}` has opcode 0x{opcode:02X} after opcode 0x{previous:02X}"
    )]
    UnsortedFuses {
        name: String,
        opcode: u8,
        previous: u8,
    },

    #[error("Invalid fuse declaration `{name}`: {reason}")]
    FuseLayout { name: String, reason: String },

    #[error("Fuse `{name}` value 0x{value:X} does not fit in {length} byte(s)")]
    FuseValueOutOfRange { name: String, value: u32, length: u8 },

    #[error("Invalid device `{name}`: {reason}")]
    InvalidDevice { name: String, reason: String },

    #[error("Invalid Chip ID: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChipIdMismatch { expected: u32, actual: u32 },

    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Frame(#[from] FrameError),

    #[error("Overcurrent protection! (status 0x{status:04X})")]
    DeviceStatus { status: u16 },

    #[error("{operation} returned {actual} bytes (expected {expected})")]
    ShortTransfer {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Incorrect file size: {actual} (needed {expected})")]
    SizeMismatch { actual: usize, expected: usize },

    #[error("Verification failed at 0x{offset:02x}: 0x{expected:02x} != 0x{actual:02x}")]
    VerifyMismatch { offset: usize, expected: u8, actual: u8 },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ProgError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProgError::Usage(_) => ErrorKind::Usage,
            ProgError::UnsortedFuses { .. }
            | ProgError::FuseLayout { .. }
            | ProgError::FuseValueOutOfRange { .. }
            | ProgError::InvalidDevice { .. }
            | ProgError::ChipIdMismatch { .. } => ErrorKind::ConfigIntegrity,
            ProgError::Io { .. }
            | ProgError::Transport(_)
            | ProgError::Frame(_)
            | ProgError::DeviceStatus { .. }
            | ProgError::ShortTransfer { .. } => ErrorKind::Transport,
            ProgError::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            ProgError::VerifyMismatch { .. } => ErrorKind::VerifyMismatch,
            ProgError::Config(e) => e.kind(),
        }
    }
}

pub type Result<T, E = ProgError> = std::result::Result<T, E>;
