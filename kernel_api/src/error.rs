//! Error types for process creation
//!
//! Each collaborator has its own narrow error type. All of them convert
//! into [`SpawnError`], whose four kinds are the only failures a caller of
//! spawn ever sees.

use hal::MemoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from reading a program out of storage
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No program exists at the path
    #[error("Program not found: {0}")]
    NotFound(String),

    /// The program exists but could not be read
    #[error("I/O error reading {path}: {reason}")]
    Io { path: String, reason: String },

    /// No memory for the image buffer
    #[error("Out of memory reading program")]
    OutOfMemory,
}

/// Errors from validating an executable image
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatError {
    /// Zero-length image
    #[error("Executable image is empty")]
    Empty,

    /// Image ends before a header or section does
    #[error("Executable image is truncated")]
    Truncated,

    /// Invalid magic number
    #[error("Invalid magic: {0:#x}")]
    InvalidMagic(u32),

    /// Unsupported version
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u32),

    /// Invalid section type
    #[error("Invalid section type: {0}")]
    InvalidSectionType(u32),

    /// Section size is not a whole number of pages
    #[error("Section size {0} is not page aligned")]
    InvalidAlignment(u64),

    /// Image has no executable section
    #[error("Executable has no text section")]
    MissingText,

    /// Entry point is not inside an executable section
    #[error("Entry point {0:#x} is outside the text section")]
    InvalidEntryPoint(u64),

    /// Segments do not fit in the user image area
    #[error("Image of {0} bytes exceeds the user image area")]
    ImageTooLarge(u64),

    /// Two regions of the address space would overlap
    #[error("Region at {0:#x} overlaps an existing region")]
    OverlappingRegion(u64),

    /// Command line cannot be turned into an argument block
    #[error("Invalid command line")]
    InvalidCommandLine,
}

/// Errors from building an address space
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    /// Frame or heap exhaustion
    #[error("Out of memory building address space")]
    OutOfMemory,

    /// Load plan or command line rejected during layout
    #[error("Invalid format: {0}")]
    InvalidFormat(#[from] FormatError),
}

impl From<MemoryError> for BuildError {
    fn from(_: MemoryError) -> Self {
        BuildError::OutOfMemory
    }
}

/// Errors returned to the caller of spawn
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SpawnError {
    /// Program path does not exist
    #[error("Program not found: {0}")]
    NotFound(String),

    /// Program exists but reading it failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Image is not a valid program
    #[error("Invalid executable: {0}")]
    InvalidFormat(FormatError),

    /// Memory ran out at some step
    #[error("Out of memory")]
    OutOfMemory,
}

/// The four failure kinds of spawn, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnErrorKind {
    NotFound,
    IoError,
    InvalidFormat,
    OutOfMemory,
}

impl SpawnError {
    /// Returns the failure kind
    pub fn kind(&self) -> SpawnErrorKind {
        match self {
            SpawnError::NotFound(_) => SpawnErrorKind::NotFound,
            SpawnError::Io(_) => SpawnErrorKind::IoError,
            SpawnError::InvalidFormat(_) => SpawnErrorKind::InvalidFormat,
            SpawnError::OutOfMemory => SpawnErrorKind::OutOfMemory,
        }
    }
}

impl From<StoreError> for SpawnError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => SpawnError::NotFound(path),
            StoreError::Io { path, reason } => SpawnError::Io(format!("{}: {}", path, reason)),
            StoreError::OutOfMemory => SpawnError::OutOfMemory,
        }
    }
}

impl From<FormatError> for SpawnError {
    fn from(err: FormatError) -> Self {
        SpawnError::InvalidFormat(err)
    }
}

impl From<BuildError> for SpawnError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::OutOfMemory => SpawnError::OutOfMemory,
            BuildError::InvalidFormat(format) => SpawnError::InvalidFormat(format),
        }
    }
}
