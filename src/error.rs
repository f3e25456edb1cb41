//! Crate-wide error types.
//!
//! The parser itself (see [`crate::parser::Parser`]) never returns an error from
//! `feed` — malformed input is counted and discarded, not surfaced as a `Result`.
//! Errors exist only at the edges the parser does not own: byte sources and
//! persistence.

use std::fmt;

/// Errors raised by a [`crate::source::ByteSource`] implementation.
#[derive(Debug)]
pub enum SourceError {
    /// The peer closed the connection (TCP) or the device disappeared (serial).
    Closed,
    /// The underlying I/O operation failed.
    Io(std::io::Error),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Closed => write!(f, "byte source closed by peer"),
            SourceError::Io(e) => write!(f, "byte source I/O error: {e}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Closed => None,
            SourceError::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Io(e)
    }
}

/// Errors raised while loading or saving the coordinator's persistent document.
///
/// Per the coordinator's load policy, a `PersistenceError` during `load` is
/// logged once and treated as an empty document — it is never propagated to
/// the caller as a fatal condition.
#[derive(Debug)]
pub enum PersistenceError {
    /// The stored document could not be parsed as JSON.
    Corrupt(serde_json::Error),
    /// The underlying storage could not be read or written.
    Io(std::io::Error),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Corrupt(e) => write!(f, "corrupt persisted document: {e}"),
            PersistenceError::Io(e) => write!(f, "persistence I/O error: {e}"),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Corrupt(e) => Some(e),
            PersistenceError::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        PersistenceError::Io(e)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Corrupt(e)
    }
}

/// Errors raised while decoding or encoding a [`crate::types::Barcode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarcodeError {
    /// Input was shorter than the minimum valid barcode length.
    TooShort,
    /// The dash separator was missing or in the wrong position.
    MissingDash,
    /// One of the digit runs was not valid hex.
    InvalidHex,
    /// The trailing check character was not a letter at all.
    InvalidCheckChar,
    /// The trailing check character did not match the computed CRC check digit.
    CrcMismatch,
}

impl fmt::Display for BarcodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BarcodeError::TooShort => write!(f, "barcode too short"),
            BarcodeError::MissingDash => write!(f, "barcode missing '-' separator"),
            BarcodeError::InvalidHex => write!(f, "barcode body is not valid hex"),
            BarcodeError::InvalidCheckChar => write!(f, "barcode check character is not a letter"),
            BarcodeError::CrcMismatch => write!(f, "barcode check character CRC mismatch"),
        }
    }
}

impl std::error::Error for BarcodeError {}
