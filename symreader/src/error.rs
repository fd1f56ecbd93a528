use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use symreader_ppdb::FormatError;

use crate::pe::PeError;

/// The kind of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The requested document, method, line, offset or PDB does not exist.
    #[error("not found")]
    NotFound,
    /// The reader was released and can no longer be queried.
    #[error("the symbol reader has been released")]
    InvalidState,
    /// The requested field has no meaning for Portable PDBs.
    #[error("not implemented")]
    NotImplemented,
    /// The PDB or binary could not be decoded.
    #[error("malformed input")]
    MalformedInput,
    /// The query is not valid for the object it was issued on.
    #[error("unexpected query")]
    Unexpected,
    /// A file could not be read.
    #[error("failed to read file")]
    Io,
    /// The metadata import of the compiled binary could not be created.
    #[error("metadata import is unavailable")]
    MetadataUnavailable,
}

/// An error returned by the symbol reader and the binder.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Error {
    /// Creates a new error from a known kind of error as well as an arbitrary error payload.
    pub fn new<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`ErrorKind`] for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        Self::new(ErrorKind::MalformedInput, e)
    }
}

impl From<PeError> for Error {
    fn from(e: PeError) -> Self {
        Self::new(ErrorKind::MalformedInput, e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::new(ErrorKind::Io, e)
    }
}
