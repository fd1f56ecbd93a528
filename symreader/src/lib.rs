//! Reads symbols of .NET binaries from Portable PDB files.
//!
//! This crate answers the questions a debugger asks about a compiled .NET binary: which source
//! documents it was built from, which source lines an IL offset maps to and back, which local
//! variables and constants are in scope, and how the `MoveNext` methods of async state machines
//! step through their await points.
//!
//! # Functionality
//!
//! * Find the Portable PDB of a binary with [`SymBinder::reader_for_file`], which checks the
//!   binary itself, its directory and a search path.
//! * Query documents, methods, scopes, variables and constants through a [`SymReader`] and the
//!   views derived from it, such as [`Document`], [`Method`] and [`Scope`].
//! * Interpret `decimal` and `DateTime` constants and local variable signatures with the metadata
//!   of the compiled binary, which is only loaded once a query needs it. See [`metadata`].
//! * Adapt any sequence result to the "ask for the size first" calling convention of native
//!   symbol reader tooling with the functions in [`buffer`].
//!
//! # Lifecycle
//!
//! Readers are reference counted explicitly with [`SymReader::add_ref`] and
//! [`SymReader::release`]. Once the count drops to zero, the reader and all views obtained from it
//! fail every query with [`ErrorKind::InvalidState`].
//!
//! ```
//! use symreader::{ErrorKind, NoMetadataImport, ReleaseStatus, SymReader};
//!
//! let pdb = symreader_testutils::sample_pdb();
//! let reader = SymReader::parse(&pdb, NoMetadataImport).unwrap();
//! let documents = reader.documents().unwrap();
//! assert_eq!(documents.len(), 13);
//!
//! assert_eq!(reader.release(), ReleaseStatus::Released);
//! assert_eq!(documents[0].url().unwrap_err().kind(), ErrorKind::InvalidState);
//! ```

#![warn(missing_docs)]

mod binder;
pub mod buffer;
mod document;
mod error;
mod lifecycle;
pub mod metadata;
mod method;
pub mod pe;
mod reader;
mod scope;

pub use binder::{BinderOptions, SymBinder};
pub use document::{Document, DocumentFilter};
pub use error::{Error, ErrorKind};
pub use lifecycle::ReleaseStatus;
pub use metadata::{MetadataImport, MetadataImportProvider, NoMetadataImport};
pub use method::{AsyncMethod, Method};
pub use reader::SymReader;
pub use scope::{Constant, Namespace, Scope, Variable, ADDRESS_KIND_IL_OFFSET};

pub use symreader_ppdb::{
    AsyncStepInfo, ConstantValue, Decimal, DebugInfo, FormatError, FormatErrorKind, Import, PdbId,
    SequencePoint, TypeName, HIDDEN_LINE,
};
