//! Provides support for reading Portable PDB files into a queryable model of their
//! debug information.
//!
//! [Portable PDB](https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md)
//! is a debugging information file format for Common Language Infrastructure (CLI) languages.
//! It is an extension of the [ECMA-335 format](https://www.ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf).
//!
//! # Functionality
//!
//! * Parse Portable PDB files with [`PortablePdb::parse`].
//! * Decode all documents, methods, scopes, local variables, local constants, import scopes,
//!   async stepping information, embedded sources and Source Link documents into a
//!   [`DebugInfo`] with [`DebugInfo::decode`].
//! * Decode local constant values with [`ConstantData::resolve`].
//! * Map document paths to URLs with [`SourceLinkMappings::resolve`].
//!
//! # Structure of a Portable PDB file
//! An ECMA-335 file is divided into sections called _streams_. The possible streams are
//! * `#~` ("metadata"), comprising information about classes, methods, modules, &c.,
//!   organized into tables adhering to various schemas. The original ECMA-335 tables
//!   are described in Section II.22 of the ECMA-335 spec, the tables added by Portable PDB are
//!   described in the Portable PDB spec.
//! * `#Strings`, comprising null-terminated UTF-8 strings.
//! * `#GUID`, a list of GUIDs.
//! * `#US` ("user strings"), comprising UTF-16 encoded strings.
//! * `#Blob`, comprising blobs of data that don't fit in any of the other streams.
//!
//! The Portable PDB format extends ECMA-335 by the addition of another steam, `#Pdb`, as well
//! as several tables to the `#~` stream. The `#Pdb` stream holds the identity of the file and
//! the row counts of the tables of the binary it describes.

#![warn(missing_docs)]

mod constants;
mod debug_info;
mod format;
mod sourcelinks;

pub use constants::{ConstantData, ConstantValue, Decimal, TypeName};
pub use debug_info::{
    method_row, AsyncMethodInfo, AsyncStepInfo, ConstantInfo, DebugInfo, DocumentInfo,
    EmbeddedSource, ImportScopeInfo, MethodInfo, ScopeInfo, VariableInfo,
    LOCAL_VARIABLE_DEBUGGER_HIDDEN, METHOD_DEF_TOKEN, STAND_ALONE_SIG_TOKEN,
};
pub use format::signatures::local_slots as local_variable_signatures;
pub use format::{
    FormatError, FormatErrorKind, Import, PdbId, PortablePdb, SequencePoint, TableType,
    HIDDEN_LINE,
};
pub use sourcelinks::SourceLinkMappings;
