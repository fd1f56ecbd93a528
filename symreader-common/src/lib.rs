//! Common functionality for `symreader`.
//!
//! This crate exposes a set of key types:
//!
//!  - [`ByteView`]: Gives access to binary data in-memory or on the file system.
//!  - [`Language`]: The source language of a document, derived from its language GUID.
//!  - [`Uuid`]: Re-exported from the `uuid` crate, used for all GUIDs in Portable PDB files.
//!
//! # Features
//!
//! - `serde` (optional): Implements `serde::Deserialize` and `serde::Serialize` for all data types.

#![warn(missing_docs)]

mod byteview;
mod types;

pub use crate::byteview::*;
pub use crate::types::*;

pub use uuid::Uuid;
