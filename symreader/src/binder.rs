//! Locating the Portable PDB of a binary.
//!
//! [`SymBinder::reader_for_file`] resolves a PDB in three steps, and the first one that succeeds
//! wins:
//!
//!  1. The Portable PDB embedded into the binary.
//!  2. A file with the binary's name and a `.pdb` extension next to the binary.
//!  3. The same file name in every directory of the search path, probed directly as well as in
//!     the `dll` and `symbols/dll` subdirectories used by symbol caches.
//!
//! A file found on disk is only used if its identity matches the CodeView entry of the binary.
//! Files that are not Portable PDBs, such as Windows PDBs, or that belong to a different build are
//! skipped.

use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use symreader_common::ByteView;
use symreader_ppdb::{DebugInfo, PdbId, PortablePdb};

use crate::metadata::{MetadataImport, MetadataImportProvider};
use crate::pe::PeDebugInfo;
use crate::{Error, ErrorKind, SymReader};

/// The environment variables that hold additional symbol search paths.
const SYMBOL_PATH_VARIABLES: [&str; 2] = ["_NT_SYMBOL_PATH", "_NT_ALT_SYMBOL_PATH"];

/// Prefixes of symbol path entries that refer to symbol servers.
const SYMBOL_SERVER_PREFIXES: [&str; 3] = ["srv*", "symsrv*", "cache*"];

/// Options for [`SymBinder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinderOptions {
    /// The subdirectories probed in every search directory, in order.
    ///
    /// The empty string probes the search directory itself.
    pub probe_subdirectories: Vec<String>,
    /// The character separating directories in a search path.
    pub search_path_separator: char,
    /// The file extension of PDB files, without the leading dot.
    pub pdb_extension: String,
    /// Appends the directories of `_NT_SYMBOL_PATH` and `_NT_ALT_SYMBOL_PATH` to the search path.
    ///
    /// Symbol server entries are skipped, since this crate does not download files.
    pub use_environment: bool,
}

impl Default for BinderOptions {
    fn default() -> Self {
        Self {
            probe_subdirectories: vec!["".into(), "dll".into(), "symbols/dll".into()],
            search_path_separator: ';',
            pdb_extension: "pdb".into(),
            use_environment: false,
        }
    }
}

/// Creates [`SymReader`]s from binaries, PDB files and streams.
#[derive(Debug, Clone, Default)]
pub struct SymBinder {
    options: BinderOptions,
}

impl SymBinder {
    /// Creates a binder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a binder with the given options.
    pub fn with_options(options: BinderOptions) -> Self {
        Self { options }
    }

    /// The options of this binder.
    pub fn options(&self) -> &BinderOptions {
        &self.options
    }

    /// Finds and reads the Portable PDB of the binary at `pe_path`.
    ///
    /// `search_path` is a list of directories separated by
    /// [`search_path_separator`](BinderOptions::search_path_separator). Fails with
    /// [`ErrorKind::NotFound`] if no matching PDB exists.
    pub fn reader_for_file<P>(
        &self,
        provider: P,
        pe_path: impl AsRef<Path>,
        search_path: Option<&str>,
    ) -> Result<SymReader, Error>
    where
        P: MetadataImportProvider + 'static,
    {
        let pe_path = pe_path.as_ref();
        let view = ByteView::open(pe_path)?;
        let pe = PeDebugInfo::parse(&view)?;

        if let Some(pdb) = pe.embedded_pdb()? {
            tracing::debug!(path = %pe_path.display(), "using embedded portable pdb");
            let info = DebugInfo::parse(&pdb)?;
            return Ok(SymReader::new(info, provider));
        }

        let Some(codeview) = pe.codeview() else {
            tracing::debug!(path = %pe_path.display(), "binary does not reference a pdb");
            return Err(ErrorKind::NotFound.into());
        };
        let expected = codeview.pdb_id();

        for candidate in self.candidates(pe_path, search_path) {
            if let Some(info) = probe(&candidate, expected)? {
                tracing::debug!(path = %candidate.display(), id = %expected, "found portable pdb");
                return Ok(SymReader::new(info, provider));
            }
        }

        Err(Error::new(
            ErrorKind::NotFound,
            format!("no portable pdb with id {expected}"),
        ))
    }

    /// Reads the Portable PDB at `pdb_path` without checking which binary it belongs to.
    pub fn reader_from_pdb_file<P>(
        &self,
        provider: P,
        pdb_path: impl AsRef<Path>,
    ) -> Result<SymReader, Error>
    where
        P: MetadataImportProvider + 'static,
    {
        let view = ByteView::open(pdb_path)?;
        Ok(SymReader::new(DebugInfo::parse(&view)?, provider))
    }

    /// Reads a Portable PDB from a stream, using an existing metadata import.
    pub fn reader_from_stream<R: Read>(
        &self,
        stream: R,
        import: Arc<dyn MetadataImport>,
    ) -> Result<SymReader, Error> {
        let view = ByteView::read(stream)?;
        let info = DebugInfo::parse(&view)?;
        Ok(SymReader::with_metadata_import(info, import))
    }

    /// Reads a Portable PDB from a stream, creating the metadata import when it is first needed.
    pub fn reader_from_pdb_stream<R, P>(&self, stream: R, provider: P) -> Result<SymReader, Error>
    where
        R: Read,
        P: MetadataImportProvider + 'static,
    {
        let view = ByteView::read(stream)?;
        Ok(SymReader::new(DebugInfo::parse(&view)?, provider))
    }

    /// The directories to search, including those from the environment.
    fn search_directories(&self, search_path: Option<&str>) -> Vec<PathBuf> {
        let mut paths: Vec<String> = search_path.into_iter().map(str::to_owned).collect();
        if self.options.use_environment {
            paths.extend(SYMBOL_PATH_VARIABLES.iter().filter_map(|name| env::var(name).ok()));
        }

        let mut directories = Vec::new();
        for entry in paths
            .iter()
            .flat_map(|path| path.split(self.options.search_path_separator))
        {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let lower = entry.to_ascii_lowercase();
            if SYMBOL_SERVER_PREFIXES
                .iter()
                .any(|prefix| lower.starts_with(prefix))
            {
                tracing::trace!(entry, "skipping symbol server");
                continue;
            }
            directories.push(PathBuf::from(entry));
        }
        directories
    }

    /// All paths probed for the PDB of the binary at `pe_path`, in order.
    fn candidates(&self, pe_path: &Path, search_path: Option<&str>) -> Vec<PathBuf> {
        let Some(stem) = pe_path.file_stem() else {
            return Vec::new();
        };
        let mut file_name = stem.to_os_string();
        file_name.push(".");
        file_name.push(&self.options.pdb_extension);

        let mut candidates = Vec::new();
        if let Some(dir) = pe_path.parent() {
            candidates.push(dir.join(&file_name));
        }
        for dir in self.search_directories(search_path) {
            for subdirectory in &self.options.probe_subdirectories {
                let mut candidate = dir.clone();
                candidate.extend(subdirectory.split('/').filter(|s| !s.is_empty()));
                candidate.push(&file_name);
                candidates.push(candidate);
            }
        }
        candidates
    }
}

/// Reads the file at `path` if it is the Portable PDB with the `expected` identity.
///
/// Missing and unreadable files, files in other formats and PDBs of other builds yield `None`.
fn probe(path: &Path, expected: PdbId) -> Result<Option<DebugInfo>, Error> {
    if !path.is_file() {
        tracing::trace!(path = %path.display(), "no file");
        return Ok(None);
    }

    let view = match ByteView::open(path) {
        Ok(view) => view,
        Err(e) => {
            tracing::debug!(
                path = %path.display(),
                error = &e as &dyn std::error::Error,
                "skipping unreadable file"
            );
            return Ok(None);
        }
    };

    if !PortablePdb::peek(&view) {
        tracing::debug!(path = %path.display(), "skipping file that is not a portable pdb");
        return Ok(None);
    }

    let ppdb = match PortablePdb::parse(&view) {
        Ok(ppdb) => ppdb,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = &e as &dyn std::error::Error,
                "skipping invalid portable pdb"
            );
            return Ok(None);
        }
    };

    match ppdb.pdb_id() {
        Some(id) if id == expected => Ok(Some(DebugInfo::decode(&ppdb)?)),
        id => {
            tracing::debug!(
                path = %path.display(),
                id = ?id,
                %expected,
                "skipping portable pdb of a different build"
            );
            Ok(None)
        }
    }
}
