use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use symreader_ppdb::{DebugInfo, PdbId};

use crate::document::{Document, DocumentFilter};
use crate::lifecycle::{RefCount, ReleaseStatus};
use crate::metadata::{LazyMetadataImport, MetadataImport, MetadataImportProvider};
use crate::method::Method;
use crate::{Error, ErrorKind};

/// The range of lines a method covers in one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MethodExtent {
    pub(crate) method: u32,
    pub(crate) document: usize,
    pub(crate) start_line: u32,
    pub(crate) end_line: u32,
}

impl MethodExtent {
    fn contains(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}

/// Computes the extent of every method in every document it has sequence points in.
fn compute_extents(info: &DebugInfo) -> Vec<MethodExtent> {
    let mut extents = Vec::new();
    for method in info.methods() {
        let mut by_document = BTreeMap::<usize, (u32, u32)>::new();
        for point in method.sequence_points() {
            if point.is_hidden() {
                continue;
            }
            let extent = by_document
                .entry(point.document)
                .or_insert((point.start_line, point.end_line));
            extent.0 = extent.0.min(point.start_line);
            extent.1 = extent.1.max(point.end_line);
        }
        extents.extend(
            by_document
                .into_iter()
                .map(|(document, (start_line, end_line))| MethodExtent {
                    method: method.token(),
                    document,
                    start_line,
                    end_line,
                }),
        );
    }
    extents
}

/// The decoded PDB and everything derived from it, dropped when the reader is released.
pub(crate) struct ReaderState {
    info: Arc<DebugInfo>,
    metadata: LazyMetadataImport,
    extents: Vec<MethodExtent>,
}

impl ReaderState {
    pub(crate) fn info(&self) -> &DebugInfo {
        &self.info
    }

    /// The metadata import, created on first use.
    pub(crate) fn metadata(&self) -> Result<&Arc<dyn MetadataImport>, Error> {
        self.metadata.get()
    }

    pub(crate) fn extents(&self) -> &[MethodExtent] {
        &self.extents
    }
}

/// The state shared by a reader and all views derived from it.
pub(crate) struct ReaderInner {
    refs: RefCount,
    state: RwLock<Option<Arc<ReaderState>>>,
}

impl ReaderInner {
    /// The reader state, or an error if the reader has been released.
    ///
    /// Queries hold on to the returned state until they finish, so a concurrent release only
    /// frees it once they are done.
    pub(crate) fn state(&self) -> Result<Arc<ReaderState>, Error> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.clone().ok_or_else(|| ErrorKind::InvalidState.into())
    }

    fn release(&self) -> ReleaseStatus {
        let status = self.refs.release();
        if status == ReleaseStatus::Released {
            let state = self
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            drop(state);
        }
        status
    }
}

/// Reads symbols from a decoded Portable PDB.
///
/// A reader is created with a reference count of one. [`add_ref`](Self::add_ref) and
/// [`release`](Self::release) manage the count explicitly; once it drops to zero, the reader and
/// every [`Document`], [`Method`], [`Scope`](crate::Scope) and other view obtained from it fail
/// all queries with [`ErrorKind::InvalidState`].
///
/// ```
/// use symreader::{NoMetadataImport, SymReader};
///
/// let pdb = symreader_testutils::sample_pdb();
/// let reader = SymReader::parse(&pdb, NoMetadataImport).unwrap();
///
/// let method = reader.method(0x0600_0001).unwrap();
/// assert_eq!(method.sequence_points().unwrap().len(), 6);
/// ```
pub struct SymReader {
    inner: Arc<ReaderInner>,
}

impl SymReader {
    /// Creates a reader over decoded debug information.
    ///
    /// The provider is not invoked until a query needs the metadata of the compiled binary.
    pub fn new<P>(info: DebugInfo, provider: P) -> Self
    where
        P: MetadataImportProvider + 'static,
    {
        Self::with_metadata(info, LazyMetadataImport::new(Box::new(provider)))
    }

    /// Creates a reader over decoded debug information with an existing metadata import.
    pub fn with_metadata_import(info: DebugInfo, import: Arc<dyn MetadataImport>) -> Self {
        Self::with_metadata(info, LazyMetadataImport::ready(import))
    }

    /// Parses and decodes a Portable PDB and creates a reader for it.
    pub fn parse<P>(data: &[u8], provider: P) -> Result<Self, Error>
    where
        P: MetadataImportProvider + 'static,
    {
        Ok(Self::new(DebugInfo::parse(data)?, provider))
    }

    pub(crate) fn with_metadata(info: DebugInfo, metadata: LazyMetadataImport) -> Self {
        let state = ReaderState {
            extents: compute_extents(&info),
            info: Arc::new(info),
            metadata,
        };
        let inner = ReaderInner {
            refs: RefCount::new(),
            state: RwLock::new(Some(Arc::new(state))),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The decoded debug information backing this reader.
    ///
    /// The returned value stays valid after the reader has been released.
    pub fn debug_info(&self) -> Result<Arc<DebugInfo>, Error> {
        Ok(self.inner.state()?.info.clone())
    }

    /// The identity of the PDB, if it has one.
    pub fn id(&self) -> Result<Option<PdbId>, Error> {
        Ok(self.inner.state()?.info().id())
    }

    /// All documents of the PDB.
    pub fn documents(&self) -> Result<Vec<Document>, Error> {
        let state = self.inner.state()?;
        let info = state.info();
        Ok((0..info.documents().len())
            .map(|index| Document::new(self.inner.clone(), index))
            .collect())
    }

    /// Looks up a document by its exact URL.
    ///
    /// Nil GUIDs in the filter match any document.
    pub fn document(&self, url: &str, filter: &DocumentFilter) -> Result<Document, Error> {
        let state = self.inner.state()?;
        state
            .info()
            .documents()
            .iter()
            .position(|document| document.name() == url && filter.matches(document))
            .map(|index| Document::new(self.inner.clone(), index))
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// Looks up a method by its `MethodDef` token.
    ///
    /// Fails with [`ErrorKind::NotFound`] if the PDB has no sequence points and no scopes for the
    /// method.
    pub fn method(&self, token: u32) -> Result<Method, Error> {
        let state = self.inner.state()?;
        match state.info().method(token) {
            Some(_) => Ok(Method::new(self.inner.clone(), token)),
            None => Err(ErrorKind::NotFound.into()),
        }
    }

    /// Looks up a method by its `MethodDef` token and edit-and-continue version.
    ///
    /// Portable PDBs only describe the first version of every method.
    pub fn method_by_version(&self, token: u32, version: u32) -> Result<Method, Error> {
        if version != 1 {
            self.inner.state()?;
            return Err(ErrorKind::NotFound.into());
        }
        self.method(token)
    }

    /// Returns all methods whose sequence points in `document` span the given line.
    ///
    /// The innermost method comes first, which is the one that starts on the latest line.
    /// Columns are not taken into account.
    pub fn methods_at(
        &self,
        document: &Document,
        line: u32,
        _column: u32,
    ) -> Result<Vec<Method>, Error> {
        let document = document.index_in(&self.inner)?;
        let state = self.inner.state()?;
        let mut extents: Vec<_> = state
            .extents()
            .iter()
            .filter(|extent| extent.document == document && extent.contains(line))
            .collect();
        extents.sort_by_key(|extent| (Reverse(extent.start_line), extent.end_line, extent.method));

        Ok(extents
            .into_iter()
            .map(|extent| Method::new(self.inner.clone(), extent.method))
            .collect())
    }

    /// Returns the innermost method spanning the given line.
    pub fn primary_method_at(
        &self,
        document: &Document,
        line: u32,
        column: u32,
    ) -> Result<Method, Error> {
        self.methods_at(document, line, column)?
            .into_iter()
            .next()
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// The `MethodDef` token of the user entry point, such as `Main`.
    pub fn user_entry_point(&self) -> Result<u32, Error> {
        self.inner
            .state()?
            .info()
            .entry_point()
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// The Source Link JSON documents of the PDB.
    pub fn source_link(&self) -> Result<Vec<String>, Error> {
        Ok(self.inner.state()?.info().source_link().to_vec())
    }

    /// The metadata import of the compiled binary.
    ///
    /// The first call creates the import through the provider the reader was created with.
    pub fn metadata_import(&self) -> Result<Arc<dyn MetadataImport>, Error> {
        self.inner.state()?.metadata().cloned()
    }

    /// Adds a reference to the reader and returns the new count.
    pub fn add_ref(&self) -> Result<usize, Error> {
        self.inner.refs.add_ref()
    }

    /// Drops a reference to the reader.
    ///
    /// Only the call that drops the last reference reports [`ReleaseStatus::Released`]. That call
    /// also frees the decoded PDB and the metadata import, even while views are still alive.
    pub fn release(&self) -> ReleaseStatus {
        let status = self.inner.release();
        if status == ReleaseStatus::Released {
            tracing::debug!("released symbol reader");
        }
        status
    }

    /// Returns true if the reader has been released.
    pub fn is_released(&self) -> bool {
        self.inner.refs.check().is_err()
    }
}

impl fmt::Debug for SymReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("SymReader");
        match self.inner.state() {
            Ok(state) => s
                .field("id", &state.info().id())
                .field("documents", &state.info().documents().len())
                .field("metadata", &state.metadata),
            Err(_) => s.field("released", &true),
        };
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use symreader_common::Uuid;
    use symreader_testutils::{PdbBuilder, Point, SAMPLE_GUID, SAMPLE_STAMP};

    use crate::NoMetadataImport;

    #[test]
    fn test_extents() {
        let info = DebugInfo::parse(&symreader_testutils::sample_pdb()).unwrap();
        let extents = compute_extents(&info);

        let main: Vec<_> = extents
            .iter()
            .filter(|extent| extent.method == 0x0600_0001)
            .collect();
        assert_eq!(
            main,
            [
                &MethodExtent {
                    method: 0x0600_0001,
                    document: 0,
                    start_line: 5,
                    end_line: 10,
                },
                &MethodExtent {
                    method: 0x0600_0001,
                    document: 1,
                    start_line: 3,
                    end_line: 3,
                },
            ]
        );

        // methods without sequence points have no extents
        assert!(!extents.iter().any(|extent| extent.method == 0x0600_0008));
    }

    #[test]
    fn test_nested_methods() {
        let mut builder = PdbBuilder::new(SAMPLE_GUID, SAMPLE_STAMP);
        builder.method_count(3);
        builder.add_document(
            "C:\\Lambda.cs",
            symreader_testutils::LANGUAGE_CSHARP,
            Uuid::nil(),
            &[],
        );
        builder.add_method(1, 0, &[Point::new(0, 1, 1, 1, 2), Point::new(4, 10, 1, 10, 2)]);
        builder.add_method(2, 0, &[Point::new(0, 4, 9, 6, 10)]);
        builder.add_method(3, 0, &[Point::new(0, 5, 13, 5, 20)]);

        let reader = SymReader::parse(&builder.build(), NoMetadataImport).unwrap();
        let document = reader.documents().unwrap().remove(0);

        let tokens = |line| -> Vec<u32> {
            reader
                .methods_at(&document, line, 0)
                .unwrap()
                .iter()
                .map(|method| method.token().unwrap())
                .collect()
        };
        assert_eq!(tokens(5), [0x0600_0003, 0x0600_0002, 0x0600_0001]);
        assert_eq!(tokens(4), [0x0600_0002, 0x0600_0001]);
        assert_eq!(tokens(10), [0x0600_0001]);
        assert!(tokens(11).is_empty());

        let primary = reader.primary_method_at(&document, 6, 1).unwrap();
        assert_eq!(primary.token().unwrap(), 0x0600_0002);
        let err = reader.primary_method_at(&document, 11, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
