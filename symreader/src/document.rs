use std::fmt;
use std::sync::Arc;

use symreader_common::{Language, Uuid, DOCUMENT_TYPE_TEXT, LANGUAGE_VENDOR_MICROSOFT};
use symreader_ppdb::DocumentInfo;

use crate::reader::{ReaderInner, ReaderState};
use crate::{Error, ErrorKind};

/// Filters for [`SymReader::document`](crate::SymReader::document).
///
/// A nil GUID matches every document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    /// The language GUID of the document.
    pub language: Uuid,
    /// The language vendor GUID of the document.
    pub language_vendor: Uuid,
    /// The document type GUID.
    pub document_type: Uuid,
    /// The GUID of the checksum algorithm of the document.
    pub checksum_algorithm: Uuid,
}

impl DocumentFilter {
    pub(crate) fn matches(&self, document: &DocumentInfo) -> bool {
        fn matches(filter: Uuid, value: Uuid) -> bool {
            filter.is_nil() || filter == value
        }

        matches(self.language, document.language_guid())
            && matches(self.language_vendor, LANGUAGE_VENDOR_MICROSOFT)
            && matches(self.document_type, DOCUMENT_TYPE_TEXT)
            && matches(self.checksum_algorithm, document.hash_algorithm())
    }
}

/// A source file referenced by the PDB.
///
/// Documents compare equal if they refer to the same record of the same reader.
#[derive(Clone)]
pub struct Document {
    reader: Arc<ReaderInner>,
    index: usize,
}

impl Document {
    pub(crate) fn new(reader: Arc<ReaderInner>, index: usize) -> Self {
        Self { reader, index }
    }

    /// The 0-based index of the document, or an error if it belongs to another reader.
    pub(crate) fn index_in(&self, reader: &Arc<ReaderInner>) -> Result<usize, Error> {
        if !Arc::ptr_eq(&self.reader, reader) {
            return Err(Error::new(
                ErrorKind::Unexpected,
                "document belongs to a different reader",
            ));
        }
        Ok(self.index)
    }

    fn record<'a>(&self, state: &'a ReaderState) -> Result<&'a DocumentInfo, Error> {
        state
            .info()
            .documents()
            .get(self.index)
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// Runs `f` on the document record.
    fn with_record<R>(&self, f: impl FnOnce(&DocumentInfo) -> R) -> Result<R, Error> {
        let state = self.reader.state()?;
        Ok(f(self.record(&state)?))
    }

    /// The URL of the document, usually its full path on the build machine.
    pub fn url(&self) -> Result<String, Error> {
        self.with_record(|record| record.name().to_owned())
    }

    /// The checksum of the document, empty if there is none.
    pub fn checksum(&self) -> Result<Vec<u8>, Error> {
        self.with_record(|record| record.hash().to_vec())
    }

    /// The GUID of the checksum algorithm, nil if the document has no checksum.
    pub fn checksum_algorithm(&self) -> Result<Uuid, Error> {
        self.with_record(DocumentInfo::hash_algorithm)
    }

    /// The language GUID of the document.
    pub fn language(&self) -> Result<Uuid, Error> {
        self.with_record(DocumentInfo::language_guid)
    }

    /// The language vendor GUID, which is always Microsoft's.
    pub fn language_vendor(&self) -> Result<Uuid, Error> {
        self.with_record(|_| LANGUAGE_VENDOR_MICROSOFT)
    }

    /// The document type GUID, which is always the one of text documents.
    pub fn document_type(&self) -> Result<Uuid, Error> {
        self.with_record(|_| DOCUMENT_TYPE_TEXT)
    }

    /// Returns true if the source of the document is embedded in the PDB.
    pub fn has_embedded_source(&self) -> Result<bool, Error> {
        self.with_record(|record| record.embedded_source().is_some())
    }

    /// The size of the embedded source in bytes, 0 if there is none.
    pub fn source_length(&self) -> Result<usize, Error> {
        let state = self.reader.state()?;
        match self.record(&state)?.embedded_source() {
            Some(source) => Ok(source.len()?),
            None => Ok(0),
        }
    }

    /// The embedded source of the document, decompressed if necessary.
    pub fn embedded_source(&self) -> Result<Option<Vec<u8>>, Error> {
        let state = self.reader.state()?;
        match self.record(&state)?.embedded_source() {
            Some(source) => Ok(Some(source.contents()?.into_owned())),
            None => Ok(None),
        }
    }

    /// The URL the document can be downloaded from, as mapped by the PDB's Source Link
    /// documents.
    pub fn source_link_url(&self) -> Result<Option<String>, Error> {
        let state = self.reader.state()?;
        let record = self.record(&state)?;
        Ok(state.info().source_link_mappings().resolve(record.name()))
    }

    /// Returns the first line at or after `line` that starts a sequence point in this document.
    pub fn find_closest_line(&self, line: u32) -> Result<u32, Error> {
        let state = self.reader.state()?;
        let closest = state
            .info()
            .methods()
            .flat_map(|method| method.sequence_points())
            .filter(|point| point.document == self.index && !point.is_hidden())
            .map(|point| point.start_line)
            .filter(|&start_line| start_line >= line)
            .min();
        closest.ok_or_else(|| ErrorKind::NotFound.into())
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.reader, &other.reader) && self.index == other.index
    }
}

impl Eq for Document {}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Document");
        s.field("index", &self.index);
        if let Ok(state) = self.reader.state() {
            if let Ok(record) = self.record(&state) {
                s.field("url", &record.name())
                    .field("language", &Language::from_guid(record.language_guid()));
            }
        }
        s.finish()
    }
}
