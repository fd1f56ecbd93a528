mod blob;
pub(crate) mod custom_debug_info;
mod documents;
mod imports;
mod metadata;
mod raw;
mod scopes;
mod sequence_points;
pub(crate) mod signatures;
mod streams;

use std::fmt;

use thiserror::Error;
use watto::Pod;

use symreader_common::Uuid;

pub(crate) use blob::BlobReader;
pub(crate) use custom_debug_info::CustomDebugInformation;
pub(crate) use documents::DocumentRecord;
pub use imports::Import;
pub(crate) use imports::ImportScopeRecord;
pub use metadata::TableType;
pub(crate) use metadata::Table;
pub(crate) use scopes::{LocalConstantRecord, LocalScopeRecord, LocalVariableRecord};
pub use sequence_points::{SequencePoint, HIDDEN_LINE};
pub(crate) use sequence_points::MethodDebugRecord;

use metadata::MetadataStream;
use streams::{BlobStream, GuidStream, PdbStream, StringStream};

/// The kind of a [`FormatError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FormatErrorKind {
    /// The header of the Portable PDB file could not be read.
    #[error("invalid header")]
    InvalidHeader,
    /// The header of the Portable PDB does not contain the correct signature.
    #[error("invalid signature")]
    InvalidSignature,
    /// The file ends prematurely.
    #[error("invalid length")]
    InvalidLength,
    /// The file does not contain a valid version string.
    #[error("invalid version string")]
    InvalidVersionString,
    /// A stream header could not be read.
    #[error("invalid stream header")]
    InvalidStreamHeader,
    /// A stream's name could not be read.
    #[error("invalid stream name")]
    InvalidStreamName,
    /// String data was requested, but the file does not contain a `#Strings` stream.
    #[error("file does not contain a #Strings stream")]
    NoStringsStream,
    /// The given offset is out of bounds for the string heap.
    #[error("invalid string offset")]
    InvalidStringOffset,
    /// Tried to read invalid string data.
    #[error("invalid string data")]
    InvalidStringData,
    /// An unrecognized stream name was encountered.
    #[error("unknown stream")]
    UnknownStream,
    /// GUID data was requested, but the file does not contain a `#GUID` stream.
    #[error("file does not contain a #Guid stream")]
    NoGuidStream,
    /// The given index is out of bounds for the GUID heap.
    #[error("invalid guid index")]
    InvalidGuidIndex,
    /// The table stream is too small to hold all claimed tables.
    #[error(
        "insufficient table data: {0} bytes required, but table stream only contains {1} bytes"
    )]
    InsufficientTableData(usize, usize),
    /// The table stream marks a table as present whose row layout is not known.
    #[error("unknown table 0x{0:02x}")]
    UnknownTable(usize),
    /// The given offset is out of bounds for the `#Blob` heap.
    #[error("invalid blob offset")]
    InvalidBlobOffset,
    /// The given offset points to invalid blob data.
    #[error("invalid blob data")]
    InvalidBlobData,
    /// Blob data was requested, but the file does not contain a `#Blob` stream.
    #[error("file does not contain a #Blob stream")]
    NoBlobStream,
    /// Tried to read an invalid compressed unsigned number.
    #[error("invalid compressed unsigned number")]
    InvalidCompressedUnsigned,
    /// Tried to read an invalid compressed signed number.
    #[error("invalid compressed signed number")]
    InvalidCompressedSigned,
    /// Could not read a document name.
    #[error("invalid document name")]
    InvalidDocumentName,
    /// Failed to parse a sequence point.
    #[error("invalid sequence point")]
    InvalidSequencePoint,
    /// The local scopes of a method are not properly nested or sorted.
    #[error("invalid local scope")]
    InvalidLocalScope,
    /// Failed to parse the value of a local constant.
    #[error("invalid local constant")]
    InvalidConstant,
    /// Failed to parse a type or local variable signature.
    #[error("invalid signature")]
    InvalidTypeSignature,
    /// Failed to parse the imports of an import scope.
    #[error("invalid import")]
    InvalidImport,
    /// Failed to parse the async stepping information of a method.
    #[error("invalid async method information")]
    InvalidAsyncInfo,
    /// Table data was requested, but the file does not contain a `#~` stream.
    #[error("file does not contain a #~ stream")]
    NoMetadataStream,
    /// The given row index is out of bounds for the table.
    #[error("row index {1} is out of bounds for table {0:?}")]
    RowIndexOutOfBounds(TableType, usize),
    /// The given column index is out of bounds for the table.
    #[error("column index {1} is out of bounds for table {0:?}")]
    ColIndexOutOfBounds(TableType, usize),
    /// The given column in the table has an incompatible width.
    #[error("column {1} in table {0:?} has incompatible width {2}")]
    ColumnWidth(TableType, usize, usize),
    /// Tried to read an custom debug information table item tag.
    #[error("invalid custom debug information table item tag {0}")]
    InvalidCustomDebugInformationTag(u32),
    /// Tried to read contents of a blob in an unknown format.
    #[error("invalid blob format {0}")]
    InvalidBlobFormat(i32),
    /// Failed to parse Source Link JSON
    #[error("invalid source link JSON")]
    InvalidSourceLinkJson,
}

/// An error encountered while parsing a [`PortablePdb`] file.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct FormatError {
    pub(crate) kind: FormatErrorKind,
    #[source]
    pub(crate) source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl FormatError {
    /// Creates a new FormatError error from a known kind of error as well as an
    /// arbitrary error payload.
    pub(crate) fn new<E>(kind: FormatErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let source = Some(source.into());
        Self { kind, source }
    }

    /// Returns the corresponding [`FormatErrorKind`] for this error.
    pub fn kind(&self) -> FormatErrorKind {
        self.kind
    }
}

impl From<FormatErrorKind> for FormatError {
    fn from(kind: FormatErrorKind) -> Self {
        Self { kind, source: None }
    }
}

/// The identity of a Portable PDB file.
///
/// It consists of the GUID and the time stamp stored in the `#Pdb` stream. A compiled binary
/// records the same values in its CodeView debug directory entry, which is how a PDB is matched
/// to the binary it was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PdbId {
    guid: Uuid,
    stamp: u32,
}

impl PdbId {
    /// Creates an id from its GUID and time stamp.
    pub fn new(guid: Uuid, stamp: u32) -> Self {
        Self { guid, stamp }
    }

    /// Reads an id from the 20 raw bytes of the `#Pdb` stream.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        let mut guid = [0; 16];
        guid.copy_from_slice(&bytes[..16]);
        let mut stamp = [0; 4];
        stamp.copy_from_slice(&bytes[16..]);
        Self {
            guid: Uuid::from_bytes_le(guid),
            stamp: u32::from_le_bytes(stamp),
        }
    }

    /// The raw 20 byte representation of this id.
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut bytes = [0; 20];
        bytes[..16].copy_from_slice(&self.guid.to_bytes_le());
        bytes[16..].copy_from_slice(&self.stamp.to_le_bytes());
        bytes
    }

    /// The GUID part of the id.
    pub fn guid(&self) -> Uuid {
        self.guid
    }

    /// The time stamp part of the id.
    pub fn stamp(&self) -> u32 {
        self.stamp
    }
}

impl fmt::Display for PdbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:08x}", self.guid.simple(), self.stamp)
    }
}

/// A parsed Portable PDB file.
///
/// This is a zero-copy view of the file's streams and tables. Use
/// [`DebugInfo::decode`](crate::DebugInfo::decode) to turn it into a queryable model.
#[derive(Clone)]
pub struct PortablePdb<'data> {
    /// First part of the metadata header.
    header: &'data raw::Header,
    /// The version string.
    version_string: &'data str,
    /// Second part of the metadata header.
    header2: &'data raw::HeaderPart2,
    /// The file's #PDB stream, if it exists.
    pdb_stream: Option<PdbStream<'data>>,
    /// The file's #~ stream, if it exists.
    metadata_stream: Option<MetadataStream<'data>>,
    /// The file's #Strings stream, if it exists.
    string_stream: Option<StringStream<'data>>,
    /// The file's #Blob stream, if it exists.
    blob_stream: Option<BlobStream<'data>>,
    /// The file's #GUID stream, if it exists.
    guid_stream: Option<GuidStream<'data>>,
}

impl fmt::Debug for PortablePdb<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortablePdb")
            .field("header", &self.header)
            .field("version_string", &self.version_string)
            .field("header2", &self.header2)
            .field("has_pdb_stream", &self.pdb_stream.is_some())
            .field("has_table_stream", &self.metadata_stream.is_some())
            .field("has_string_stream", &self.string_stream.is_some())
            .field("has_blob_stream", &self.blob_stream.is_some())
            .field("has_guid_stream", &self.guid_stream.is_some())
            .finish()
    }
}

impl<'data> PortablePdb<'data> {
    /// Checks whether the provided buffer could potentially be a Portable PDB file,
    /// without fully parsing it.
    pub fn peek(buf: &[u8]) -> bool {
        buf.get(..4)
            .and_then(|magic| magic.try_into().ok())
            .map_or(false, |magic| {
                u32::from_le_bytes(magic) == raw::METADATA_SIGNATURE
            })
    }

    /// Parses the provided buffer into a Portable PDB file.
    pub fn parse(buf: &'data [u8]) -> Result<Self, FormatError> {
        if buf.len() >= 4 && !Self::peek(buf) {
            return Err(FormatErrorKind::InvalidSignature.into());
        }

        let (header, rest) =
            raw::Header::ref_from_prefix(buf).ok_or(FormatErrorKind::InvalidHeader)?;

        if header.signature != raw::METADATA_SIGNATURE {
            return Err(FormatErrorKind::InvalidSignature.into());
        }

        let version_length = header.version_length as usize;
        let version_buf = rest
            .get(..version_length)
            .ok_or(FormatErrorKind::InvalidLength)?;
        let version_buf = version_buf
            .split(|c| *c == 0)
            .next()
            .ok_or(FormatErrorKind::InvalidVersionString)?;
        let version = std::str::from_utf8(version_buf)
            .map_err(|e| FormatError::new(FormatErrorKind::InvalidVersionString, e))?;

        // We already know that buf is long enough.
        let streams_buf = &rest[version_length..];
        let (header2, mut streams_buf) =
            raw::HeaderPart2::ref_from_prefix(streams_buf).ok_or(FormatErrorKind::InvalidHeader)?;

        let stream_count = header2.streams;

        let mut result = Self {
            header,
            version_string: version,
            header2,
            pdb_stream: None,
            metadata_stream: None,
            string_stream: None,
            blob_stream: None,
            guid_stream: None,
        };

        // The `#~` stream can only be laid out once the row counts of the `#Pdb` stream are known,
        // and the streams may come in any order.
        let mut metadata_buf = None;

        for _ in 0..stream_count {
            let (header, after_header_buf) = raw::StreamHeader::ref_from_prefix(streams_buf)
                .ok_or(FormatErrorKind::InvalidStreamHeader)?;

            let name_buf = after_header_buf.get(..32).unwrap_or(after_header_buf);
            let name_buf = name_buf
                .split(|c| *c == 0)
                .next()
                .ok_or(FormatErrorKind::InvalidStreamName)?;
            let name = std::str::from_utf8(name_buf)
                .map_err(|e| FormatError::new(FormatErrorKind::InvalidStreamName, e))?;

            let mut rounded_name_len = name.len() + 1;
            rounded_name_len = match rounded_name_len % 4 {
                0 => rounded_name_len,
                r => rounded_name_len + (4 - r),
            };
            streams_buf = after_header_buf
                .get(rounded_name_len..)
                .ok_or(FormatErrorKind::InvalidLength)?;

            let offset = header.offset as usize;
            let size = header.size as usize;
            let stream_buf = offset
                .checked_add(size)
                .and_then(|end| buf.get(offset..end))
                .ok_or(FormatErrorKind::InvalidLength)?;

            match name {
                "#Pdb" => result.pdb_stream = Some(PdbStream::parse(stream_buf)?),
                "#~" | "#-" => metadata_buf = Some(stream_buf),
                "#Strings" => result.string_stream = Some(StringStream::new(stream_buf)),
                // User strings are never referenced by debug tables.
                "#US" => {}
                "#Blob" => result.blob_stream = Some(BlobStream::new(stream_buf)),
                "#GUID" => result.guid_stream = Some(GuidStream::parse(stream_buf)?),
                _ => return Err(FormatErrorKind::UnknownStream.into()),
            }
        }

        if let Some(metadata_buf) = metadata_buf {
            let referenced_table_sizes = result
                .pdb_stream
                .as_ref()
                .map_or([0; 64], |s| s.referenced_table_sizes);
            result.metadata_stream = Some(MetadataStream::parse(
                metadata_buf,
                referenced_table_sizes,
            )?);
        }

        Ok(result)
    }

    /// The metadata version string, usually `PDB v1.0`.
    pub fn version_string(&self) -> &'data str {
        self.version_string
    }

    /// Reads the string starting at the given offset from this file's string heap.
    pub(crate) fn get_string(&self, offset: u32) -> Result<&'data str, FormatError> {
        self.string_stream
            .as_ref()
            .ok_or(FormatErrorKind::NoStringsStream)?
            .get_string(offset)
    }

    /// Reads the GUID with the given index from this file's GUID heap.
    ///
    /// Note that the index is 1-based!
    pub(crate) fn get_guid(&self, idx: u32) -> Result<Uuid, FormatError> {
        if idx == 0 {
            return Ok(Uuid::nil());
        }
        self.guid_stream
            .as_ref()
            .ok_or(FormatErrorKind::NoGuidStream)?
            .get_guid(idx)
            .ok_or_else(|| FormatErrorKind::InvalidGuidIndex.into())
    }

    /// Reads the blob starting at the given offset from this file's blob heap.
    pub(crate) fn get_blob(&self, offset: u32) -> Result<&'data [u8], FormatError> {
        if offset == 0 {
            return Ok(&[]);
        }
        self.blob_stream
            .as_ref()
            .ok_or(FormatErrorKind::NoBlobStream)?
            .get_blob(offset)
    }

    /// Reads this file's PDB ID from its #PDB stream.
    pub fn pdb_id(&self) -> Option<PdbId> {
        self.pdb_stream
            .as_ref()
            .map(|stream| PdbId::from_bytes(stream.id()))
    }

    /// The token of the user entry point method, if the file declares one.
    pub fn entry_point(&self) -> Option<u32> {
        self.pdb_stream
            .as_ref()
            .map(|stream| stream.entry_point())
            .filter(|token| *token != 0)
    }

    /// Returns the given table of this file's `#~` stream.
    pub(crate) fn get_table(&self, table: TableType) -> Result<Table<'data>, FormatError> {
        let md_stream = self
            .metadata_stream
            .as_ref()
            .ok_or(FormatErrorKind::NoMetadataStream)?;
        Ok(md_stream[table])
    }

    /// Returns the number of rows in the given table.
    ///
    /// A file without a `#~` stream has no rows in any table.
    pub fn row_count(&self, table: TableType) -> usize {
        self.metadata_stream
            .as_ref()
            .map_or(0, |md_stream| md_stream[table].rows)
    }

    /// The number of `MethodDef` rows of the compiled binary this file refers to.
    pub(crate) fn method_def_count(&self) -> usize {
        let referenced = self
            .pdb_stream
            .as_ref()
            .map_or(0, |s| s.referenced_table_sizes[TableType::MethodDef as usize] as usize);
        std::cmp::max(referenced, self.row_count(TableType::MethodDebugInformation))
    }

    /// Returns true if this portable pdb file contains method debug information.
    pub fn has_debug_info(&self) -> bool {
        self.row_count(TableType::MethodDebugInformation) > 0
    }
}
