use uuid::Uuid;
use watto::Pod;

use super::blob::{decode_unsigned, read_u32};
use super::raw::PdbStreamHeader;
use super::{FormatError, FormatErrorKind};

/// A stream representing the "blob heap", which contains "blobs" of arbitrary binary data.
///
/// See https://github.com/stakx/ecma-335/blob/master/docs/ii.24.2.4-us-and-blob-heaps.md.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlobStream<'data> {
    buf: &'data [u8],
}

impl<'data> BlobStream<'data> {
    pub(crate) fn new(buf: &'data [u8]) -> Self {
        Self { buf }
    }

    /// Gets the blob starting at the specified offset out of the blob heap.
    ///
    /// Offset 0 always denotes the empty blob.
    pub(crate) fn get_blob(&self, offset: u32) -> Result<&'data [u8], FormatError> {
        if offset == 0 {
            return Ok(&[]);
        }
        let offset = offset as usize;
        let (len, rest) = decode_unsigned(
            self.buf
                .get(offset..)
                .ok_or(FormatErrorKind::InvalidBlobOffset)?,
        )?;

        rest.get(..len as usize)
            .ok_or_else(|| FormatErrorKind::InvalidBlobData.into())
    }
}

/// The file's #PDB stream.
///
/// See https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md#pdb-stream.
#[derive(Debug, Clone)]
pub(crate) struct PdbStream<'data> {
    header: &'data PdbStreamHeader,
    pub(crate) referenced_table_sizes: [u32; 64],
}

impl<'data> PdbStream<'data> {
    pub(crate) fn parse(buf: &'data [u8]) -> Result<Self, FormatError> {
        let (header, mut rest) =
            PdbStreamHeader::ref_from_prefix(buf).ok_or(FormatErrorKind::InvalidHeader)?;

        let referenced_tables = header.referenced_tables;
        let mut referenced_table_sizes = [0; 64];
        for (i, table) in referenced_table_sizes.iter_mut().enumerate() {
            if (referenced_tables >> i & 1) == 0 {
                continue;
            }

            let (len, rest_) = read_u32(rest).ok_or(FormatErrorKind::InvalidLength)?;
            rest = rest_;

            *table = len;
        }
        Ok(Self {
            header,
            referenced_table_sizes,
        })
    }

    pub(crate) fn id(&self) -> [u8; 20] {
        self.header.id
    }

    pub(crate) fn entry_point(&self) -> u32 {
        self.header.entry_point
    }
}

/// A stream representing the "string heap", which contains UTF-8 string data.
///
/// See https://github.com/stakx/ecma-335/blob/master/docs/ii.24.2.3-strings-heap.md.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StringStream<'data> {
    buf: &'data [u8],
}

impl<'data> StringStream<'data> {
    pub(crate) fn new(buf: &'data [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn get_string(&self, offset: u32) -> Result<&'data str, FormatError> {
        let string_buf = self
            .buf
            .get(offset as usize..)
            .ok_or(FormatErrorKind::InvalidStringOffset)?;
        let string = string_buf.split(|c| *c == 0).next().unwrap_or_default();
        std::str::from_utf8(string)
            .map_err(|e| FormatError::new(FormatErrorKind::InvalidStringData, e))
    }
}

/// A stream representing the "GUID heap", which contains GUIDs.
///
/// See https://github.com/stakx/ecma-335/blob/master/docs/ii.24.2.5-guid-heap.md.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GuidStream<'data> {
    buf: &'data [u8],
}

impl<'data> GuidStream<'data> {
    pub(crate) fn parse(buf: &'data [u8]) -> Result<Self, FormatError> {
        if buf.len() % 16 != 0 {
            return Err(FormatErrorKind::InvalidLength.into());
        }
        Ok(Self { buf })
    }

    /// Returns the GUID at the 1-based index `idx`.
    ///
    /// Index 0 denotes the nil GUID.
    pub(crate) fn get_guid(&self, idx: u32) -> Option<Uuid> {
        if idx == 0 {
            return Some(Uuid::nil());
        }
        let start = (idx as usize - 1) * 16;
        let bytes: [u8; 16] = self.buf.get(start..start + 16)?.try_into().ok()?;
        Some(Uuid::from_bytes_le(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_heap() {
        let heap = BlobStream::new(&[0x00, 0x03, b'a', b'b', b'c', 0x05, 1]);
        assert_eq!(heap.get_blob(0).unwrap(), b"");
        assert_eq!(heap.get_blob(1).unwrap(), b"abc");
        assert_eq!(
            heap.get_blob(5).unwrap_err().kind(),
            FormatErrorKind::InvalidBlobData
        );
        assert_eq!(
            heap.get_blob(42).unwrap_err().kind(),
            FormatErrorKind::InvalidBlobOffset
        );
    }

    #[test]
    fn test_string_heap() {
        let heap = StringStream::new(b"\0Main\0x\0");
        assert_eq!(heap.get_string(0).unwrap(), "");
        assert_eq!(heap.get_string(1).unwrap(), "Main");
        assert_eq!(heap.get_string(6).unwrap(), "x");
    }

    #[test]
    fn test_guid_heap() {
        let guid = uuid::uuid!("3f5162f8-07c6-11d3-9053-00c04fa302a1");
        let heap_bytes = guid.to_bytes_le();
        let heap = GuidStream::parse(&heap_bytes).unwrap();
        assert_eq!(heap.get_guid(0), Some(Uuid::nil()));
        assert_eq!(heap.get_guid(1), Some(guid));
        assert_eq!(heap.get_guid(2), None);

        assert!(GuidStream::parse(&heap_bytes[..15]).is_err());
    }
}
