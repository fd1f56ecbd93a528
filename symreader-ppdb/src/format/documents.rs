use symreader_common::Uuid;

use super::blob::decode_unsigned;
use super::metadata::TableType;
use super::{FormatError, FormatErrorKind, PortablePdb};

/// A row of the `Document` table.
#[derive(Debug, Clone)]
pub(crate) struct DocumentRecord<'data> {
    pub(crate) name: String,
    pub(crate) hash_algorithm: Uuid,
    pub(crate) hash: &'data [u8],
    pub(crate) language: Uuid,
}

impl<'data> PortablePdb<'data> {
    /// Decodes a document name blob.
    ///
    /// See https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md#document-name-blob.
    fn get_document_name(&self, offset: u32) -> Result<String, FormatError> {
        let go = || {
            let data = self.get_blob(offset)?;
            let (sep, mut data) = data.split_first().ok_or(FormatErrorKind::InvalidBlobOffset)?;
            let sep = if *sep == 0 {
                ""
            } else {
                std::str::from_utf8(std::slice::from_ref(sep))
                    .map_err(|e| FormatError::new(FormatErrorKind::InvalidStringData, e))?
            };

            let mut segments = Vec::new();

            while !data.is_empty() {
                let (idx, rest) = decode_unsigned(data)?;

                let seg = if idx == 0 {
                    ""
                } else {
                    let seg = self.get_blob(idx)?;
                    std::str::from_utf8(seg)
                        .map_err(|e| FormatError::new(FormatErrorKind::InvalidStringData, e))?
                };

                data = rest;

                segments.push(seg);
            }

            Ok(segments.join(sep))
        };

        go().map_err(|e: FormatError| FormatError::new(FormatErrorKind::InvalidDocumentName, e))
    }

    /// Decodes the document with the given 1-based row.
    pub(crate) fn get_document(&self, idx: usize) -> Result<DocumentRecord<'data>, FormatError> {
        let row = self.get_table(TableType::Document)?.get_row(idx)?;

        let name = self.get_document_name(row.get_col_u32(1)?)?;
        let hash_algorithm = self.get_guid(row.get_col_u32(2)?)?;
        let hash = self.get_blob(row.get_col_u32(3)?)?;
        let language = self.get_guid(row.get_col_u32(4)?)?;

        Ok(DocumentRecord {
            name,
            hash_algorithm,
            hash,
            language,
        })
    }
}
