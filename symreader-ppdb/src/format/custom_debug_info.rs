use symreader_common::Uuid;

use super::metadata::{decode_has_custom_debug_information, TableType};
use super::{FormatError, PortablePdb};

/// Custom debug information kind of async state machine stepping information.
pub(crate) const ASYNC_METHOD_STEPPING_INFORMATION: Uuid =
    uuid::uuid!("54FD2AC5-E925-401A-9C2A-F94F171072F8");
/// Custom debug information kind of source files embedded into the PDB.
pub(crate) const EMBEDDED_SOURCE: Uuid = uuid::uuid!("0E8A571B-6926-466E-B4AD-8AB04611F5FE");
/// Custom debug information kind of Source Link JSON documents.
pub(crate) const SOURCE_LINK: Uuid = uuid::uuid!("CC110556-A091-4D38-9FEC-25AB9A351A6A");

/// A row of the `CustomDebugInformation` table.
///
/// See https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md#customdebuginformation-table-0x37.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CustomDebugInformation<'data> {
    /// The table of the row this information is attached to.
    pub(crate) parent_table: TableType,
    /// The 1-based row this information is attached to.
    pub(crate) parent_row: u32,
    pub(crate) kind: Uuid,
    pub(crate) value: &'data [u8],
}

impl<'data> PortablePdb<'data> {
    /// Decodes the custom debug information with the given 1-based row.
    fn get_custom_debug_information(
        &self,
        idx: usize,
    ) -> Result<CustomDebugInformation<'data>, FormatError> {
        let row = self
            .get_table(TableType::CustomDebugInformation)?
            .get_row(idx)?;
        let (parent_table, parent_row) = decode_has_custom_debug_information(row.get_col_u32(1)?)?;
        Ok(CustomDebugInformation {
            parent_table,
            parent_row,
            kind: self.get_guid(row.get_col_u32(2)?)?,
            value: self.get_blob(row.get_col_u32(3)?)?,
        })
    }

    /// An iterator over all custom debug information records of this file.
    pub(crate) fn custom_debug_information(
        &self,
    ) -> impl Iterator<Item = Result<CustomDebugInformation<'data>, FormatError>> + '_ {
        let rows = self.row_count(TableType::CustomDebugInformation);
        (1..=rows).map(move |idx| self.get_custom_debug_information(idx))
    }
}
