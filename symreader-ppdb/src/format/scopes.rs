use std::ops::Range;

use super::metadata::TableType;
use super::{FormatError, PortablePdb};

/// A row of the `LocalScope` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalScopeRecord {
    /// The `MethodDef` row of the method owning the scope.
    pub(crate) method: u32,
    /// The `ImportScope` row, or 0.
    pub(crate) import_scope: u32,
    /// The 1-based `LocalVariable` rows of this scope.
    pub(crate) variables: Range<usize>,
    /// The 1-based `LocalConstant` rows of this scope.
    pub(crate) constants: Range<usize>,
    pub(crate) start_offset: u32,
    pub(crate) length: u32,
}

/// A row of the `LocalVariable` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LocalVariableRecord<'data> {
    pub(crate) attributes: u16,
    pub(crate) index: u16,
    pub(crate) name: &'data str,
}

/// A row of the `LocalConstant` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LocalConstantRecord<'data> {
    pub(crate) name: &'data str,
    pub(crate) signature: &'data [u8],
}

impl<'data> PortablePdb<'data> {
    /// Decodes the local scope with the given 1-based row.
    ///
    /// The variable and constant lists of a scope run up to the lists of the next scope, or to
    /// the end of their tables for the last scope.
    pub(crate) fn get_local_scope(&self, idx: usize) -> Result<LocalScopeRecord, FormatError> {
        let table = self.get_table(TableType::LocalScope)?;
        let row = table.get_row(idx)?;

        let variable_count = self.row_count(TableType::LocalVariable);
        let constant_count = self.row_count(TableType::LocalConstant);

        let (variables_end, constants_end) = if idx < table.rows {
            let next = table.get_row(idx + 1)?;
            (
                next.get_col_u32(3)? as usize,
                next.get_col_u32(4)? as usize,
            )
        } else {
            (variable_count + 1, constant_count + 1)
        };

        let list = |start: u32, end: usize, count: usize| {
            let start = (start as usize).max(1);
            // An empty list is encoded by pointing past the table, or at the next list.
            let end = end.min(count + 1);
            start..end.max(start)
        };

        Ok(LocalScopeRecord {
            method: row.get_col_u32(1)?,
            import_scope: row.get_col_u32(2)?,
            variables: list(row.get_col_u32(3)?, variables_end, variable_count),
            constants: list(row.get_col_u32(4)?, constants_end, constant_count),
            start_offset: row.get_col_u32(5)?,
            length: row.get_col_u32(6)?,
        })
    }

    /// Decodes the local variable with the given 1-based row.
    pub(crate) fn get_local_variable(
        &self,
        idx: usize,
    ) -> Result<LocalVariableRecord<'data>, FormatError> {
        let row = self.get_table(TableType::LocalVariable)?.get_row(idx)?;
        Ok(LocalVariableRecord {
            attributes: row.get_col_u32(1)? as u16,
            index: row.get_col_u32(2)? as u16,
            name: self.get_string(row.get_col_u32(3)?)?,
        })
    }

    /// Decodes the local constant with the given 1-based row.
    pub(crate) fn get_local_constant(
        &self,
        idx: usize,
    ) -> Result<LocalConstantRecord<'data>, FormatError> {
        let row = self.get_table(TableType::LocalConstant)?.get_row(idx)?;
        Ok(LocalConstantRecord {
            name: self.get_string(row.get_col_u32(1)?)?,
            signature: self.get_blob(row.get_col_u32(2)?)?,
        })
    }
}
