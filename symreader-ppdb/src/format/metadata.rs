use std::fmt;
use std::ops::{Index, IndexMut};

use watto::Pod;

use super::blob::read_u32;
use super::raw::MetadataStreamHeader;
use super::{FormatError, FormatErrorKind};

/// An enumeration of all table types in ECMA-335 and Portable PDB.
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableType {
    Assembly = 0x20,
    AssemblyOs = 0x22,
    AssemblyProcessor = 0x21,
    AssemblyRef = 0x23,
    AssemblyRefOs = 0x25,
    AssemblyRefProcessor = 0x24,
    ClassLayout = 0x0F,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    DeclSecurity = 0x0E,
    EncLog = 0x1E,
    EncMap = 0x1F,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    ExportedType = 0x27,
    Field = 0x04,
    FieldLayout = 0x10,
    FieldMarshal = 0x0D,
    FieldPtr = 0x03,
    FieldRVA = 0x1D,
    File = 0x26,
    GenericParam = 0x2A,
    GenericParamConstraint = 0x2C,
    ImplMap = 0x1C,
    InterfaceImpl = 0x09,
    ManifestResource = 0x28,
    MemberRef = 0x0A,
    MethodDef = 0x06,
    MethodImpl = 0x19,
    MethodPtr = 0x05,
    MethodSemantics = 0x18,
    MethodSpec = 0x2B,
    Module = 0x00,
    ModuleRef = 0x1A,
    NestedClass = 0x29,
    Param = 0x08,
    ParamPtr = 0x07,
    Property = 0x17,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    StandAloneSig = 0x11,
    TypeDef = 0x02,
    TypeRef = 0x01,
    TypeSpec = 0x1B,
    // portable pdb extension starts here
    CustomDebugInformation = 0x37,
    Document = 0x30,
    ImportScope = 0x35,
    LocalConstant = 0x34,
    LocalScope = 0x32,
    LocalVariable = 0x33,
    MethodDebugInformation = 0x31,
    StateMachineMethod = 0x36,
    DummyEmpty = 0x3F,
}

/// The tables a `HasCustomDebugInformation` coded index can point into, in tag order.
pub(crate) const HAS_CUSTOM_DEBUG_INFORMATION: [TableType; 27] = {
    use TableType::*;
    [
        MethodDef,
        Field,
        TypeRef,
        TypeDef,
        Param,
        InterfaceImpl,
        MemberRef,
        Module,
        DeclSecurity,
        Property,
        Event,
        StandAloneSig,
        ModuleRef,
        TypeSpec,
        Assembly,
        AssemblyRef,
        File,
        ExportedType,
        ManifestResource,
        GenericParam,
        GenericParamConstraint,
        MethodSpec,
        Document,
        LocalScope,
        LocalVariable,
        LocalConstant,
        ImportScope,
    ]
};

/// Splits a `HasCustomDebugInformation` coded index into its target table and 1-based row.
pub(crate) fn decode_has_custom_debug_information(
    value: u32,
) -> Result<(TableType, u32), FormatError> {
    let tag = value & 0b1_1111;
    let table = HAS_CUSTOM_DEBUG_INFORMATION
        .get(tag as usize)
        .copied()
        .ok_or(FormatErrorKind::InvalidCustomDebugInformationTag(tag))?;
    Ok((table, value >> 5))
}

/// A table in a Portable PDB file.
#[derive(Clone, Copy)]
pub struct Table<'data> {
    /// The type of the table.
    pub type_: TableType,
    /// The number of rows in the table.
    pub rows: usize,
    /// The width in bytes of one table row.
    width: usize,
    columns: [Column; 6],
    /// The bytes covered by the table.
    ///
    /// The length of `contents` should be equal to `rows * width`.
    contents: &'data [u8],
}

impl<'data> fmt::Debug for Table<'data> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<usize> = self
            .columns
            .iter()
            .map(|c| c.width)
            .take_while(|w| *w > 0)
            .collect();
        f.debug_struct("Table")
            .field("type_", &self.type_)
            .field("schema", &cols)
            .field("rows", &self.rows)
            .finish()
    }
}

impl<'data> Table<'data> {
    fn new(type_: TableType) -> Self {
        Self {
            type_,
            rows: 0,
            width: 0,
            columns: [Column::default(); 6],
            contents: &[],
        }
    }

    /// Sets the tables column widths to the specified values.
    ///
    /// Also sets [`width`](Table::width) to the sum of the provided column widths.
    fn set_columns(&mut self, widths: &[usize]) {
        let mut offset = 0;
        for (column, &width) in self.columns.iter_mut().zip(widths) {
            column.offset = offset;
            column.width = width;
            offset += width;
        }
        self.width = offset;
    }

    /// Whether a row layout is known for this table.
    fn has_schema(&self) -> bool {
        self.width > 0
    }

    /// Sets this table's contents to the first `rows * width` bytes of the provided slice.
    ///
    /// The caller has verified that `buf` is long enough.
    fn set_contents(&mut self, buf: &mut &'data [u8]) {
        if self.rows > 0 {
            let (contents, rest) = buf.split_at(self.rows * self.width);
            self.contents = contents;
            *buf = rest
        }
    }

    /// Returns the the `idx`th row.
    ///
    /// Note that table row indices are 1-based!
    pub(crate) fn get_row(&self, idx: usize) -> Result<Row<'data>, FormatError> {
        idx.checked_sub(1)
            .and_then(|idx| self.contents.get(idx * self.width..(idx + 1) * self.width))
            .map(|data| Row {
                data,
                table: *self,
            })
            .ok_or_else(|| FormatErrorKind::RowIndexOutOfBounds(self.type_, idx).into())
    }
}

/// A row in a [`Table`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Row<'data> {
    data: &'data [u8],
    table: Table<'data>,
}

impl<'data> Row<'data> {
    /// Reads the `col` cell in this row as a `u32`.
    ///
    /// This returns an error if the index is out of bounds for the table
    /// or the cell is too wide for a `u32`.
    ///
    /// Note that column indices are 1-based!
    pub(crate) fn get_col_u32(&self, col: usize) -> Result<u32, FormatError> {
        if !(1..=6).contains(&col) {
            return Err(FormatErrorKind::ColIndexOutOfBounds(self.table.type_, col).into());
        }
        let Column { offset, width } = self.table.columns[col - 1];
        let bytes = self
            .data
            .get(offset..offset + width)
            .ok_or(FormatErrorKind::ColIndexOutOfBounds(self.table.type_, col))?;
        match *bytes {
            [b0] => Ok(b0 as u32),
            [b0, b1] => Ok(u16::from_le_bytes([b0, b1]) as u32),
            [b0, b1, b2, b3] => Ok(u32::from_le_bytes([b0, b1, b2, b3])),
            _ => Err(FormatErrorKind::ColumnWidth(self.table.type_, col, width).into()),
        }
    }
}

/// A column in a [Table].
#[derive(Debug, Default, Clone, Copy)]
struct Column {
    /// The number of bytes from the start of the row to the start of the column.
    offset: usize,
    /// The width of the column in bytes.
    width: usize,
}

/// A collection of the sizes of various indices needed for the calculation of table sizes.
///
/// There are three types of indices recorded here:
/// * Heap indices (`string_heap`, `guid_heap`, `blob_heap`) are indices into other sections
///   of the Portable PDB file. Their sizes are determined by the `heap_sizes` bitvector in the #~ stream
///   header, see https://github.com/stakx/ecma-335/blob/master/docs/ii.24.2.6-metadata-stream.md.
/// * Table indices (`<something>_table`) are indices into individual tables in this stream. Their sizes
///   are determined by the number of rows in the target table.
/// * Composite indices are indices that may point into one of several tables in this stream. Their sizes are
///   determined both by the number of target tables and the maximum number of rows among them.
#[derive(Debug, Clone)]
struct IndexSizes {
    /// Indices into blobs
    string_heap: usize,
    guid_heap: usize,
    blob_heap: usize,

    /// ECMA-335 table indices
    assembly_ref_table: usize,
    event_table: usize,
    field_table: usize,
    generic_param_table: usize,
    method_def_table: usize,
    module_ref_table: usize,
    param_table: usize,
    property_table: usize,
    type_def_table: usize,

    /// Portable PDB table indices
    document_table: usize,
    import_scope_table: usize,
    local_constant_table: usize,
    local_variable_table: usize,

    /// ECMA-335 composite indices
    type_def_or_ref: usize,
    has_constant: usize,
    has_custom_attribute: usize,
    has_field_marshal: usize,
    has_decl_security: usize,
    member_ref_parent: usize,
    has_semantics: usize,
    method_def_or_ref: usize,
    member_forwarded: usize,
    implementation: usize,
    custom_attribute_type: usize,
    resolution_scope: usize,
    type_or_method_def: usize,

    /// Portable PDB composite indices
    has_custom_debug_information: usize,
}

/// A stream representing the "metadata heap", which comprises a number of metadata tables.
///
/// See https://github.com/stakx/ecma-335/blob/master/docs/ii.24.2.6-metadata-stream.md for a definition
/// of the stream's format. Note that this stream contains all tables described in the ECMA-335 specification and
/// the Portable PDB specification.
#[derive(Debug, Clone)]
pub struct MetadataStream<'data> {
    header: &'data MetadataStreamHeader,
    tables: [Table<'data>; 64],
}

impl<'data> MetadataStream<'data> {
    pub fn parse(buf: &'data [u8], referenced_table_sizes: [u32; 64]) -> Result<Self, FormatError> {
        let (header, mut rest) =
            MetadataStreamHeader::ref_from_prefix(buf).ok_or(FormatErrorKind::InvalidHeader)?;

        let mut tables: [Table<'data>; 64] =
            std::array::from_fn(|_| Table::new(TableType::DummyEmpty));
        for (i, table) in tables.iter_mut().enumerate() {
            if let Some(type_) = TableType::from_index(i) {
                table.type_ = type_;
            }

            if (header.valid_tables >> i & 1) == 0 {
                continue;
            }

            let (len, rest_) = read_u32(rest).ok_or(FormatErrorKind::InvalidLength)?;
            rest = rest_;

            table.rows = len as usize;
        }

        let table_contents = rest;
        let mut result = Self { header, tables };

        result.set_columns(&referenced_table_sizes);

        let valid_tables = header.valid_tables;
        for (i, table) in result.tables.iter().enumerate() {
            if (valid_tables >> i & 1) != 0 && !table.has_schema() {
                return Err(FormatErrorKind::UnknownTable(i).into());
            }
        }

        let total_length: usize = result
            .tables
            .iter()
            .map(|table| table.width * table.rows)
            .sum();
        if total_length > table_contents.len() {
            return Err(
                FormatErrorKind::InsufficientTableData(total_length, table_contents.len()).into(),
            );
        }

        result.set_contents(table_contents);

        Ok(result)
    }

    /// Sets the column widths of all tables in this stream.
    fn set_columns(&mut self, referenced_table_sizes: &[u32; 64]) {
        use TableType::*;

        let s = self.index_sizes(referenced_table_sizes);

        self[Assembly].set_columns(&[4, 8, 4, s.blob_heap, s.string_heap, s.string_heap]);
        self[AssemblyOs].set_columns(&[4, 4, 4]);
        self[AssemblyProcessor].set_columns(&[4]);
        self[AssemblyRef].set_columns(&[
            8,
            4,
            s.blob_heap,
            s.string_heap,
            s.string_heap,
            s.blob_heap,
        ]);
        self[AssemblyRefOs].set_columns(&[4, 4, 4, s.assembly_ref_table]);
        self[AssemblyRefProcessor].set_columns(&[4, s.assembly_ref_table]);
        self[ClassLayout].set_columns(&[2, 4, s.type_def_table]);
        self[Constant].set_columns(&[2, s.has_constant, s.blob_heap]);
        self[CustomAttribute].set_columns(&[
            s.has_custom_attribute,
            s.custom_attribute_type,
            s.blob_heap,
        ]);
        self[DeclSecurity].set_columns(&[2, s.has_decl_security, s.blob_heap]);
        self[EncLog].set_columns(&[4, 4]);
        self[EncMap].set_columns(&[4]);
        self[EventMap].set_columns(&[s.type_def_table, s.event_table]);
        self[EventPtr].set_columns(&[s.event_table]);
        self[Event].set_columns(&[2, s.string_heap, s.type_def_or_ref]);
        self[ExportedType].set_columns(&[4, 4, s.string_heap, s.string_heap, s.implementation]);
        self[Field].set_columns(&[2, s.string_heap, s.blob_heap]);
        self[FieldLayout].set_columns(&[4, s.field_table]);
        self[FieldMarshal].set_columns(&[s.has_field_marshal, s.blob_heap]);
        self[FieldPtr].set_columns(&[s.field_table]);
        self[FieldRVA].set_columns(&[4, s.field_table]);
        self[File].set_columns(&[4, s.string_heap, s.blob_heap]);
        self[GenericParam].set_columns(&[2, 2, s.type_or_method_def, s.string_heap]);
        self[GenericParamConstraint].set_columns(&[s.generic_param_table, s.type_def_or_ref]);
        self[ImplMap].set_columns(&[2, s.member_forwarded, s.string_heap, s.module_ref_table]);
        self[InterfaceImpl].set_columns(&[s.type_def_table, s.type_def_or_ref]);
        self[ManifestResource].set_columns(&[4, 4, s.string_heap, s.implementation]);
        self[MemberRef].set_columns(&[s.member_ref_parent, s.string_heap, s.blob_heap]);
        self[MethodDef].set_columns(&[4, 2, 2, s.string_heap, s.blob_heap, s.param_table]);
        self[MethodImpl].set_columns(&[s.type_def_table, s.method_def_or_ref, s.method_def_or_ref]);
        self[MethodPtr].set_columns(&[s.method_def_table]);
        self[MethodSemantics].set_columns(&[2, s.method_def_table, s.has_semantics]);
        self[MethodSpec].set_columns(&[s.method_def_or_ref, s.blob_heap]);
        self[Module].set_columns(&[2, s.string_heap, s.guid_heap, s.guid_heap, s.guid_heap]);
        self[ModuleRef].set_columns(&[s.string_heap]);
        self[NestedClass].set_columns(&[s.type_def_table, s.type_def_table]);
        self[Param].set_columns(&[2, 2, s.string_heap]);
        self[ParamPtr].set_columns(&[s.param_table]);
        self[Property].set_columns(&[2, s.string_heap, s.blob_heap]);
        self[PropertyMap].set_columns(&[s.type_def_table, s.property_table]);
        self[PropertyPtr].set_columns(&[s.property_table]);
        self[StandAloneSig].set_columns(&[s.blob_heap]);
        self[TypeDef].set_columns(&[
            4,
            s.string_heap,
            s.string_heap,
            s.type_def_or_ref,
            s.field_table,
            s.method_def_table,
        ]);
        self[TypeRef].set_columns(&[s.resolution_scope, s.string_heap, s.string_heap]);
        self[TypeSpec].set_columns(&[s.blob_heap]);
        self[CustomDebugInformation].set_columns(&[
            s.has_custom_debug_information,
            s.guid_heap,
            s.blob_heap,
        ]);
        self[Document].set_columns(&[s.blob_heap, s.guid_heap, s.blob_heap, s.guid_heap]);
        self[ImportScope].set_columns(&[s.import_scope_table, s.blob_heap]);
        self[LocalConstant].set_columns(&[s.string_heap, s.blob_heap]);
        self[LocalScope].set_columns(&[
            s.method_def_table,
            s.import_scope_table,
            s.local_variable_table,
            s.local_constant_table,
            4,
            4,
        ]);
        self[LocalVariable].set_columns(&[2, 2, s.string_heap]);
        self[MethodDebugInformation].set_columns(&[s.document_table, s.blob_heap]);
        self[StateMachineMethod].set_columns(&[s.method_def_table, s.method_def_table]);
    }

    /// Sets the contents of all tables in this stream.
    fn set_contents(&mut self, mut table_contents: &'data [u8]) {
        for table in self.tables.iter_mut() {
            table.set_contents(&mut table_contents);
        }
    }

    /// Returns the size in bytes of an index into the heap selected by `flag`.
    ///
    /// The `heap_sizes` bits are 0x1 for `#Strings`, 0x2 for `#GUID` and 0x4 for `#Blob`.
    /// See https://github.com/stakx/ecma-335/blob/master/docs/ii.24.2.6-metadata-stream.md for an explanation.
    fn heap_index_size(&self, flag: u8) -> usize {
        if self.header.heap_sizes & flag == 0 {
            2
        } else {
            4
        }
    }

    fn table_size(&self, table: TableType, referenced_table_sizes: &[u32; 64]) -> usize {
        std::cmp::max(
            self[table].rows,
            referenced_table_sizes[table as usize] as usize,
        )
    }

    /// Returns the size in bytes of an index into this stream's `table` table, based on the table's
    /// number of rows.
    fn table_index_size(&self, table: TableType, referenced_table_sizes: &[u32; 64]) -> usize {
        if self.table_size(table, referenced_table_sizes) < 1 << 16 {
            2
        } else {
            4
        }
    }

    /// Returns the size in bytes of an index into any of the tables in `tables`.
    ///
    /// This depends on the number of tables (because some part of the index needs to be used
    /// as a tag) and the  maximum number of rows among them.
    fn composite_index_size(
        &self,
        tables: &[TableType],
        referenced_table_sizes: &[u32; 64],
    ) -> usize {
        /// Checks if `row_count` is less than 2^(16 - bits).
        fn is_small(row_count: usize, bits: u8) -> bool {
            (row_count as u64) < (1u64 << (16 - bits))
        }

        /// Calculates the number of bits necessary to distinguish between `num_tables` different tables.
        ///
        /// This number is equal to ceil(log₂(num_tables)).
        fn tag_bits(num_tables: usize) -> u8 {
            let mut num_tables = num_tables - 1;
            let mut bits: u8 = 1;
            loop {
                num_tables >>= 1;
                if num_tables == 0 {
                    break;
                }
                bits += 1;
            }
            bits
        }

        let bits_needed = tag_bits(tables.len());
        if tables
            .iter()
            .map(|table| self.table_size(*table, referenced_table_sizes))
            .all(|row_count| is_small(row_count, bits_needed))
        {
            2
        } else {
            4
        }
    }

    /// Returns a record of  `IndexSizes` for this stream.
    fn index_sizes(&self, referenced_table_sizes: &[u32; 64]) -> IndexSizes {
        use TableType::*;
        let table = |t| self.table_index_size(t, referenced_table_sizes);
        let coded = |ts: &[TableType]| self.composite_index_size(ts, referenced_table_sizes);
        IndexSizes {
            string_heap: self.heap_index_size(0x1),
            guid_heap: self.heap_index_size(0x2),
            blob_heap: self.heap_index_size(0x4),
            assembly_ref_table: table(AssemblyRef),
            event_table: table(Event),
            field_table: table(Field),
            generic_param_table: table(GenericParam),
            method_def_table: table(MethodDef),
            module_ref_table: table(ModuleRef),
            param_table: table(Param),
            property_table: table(Property),
            type_def_table: table(TypeDef),
            document_table: table(Document),
            import_scope_table: table(ImportScope),
            local_constant_table: table(LocalConstant),
            local_variable_table: table(LocalVariable),
            type_def_or_ref: coded(&[TypeDef, TypeRef, TypeSpec]),
            has_constant: coded(&[Field, Param, Property]),
            has_custom_attribute: coded(&[
                MethodDef,
                Field,
                TypeRef,
                TypeDef,
                Param,
                InterfaceImpl,
                MemberRef,
                Module,
                DeclSecurity,
                Property,
                Event,
                StandAloneSig,
                ModuleRef,
                TypeSpec,
                Assembly,
                AssemblyRef,
                File,
                ExportedType,
                ManifestResource,
                GenericParam,
                GenericParamConstraint,
                MethodSpec,
            ]),
            has_field_marshal: coded(&[Field, Param]),
            has_decl_security: coded(&[TypeDef, MethodDef, Assembly]),
            member_ref_parent: coded(&[TypeDef, TypeRef, ModuleRef, MethodDef, TypeSpec]),
            has_semantics: coded(&[Event, Property]),
            method_def_or_ref: coded(&[MethodDef, MemberRef]),
            member_forwarded: coded(&[Field, MethodDef]),
            implementation: coded(&[File, AssemblyRef, ExportedType]),
            custom_attribute_type: coded(&[
                DummyEmpty, DummyEmpty, MethodDef, MemberRef, DummyEmpty,
            ]),
            resolution_scope: coded(&[Module, ModuleRef, AssemblyRef, TypeRef]),
            type_or_method_def: coded(&[TypeDef, MethodDef]),
            has_custom_debug_information: coded(&HAS_CUSTOM_DEBUG_INFORMATION),
        }
    }
}

impl TableType {
    /// Returns the table type with the given table number, if it is a known table.
    pub fn from_index(idx: usize) -> Option<Self> {
        use TableType::*;
        Some(match idx {
            0x00 => Module,
            0x01 => TypeRef,
            0x02 => TypeDef,
            0x03 => FieldPtr,
            0x04 => Field,
            0x05 => MethodPtr,
            0x06 => MethodDef,
            0x07 => ParamPtr,
            0x08 => Param,
            0x09 => InterfaceImpl,
            0x0A => MemberRef,
            0x0B => Constant,
            0x0C => CustomAttribute,
            0x0D => FieldMarshal,
            0x0E => DeclSecurity,
            0x0F => ClassLayout,
            0x10 => FieldLayout,
            0x11 => StandAloneSig,
            0x12 => EventMap,
            0x13 => EventPtr,
            0x14 => Event,
            0x15 => PropertyMap,
            0x16 => PropertyPtr,
            0x17 => Property,
            0x18 => MethodSemantics,
            0x19 => MethodImpl,
            0x1A => ModuleRef,
            0x1B => TypeSpec,
            0x1C => ImplMap,
            0x1D => FieldRVA,
            0x1E => EncLog,
            0x1F => EncMap,
            0x20 => Assembly,
            0x21 => AssemblyProcessor,
            0x22 => AssemblyOs,
            0x23 => AssemblyRef,
            0x24 => AssemblyRefProcessor,
            0x25 => AssemblyRefOs,
            0x26 => File,
            0x27 => ExportedType,
            0x28 => ManifestResource,
            0x29 => NestedClass,
            0x2A => GenericParam,
            0x2B => MethodSpec,
            0x2C => GenericParamConstraint,
            0x30 => Document,
            0x31 => MethodDebugInformation,
            0x32 => LocalScope,
            0x33 => LocalVariable,
            0x34 => LocalConstant,
            0x35 => ImportScope,
            0x36 => StateMachineMethod,
            0x37 => CustomDebugInformation,
            _ => return None,
        })
    }
}

impl<'data> Index<TableType> for MetadataStream<'data> {
    type Output = Table<'data>;

    fn index(&self, index: TableType) -> &Self::Output {
        &self.tables[index as usize]
    }
}

impl<'data> IndexMut<TableType> for MetadataStream<'data> {
    fn index_mut(&mut self, index: TableType) -> &mut Self::Output {
        &mut self.tables[index as usize]
    }
}
