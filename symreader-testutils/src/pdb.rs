//! A writer for synthetic Portable PDB files.

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use indexmap::{IndexMap, IndexSet};
use uuid::Uuid;

/// Custom debug information kind of async state machine stepping information.
pub const ASYNC_METHOD_STEPPING_INFORMATION: Uuid =
    uuid::uuid!("54FD2AC5-E925-401A-9C2A-F94F171072F8");
/// Custom debug information kind of embedded sources.
pub const EMBEDDED_SOURCE: Uuid = uuid::uuid!("0E8A571B-6926-466E-B4AD-8AB04611F5FE");
/// Custom debug information kind of Source Link JSON documents.
pub const SOURCE_LINK: Uuid = uuid::uuid!("CC110556-A091-4D38-9FEC-25AB9A351A6A");

/// The C# language GUID.
pub const LANGUAGE_CSHARP: Uuid = uuid::uuid!("3F5162F8-07C6-11D3-9053-00C04FA302A1");
/// The Visual Basic language GUID.
pub const LANGUAGE_VB: Uuid = uuid::uuid!("3A12D0B8-C26C-11D0-B442-00A0244A1DD2");
/// The SHA-1 hash algorithm GUID.
pub const HASH_SHA1: Uuid = uuid::uuid!("FF1816EC-AA5E-4D10-87F7-6F4963833460");
/// The SHA-256 hash algorithm GUID.
pub const HASH_SHA256: Uuid = uuid::uuid!("8829D00F-11B8-4213-878B-770E8597AC16");

/// The `HasCustomDebugInformation` tag of `MethodDef` parents.
pub const CDI_PARENT_METHOD_DEF: u32 = 0;
/// The `HasCustomDebugInformation` tag of `Module` parents.
pub const CDI_PARENT_MODULE: u32 = 7;
/// The `HasCustomDebugInformation` tag of `Document` parents.
pub const CDI_PARENT_DOCUMENT: u32 = 22;

const TABLE_METHOD_DEF: usize = 0x06;
const TABLE_DOCUMENT: usize = 0x30;
const TABLE_METHOD_DEBUG_INFORMATION: usize = 0x31;
const TABLE_LOCAL_SCOPE: usize = 0x32;
const TABLE_LOCAL_VARIABLE: usize = 0x33;
const TABLE_LOCAL_CONSTANT: usize = 0x34;
const TABLE_IMPORT_SCOPE: usize = 0x35;
const TABLE_STATE_MACHINE_METHOD: usize = 0x36;
const TABLE_CUSTOM_DEBUG_INFORMATION: usize = 0x37;

/// The tables a `HasCustomDebugInformation` coded index can point into.
const HAS_CUSTOM_DEBUG_INFORMATION: [usize; 27] = [
    0x06, 0x04, 0x01, 0x02, 0x08, 0x09, 0x0A, 0x00, 0x0E, 0x17, 0x14, 0x11, 0x1A, 0x1B, 0x20,
    0x23, 0x26, 0x27, 0x28, 0x2A, 0x2C, 0x2B, 0x30, 0x32, 0x33, 0x34, 0x35,
];

const HIDDEN_LINE: u32 = 0xfeefee;

/// Appends a compressed unsigned integer, see ECMA-335 II.23.2.
pub fn write_compressed_unsigned(buf: &mut Vec<u8>, value: u32) {
    if value < 0x80 {
        buf.push(value as u8);
    } else if value < 0x4000 {
        buf.extend_from_slice(&(0x8000 | value as u16).to_be_bytes());
    } else {
        assert!(value < 0x2000_0000, "value too large to compress");
        buf.extend_from_slice(&(0xC000_0000 | value).to_be_bytes());
    }
}

/// Appends a compressed signed integer, see ECMA-335 II.23.2.
pub fn write_compressed_signed(buf: &mut Vec<u8>, value: i32) {
    let sign = (value < 0) as u32;
    if (-0x40..0x40).contains(&value) {
        buf.push((((value as u32 & 0x3f) << 1) | sign) as u8);
    } else if (-0x2000..0x2000).contains(&value) {
        let encoded = ((value as u32 & 0x1fff) << 1) | sign;
        buf.extend_from_slice(&(0x8000 | encoded as u16).to_be_bytes());
    } else {
        assert!((-0x1000_0000..0x1000_0000).contains(&value), "value too large to compress");
        let encoded = ((value as u32 & 0x0fff_ffff) << 1) | sign;
        buf.extend_from_slice(&(0xC000_0000 | encoded).to_be_bytes());
    }
}

/// A sequence point to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    /// The IL offset.
    pub il_offset: u32,
    /// The start line.
    pub start_line: u32,
    /// The start column.
    pub start_column: u32,
    /// The end line.
    pub end_line: u32,
    /// The end column.
    pub end_column: u32,
    /// The 1-based document row.
    pub document: u32,
}

impl Point {
    /// A visible sequence point in document 1.
    pub fn new(
        il_offset: u32,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            il_offset,
            start_line,
            start_column,
            end_line,
            end_column,
            document: 1,
        }
    }

    /// A hidden sequence point in document 1.
    pub fn hidden(il_offset: u32) -> Self {
        Self {
            il_offset,
            start_line: HIDDEN_LINE,
            start_column: 0,
            end_line: HIDDEN_LINE,
            end_column: 0,
            document: 1,
        }
    }

    /// Moves the point into another document.
    pub fn in_document(mut self, document: u32) -> Self {
        self.document = document;
        self
    }

    fn is_hidden(&self) -> bool {
        self.start_line == HIDDEN_LINE
    }
}

/// An entry of an import scope to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDef {
    /// `using Namespace;`
    Namespace(String),
    /// A namespace of the given `AssemblyRef` row.
    AssemblyNamespace(u32, String),
    /// `using static Type;`, with a `TypeDefOrRefOrSpecEncoded` value.
    Type(u32),
    /// An XML namespace with its prefix.
    XmlNamespace(String, String),
    /// An extern alias imported from an ancestor scope.
    AssemblyReferenceAlias(String),
    /// `extern alias` for the given `AssemblyRef` row.
    AliasAssemblyReference(String, u32),
    /// `using Alias = Namespace;`
    AliasNamespace(String, String),
    /// An alias for a namespace of the given `AssemblyRef` row.
    AliasAssemblyNamespace(String, u32, String),
    /// `using Alias = Type;`, with a `TypeDefOrRefOrSpecEncoded` value.
    AliasType(String, u32),
}

/// A local variable to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDef {
    /// The variable name.
    pub name: String,
    /// The slot in the local signature.
    pub index: u16,
    /// The attribute flags.
    pub attributes: u16,
}

impl LocalDef {
    /// A visible local in the given slot.
    pub fn new(name: &str, index: u16) -> Self {
        Self {
            name: name.to_owned(),
            index,
            attributes: 0,
        }
    }
}

/// A local scope to be written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeDef {
    /// The `MethodDef` row of the owning method.
    pub method: u32,
    /// The `ImportScope` row, or 0.
    pub import_scope: u32,
    /// The IL start offset.
    pub start_offset: u32,
    /// The IL length.
    pub length: u32,
    /// The variables of the scope.
    pub variables: Vec<LocalDef>,
    /// The constants of the scope as name and signature blob.
    pub constants: Vec<(String, Vec<u8>)>,
}

impl ScopeDef {
    /// An empty scope of the given method.
    pub fn new(method: u32, start_offset: u32, length: u32) -> Self {
        Self {
            method,
            start_offset,
            length,
            ..Default::default()
        }
    }

    /// Sets the import scope row.
    pub fn with_import_scope(mut self, import_scope: u32) -> Self {
        self.import_scope = import_scope;
        self
    }

    /// Adds a variable.
    pub fn with_variable(mut self, variable: LocalDef) -> Self {
        self.variables.push(variable);
        self
    }

    /// Adds a constant.
    pub fn with_constant(mut self, name: &str, signature: &[u8]) -> Self {
        self.constants.push((name.to_owned(), signature.to_vec()));
        self
    }
}

/// Writes Portable PDB files from in-memory records.
///
/// Heaps are interned, all heap indices are written with 4 bytes and table indices use the
/// smallest width the row counts allow.
#[derive(Debug)]
pub struct PdbBuilder {
    guid: Uuid,
    stamp: u32,
    entry_point: u32,
    omit_pdb_stream: bool,
    referenced_rows: [u32; 64],

    strings: IndexMap<String, u32>,
    string_bytes: Vec<u8>,
    blobs: IndexMap<Vec<u8>, u32>,
    blob_bytes: Vec<u8>,
    guids: IndexSet<Uuid>,

    documents: Vec<[u32; 4]>,
    methods: Vec<(u32, u32)>,
    scopes: Vec<ScopeDef>,
    import_scopes: Vec<[u32; 2]>,
    state_machines: Vec<[u32; 2]>,
    custom_debug_information: Vec<(u32, u32, Vec<u8>)>,
}

impl PdbBuilder {
    /// Creates a builder for a PDB with the given identity.
    pub fn new(guid: Uuid, stamp: u32) -> Self {
        Self {
            guid,
            stamp,
            entry_point: 0,
            omit_pdb_stream: false,
            referenced_rows: [0; 64],
            strings: IndexMap::new(),
            string_bytes: vec![0],
            blobs: IndexMap::new(),
            blob_bytes: vec![0],
            guids: IndexSet::new(),
            documents: Vec::new(),
            methods: Vec::new(),
            scopes: Vec::new(),
            import_scopes: Vec::new(),
            state_machines: Vec::new(),
            custom_debug_information: Vec::new(),
        }
    }

    /// Sets the `MethodDef` token of the entry point.
    pub fn entry_point(&mut self, token: u32) -> &mut Self {
        self.entry_point = token;
        self
    }

    /// Sets the row count of a type system table of the described binary.
    pub fn referenced_rows(&mut self, table: usize, rows: u32) -> &mut Self {
        self.referenced_rows[table] = rows;
        self
    }

    /// Sets the number of `MethodDef` rows of the described binary.
    pub fn method_count(&mut self, rows: u32) -> &mut Self {
        self.referenced_rows(TABLE_METHOD_DEF, rows)
    }

    /// Leaves out the `#Pdb` stream, as in metadata of compiled binaries.
    pub fn without_pdb_stream(&mut self) -> &mut Self {
        self.omit_pdb_stream = true;
        self
    }

    fn string(&mut self, s: &str) -> u32 {
        if s.is_empty() {
            return 0;
        }
        if let Some(&offset) = self.strings.get(s) {
            return offset;
        }
        let offset = self.string_bytes.len() as u32;
        self.string_bytes.extend_from_slice(s.as_bytes());
        self.string_bytes.push(0);
        self.strings.insert(s.to_owned(), offset);
        offset
    }

    /// Interns a blob and returns its heap offset.
    pub fn blob(&mut self, data: &[u8]) -> u32 {
        if data.is_empty() {
            return 0;
        }
        if let Some(&offset) = self.blobs.get(data) {
            return offset;
        }
        let offset = self.blob_bytes.len() as u32;
        write_compressed_unsigned(&mut self.blob_bytes, data.len() as u32);
        self.blob_bytes.extend_from_slice(data);
        self.blobs.insert(data.to_vec(), offset);
        offset
    }

    fn guid(&mut self, guid: Uuid) -> u32 {
        if guid.is_nil() {
            return 0;
        }
        self.guids.insert_full(guid).0 as u32 + 1
    }

    fn document_name(&mut self, name: &str) -> u32 {
        let separator = ['\\', '/'].into_iter().find(|c| name.contains(*c));
        let mut blob = Vec::new();
        match separator {
            Some(separator) => {
                blob.push(separator as u8);
                for part in name.split(separator) {
                    let part = self.blob(part.as_bytes());
                    write_compressed_unsigned(&mut blob, part);
                }
            }
            None => {
                blob.push(0);
                let part = self.blob(name.as_bytes());
                write_compressed_unsigned(&mut blob, part);
            }
        }
        self.blob(&blob)
    }

    /// Adds a document and returns its 1-based row.
    pub fn add_document(
        &mut self,
        name: &str,
        language: Uuid,
        hash_algorithm: Uuid,
        hash: &[u8],
    ) -> u32 {
        let row = [
            self.document_name(name),
            self.guid(hash_algorithm),
            self.blob(hash),
            self.guid(language),
        ];
        self.documents.push(row);
        self.documents.len() as u32
    }

    /// Sets the sequence points and local signature row of the method with the given row.
    pub fn add_method(&mut self, method: u32, local_signature: u32, points: &[Point]) -> &mut Self {
        let index = method as usize - 1;
        if self.methods.len() <= index {
            self.methods.resize(index + 1, (0, 0));
        }

        if points.is_empty() && local_signature == 0 {
            self.methods[index] = (0, 0);
            return self;
        }

        let first_document = points.first().map_or(0, |p| p.document);
        let single_document = points.iter().all(|p| p.document == first_document);

        let mut blob = Vec::new();
        write_compressed_unsigned(&mut blob, local_signature);
        let document = if single_document {
            first_document
        } else {
            write_compressed_unsigned(&mut blob, first_document);
            0
        };

        let mut current_document = first_document;
        let mut prev: Option<Point> = None;
        let mut prev_visible: Option<Point> = None;
        for point in points {
            if point.document != current_document {
                blob.push(0);
                write_compressed_unsigned(&mut blob, point.document);
                current_document = point.document;
            }

            match prev {
                Some(prev) => {
                    write_compressed_unsigned(&mut blob, point.il_offset - prev.il_offset)
                }
                None => write_compressed_unsigned(&mut blob, point.il_offset),
            }

            if point.is_hidden() {
                blob.extend_from_slice(&[0, 0]);
            } else {
                let delta_lines = point.end_line - point.start_line;
                let delta_columns = point.end_column as i32 - point.start_column as i32;
                write_compressed_unsigned(&mut blob, delta_lines);
                if delta_lines == 0 {
                    write_compressed_unsigned(&mut blob, delta_columns as u32);
                } else {
                    write_compressed_signed(&mut blob, delta_columns);
                }

                match prev_visible {
                    Some(prev) => {
                        let delta_line = point.start_line as i32 - prev.start_line as i32;
                        let delta_column = point.start_column as i32 - prev.start_column as i32;
                        write_compressed_signed(&mut blob, delta_line);
                        write_compressed_signed(&mut blob, delta_column);
                    }
                    None => {
                        write_compressed_unsigned(&mut blob, point.start_line);
                        write_compressed_unsigned(&mut blob, point.start_column);
                    }
                }
                prev_visible = Some(*point);
            }
            prev = Some(*point);
        }

        let blob = self.blob(&blob);
        self.methods[index] = (document, blob);
        self
    }

    /// Adds a local scope.
    pub fn add_scope(&mut self, scope: ScopeDef) -> &mut Self {
        self.scopes.push(scope);
        self
    }

    /// Adds an import scope and returns its 1-based row.
    pub fn add_import_scope(&mut self, parent: u32, imports: &[ImportDef]) -> u32 {
        let mut blob = Vec::new();
        for import in imports {
            match import {
                ImportDef::Namespace(namespace) => {
                    write_compressed_unsigned(&mut blob, 1);
                    self.write_blob_string(&mut blob, namespace);
                }
                ImportDef::AssemblyNamespace(assembly, namespace) => {
                    write_compressed_unsigned(&mut blob, 2);
                    write_compressed_unsigned(&mut blob, *assembly);
                    self.write_blob_string(&mut blob, namespace);
                }
                ImportDef::Type(type_) => {
                    write_compressed_unsigned(&mut blob, 3);
                    write_compressed_unsigned(&mut blob, *type_);
                }
                ImportDef::XmlNamespace(alias, namespace) => {
                    write_compressed_unsigned(&mut blob, 4);
                    self.write_blob_string(&mut blob, alias);
                    self.write_blob_string(&mut blob, namespace);
                }
                ImportDef::AssemblyReferenceAlias(alias) => {
                    write_compressed_unsigned(&mut blob, 5);
                    self.write_blob_string(&mut blob, alias);
                }
                ImportDef::AliasAssemblyReference(alias, assembly) => {
                    write_compressed_unsigned(&mut blob, 6);
                    self.write_blob_string(&mut blob, alias);
                    write_compressed_unsigned(&mut blob, *assembly);
                }
                ImportDef::AliasNamespace(alias, namespace) => {
                    write_compressed_unsigned(&mut blob, 7);
                    self.write_blob_string(&mut blob, alias);
                    self.write_blob_string(&mut blob, namespace);
                }
                ImportDef::AliasAssemblyNamespace(alias, assembly, namespace) => {
                    write_compressed_unsigned(&mut blob, 8);
                    self.write_blob_string(&mut blob, alias);
                    write_compressed_unsigned(&mut blob, *assembly);
                    self.write_blob_string(&mut blob, namespace);
                }
                ImportDef::AliasType(alias, type_) => {
                    write_compressed_unsigned(&mut blob, 9);
                    self.write_blob_string(&mut blob, alias);
                    write_compressed_unsigned(&mut blob, *type_);
                }
            }
        }
        let blob = self.blob(&blob);
        self.import_scopes.push([parent, blob]);
        self.import_scopes.len() as u32
    }

    fn write_blob_string(&mut self, blob: &mut Vec<u8>, s: &str) {
        let offset = self.blob(s.as_bytes());
        write_compressed_unsigned(blob, offset);
    }

    /// Adds a custom debug information row with a `HasCustomDebugInformation` parent.
    pub fn add_custom_debug_information(
        &mut self,
        tag: u32,
        row: u32,
        kind: Uuid,
        value: &[u8],
    ) -> &mut Self {
        let parent = row << 5 | tag;
        let kind = self.guid(kind);
        self.custom_debug_information.push((parent, kind, value.to_vec()));
        self
    }

    /// Adds a Source Link JSON document to the module.
    pub fn add_source_link(&mut self, json: &str) -> &mut Self {
        self.add_custom_debug_information(CDI_PARENT_MODULE, 1, SOURCE_LINK, json.as_bytes())
    }

    /// Embeds the source of a document, compressed with deflate if `compress` is set.
    pub fn add_embedded_source(
        &mut self,
        document: u32,
        contents: &[u8],
        compress: bool,
    ) -> &mut Self {
        let mut blob = Vec::new();
        if compress {
            blob.extend_from_slice(&(contents.len() as i32).to_le_bytes());
            let mut encoder = DeflateEncoder::new(blob, Compression::default());
            encoder.write_all(contents).unwrap();
            blob = encoder.finish().unwrap();
        } else {
            blob.extend_from_slice(&0i32.to_le_bytes());
            blob.extend_from_slice(contents);
        }
        self.add_custom_debug_information(CDI_PARENT_DOCUMENT, document, EMBEDDED_SOURCE, &blob)
    }

    /// Marks `move_next` as the state machine method of `kickoff` and records its await points.
    ///
    /// Steps are `(yield offset, resume offset, resume method row)`.
    pub fn add_async_method(
        &mut self,
        move_next: u32,
        kickoff: u32,
        catch_handler: Option<u32>,
        steps: &[(u32, u32, u32)],
    ) -> &mut Self {
        self.state_machines.push([move_next, kickoff]);

        let mut blob = Vec::new();
        blob.extend_from_slice(&catch_handler.map_or(0, |offset| offset + 1).to_le_bytes());
        for &(yield_offset, resume_offset, method) in steps {
            blob.extend_from_slice(&yield_offset.to_le_bytes());
            blob.extend_from_slice(&resume_offset.to_le_bytes());
            write_compressed_unsigned(&mut blob, method);
        }
        self.add_custom_debug_information(
            CDI_PARENT_METHOD_DEF,
            move_next,
            ASYNC_METHOD_STEPPING_INFORMATION,
            &blob,
        )
    }

    /// Serializes the PDB.
    pub fn build(&mut self) -> Vec<u8> {
        let mut scopes = std::mem::take(&mut self.scopes);
        scopes.sort_by(|a, b| {
            (a.method, a.start_offset, std::cmp::Reverse(a.length))
                .cmp(&(b.method, b.start_offset, std::cmp::Reverse(b.length)))
        });

        let mut local_scopes = Vec::new();
        let mut variables = Vec::new();
        let mut constants = Vec::new();
        for scope in &scopes {
            local_scopes.push([
                scope.method,
                scope.import_scope,
                variables.len() as u32 + 1,
                constants.len() as u32 + 1,
                scope.start_offset,
                scope.length,
            ]);
            for variable in &scope.variables {
                let name = self.string(&variable.name);
                variables.push([variable.attributes as u32, variable.index as u32, name]);
            }
            for (name, signature) in &scope.constants {
                constants.push([self.string(name), self.blob(signature)]);
            }
        }
        self.scopes = scopes;

        let mut custom_debug_information = std::mem::take(&mut self.custom_debug_information);
        custom_debug_information.sort_by_key(|(parent, _, _)| *parent);
        let custom_debug_information: Vec<[u32; 3]> = custom_debug_information
            .iter()
            .map(|(parent, kind, value)| [*parent, *kind, self.blob(value)])
            .collect();

        let mut state_machines = self.state_machines.clone();
        state_machines.sort();

        // There is one `MethodDebugInformation` row per `MethodDef` row.
        let mut methods: Vec<[u32; 2]> = self.methods.iter().map(|&(d, b)| [d, b]).collect();
        let method_count = self.referenced_rows[TABLE_METHOD_DEF] as usize;
        if methods.len() < method_count {
            methods.resize(method_count, [0, 0]);
        }

        let mut rows = [0u32; 64];
        rows[TABLE_DOCUMENT] = self.documents.len() as u32;
        rows[TABLE_METHOD_DEBUG_INFORMATION] = methods.len() as u32;
        rows[TABLE_LOCAL_SCOPE] = local_scopes.len() as u32;
        rows[TABLE_LOCAL_VARIABLE] = variables.len() as u32;
        rows[TABLE_LOCAL_CONSTANT] = constants.len() as u32;
        rows[TABLE_IMPORT_SCOPE] = self.import_scopes.len() as u32;
        rows[TABLE_STATE_MACHINE_METHOD] = state_machines.len() as u32;
        rows[TABLE_CUSTOM_DEBUG_INFORMATION] = custom_debug_information.len() as u32;

        let size = |table: usize| rows[table].max(self.referenced_rows[table]);
        let table_index = |table: usize| if size(table) < 1 << 16 { 2 } else { 4 };
        let cdi_index = if HAS_CUSTOM_DEBUG_INFORMATION
            .iter()
            .all(|&table| size(table) < 1 << 11)
        {
            2
        } else {
            4
        };

        let mut tables = Vec::new();
        let write = |buf: &mut Vec<u8>, value: u32, width: usize| match width {
            2 => buf.extend_from_slice(&(value as u16).to_le_bytes()),
            _ => buf.extend_from_slice(&value.to_le_bytes()),
        };

        for row in &self.documents {
            for value in row {
                write(&mut tables, *value, 4);
            }
        }
        for [document, blob] in &methods {
            write(&mut tables, *document, table_index(TABLE_DOCUMENT));
            write(&mut tables, *blob, 4);
        }
        for [method, import_scope, variable_list, constant_list, start, length] in &local_scopes {
            write(&mut tables, *method, table_index(TABLE_METHOD_DEF));
            write(&mut tables, *import_scope, table_index(TABLE_IMPORT_SCOPE));
            write(&mut tables, *variable_list, table_index(TABLE_LOCAL_VARIABLE));
            write(&mut tables, *constant_list, table_index(TABLE_LOCAL_CONSTANT));
            write(&mut tables, *start, 4);
            write(&mut tables, *length, 4);
        }
        for [attributes, index, name] in &variables {
            write(&mut tables, *attributes, 2);
            write(&mut tables, *index, 2);
            write(&mut tables, *name, 4);
        }
        for [name, signature] in &constants {
            write(&mut tables, *name, 4);
            write(&mut tables, *signature, 4);
        }
        for [parent, imports] in &self.import_scopes {
            write(&mut tables, *parent, table_index(TABLE_IMPORT_SCOPE));
            write(&mut tables, *imports, 4);
        }
        for [move_next, kickoff] in &state_machines {
            write(&mut tables, *move_next, table_index(TABLE_METHOD_DEF));
            write(&mut tables, *kickoff, table_index(TABLE_METHOD_DEF));
        }
        for [parent, kind, value] in &custom_debug_information {
            write(&mut tables, *parent, cdi_index);
            write(&mut tables, *kind, 4);
            write(&mut tables, *value, 4);
        }

        let mut valid_tables = 0u64;
        let mut metadata = Vec::new();
        metadata.extend_from_slice(&0u32.to_le_bytes());
        metadata.extend_from_slice(&[2, 0, 0x07, 1]);
        for (table, &count) in rows.iter().enumerate() {
            if count > 0 {
                valid_tables |= 1 << table;
            }
        }
        metadata.extend_from_slice(&valid_tables.to_le_bytes());
        metadata.extend_from_slice(&valid_tables.to_le_bytes());
        for &count in rows.iter().filter(|count| **count > 0) {
            metadata.extend_from_slice(&count.to_le_bytes());
        }
        metadata.extend_from_slice(&tables);

        let mut pdb = Vec::new();
        pdb.extend_from_slice(&self.guid.to_bytes_le());
        pdb.extend_from_slice(&self.stamp.to_le_bytes());
        pdb.extend_from_slice(&self.entry_point.to_le_bytes());
        let mut referenced_tables = 0u64;
        for (table, &count) in self.referenced_rows.iter().enumerate() {
            if count > 0 {
                referenced_tables |= 1 << table;
            }
        }
        pdb.extend_from_slice(&referenced_tables.to_le_bytes());
        for &count in self.referenced_rows.iter().filter(|count| **count > 0) {
            pdb.extend_from_slice(&count.to_le_bytes());
        }

        let guids: Vec<u8> = self.guids.iter().flat_map(|guid| guid.to_bytes_le()).collect();

        let mut streams: Vec<(&str, Vec<u8>)> = Vec::new();
        if !self.omit_pdb_stream {
            streams.push(("#Pdb", pdb));
        }
        streams.push(("#~", metadata));
        streams.push(("#Strings", self.string_bytes.clone()));
        streams.push(("#US", vec![0]));
        streams.push(("#GUID", guids));
        streams.push(("#Blob", self.blob_bytes.clone()));

        write_metadata_root(&streams)
    }
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Lays out the metadata root with the given streams, see ECMA-335 II.24.2.1.
fn write_metadata_root(streams: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let version = b"PDB v1.0\0\0\0\0";

    let mut header_size = 16 + version.len() + 4;
    for (name, _) in streams {
        header_size += 8 + (name.len() + 4) / 4 * 4;
    }

    let mut buf = Vec::new();
    buf.extend_from_slice(&0x424A_5342u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&(version.len() as u32).to_le_bytes());
    buf.extend_from_slice(version);
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&(streams.len() as u16).to_le_bytes());

    let mut offset = header_size;
    for (name, data) in streams {
        let size = (data.len() + 3) / 4 * 4;
        buf.extend_from_slice(&(offset as u32).to_le_bytes());
        buf.extend_from_slice(&(size as u32).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        pad4(&mut buf);
        offset += size;
    }
    assert_eq!(buf.len(), header_size);

    for (_, data) in streams {
        buf.extend_from_slice(data);
        pad4(&mut buf);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_unsigned() {
        let mut buf = Vec::new();
        write_compressed_unsigned(&mut buf, 0x03);
        write_compressed_unsigned(&mut buf, 0x80);
        write_compressed_unsigned(&mut buf, 0x4000);
        assert_eq!(buf, [0x03, 0x80, 0x80, 0xC0, 0x00, 0x40, 0x00]);
    }

    #[test]
    fn test_compressed_signed() {
        let mut buf = Vec::new();
        write_compressed_signed(&mut buf, 3);
        write_compressed_signed(&mut buf, -3);
        write_compressed_signed(&mut buf, 64);
        write_compressed_signed(&mut buf, -8192);
        write_compressed_signed(&mut buf, 268435455);
        assert_eq!(
            buf,
            [0x06, 0x7B, 0x80, 0x80, 0x80, 0x01, 0xDF, 0xFF, 0xFF, 0xFE]
        );
    }
}
