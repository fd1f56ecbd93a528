//! The decoded, owned model of a Portable PDB file.

use std::borrow::Cow;
use std::io::Read;
use std::ops::Range;

use flate2::read::DeflateDecoder;

use symreader_common::{Language, Uuid};

use crate::constants::{parse_constant, ConstantData};
use crate::format::custom_debug_info::{
    ASYNC_METHOD_STEPPING_INFORMATION, EMBEDDED_SOURCE, SOURCE_LINK,
};
use crate::format::{
    BlobReader, Import, LocalScopeRecord, PdbId, PortablePdb, SequencePoint, TableType,
};
use crate::sourcelinks::SourceLinkMappings;
use crate::{FormatError, FormatErrorKind};

/// The metadata token type of `MethodDef` rows.
pub const METHOD_DEF_TOKEN: u32 = 0x0600_0000;
/// The metadata token type of `StandAloneSig` rows.
pub const STAND_ALONE_SIG_TOKEN: u32 = 0x1100_0000;

const TOKEN_TYPE_MASK: u32 = 0xff00_0000;

/// Splits a `MethodDef` token into its 1-based row.
pub fn method_row(token: u32) -> Option<usize> {
    if token & TOKEN_TYPE_MASK != METHOD_DEF_TOKEN {
        return None;
    }
    match token & !TOKEN_TYPE_MASK {
        0 => None,
        row => Some(row as usize),
    }
}

/// A source file referenced by a Portable PDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    name: String,
    hash_algorithm: Uuid,
    hash: Vec<u8>,
    language: Uuid,
    embedded_source: Option<EmbeddedSource>,
}

impl DocumentInfo {
    /// The path of the document, usually a normalized full path on the build machine.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The GUID of the algorithm used to compute [`hash`](Self::hash), nil if there is none.
    pub fn hash_algorithm(&self) -> Uuid {
        self.hash_algorithm
    }

    /// The checksum of the document, empty if the document has no checksum.
    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    /// The language GUID of the document.
    pub fn language_guid(&self) -> Uuid {
        self.language
    }

    /// The language of the document.
    pub fn language(&self) -> Language {
        Language::from_guid(self.language)
    }

    /// The source code of the document, if it is embedded in the PDB.
    pub fn embedded_source(&self) -> Option<&EmbeddedSource> {
        self.embedded_source.as_ref()
    }
}

/// Source code embedded into a Portable PDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedSource {
    blob: Vec<u8>,
}

impl EmbeddedSource {
    /// The storage format: 0 for raw bytes, otherwise the uncompressed size of deflated bytes.
    pub fn format(&self) -> Result<i32, FormatError> {
        BlobReader::new(&self.blob, FormatErrorKind::InvalidBlobData).read_i32()
    }

    /// The size of the source file in bytes.
    pub fn len(&self) -> Result<usize, FormatError> {
        match self.format()? {
            0 => Ok(self.blob.len() - 4),
            size if size > 0 => Ok(size as usize),
            format => Err(FormatErrorKind::InvalidBlobFormat(format).into()),
        }
    }

    /// Returns true if the source file is empty.
    pub fn is_empty(&self) -> Result<bool, FormatError> {
        Ok(self.len()? == 0)
    }

    /// Reads the source file contents.
    pub fn contents(&self) -> Result<Cow<'_, [u8]>, FormatError> {
        // The blob has the following structure: `Blob ::= format content`
        // - format - int32 - Indicates how the content is serialized.
        //     0 = raw bytes, uncompressed.
        //     Positive value = compressed by deflate algorithm and value indicates uncompressed size.
        //     Negative values reserved for future formats.
        // - content - format-specific - The text of the document in the specified format. The length is implied by the length of the blob minus four bytes for the format.
        let format = self.format()?;
        let data = &self.blob[4..];

        match format {
            0 => Ok(Cow::Borrowed(data)),
            x if x > 0 => inflate_contents(x as usize, data).map(Cow::Owned),
            _ => Err(FormatErrorKind::InvalidBlobFormat(format).into()),
        }
    }
}

/// The largest expansion deflate can achieve, about 1032:1.
const MAX_DEFLATE_RATIO: usize = 1032;

fn inflate_contents(size: usize, data: &[u8]) -> Result<Vec<u8>, FormatError> {
    // The declared size is untrusted: cap the reservation and the inflated output.
    let capacity = size.min(data.len().saturating_mul(MAX_DEFLATE_RATIO));
    let mut output = Vec::with_capacity(capacity);
    let read_size = DeflateDecoder::new(data)
        .take(size as u64 + 1)
        .read_to_end(&mut output)
        .map_err(|e| FormatError::new(FormatErrorKind::InvalidBlobData, e))?;
    if read_size != size {
        return Err(FormatErrorKind::InvalidLength.into());
    }
    Ok(output)
}

/// One await point of an async method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncStepInfo {
    /// The IL offset of the instruction that yields control.
    pub yield_offset: u32,
    /// The IL offset at which execution resumes.
    pub resume_offset: u32,
    /// The `MethodDef` token of the method execution resumes in.
    pub resume_method: u32,
}

/// Stepping information of the `MoveNext` method of an async state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncMethodInfo {
    kickoff_method: u32,
    catch_handler_offset: Option<u32>,
    steps: Vec<AsyncStepInfo>,
}

impl AsyncMethodInfo {
    /// The `MethodDef` token of the user method that started the state machine.
    pub fn kickoff_method(&self) -> u32 {
        self.kickoff_method
    }

    /// The IL offset of the catch handler that forwards exceptions to the awaiter, if any.
    pub fn catch_handler_offset(&self) -> Option<u32> {
        self.catch_handler_offset
    }

    /// The await points, in the order they were recorded.
    pub fn steps(&self) -> &[AsyncStepInfo] {
        &self.steps
    }
}

/// Parses an async method stepping information blob.
///
/// See https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md#state-machine-async-method-stepping-information-c--vb-compilers.
fn parse_async_steps(blob: &[u8]) -> Result<(Option<u32>, Vec<AsyncStepInfo>), FormatError> {
    let mut reader = BlobReader::new(blob, FormatErrorKind::InvalidAsyncInfo);
    let catch_handler_offset = reader.read_u32()?.checked_sub(1);

    let mut steps = Vec::new();
    while !reader.is_empty() {
        let yield_offset = reader.read_u32()?;
        let resume_offset = reader.read_u32()?;
        let resume_method = METHOD_DEF_TOKEN | reader.read_compressed_unsigned()?;
        steps.push(AsyncStepInfo {
            yield_offset,
            resume_offset,
            resume_method,
        });
    }
    Ok((catch_handler_offset, steps))
}

/// Debug information of a single method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodInfo {
    token: u32,
    sequence_points: Vec<SequencePoint>,
    local_signature: Option<u32>,
    root_scopes: Vec<usize>,
    async_info: Option<AsyncMethodInfo>,
}

impl MethodInfo {
    /// The `MethodDef` token of the method.
    pub fn token(&self) -> u32 {
        self.token
    }

    /// The sequence points of the method, ordered by IL offset.
    pub fn sequence_points(&self) -> &[SequencePoint] {
        &self.sequence_points
    }

    /// The `StandAloneSig` token of the method's local variable signature, if any.
    pub fn local_signature_token(&self) -> Option<u32> {
        self.local_signature
    }

    /// The indices of the method's outermost scopes, see [`DebugInfo::scope`].
    pub fn root_scopes(&self) -> &[usize] {
        &self.root_scopes
    }

    /// The async stepping information, if this is the `MoveNext` method of an async state machine.
    pub fn async_info(&self) -> Option<&AsyncMethodInfo> {
        self.async_info.as_ref()
    }

    /// Returns true if the PDB records any sequence points or scopes for this method.
    pub fn has_debug_info(&self) -> bool {
        !self.sequence_points.is_empty() || !self.root_scopes.is_empty()
    }
}

/// A lexical scope of a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeInfo {
    method: u32,
    start_offset: u32,
    end_offset: u32,
    parent: Option<usize>,
    children: Vec<usize>,
    variables: Range<usize>,
    constants: Range<usize>,
    import_scope: Option<usize>,
}

impl ScopeInfo {
    /// The `MethodDef` token of the method owning this scope.
    pub fn method(&self) -> u32 {
        self.method
    }

    /// The IL offset of the first instruction in the scope.
    pub fn start_offset(&self) -> u32 {
        self.start_offset
    }

    /// The IL offset after the last instruction in the scope.
    pub fn end_offset(&self) -> u32 {
        self.end_offset
    }

    /// The index of the enclosing scope, `None` for the outermost scopes of a method.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// The indices of the directly nested scopes, ordered by start offset.
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// The indices of the scope's variables, see [`DebugInfo::variables`].
    pub fn variables(&self) -> Range<usize> {
        self.variables.clone()
    }

    /// The indices of the scope's constants, see [`DebugInfo::constants`].
    pub fn constants(&self) -> Range<usize> {
        self.constants.clone()
    }

    /// The index of the scope's import scope, see [`DebugInfo::import_scopes`].
    pub fn import_scope(&self) -> Option<usize> {
        self.import_scope
    }

    /// Returns true if the IL offset lies within the scope.
    pub fn contains(&self, offset: u32) -> bool {
        self.start_offset <= offset && offset < self.end_offset
    }
}

/// Attribute of variables that are hidden from the debugger.
pub const LOCAL_VARIABLE_DEBUGGER_HIDDEN: u16 = 0x1;

/// A local variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    name: String,
    index: u16,
    attributes: u16,
}

impl VariableInfo {
    /// The name of the variable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The slot of the variable in the method's local signature.
    pub fn index(&self) -> u16 {
        self.index
    }

    /// The raw attribute flags.
    pub fn attributes(&self) -> u16 {
        self.attributes
    }

    /// Returns true if the variable is compiler generated and hidden from the debugger.
    pub fn is_debugger_hidden(&self) -> bool {
        self.attributes & LOCAL_VARIABLE_DEBUGGER_HIDDEN != 0
    }
}

/// A local constant.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantInfo {
    name: String,
    signature: Vec<u8>,
    data: ConstantData,
}

impl ConstantInfo {
    /// The name of the constant.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type signature of the constant, without the value.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The value of the constant.
    pub fn data(&self) -> &ConstantData {
        &self.data
    }
}

/// A set of namespace imports and aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportScopeInfo {
    parent: Option<usize>,
    imports: Vec<Import>,
}

impl ImportScopeInfo {
    /// The index of the enclosing import scope.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// The imports of this scope, without those of enclosing scopes.
    pub fn imports(&self) -> &[Import] {
        &self.imports
    }
}

/// The decoded contents of a Portable PDB file.
///
/// All records are decoded in one pass by [`DebugInfo::decode`]; cross references between
/// records are resolved into indices into the collections of this struct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugInfo {
    id: Option<PdbId>,
    entry_point: Option<u32>,
    documents: Vec<DocumentInfo>,
    methods: Vec<MethodInfo>,
    scopes: Vec<ScopeInfo>,
    variables: Vec<VariableInfo>,
    constants: Vec<ConstantInfo>,
    import_scopes: Vec<ImportScopeInfo>,
    source_link: Vec<String>,
    source_link_mappings: SourceLinkMappings,
}

impl DebugInfo {
    /// Parses and decodes a Portable PDB file.
    pub fn parse(buf: &[u8]) -> Result<Self, FormatError> {
        Self::decode(&PortablePdb::parse(buf)?)
    }

    /// Decodes all debug information records of a parsed Portable PDB file.
    pub fn decode(ppdb: &PortablePdb<'_>) -> Result<Self, FormatError> {
        let mut info = DebugInfo {
            id: ppdb.pdb_id(),
            entry_point: ppdb.entry_point(),
            ..Default::default()
        };

        for idx in 1..=ppdb.row_count(TableType::Document) {
            let record = ppdb.get_document(idx)?;
            info.documents.push(DocumentInfo {
                name: record.name,
                hash_algorithm: record.hash_algorithm,
                hash: record.hash.to_vec(),
                language: record.language,
                embedded_source: None,
            });
        }

        for idx in 1..=ppdb.row_count(TableType::LocalVariable) {
            let record = ppdb.get_local_variable(idx)?;
            info.variables.push(VariableInfo {
                name: record.name.to_owned(),
                index: record.index,
                attributes: record.attributes,
            });
        }

        for idx in 1..=ppdb.row_count(TableType::LocalConstant) {
            let record = ppdb.get_local_constant(idx)?;
            let parsed = parse_constant(record.signature)
                .map_err(|e| FormatError::new(FormatErrorKind::InvalidConstant, e))?;
            info.constants.push(ConstantInfo {
                name: record.name.to_owned(),
                signature: parsed.signature,
                data: parsed.data,
            });
        }

        let import_scope_count = ppdb.row_count(TableType::ImportScope);
        for idx in 1..=import_scope_count {
            let record = ppdb.get_import_scope(idx)?;
            let parent = optional_index(record.parent, import_scope_count)?;
            info.import_scopes.push(ImportScopeInfo {
                parent,
                imports: record.imports,
            });
        }

        let method_count = ppdb.method_def_count();
        info.methods.reserve(method_count);
        for idx in 1..=method_count {
            let record = ppdb.get_method_debug_info(idx)?;
            if let Some(point) = record
                .sequence_points
                .iter()
                .find(|point| point.document >= info.documents.len())
            {
                return Err(FormatError::new(
                    FormatErrorKind::InvalidSequencePoint,
                    format!("document {} does not exist", point.document + 1),
                ));
            }
            info.methods.push(MethodInfo {
                token: METHOD_DEF_TOKEN | idx as u32,
                sequence_points: record.sequence_points,
                local_signature: match record.local_signature {
                    0 => None,
                    row => Some(STAND_ALONE_SIG_TOKEN | row),
                },
                ..Default::default()
            });
        }

        info.decode_scopes(ppdb)?;
        info.decode_custom_debug_information(ppdb)?;

        tracing::debug!(
            documents = info.documents.len(),
            methods = info.methods.len(),
            scopes = info.scopes.len(),
            variables = info.variables.len(),
            constants = info.constants.len(),
            "decoded portable pdb"
        );

        Ok(info)
    }

    /// Builds the scope trees from the `LocalScope` table.
    ///
    /// Rows are sorted by method, then by start offset ascending and length descending, so
    /// every scope directly follows the scopes that enclose it.
    fn decode_scopes(&mut self, ppdb: &PortablePdb<'_>) -> Result<(), FormatError> {
        let import_scope_count = self.import_scopes.len();
        let mut stack: Vec<usize> = Vec::new();
        let mut current_method = 0;

        for idx in 1..=ppdb.row_count(TableType::LocalScope) {
            let LocalScopeRecord {
                method,
                import_scope,
                variables,
                constants,
                start_offset,
                length,
            } = ppdb.get_local_scope(idx)?;

            let end_offset = start_offset
                .checked_add(length)
                .ok_or(FormatErrorKind::InvalidLocalScope)?;

            if method != current_method {
                if method < current_method {
                    return Err(FormatError::new(
                        FormatErrorKind::InvalidLocalScope,
                        "local scopes are not sorted by method",
                    ));
                }
                current_method = method;
                stack.clear();
            }

            while let Some(&top) = stack.last() {
                if self.scopes[top].end_offset > start_offset {
                    break;
                }
                stack.pop();
            }

            let parent = stack.last().copied();
            if let Some(parent) = parent {
                let enclosing = &self.scopes[parent];
                if start_offset < enclosing.start_offset || end_offset > enclosing.end_offset {
                    return Err(FormatError::new(
                        FormatErrorKind::InvalidLocalScope,
                        format!("local scope {idx} overlaps its enclosing scope"),
                    ));
                }
            }

            let row = method as usize;
            if row == 0 {
                return Err(FormatErrorKind::InvalidLocalScope.into());
            }
            // Scopes may belong to methods without sequence points past the referenced rows.
            while self.methods.len() < row {
                let token = METHOD_DEF_TOKEN | (self.methods.len() as u32 + 1);
                self.methods.push(MethodInfo {
                    token,
                    ..Default::default()
                });
            }

            let scope_idx = self.scopes.len();
            self.scopes.push(ScopeInfo {
                method: METHOD_DEF_TOKEN | method,
                start_offset,
                end_offset,
                parent,
                children: Vec::new(),
                variables: to_indices(variables, self.variables.len())?,
                constants: to_indices(constants, self.constants.len())?,
                import_scope: optional_index(import_scope, import_scope_count)?,
            });

            match parent {
                Some(parent) => self.scopes[parent].children.push(scope_idx),
                None => self.methods[row - 1].root_scopes.push(scope_idx),
            }
            stack.push(scope_idx);
        }

        Ok(())
    }

    fn decode_custom_debug_information(
        &mut self,
        ppdb: &PortablePdb<'_>,
    ) -> Result<(), FormatError> {
        let mut kickoff_methods = vec![None; self.methods.len()];
        for idx in 1..=ppdb.row_count(TableType::StateMachineMethod) {
            let (move_next, kickoff) = ppdb.get_state_machine_method(idx)?;
            if let Some(slot) = (move_next as usize)
                .checked_sub(1)
                .and_then(|row| kickoff_methods.get_mut(row))
            {
                *slot = Some(METHOD_DEF_TOKEN | kickoff);
            }
        }

        for cdi in ppdb.custom_debug_information() {
            let cdi = cdi?;
            let row = cdi.parent_row as usize;
            match (cdi.kind, cdi.parent_table) {
                (ASYNC_METHOD_STEPPING_INFORMATION, TableType::MethodDef) => {
                    let kickoff = row
                        .checked_sub(1)
                        .and_then(|row| kickoff_methods.get(row).copied().flatten());
                    // Stepping information is only meaningful for state machines.
                    let Some(kickoff_method) = kickoff else {
                        tracing::trace!(row, "async stepping information without state machine");
                        continue;
                    };
                    let (catch_handler_offset, steps) = parse_async_steps(cdi.value)?;
                    self.methods[row - 1].async_info = Some(AsyncMethodInfo {
                        kickoff_method,
                        catch_handler_offset,
                        steps,
                    });
                }
                (EMBEDDED_SOURCE, TableType::Document) => {
                    let document = row
                        .checked_sub(1)
                        .and_then(|row| self.documents.get_mut(row))
                        .ok_or(FormatErrorKind::RowIndexOutOfBounds(TableType::Document, row))?;
                    document.embedded_source = Some(EmbeddedSource {
                        blob: cdi.value.to_vec(),
                    });
                }
                (SOURCE_LINK, _) => {
                    let json = std::str::from_utf8(cdi.value)
                        .map_err(|e| FormatError::new(FormatErrorKind::InvalidSourceLinkJson, e))?;
                    self.source_link.push(json.to_owned());
                }
                _ => {}
            }
        }

        self.source_link_mappings =
            SourceLinkMappings::new(self.source_link.iter().map(String::as_str))?;
        Ok(())
    }

    /// The identity of the PDB, if it has a `#Pdb` stream.
    pub fn id(&self) -> Option<PdbId> {
        self.id
    }

    /// The `MethodDef` token of the user entry point, if any.
    pub fn entry_point(&self) -> Option<u32> {
        self.entry_point
    }

    /// All documents, in the order of the `Document` table.
    pub fn documents(&self) -> &[DocumentInfo] {
        &self.documents
    }

    /// All methods that have debug information.
    pub fn methods(&self) -> impl Iterator<Item = &MethodInfo> {
        self.methods.iter().filter(|method| method.has_debug_info())
    }

    /// Looks up a method by its `MethodDef` token.
    ///
    /// Returns `None` for tokens of other tables and for methods without debug information.
    pub fn method(&self, token: u32) -> Option<&MethodInfo> {
        let row = method_row(token)?;
        self.methods
            .get(row - 1)
            .filter(|method| method.has_debug_info())
    }

    /// Looks up a method by its `MethodDef` token, including methods without debug information
    /// that the PDB knows about.
    pub fn method_record(&self, token: u32) -> Option<&MethodInfo> {
        self.methods.get(method_row(token)? - 1)
    }

    /// The scope with the given index.
    pub fn scope(&self, idx: usize) -> Option<&ScopeInfo> {
        self.scopes.get(idx)
    }

    /// All scopes, in the order of the `LocalScope` table.
    pub fn scopes(&self) -> &[ScopeInfo] {
        &self.scopes
    }

    /// All local variables, in the order of the `LocalVariable` table.
    pub fn variables(&self) -> &[VariableInfo] {
        &self.variables
    }

    /// All local constants, in the order of the `LocalConstant` table.
    pub fn constants(&self) -> &[ConstantInfo] {
        &self.constants
    }

    /// All import scopes, in the order of the `ImportScope` table.
    pub fn import_scopes(&self) -> &[ImportScopeInfo] {
        &self.import_scopes
    }

    /// The Source Link JSON documents of the PDB.
    pub fn source_link(&self) -> &[String] {
        &self.source_link
    }

    /// The mappings of the PDB's Source Link documents.
    pub fn source_link_mappings(&self) -> &SourceLinkMappings {
        &self.source_link_mappings
    }
}

impl<'data> PortablePdb<'data> {
    /// Decodes the `(MoveNext, kickoff)` method rows of the given `StateMachineMethod` row.
    fn get_state_machine_method(&self, idx: usize) -> Result<(u32, u32), FormatError> {
        let row = self
            .get_table(TableType::StateMachineMethod)?
            .get_row(idx)?;
        Ok((row.get_col_u32(1)?, row.get_col_u32(2)?))
    }
}

/// Converts a 1-based row, where 0 means "none", into a 0-based index.
fn optional_index(row: u32, count: usize) -> Result<Option<usize>, FormatError> {
    match row as usize {
        0 => Ok(None),
        row if row <= count => Ok(Some(row - 1)),
        row => Err(FormatError::new(
            FormatErrorKind::InvalidLocalScope,
            format!("row {row} is out of bounds"),
        )),
    }
}

/// Converts a range of 1-based rows into 0-based indices.
fn to_indices(rows: Range<usize>, count: usize) -> Result<Range<usize>, FormatError> {
    if rows.end > count + 1 {
        return Err(FormatErrorKind::InvalidLocalScope.into());
    }
    Ok(rows.start - 1..rows.end - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deflate(data: &[u8]) -> Vec<u8> {
        use std::io::Write;

        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn embedded_source(format: i32, content: &[u8]) -> EmbeddedSource {
        let mut blob = format.to_le_bytes().to_vec();
        blob.extend_from_slice(content);
        EmbeddedSource { blob }
    }

    #[test]
    fn test_embedded_source_declared_size() {
        let source = embedded_source(5, &deflate(b"hello"));
        assert_eq!(source.len().unwrap(), 5);
        assert_eq!(source.contents().unwrap(), &b"hello"[..]);

        // a huge declared size on a tiny payload
        let source = embedded_source(i32::MAX, &deflate(b"hello"));
        assert_eq!(source.len().unwrap(), i32::MAX as usize);
        let err = source.contents().unwrap_err();
        assert_eq!(err.kind(), FormatErrorKind::InvalidLength);

        // a payload that inflates to far more than declared
        let source = embedded_source(16, &deflate(&[0; 1 << 20]));
        let err = source.contents().unwrap_err();
        assert_eq!(err.kind(), FormatErrorKind::InvalidLength);
    }

    #[test]
    fn test_method_row() {
        assert_eq!(method_row(0x0600_0002), Some(2));
        assert_eq!(method_row(0x0600_0000), None);
        assert_eq!(method_row(0x0200_0002), None);
    }

    #[test]
    fn test_parse_async_steps() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&0x21u32.to_le_bytes());
        blob.extend_from_slice(&0x10u32.to_le_bytes());
        blob.extend_from_slice(&0x18u32.to_le_bytes());
        blob.push(0x03);

        let (catch_handler, steps) = parse_async_steps(&blob).unwrap();
        assert_eq!(catch_handler, Some(0x20));
        assert_eq!(
            steps,
            vec![AsyncStepInfo {
                yield_offset: 0x10,
                resume_offset: 0x18,
                resume_method: 0x0600_0003,
            }]
        );

        let (catch_handler, steps) = parse_async_steps(&[0, 0, 0, 0]).unwrap();
        assert_eq!(catch_handler, None);
        assert!(steps.is_empty());

        assert!(parse_async_steps(&blob[..6]).is_err());
    }

    #[test]
    fn test_embedded_source() {
        let mut blob = 0i32.to_le_bytes().to_vec();
        blob.extend_from_slice(b"class C {}");
        let source = EmbeddedSource { blob };
        assert_eq!(source.len().unwrap(), 10);
        assert_eq!(&*source.contents().unwrap(), b"class C {}");

        let source = EmbeddedSource {
            blob: (-1i32).to_le_bytes().to_vec(),
        };
        assert_eq!(
            source.contents().unwrap_err().kind(),
            FormatErrorKind::InvalidBlobFormat(-1)
        );
    }
}
