use super::blob::BlobReader;
use super::metadata::TableType;
use super::signatures::type_def_or_ref_token;
use super::{FormatError, FormatErrorKind, PortablePdb};

/// The metadata token type of `AssemblyRef` rows.
const ASSEMBLY_REF_TOKEN: u32 = 0x2300_0000;

/// A single entry of an import scope.
///
/// Assembly references are `AssemblyRef` tokens and types are `TypeDef`, `TypeRef` or
/// `TypeSpec` tokens of the compiled binary.
///
/// See https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md#imports-blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Import {
    /// Imports the members of a namespace.
    Namespace {
        /// The imported namespace.
        namespace: String,
    },
    /// Imports the members of a namespace of a specific assembly.
    AssemblyNamespace {
        /// The `AssemblyRef` token of the assembly.
        assembly: u32,
        /// The imported namespace.
        namespace: String,
    },
    /// Imports the members of a type.
    Type {
        /// The token of the imported type.
        type_token: u32,
    },
    /// Imports an XML namespace under an alias.
    XmlNamespace {
        /// The XML namespace prefix.
        alias: String,
        /// The XML namespace.
        namespace: String,
    },
    /// Imports the assembly reference alias defined in an ancestor scope.
    AssemblyReferenceAlias {
        /// The imported alias.
        alias: String,
    },
    /// Defines an alias for an assembly reference.
    AliasAssemblyReference {
        /// The defined alias.
        alias: String,
        /// The `AssemblyRef` token of the assembly.
        assembly: u32,
    },
    /// Defines an alias for a namespace.
    AliasNamespace {
        /// The defined alias.
        alias: String,
        /// The aliased namespace.
        namespace: String,
    },
    /// Defines an alias for a namespace of a specific assembly.
    AliasAssemblyNamespace {
        /// The defined alias.
        alias: String,
        /// The `AssemblyRef` token of the assembly.
        assembly: u32,
        /// The aliased namespace.
        namespace: String,
    },
    /// Defines an alias for a type.
    AliasType {
        /// The defined alias.
        alias: String,
        /// The token of the aliased type.
        type_token: u32,
    },
}

impl Import {
    /// The namespace named by this import, if any.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Import::Namespace { namespace }
            | Import::AssemblyNamespace { namespace, .. }
            | Import::XmlNamespace { namespace, .. }
            | Import::AliasNamespace { namespace, .. }
            | Import::AliasAssemblyNamespace { namespace, .. } => Some(namespace),
            _ => None,
        }
    }

    /// The alias defined or imported by this import, if any.
    pub fn alias(&self) -> Option<&str> {
        match self {
            Import::XmlNamespace { alias, .. }
            | Import::AssemblyReferenceAlias { alias }
            | Import::AliasAssemblyReference { alias, .. }
            | Import::AliasNamespace { alias, .. }
            | Import::AliasAssemblyNamespace { alias, .. }
            | Import::AliasType { alias, .. } => Some(alias),
            _ => None,
        }
    }
}

/// A row of the `ImportScope` table with its imports decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ImportScopeRecord {
    /// The parent `ImportScope` row, or 0.
    pub(crate) parent: u32,
    pub(crate) imports: Vec<Import>,
}

impl<'data> PortablePdb<'data> {
    /// Decodes the import scope with the given 1-based row.
    pub(crate) fn get_import_scope(&self, idx: usize) -> Result<ImportScopeRecord, FormatError> {
        let row = self.get_table(TableType::ImportScope)?.get_row(idx)?;
        let parent = row.get_col_u32(1)?;
        let blob = self.get_blob(row.get_col_u32(2)?)?;
        let imports = self
            .parse_imports(blob)
            .map_err(|e| FormatError::new(FormatErrorKind::InvalidImport, e))?;
        Ok(ImportScopeRecord { parent, imports })
    }

    fn parse_imports(&self, blob: &'data [u8]) -> Result<Vec<Import>, FormatError> {
        let mut reader = BlobReader::new(blob, FormatErrorKind::InvalidImport);
        let mut imports = Vec::new();

        let blob_string = |reader: &mut BlobReader<'data>| -> Result<String, FormatError> {
            let offset = reader.read_compressed_unsigned()?;
            let bytes = self.get_blob(offset)?;
            std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| FormatError::new(FormatErrorKind::InvalidStringData, e))
        };
        let assembly = |reader: &mut BlobReader<'data>| -> Result<u32, FormatError> {
            Ok(ASSEMBLY_REF_TOKEN | reader.read_compressed_unsigned()?)
        };
        let type_token = |reader: &mut BlobReader<'data>| -> Result<u32, FormatError> {
            type_def_or_ref_token(reader.read_compressed_unsigned()?)
        };

        while !reader.is_empty() {
            let import = match reader.read_compressed_unsigned()? {
                1 => Import::Namespace {
                    namespace: blob_string(&mut reader)?,
                },
                2 => Import::AssemblyNamespace {
                    assembly: assembly(&mut reader)?,
                    namespace: blob_string(&mut reader)?,
                },
                3 => Import::Type {
                    type_token: type_token(&mut reader)?,
                },
                4 => Import::XmlNamespace {
                    alias: blob_string(&mut reader)?,
                    namespace: blob_string(&mut reader)?,
                },
                5 => Import::AssemblyReferenceAlias {
                    alias: blob_string(&mut reader)?,
                },
                6 => Import::AliasAssemblyReference {
                    alias: blob_string(&mut reader)?,
                    assembly: assembly(&mut reader)?,
                },
                7 => Import::AliasNamespace {
                    alias: blob_string(&mut reader)?,
                    namespace: blob_string(&mut reader)?,
                },
                8 => Import::AliasAssemblyNamespace {
                    alias: blob_string(&mut reader)?,
                    assembly: assembly(&mut reader)?,
                    namespace: blob_string(&mut reader)?,
                },
                9 => Import::AliasType {
                    alias: blob_string(&mut reader)?,
                    type_token: type_token(&mut reader)?,
                },
                _ => return Err(FormatErrorKind::InvalidImport.into()),
            };
            imports.push(import);
        }

        Ok(imports)
    }
}
