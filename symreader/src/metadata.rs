//! Access to the metadata of the compiled binary.
//!
//! A Portable PDB only stores tokens of the types and signatures it refers to. Interpreting
//! `decimal` and `DateTime` constants and the signatures of local variables requires the
//! metadata tables of the binary itself, which are provided through [`MetadataImport`].
//!
//! Opening that metadata can be expensive, so readers take a [`MetadataImportProvider`] and
//! only invoke it once a query actually needs it.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use symreader_ppdb::TypeName;

use crate::{Error, ErrorKind};

/// Name and signature lookups in the metadata of a compiled binary.
pub trait MetadataImport: Send + Sync {
    /// Returns the namespace and name of a `TypeDef`, `TypeRef` or `TypeSpec` token.
    fn type_name(&self, token: u32) -> Option<TypeName>;

    /// Returns the signature blob of a `StandAloneSig` token.
    fn local_signature(&self, token: u32) -> Option<Vec<u8>>;
}

/// A factory for a [`MetadataImport`].
///
/// This is implemented for closures returning `Result<Arc<dyn MetadataImport>, Error>`.
pub trait MetadataImportProvider: Send + Sync {
    /// Creates the metadata import.
    fn create(&self) -> Result<Arc<dyn MetadataImport>, Error>;
}

impl<F> MetadataImportProvider for F
where
    F: Fn() -> Result<Arc<dyn MetadataImport>, Error> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn MetadataImport>, Error> {
        self()
    }
}

/// A provider for readers that never need metadata.
///
/// Every query that depends on the metadata import fails with
/// [`ErrorKind::MetadataUnavailable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadataImport;

impl MetadataImportProvider for NoMetadataImport {
    fn create(&self) -> Result<Arc<dyn MetadataImport>, Error> {
        Err(ErrorKind::NotImplemented.into())
    }
}

/// Creates a [`MetadataImport`] on first use and memoizes the outcome.
///
/// The provider runs at most once, even when several threads need the import at the same time.
/// A failure is memoized as well.
pub(crate) struct LazyMetadataImport {
    provider: Option<Box<dyn MetadataImportProvider>>,
    import: OnceCell<Option<Arc<dyn MetadataImport>>>,
}

impl LazyMetadataImport {
    pub(crate) fn new(provider: Box<dyn MetadataImportProvider>) -> Self {
        Self {
            provider: Some(provider),
            import: OnceCell::new(),
        }
    }

    /// Wraps an import that already exists.
    pub(crate) fn ready(import: Arc<dyn MetadataImport>) -> Self {
        Self {
            provider: None,
            import: OnceCell::with_value(Some(import)),
        }
    }

    pub(crate) fn get(&self) -> Result<&Arc<dyn MetadataImport>, Error> {
        let import = self.import.get_or_init(|| {
            let provider = self.provider.as_ref()?;
            match provider.create() {
                Ok(import) => {
                    tracing::debug!("created metadata import");
                    Some(import)
                }
                Err(e) => {
                    tracing::warn!(
                        error = &e as &dyn std::error::Error,
                        "failed to create metadata import"
                    );
                    None
                }
            }
        });
        import
            .as_ref()
            .ok_or_else(|| ErrorKind::MetadataUnavailable.into())
    }
}

impl fmt::Debug for LazyMetadataImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.import.get() {
            None => "pending",
            Some(Some(_)) => "available",
            Some(None) => "unavailable",
        };
        f.debug_struct("LazyMetadataImport")
            .field("state", &state)
            .finish()
    }
}
