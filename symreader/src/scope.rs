use std::fmt;
use std::sync::Arc;

use symreader_ppdb::{
    local_variable_signatures, ConstantInfo, ConstantValue, Import, MethodInfo, ScopeInfo,
    VariableInfo,
};

use crate::method::Method;
use crate::reader::{ReaderInner, ReaderState};
use crate::{Error, ErrorKind};

/// The address kind of local variables, which are addressed by their IL slot.
pub const ADDRESS_KIND_IL_OFFSET: u32 = 1;

/// A lexical scope of a method.
///
/// Every method has a synthesized root scope whose children are the outermost scopes recorded in
/// the PDB. The root scope has no parent, variables, constants or namespaces.
///
/// Scopes are views: every lookup creates a new value, and two scopes compare equal if they refer
/// to the same scope of the same reader.
#[derive(Clone)]
pub struct Scope {
    reader: Arc<ReaderInner>,
    method: u32,
    index: Option<usize>,
}

impl Scope {
    pub(crate) fn root(reader: Arc<ReaderInner>, method: u32) -> Self {
        Self {
            reader,
            method,
            index: None,
        }
    }

    fn with_index(&self, index: usize) -> Self {
        Self {
            reader: self.reader.clone(),
            method: self.method,
            index: Some(index),
        }
    }

    fn method_record<'a>(&self, state: &'a ReaderState) -> Result<&'a MethodInfo, Error> {
        state
            .info()
            .method_record(self.method)
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// The recorded scope, `None` for the root scope.
    fn record<'a>(&self, state: &'a ReaderState) -> Result<Option<&'a ScopeInfo>, Error> {
        match self.index {
            None => Ok(None),
            Some(index) => state
                .info()
                .scope(index)
                .map(Some)
                .ok_or_else(|| ErrorKind::NotFound.into()),
        }
    }

    fn range(&self) -> Result<(u32, u32), Error> {
        let state = self.reader.state()?;
        if let Some(scope) = self.record(&state)? {
            return Ok((scope.start_offset(), scope.end_offset()));
        }

        let info = state.info();
        let mut range = None;
        for &index in self.method_record(&state)?.root_scopes() {
            let scope = info.scope(index).ok_or(ErrorKind::NotFound)?;
            range = Some(match range {
                None => (scope.start_offset(), scope.end_offset()),
                Some((start, end)) => (
                    u32::min(start, scope.start_offset()),
                    u32::max(end, scope.end_offset()),
                ),
            });
        }
        Ok(range.unwrap_or((0, 0)))
    }

    pub(crate) fn contains(&self, offset: u32) -> Result<bool, Error> {
        let (start, end) = self.range()?;
        Ok(start <= offset && offset < end)
    }

    /// The method this scope belongs to.
    pub fn method(&self) -> Result<Method, Error> {
        self.method_record(&*self.reader.state()?)?;
        Ok(Method::new(self.reader.clone(), self.method))
    }

    /// Returns true if this is the synthesized root scope of the method.
    pub fn is_root(&self) -> Result<bool, Error> {
        self.reader.state()?;
        Ok(self.index.is_none())
    }

    /// The IL offset of the first instruction in the scope.
    pub fn start_offset(&self) -> Result<u32, Error> {
        Ok(self.range()?.0)
    }

    /// The IL offset after the last instruction in the scope.
    pub fn end_offset(&self) -> Result<u32, Error> {
        Ok(self.range()?.1)
    }

    /// The enclosing scope, `None` for the root scope.
    ///
    /// The outermost recorded scopes have the root scope as their parent.
    pub fn parent(&self) -> Result<Option<Scope>, Error> {
        let state = self.reader.state()?;
        Ok(match self.record(&state)? {
            None => None,
            Some(scope) => Some(match scope.parent() {
                Some(parent) => self.with_index(parent),
                None => Scope::root(self.reader.clone(), self.method),
            }),
        })
    }

    /// The directly nested scopes, ordered by start offset.
    pub fn children(&self) -> Result<Vec<Scope>, Error> {
        let state = self.reader.state()?;
        let indices = match self.record(&state)? {
            Some(scope) => scope.children(),
            None => self.method_record(&state)?.root_scopes(),
        };
        Ok(indices.iter().map(|&index| self.with_index(index)).collect())
    }

    /// The local variables declared in this scope.
    pub fn variables(&self) -> Result<Vec<Variable>, Error> {
        let state = self.reader.state()?;
        Ok(match self.record(&state)? {
            Some(scope) => scope
                .variables()
                .map(|index| Variable {
                    reader: self.reader.clone(),
                    method: self.method,
                    index,
                })
                .collect(),
            None => Vec::new(),
        })
    }

    /// The local constants declared in this scope.
    pub fn constants(&self) -> Result<Vec<Constant>, Error> {
        let state = self.reader.state()?;
        Ok(match self.record(&state)? {
            Some(scope) => scope
                .constants()
                .map(|index| Constant {
                    reader: self.reader.clone(),
                    index,
                })
                .collect(),
            None => Vec::new(),
        })
    }

    /// The namespaces imported by this scope.
    ///
    /// These are the imports of the scope's own import scope that name a namespace; imports of
    /// enclosing import scopes are not included.
    pub fn namespaces(&self) -> Result<Vec<Namespace>, Error> {
        let state = self.reader.state()?;
        let Some(import_scope) = self.record(&state)?.and_then(ScopeInfo::import_scope) else {
            return Ok(Vec::new());
        };
        let imports = state
            .info()
            .import_scopes()
            .get(import_scope)
            .ok_or(ErrorKind::NotFound)?
            .imports();

        Ok(imports
            .iter()
            .enumerate()
            .filter(|(_, import)| import.namespace().is_some())
            .map(|(import, _)| Namespace {
                reader: self.reader.clone(),
                import_scope,
                import,
            })
            .collect())
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.reader, &other.reader)
            && self.method == other.method
            && self.index == other.index
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Scope");
        s.field("method", &format_args!("{:#010x}", self.method))
            .field("index", &self.index);
        if let Ok((start, end)) = self.range() {
            s.field("range", &format_args!("{start:#x}..{end:#x}"));
        }
        s.finish()
    }
}

/// A local constant.
#[derive(Clone)]
pub struct Constant {
    reader: Arc<ReaderInner>,
    index: usize,
}

impl Constant {
    fn record<'a>(&self, state: &'a ReaderState) -> Result<&'a ConstantInfo, Error> {
        state
            .info()
            .constants()
            .get(self.index)
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// The name of the constant.
    pub fn name(&self) -> Result<String, Error> {
        let state = self.reader.state()?;
        Ok(self.record(&state)?.name().to_owned())
    }

    /// The value of the constant.
    ///
    /// `decimal` and `DateTime` values can only be interpreted with the names of their types,
    /// so reading them creates the reader's metadata import.
    pub fn value(&self) -> Result<ConstantValue, Error> {
        let state = self.reader.state()?;
        let data = self.record(&state)?.data();
        if data.type_token().is_none() {
            return Ok(data.resolve(|_| None)?);
        }
        let metadata = state.metadata()?;
        Ok(data.resolve(|token| metadata.type_name(token))?)
    }

    /// The type signature of the constant, without its value.
    pub fn signature(&self) -> Result<Vec<u8>, Error> {
        let state = self.reader.state()?;
        Ok(self.record(&state)?.signature().to_vec())
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.reader, &other.reader) && self.index == other.index
    }
}

impl Eq for Constant {}

impl fmt::Debug for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Constant");
        if let Ok(name) = self.name() {
            s.field("name", &name);
        }
        s.finish()
    }
}

/// A local variable.
#[derive(Clone)]
pub struct Variable {
    reader: Arc<ReaderInner>,
    method: u32,
    index: usize,
}

impl Variable {
    fn record<'a>(&self, state: &'a ReaderState) -> Result<&'a VariableInfo, Error> {
        state
            .info()
            .variables()
            .get(self.index)
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// Runs `f` on the variable record.
    fn with_record<R>(&self, f: impl FnOnce(&VariableInfo) -> R) -> Result<R, Error> {
        let state = self.reader.state()?;
        Ok(f(self.record(&state)?))
    }

    fn not_implemented(&self) -> Result<u32, Error> {
        self.with_record(|_| ())?;
        Err(ErrorKind::NotImplemented.into())
    }

    /// The name of the variable.
    pub fn name(&self) -> Result<String, Error> {
        self.with_record(|record| record.name().to_owned())
    }

    /// The slot of the variable in the method's local signature.
    pub fn slot(&self) -> Result<u32, Error> {
        self.with_record(|record| record.index().into())
    }

    /// The first address field, which is the [`slot`](Self::slot).
    pub fn address_field1(&self) -> Result<u32, Error> {
        self.slot()
    }

    /// Not recorded in Portable PDBs.
    pub fn address_field2(&self) -> Result<u32, Error> {
        self.not_implemented()
    }

    /// Not recorded in Portable PDBs.
    pub fn address_field3(&self) -> Result<u32, Error> {
        self.not_implemented()
    }

    /// Not recorded in Portable PDBs, variables live as long as their scope.
    pub fn start_offset(&self) -> Result<u32, Error> {
        self.not_implemented()
    }

    /// Not recorded in Portable PDBs, variables live as long as their scope.
    pub fn end_offset(&self) -> Result<u32, Error> {
        self.not_implemented()
    }

    /// How the variable is addressed, always [`ADDRESS_KIND_IL_OFFSET`].
    pub fn address_kind(&self) -> Result<u32, Error> {
        self.with_record(|_| ADDRESS_KIND_IL_OFFSET)
    }

    /// The raw attribute flags of the variable.
    pub fn attributes(&self) -> Result<u16, Error> {
        self.with_record(VariableInfo::attributes)
    }

    /// Returns true if the variable is compiler generated and hidden from the debugger.
    pub fn is_debugger_hidden(&self) -> Result<bool, Error> {
        self.with_record(VariableInfo::is_debugger_hidden)
    }

    /// The type signature of the variable.
    ///
    /// This is read from the method's local signature in the metadata of the compiled binary.
    pub fn signature(&self) -> Result<Vec<u8>, Error> {
        let state = self.reader.state()?;
        let slot = usize::from(self.record(&state)?.index());
        let token = state
            .info()
            .method_record(self.method)
            .and_then(MethodInfo::local_signature_token)
            .ok_or(ErrorKind::NotFound)?;

        let signature = state
            .metadata()?
            .local_signature(token)
            .ok_or(ErrorKind::NotFound)?;
        let slots = local_variable_signatures(&signature)?;
        slots.get(slot).map(|slot| slot.to_vec()).ok_or_else(|| {
            Error::new(
                ErrorKind::MalformedInput,
                format!("local signature {token:#010x} has no slot {slot}"),
            )
        })
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.reader, &other.reader) && self.index == other.index
    }
}

impl Eq for Variable {}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Variable");
        let record = self.with_record(|record| (record.name().to_owned(), record.index()));
        if let Ok((name, slot)) = record {
            s.field("name", &name).field("slot", &slot);
        }
        s.finish()
    }
}

/// A namespace imported by a scope.
#[derive(Clone)]
pub struct Namespace {
    reader: Arc<ReaderInner>,
    import_scope: usize,
    import: usize,
}

impl Namespace {
    /// The raw import.
    pub fn import(&self) -> Result<Import, Error> {
        self.reader
            .state()?
            .info()
            .import_scopes()
            .get(self.import_scope)
            .and_then(|scope| scope.imports().get(self.import))
            .cloned()
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// The imported namespace.
    pub fn name(&self) -> Result<String, Error> {
        self.import()?
            .namespace()
            .map(str::to_owned)
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// The alias the namespace is imported under, if any.
    pub fn alias(&self) -> Result<Option<String>, Error> {
        Ok(self.import()?.alias().map(str::to_owned))
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.reader, &other.reader)
            && self.import_scope == other.import_scope
            && self.import == other.import
    }
}

impl Eq for Namespace {}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Namespace");
        if let Ok(name) = self.name() {
            s.field("name", &name);
        }
        s.finish()
    }
}
