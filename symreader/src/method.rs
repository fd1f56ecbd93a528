use std::fmt;
use std::sync::Arc;

use symreader_ppdb::{AsyncMethodInfo, AsyncStepInfo, MethodInfo, SequencePoint};

use crate::document::Document;
use crate::reader::{ReaderInner, ReaderState};
use crate::scope::Scope;
use crate::{Error, ErrorKind};

/// A method with debug information.
///
/// Methods compare equal if they have the same token and belong to the same reader.
#[derive(Clone)]
pub struct Method {
    reader: Arc<ReaderInner>,
    token: u32,
}

impl Method {
    pub(crate) fn new(reader: Arc<ReaderInner>, token: u32) -> Self {
        Self { reader, token }
    }

    fn record<'a>(&self, state: &'a ReaderState) -> Result<&'a MethodInfo, Error> {
        state
            .info()
            .method(self.token)
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// Runs `f` on the method record.
    fn with_record<R>(&self, f: impl FnOnce(&MethodInfo) -> R) -> Result<R, Error> {
        let state = self.reader.state()?;
        Ok(f(self.record(&state)?))
    }

    /// Returns the sequence points in `document` whose lines include `line`, with their index.
    fn points_at(
        &self,
        points: &[SequencePoint],
        document: &Document,
        line: u32,
    ) -> Result<Vec<(usize, SequencePoint)>, Error> {
        let document = document.index_in(&self.reader)?;
        Ok(points
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, point)| {
                point.document == document
                    && !point.is_hidden()
                    && point.start_line <= line
                    && line <= point.end_line
            })
            .collect())
    }

    /// The `MethodDef` token of the method.
    pub fn token(&self) -> Result<u32, Error> {
        self.reader.state()?;
        Ok(self.token)
    }

    /// The synthesized outermost scope of the method.
    ///
    /// Its children are the outermost scopes recorded in the PDB, and it spans all of them.
    pub fn root_scope(&self) -> Result<Scope, Error> {
        self.with_record(|_| Scope::root(self.reader.clone(), self.token))
    }

    /// The innermost scope that contains the IL offset.
    pub fn scope_at_offset(&self, offset: u32) -> Result<Scope, Error> {
        let mut scope = self.root_scope()?;
        if !scope.contains(offset)? {
            return Err(ErrorKind::NotFound.into());
        }
        'descend: loop {
            for child in scope.children()? {
                if child.contains(offset)? {
                    scope = child;
                    continue 'descend;
                }
            }
            return Ok(scope);
        }
    }

    /// The sequence points of the method, ordered by IL offset.
    pub fn sequence_points(&self) -> Result<Vec<SequencePoint>, Error> {
        self.with_record(|record| record.sequence_points().to_vec())
    }

    /// The documents the method has sequence points in, in the order they are first referenced.
    pub fn documents(&self) -> Result<Vec<Document>, Error> {
        let state = self.reader.state()?;
        let mut indices = Vec::new();
        for point in self.record(&state)?.sequence_points() {
            if !indices.contains(&point.document) {
                indices.push(point.document);
            }
        }
        Ok(indices
            .into_iter()
            .map(|index| Document::new(self.reader.clone(), index))
            .collect())
    }

    /// The `StandAloneSig` token of the method's local variable signature.
    pub fn local_signature_token(&self) -> Result<Option<u32>, Error> {
        self.with_record(MethodInfo::local_signature_token)
    }

    /// Returns the IL offset of the sequence point that best matches the line.
    ///
    /// Among the sequence points spanning the line, the one starting closest to it wins, and
    /// among those the one with the lowest IL offset.
    pub fn il_offset(&self, document: &Document, line: u32, _column: u32) -> Result<u32, Error> {
        let state = self.reader.state()?;
        let points = self.record(&state)?.sequence_points();
        self.points_at(points, document, line)?
            .into_iter()
            .min_by_key(|(_, point)| (line - point.start_line, point.il_offset))
            .map(|(_, point)| point.il_offset)
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// Returns the IL ranges of all sequence points spanning the line.
    ///
    /// A range ends where the next sequence point starts. The last sequence point of the method
    /// extends to the end of the root scope.
    pub fn ranges(
        &self,
        document: &Document,
        line: u32,
        _column: u32,
    ) -> Result<Vec<(u32, u32)>, Error> {
        let state = self.reader.state()?;
        let points = self.record(&state)?.sequence_points();
        let method_end = match self.root_scope()?.end_offset()? {
            0 => u32::MAX,
            end => end,
        };

        Ok(self
            .points_at(points, document, line)?
            .into_iter()
            .map(|(index, point)| {
                let end = points
                    .get(index + 1)
                    .map_or(method_end, |next| next.il_offset);
                (point.il_offset, end.max(point.il_offset))
            })
            .collect())
    }

    /// Returns the first and last line the method covers in the document.
    pub fn source_extent(&self, document: &Document) -> Result<(u32, u32), Error> {
        let document = document.index_in(&self.reader)?;
        let state = self.reader.state()?;
        let extent = self
            .record(&state)?
            .sequence_points()
            .iter()
            .filter(|point| point.document == document && !point.is_hidden())
            .fold(None, |extent, point| match extent {
                None => Some((point.start_line, point.end_line)),
                Some((start, end)) => Some((
                    u32::min(start, point.start_line),
                    u32::max(end, point.end_line),
                )),
            });
        extent.ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// Returns true if this is the `MoveNext` method of an async state machine.
    pub fn is_async(&self) -> Result<bool, Error> {
        self.with_record(|record| record.async_info().is_some())
    }

    /// The async stepping information, if this is the `MoveNext` method of an async state
    /// machine.
    pub fn async_info(&self) -> Result<Option<AsyncMethod>, Error> {
        self.with_record(|record| {
            record.async_info().map(|_| AsyncMethod {
                method: self.clone(),
            })
        })
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.reader, &other.reader) && self.token == other.token
    }
}

impl Eq for Method {}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("token", &format_args!("{:#010x}", self.token))
            .finish()
    }
}

/// The `MoveNext` method of an async state machine.
#[derive(Clone, PartialEq, Eq)]
pub struct AsyncMethod {
    method: Method,
}

impl AsyncMethod {
    fn record<'a>(&self, state: &'a ReaderState) -> Result<&'a AsyncMethodInfo, Error> {
        self.method
            .record(state)?
            .async_info()
            .ok_or_else(|| ErrorKind::NotFound.into())
    }

    /// Runs `f` on the async stepping record.
    fn with_record<R>(&self, f: impl FnOnce(&AsyncMethodInfo) -> R) -> Result<R, Error> {
        let state = self.method.reader.state()?;
        Ok(f(self.record(&state)?))
    }

    /// The `MoveNext` method itself.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The `MethodDef` token of the user method that started the state machine.
    pub fn kickoff_method(&self) -> Result<u32, Error> {
        self.with_record(AsyncMethodInfo::kickoff_method)
    }

    /// Returns true if the method has a catch handler that forwards exceptions to the awaiter.
    pub fn has_catch_handler(&self) -> Result<bool, Error> {
        self.with_record(|record| record.catch_handler_offset().is_some())
    }

    /// The IL offset of the catch handler.
    ///
    /// Fails with [`ErrorKind::Unexpected`] if there is no catch handler.
    pub fn catch_handler_offset(&self) -> Result<u32, Error> {
        self.with_record(AsyncMethodInfo::catch_handler_offset)?
            .ok_or_else(|| Error::new(ErrorKind::Unexpected, "async method has no catch handler"))
    }

    /// The await points of the method.
    pub fn step_info(&self) -> Result<Vec<AsyncStepInfo>, Error> {
        self.with_record(|record| record.steps().to_vec())
    }
}

impl fmt::Debug for AsyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncMethod")
            .field("method", &self.method)
            .finish()
    }
}
