//! Two-phase buffer queries.
//!
//! Tooling built around the native symbol reader interfaces asks for the size of a result
//! first and then calls again with a buffer of that size. The functions in this module
//! implement that convention on top of the sequences returned by the rest of the API:
//!
//! * With a zero-capacity buffer, the full count is returned together with [`Status::NoData`]
//!   and nothing is written.
//! * With a non-empty buffer, as many items as fit are written and their count is returned
//!   together with [`Status::Ok`].
//! * An empty result always yields `(0, Status::NoData)`.
//!
//! ```
//! use symreader::buffer::{fill_utf16, Status};
//!
//! let (required, status) = fill_utf16("C:\\a.cs", &mut []);
//! assert_eq!((required, status), (8, Status::NoData));
//!
//! let mut buf = vec![0; required];
//! assert_eq!(fill_utf16("C:\\a.cs", &mut buf), (8, Status::Ok));
//! assert_eq!(buf.last(), Some(&0));
//! ```

/// The outcome of a two-phase query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Items were written to the buffer.
    Ok,
    /// Nothing was written, either because only the count was requested or because the result
    /// is empty.
    NoData,
}

/// Moves up to `capacity` items into `out` and reports the count.
///
/// `out` is cleared first. Use this for results that cannot be written into a preallocated
/// slice, such as documents, methods, scopes, constants and variables.
pub fn fill<T>(items: Vec<T>, capacity: usize, out: &mut Vec<T>) -> (usize, Status) {
    out.clear();
    if items.is_empty() {
        return (0, Status::NoData);
    }
    if capacity == 0 {
        return (items.len(), Status::NoData);
    }
    out.extend(items.into_iter().take(capacity));
    (out.len(), Status::Ok)
}

/// Copies up to `buffer.len()` items into `buffer` and reports the count.
pub fn fill_slice<T: Clone>(items: &[T], buffer: &mut [T]) -> (usize, Status) {
    if items.is_empty() {
        return (0, Status::NoData);
    }
    if buffer.is_empty() {
        return (items.len(), Status::NoData);
    }
    let count = items.len().min(buffer.len());
    buffer[..count].clone_from_slice(&items[..count]);
    (count, Status::Ok)
}

/// Writes a string as NUL-terminated UTF-16 into `buffer`.
///
/// The reported count includes the terminator, so even the empty string has a count of 1.
pub fn fill_utf16(string: &str, buffer: &mut [u16]) -> (usize, Status) {
    let units: Vec<u16> = string.encode_utf16().chain(Some(0)).collect();
    fill_slice(&units, buffer)
}
