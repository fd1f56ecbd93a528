//! Explicit reference counting of symbol reader handles.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{Error, ErrorKind};

/// The outcome of [`SymReader::release`](crate::SymReader::release).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseStatus {
    /// This call dropped the last reference and the reader is now invalid.
    Released,
    /// Other references remain and the reader stays usable.
    Retained,
    /// The reader had already been released before this call.
    AlreadyReleased,
}

/// A reference count that starts at one and can never be revived once it reaches zero.
#[derive(Debug)]
pub(crate) struct RefCount(AtomicUsize);

impl RefCount {
    pub(crate) fn new() -> Self {
        Self(AtomicUsize::new(1))
    }

    /// Returns an error if the count has reached zero.
    pub(crate) fn check(&self) -> Result<(), Error> {
        match self.0.load(Ordering::Acquire) {
            0 => Err(ErrorKind::InvalidState.into()),
            _ => Ok(()),
        }
    }

    /// Adds a reference and returns the new count.
    pub(crate) fn add_ref(&self) -> Result<usize, Error> {
        let previous = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count != 0).then(|| count + 1)
            })
            .map_err(|_| Error::from(ErrorKind::InvalidState))?;
        Ok(previous + 1)
    }

    /// Drops a reference.
    pub(crate) fn release(&self) -> ReleaseStatus {
        let result = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        match result {
            Ok(1) => ReleaseStatus::Released,
            Ok(_) => ReleaseStatus::Retained,
            Err(_) => ReleaseStatus::AlreadyReleased,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_transitions() {
        let count = RefCount::new();
        assert_eq!(count.add_ref().unwrap(), 2);
        assert_eq!(count.release(), ReleaseStatus::Retained);
        assert!(count.check().is_ok());
        assert_eq!(count.release(), ReleaseStatus::Released);
        assert_eq!(count.release(), ReleaseStatus::AlreadyReleased);
        assert_eq!(count.check().unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(count.add_ref().unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_concurrent_release() {
        let count = RefCount::new();
        for _ in 0..7 {
            count.add_ref().unwrap();
        }

        let released = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| count.release())).collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|status| *status == ReleaseStatus::Released)
                .count()
        });

        assert_eq!(released, 1);
        assert!(count.check().is_err());
    }
}
