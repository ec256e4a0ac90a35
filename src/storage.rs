//! Storage API
//!
//! The five operations a thread uses to manage its local storage area:
//! [`create`], [`destroy`], [`read`], [`write`], and [`clone_from`]. Each
//! operation acts on behalf of the calling thread; the only cross-thread
//! input is the target identity passed to `clone_from`.
//!
//! # Example
//!
//! ```rust,ignore
//! use lsa_runtime as lsa;
//!
//! lsa::create(8192)?;
//! lsa::write(0, b"hello")?;
//!
//! let mut out = [0u8; 5];
//! lsa::read(0, &mut out)?;
//! assert_eq!(&out, b"hello");
//!
//! lsa::destroy()?;
//! ```
//!
//! Another thread shares the bytes by cloning:
//!
//! ```rust,ignore
//! // In the owning thread:
//! let tid = lsa::ThreadId::current();
//! // ...hand `tid` to the other thread...
//!
//! // In the cloning thread:
//! lsa::clone_from(tid)?;
//! ```
//!
//! After a clone both threads read identical bytes; the first write by
//! either thread to a given page gives that thread a private copy of just
//! that page.

use std::fmt;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::area::Area;
use crate::log;
use crate::registry::{registry, AreaHandle, ThreadId};

/// Error returned by the storage operations.
#[derive(Debug)]
pub enum LsaError {
    /// The calling thread already owns a storage area.
    AlreadyRegistered,
    /// The calling thread owns no storage area.
    NotRegistered,
    /// The clone target owns no storage area.
    TargetNotRegistered(ThreadId),
    /// `create` was asked for a zero-byte area.
    ZeroSize,
    /// A read or write range overflows or extends past the area.
    OutOfBounds {
        /// Requested starting offset.
        offset: usize,
        /// Requested transfer length.
        len: usize,
        /// The area's byte size.
        size: usize,
    },
    /// Mapping a page failed.
    Map(io::Error),
    /// Changing a page's protection failed.
    Protect(io::Error),
}

impl fmt::Display for LsaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LsaError::AlreadyRegistered => {
                write!(f, "calling thread already owns a storage area")
            }
            LsaError::NotRegistered => {
                write!(f, "calling thread owns no storage area")
            }
            LsaError::TargetNotRegistered(tid) => {
                write!(f, "target thread {} owns no storage area", tid)
            }
            LsaError::ZeroSize => write!(f, "storage area size must be greater than zero"),
            LsaError::OutOfBounds { offset, len, size } => write!(
                f,
                "offset {} plus length {} exceeds storage area of {} bytes",
                offset, len, size
            ),
            LsaError::Map(err) => write!(f, "page mapping failed: {}", err),
            LsaError::Protect(err) => write!(f, "page protection change failed: {}", err),
        }
    }
}

impl std::error::Error for LsaError {}

/// Create a storage area of `size` bytes for the calling thread.
///
/// The area is backed by `ceil(size / page_size)` freshly mapped pages, all
/// fully protected at return. Fails if the caller already owns an area, if
/// `size` is zero, or if any mapping fails (in which case everything mapped
/// so far is rolled back).
pub fn create(size: usize) -> Result<(), LsaError> {
    crate::ensure_initialized();
    let tid = ThreadId::current();
    if registry().lookup(tid).is_some() {
        return Err(LsaError::AlreadyRegistered);
    }
    let area = match Area::new(size) {
        Ok(area) => area,
        Err(err) => {
            log::error(format!("create({}) failed: {}", size, err));
            return Err(err);
        }
    };
    log::Entry::new(log::Level::Debug, "storage area created")
        .field_str("thread", tid.to_string())
        .field_int("bytes", size as i64)
        .field_int("pages", area.page_count() as i64)
        .emit();
    registry().insert(
        tid,
        Arc::new(AreaHandle {
            owner: tid,
            area: Mutex::new(area),
        }),
    );
    Ok(())
}

/// Destroy the calling thread's storage area.
///
/// Exclusive pages are unmapped; shared pages have their reference count
/// decremented and remain valid for the other holders. Fails if the caller
/// owns no area.
pub fn destroy() -> Result<(), LsaError> {
    crate::ensure_initialized();
    let tid = ThreadId::current();
    let handle = registry().remove(tid).ok_or(LsaError::NotRegistered)?;
    log::Entry::new(log::Level::Debug, "storage area destroyed")
        .field_str("thread", tid.to_string())
        .emit();
    drop(handle);
    Ok(())
}

/// Read `buf.len()` bytes starting at byte `offset` into `buf`.
///
/// Fails if the caller owns no area or if `offset + buf.len()` exceeds the
/// area's size; the addition itself is overflow-checked. Reading never
/// copies a shared page.
pub fn read(offset: usize, buf: &mut [u8]) -> Result<(), LsaError> {
    crate::ensure_initialized();
    let tid = ThreadId::current();
    let handle = registry().lookup(tid).ok_or(LsaError::NotRegistered)?;
    let area = handle.area.lock();
    area.read(offset, buf)
}

/// Write `buf` into the area starting at byte `offset`.
///
/// Same precondition checks as [`read`]. Writing into a shared page first
/// splits it, so the bytes of every other thread's area are untouched.
pub fn write(offset: usize, buf: &[u8]) -> Result<(), LsaError> {
    crate::ensure_initialized();
    let tid = ThreadId::current();
    let handle = registry().lookup(tid).ok_or(LsaError::NotRegistered)?;
    let mut area = handle.area.lock();
    area.write(offset, buf)
}

/// Give the calling thread a copy-on-write clone of `target`'s area.
///
/// The new area has the same size and shares every page with the target;
/// reference counts rise by one and no bytes are copied. Fails if the
/// caller already owns an area or if `target` owns none.
pub fn clone_from(target: ThreadId) -> Result<(), LsaError> {
    crate::ensure_initialized();
    let tid = ThreadId::current();
    if registry().lookup(tid).is_some() {
        return Err(LsaError::AlreadyRegistered);
    }
    let target_handle = registry()
        .lookup(target)
        .ok_or(LsaError::TargetNotRegistered(target))?;
    let shared = {
        let target_area = target_handle.area.lock();
        Area::sharing(&target_area)
    };
    log::Entry::new(log::Level::Debug, "storage area cloned")
        .field_str("thread", tid.to_string())
        .field_str("source", target.to_string())
        .field_int("bytes", shared.size() as i64)
        .emit();
    registry().insert(
        tid,
        Arc::new(AreaHandle {
            owner: tid,
            area: Mutex::new(shared),
        }),
    );
    Ok(())
}

/// Base addresses of the calling thread's backing pages, in page order.
///
/// Diagnostic introspection: lets tools and tests observe page sharing and
/// copy-on-write divergence without touching protected memory. The
/// addresses must not be dereferenced; the pages are protected.
pub fn page_addresses() -> Result<Vec<usize>, LsaError> {
    crate::ensure_initialized();
    let tid = ThreadId::current();
    let handle = registry().lookup(tid).ok_or(LsaError::NotRegistered)?;
    let area = handle.area.lock();
    Ok(area.page_bases())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every test pairs create with destroy before its thread exits: thread
    // identities are reused by the OS, and a leaked registry entry would
    // make an unrelated later test's create() fail.

    #[test]
    fn test_create_write_read_destroy() {
        create(8192).unwrap();
        write(0, b"hello").unwrap();
        let mut out = [0u8; 5];
        read(0, &mut out).unwrap();
        assert_eq!(&out, b"hello");
        destroy().unwrap();
    }

    #[test]
    fn test_create_twice_fails() {
        create(4096).unwrap();
        assert!(matches!(create(4096), Err(LsaError::AlreadyRegistered)));
        destroy().unwrap();
    }

    #[test]
    fn test_create_zero_fails() {
        assert!(matches!(create(0), Err(LsaError::ZeroSize)));
    }

    #[test]
    fn test_destroy_without_create_fails() {
        assert!(matches!(destroy(), Err(LsaError::NotRegistered)));
    }

    #[test]
    fn test_create_again_after_destroy() {
        create(4096).unwrap();
        destroy().unwrap();
        create(100).unwrap();
        destroy().unwrap();
    }

    #[test]
    fn test_read_write_without_area_fail() {
        let mut out = [0u8; 1];
        assert!(matches!(read(0, &mut out), Err(LsaError::NotRegistered)));
        assert!(matches!(write(0, &out), Err(LsaError::NotRegistered)));
    }

    #[test]
    fn test_clone_from_unknown_target_fails() {
        // This thread has no area; neither does the (bogus) target.
        let bogus = ThreadId::current();
        // Self-clone with no area registered: the target lookup fails.
        assert!(matches!(
            clone_from(bogus),
            Err(LsaError::TargetNotRegistered(_))
        ));
    }

    #[test]
    fn test_clone_when_already_owning_fails() {
        create(4096).unwrap();
        assert!(matches!(
            clone_from(ThreadId::current()),
            Err(LsaError::AlreadyRegistered)
        ));
        destroy().unwrap();
    }

    #[test]
    fn test_page_addresses_reports_backing_pages() {
        let ps = crate::page_size();
        create(2 * ps).unwrap();
        let addrs = page_addresses().unwrap();
        assert_eq!(addrs.len(), 2);
        assert!(addrs.iter().all(|a| a % ps == 0));
        destroy().unwrap();
    }

    #[test]
    fn test_error_display() {
        assert!(LsaError::ZeroSize.to_string().contains("zero"));
        let err = LsaError::OutOfBounds {
            offset: 4,
            len: 10,
            size: 8,
        };
        let text = err.to_string();
        assert!(text.contains('4') && text.contains("10") && text.contains('8'));
    }
}
