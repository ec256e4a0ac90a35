//! Storage Area Descriptors
//!
//! An [`Area`] is the descriptor behind one thread's storage: the byte size
//! it exposes and the ordered pages backing it. Byte offset `i` lives on
//! page `i / page_size` at intra-page offset `i % page_size`.
//!
//! Pages are shared between areas by cloning their `Arc`; the strong count
//! is the page's reference count. An area entering a write on a page whose
//! count exceeds one first replaces it with a private copy (copy-on-write),
//! so no write ever lands on bytes another area can observe.
//!
//! Reads and writes open a window: every page of the area is unprotected,
//! the bytes are moved, and every page is re-protected. Outside that window
//! the backing memory is inaccessible to anyone, including the owner.

use std::sync::Arc;

use crate::page::{self, Page};
use crate::stats;
use crate::storage::LsaError;

/// Descriptor for one storage area.
pub(crate) struct Area {
    size: usize,
    pages: Vec<Arc<Page>>,
}

impl Area {
    /// Allocate an area of `size` bytes backed by fully protected pages.
    ///
    /// If any page mapping fails, the pages mapped so far are unmapped again
    /// (dropping the vector rolls them back) and the whole operation fails.
    pub(crate) fn new(size: usize) -> Result<Self, LsaError> {
        if size == 0 {
            return Err(LsaError::ZeroSize);
        }
        let page_count = size.div_ceil(page::page_size());
        let mut pages = Vec::with_capacity(page_count);
        for _ in 0..page_count {
            pages.push(Arc::new(Page::map_protected()?));
        }
        stats::record_area_created();
        Ok(Self { size, pages })
    }

    /// Build an area sharing another area's pages.
    ///
    /// No bytes are copied; each page's reference count rises by one. The
    /// first write by either holder to a given page splits that page only.
    pub(crate) fn sharing(other: &Area) -> Self {
        let pages = other.pages.iter().map(Arc::clone).collect();
        stats::record_area_created();
        Self {
            size: other.size,
            pages,
        }
    }

    /// User-visible byte size.
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Number of backing pages.
    pub(crate) fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Base addresses of the backing pages, in order.
    pub(crate) fn page_bases(&self) -> Vec<usize> {
        self.pages.iter().map(|p| p.base()).collect()
    }

    /// Reject ranges that overflow or extend past the area.
    fn check_range(&self, offset: usize, len: usize) -> Result<(), LsaError> {
        let end = offset.checked_add(len).ok_or(LsaError::OutOfBounds {
            offset,
            len,
            size: self.size,
        })?;
        if end > self.size {
            return Err(LsaError::OutOfBounds {
                offset,
                len,
                size: self.size,
            });
        }
        Ok(())
    }

    fn unprotect_all(&self) -> Result<(), LsaError> {
        for (opened, page) in self.pages.iter().enumerate() {
            if let Err(err) = page.unprotect() {
                for page in &self.pages[..opened] {
                    let _ = page.protect();
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Re-protect every page, reporting the first failure but visiting all.
    fn protect_all(&self) -> Result<(), LsaError> {
        let mut result = Ok(());
        for page in &self.pages {
            if let Err(err) = page.protect() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Copy `buf.len()` bytes starting at byte `offset` into `buf`.
    ///
    /// Shared pages are readable as-is; reading never splits a page.
    pub(crate) fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), LsaError> {
        self.check_range(offset, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        self.unprotect_all()?;
        let ps = page::page_size();
        let mut copied = 0;
        while copied < buf.len() {
            let index = offset + copied;
            let page_offset = index % ps;
            let chunk = (ps - page_offset).min(buf.len() - copied);
            let src = self.pages[index / ps].as_ptr() as *const u8;
            // SAFETY: the page is unprotected, page_offset + chunk <= ps, and
            // buf has at least chunk bytes left at copied.
            unsafe {
                std::ptr::copy_nonoverlapping(src.add(page_offset), buf.as_mut_ptr().add(copied), chunk);
            }
            copied += chunk;
        }
        self.protect_all()
    }

    /// Copy `buf` into the area starting at byte `offset`.
    ///
    /// On entering each page of the range, a shared page is split before its
    /// first byte is written. A failed split aborts the write; pages already
    /// split stay split, which wastes memory but breaks no invariant.
    pub(crate) fn write(&mut self, offset: usize, buf: &[u8]) -> Result<(), LsaError> {
        self.check_range(offset, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        self.unprotect_all()?;
        let ps = page::page_size();
        let mut copied = 0;
        let mut result = Ok(());
        while copied < buf.len() {
            let index = offset + copied;
            let page_index = index / ps;
            let page_offset = index % ps;
            if let Err(err) = self.make_exclusive(page_index) {
                result = Err(err);
                break;
            }
            let chunk = (ps - page_offset).min(buf.len() - copied);
            let dst = self.pages[page_index].as_ptr();
            // SAFETY: the page is unprotected and exclusively owned;
            // bounds as in read().
            unsafe {
                std::ptr::copy_nonoverlapping(buf.as_ptr().add(copied), dst.add(page_offset), chunk);
            }
            copied += chunk;
        }
        result.and(self.protect_all())
    }

    /// Ensure page `page_index` is exclusively owned, splitting it if shared.
    ///
    /// Must run inside an open write window: the old page is readable and
    /// the replacement is mapped writable. The old mapping is re-protected
    /// before this area lets go of it; the remaining holders keep it alive
    /// and expect it armed.
    fn make_exclusive(&mut self, page_index: usize) -> Result<(), LsaError> {
        if Arc::strong_count(&self.pages[page_index]) == 1 {
            return Ok(());
        }
        let fresh = Page::map_writable()?;
        // SAFETY: source page is unprotected, destination was just mapped
        // readable and writable, both are exactly one page long.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.pages[page_index].as_ptr() as *const u8,
                fresh.as_ptr(),
                page::page_size(),
            );
        }
        let old = std::mem::replace(&mut self.pages[page_index], Arc::new(fresh));
        old.protect()?;
        drop(old);
        stats::record_cow_split();
        Ok(())
    }
}

impl Drop for Area {
    fn drop(&mut self) {
        stats::record_area_destroyed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::page_size;

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(Area::new(0), Err(LsaError::ZeroSize)));
    }

    #[test]
    fn test_page_count_rounds_up() {
        let ps = page_size();
        assert_eq!(Area::new(1).unwrap().page_count(), 1);
        assert_eq!(Area::new(ps).unwrap().page_count(), 1);
        assert_eq!(Area::new(ps + 1).unwrap().page_count(), 2);
        assert_eq!(Area::new(3 * ps).unwrap().page_count(), 3);
    }

    #[test]
    fn test_round_trip() {
        let mut area = Area::new(8192).unwrap();
        area.write(0, b"hello").unwrap();
        let mut out = [0u8; 5];
        area.read(0, &mut out).unwrap();
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn test_round_trip_across_page_boundary() {
        let ps = page_size();
        let mut area = Area::new(2 * ps).unwrap();
        let data: Vec<u8> = (0..64).map(|i| i as u8).collect();
        area.write(ps - 32, &data).unwrap();
        let mut out = vec![0u8; 64];
        area.read(ps - 32, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_bounds_checks() {
        let mut area = Area::new(100).unwrap();
        let mut buf = [0u8; 100];

        // offset + length == size succeeds.
        area.read(0, &mut buf).unwrap();
        area.write(0, &buf).unwrap();
        area.read(99, &mut buf[..1]).unwrap();

        // One past the end fails.
        assert!(matches!(
            area.read(1, &mut buf),
            Err(LsaError::OutOfBounds { .. })
        ));
        assert!(matches!(
            area.write(100, &buf[..1]),
            Err(LsaError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_bounds_check_overflow_safe() {
        let mut area = Area::new(4096).unwrap();
        let buf = [0u8; 1];
        assert!(matches!(
            area.write(usize::MAX, &buf),
            Err(LsaError::OutOfBounds { .. })
        ));
        let mut out = [0u8; 2];
        assert!(matches!(
            area.read(usize::MAX - 1, &mut out),
            Err(LsaError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_empty_transfer_is_ok() {
        let mut area = Area::new(10).unwrap();
        area.write(10, &[]).unwrap();
        let mut out = [];
        area.read(10, &mut out).unwrap();
    }

    #[test]
    fn test_sharing_is_identity_at_birth() {
        let mut first = Area::new(4096).unwrap();
        first.write(0, b"ABCD").unwrap();
        let second = Area::sharing(&first);
        assert_eq!(second.size(), first.size());
        assert_eq!(second.page_bases(), first.page_bases());
        let mut out = [0u8; 4];
        second.read(0, &mut out).unwrap();
        assert_eq!(&out, b"ABCD");
    }

    #[test]
    fn test_write_splits_shared_page() {
        let mut first = Area::new(4096).unwrap();
        first.write(0, b"ABCD").unwrap();
        let mut second = Area::sharing(&first);

        second.write(0, b"X").unwrap();

        let mut out = [0u8; 4];
        first.read(0, &mut out).unwrap();
        assert_eq!(&out, b"ABCD");
        second.read(0, &mut out).unwrap();
        assert_eq!(&out, b"XBCD");
        assert_ne!(second.page_bases()[0], first.page_bases()[0]);
    }

    #[test]
    fn test_split_is_local_to_touched_page() {
        let ps = page_size();
        let mut first = Area::new(2 * ps).unwrap();
        first.write(0, b"A").unwrap();
        first.write(ps, b"B").unwrap();
        let mut second = Area::sharing(&first);

        second.write(0, b"Z").unwrap();

        // Page 0 diverged, page 1 is still the same mapping.
        assert_ne!(second.page_bases()[0], first.page_bases()[0]);
        assert_eq!(second.page_bases()[1], first.page_bases()[1]);

        let mut out = [0u8; 1];
        first.read(ps, &mut out).unwrap();
        assert_eq!(&out, b"B");
        first.read(0, &mut out).unwrap();
        assert_eq!(&out, b"A");
        second.read(0, &mut out).unwrap();
        assert_eq!(&out, b"Z");
    }

    #[test]
    fn test_unshared_write_does_not_split() {
        let mut area = Area::new(4096).unwrap();
        let bases = area.page_bases();
        area.write(0, b"solo").unwrap();
        assert_eq!(area.page_bases(), bases);
    }

    #[test]
    fn test_multi_page_write_splits_each_shared_page() {
        let ps = page_size();
        let first = Area::new(2 * ps).unwrap();
        let mut second = Area::sharing(&first);

        let data = vec![0xEE; 2 * ps];
        second.write(0, &data).unwrap();
        assert_ne!(second.page_bases()[0], first.page_bases()[0]);
        assert_ne!(second.page_bases()[1], first.page_bases()[1]);

        let mut out = vec![0u8; 2 * ps];
        first.read(0, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
        second.read(0, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_dropping_sharer_keeps_pages_alive() {
        let mut first = Area::new(4096).unwrap();
        first.write(0, b"keep").unwrap();
        {
            let second = Area::sharing(&first);
            drop(second);
        }
        let mut out = [0u8; 4];
        first.read(0, &mut out).unwrap();
        assert_eq!(&out, b"keep");
    }
}
