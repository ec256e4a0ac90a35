//! Page Objects
//!
//! One [`Page`] owns one OS-page-sized, anonymous, private mapping. Pages are
//! born with no access permissions; the storage operations open narrow
//! read/write windows around the actual byte transfer by flipping protection
//! with [`Page::unprotect`] and [`Page::protect`].
//!
//! Every live page is registered in the fault interceptor's address index so
//! that an illegal access can be attributed to this crate from signal
//! context. The registration is cleared before the mapping is removed.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use nix::libc;

use crate::fault;
use crate::stats;
use crate::storage::LsaError;

/// Cached system page size. Zero until first discovery.
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// System page size in bytes, discovered once and cached.
pub fn page_size() -> usize {
    let cached = PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }
    // SAFETY: sysconf(_SC_PAGESIZE) is always safe and returns a positive value.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize };
    PAGE_SIZE.store(size, Ordering::Relaxed);
    size
}

/// Page size as last cached, without discovery.
///
/// For signal context, where calling `sysconf` is off the table. Returns 0
/// if no page has ever been mapped, in which case no fault can belong to us.
#[inline]
pub(crate) fn cached_page_size() -> usize {
    PAGE_SIZE.load(Ordering::Relaxed)
}

/// One page-sized, page-aligned, anonymous private mapping.
///
/// Shared between storage areas through `Arc<Page>`; the strong count is the
/// page's reference count. The mapping lives exactly as long as the object:
/// `munmap` happens in `Drop`, once, when the last referencing area lets go.
pub(crate) struct Page {
    base: usize,
    slot: &'static AtomicUsize,
}

impl Page {
    /// Map a fresh page with no access permissions.
    pub(crate) fn map_protected() -> Result<Self, LsaError> {
        Self::map(libc::PROT_NONE)
    }

    /// Map a fresh page readable and writable.
    ///
    /// Used for copy-on-write replacements inside an open write window; the
    /// window's final pass re-protects it along with the rest of the area.
    pub(crate) fn map_writable() -> Result<Self, LsaError> {
        Self::map(libc::PROT_READ | libc::PROT_WRITE)
    }

    fn map(prot: libc::c_int) -> Result<Self, LsaError> {
        let len = page_size();
        // SAFETY: anonymous private mapping, kernel-chosen address, no fd.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                prot,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(LsaError::Map(std::io::Error::last_os_error()));
        }
        let base = addr as usize;
        let slot = fault::index_register(base);
        stats::record_page_mapped();
        Ok(Self { base, slot })
    }

    /// Base address of the mapping. Always page-aligned.
    #[inline]
    pub(crate) fn base(&self) -> usize {
        self.base
    }

    /// Base address as a raw pointer.
    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.base as *mut u8
    }

    /// Strip all access permissions.
    pub(crate) fn protect(&self) -> Result<(), LsaError> {
        self.set_protection(libc::PROT_NONE)
    }

    /// Grant read and write access.
    pub(crate) fn unprotect(&self) -> Result<(), LsaError> {
        self.set_protection(libc::PROT_READ | libc::PROT_WRITE)
    }

    fn set_protection(&self, prot: libc::c_int) -> Result<(), LsaError> {
        // SAFETY: base and length describe exactly the mapping created in
        // map(), which is still alive because &self proves the page is.
        let ret = unsafe { libc::mprotect(self.base as *mut libc::c_void, page_size(), prot) };
        if ret != 0 {
            return Err(LsaError::Protect(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        // Deregister first so the interceptor stops claiming this address.
        fault::index_clear(self.slot);
        // SAFETY: the mapping was created by map() with this base and length,
        // and Drop runs exactly once.
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, page_size());
        }
        stats::record_page_unmapped();
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page").field("base", &format_args!("{:#x}", self.base)).finish()
    }
}
