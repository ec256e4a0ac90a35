//! Fault Interceptor
//!
//! Process-wide handler for memory-access traps (SIGSEGV, SIGBUS), plus the
//! address index it consults. The handler decides one question: does the
//! faulting address fall on a page owned by this crate? If so, the access
//! was an illegal touch of a protected storage area and only the offending
//! thread is terminated. If not, the fault is somebody else's problem: the
//! default dispositions are restored and the signal re-raised, so the
//! process dies with normal trap semantics.
//!
//! # Signal safety
//!
//! The handler runs in signal context and restricts itself to aligned atomic
//! loads, one `write(2)`, and a raw thread-exit syscall. It takes no locks
//! and allocates nothing. To make that possible, the set of live page base
//! addresses is mirrored outside signal context into an append-only chain of
//! chunks of atomic slots. A slot holds a page base or zero; claiming and
//! clearing happen on the mapping thread, the handler only ever reads.
//! Chunk memory is never freed (slots are reused), so a chunk pointer read
//! from the chain is valid forever.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use nix::libc;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::page;
use crate::stats;

const CHUNK_SLOTS: usize = 64;

/// A block of address slots. Chained, allocated on demand, never freed.
struct IndexChunk {
    slots: [AtomicUsize; CHUNK_SLOTS],
    next: AtomicPtr<IndexChunk>,
}

impl IndexChunk {
    fn new() -> Box<Self> {
        Box::new(Self {
            slots: std::array::from_fn(|_| AtomicUsize::new(0)),
            next: AtomicPtr::new(ptr::null_mut()),
        })
    }
}

/// Head of the chunk chain.
static INDEX_HEAD: AtomicPtr<IndexChunk> = AtomicPtr::new(ptr::null_mut());

/// Record a live page base in the index and return its slot.
///
/// Called from mapping code (never signal context). The returned slot stays
/// valid for the life of the process; [`index_clear`] releases it for reuse.
pub(crate) fn index_register(base: usize) -> &'static AtomicUsize {
    loop {
        let mut chunk_ptr = INDEX_HEAD.load(Ordering::Acquire);
        while !chunk_ptr.is_null() {
            // SAFETY: chunks are leaked at creation and never freed.
            let chunk = unsafe { &*chunk_ptr };
            for slot in &chunk.slots {
                if slot
                    .compare_exchange(0, base, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return slot;
                }
            }
            chunk_ptr = chunk.next.load(Ordering::Acquire);
        }
        push_chunk();
    }
}

/// Release a slot claimed by [`index_register`].
pub(crate) fn index_clear(slot: &'static AtomicUsize) {
    slot.store(0, Ordering::Release);
}

fn push_chunk() {
    let fresh = Box::into_raw(IndexChunk::new());
    let mut head = INDEX_HEAD.load(Ordering::Acquire);
    loop {
        // SAFETY: fresh is a valid leaked allocation owned by this chain.
        unsafe { (*fresh).next.store(head, Ordering::Release) };
        match INDEX_HEAD.compare_exchange(head, fresh, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => return,
            Err(current) => head = current,
        }
    }
}

/// Whether `base` is the base address of a live page. Signal-safe.
fn index_contains(base: usize) -> bool {
    if base == 0 {
        // Empty slots hold zero; a null-page fault must never match them.
        return false;
    }
    let mut chunk_ptr = INDEX_HEAD.load(Ordering::Acquire);
    while !chunk_ptr.is_null() {
        // SAFETY: chunks are leaked at creation and never freed.
        let chunk = unsafe { &*chunk_ptr };
        for slot in &chunk.slots {
            if slot.load(Ordering::Acquire) == base {
                return true;
            }
        }
        chunk_ptr = chunk.next.load(Ordering::Acquire);
    }
    false
}

/// Install the trap handler for SIGSEGV and SIGBUS.
///
/// Called once during process initialization, after the page size has been
/// captured.
pub(crate) fn install() {
    let action = SigAction::new(
        SigHandler::SigAction(handle_trap),
        SaFlags::SA_SIGINFO,
        SigSet::empty(),
    );
    // SAFETY: the handler body restricts itself to async-signal-safe
    // operations; see the module docs.
    unsafe {
        if let Err(err) = signal::sigaction(Signal::SIGSEGV, &action) {
            panic!("fault::install: sigaction(SIGSEGV) failed: {}", err);
        }
        if let Err(err) = signal::sigaction(Signal::SIGBUS, &action) {
            panic!("fault::install: sigaction(SIGBUS) failed: {}", err);
        }
    }
}

/// The trap handler.
///
/// Terminating the thread rather than the process is the contract that
/// separates an intercepted storage-area violation from a plain segfault.
/// The thread exit is a raw `SYS_exit` syscall: it ends only the calling
/// thread, performs no unwinding through the signal frame, and is the one
/// form of thread termination that is safe from here.
extern "C" fn handle_trap(sig: libc::c_int, info: *mut libc::siginfo_t, _ctx: *mut libc::c_void) {
    let ps = page::cached_page_size();
    // SAFETY: the kernel delivers a valid siginfo_t to SA_SIGINFO handlers.
    let addr = unsafe { (*info).si_addr() } as usize;
    let fault_base = if ps == 0 { 0 } else { addr & !(ps - 1) };

    if index_contains(fault_base) {
        stats::record_fault_intercepted();
        const MSG: &[u8] = b"lsa-runtime: illegal access to a protected storage page; terminating thread\n";
        // SAFETY: write(2) and the bare exit syscall are async-signal-safe.
        unsafe {
            libc::write(
                libc::STDERR_FILENO,
                MSG.as_ptr() as *const libc::c_void,
                MSG.len(),
            );
            libc::syscall(libc::SYS_exit, 0);
        }
        unreachable!("SYS_exit returned");
    }

    // Unrelated fault: hand back to the OS.
    // SAFETY: resetting dispositions and re-raising are async-signal-safe.
    unsafe {
        libc::signal(libc::SIGSEGV, libc::SIG_DFL);
        libc::signal(libc::SIGBUS, libc::SIG_DFL);
        libc::raise(sig);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_contains() {
        let slot = index_register(0x7000_0000_1000);
        assert!(index_contains(0x7000_0000_1000));
        index_clear(slot);
        assert!(!index_contains(0x7000_0000_1000));
    }

    #[test]
    fn test_zero_never_matches() {
        assert!(!index_contains(0));
    }

    #[test]
    fn test_slot_reuse_after_clear() {
        let slot = index_register(0x6000_0000_2000);
        index_clear(slot);
        let again = index_register(0x6000_0000_3000);
        assert!(index_contains(0x6000_0000_3000));
        index_clear(again);
    }

    #[test]
    fn test_index_grows_past_one_chunk() {
        let bases: Vec<usize> = (1..=2 * CHUNK_SLOTS).map(|i| 0x5000_0000_0000 + i * 0x1000).collect();
        let slots: Vec<_> = bases.iter().map(|&b| index_register(b)).collect();
        for &base in &bases {
            assert!(index_contains(base));
        }
        for slot in slots {
            index_clear(slot);
        }
        for &base in &bases {
            assert!(!index_contains(base));
        }
    }
}
