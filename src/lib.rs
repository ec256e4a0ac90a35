//! # LSA Runtime
//!
//! Per-thread **local storage areas**: page-granular, OS-protected byte
//! regions that are invisible to every other thread through normal memory
//! access and are mutated only through this crate's `read` and `write`
//! entry points, which open a transient protection window around the byte
//! transfer. Areas can be cloned between threads with copy-on-write
//! sharing: a clone costs no byte copies, and the first write by either
//! holder to a page gives that holder a private copy of just that page.
//!
//! A thread that touches an area's backing memory directly, its own or
//! another thread's, trips a memory-protection trap. The crate's fault
//! interceptor recognizes the address and terminates only the offending
//! thread; the rest of the process keeps running. Faults on unrelated
//! addresses keep their normal semantics.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        LSA RUNTIME                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │   ┌────────────┐   ┌────────────┐   ┌──────────────┐        │
//! │   │  Storage   │   │  Registry  │   │    Fault     │        │
//! │   │    API     │──▶│ (registry) │   │ Interceptor  │        │
//! │   │ (storage)  │   └────────────┘   │   (fault)    │        │
//! │   └─────┬──────┘                    └──────▲───────┘        │
//! │         │                                  │ page index     │
//! │   ┌─────▼──────┐   ┌────────────┐          │                │
//! │   │    Area    │──▶│    Page    │──────────┘                │
//! │   │  (area)    │   │  (page)    │                           │
//! │   └────────────┘   └────────────┘                           │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use lsa_runtime as lsa;
//!
//! lsa::create(8192)?;
//! lsa::write(0, b"hello")?;
//! let mut out = [0u8; 5];
//! lsa::read(0, &mut out)?;
//! lsa::destroy()?;
//! ```
//!
//! ## Platform
//!
//! Unix only: the implementation relies on anonymous private mappings with
//! adjustable protection, `SA_SIGINFO` trap delivery with the faulting
//! address, and per-thread termination.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod area;
mod fault;
mod page;
mod registry;

pub mod config;
pub mod log;
pub mod stats;
pub mod storage;

pub use page::page_size;
pub use registry::ThreadId;
pub use storage::{clone_from, create, destroy, page_addresses, read, write, LsaError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize process-wide state: configuration, page size, trap handlers.
///
/// Idempotent, and called implicitly by every storage operation; an
/// explicit call is only useful to front-load the signal-handler
/// installation before spawning threads.
pub fn init() {
    ensure_initialized();
}

/// One-shot lazy initialization, run before any operation proceeds.
pub(crate) fn ensure_initialized() {
    INIT.call_once(|| {
        let config = config::Config::from_env();
        config.apply();
        let ps = page::page_size();
        fault::install();
        log::Entry::new(log::Level::Debug, "lsa runtime initialized")
            .field_int("page_size", ps as i64)
            .emit();
    });
}
