//! Fixed-size, allocation-free, type-erased tasks.
//!
//! A [`Task`] packs a closure (or a bare function pointer and its argument)
//! into a value exactly one cache line long, so that arrays and queues of
//! tasks shared between worker threads never place two tasks on the same
//! line. Tasks are meant to be stored, stolen and run by a scheduler that
//! lives outside this crate.
//!
//! Running a task and releasing the state it captured are two separate
//! steps: [`Task::execute`] invokes the closure and may be called any number
//! of times, while [`Task::cleanup`] drops the captured state and returns the
//! task to the empty state, ready to be loaded again. This lets a scheduler
//! decide *when* captures are dropped independently of when the work ran.
//!
//! Every task also carries a small integer [metadata tag](Task::metadata)
//! stored outside the capture buffer, for scheduler bookkeeping such as
//! generation counters or priorities.
//!
//! # Examples
//!
//! ```
//! use hypha::Task;
//! use std::sync::{
//!     atomic::{AtomicUsize, Ordering},
//!     Arc,
//! };
//!
//! let runs = Arc::new(AtomicUsize::new(0));
//! let mut task = Task::new({
//!     let runs = runs.clone();
//!     move || {
//!         runs.fetch_add(1, Ordering::Relaxed);
//!     }
//! });
//!
//! task.execute();
//! task.execute();
//! assert_eq!(runs.load(Ordering::Relaxed), 2);
//!
//! // the task still owns its clone of `runs` until it is cleaned up.
//! assert_eq!(Arc::strong_count(&runs), 2);
//! task.cleanup();
//! assert_eq!(Arc::strong_count(&runs), 1);
//! assert!(!task.is_loaded());
//! ```
//!
//! # Configuration
//!
//! The cache-line size and the default metadata type are fixed per build by
//! cargo features:
//!
//! - `cache-line-32`, `cache-line-64`, `cache-line-128` set
//!   [`CACHE_LINE_SIZE`]. Without any of them, tasks are 64 bytes.
//! - `metadata-u8`, `metadata-u16`, …, `metadata-i64` choose
//!   [`DefaultMetadata`]. Without any of them, it is `u16`.
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

#[macro_use]
pub(crate) mod util;
#[cfg(test)]
pub(crate) mod loom;

mod cache;
pub mod error;
pub mod metadata;
pub mod task;

#[doc(inline)]
pub use self::cache::{CACHE_LINE_SIZE, MAX_CAPTURE_ALIGN};
#[doc(inline)]
pub use self::error::CaptureError;
#[doc(inline)]
pub use self::metadata::{DefaultMetadata, Metadata};
#[doc(inline)]
pub use self::task::Task;
