//! The producer-side fast path.
//!
//! Producers are arbitrary user threads. The level check happens in the log
//! macros with a single atomic load (see [`Logger::enabled`]); everything
//! here runs only for admitted records: capture the timestamp and the
//! pid/tid/rank coordinates, format the message into a thread-local buffer,
//! build the [`Record`] and hand it to the transport.
//!
//! Producer-side failures are never surfaced to the logging caller. The
//! macros route them through [`report_producer_error`], which counts them
//! and writes each distinct error to stderr once.
//!
//! [`Logger::enabled`]: ../registry/struct.Logger.html#method.enabled
//! [`Record`]: ../record/struct.Record.html
//! [`report_producer_error`]: ./fn.report_producer_error.html

use crate::{
    error::{Error, Result},
    level::Level,
    record::Record,
    registry::Logger,
};
use lazy_static::lazy_static;
use ref_thread_local::RefThreadLocal;
use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    fmt,
    fmt::Write,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
    time::SystemTime,
};

/// Default initial size of the per-thread format buffer.
pub const DEFAULT_FORMAT_BUF_SIZE: usize = 128;

lazy_static! {
    // Cache the process id.
    #[doc(hidden)]
    pub static ref PID: u32 = std::process::id();

    static ref DISTINCT_PRODUCER_ERRORS: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
}

mod tid_cell {
    // Kept in its own module so this crate's `Result<T> = Result<T, Error>`
    // alias (imported in the parent module) doesn't shadow `std::Result`,
    // which the `ref_thread_local!` expansion below relies on.
    use super::kernel_tid;
    use ref_thread_local::ref_thread_local;

    ref_thread_local! {
        // Cache the kernel thread id.
        pub(super) static managed TID: u32 = kernel_tid();
    }
}
use tid_cell::TID;

thread_local! {
    /// Caller-assigned logical thread rank.
    static THREAD_RANK: Cell<Option<u16>> = Cell::new(None);

    /// The per-thread format buffer. Lazily allocated at the configured
    /// initial size; grows by doubling, then the payload is copied out at
    /// its exact size.
    static FORMAT_BUF: RefCell<String> =
        RefCell::new(String::with_capacity(format_buf_size()));
}

static FORMAT_BUF_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_FORMAT_BUF_SIZE);
static PRODUCER_ERROR_COUNT: AtomicU64 = AtomicU64::new(0);

#[cfg(target_os = "linux")]
fn kernel_tid() -> u32 {
    // SYS_gettid has no libc wrapper.
    unsafe { libc::syscall(libc::SYS_gettid) as u32 }
}

#[cfg(not(target_os = "linux"))]
fn kernel_tid() -> u32 {
    // No kernel tid available; fall back to the std thread id.
    // (rust-lang/rust #52780)
    let id: u64 = unsafe { std::mem::transmute(std::thread::current().id()) };
    id as u32
}

fn format_buf_size() -> usize {
    FORMAT_BUF_SIZE.load(Ordering::Relaxed)
}

/// Sets the initial size of per-thread format buffers. Takes effect for
/// threads whose buffer has not been allocated yet.
pub(crate) fn set_format_buf_size(size: usize) {
    FORMAT_BUF_SIZE.store(size.max(1), Ordering::Relaxed);
}

/// The cached kernel thread id of the calling thread.
pub fn tid() -> u32 {
    *TID.borrow()
}

/// Assigns the logical 16-bit rank of the calling thread, used in log
/// output to tell threads apart.
pub fn set_thread_rank(rank: u16) {
    THREAD_RANK.with(|cell| cell.set(Some(rank)));
}

/// The logical rank of the calling thread: the assigned rank, or the kernel
/// thread id modulo 2^16 when unset.
pub fn thread_rank() -> u16 {
    THREAD_RANK.with(|cell| match cell.get() {
        Some(rank) => rank,
        None => tid() as u16,
    })
}

/// Builds and enqueues a record for an already admitted level.
///
/// The level check belongs to the caller (the macros do it inline); this
/// function formats unconditionally.
pub fn submit(
    logger: &Logger,
    level: Level,
    file: &str,
    line: u32,
    func: &str,
    args: fmt::Arguments,
) -> Result<()> {
    let payload = FORMAT_BUF.with(|buffer| {
        let mut buffer = buffer.borrow_mut();
        buffer.clear();
        // Infallible for String.
        let _ = buffer.write_fmt(args);
        buffer.clone()
    });
    enqueue(logger, level, file, line, func, payload)
}

/// `submit` without formatting, for callers (and language bindings) holding
/// a pre-built message.
pub fn submit_rawstr(
    logger: &Logger,
    level: Level,
    file: &str,
    line: u32,
    func: &str,
    rawstr: &str,
) -> Result<()> {
    enqueue(logger, level, file, line, func, rawstr.to_string())
}

fn enqueue(
    logger: &Logger,
    level: Level,
    file: &str,
    line: u32,
    func: &str,
    payload: String,
) -> Result<()> {
    let record = Record::new(
        logger.name(),
        payload,
        level,
        SystemTime::now(),
        *PID,
        tid(),
        thread_rank(),
        file,
        func,
        line,
    );
    crate::lifecycle::dispatch(record)
}

/// Counts a producer-side error and writes it to stderr if this rendering
/// has not been reported before.
pub fn report_producer_error(error: &Error) {
    PRODUCER_ERROR_COUNT.fetch_add(1, Ordering::Relaxed);
    let rendered = error.to_string();
    let mut seen = DISTINCT_PRODUCER_ERRORS
        .lock()
        .expect("producer error set poisoned");
    if seen.insert(rendered.clone()) {
        eprintln!("fanlog: {}", rendered);
    }
}

/// Total number of producer-side errors since process start.
pub fn producer_error_count() -> u64 {
    PRODUCER_ERROR_COUNT.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_defaults_to_tid_modulo() {
        let expected = tid() as u16;
        assert_eq!(thread_rank(), expected);
    }

    #[test]
    fn rank_can_be_assigned_per_thread() {
        std::thread::spawn(|| {
            set_thread_rank(42);
            assert_eq!(thread_rank(), 42);
        })
        .join()
        .unwrap();
        // Other threads are unaffected.
        assert_eq!(thread_rank(), tid() as u16);
    }

    #[test]
    fn tid_is_stable_within_a_thread() {
        assert_eq!(tid(), tid());
    }

    #[test]
    fn distinct_errors_are_counted() {
        let before = producer_error_count();
        let err: Error = crate::error::ErrorKind::Itc("distinct test error".to_string()).into();
        report_producer_error(&err);
        report_producer_error(&err);
        assert_eq!(producer_error_count(), before + 2);
    }
}
