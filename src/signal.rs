//! The signal bridge.
//!
//! [`install_sighandler`] registers handlers for the fatal and termination
//! signals (SIGTERM, SIGINT, SIGSEGV, SIGBUS, SIGFPE, SIGILL, SIGABRT;
//! SIGQUIT is deliberately left alone). The handler itself only performs
//! async-signal-safe work: it posts the signal number to a self-pipe and
//! then waits, bounded, for the bridge thread to flush and finalize the
//! logging core. It finally restores the default disposition and re-raises
//! the original signal, so the process exits with the expected status.
//!
//! All drain and close work happens on the ordinary handler worker
//! threads, woken through the control channels by the bridge thread; the
//! internal threads keep these signals blocked so delivery always lands on
//! an application thread.
//!
//! [`install_sighandler`]: ./fn.install_sighandler.html

use crate::error::{illegal_state, Result};
use std::{
    sync::atomic::{AtomicBool, AtomicI32, Ordering},
    thread,
    time::Duration,
};

/// Deadline passed to the explicit flush triggered by a signal.
pub const SIGNAL_FLUSH_TIMEOUT: Duration = Duration::from_millis(200);

// Upper bound on how long the handler waits for the bridge to finish the
// flush+finalize sequence before re-raising. Covers the signal flush
// deadline plus the exit drain deadline with margin.
const SHUTDOWN_WAIT_STEPS: u32 = 400;
const SHUTDOWN_WAIT_STEP_MS: i64 = 10;

/// The signals the bridge takes over.
const FATAL_SIGNALS: [libc::c_int; 7] = [
    libc::SIGTERM,
    libc::SIGINT,
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGFPE,
    libc::SIGILL,
    libc::SIGABRT,
];

static INSTALLED: AtomicBool = AtomicBool::new(false);
static HANDLING: AtomicBool = AtomicBool::new(false);
static SHUTDOWN_DONE: AtomicBool = AtomicBool::new(false);
static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

/// Blocks the fatal signals in the calling thread. Internal threads
/// (handler workers, receiver readers, the bridge) call this so signal
/// delivery always lands on an application thread.
pub(crate) fn mask_fatal_signals() {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        for signal in &FATAL_SIGNALS {
            libc::sigaddset(&mut set, *signal);
        }
        libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
    }
}

fn restore_and_raise(signal: libc::c_int) {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = libc::SIG_DFL;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(signal, &action, std::ptr::null_mut());
        libc::raise(signal);
    }
}

extern "C" fn on_fatal_signal(signal: libc::c_int) {
    if HANDLING.swap(true, Ordering::SeqCst) {
        // A shutdown is already in progress. Returning from a synchronous
        // fault would re-execute the faulting instruction; die now.
        if signal == libc::SIGSEGV
            || signal == libc::SIGBUS
            || signal == libc::SIGFPE
            || signal == libc::SIGILL
        {
            restore_and_raise(signal);
        }
        return;
    }

    // Wake the bridge thread. A single write(2) is all the signal context
    // is allowed to do with the logging core.
    let fd = PIPE_WRITE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = signal as u8;
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }

    // Bounded wait for the bridge to flush and finalize; nanosleep and
    // atomic loads are async-signal-safe.
    let step = libc::timespec {
        tv_sec: 0,
        tv_nsec: SHUTDOWN_WAIT_STEP_MS * 1_000_000,
    };
    for _ in 0..SHUTDOWN_WAIT_STEPS {
        if SHUTDOWN_DONE.load(Ordering::SeqCst) {
            break;
        }
        unsafe {
            libc::nanosleep(&step, std::ptr::null_mut());
        }
    }

    restore_and_raise(signal);
}

fn bridge_loop(read_fd: libc::c_int) {
    mask_fatal_signals();
    loop {
        let mut byte = 0u8;
        let n = unsafe {
            libc::read(
                read_fd,
                &mut byte as *mut u8 as *mut libc::c_void,
                1,
            )
        };
        if n <= 0 {
            if n < 0 && std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return;
        }
        // Best effort: the core may be torn down already, or sinks may be
        // broken; the re-raise must happen regardless.
        let _ = crate::lifecycle::flush_with_deadline(SIGNAL_FLUSH_TIMEOUT);
        let _ = crate::lifecycle::finalize(true);
        SHUTDOWN_DONE.store(true, Ordering::SeqCst);
    }
}

/// Installs the fatal-signal handlers and starts the bridge thread.
/// Idempotent; returns `IllegalState` if the self-pipe cannot be created.
pub fn install_sighandler() -> Result<()> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let mut fds = [0 as libc::c_int; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        INSTALLED.store(false, Ordering::SeqCst);
        return illegal_state(format!(
            "cannot create the signal pipe: {}",
            std::io::Error::last_os_error()
        ));
    }
    PIPE_WRITE_FD.store(fds[1], Ordering::SeqCst);

    let read_fd = fds[0];
    thread::Builder::new()
        .name("fanlog-signal".to_string())
        .spawn(move || bridge_loop(read_fd))
        .map_err(crate::error::Error::from)?;

    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_fatal_signal as usize;
        libc::sigfillset(&mut action.sa_mask);
        action.sa_flags = libc::SA_RESTART;
        for signal in &FATAL_SIGNALS {
            libc::sigaction(*signal, &action, std::ptr::null_mut());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        install_sighandler().unwrap();
        install_sighandler().unwrap();
    }

    #[test]
    fn masking_does_not_disturb_the_thread() {
        std::thread::spawn(|| {
            mask_fatal_signals();
            mask_fatal_signals();
        })
        .join()
        .unwrap();
    }
}
