//! Translation of process signals into bus messages.
//!
//! Handlers installed here are async-signal-safe: they only store into
//! `static` atomics and, for `SIGCHLD`, perform a non-blocking wait. The loop
//! thread picks the pending slot up during idle and synthesizes an
//! `App::Signal` message (see [`crate::app`]). Quit-class signals request an
//! orderly quit with exit code `128 + signo`; fatal signals terminate after a
//! one-line report.

use std::convert::TryFrom;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use nix::sys::signal::{signal, SigHandler, Signal};

/// Offset added to a signal number to form the shell-convention exit code.
pub const SIGNAL_EXIT_OFFSET: i32 = 128;

// Last captured non-fatal signal, consumed by the loop thread during idle.
static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);
static CHILD_PID: AtomicI32 = AtomicI32::new(0);
static CHILD_STATUS: AtomicI32 = AtomicI32::new(0);
static FATAL_SEEN: AtomicBool = AtomicBool::new(false);

const fn bit(signo: i32) -> u64 {
    1u64 << (signo as u32)
}

#[cfg(target_os = "linux")]
const PWR_BIT: u64 = bit(libc::SIGPWR);
#[cfg(not(target_os = "linux"))]
const PWR_BIT: u64 = 0;

/// Signals that request an orderly quit.
const SIGSET_QUIT: u64 = bit(libc::SIGINT) | bit(libc::SIGQUIT) | bit(libc::SIGTERM) | PWR_BIT;

/// Signals that terminate the process.
const SIGSET_DIE: u64 = bit(libc::SIGILL)
    | bit(libc::SIGABRT)
    | bit(libc::SIGBUS)
    | bit(libc::SIGFPE)
    | bit(libc::SIGSYS)
    | bit(libc::SIGSEGV)
    | bit(libc::SIGALRM)
    | bit(libc::SIGXCPU);

/// Signals delivered to the root object as a message.
const SIGSET_MSG: u64 = SIGSET_QUIT
    | bit(libc::SIGHUP)
    | bit(libc::SIGCHLD)
    | bit(libc::SIGWINCH)
    | bit(libc::SIGURG)
    | bit(libc::SIGXFSZ)
    | bit(libc::SIGUSR1)
    | bit(libc::SIGUSR2)
    | bit(libc::SIGPIPE);

extern "C" fn on_msg_signal(signo: libc::c_int) {
    PENDING_SIGNAL.store(signo, Ordering::SeqCst);
    if signo == libc::SIGCHLD {
        let mut status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        CHILD_PID.store(pid, Ordering::SeqCst);
        CHILD_STATUS.store(status, Ordering::SeqCst);
    }
}

extern "C" fn on_fatal_signal(signo: libc::c_int) {
    if !FATAL_SEEN.swap(true, Ordering::SeqCst) {
        let text = b"[S] fatal signal, terminating\n";
        unsafe {
            libc::write(libc::STDERR_FILENO, text.as_ptr() as *const libc::c_void, text.len());
            libc::exit(SIGNAL_EXIT_OFFSET + signo);
        }
    }
    // a second fatal signal forces immediate termination
    unsafe { libc::_exit(SIGNAL_EXIT_OFFSET + signo) }
}

/// Install the handlers for all captured and fatal signals.
///
/// Called by [`framework_init`](crate::framework_init); embedders running the
/// bus inside another framework's loop can skip it.
pub fn install_handlers() {
    for signo in 1..32 {
        let mask = bit(signo);
        let handler = if SIGSET_MSG & mask != 0 {
            SigHandler::Handler(on_msg_signal)
        } else if SIGSET_DIE & mask != 0 {
            SigHandler::Handler(on_fatal_signal)
        } else {
            continue;
        };
        if let Ok(sig) = Signal::try_from(signo) {
            unsafe {
                let _ = signal(sig, handler);
            }
        }
    }
}

/// Consume the pending signal slot: `(signo, child_pid, child_status)`.
pub(crate) fn take_pending() -> Option<(i32, i32, i32)> {
    let signo = PENDING_SIGNAL.swap(0, Ordering::SeqCst);
    if signo == 0 {
        return None;
    }
    if signo == libc::SIGCHLD {
        Some((signo, CHILD_PID.swap(0, Ordering::SeqCst), CHILD_STATUS.swap(0, Ordering::SeqCst)))
    } else {
        Some((signo, 0, 0))
    }
}

pub(crate) fn is_quit_signal(signo: i32) -> bool {
    (0..64).contains(&signo) && SIGSET_QUIT & bit(signo) != 0
}
