//! Signal handling and cross-thread run flags.
//!
//! The handlers installed here only touch atomics (and, for reload
//! rate-limiting, a monotonic clock read), so they are async-signal-safe.
//! Threads never look at the raw signal state directly: the main thread
//! polls it and bridges into [`SharedFlag`] handles, which are also
//! constructible manually so the worker and merger logic can be tested
//! without delivering real signals.

use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;

/// Raw signal state, written by the handlers below.
static HALT_SIGNALLED: AtomicBool = AtomicBool::new(false);
static RELOAD_SIGNALLED: AtomicBool = AtomicBool::new(false);
static LAST_RELOAD_SEC: AtomicI64 = AtomicI64::new(0);
static CHILD_EXITS: AtomicI32 = AtomicI32::new(0);

extern "C" fn on_halt_signal(_sig: libc::c_int) {
    HALT_SIGNALLED.store(true, Ordering::SeqCst);
}

extern "C" fn on_reload_signal(_sig: libc::c_int) {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut now);
    }
    // Accept at most one reload per monotonic second; whoever is sending
    // hangups in a tight loop gets to wait.
    if now.tv_sec as i64 > LAST_RELOAD_SEC.load(Ordering::SeqCst) {
        RELOAD_SIGNALLED.store(true, Ordering::SeqCst);
        LAST_RELOAD_SEC.store(now.tv_sec as i64, Ordering::SeqCst);
    }
}

extern "C" fn on_child_signal(_sig: libc::c_int) {
    let mut status: libc::c_int = 0;
    // Reap every finished child; wait() is required for the zombies to go.
    unsafe {
        while libc::waitpid(-1, &mut status, libc::WNOHANG) > 0 {
            CHILD_EXITS.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn install(signum: libc::c_int, handler: extern "C" fn(libc::c_int)) -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handler as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(signum, &action, ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Install the process signal handlers: INT/TERM halt, HUP reloads
/// (rate-limited), CHLD reaps, PIPE is ignored.
pub fn install_handlers() -> io::Result<()> {
    install(libc::SIGINT, on_halt_signal)?;
    install(libc::SIGTERM, on_halt_signal)?;
    install(libc::SIGHUP, on_reload_signal)?;
    install(libc::SIGCHLD, on_child_signal)?;
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
    Ok(())
}

/// True once INT or TERM has been delivered.
pub fn halt_signalled() -> bool {
    HALT_SIGNALLED.load(Ordering::SeqCst)
}

/// Consume a pending reload request, if any.
pub fn take_reload() -> bool {
    RELOAD_SIGNALLED.swap(false, Ordering::SeqCst)
}

/// Consume one pending child-exit notification, if any.
pub fn consume_child_exit() -> bool {
    CHILD_EXITS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
            if count > 0 {
                Some(count - 1)
            } else {
                None
            }
        })
        .is_ok()
}

/// Guard holding the signal mask saved before blocking all signals.
///
/// All signals are blocked while worker and merger threads are created so
/// delivery stays confined to the main thread; spawned threads inherit the
/// blocked mask and keep it.
pub struct BlockedSignals {
    saved: libc::sigset_t,
}

/// Block every signal for the calling thread, returning a guard that can
/// restore the previous mask.
pub fn block_all_signals() -> io::Result<BlockedSignals> {
    unsafe {
        let mut all: libc::sigset_t = mem::zeroed();
        libc::sigfillset(&mut all);
        let mut saved: libc::sigset_t = mem::zeroed();
        if libc::pthread_sigmask(libc::SIG_SETMASK, &all, &mut saved) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(BlockedSignals { saved })
    }
}

impl BlockedSignals {
    /// Restore the signal mask saved when blocking.
    pub fn restore(self) -> io::Result<()> {
        unsafe {
            if libc::pthread_sigmask(libc::SIG_SETMASK, &self.saved, ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }
}

/// A shared boolean flag observed across threads.
///
/// Clones share state. Used for the global halt flag and the reload flag;
/// tests trigger them directly instead of raising signals.
#[derive(Debug, Clone, Default)]
pub struct SharedFlag {
    flag: Arc<AtomicBool>,
}

impl SharedFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. There is no way to lower it; halt and reload are
    /// one-way transitions within a capture run.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
