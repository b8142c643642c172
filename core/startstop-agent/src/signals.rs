//! Exit command for the console shell: SIGINT / SIGTERM set a flag that the
//! shell loop turns into a lifecycle cancellation.

use std::sync::atomic::{AtomicBool, Ordering};

static EXIT_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_exit_signal(_signal: libc::c_int) {
    EXIT_REQUESTED.store(true, Ordering::SeqCst);
}

pub fn install() {
    let handler = on_exit_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for (signal, name) in [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM")] {
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
        let previous = unsafe { libc::signal(signal, handler) };
        if is_sig_err(previous) {
            tracing::warn!(signal = name, "Failed to install exit signal handler");
        }
    }
}

#[cfg(unix)]
fn is_sig_err(previous: libc::sighandler_t) -> bool {
    previous == libc::SIG_ERR
}

#[cfg(not(unix))]
fn is_sig_err(previous: libc::sighandler_t) -> bool {
    previous == usize::MAX
}

pub fn exit_requested() -> bool {
    EXIT_REQUESTED.load(Ordering::SeqCst)
}
