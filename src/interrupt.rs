//! Ctrl-C handling.
//!
//! SIGINT fires the process-wide [`CancelToken`]; the executor polls it while
//! waiting on the rate limiter, the child process and backoff sleeps.

use awskit::CancelToken;
use std::sync::OnceLock;

static TOKEN: OnceLock<CancelToken> = OnceLock::new();

/// Install the SIGINT handler and return the token it fires.
pub fn install() -> CancelToken {
    let token = TOKEN.get_or_init(CancelToken::new).clone();

    #[cfg(unix)]
    {
        let handler = handle_sigint as extern "C" fn(libc::c_int);
        // SAFETY: the handler only performs an atomic store
        let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            log::warn!("Failed to install SIGINT handler");
        }
    }

    token
}

#[cfg(unix)]
extern "C" fn handle_sigint(_signal: libc::c_int) {
    if let Some(token) = TOKEN.get() {
        token.cancel();
    }
}
