//! Host-facing logging.
//!
//! Two sinks: the crate's own `tracing` output, and an optional one-way
//! callback into the host runtime (the managed side registers a function
//! pointer and receives operational messages as C strings).

use std::ffi::{CString, c_char};
use std::sync::Mutex;

use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Host log sink: receives a borrowed, NUL-terminated message. The pointer
/// is only valid for the duration of the call.
pub type LogCallback = extern "C" fn(*const c_char);

static LOG_CALLBACK: Mutex<Option<LogCallback>> = Mutex::new(None);

/// Install or clear the host log callback.
pub fn set_log_callback(callback: Option<LogCallback>) {
    *LOG_CALLBACK.lock().unwrap() = callback;
}

/// Initialize the fmt subscriber once.
///
/// `try_init` so an embedding host that already installed its own
/// subscriber wins.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

/// Forward an operational message to the host, and trace it.
pub(crate) fn emit(message: &str) {
    debug!(host_log = message);

    let callback = *LOG_CALLBACK.lock().unwrap();
    if let Some(callback) = callback {
        // Interior NULs would truncate the host's view of the message.
        let sanitized: String = message.chars().filter(|&c| c != '\0').collect();
        if let Ok(cstring) = CString::new(sanitized) {
            callback(cstring.as_ptr());
        }
    }
}
