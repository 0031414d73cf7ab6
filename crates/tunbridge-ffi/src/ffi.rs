//! C ABI entry points.
//!
//! Parameter types are host primitives (integers and C strings, possibly
//! null). Every export converts defensively and wraps its body in
//! `catch_unwind`; a panic anywhere downstream is contained here and
//! answered with the benign default for the entry point.

use std::ffi::{CStr, c_char, c_int, c_long};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use tracing::error;
use tunbridge_core::{NoopEngine, TunEngine};

use crate::bridge::Bridge;
use crate::logger::{self, LogCallback};

static BRIDGE: OnceLock<Bridge> = OnceLock::new();

/// Install the real engine collaborator before the first foreign call.
///
/// The C entry points lazily fall back to a [`NoopEngine`] placeholder, so
/// an embedder that links a real engine must install it during its own
/// initialization. Returns `false` when the bridge already exists (the
/// installed engine is then dropped).
pub fn install_engine(engine: Arc<dyn TunEngine>) -> bool {
    logger::init_tracing();
    BRIDGE.set(Bridge::new(engine)).is_ok()
}

fn bridge() -> &'static Bridge {
    BRIDGE.get_or_init(|| {
        logger::init_tracing();
        Bridge::new(Arc::new(NoopEngine))
    })
}

/// Borrowed C string to owned Rust string: null becomes empty, invalid
/// UTF-8 is replaced, surrounding whitespace is trimmed.
unsafe fn cstr_arg(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .trim()
        .to_string()
}

/// Nothing may unwind across the C boundary.
fn contained(entry_point: &str, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(entry_point, "panic contained at foreign boundary");
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tunbridge_start(
    tun_fd: c_int,
    proxy_type: *const c_char,
    server: *const c_char,
    port: c_int,
    username: *const c_char,
    password: *const c_char,
) {
    contained("tunbridge_start", || {
        let proxy_type = unsafe { cstr_arg(proxy_type) };
        let server = unsafe { cstr_arg(server) };
        let username = unsafe { cstr_arg(username) };
        let password = unsafe { cstr_arg(password) };
        bridge().start(tun_fd, &proxy_type, &server, port, &username, &password);
    });
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn tunbridge_start_with_url(tun_fd: c_int, proxy_url: *const c_char) {
    contained("tunbridge_start_with_url", || {
        let proxy_url = unsafe { cstr_arg(proxy_url) };
        bridge().start_with_url(tun_fd, &proxy_url);
    });
}

/// Identical to [`tunbridge_start_with_url`]; kept because existing hosts
/// call both names.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tunbridge_start_with_config(tun_fd: c_int, proxy_url: *const c_char) {
    unsafe { tunbridge_start_with_url(tun_fd, proxy_url) }
}

#[unsafe(no_mangle)]
pub extern "C" fn tunbridge_stop() {
    contained("tunbridge_stop", || bridge().stop());
}

/// Identical to [`tunbridge_stop`]; kept because existing hosts call both
/// names.
#[unsafe(no_mangle)]
pub extern "C" fn tunbridge_stop_with_logger() {
    contained("tunbridge_stop_with_logger", || bridge().stop());
}

/// `1` while an engine is running, `0` otherwise. A liveness flag, not a
/// traffic counter.
#[unsafe(no_mangle)]
pub extern "C" fn tunbridge_get_stats() -> c_long {
    panic::catch_unwind(AssertUnwindSafe(|| bridge().status() as c_long)).unwrap_or_else(|_| {
        error!("panic contained at foreign boundary in tunbridge_get_stats");
        0
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn tunbridge_set_timeout(timeout_ms: c_int) {
    contained("tunbridge_set_timeout", || bridge().set_timeout(timeout_ms));
}

#[unsafe(no_mangle)]
pub extern "C" fn tunbridge_set_log_callback(callback: Option<LogCallback>) {
    contained("tunbridge_set_log_callback", || {
        logger::set_log_callback(callback)
    });
}

/// Link-check constants so a host can verify the foreign-call path is
/// wired before touching the real entry points.
#[unsafe(no_mangle)]
pub extern "C" fn tunbridge_self_test() -> c_long {
    12345
}

#[unsafe(no_mangle)]
pub extern "C" fn tunbridge_self_test2() -> c_long {
    54321
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn test_self_test_constants() {
        assert_eq!(tunbridge_self_test(), 12345);
        assert_eq!(tunbridge_self_test2(), 54321);
    }

    // One sequential test over the shared global bridge: parallel tests
    // would race on its state.
    #[test]
    fn test_foreign_call_roundtrip() {
        // Null pointers must be benign; empty proxy type is rejected
        unsafe {
            tunbridge_start(1, ptr::null(), ptr::null(), 0, ptr::null(), ptr::null());
        }

        // Garbage URL is rejected
        let garbage = CString::new("nonsense").unwrap();
        unsafe {
            tunbridge_start_with_url(3, garbage.as_ptr());
        }
        assert_eq!(tunbridge_get_stats(), 0);

        // Valid parameters start the (noop) engine
        let proxy_type = CString::new("socks5").unwrap();
        let server = CString::new("example.com").unwrap();
        let empty = CString::new("").unwrap();
        unsafe {
            tunbridge_start(
                10,
                proxy_type.as_ptr(),
                server.as_ptr(),
                1080,
                empty.as_ptr(),
                empty.as_ptr(),
            );
        }
        assert_eq!(tunbridge_get_stats(), 1);

        tunbridge_set_timeout(3000);
        assert_eq!(tunbridge_get_stats(), 1);

        // Stop twice: second is a no-op, both benign
        tunbridge_stop();
        assert_eq!(tunbridge_get_stats(), 0);
        tunbridge_stop_with_logger();
        assert_eq!(tunbridge_get_stats(), 0);

        // The config-named alias behaves exactly like start_with_url
        let url = CString::new("socks5://1.2.3.4:1080").unwrap();
        unsafe {
            tunbridge_start_with_config(10, url.as_ptr());
        }
        assert_eq!(tunbridge_get_stats(), 1);
        tunbridge_stop();
        assert_eq!(tunbridge_get_stats(), 0);
    }
}
