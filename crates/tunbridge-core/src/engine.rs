//! External Engine Collaborator
//!
//! The tunneling engine itself is an opaque black box behind [`TunEngine`]:
//! it takes a key, starts, and stops. It is untrusted with respect to
//! failure behavior, so every call into it goes through [`isolated`], which
//! converts an abrupt panic into a typed [`EngineFault`] instead of letting
//! it unwind into the host process.

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration key handed to the engine, mapped 1:1 from
/// [`Config`](crate::Config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineKey {
    pub mtu: u16,
    pub device: String,
    pub proxy: String,
    pub log_level: String,
}

/// The packet-tunneling engine collaborator.
///
/// `start()` returning without a fault is the readiness signal; the engine
/// runs its forwarding loops on threads of its own. Cancellation is
/// cooperative: `stop()` asks the engine to wind down, it does not wait for
/// it.
pub trait TunEngine: Send + Sync {
    /// Register the configuration for the next start.
    fn insert(&self, key: &EngineKey);

    /// Bring the engine up. May block arbitrarily long or panic.
    fn start(&self);

    /// Tear the engine down. May panic.
    fn stop(&self);
}

/// An abrupt failure inside the external engine, contained at the
/// isolation boundary.
#[derive(Debug, Clone, thiserror::Error)]
#[error("engine fault in {op}: {reason}")]
pub struct EngineFault {
    /// Which engine entry point faulted.
    pub op: &'static str,
    /// Panic payload, best-effort stringified.
    pub reason: String,
}

/// Run a call into the engine collaborator with panic containment.
///
/// A panic is caught and reported as an [`EngineFault`]; it never crosses
/// this function.
pub(crate) fn isolated(op: &'static str, f: impl FnOnce()) -> Result<(), EngineFault> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => Ok(()),
        Err(payload) => {
            let reason = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(EngineFault { op, reason })
        }
    }
}

/// Placeholder engine for hosts that have not installed a real one.
///
/// Accepts every call and logs it. Useful for wiring checks of the
/// foreign-call path before the actual engine library is linked in.
#[derive(Debug, Default)]
pub struct NoopEngine;

impl TunEngine for NoopEngine {
    fn insert(&self, key: &EngineKey) {
        debug!(device = %key.device, proxy = %key.proxy, "noop engine: insert");
    }

    fn start(&self) {
        debug!("noop engine: start");
    }

    fn stop(&self) {
        debug!("noop engine: stop");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolated_passes_success_through() {
        assert!(isolated("start", || {}).is_ok());
    }

    #[test]
    fn test_isolated_contains_panics() {
        let fault = isolated("start", || panic!("tun device gone")).unwrap_err();
        assert_eq!(fault.op, "start");
        assert_eq!(fault.reason, "tun device gone");
    }

    #[test]
    fn test_isolated_stringifies_formatted_panics() {
        let fault = isolated("stop", || panic!("fd {} invalid", 3)).unwrap_err();
        assert_eq!(fault.reason, "fd 3 invalid");
    }
}
