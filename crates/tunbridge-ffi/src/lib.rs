//! tunbridge FFI - Foreign-call boundary for the tunnel engine
//!
//! The surface a managed host runtime (an Android `VpnService`, or any
//! other embedder speaking C ABI) uses to drive the engine lifecycle:
//! start with raw parameters or a pre-built proxy URL, stop, query the
//! running flag, install a log sink.
//!
//! Boundary guarantee: no error, fault, or panic ever crosses back to the
//! caller. Every entry point converts its inputs defensively (null becomes
//! empty), contains anything that goes wrong downstream, and answers with
//! a logged message plus a benign return value.

mod bridge;
mod ffi;
mod logger;

pub use bridge::Bridge;
pub use ffi::install_engine;
pub use logger::{LogCallback, set_log_callback};
