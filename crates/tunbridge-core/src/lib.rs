//! tunbridge core - Lifecycle management for a tun2socks-style engine
//!
//! Supervises a single background packet-tunneling engine on behalf of a
//! host application that only speaks start/stop/status:
//! - Raw host parameters are validated into an immutable [`Config`]
//! - Each start attempt runs through an [`EngineController`] state machine
//!   with a bounded startup wait and panic isolation around the engine
//! - The [`EngineRegistry`] keeps the one process-wide running engine
//!   behind a synchronized API
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Host Process                          │
//! │                                                           │
//! │  ┌──────────┐   ┌──────────────────┐   ┌──────────────┐  │
//! │  │ Foreign  │──▶│  EngineRegistry  │──▶│   Engine     │  │
//! │  │ Bridge   │   │ (one slot, lock) │   │ Controller   │  │
//! │  └──────────┘   └──────────────────┘   └──────┬───────┘  │
//! │                                               │          │
//! └───────────────────────────────────────────────│──────────┘
//!                                                 ▼ thread
//!                                     ┌───────────────────┐
//!                                     │  External engine  │
//!                                     │ insert/start/stop │
//!                                     └───────────────────┘
//! ```
//!
//! The external engine is an opaque collaborator behind the [`TunEngine`]
//! trait; a panic inside it is contained and reported, never propagated.

mod config;
mod controller;
mod engine;
mod registry;

pub use config::{Config, ConfigBuilder, ConfigError, LogLevel, ProxyEndpoint, ProxyProtocol};
pub use controller::{
    ControllerState, DEFAULT_START_TIMEOUT, EngineController, StartError, StopError,
};
pub use engine::{EngineFault, EngineKey, NoopEngine, TunEngine};
pub use registry::EngineRegistry;
