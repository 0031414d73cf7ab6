//! Engine Controller
//!
//! Owns one engine lifecycle: validated config, supervised start, running,
//! supervised stop. The engine's `start()` runs on its own named thread
//! behind a panic isolation boundary, and the caller waits on a bounded
//! race between the outcome, cancellation, and a startup deadline, so a
//! wedged or crashing engine can neither hang nor take down the host.
//!
//! A controller represents a single lifecycle attempt; a fresh start always
//! builds a fresh controller rather than reusing a stopped one.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, after, bounded, select};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::{EngineFault, TunEngine, isolated};

/// Default bound on the startup wait.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle state of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Not started, or start failed, or stopped.
    Stopped,
    /// Waiting for the engine to report ready.
    Starting,
    /// Engine is up.
    Running,
    /// Tear-down in progress.
    Stopping,
}

impl ControllerState {
    pub fn is_running(&self) -> bool {
        matches!(self, ControllerState::Running)
    }
}

/// Start failures.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("engine already started")]
    AlreadyStarted,

    #[error(transparent)]
    Fault(#[from] EngineFault),

    #[error("engine start timeout after {0:?}")]
    Timeout(Duration),

    #[error("engine startup cancelled")]
    Cancelled,

    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
}

/// Stop failures. A fault here is contained and reported after the
/// controller has already transitioned to `Stopped`.
#[derive(Debug, thiserror::Error)]
pub enum StopError {
    #[error(transparent)]
    Fault(#[from] EngineFault),
}

/// Drives one engine instance through its lifecycle.
pub struct EngineController {
    engine: Arc<dyn TunEngine>,
    config: Config,
    state: Mutex<ControllerState>,
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
    start_timeout: Duration,
}

impl EngineController {
    /// Create a controller for one start attempt with the default
    /// startup deadline.
    pub fn new(engine: Arc<dyn TunEngine>, config: Config) -> Self {
        Self::with_timeout(engine, config, DEFAULT_START_TIMEOUT)
    }

    pub fn with_timeout(engine: Arc<dyn TunEngine>, config: Config, start_timeout: Duration) -> Self {
        let (cancel_tx, cancel_rx) = bounded(1);
        Self {
            engine,
            config,
            state: Mutex::new(ControllerState::Stopped),
            cancel_tx,
            cancel_rx,
            start_timeout,
        }
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Request cancellation of a start still inside its bounded wait.
    ///
    /// Safe to call from any thread; does not take the state lock, so it
    /// can interrupt a `start()` that currently holds it.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }

    /// Start the engine and wait, bounded, for it to report ready.
    ///
    /// The engine's `start()` call runs on a dedicated thread under panic
    /// isolation; its outcome arrives over a single-use channel. The wait
    /// ends on the first of: outcome, cancellation, deadline. On deadline
    /// the start thread is not killed; the engine is told to stop
    /// speculatively so a late success cannot leave it running
    /// unsupervised, and the discarded outcome is absorbed by the bounded
    /// channel.
    pub fn start(&self) -> Result<(), StartError> {
        let mut state = self.state.lock().unwrap();
        if *state != ControllerState::Stopped {
            return Err(StartError::AlreadyStarted);
        }
        *state = ControllerState::Starting;

        // Stale cancellations from a previous stop must not abort this
        // attempt.
        while self.cancel_rx.try_recv().is_ok() {}

        info!(
            device = %self.config.device,
            proxy = %self.config.proxy,
            mtu = self.config.mtu,
            "starting engine"
        );

        let key = self.config.engine_key();
        if let Err(fault) = isolated("insert", || self.engine.insert(&key)) {
            *state = ControllerState::Stopped;
            warn!(%fault, "engine rejected configuration");
            return Err(fault.into());
        }

        let (ready_tx, ready_rx) = bounded::<Result<(), EngineFault>>(1);
        let engine = Arc::clone(&self.engine);
        let spawned = thread::Builder::new()
            .name("engine-start".to_string())
            .spawn(move || {
                let _ = ready_tx.send(isolated("start", || engine.start()));
            });
        if let Err(e) = spawned {
            *state = ControllerState::Stopped;
            return Err(StartError::Spawn(e));
        }

        let outcome = select! {
            recv(ready_rx) -> result => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(fault)) => Err(StartError::Fault(fault)),
                // Thread gone without reporting; treat like a fault.
                Err(_) => Err(StartError::Fault(EngineFault {
                    op: "start",
                    reason: "engine thread exited without reporting".to_string(),
                })),
            },
            recv(self.cancel_rx) -> _ => Err(StartError::Cancelled),
            recv(after(self.start_timeout)) -> _ => {
                if let Err(fault) = isolated("stop", || self.engine.stop()) {
                    warn!(%fault, "speculative stop after start timeout faulted");
                }
                Err(StartError::Timeout(self.start_timeout))
            }
        };

        match outcome {
            Ok(()) => {
                *state = ControllerState::Running;
                info!("engine started");
                Ok(())
            }
            Err(e) => {
                *state = ControllerState::Stopped;
                warn!(error = %e, "engine start failed");
                Err(e)
            }
        }
    }

    /// Stop the engine.
    ///
    /// Idempotent: stopping a controller that is not running is a no-op
    /// success. An engine fault during tear-down is contained and reported
    /// after the transition to `Stopped` has completed.
    pub fn stop(&self) -> Result<(), StopError> {
        // Wake a start still inside its bounded wait before contending on
        // the state lock that wait holds.
        self.cancel();

        let mut state = self.state.lock().unwrap();
        if *state != ControllerState::Running {
            debug!(state = ?*state, "stop on idle engine is a no-op");
            return Ok(());
        }
        *state = ControllerState::Stopping;
        info!("stopping engine");

        let result = isolated("stop", || self.engine.stop());
        *state = ControllerState::Stopped;

        match result {
            Ok(()) => {
                info!("engine stopped");
                Ok(())
            }
            Err(fault) => {
                warn!(%fault, "engine stop faulted");
                Err(fault.into())
            }
        }
    }
}
