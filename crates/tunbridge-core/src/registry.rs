//! Engine Registry
//!
//! The process-wide record of the single active engine. All mutation goes
//! through one synchronized API: `start` replaces whatever engine is
//! active, `stop_active` tears it down (working even when nothing was ever
//! registered), and `is_running` is a consistent snapshot that never
//! observes a mid-transition state.
//!
//! Two locks with distinct jobs: a transition mutex totally orders whole
//! start/stop sequences so two engines can never run concurrently, even
//! transiently, while the inner `RwLock` is only held for field flips so a
//! status query never waits behind a 10 second startup.

use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use crate::controller::{EngineController, StartError};
use crate::engine::{TunEngine, isolated};

#[derive(Default)]
struct RegistryInner {
    current: Option<Arc<EngineController>>,
    running: bool,
}

/// Holds at most one active [`EngineController`].
///
/// Constructed once at process start and torn down at process exit;
/// everything else only sees its synchronized methods.
pub struct EngineRegistry {
    engine: Arc<dyn TunEngine>,
    inner: RwLock<RegistryInner>,
    transition: Mutex<()>,
}

impl EngineRegistry {
    /// Create an empty registry over the given engine collaborator.
    ///
    /// The engine handle is kept for the defensive stop path: the host may
    /// request a stop without ever having observed a successful start.
    pub fn new(engine: Arc<dyn TunEngine>) -> Self {
        Self {
            engine,
            inner: RwLock::new(RegistryInner::default()),
            transition: Mutex::new(()),
        }
    }

    /// Whether an engine is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.read().unwrap().running
    }

    /// Stop any active engine, then start `controller` and publish it.
    ///
    /// The controller's bounded start runs under the transition mutex but
    /// outside the inner lock, so concurrent status queries simply read
    /// "not running" until the new engine is published atomically with the
    /// running flag.
    pub fn start(&self, controller: Arc<EngineController>) -> Result<(), StartError> {
        let _gate = self.transition.lock().unwrap();

        self.stop_registered();
        controller.start()?;

        let mut inner = self.inner.write().unwrap();
        inner.current = Some(controller);
        inner.running = true;
        Ok(())
    }

    /// Stop the active engine, if any.
    ///
    /// With no registered controller this still best-effort calls straight
    /// into the engine collaborator's `stop()` under fault isolation and
    /// forces the running flag off.
    pub fn stop_active(&self) {
        let _gate = self.transition.lock().unwrap();

        if !self.stop_registered() {
            debug!("stop requested with no active engine");
            if let Err(fault) = isolated("stop", || self.engine.stop()) {
                warn!(%fault, "direct engine stop faulted");
            }
        }
    }

    /// Stop and clear the registered controller, if any. The direct-engine
    /// fallback belongs to `stop_active` alone: a start with nothing
    /// registered has nothing to tear down. Caller must hold the
    /// transition mutex.
    fn stop_registered(&self) -> bool {
        let taken = {
            let mut inner = self.inner.write().unwrap();
            inner.running = false;
            inner.current.take()
        };

        match taken {
            Some(controller) => {
                if let Err(e) = controller.stop() {
                    warn!(error = %e, "error stopping active engine");
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::engine::EngineKey;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Default)]
    struct CountingEngine {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl TunEngine for CountingEngine {
        fn insert(&self, _key: &EngineKey) {}

        fn start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FaultingEngine;

    impl TunEngine for FaultingEngine {
        fn insert(&self, _key: &EngineKey) {}

        fn start(&self) {
            panic!("no tun device");
        }

        fn stop(&self) {}
    }

    fn controller(engine: &Arc<CountingEngine>) -> Arc<EngineController> {
        let config = ConfigBuilder::new(10)
            .proxy("socks5", "example.com", 1080)
            .build()
            .unwrap();
        Arc::new(EngineController::new(
            Arc::clone(engine) as Arc<dyn TunEngine>,
            config,
        ))
    }

    /// `running` must always agree with the presence of a controller.
    fn assert_consistent(registry: &EngineRegistry) {
        let inner = registry.inner.read().unwrap();
        assert_eq!(inner.running, inner.current.is_some());
        if let Some(current) = &inner.current {
            assert!(current.is_running());
        }
    }

    #[test]
    fn test_start_publishes_controller() {
        let engine = Arc::new(CountingEngine::default());
        let registry = EngineRegistry::new(engine.clone());
        assert!(!registry.is_running());

        registry.start(controller(&engine)).unwrap();

        assert!(registry.is_running());
        assert_consistent(&registry);
    }

    #[test]
    fn test_first_start_issues_no_engine_stop() {
        let engine = Arc::new(CountingEngine::default());
        let registry = EngineRegistry::new(engine.clone());

        registry.start(controller(&engine)).unwrap();

        // Nothing was registered, so there was nothing to tear down
        assert_eq!(engine.starts.load(Ordering::SeqCst), 1);
        assert_eq!(engine.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_active_clears_registration() {
        let engine = Arc::new(CountingEngine::default());
        let registry = EngineRegistry::new(engine.clone());

        registry.start(controller(&engine)).unwrap();
        registry.stop_active();

        assert!(!registry.is_running());
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
        assert_consistent(&registry);
    }

    #[test]
    fn test_stop_active_without_controller_hits_engine_directly() {
        let engine = Arc::new(CountingEngine::default());
        let registry = EngineRegistry::new(engine.clone());

        registry.stop_active();

        assert!(!registry.is_running());
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
        assert_consistent(&registry);
    }

    #[test]
    fn test_failed_start_is_not_published() {
        let engine: Arc<dyn TunEngine> = Arc::new(FaultingEngine);
        let registry = EngineRegistry::new(Arc::clone(&engine));

        let config = ConfigBuilder::new(10)
            .proxy("socks5", "example.com", 1080)
            .build()
            .unwrap();
        let result = registry.start(Arc::new(EngineController::new(engine, config)));

        assert!(result.is_err());
        assert!(!registry.is_running());
        assert_consistent(&registry);
    }

    #[test]
    fn test_replacement_start_stops_previous_engine() {
        let engine = Arc::new(CountingEngine::default());
        let registry = EngineRegistry::new(engine.clone());

        let first = controller(&engine);
        registry.start(Arc::clone(&first)).unwrap();
        registry.start(controller(&engine)).unwrap();

        assert!(registry.is_running());
        assert!(!first.is_running());
        assert_eq!(engine.starts.load(Ordering::SeqCst), 2);
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
        assert_consistent(&registry);
    }

    #[test]
    fn test_concurrent_start_and_stop_stay_consistent() {
        let engine = Arc::new(CountingEngine::default());
        let registry = Arc::new(EngineRegistry::new(engine.clone()));

        let mut handles = Vec::new();
        for worker in 0..4 {
            let registry = Arc::clone(&registry);
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for _ in 0..25 {
                    if worker % 2 == 0 {
                        let _ = registry.start(controller(&engine));
                    } else {
                        registry.stop_active();
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_consistent(&registry);
        registry.stop_active();
        assert!(!registry.is_running());
        assert_consistent(&registry);
    }
}
