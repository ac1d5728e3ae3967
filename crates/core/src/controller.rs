//! Enable/disable switch for event-driven cache maintenance.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Error;

/// Process-wide enabled flag.
///
/// While disabled, change events are dropped and nothing is scheduled.
/// Starts disabled; callers opt in with [`CacheController::enable`].
#[derive(Debug, Default)]
pub struct CacheController {
    enabled: AtomicBool,
}

impl CacheController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Start reacting to change events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyEnabled`] if the cache is already enabled.
    pub fn enable(&self) -> Result<(), Error> {
        self.enabled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| tracing::info!("record cache enabled"))
            .map_err(|_| Error::AlreadyEnabled)
    }

    /// Stop reacting to change events. Already-scheduled work still runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyDisabled`] if the cache is already disabled.
    pub fn disable(&self) -> Result<(), Error> {
        self.enabled
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| tracing::info!("record cache disabled"))
            .map_err(|_| Error::AlreadyDisabled)
    }

    /// Disable for the lifetime of the returned guard, then restore the prior state.
    pub fn suspend(self: &Arc<Self>) -> StateGuard {
        StateGuard::hold(self, false)
    }

    /// Enable for the lifetime of the returned guard, then restore the prior state.
    pub fn activate(self: &Arc<Self>) -> StateGuard {
        StateGuard::hold(self, true)
    }
}

/// Restores the controller's previous state on drop.
///
/// The restore only applies if the flag still holds the state the guard set;
/// an explicit `enable`/`disable` made while the guard was alive wins.
#[must_use = "the previous state is restored as soon as the guard is dropped"]
pub struct StateGuard {
    controller: Arc<CacheController>,
    held: bool,
    previous: bool,
}

impl StateGuard {
    fn hold(controller: &Arc<CacheController>, state: bool) -> Self {
        let previous = controller.enabled.swap(state, Ordering::AcqRel);
        if previous != state {
            tracing::debug!(enabled = state, "record cache state held");
        }
        Self { controller: Arc::clone(controller), held: state, previous }
    }
}

impl Drop for StateGuard {
    fn drop(&mut self) {
        let _ = self
            .controller
            .enabled
            .compare_exchange(self.held, self.previous, Ordering::AcqRel, Ordering::Acquire);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_disabled() {
        assert!(!CacheController::new().is_enabled());
    }

    #[test]
    fn test_reentrant_transitions_fail() {
        let controller = CacheController::new();
        assert!(matches!(controller.disable(), Err(Error::AlreadyDisabled)));

        controller.enable().unwrap();
        assert!(controller.is_enabled());
        assert!(matches!(controller.enable(), Err(Error::AlreadyEnabled)));

        controller.disable().unwrap();
        assert!(!controller.is_enabled());
    }

    #[test]
    fn test_suspend_restores_previous_state() {
        let controller = Arc::new(CacheController::new());
        controller.enable().unwrap();

        {
            let _guard = controller.suspend();
            assert!(!controller.is_enabled());
        }
        assert!(controller.is_enabled());

        controller.disable().unwrap();
        {
            let _guard = controller.suspend();
            assert!(!controller.is_enabled());
        }
        assert!(!controller.is_enabled());
    }

    #[test]
    fn test_explicit_enable_while_suspended_is_kept() {
        let controller = Arc::new(CacheController::new());
        {
            let _guard = controller.suspend();
            controller.enable().unwrap();
        }
        assert!(controller.is_enabled());

        {
            let _guard = controller.suspend();
            assert!(!controller.is_enabled());
        }
        assert!(controller.is_enabled());
    }

    #[test]
    fn test_activate_restores_previous_state() {
        let controller = Arc::new(CacheController::new());
        {
            let _guard = controller.activate();
            assert!(controller.is_enabled());
        }
        assert!(!controller.is_enabled());
    }
}
