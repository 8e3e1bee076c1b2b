//! Change listeners and synchronous delivery

use crate::ConfigurationChange;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, warn};

/// Receives configuration changes
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, change: &ConfigurationChange) -> anyhow::Result<()>;
}

impl<F> ChangeListener for F
where
    F: Fn(&ConfigurationChange) -> anyhow::Result<()> + Send + Sync,
{
    fn on_change(&self, change: &ConfigurationChange) -> anyhow::Result<()> {
        self(change)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Delivers changes to registered listeners in registration order
///
/// A listener that fails or panics is logged; delivery continues with the next one.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<L>(&self, listener: L) -> ListenerId
    where
        L: ChangeListener + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        debug!("Registered change listener {:?}", id);
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `change`, returning the number of listeners that handled it successfully
    pub fn publish(&self, change: &ConfigurationChange) -> usize {
        // deliver outside the lock so listeners may (un)register
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut delivered = 0;
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener.on_change(change))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Change listener {:?} failed: {}", id, e),
                Err(_) => error!("Change listener {:?} panicked", id),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FrozenConfiguration;
    use std::sync::Mutex;

    fn sample_change() -> ConfigurationChange {
        let old = FrozenConfiguration::from_properties(Default::default());
        let new = FrozenConfiguration::from_properties(
            [("k".to_string(), "v".to_string())].into_iter().collect(),
        );
        ConfigurationChange::between(&old, &new)
    }

    #[test]
    fn test_publish_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.register(move |change: &ConfigurationChange| -> anyhow::Result<()> {
                seen.lock().unwrap().push((name, change.len()));
                Ok(())
            });
        }

        assert_eq!(bus.publish(&sample_change()), 2);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 1), ("second", 1)]);
    }

    #[test]
    fn test_failing_listeners_do_not_stop_delivery() {
        let bus = EventBus::new();
        let reached = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&reached);

        bus.register(|_: &ConfigurationChange| -> anyhow::Result<()> {
            Err(anyhow::anyhow!("rejected"))
        });
        bus.register(|_: &ConfigurationChange| -> anyhow::Result<()> { panic!("listener bug") });
        bus.register(move |_: &ConfigurationChange| -> anyhow::Result<()> {
            *flag.lock().unwrap() = true;
            Ok(())
        });

        assert_eq!(bus.publish(&sample_change()), 1);
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn test_unregister() {
        let bus = EventBus::new();
        let id = bus.register(|_: &ConfigurationChange| -> anyhow::Result<()> { Ok(()) });
        assert_eq!(bus.len(), 1);
        assert!(bus.unregister(id));
        assert!(!bus.unregister(id));
        assert!(bus.is_empty());
    }
}
