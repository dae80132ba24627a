//! Observer registry for package process events.
//!
//! Handlers are registered with [`PackageEvents::subscribe`] and stay active
//! for as long as the returned [`Subscription`] lives.

use matrix_core::ProcessOutput;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Something a package reported while installing or running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageEvent {
    ConsoleOutput(ProcessOutput),
    Exited(i32),
    /// The package is serving; carries the URL it announced.
    StartupComplete(String),
}

pub type PackageEventHandler = Arc<dyn Fn(&PackageEvent) + Send + Sync>;

#[derive(Default)]
struct HandlerList {
    next_id: u64,
    handlers: Vec<(u64, PackageEventHandler)>,
}

/// Event fan-out owned by each package descriptor.
#[derive(Clone, Default)]
pub struct PackageEvents {
    inner: Arc<Mutex<HandlerList>>,
}

impl std::fmt::Debug for PackageEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageEvents")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl PackageEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every event until the guard is dropped.
    #[must_use = "dropping the subscription unregisters the handler"]
    pub fn subscribe(&self, handler: PackageEventHandler) -> Subscription {
        let mut list = self.lock();
        let id = list.next_id;
        list.next_id += 1;
        list.handlers.push((id, handler));
        Subscription {
            id,
            list: Arc::downgrade(&self.inner),
        }
    }

    /// Register a handler that only sees console output.
    #[must_use = "dropping the subscription unregisters the handler"]
    pub fn subscribe_console<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ProcessOutput) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(move |event| {
            if let PackageEvent::ConsoleOutput(output) = event {
                handler(output);
            }
        }))
    }

    /// Deliver `event` to every current subscriber.
    pub fn emit(&self, event: &PackageEvent) {
        // Snapshot so handlers may subscribe or unsubscribe re-entrantly.
        let handlers: Vec<PackageEventHandler> =
            self.lock().handlers.iter().map(|(_, h)| h.clone()).collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().handlers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HandlerList> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration guard returned by [`PackageEvents::subscribe`].
pub struct Subscription {
    id: u64,
    list: Weak<Mutex<HandlerList>>,
}

impl Subscription {
    /// Unregister now instead of at drop.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            list.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .handlers
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
