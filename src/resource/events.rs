//! Observer registration for resource notifications.
//!
//! Every resource owns an [`EventHub`]. Listeners register a callback under a
//! [`ListenerId`] and can later drop all of their callbacks at once, which is
//! how an HTML resource swaps its subscriptions on linked resources.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Notifications a resource publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceEvent {
    /// The text is about to be replaced.
    TextChanging,
    /// Text was (re)loaded from the backing file.
    LoadedFromDisk,
    /// The content was changed by an edit operation.
    Modified,
    /// A resource this one links to was updated on disk or deleted.
    LinkedResourceUpdated,
    /// The resource's file was rewritten.
    UpdatedOnDisk,
    /// The resource was removed from the book.
    Deleted,
}

/// Identity of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a process-wide unique listener id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ListenerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

type Callback = Arc<dyn Fn(&str, ResourceEvent) + Send + Sync>;

/// Ordered, synchronous event dispatch.
///
/// Callbacks receive the emitting resource's book path and the event.
#[derive(Default)]
pub struct EventHub {
    listeners: Mutex<Vec<(ListenerId, Callback)>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `listener`.
    pub fn connect<F>(&self, listener: ListenerId, callback: F)
    where
        F: Fn(&str, ResourceEvent) + Send + Sync + 'static,
    {
        self.lock().push((listener, Arc::new(callback)));
    }

    /// Remove every callback registered by `listener`. Returns how many were removed.
    pub fn disconnect(&self, listener: ListenerId) -> usize {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != listener);
        before - listeners.len()
    }

    pub fn is_connected(&self, listener: ListenerId) -> bool {
        self.lock().iter().any(|(id, _)| *id == listener)
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `event` to every callback in registration order.
    ///
    /// The callback list is snapshotted first so callbacks may connect,
    /// disconnect or emit on this hub without deadlocking.
    pub fn emit(&self, source: &str, event: ResourceEvent) {
        let snapshot: Vec<Callback> = self.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in snapshot {
            callback(source, event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Callback)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Seen = Arc<Mutex<Vec<(String, ResourceEvent)>>>;

    fn recorder() -> (Seen, impl Fn(&str, ResourceEvent) + Send + Sync + 'static) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |source: &str, event: ResourceEvent| {
            sink.lock().unwrap().push((source.to_string(), event));
        })
    }

    #[test]
    fn test_emit_reaches_listeners_in_order() {
        let hub = EventHub::new();
        let (seen, callback) = recorder();
        hub.connect(ListenerId::next(), callback);

        hub.emit("Text/a.xhtml", ResourceEvent::TextChanging);
        hub.emit("Text/a.xhtml", ResourceEvent::Modified);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("Text/a.xhtml".to_string(), ResourceEvent::TextChanging),
                ("Text/a.xhtml".to_string(), ResourceEvent::Modified),
            ]
        );
    }

    #[test]
    fn test_disconnect_removes_all_callbacks_of_listener() {
        let hub = EventHub::new();
        let a = ListenerId::next();
        let b = ListenerId::next();
        hub.connect(a, |_, _| {});
        hub.connect(a, |_, _| {});
        hub.connect(b, |_, _| {});

        assert_eq!(hub.disconnect(a), 2);
        assert!(!hub.is_connected(a));
        assert!(hub.is_connected(b));
        assert_eq!(hub.disconnect(a), 0);
    }

    #[test]
    fn test_callback_may_reenter_hub() {
        let hub = Arc::new(EventHub::new());
        let id = ListenerId::next();
        let weak = Arc::downgrade(&hub);
        hub.connect(id, move |_, _| {
            if let Some(hub) = weak.upgrade() {
                hub.disconnect(id);
            }
        });

        hub.emit("x", ResourceEvent::Deleted);
        assert_eq!(hub.listener_count(), 0);
    }
}
