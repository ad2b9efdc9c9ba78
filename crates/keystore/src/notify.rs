//! Status-change notification for the key store
//!
//! Observers register a callback and receive a reference to the store
//! whenever its lock state changes. Dispatch happens from a snapshot of
//! the listener list taken under the registry lock, so callbacks run with
//! no lock held and may query the store or re-register freely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by `register`, used to unregister a listener
pub type ListenerToken = u64;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Registry of status-changed listeners
pub(crate) struct StatusNotifier<T> {
    listeners: Mutex<Vec<(ListenerToken, Callback<T>)>>,
    next_token: AtomicU64,
}

impl<T> StatusNotifier<T> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Add a listener and return its token
    pub(crate) fn register(&self, callback: Callback<T>) -> ListenerToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((token, callback));
        token
    }

    /// Remove a listener; returns whether the token was known
    pub(crate) fn unregister(&self, token: ListenerToken) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(t, _)| *t != token);
        listeners.len() != before
    }

    /// Invoke every registered listener with `subject`.
    ///
    /// Callers must not hold the store mutex here.
    pub(crate) fn notify(&self, subject: &T) {
        let snapshot: Vec<Callback<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in snapshot {
            callback(subject);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_register_notify_unregister() {
        let notifier: StatusNotifier<u32> = StatusNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        let token = notifier.register(Arc::new(move |value: &u32| {
            assert_eq!(*value, 7);
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        notifier.notify(&7);
        notifier.notify(&7);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(notifier.unregister(token));
        assert!(!notifier.unregister(token));

        notifier.notify(&7);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reentrant_registration_from_callback() {
        let notifier: Arc<StatusNotifier<u32>> = Arc::new(StatusNotifier::new());

        let inner = Arc::clone(&notifier);
        notifier.register(Arc::new(move |_: &u32| {
            // Dispatch runs off a snapshot; touching the registry from a
            // callback must not deadlock.
            let token = inner.register(Arc::new(|_: &u32| {}));
            inner.unregister(token);
        }));

        notifier.notify(&1);
    }
}
