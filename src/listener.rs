// Copyright (c) 2026 the replisource developers. Licensed under the MIT license.
// See LICENSE file in the project root for full license text.

//! Listener traits and the identity-keyed listener set.
//!
//! Each facade owns one [`ListenerSet`] per listener kind. Membership is
//! keyed on `Arc` pointer identity: adding the same `Arc` twice is a no-op
//! that reports `false`, two distinct `Arc`s wrapping equal values are two
//! members. Listeners are invoked sequentially, in registration order,
//! never concurrently for the same facade.

use crate::error::ReplicationError;
use crate::event::Event;
use std::sync::Arc;

/// Callback invoked with every raw chunk read from the transport,
/// before any decoding.
pub trait RawByteListener: Send + Sync {
    fn handle(&self, bytes: &[u8]);
}

/// Callback invoked with every decoded high-level event.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Callback invoked exactly once when the facade transitions to `Closed`,
/// whether the stream ended gracefully or due to an error.
pub trait CloseListener: Send + Sync {
    fn on_close(&self);
}

/// Callback invoked for every internal error before it escapes `open()`.
pub trait ExceptionListener: Send + Sync {
    fn on_exception(&self, error: &ReplicationError);
}

/// An ordered set of listeners keyed on `Arc` identity.
pub struct ListenerSet<T: ?Sized> {
    items: Vec<Arc<T>>,
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. Returns `false` when the same `Arc` is already a
    /// member (membership unchanged).
    pub fn add(&mut self, listener: Arc<T>) -> bool {
        if self.items.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        self.items.push(listener);
        true
    }

    /// Remove a listener. Returns whether it was a member.
    pub fn remove(&mut self, listener: &Arc<T>) -> bool {
        let before = self.items.len();
        self.items.retain(|l| !Arc::ptr_eq(l, listener));
        self.items.len() != before
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl CloseListener for Counter {
        fn on_close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_is_idempotent_by_identity() {
        let mut set: ListenerSet<dyn CloseListener> = ListenerSet::new();
        let listener: Arc<dyn CloseListener> = Arc::new(Counter(AtomicUsize::new(0)));
        assert!(set.add(listener.clone()));
        assert!(!set.add(listener.clone()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_distinct_arcs_are_distinct_members() {
        let mut set: ListenerSet<dyn CloseListener> = ListenerSet::new();
        let a: Arc<dyn CloseListener> = Arc::new(Counter(AtomicUsize::new(0)));
        let b: Arc<dyn CloseListener> = Arc::new(Counter(AtomicUsize::new(0)));
        assert!(set.add(a));
        assert!(set.add(b));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_remove_reports_membership_change() {
        let mut set: ListenerSet<dyn CloseListener> = ListenerSet::new();
        let listener: Arc<dyn CloseListener> = Arc::new(Counter(AtomicUsize::new(0)));
        assert!(!set.remove(&listener));
        set.add(listener.clone());
        assert!(set.remove(&listener));
        assert!(!set.remove(&listener));
        assert!(set.is_empty());
    }

    #[test]
    fn test_iteration_preserves_registration_order() {
        let mut set: ListenerSet<dyn CloseListener> = ListenerSet::new();
        let first: Arc<dyn CloseListener> = Arc::new(Counter(AtomicUsize::new(0)));
        let second: Arc<dyn CloseListener> = Arc::new(Counter(AtomicUsize::new(0)));
        set.add(first.clone());
        set.add(second.clone());
        let order: Vec<_> = set.iter().cloned().collect();
        assert!(Arc::ptr_eq(&order[0], &first));
        assert!(Arc::ptr_eq(&order[1], &second));
    }
}
