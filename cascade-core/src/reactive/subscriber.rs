//! Subscriber types for the reactive system.
//!
//! A subscriber is any re-runnable computation (an effect, or a watcher built
//! on one). Cells never hold subscribers directly: each channel of a cell owns
//! a [`SubscriberSet`] of ids, and the runtime registry resolves ids to live
//! computations at publish time.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

/// Unique identifier for a subscriber.
///
/// Each effect gets a unique ID when created. This ID is used to track
/// dependencies, deduplicate reruns and key scheduled tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Position of one subscription in the thread's overall subscription order.
///
/// Every insertion into any set takes the next sequence number, so members
/// of different sets can be merged back into the order they subscribed in.
pub type Subscription = u64;

fn next_subscription() -> Subscription {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// The subscribers currently registered against one channel of a cell.
///
/// Membership is kept in registration order, which is the order synchronous
/// subscribers are rerun in. Effects keep a reverse index of every set they
/// appear in so they can detach in O(subscribed channels).
#[derive(Debug)]
pub struct SubscriberSet {
    id: u64,
    members: RefCell<IndexMap<SubscriberId, Subscription>>,
}

impl SubscriberSet {
    /// Create an empty set.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            members: RefCell::new(IndexMap::new()),
        }
    }

    /// Identity of this set, used to deduplicate reverse-index entries.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Add a subscriber. Returns `false` if it was already present, in
    /// which case its original position is kept.
    pub fn insert(&self, subscriber: SubscriberId) -> bool {
        let mut members = self.members.borrow_mut();
        if members.contains_key(&subscriber) {
            return false;
        }
        members.insert(subscriber, next_subscription());
        true
    }

    /// Remove a subscriber, keeping the order of the rest.
    pub fn remove(&self, subscriber: SubscriberId) -> bool {
        self.members.borrow_mut().shift_remove(&subscriber).is_some()
    }

    pub fn contains(&self, subscriber: SubscriberId) -> bool {
        self.members.borrow().contains_key(&subscriber)
    }

    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    /// Copy out the members so callers can dispatch without holding a borrow.
    pub fn snapshot(&self) -> Vec<SubscriberId> {
        self.members.borrow().keys().copied().collect()
    }

    /// Members with the position at which each subscribed.
    pub fn subscriptions(&self) -> Vec<(SubscriberId, Subscription)> {
        self.members
            .borrow()
            .iter()
            .map(|(id, seq)| (*id, *seq))
            .collect()
    }
}

impl Default for SubscriberSet {
    fn default() -> Self {
        Self::new()
    }
}
