//! Reactive Runtime
//!
//! The runtime is the central registry that connects cells and effects.
//! Subscriber sets only store [`SubscriberId`]s; the runtime maps each id to
//! the live computation, so stopping an effect is a matter of detaching it
//! from its sets and dropping it from the registry.
//!
//! # How It Works
//!
//! 1. When an effect is created, it registers with the runtime.
//!
//! 2. When an effect body reads a cell channel, the context records the
//!    dependency on both sides (set membership and reverse index).
//!
//! 3. When a channel is published, the runtime:
//!    a. Deduplicates the subscriber ids across every matched channel and
//!       orders them by when they subscribed
//!    b. Resolves each id to a live reaction, at dispatch time
//!    c. Asks the reaction to rerun (now or via the scheduler)
//!
//! # Threading
//!
//! The registry is thread-local. The engine is single-threaded and
//! cooperative; every structure here is mutated synchronously inside a read,
//! write, stop or rerun, so no locking is needed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use super::context::ReactiveContext;
use super::subscriber::{SubscriberId, SubscriberSet, Subscription};

/// A computation that can be subscribed to cell channels.
pub trait Reaction {
    /// Get the subscriber ID for this computation.
    fn subscriber_id(&self) -> SubscriberId;

    /// Record that the current run read the channel owning `set`.
    fn track(&self, set: &Rc<SubscriberSet>);

    /// A channel this computation depends on was published.
    fn notify(&self);
}

thread_local! {
    static REGISTRY: RefCell<HashMap<SubscriberId, Rc<dyn Reaction>>> =
        RefCell::new(HashMap::new());
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Register a computation so publishes can reach it.
    pub fn register(reaction: Rc<dyn Reaction>) {
        let id = reaction.subscriber_id();
        REGISTRY.with(|registry| {
            registry.borrow_mut().insert(id, reaction);
        });
    }

    /// Remove a computation from the registry.
    ///
    /// Callers are responsible for detaching it from its subscriber sets.
    pub fn unregister(id: SubscriberId) -> Option<Rc<dyn Reaction>> {
        REGISTRY.with(|registry| registry.borrow_mut().remove(&id))
    }

    /// Resolve an id to its live computation.
    pub fn lookup(id: SubscriberId) -> Option<Rc<dyn Reaction>> {
        REGISTRY.with(|registry| registry.borrow().get(&id).cloned())
    }

    pub fn is_registered(id: SubscriberId) -> bool {
        REGISTRY.with(|registry| registry.borrow().contains_key(&id))
    }

    /// Number of live computations on this thread.
    pub fn reaction_count() -> usize {
        REGISTRY.with(|registry| registry.borrow().len())
    }

    /// Notify every subscriber in `sets` exactly once.
    ///
    /// Ids are deduplicated across all sets and notified in subscription
    /// order: an id subscribed to several of the sets takes the position of
    /// its earliest subscription. The order of `sets` does not matter.
    ///
    /// Each id is resolved right before it is notified, so a computation
    /// stopped by an earlier synchronous rerun in the same publish is
    /// skipped.
    pub fn publish<'a, I>(sets: I) -> usize
    where
        I: IntoIterator<Item = &'a Rc<SubscriberSet>>,
    {
        let mut ids: IndexMap<SubscriberId, Subscription> = IndexMap::new();
        for set in sets {
            for (id, seq) in set.subscriptions() {
                ids.entry(id)
                    .and_modify(|earliest| *earliest = (*earliest).min(seq))
                    .or_insert(seq);
            }
        }

        if ids.is_empty() {
            tracing::trace!("publish reached no subscribers");
            return 0;
        }
        ids.sort_by(|_, a, _, b| a.cmp(b));

        let mut notified = 0;
        for id in ids.into_keys() {
            match Self::lookup(id) {
                Some(reaction) => {
                    tracing::trace!(subscriber = id.raw(), "dispatching rerun");
                    reaction.notify();
                    notified += 1;
                }
                None => tracing::trace!(subscriber = id.raw(), "skipping stopped subscriber"),
            }
        }
        notified
    }

    /// Get the subscriber currently collecting dependencies, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a collecting context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct MockReaction {
        id: SubscriberId,
        notified: Cell<usize>,
    }

    impl MockReaction {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: SubscriberId::new(),
                notified: Cell::new(0),
            })
        }
    }

    impl Reaction for MockReaction {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn track(&self, _set: &Rc<SubscriberSet>) {}

        fn notify(&self) {
            self.notified.set(self.notified.get() + 1);
        }
    }

    #[test]
    fn runtime_registers_and_unregisters() {
        let reaction = MockReaction::new();
        let id = reaction.id;

        Runtime::register(reaction);
        assert!(Runtime::is_registered(id));

        assert!(Runtime::unregister(id).is_some());
        assert!(!Runtime::is_registered(id));
        assert!(Runtime::lookup(id).is_none());
    }

    #[test]
    fn publish_deduplicates_across_sets() {
        let shared = MockReaction::new();
        let only_b = MockReaction::new();
        Runtime::register(shared.clone());
        Runtime::register(only_b.clone());

        let a = Rc::new(SubscriberSet::new());
        let b = Rc::new(SubscriberSet::new());
        a.insert(shared.id);
        b.insert(shared.id);
        b.insert(only_b.id);

        let notified = Runtime::publish([&a, &b]);

        assert_eq!(notified, 2);
        assert_eq!(shared.notified.get(), 1);
        assert_eq!(only_b.notified.get(), 1);

        Runtime::unregister(shared.id);
        Runtime::unregister(only_b.id);
    }

    struct Ordered {
        id: SubscriberId,
        log: Rc<RefCell<Vec<SubscriberId>>>,
    }

    impl Reaction for Ordered {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn track(&self, _set: &Rc<SubscriberSet>) {}

        fn notify(&self) {
            self.log.borrow_mut().push(self.id);
        }
    }

    #[test]
    fn publish_follows_subscription_order_across_sets() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let early = SubscriberId::new();
        let late = SubscriberId::new();
        for id in [early, late] {
            Runtime::register(Rc::new(Ordered { id, log: log.clone() }));
        }

        let key = Rc::new(SubscriberSet::new());
        let whole = Rc::new(SubscriberSet::new());
        whole.insert(early);
        key.insert(late);

        // The key's set is listed first, but `early` subscribed first.
        Runtime::publish([&key, &whole]);
        assert_eq!(*log.borrow(), vec![early, late]);

        Runtime::unregister(early);
        Runtime::unregister(late);
    }

    #[test]
    fn publish_skips_unregistered_ids() {
        let reaction = MockReaction::new();
        let set = Rc::new(SubscriberSet::new());
        set.insert(reaction.id);

        // Never registered: the id is stale.
        assert_eq!(Runtime::publish([&set]), 0);
        assert_eq!(reaction.notified.get(), 0);
    }

    #[test]
    fn publish_with_no_subscribers_is_a_no_op() {
        let set = Rc::new(SubscriberSet::new());
        assert_eq!(Runtime::publish([&set]), 0);
    }
}
