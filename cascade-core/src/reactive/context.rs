//! Reactive Context
//!
//! The reactive context tracks which computation is currently collecting
//! dependencies. When a cell channel is read, the computation on top of the
//! stack is registered in that channel's subscriber set, and the set is
//! recorded in the computation's reverse index.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running an effect body pushes the effect;
//! the guard pops it when dropped, including during a panic unwind. Nested
//! effect creation pushes on top, so an inner effect never steals the reads
//! of the outer one. An untracked entry suspends collection for the closure
//! passed to [`untrack`].

use std::cell::RefCell;
use std::rc::Rc;

use super::runtime::Reaction;
use super::subscriber::{SubscriberId, SubscriberSet};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// An entry in the reactive context stack.
#[derive(Clone)]
struct ContextEntry {
    /// The collecting computation, or `None` while collection is suspended.
    reaction: Option<Rc<dyn Reaction>>,
}

impl ContextEntry {
    fn subscriber_id(&self) -> Option<SubscriberId> {
        self.reaction.as_ref().map(|r| r.subscriber_id())
    }
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a collecting context for the given reaction.
    ///
    /// While this context is active, every tracked read registers the
    /// reaction as a subscriber of the channel that was read.
    pub fn enter(reaction: Rc<dyn Reaction>) -> Self {
        let subscriber_id = Some(reaction.subscriber_id());
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                reaction: Some(reaction),
            });
        });

        Self { subscriber_id }
    }

    /// Enter a context in which reads are not collected.
    pub fn suspend() -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry { reaction: None });
        });

        Self { subscriber_id: None }
    }

    /// Check if a computation is currently collecting dependencies.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the collecting subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(ContextEntry::subscriber_id))
    }

    /// Depth of the context stack, counting suspended entries.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// Record that the current computation read the channel owning `set`.
    ///
    /// Called by cells on every tracked read. Does nothing when no
    /// computation is collecting.
    pub fn track(set: &Rc<SubscriberSet>) {
        let reaction = CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.reaction.clone())
        });

        if let Some(reaction) = reaction {
            set.insert(reaction.subscriber_id());
            reaction.track(set);
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id(),
                    self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id,
                    entry.subscriber_id()
                );
            }
        });
    }
}

/// Run `f` without collecting any dependencies.
///
/// Reads inside `f` return current values but never subscribe the
/// surrounding effect.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::suspend();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Collector {
        id: SubscriberId,
        tracked: Cell<usize>,
    }

    impl Collector {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: SubscriberId::new(),
                tracked: Cell::new(0),
            })
        }
    }

    impl Reaction for Collector {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn track(&self, _set: &Rc<SubscriberSet>) {
            self.tracked.set(self.tracked.get() + 1);
        }

        fn notify(&self) {}
    }

    #[test]
    fn context_tracks_subscriber() {
        let collector = Collector::new();
        let id = collector.id;

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(collector);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn track_registers_in_set_and_reverse_index() {
        let collector = Collector::new();
        let set = Rc::new(SubscriberSet::new());

        {
            let _ctx = ReactiveContext::enter(collector.clone());
            ReactiveContext::track(&set);
        }

        assert!(set.contains(collector.id));
        assert_eq!(collector.tracked.get(), 1);

        // Outside any context nothing is recorded.
        let other = Rc::new(SubscriberSet::new());
        ReactiveContext::track(&other);
        assert!(other.is_empty());
    }

    #[test]
    fn nested_contexts() {
        let outer = Collector::new();
        let inner = Collector::new();
        let (id1, id2) = (outer.id, inner.id);

        {
            let _ctx1 = ReactiveContext::enter(outer);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(inner);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn untrack_suspends_collection() {
        let collector = Collector::new();
        let set = Rc::new(SubscriberSet::new());

        let _ctx = ReactiveContext::enter(collector.clone());
        untrack(|| {
            assert!(!ReactiveContext::is_active());
            ReactiveContext::track(&set);
        });

        assert!(set.is_empty());
        assert!(ReactiveContext::is_active());
    }

    #[test]
    fn guard_pops_on_panic() {
        let collector = Collector::new();
        let depth = ReactiveContext::depth();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = ReactiveContext::enter(collector);
            panic!("body failed");
        }));

        assert!(result.is_err());
        assert_eq!(ReactiveContext::depth(), depth);
    }
}
