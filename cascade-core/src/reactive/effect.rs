//! Effect Implementation
//!
//! An Effect is a side-effecting computation that reruns whenever a channel
//! it read during its last run is published.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately, with itself on
//!    top of the tracking stack, to collect its initial dependencies.
//!
//! 2. When any dependency is published, the effect either reruns on the
//!    spot (`Flush::Sync`) or queues a rerun with the scheduler, keyed by
//!    its id so N publishes before a drain produce one rerun.
//!
//! 3. Before rerunning, the effect runs its cleanups and detaches from every
//!    subscriber set it was in. The rerun collects dependencies from
//!    scratch, so a key read only in an earlier run stops triggering it.
//!
//! # Cleanup
//!
//! Bodies receive an [`OnCleanup`] registrar. Registered cleanups run, in
//! registration order, right before the next rerun and when the effect is
//! stopped.
//!
//! # Lifetime
//!
//! A live effect is owned by the runtime registry, not by its handle.
//! Dropping every [`Effect`] handle does not stop it; [`Effect::stop`] does.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::context::{untrack, ReactiveContext};
use super::runtime::{Reaction, Runtime};
use super::subscriber::{SubscriberId, SubscriberSet};
use crate::scheduler::{self, TaskKey, TaskOptions};

/// When reruns happen relative to the publish that triggered them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Flush {
    /// Queued with the scheduler.
    Pre,
    /// Queued with the scheduler.
    #[default]
    Post,
    /// Rerun inside the publishing write, before it returns.
    Sync,
}

/// Scheduling options for an effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectOptions {
    pub flush: Flush,
    /// Queue reruns in the scheduler's synchronous queue, which runs ahead
    /// of batched work in every drain cycle. Ignored for `Flush::Sync`.
    pub prom_sync: bool,
}

impl EffectOptions {
    /// Options for an effect that reruns synchronously.
    pub fn sync() -> Self {
        Self::default().flush(Flush::Sync)
    }

    pub fn flush(mut self, flush: Flush) -> Self {
        self.flush = flush;
        self
    }

    pub fn prom_sync(mut self, prom_sync: bool) -> Self {
        self.prom_sync = prom_sync;
        self
    }
}

/// Lifecycle state of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    Running,
    /// Publishes are ignored; dependencies stay registered.
    Paused,
    /// Terminal.
    Stopped,
}

/// Options for [`Effect::stop_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOptions {
    /// Run the pending cleanups before detaching.
    pub cleanup: bool,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self { cleanup: true }
    }
}

type Body = Rc<dyn Fn(&OnCleanup)>;
type Cleanup = Box<dyn FnOnce()>;

/// Registrar passed to effect bodies.
pub struct OnCleanup {
    effect: Weak<EffectInner>,
}

impl OnCleanup {
    /// Run `cleanup` before the next rerun, or when the effect stops.
    pub fn register<F>(&self, cleanup: F)
    where
        F: FnOnce() + 'static,
    {
        match self.effect.upgrade() {
            Some(effect) if effect.state.get() != EffectState::Stopped => {
                effect.cleanups.borrow_mut().push(Box::new(cleanup));
            }
            _ => tracing::warn!("cleanup registered on a stopped effect; ignored"),
        }
    }
}

pub(crate) struct EffectInner {
    id: SubscriberId,
    self_weak: Weak<EffectInner>,
    tracked: RefCell<Option<Body>>,
    untracked: RefCell<Option<Body>>,
    options: EffectOptions,
    state: Cell<EffectState>,
    cleanups: RefCell<SmallVec<[Cleanup; 2]>>,
    /// Reverse index: every set this effect is a member of, by set id.
    deps: RefCell<IndexMap<u64, Rc<SubscriberSet>>>,
    run_count: Cell<usize>,
}

impl EffectInner {
    fn run(self: &Rc<Self>) {
        if self.state.get() == EffectState::Stopped {
            return;
        }

        self.run_cleanups();
        self.detach();
        self.run_count.set(self.run_count.get() + 1);
        tracing::trace!(effect = self.id.raw(), run = self.run_count.get(), "running effect");

        let on_cleanup = OnCleanup {
            effect: Rc::downgrade(self),
        };

        let tracked = self.tracked.borrow().clone();
        if let Some(body) = tracked {
            let _ctx = ReactiveContext::enter(self.clone());
            body(&on_cleanup);
        }

        // Stopped from inside its own body: drop anything collected after.
        if self.state.get() == EffectState::Stopped {
            self.detach();
            return;
        }

        let untracked = self.untracked.borrow().clone();
        if let Some(body) = untracked {
            untrack(|| body(&on_cleanup));
        }
    }

    fn run_queued(self: &Rc<Self>) {
        match self.state.get() {
            EffectState::Running => self.run(),
            state => {
                tracing::debug!(effect = self.id.raw(), ?state, "skipping queued rerun");
            }
        }
    }

    fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
    }

    fn detach(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for set in deps.into_values() {
            set.remove(self.id);
        }
    }

    fn stop(&self, options: StopOptions) {
        if self.state.replace(EffectState::Stopped) == EffectState::Stopped {
            return;
        }

        if options.cleanup {
            self.run_cleanups();
        } else {
            self.cleanups.borrow_mut().clear();
        }
        self.detach();
        Runtime::unregister(self.id);

        // Bodies may capture handles to this effect.
        self.tracked.borrow_mut().take();
        self.untracked.borrow_mut().take();
        tracing::debug!(effect = self.id.raw(), "effect stopped");
    }
}

impl Reaction for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn track(&self, set: &Rc<SubscriberSet>) {
        self.deps
            .borrow_mut()
            .entry(set.id())
            .or_insert_with(|| set.clone());
    }

    fn notify(&self) {
        match self.state.get() {
            EffectState::Running => {}
            EffectState::Paused => {
                tracing::trace!(effect = self.id.raw(), "paused effect ignored publish");
                return;
            }
            EffectState::Stopped => return,
        }

        match self.options.flush {
            Flush::Sync => {
                if let Some(effect) = self.self_weak.upgrade() {
                    effect.run();
                }
            }
            Flush::Pre | Flush::Post => {
                let effect = self.self_weak.clone();
                scheduler::schedule(
                    move || {
                        if let Some(effect) = effect.upgrade() {
                            effect.run_queued();
                        }
                    },
                    Some(TaskKey::from(self.id)),
                    TaskOptions {
                        sync: self.options.prom_sync,
                    },
                );
            }
        }
    }
}

/// Handle to a running effect.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
///
/// let effect = Effect::with_options(
///     move |_| println!("count is {}", count.get().as_i64().unwrap_or(0)),
///     EffectOptions::sync(),
/// );
///
/// effect.stop();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create an effect with default options and run it once.
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&OnCleanup) + 'static,
    {
        Self::with_options(body, EffectOptions::default())
    }

    /// Create an effect and run it once.
    ///
    /// The first run is always synchronous, whatever the flush mode.
    pub fn with_options<F>(body: F, options: EffectOptions) -> Self
    where
        F: Fn(&OnCleanup) + 'static,
    {
        Self::build(Some(Rc::new(body)), None, options)
    }

    /// Create an effect from a tracked body and a body that runs after it,
    /// on every run, with collection suspended.
    pub(crate) fn build(tracked: Option<Body>, untracked: Option<Body>, options: EffectOptions) -> Self {
        let inner = Rc::new_cyclic(|self_weak| EffectInner {
            id: SubscriberId::new(),
            self_weak: self_weak.clone(),
            tracked: RefCell::new(tracked),
            untracked: RefCell::new(untracked),
            options,
            state: Cell::new(EffectState::Running),
            cleanups: RefCell::new(SmallVec::new()),
            deps: RefCell::new(IndexMap::new()),
            run_count: Cell::new(0),
        });

        Runtime::register(inner.clone());
        tracing::debug!(effect = inner.id.raw(), flush = ?options.flush, "effect created");

        inner.run();
        Self { inner }
    }

    /// Run cleanups, detach from every dependency and stop for good.
    pub fn stop(&self) {
        self.stop_with(StopOptions::default());
    }

    pub fn stop_with(&self, options: StopOptions) {
        self.inner.stop(options);
    }

    /// Ignore publishes until [`resume`](Self::resume). Missed publishes are
    /// not replayed.
    pub fn pause(&self) {
        match self.inner.state.get() {
            EffectState::Stopped => tracing::warn!(effect = self.inner.id.raw(), "pause on a stopped effect; ignored"),
            _ => self.inner.state.set(EffectState::Paused),
        }
    }

    pub fn resume(&self) {
        match self.inner.state.get() {
            EffectState::Stopped => tracing::warn!(effect = self.inner.id.raw(), "resume on a stopped effect; ignored"),
            _ => self.inner.state.set(EffectState::Running),
        }
    }

    pub fn state(&self) -> EffectState {
        self.inner.state.get()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == EffectState::Stopped
    }

    /// How many times the body has started.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of channels the last run subscribed to.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    pub fn options(&self) -> EffectOptions {
        self.inner.options
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}
