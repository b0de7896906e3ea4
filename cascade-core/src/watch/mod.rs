//! Watch Layer
//!
//! A watch is an effect split in two: a tracked half that reads the sources
//! and snapshots them, and an untracked half that hands the callback the new
//! snapshot and the one from the previous call.
//!
//! # Snapshots
//!
//! On the first call the old and new snapshots are equal. Afterwards the old
//! snapshot is whatever the callback saw as new last time. With several
//! sources both snapshots are arrays in source order, and a change to any
//! one source delivers the current values of all of them.
//!
//! # Depth
//!
//! By default only the source reads are tracked. [`Deep`] makes the watch
//! copy (and so track) that many levels below each source. A watch with at
//! least one reactive cell among its sources is treated as depth one when no
//! depth was asked for, since the cell handle itself never changes.

mod source;
mod traverse;

pub use source::{WatchSource, WatchSources};
pub use traverse::{snapshot, Deep};

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::reactive::{Effect, EffectOptions, EffectState, Flush, OnCleanup, StopOptions, Value};

/// Options for [`watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub deep: Deep,
    pub flush: Flush,
    pub prom_sync: bool,
}

impl WatchOptions {
    pub fn deep(mut self, deep: impl Into<Deep>) -> Self {
        self.deep = deep.into();
        self
    }

    pub fn flush(mut self, flush: Flush) -> Self {
        self.flush = flush;
        self
    }

    pub fn prom_sync(mut self, prom_sync: bool) -> Self {
        self.prom_sync = prom_sync;
        self
    }

    fn effect_options(&self) -> EffectOptions {
        EffectOptions::default()
            .flush(self.flush)
            .prom_sync(self.prom_sync)
    }
}

#[derive(Default)]
struct Snapshots {
    new: Value,
    old: Value,
    first: bool,
}

/// Watch `sources` and call `callback(new, old, on_cleanup)` whenever they
/// change, and once right away.
///
/// Fails with [`ReactiveError::EmptyWatchSources`](crate::ReactiveError)
/// when given an empty source list.
///
/// # Example
///
/// ```rust,ignore
/// let count = Ref::new(0);
/// let handle = watch(
///     count.clone(),
///     |new, old, _| println!("{old:?} -> {new:?}"),
///     WatchOptions::default().flush(Flush::Sync),
/// )?;
/// count.set(1); // prints Int(0) -> Int(1)
/// ```
pub fn watch<S, F>(sources: S, callback: F, options: WatchOptions) -> Result<WatchHandle>
where
    S: Into<WatchSources>,
    F: Fn(&Value, &Value, &OnCleanup) + 'static,
{
    let sources = sources.into();
    sources.validate()?;

    let deep = if options.deep == Deep::Shallow && sources.any_reactive() {
        Deep::Levels(1)
    } else {
        options.deep
    };
    tracing::debug!(?sources, ?deep, "creating watch");

    let state = Rc::new(RefCell::new(Snapshots {
        first: true,
        ..Snapshots::default()
    }));

    let read_state = state.clone();
    let read = move |_: &OnCleanup| {
        let new = match &sources {
            WatchSources::Single(source) => snapshot(&source.read(), deep),
            WatchSources::Many(sources) => Value::Array(
                sources
                    .iter()
                    .map(|source| snapshot(&source.read(), deep))
                    .collect(),
            ),
        };

        let mut state = read_state.borrow_mut();
        if state.first {
            state.old = new.clone();
            state.first = false;
        }
        state.new = new;
    };

    let notify = move |on_cleanup: &OnCleanup| {
        // Record the delivered value before calling out: the callback may
        // write a source and rerun this watch synchronously.
        let (new, old) = {
            let mut state = state.borrow_mut();
            let new = state.new.clone();
            let old = std::mem::replace(&mut state.old, new.clone());
            (new, old)
        };
        callback(&new, &old, on_cleanup);
    };

    let effect = Effect::build(
        Some(Rc::new(read)),
        Some(Rc::new(notify)),
        options.effect_options(),
    );
    Ok(WatchHandle { effect })
}

/// Handle to a running watch.
#[derive(Clone)]
pub struct WatchHandle {
    effect: Effect,
}

impl WatchHandle {
    pub fn stop(&self) {
        self.effect.stop();
    }

    pub fn stop_with(&self, options: StopOptions) {
        self.effect.stop_with(options);
    }

    pub fn pause(&self) {
        self.effect.pause();
    }

    pub fn resume(&self) {
        self.effect.resume();
    }

    pub fn state(&self) -> EffectState {
        self.effect.state()
    }

    /// The effect driving this watch.
    pub fn effect(&self) -> &Effect {
        &self.effect
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle").field("effect", &self.effect).finish()
    }
}
