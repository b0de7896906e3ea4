//! Cascade Core
//!
//! This crate provides the core runtime for the Cascade reactive state
//! engine. It implements:
//!
//! - Reactive cells that record which computation read which key
//! - Effects that rerun exactly when a key they read changes
//! - Watches that deliver old/new snapshots at a configurable depth
//! - A task scheduler that batches and deduplicates deferred reruns
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: cells, boxed values, effects and dependency tracking
//! - `watch`: source normalization, snapshots and watch handles
//! - `scheduler`: keyed task queues and time-sliced drain cycles
//! - `error`: the error type shared by all of the above
//!
//! Everything is single-threaded. Each thread has its own tracking stack,
//! effect registry and scheduler.
//!
//! # Example
//!
//! ```rust,ignore
//! use cascade_core::{run_effect, wrap_boxed, EffectOptions};
//!
//! let count = wrap_boxed(0);
//!
//! let reader = count.clone();
//! let effect = run_effect(
//!     move |_| println!("count: {:?}", reader.get()),
//!     EffectOptions::sync(),
//! );
//!
//! count.set(5);
//! // Effect reruns before `set` returns, prints: "count: Int(5)"
//!
//! effect.stop();
//! ```

pub mod error;
pub mod reactive;
pub mod scheduler;
pub mod watch;

use std::any::Any;

pub use error::{ReactiveError, Result};
pub use reactive::{
    untrack, Effect, EffectOptions, EffectState, Flush, HostRef, Key, OnCleanup, Reactive, Ref,
    StopOptions, Value,
};
pub use scheduler::{schedule as schedule_task, SchedulerConfig, TaskKey, TaskOptions};
pub use watch::{watch, Deep, WatchHandle, WatchOptions, WatchSource, WatchSources};

/// Wrap a plain object or array in a reactive cell.
///
/// Wrapping a value that already holds a cell returns that same cell.
/// Primitives and host handles cannot be wrapped.
pub fn wrap_reactive(value: impl Into<Value>) -> Result<Reactive> {
    Reactive::wrap(value)
}

/// Wrap a single value in a reactive box.
pub fn wrap_boxed(value: impl Into<Value>) -> Ref {
    Ref::new(value)
}

/// Whether `value` is a reactive cell, or a [`Value`] holding one.
pub fn is_reactive(value: &dyn Any) -> bool {
    value.is::<Reactive>() || value.downcast_ref::<Value>().is_some_and(Value::is_reactive)
}

/// Whether `value` is a reactive box.
pub fn is_boxed(value: &dyn Any) -> bool {
    value.is::<Ref>()
}

/// Run `body` now and again whenever a key it read changes.
pub fn run_effect<F>(body: F, options: EffectOptions) -> Effect
where
    F: Fn(&OnCleanup) + 'static,
{
    Effect::with_options(body, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capability_checks() {
        let cell = wrap_reactive(json!({})).unwrap();
        let boxed = wrap_boxed(1);

        assert!(is_reactive(&cell));
        assert!(is_reactive(&Value::Reactive(cell.clone())));
        assert!(!is_reactive(&boxed));
        assert!(!is_reactive(&json!({})));

        assert!(is_boxed(&boxed));
        assert!(!is_boxed(&cell));
    }

    #[test]
    fn wrap_rejects_primitives() {
        assert_eq!(
            wrap_reactive(3).unwrap_err(),
            ReactiveError::NotWrappable { kind: "int" }
        );
    }
}
