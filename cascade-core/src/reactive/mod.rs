//! Reactive Primitives
//!
//! This module implements the dependency store and the effect runtime: cells,
//! boxed values and effects. They form the foundation of Cascade's
//! fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A [`Reactive`] cell wraps one plain object or array. Every read through
//! the cell registers the running effect against the key that was read;
//! every write publishes to exactly the effects registered against that key.
//! Nested objects and arrays become cells of their own the first time they
//! are read.
//!
//! ## Boxed values
//!
//! A [`Ref`] is a one-field cell. It makes a single primitive trackable.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that reruns whenever a key it read during
//! its last run changes. Reruns happen inside the publishing write
//! (`Flush::Sync`) or through the scheduler.
//!
//! # Implementation Notes
//!
//! A thread-local tracking stack records which effect is collecting reads.
//! Channels hold subscriber ids rather than effects; the [`Runtime`]
//! registry resolves ids to live effects at publish time, and each effect
//! keeps a reverse index of the channels it is subscribed to so stopping
//! and rerunning can detach it cheaply.

mod boxed;
mod cell;
mod context;
mod effect;
mod runtime;
mod subscriber;
mod value;

pub use boxed::Ref;
pub use cell::{CellId, Channel, Reactive};
pub use context::{untrack, ReactiveContext};
pub use effect::{Effect, EffectOptions, EffectState, Flush, OnCleanup, StopOptions};
pub use runtime::{Reaction, Runtime};
pub use subscriber::{SubscriberId, SubscriberSet, Subscription};
pub use value::{HostRef, Key, Value};
