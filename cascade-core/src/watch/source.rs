//! Watch sources.
//!
//! A source is resolved to one of three kinds when the watch is created and
//! never re-inspected afterwards.

use std::fmt;
use std::rc::Rc;

use crate::error::{ReactiveError, Result};
use crate::reactive::{Reactive, Ref, Value};

/// Something a watch can read.
#[derive(Clone)]
pub enum WatchSource {
    /// Reads `value` of the box.
    Boxed(Ref),
    /// Calls the getter; whatever it reads is tracked.
    Getter(Rc<dyn Fn() -> Value>),
    /// Yields the cell itself. Depth decides how much of it is tracked.
    Reactive(Reactive),
}

impl WatchSource {
    pub fn getter<F>(getter: F) -> Self
    where
        F: Fn() -> Value + 'static,
    {
        WatchSource::Getter(Rc::new(getter))
    }

    /// Resolve a dynamic value. Only reactive cells are valid sources.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Reactive(cell) => Ok(WatchSource::Reactive(cell)),
            other => Err(ReactiveError::InvalidWatchSource { kind: other.kind() }),
        }
    }

    pub fn is_reactive(&self) -> bool {
        matches!(self, WatchSource::Reactive(_))
    }

    /// Read the source, tracking whatever the read touches.
    pub(crate) fn read(&self) -> Value {
        match self {
            WatchSource::Boxed(boxed) => boxed.get(),
            WatchSource::Getter(getter) => getter(),
            WatchSource::Reactive(cell) => Value::Reactive(cell.clone()),
        }
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Boxed(boxed) => f.debug_tuple("Boxed").field(&boxed.id()).finish(),
            WatchSource::Getter(_) => f.write_str("Getter(..)"),
            WatchSource::Reactive(cell) => f.debug_tuple("Reactive").field(&cell.id()).finish(),
        }
    }
}

impl From<Ref> for WatchSource {
    fn from(boxed: Ref) -> Self {
        WatchSource::Boxed(boxed)
    }
}

impl From<Reactive> for WatchSource {
    fn from(cell: Reactive) -> Self {
        WatchSource::Reactive(cell)
    }
}

impl TryFrom<Value> for WatchSource {
    type Error = ReactiveError;

    fn try_from(value: Value) -> Result<Self> {
        WatchSource::from_value(value)
    }
}

/// One source, or an ordered list of them.
#[derive(Clone, Debug)]
pub enum WatchSources {
    Single(WatchSource),
    /// Delivered to the callback as a `Value::Array` in source order.
    Many(Vec<WatchSource>),
}

impl WatchSources {
    pub(crate) fn any_reactive(&self) -> bool {
        match self {
            WatchSources::Single(source) => source.is_reactive(),
            WatchSources::Many(sources) => sources.iter().any(WatchSource::is_reactive),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            WatchSources::Many(sources) if sources.is_empty() => Err(ReactiveError::EmptyWatchSources),
            _ => Ok(()),
        }
    }
}

impl From<WatchSource> for WatchSources {
    fn from(source: WatchSource) -> Self {
        WatchSources::Single(source)
    }
}

impl From<Ref> for WatchSources {
    fn from(boxed: Ref) -> Self {
        WatchSources::Single(boxed.into())
    }
}

impl From<Reactive> for WatchSources {
    fn from(cell: Reactive) -> Self {
        WatchSources::Single(cell.into())
    }
}

impl From<Vec<WatchSource>> for WatchSources {
    fn from(sources: Vec<WatchSource>) -> Self {
        WatchSources::Many(sources)
    }
}

impl<const N: usize> From<[WatchSource; N]> for WatchSources {
    fn from(sources: [WatchSource; N]) -> Self {
        WatchSources::Many(sources.into())
    }
}
