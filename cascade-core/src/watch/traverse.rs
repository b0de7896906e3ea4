//! Depth-bounded snapshots.
//!
//! Cells are mutated in place, so a watch cannot hand its callback the
//! previous state by keeping a handle. Instead each run copies the watched
//! value down to the configured depth. The copy reads every key it visits,
//! which is also how a deep watch subscribes to nested keys.
//!
//! Below the depth limit values are left as they are: a nested cell stays a
//! live handle.

use std::collections::HashMap;

use crate::reactive::{CellId, Value};

/// How far below a source a watch descends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Deep {
    /// Only the source read itself is tracked.
    #[default]
    Shallow,
    /// Descend this many levels, reading every key on the way.
    Levels(usize),
    Unbounded,
}

impl Deep {
    /// The depth for children, or `None` if this level is not copied.
    fn descend(self) -> Option<Deep> {
        match self {
            Deep::Shallow | Deep::Levels(0) => None,
            Deep::Levels(n) => Some(Deep::Levels(n - 1)),
            Deep::Unbounded => Some(Deep::Unbounded),
        }
    }

    pub fn is_shallow(self) -> bool {
        self.descend().is_none()
    }
}

impl From<bool> for Deep {
    fn from(deep: bool) -> Self {
        if deep {
            Deep::Unbounded
        } else {
            Deep::Shallow
        }
    }
}

impl From<usize> for Deep {
    fn from(levels: usize) -> Self {
        Deep::Levels(levels)
    }
}

enum Visit {
    InProgress,
    Done(Value),
}

/// Copy `value` down to `deep` levels, tracking every key read.
///
/// A cell reached twice yields the same copy; a cell reached while it is
/// still being copied (a cycle) yields its live handle.
pub fn snapshot(value: &Value, deep: Deep) -> Value {
    Traversal::default().visit(value, deep)
}

#[derive(Default)]
struct Traversal {
    seen: HashMap<CellId, Visit>,
}

impl Traversal {
    fn visit(&mut self, value: &Value, deep: Deep) -> Value {
        let Some(child) = deep.descend() else {
            return value.clone();
        };

        match value {
            Value::Reactive(cell) => {
                let id = cell.id();
                match self.seen.get(&id) {
                    Some(Visit::InProgress) => return value.clone(),
                    Some(Visit::Done(copy)) => return copy.clone(),
                    None => {}
                }

                self.seen.insert(id, Visit::InProgress);
                let copy = if cell.is_array() {
                    Value::Array(cell.values().iter().map(|item| self.visit(item, child)).collect())
                } else {
                    Value::Object(
                        cell.entries()
                            .into_iter()
                            .map(|(key, item)| (key.to_string(), self.visit(&item, child)))
                            .collect(),
                    )
                };
                self.seen.insert(id, Visit::Done(copy.clone()));
                copy
            }
            Value::Array(items) => Value::Array(items.iter().map(|item| self.visit(item, child)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| (key.clone(), self.visit(item, child)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, EffectOptions, Reactive};
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn depth_conversions() {
        assert_eq!(Deep::from(true), Deep::Unbounded);
        assert_eq!(Deep::from(false), Deep::Shallow);
        assert_eq!(Deep::from(2usize), Deep::Levels(2));
        assert!(Deep::Levels(0).is_shallow());
    }

    #[test]
    fn levels_stop_at_live_handles() {
        let cell = Reactive::wrap(json!({"a": {"b": {"c": 1}}})).unwrap();
        let copy = snapshot(&Value::Reactive(cell), Deep::Levels(1));

        let Value::Object(top) = &copy else {
            panic!("expected a plain object, got {}", copy.kind());
        };
        assert!(top["a"].is_reactive());
    }

    #[test]
    fn unbounded_copies_everything() {
        let cell = Reactive::wrap(json!({"a": {"b": [1, 2]}, "n": null})).unwrap();
        let copy = snapshot(&Value::Reactive(cell), Deep::Unbounded);

        assert_eq!(copy, Value::from(json!({"a": {"b": [1, 2]}, "n": null})));
    }

    #[test]
    fn copies_do_not_follow_later_writes() {
        let cell = Reactive::wrap(json!({"v": 0})).unwrap();
        let before = snapshot(&Value::Reactive(cell.clone()), Deep::Unbounded);

        cell.set("v", 1);
        assert_eq!(before.to_json(), json!({"v": 0}));
    }

    #[test]
    fn cycles_terminate_with_the_live_handle() {
        let cell = Reactive::object();
        cell.set("me", cell.clone());

        let copy = snapshot(&Value::Reactive(cell.clone()), Deep::Unbounded);
        let Value::Object(top) = &copy else {
            panic!("expected a plain object");
        };
        assert_eq!(top["me"], Value::Reactive(cell));
    }

    #[test]
    fn shared_cells_are_copied_once() {
        let shared = Reactive::wrap(json!({"x": 1})).unwrap();
        let root = Reactive::object();
        root.set("left", shared.clone());
        root.set("right", shared);

        let copy = snapshot(&Value::Reactive(root), Deep::Unbounded);
        assert_eq!(copy.to_json(), json!({"left": {"x": 1}, "right": {"x": 1}}));
    }

    #[test]
    fn traversal_tracks_every_visited_key() {
        let cell = Reactive::wrap(json!({"a": {"b": 1}})).unwrap();
        let runs = Rc::new(Cell::new(0));

        let (c, r) = (cell.clone(), runs.clone());
        let _effect = Effect::with_options(
            move |_| {
                snapshot(&Value::Reactive(c.clone()), Deep::Unbounded);
                r.set(r.get() + 1);
            },
            EffectOptions::sync(),
        );

        let nested = cell.get_untracked("a").unwrap();
        nested.as_reactive().unwrap().set("b", 2);
        assert_eq!(runs.get(), 2);
    }
}
