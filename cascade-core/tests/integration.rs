//! Integration Tests for the Reactive Engine
//!
//! These tests verify that cells, effects, watches and the scheduler work
//! together correctly through the public crate surface.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use cascade_core::reactive::Runtime;
use cascade_core::scheduler;
use cascade_core::{
    run_effect, schedule_task, watch, wrap_boxed, wrap_reactive, EffectOptions, EffectState,
    Flush, TaskKey, TaskOptions, Value, WatchOptions, WatchSource,
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

/// A sync effect sees a boxed write before the write returns.
#[test]
fn sync_effect_observes_write_immediately() {
    init_tracing();
    let r = wrap_boxed(0);
    let seen = Rc::new(Cell::new(-1));

    let (reader, sink) = (r.clone(), seen.clone());
    let _effect = run_effect(
        move |_| sink.set(reader.get().as_i64().unwrap_or(-1)),
        EffectOptions::sync(),
    );

    r.set(5);
    assert_eq!(seen.get(), 5);
}

/// A post effect sees the write only after the scheduler drains.
#[tokio::test]
async fn post_effect_observes_write_after_tick() {
    init_tracing();
    let r = wrap_boxed(0);
    let seen = Rc::new(Cell::new(-1));

    let (reader, sink) = (r.clone(), seen.clone());
    let _effect = run_effect(
        move |_| sink.set(reader.get().as_i64().unwrap_or(-1)),
        EffectOptions::default(),
    );

    r.set(5);
    assert_eq!(seen.get(), 0);

    scheduler::tick().await;
    assert_eq!(seen.get(), 5);
}

/// Writing a key read in the previous run reruns the effect; writing a key
/// that was only read in an older run does not.
#[test]
fn dependency_precision_follows_the_last_run() {
    let state = wrap_reactive(json!({"useA": true, "a": 0, "b": 0})).unwrap();
    let runs = counter();

    let (cell, count) = (state.clone(), runs.clone());
    let _effect = run_effect(
        move |_| {
            count.set(count.get() + 1);
            let key = if cell.get("useA") == Some(Value::Bool(true)) { "a" } else { "b" };
            cell.get(key);
        },
        EffectOptions::sync(),
    );

    state.set("a", 1);
    assert_eq!(runs.get(), 2);

    state.set("useA", false);
    assert_eq!(runs.get(), 3);

    state.set("a", 2);
    assert_eq!(runs.get(), 3);

    state.set("b", 1);
    assert_eq!(runs.get(), 4);
}

/// One publish reaching an effect through several channels reruns it once.
#[test]
fn one_rerun_per_publish() {
    let state = wrap_reactive(json!({"a": 1})).unwrap();
    let runs = counter();

    let (cell, count) = (state.clone(), runs.clone());
    let _effect = run_effect(
        move |_| {
            count.set(count.get() + 1);
            cell.get("a");
            cell.keys();
        },
        EffectOptions::sync(),
    );

    // `a` and the whole-object channel both match.
    state.set("a", 2);
    assert_eq!(runs.get(), 2);
}

/// Several writes before a drain produce one batched rerun.
#[test]
fn batched_reruns_coalesce() {
    let state = wrap_reactive(json!({"a": 0, "b": 0})).unwrap();
    let runs = counter();

    let (cell, count) = (state.clone(), runs.clone());
    let effect = run_effect(
        move |_| {
            count.set(count.get() + 1);
            cell.get("a");
            cell.get("b");
        },
        EffectOptions::default(),
    );

    state.set("a", 1);
    state.set("b", 1);
    state.set("a", 2);
    assert_eq!(scheduler::pending_tasks(), 1);

    scheduler::flush().unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(effect.run_count(), 2);
}

#[test]
fn pause_drops_missed_updates() {
    let r = wrap_boxed(0);
    let runs = counter();

    let (reader, count) = (r.clone(), runs.clone());
    let effect = run_effect(
        move |_| {
            reader.get();
            count.set(count.get() + 1);
        },
        EffectOptions::sync(),
    );

    effect.pause();
    r.set(1);
    assert_eq!(scheduler::pending_tasks(), 0);

    effect.resume();
    assert_eq!(runs.get(), 1);
    assert_eq!(effect.state(), EffectState::Running);

    r.set(2);
    assert_eq!(runs.get(), 2);
}

/// After stop, mutating every previously read key causes no calls and the
/// effect is gone from every subscriber set.
#[test]
fn stop_detaches_everywhere() {
    let state = wrap_reactive(json!({"a": 0, "list": [1, 2]})).unwrap();
    let runs = counter();

    let (cell, count) = (state.clone(), runs.clone());
    let effect = run_effect(
        move |_| {
            count.set(count.get() + 1);
            cell.get("a");
            if let Some(Value::Reactive(list)) = cell.get("list") {
                list.len();
            }
        },
        EffectOptions::sync(),
    );
    assert_eq!(effect.dependency_count(), 3);

    effect.stop();

    state.set("a", 1);
    let list = state.get_untracked("list").unwrap();
    let list = list.as_reactive().unwrap();
    list.push(3);

    assert_eq!(runs.get(), 1);
    assert_eq!(state.total_subscriptions(), 0);
    assert_eq!(list.total_subscriptions(), 0);
    assert!(!Runtime::is_registered(effect.id()));
}

/// A push reruns an effect that read an index and the length exactly once.
#[test]
fn array_push_notifies_once() {
    let list = wrap_reactive(json!([1, 2, 3])).unwrap();
    let runs = counter();

    let (cell, count) = (list.clone(), runs.clone());
    let _effect = run_effect(
        move |_| {
            count.set(count.get() + 1);
            cell.get(0);
            cell.len();
        },
        EffectOptions::sync(),
    );

    list.push(4);
    assert_eq!(runs.get(), 2);

    list.set(1, 20);
    assert_eq!(runs.get(), 3);
}

#[test]
fn watch_first_call_sees_equal_values() {
    let r = wrap_boxed(json!({"x": 1}));
    let calls = Rc::new(RefCell::new(Vec::new()));

    let sink = calls.clone();
    let _handle = watch(
        r.clone(),
        move |new, old, _| sink.borrow_mut().push(new == old),
        WatchOptions::default().deep(true),
    )
    .unwrap();

    assert_eq!(*calls.borrow(), vec![true]);
}

/// `deep: 1` over a box fires for `.nested` reassignment only.
#[test]
fn watch_deep_bound() {
    let r = wrap_boxed(json!({"nested": {"nested": {"v": 0}}}));
    let calls = counter();

    let count = calls.clone();
    let _handle = watch(
        r.clone(),
        move |_, _, _| count.set(count.get() + 1),
        WatchOptions::default().deep(1usize).flush(Flush::Sync),
    )
    .unwrap();

    let outer = r.get_untracked();
    let outer = outer.as_reactive().unwrap();
    let deepest = outer
        .get_untracked("nested")
        .and_then(|v| v.as_reactive().and_then(|c| c.get_untracked("nested")))
        .unwrap();

    deepest.as_reactive().unwrap().set("v", 1);
    assert_eq!(calls.get(), 1);

    outer.set("nested", json!({"nested": {"v": 5}}));
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn watch_sources_together_after_settle() {
    let a = wrap_boxed(1);
    let b = wrap_boxed(10);
    let last = Rc::new(RefCell::new(None));

    let sink = last.clone();
    let _handle = watch(
        vec![WatchSource::from(a.clone()), WatchSource::from(b.clone())],
        move |new, old, _| *sink.borrow_mut() = Some((new.to_json(), old.to_json())),
        WatchOptions::default(),
    )
    .unwrap();

    a.set(2);
    b.set(20);
    assert_eq!(scheduler::settle().await, Ok(1));

    assert_eq!(*last.borrow(), Some((json!([2, 20]), json!([1, 10]))));
}

/// Two tasks under one key: only the later one runs.
#[tokio::test]
async fn scheduler_coalesces_by_key() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let key = TaskKey::new();

    let first = log.clone();
    schedule_task(move || first.borrow_mut().push("A"), Some(key), TaskOptions::default());
    let second = log.clone();
    schedule_task(move || second.borrow_mut().push("B"), Some(key), TaskOptions::default());

    scheduler::tick().await;
    assert_eq!(*log.borrow(), vec!["B"]);
}

/// A sync effect that panics is not stopped; the next write retries it.
#[test]
fn failing_effect_is_retried() {
    let r = wrap_boxed(0);
    let runs = counter();

    let (reader, count) = (r.clone(), runs.clone());
    let effect = run_effect(
        move |_| {
            count.set(count.get() + 1);
            assert_ne!(reader.get().as_i64(), Some(13), "unlucky value");
        },
        EffectOptions::sync(),
    );

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| r.set(13)));
    assert!(outcome.is_err());
    assert_eq!(effect.state(), EffectState::Running);

    r.set(14);
    assert_eq!(runs.get(), 3);
}

/// A prom_sync effect runs ahead of batched tasks in the same cycle.
#[test]
fn prom_sync_runs_before_batched_work() {
    let r = wrap_boxed(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let (reader, sink) = (r.clone(), log.clone());
    let _effect = run_effect(
        move |_| {
            reader.get();
            sink.borrow_mut().push("effect");
        },
        EffectOptions::default().prom_sync(true),
    );
    log.borrow_mut().clear();

    let sink = log.clone();
    schedule_task(move || sink.borrow_mut().push("task"), None, TaskOptions::default());
    r.set(1);

    scheduler::flush().unwrap();
    assert_eq!(*log.borrow(), vec!["effect", "task"]);
}
