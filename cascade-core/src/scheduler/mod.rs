//! Task Scheduler
//!
//! The scheduler batches deferred work: effect reruns with `pre`/`post`
//! flush, watch callbacks, and any task a host hands to [`schedule`]. It
//! knows nothing about reactivity.
//!
//! # Queues
//!
//! - The batched queue holds ordinary tasks. A drain cycle takes a snapshot
//!   of it and runs the snapshot in time slices bounded by
//!   [`SchedulerConfig::frame_budget`], yielding to the executor between
//!   slices.
//!
//! - Two ping-pong queues hold `sync` tasks. A drain cycle runs one of them
//!   to completion before touching the batched snapshot; `sync` tasks
//!   scheduled meanwhile land in the other queue and run in the next cycle.
//!
//! Both kinds of queue are keyed: scheduling under a key that is already
//! pending replaces the old body and moves it to the back.
//!
//! # Driving
//!
//! Nothing runs on its own. Hosts call [`tick`] or [`settle`] from async
//! code, [`flush`] from plain code, or spawn [`drive`] on a
//! `tokio::task::LocalSet` to drain whenever work arrives.

mod config;
mod queue;

pub use config::{SchedulerConfig, DEFAULT_FRAME_BUDGET, DEFAULT_MAX_FLUSH_CYCLES};
pub use queue::{Task, TaskKey, TaskQueue};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use crate::error::{ReactiveError, Result};

/// Options for [`schedule`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOptions {
    /// Run in the synchronous ping-pong queue, ahead of batched tasks.
    pub sync: bool,
}

impl TaskOptions {
    pub fn sync() -> Self {
        Self { sync: true }
    }
}

struct SchedulerState {
    config: Cell<SchedulerConfig>,
    batched: RefCell<TaskQueue>,
    sync_queues: [RefCell<TaskQueue>; 2],
    /// Index of the sync queue that receives new tasks.
    sync_front: Cell<usize>,
    draining: Cell<bool>,
    in_task: Cell<bool>,
    wake: Rc<Notify>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            config: Cell::new(SchedulerConfig::default()),
            batched: RefCell::new(TaskQueue::new()),
            sync_queues: [RefCell::new(TaskQueue::new()), RefCell::new(TaskQueue::new())],
            sync_front: Cell::new(0),
            draining: Cell::new(false),
            in_task: Cell::new(false),
            wake: Rc::new(Notify::new()),
        }
    }
}

thread_local! {
    static SCHEDULER: SchedulerState = SchedulerState::new();
}

/// Install a configuration for this thread's scheduler.
pub fn configure(config: SchedulerConfig) {
    SCHEDULER.with(|s| s.config.set(config));
}

/// The configuration of this thread's scheduler.
pub fn config() -> SchedulerConfig {
    SCHEDULER.with(|s| s.config.get())
}

/// Queue `task` for the next drain cycle.
///
/// With a key, a task already pending under the same key is dropped and the
/// new one is appended. Without one, the task is never deduplicated.
pub fn schedule<F>(task: F, key: Option<TaskKey>, options: TaskOptions)
where
    F: FnOnce() + 'static,
{
    let key = key.unwrap_or_default();

    SCHEDULER.with(|s| {
        let replaced = if options.sync {
            s.sync_queues[s.sync_front.get()]
                .borrow_mut()
                .push(key, Box::new(task))
        } else {
            s.batched.borrow_mut().push(key, Box::new(task))
        };

        if replaced {
            tracing::trace!(?key, sync = options.sync, "coalesced pending task");
        }
        s.wake.notify_one();
    });
}

/// Number of tasks waiting for a drain cycle.
pub fn pending_tasks() -> usize {
    SCHEDULER.with(|s| {
        s.batched.borrow().len()
            + s.sync_queues[0].borrow().len()
            + s.sync_queues[1].borrow().len()
    })
}

pub fn has_pending() -> bool {
    pending_tasks() > 0
}

/// Whether a drain cycle is in progress on this thread.
pub fn is_draining() -> bool {
    SCHEDULER.with(|s| s.draining.get())
}

/// Run one drain cycle: the current sync queue, then a snapshot of the
/// batched queue in time slices.
///
/// Tasks scheduled while the cycle runs wait for the next one. Returns the
/// number of tasks that ran.
pub async fn tick() -> usize {
    let Some(_drain) = DrainGuard::begin("tick") else {
        return 0;
    };

    let mut ran = run_sync_queue();
    let budget = config().frame_budget;
    let mut pending = Pending::batched();

    loop {
        ran += pending.run_slice(Some(budget));
        if pending.is_empty() {
            break;
        }
        tracing::trace!(remaining = pending.len(), "frame budget exhausted, yielding");
        tokio::task::yield_now().await;
    }

    tracing::debug!(ran, "drain cycle finished");
    ran
}

/// Run drain cycles until no task is pending.
///
/// Fails with [`ReactiveError::FlushLimitExceeded`] if tasks keep
/// rescheduling each other past the configured cycle limit.
pub async fn settle() -> Result<usize> {
    if reentrant("settle") {
        return Ok(0);
    }

    let limit = config().max_flush_cycles;
    let mut ran = 0;
    for _ in 0..limit {
        if !has_pending() {
            return Ok(ran);
        }
        let cycle = tick().await;
        if cycle == 0 {
            // Another drain holds the queues.
            tokio::task::yield_now().await;
        }
        ran += cycle;
    }

    limit_check(limit, ran)
}

/// Synchronously run drain cycles until no task is pending, ignoring the
/// frame budget.
///
/// For hosts without an async executor. Fails with
/// [`ReactiveError::FlushLimitExceeded`] past the configured cycle limit.
pub fn flush() -> Result<usize> {
    let Some(_drain) = DrainGuard::begin("flush") else {
        return Ok(0);
    };

    let limit = config().max_flush_cycles;
    let mut ran = 0;
    for _ in 0..limit {
        if !has_pending() {
            return Ok(ran);
        }
        ran += run_sync_queue();
        ran += Pending::batched().run_slice(None);
    }

    limit_check(limit, ran)
}

/// Drain forever, sleeping until work is scheduled.
///
/// Spawn it with `tokio::task::spawn_local`; it never returns.
pub async fn drive() {
    let wake = SCHEDULER.with(|s| s.wake.clone());
    tracing::debug!("scheduler driver started");

    loop {
        if has_pending() {
            tick().await;
            tokio::task::yield_now().await;
        } else {
            wake.notified().await;
        }
    }
}

fn limit_check(limit: usize, ran: usize) -> Result<usize> {
    if has_pending() {
        tracing::warn!(cycles = limit, pending = pending_tasks(), "drain cycle limit exceeded");
        return Err(ReactiveError::FlushLimitExceeded { cycles: limit });
    }
    Ok(ran)
}

fn reentrant(entry: &'static str) -> bool {
    let inside = SCHEDULER.with(|s| s.in_task.get());
    if inside {
        tracing::warn!(entry, "drain requested from inside a running task; ignored");
    }
    inside
}

/// Swap the sync queues and run the one that was receiving tasks.
fn run_sync_queue() -> usize {
    let (index, tasks) = SCHEDULER.with(|s| {
        let index = s.sync_front.get();
        s.sync_front.set(1 - index);
        let tasks = s.sync_queues[index].borrow_mut().take();
        (index, tasks)
    });

    if tasks.is_empty() {
        return 0;
    }
    tracing::trace!(queue = index, count = tasks.len(), "running sync tasks");
    Pending::new(tasks, Target::Sync).run_slice(None)
}

fn run_task(task: Task) {
    let _task = TaskGuard::enter();
    task();
}

/// Marks the thread as draining until dropped.
struct DrainGuard;

impl DrainGuard {
    fn begin(entry: &'static str) -> Option<Self> {
        if reentrant(entry) {
            return None;
        }

        SCHEDULER.with(|s| {
            if s.draining.get() {
                tracing::debug!(entry, "drain already in progress");
                None
            } else {
                s.draining.set(true);
                Some(DrainGuard)
            }
        })
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        SCHEDULER.with(|s| s.draining.set(false));
    }
}

/// Marks the thread as running a task until dropped.
struct TaskGuard {
    previous: bool,
}

impl TaskGuard {
    fn enter() -> Self {
        let previous = SCHEDULER.with(|s| s.in_task.replace(true));
        Self { previous }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let previous = self.previous;
        SCHEDULER.with(|s| s.in_task.set(previous));
    }
}

#[derive(Clone, Copy)]
enum Target {
    Batched,
    Sync,
}

/// Tasks taken out of a queue for one cycle.
///
/// Whatever has not run when this is dropped (a task panicked) goes back to
/// the front of the queue it came from, so no update is lost.
struct Pending {
    tasks: VecDeque<(TaskKey, Task)>,
    target: Target,
}

impl Pending {
    fn new(tasks: Vec<(TaskKey, Task)>, target: Target) -> Self {
        Self {
            tasks: tasks.into(),
            target,
        }
    }

    fn batched() -> Self {
        let tasks = SCHEDULER.with(|s| s.batched.borrow_mut().take());
        Self::new(tasks, Target::Batched)
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run tasks until none are left or `budget` is spent. At least one
    /// task runs per slice.
    fn run_slice(&mut self, budget: Option<Duration>) -> usize {
        let start = Instant::now();
        let mut ran = 0;

        while let Some((_, task)) = self.tasks.pop_front() {
            run_task(task);
            ran += 1;

            if budget.is_some_and(|budget| start.elapsed() >= budget) {
                break;
            }
        }
        ran
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        let tasks: Vec<_> = self.tasks.drain(..).collect();
        tracing::debug!(count = tasks.len(), "requeueing tasks that did not run");
        SCHEDULER.with(|s| match self.target {
            Target::Batched => s.batched.borrow_mut().restore_front(tasks),
            Target::Sync => s.sync_queues[s.sync_front.get()]
                .borrow_mut()
                .restore_front(tasks),
        });
    }
}
