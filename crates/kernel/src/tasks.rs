//! Animation Task Registry: keyed per-frame callbacks with isolated failures.
//!
//! # Invariants
//! - A task whose callback fails is deactivated, never removed; only
//!   [`AnimationTaskRegistry::stop`] removes a task.
//! - One failing task never prevents its siblings from running.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use worldspace_common::TaskId;

/// Per-frame callback. Receives elapsed simulation time in seconds.
pub type TaskCallback = Box<dyn FnMut(f64) -> Result<(), TaskError>>;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),
    #[error("callback panicked: {0}")]
    Panicked(String),
}

/// Shared source of task ids, so tasks queued through a [`TaskInbox`] and
/// tasks registered directly never collide.
#[derive(Debug, Clone, Default)]
pub struct TaskIdSource(Rc<Cell<u64>>);

impl TaskIdSource {
    pub fn next(&self) -> TaskId {
        let id = self.0.get() + 1;
        self.0.set(id);
        TaskId(id)
    }
}

pub struct AnimationTask {
    callback: TaskCallback,
    active: bool,
    failure: Option<String>,
    invocations: u64,
}

impl AnimationTask {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Why the task was deactivated, if it failed.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn invocations(&self) -> u64 {
        self.invocations
    }
}

impl std::fmt::Debug for AnimationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationTask")
            .field("active", &self.active)
            .field("failure", &self.failure)
            .field("invocations", &self.invocations)
            .finish_non_exhaustive()
    }
}

/// Outcome of one [`AnimationTaskRegistry::run_all`] pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub invoked: usize,
    pub failed: Vec<TaskId>,
}

#[derive(Debug, Default)]
pub struct AnimationTaskRegistry {
    tasks: BTreeMap<TaskId, AnimationTask>,
    ids: TaskIdSource,
}

impl AnimationTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(ids: TaskIdSource) -> Self {
        Self {
            tasks: BTreeMap::new(),
            ids,
        }
    }

    /// Register a callback under a fresh id.
    pub fn register(&mut self, callback: TaskCallback) -> TaskId {
        let id = self.ids.next();
        self.register_with_id(id, callback)
    }

    /// Register under a caller-supplied id, replacing any task already there.
    pub fn register_with_id(&mut self, id: TaskId, callback: TaskCallback) -> TaskId {
        let replaced = self
            .tasks
            .insert(
                id,
                AnimationTask {
                    callback,
                    active: true,
                    failure: None,
                    invocations: 0,
                },
            )
            .is_some();
        tracing::debug!(%id, replaced, "animation task registered");
        id
    }

    /// Deactivate and remove a task. Returns whether it existed.
    pub fn stop(&mut self, id: TaskId) -> bool {
        let existed = self.tasks.remove(&id).is_some();
        if existed {
            tracing::debug!(%id, "animation task stopped");
        }
        existed
    }

    /// Invoke every active task once, each inside its own failure boundary.
    pub fn run_all(&mut self, elapsed: f64) -> RunSummary {
        let mut summary = RunSummary::default();
        for (id, task) in self.tasks.iter_mut().filter(|(_, t)| t.active) {
            summary.invoked += 1;
            task.invocations += 1;
            let outcome = match catch_unwind(AssertUnwindSafe(|| (task.callback)(elapsed))) {
                Ok(result) => result,
                Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
            };
            if let Err(err) = outcome {
                tracing::warn!(%id, error = %err, "animation task failed; deactivating");
                task.active = false;
                task.failure = Some(err.to_string());
                summary.failed.push(*id);
            }
        }
        summary
    }

    /// Apply registrations and stops queued since the last call.
    pub fn absorb(&mut self, inbox: &mut TaskInbox) {
        for (id, callback) in inbox.registrations.drain(..) {
            self.register_with_id(id, callback);
        }
        for id in inbox.stops.drain(..) {
            self.stop(id);
        }
        inbox.live = self.tasks.keys().copied().collect();
    }

    pub fn get(&self, id: TaskId) -> Option<&AnimationTask> {
        self.tasks.get(&id)
    }

    pub fn is_active(&self, id: TaskId) -> Option<bool> {
        self.tasks.get(&id).map(|t| t.active)
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.tasks.values().filter(|t| t.active).count()
    }

    /// Remove every task. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let n = self.tasks.len();
        self.tasks.clear();
        n
    }

    pub fn id_source(&self) -> TaskIdSource {
        self.ids.clone()
    }
}

/// Queue of task registrations and stops issued while the registry itself
/// may be mid-iteration (from inside a running callback or a script).
///
/// Ids are allocated immediately so callers get a usable handle; the
/// registry picks the queued work up in [`AnimationTaskRegistry::absorb`].
#[derive(Default)]
pub struct TaskInbox {
    ids: TaskIdSource,
    registrations: Vec<(TaskId, TaskCallback)>,
    stops: Vec<TaskId>,
    live: BTreeSet<TaskId>,
}

impl TaskInbox {
    pub fn new(ids: TaskIdSource) -> Self {
        Self {
            ids,
            ..Self::default()
        }
    }

    pub fn register(&mut self, callback: TaskCallback) -> TaskId {
        let id = self.ids.next();
        self.registrations.push((id, callback));
        self.live.insert(id);
        id
    }

    /// Queue a stop. Returns whether the task is known to exist.
    pub fn stop(&mut self, id: TaskId) -> bool {
        let existed = self.live.remove(&id);
        if existed {
            self.stops.push(id);
        }
        existed
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty() && self.stops.is_empty()
    }

    /// Drop queued work and forget every known id.
    pub fn clear(&mut self) {
        self.registrations.clear();
        self.stops.clear();
        self.live.clear();
    }
}

impl std::fmt::Debug for TaskInbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskInbox")
            .field("registrations", &self.registrations.len())
            .field("stops", &self.stops)
            .field("live", &self.live)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<u32>>, TaskCallback) {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        (count, Box::new(move |_| {
            c.set(c.get() + 1);
            Ok(())
        }))
    }

    #[test]
    fn register_returns_fresh_ids() {
        let mut reg = AnimationTaskRegistry::new();
        let a = reg.register(Box::new(|_| Ok(())));
        let b = reg.register(Box::new(|_| Ok(())));
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn callback_receives_elapsed_time() {
        let seen = Rc::new(Cell::new(0.0));
        let s = seen.clone();
        let mut reg = AnimationTaskRegistry::new();
        reg.register(Box::new(move |t| {
            s.set(t);
            Ok(())
        }));
        reg.run_all(2.5);
        assert_eq!(seen.get(), 2.5);
    }

    #[test]
    fn failing_task_is_deactivated_but_kept() {
        let mut reg = AnimationTaskRegistry::new();
        let calls = Rc::new(Cell::new(0u32));
        let c = calls.clone();
        let bad = reg.register(Box::new(move |_| {
            c.set(c.get() + 1);
            if c.get() == 3 {
                Err(TaskError::Failed("boom".into()))
            } else {
                Ok(())
            }
        }));
        let (good_count, good) = counter();
        let good = reg.register(good);

        for frame in 0..10 {
            reg.run_all(frame as f64);
        }
        assert_eq!(calls.get(), 3);
        assert_eq!(reg.is_active(bad), Some(false));
        assert_eq!(reg.get(bad).unwrap().failure(), Some("boom"));
        assert_eq!(reg.is_active(good), Some(true));
        assert_eq!(good_count.get(), 10);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn panicking_task_is_isolated() {
        let mut reg = AnimationTaskRegistry::new();
        let bad = reg.register(Box::new(|_| panic!("kaboom")));
        let (count, good) = counter();
        reg.register(good);

        let summary = reg.run_all(0.0);
        assert_eq!(summary.failed, vec![bad]);
        assert_eq!(summary.invoked, 2);
        assert_eq!(count.get(), 1);
        assert!(reg.get(bad).unwrap().failure().unwrap().contains("kaboom"));
    }

    #[test]
    fn stop_removes_and_reports_existence() {
        let mut reg = AnimationTaskRegistry::new();
        let id = reg.register(Box::new(|_| Ok(())));
        assert!(reg.stop(id));
        assert!(!reg.stop(id));
        assert!(reg.is_empty());
    }

    #[test]
    fn inbox_work_applies_on_absorb() {
        let ids = TaskIdSource::default();
        let mut reg = AnimationTaskRegistry::with_ids(ids.clone());
        let mut inbox = TaskInbox::new(ids);
        let direct = reg.register(Box::new(|_| Ok(())));
        let (count, cb) = counter();
        let queued = inbox.register(cb);
        assert_ne!(direct, queued);

        reg.run_all(0.0);
        assert_eq!(count.get(), 0);

        reg.absorb(&mut inbox);
        reg.run_all(0.0);
        assert_eq!(count.get(), 1);

        assert!(inbox.stop(direct));
        assert!(!inbox.stop(TaskId(999)));
        reg.absorb(&mut inbox);
        assert_eq!(reg.ids(), vec![queued]);
    }

    #[test]
    fn clear_removes_everything() {
        let mut reg = AnimationTaskRegistry::new();
        reg.register(Box::new(|_| Ok(())));
        reg.register(Box::new(|_| Err(TaskError::Failed("x".into()))));
        reg.run_all(0.0);
        assert_eq!(reg.active_count(), 1);
        assert_eq!(reg.clear(), 2);
        assert_eq!(reg.active_count(), 0);
    }
}
