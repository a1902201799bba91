/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The scheduling surface offered to engines.
//!
//! An engine drives a scheduler with one polling loop per worker: each loop
//! calls [`get_next_task`](Scheduler::get_next_task) and applies the update
//! function of the returned task until the scheduler reports
//! [`Complete`](SchedStatus::Complete). Tasks are submitted with
//! [`add_task`](Scheduler::add_task), either from outside or from within an
//! update through a scheduler-provided callback.

/// The update function applied by the engine to every scheduled vertex.
///
/// The function is a single value shared by all tasks, configured on the
/// scheduler and copied into every emitted task record; it is opaque to the
/// scheduler and compared by address.
pub type UpdateFn = fn(usize);

/// A scheduled unit of work: a vertex paired with the update function to
/// apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateTask {
    vertex: usize,
    func: UpdateFn,
}

impl UpdateTask {
    /// Creates a new task for `vertex` with update function `func`.
    pub fn new(vertex: usize, func: UpdateFn) -> Self {
        Self { vertex, func }
    }

    /// Returns the vertex this task updates.
    #[inline(always)]
    pub fn vertex(&self) -> usize {
        self.vertex
    }

    /// Returns the update function of this task.
    #[inline(always)]
    pub fn func(&self) -> UpdateFn {
        self.func
    }
}

/// The result of polling a scheduler for work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedStatus {
    /// A task to execute.
    NewTask(UpdateTask),
    /// No work is available right now, but more may appear; poll again.
    ///
    /// Outside of an abort this status is transient: the scheduler blocks
    /// internally until either work arrives or global quiescence is
    /// detected.
    Waiting,
    /// Every submitted task has been delivered and all workers are idle.
    Complete,
}

/// Configuration options understood by the scheduler family.
///
/// Individual schedulers consume the options that apply to them and log a
/// warning for the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerOption {
    /// Target work budget per splash, in edge units.
    SplashSize(usize),
    /// The update function applied to every scheduled vertex.
    UpdateFunction(UpdateFn),
    /// Maximum number of update rounds.
    MaxIterations(usize),
    /// Number of updates between global synchronization barriers.
    BarrierInterval(usize),
}

/// Observability hook for scheduler events.
///
/// All methods default to no-ops; `()` is the null monitor.
pub trait Monitor: Sync {
    /// Called when a submission inserts or promotes a queue entry.
    fn scheduler_task_added(&self, _task: UpdateTask, _priority: f64) {}

    /// Called when a vertex is produced to a worker.
    fn scheduler_task_scheduled(&self, _task: UpdateTask, _priority: f64) {}
}

impl Monitor for () {}

/// A parallel task scheduler over a graph.
///
/// Implementations must deliver every submitted task at most once per
/// submission cycle and report [`Complete`](SchedStatus::Complete) once all
/// submitted work has been drained and every worker is idle.
pub trait Scheduler {
    /// Builds the initial per-worker state. Must be called once before
    /// workers begin polling.
    fn start(&self);

    /// Submits a task with the given priority.
    ///
    /// # Panics
    ///
    /// If the task's update function differs from the configured one, or if
    /// its vertex is out of range.
    fn add_task(&self, task: UpdateTask, priority: f64);

    /// Submits a task for each of the given vertices.
    fn add_tasks(&self, vertices: &[usize], func: UpdateFn, priority: f64) {
        for &vertex in vertices {
            self.add_task(UpdateTask::new(vertex, func), priority);
        }
    }

    /// Sets the update function and submits a task for every vertex of the
    /// graph.
    fn add_task_to_all(&self, func: UpdateFn, priority: f64);

    /// Returns the next task for the given worker, blocking while no work is
    /// available and quiescence has not been detected.
    ///
    /// # Panics
    ///
    /// If the worker id is out of range.
    fn get_next_task(&self, worker: usize) -> SchedStatus;

    /// Notifies the scheduler that a task has been executed.
    fn completed_task(&self, _worker: usize, _task: &UpdateTask) {}

    /// Notifies the scheduler of engine-side modifications around a root
    /// vertex.
    fn scoped_modifications(&self, _worker: usize, _root: usize, _edges: &[usize]) {}

    /// Notifies the scheduler of engine-side state updates.
    fn update_state(&self, _worker: usize, _vertices: &[usize], _edges: &[usize]) {}

    /// Halts delivery: workers see [`Waiting`](SchedStatus::Waiting) until
    /// [`restart`](Scheduler::restart) is called. Pending submissions are
    /// kept.
    fn abort(&self);

    /// Clears per-worker delivery state and resumes after an abort.
    fn restart(&self);

    /// Applies a configuration option. Unsupported options are logged and
    /// ignored.
    fn set_option(&self, option: SchedulerOption);
}
