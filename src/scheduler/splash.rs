/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The splash scheduler.
//!
//! An implementation of the scheduling policy described by Joseph Gonzalez,
//! Yucheng Low, and Carlos Guestrin in “[Residual splash for optimally
//! parallelizing belief
//! propagation](https://proceedings.mlr.press/v5/gonzalez09a.html)”,
//! _Proceedings of the 12th International Conference on Artificial
//! Intelligence and Statistics_, PMLR 5:177&#8209;184, 2009.
//!
//! Pending vertices are spread over `ncpus · 5` independently locked
//! [mutable priority queues](crate::scheduler::MutableQueue) (_shards_),
//! each vertex mapping statically to one shard; a lock-free bitmap (the
//! _active set_) tracks which vertices have an outstanding task. When a
//! worker runs out of work it pops the top vertex of one of its shards and
//! grows around it a _splash_: a breadth-first tree expanded along incoming
//! edges, against the direction of information flow, and truncated by a
//! work budget in which each vertex costs its degree. The tree is then
//! traversed in reverse and forward order, so each splash yields the
//! down-sweep/up-sweep schedule characteristic of splash belief
//! propagation. A [termination detector](crate::scheduler::SharedTermination)
//! puts idle workers to sleep and declares completion once all of them are
//! asleep at the same time.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use crossbeam_utils::CachePadded;
use log::{debug, warn};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sux::bits::AtomicBitVec;

use crate::scheduler::{MutableQueue, SharedTermination};
use crate::traits::{
    Monitor, SchedStatus, Scheduler, SchedulerGraph, SchedulerOption, UpdateFn, UpdateTask,
};

/// Number of shards per worker.
const QUEUE_MULTIPLE: usize = 5;

/// Default work budget per splash, in edge units.
pub const DEFAULT_SPLASH_SIZE: usize = 100;

/// Per-worker mutable state.
///
/// Only the owning worker and [`Scheduler::restart`] touch this, so the
/// surrounding mutex is essentially uncontended.
struct WorkerState {
    /// The current splash, in delivery order.
    splash: Vec<usize>,
    /// Index of the next splash entry to deliver.
    cursor: usize,
    /// Rotating offset of the next shard to probe for a root.
    last_shard: usize,
    /// Generator for the shuffles that desynchronize BFS expansions.
    rng: SmallRng,
}

/// A parallel splash scheduler over a [`SchedulerGraph`].
///
/// The scheduler borrows the graph for its whole lifetime; all methods take
/// `&self`, so a single instance can be shared by the submitting and the
/// polling threads. Workers are identified by integers in `[0, ncpus)` and
/// each must be polled by one thread at a time.
///
/// # Examples
///
/// ```
/// use splash_scheduler::prelude::*;
///
/// fn update(_vertex: usize) {}
///
/// let graph = VecGraph::from_arcs([(1, 0), (2, 1)]);
/// let scheduler = SplashScheduler::new(&graph, 1);
/// scheduler.add_task_to_all(update, 1.0);
/// scheduler.start();
///
/// let mut delivered = vec![];
/// while let SchedStatus::NewTask(task) = scheduler.get_next_task(0) {
///     delivered.push(task.vertex());
/// }
/// delivered.sort();
/// assert_eq!(delivered, [0, 1, 2]);
/// ```
pub struct SplashScheduler<G: SchedulerGraph, M: Monitor = ()> {
    graph: G,
    ncpus: usize,
    /// Work budget per splash, in edge units.
    splash_size: AtomicUsize,
    /// The update function, which must be set before any submission.
    update_fn: RwLock<Option<UpdateFn>>,
    /// The sharded priority store. Each shard is guarded by its own lock,
    /// held only across a single queue operation.
    shards: Box<[CachePadded<Mutex<MutableQueue>>]>,
    /// Precomputed vertex-to-shard map.
    vmap: Box<[usize]>,
    workers: Box<[Mutex<WorkerState>]>,
    /// Bit `v` is set while a task for `v` has been submitted but not yet
    /// handed to a worker.
    active_set: AtomicBitVec,
    terminator: SharedTermination,
    aborted: AtomicBool,
    monitor: M,
}

impl<G: SchedulerGraph> SplashScheduler<G> {
    /// Creates a splash scheduler for `ncpus` workers over the given graph.
    pub fn new(graph: G, ncpus: usize) -> Self {
        Self::with_seed(graph, ncpus, 0)
    }

    /// Creates a splash scheduler whose per-worker generators are seeded
    /// from `seed`, for reproducible splash growth.
    pub fn with_seed(graph: G, ncpus: usize, seed: u64) -> Self {
        Self::with_monitor_and_seed(graph, ncpus, (), seed)
    }
}

impl<G: SchedulerGraph, M: Monitor> SplashScheduler<G, M> {
    /// Creates a splash scheduler reporting events to the given monitor.
    pub fn with_monitor(graph: G, ncpus: usize, monitor: M) -> Self {
        Self::with_monitor_and_seed(graph, ncpus, monitor, 0)
    }

    /// Creates a splash scheduler with an explicit monitor and seed.
    pub fn with_monitor_and_seed(graph: G, ncpus: usize, monitor: M, seed: u64) -> Self {
        assert!(ncpus > 0, "the scheduler needs at least one worker");
        let num_vertices = graph.num_vertices();
        let num_shards = ncpus * QUEUE_MULTIPLE;
        Self {
            ncpus,
            splash_size: AtomicUsize::new(DEFAULT_SPLASH_SIZE),
            update_fn: RwLock::new(None),
            shards: (0..num_shards)
                .map(|_| CachePadded::new(Mutex::new(MutableQueue::new())))
                .collect(),
            vmap: (0..num_vertices).map(|v| v % num_shards).collect(),
            workers: (0..ncpus)
                .map(|w| {
                    Mutex::new(WorkerState {
                        splash: vec![],
                        cursor: 0,
                        last_shard: 0,
                        rng: SmallRng::seed_from_u64(seed.wrapping_add(w as u64)),
                    })
                })
                .collect(),
            active_set: AtomicBitVec::new(num_vertices),
            terminator: SharedTermination::new(ncpus),
            aborted: AtomicBool::new(false),
            monitor,
            graph,
        }
    }

    /// Returns the number of workers.
    pub fn num_workers(&self) -> usize {
        self.ncpus
    }

    /// Returns the monitor.
    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    /// Sets the work budget per splash, in edge units.
    pub fn set_splash_size(&self, size: usize) {
        self.splash_size.store(size, Ordering::Relaxed);
    }

    /// Sets the update function applied to every scheduled vertex.
    pub fn set_update_function(&self, func: UpdateFn) {
        *self.update_fn.write().unwrap() = Some(func);
    }

    /// Returns a callback submitting tasks to this scheduler on behalf of
    /// the given worker, to be handed to the engine running that worker.
    pub fn callback(&self, worker: usize) -> DirectCallback<'_, G, M> {
        assert!(
            worker < self.ncpus,
            "worker id {} out of range ({} workers)",
            worker,
            self.ncpus
        );
        DirectCallback {
            scheduler: self,
            worker,
        }
    }

    /// Estimate of the update cost of a vertex.
    fn work(&self, vertex: usize) -> usize {
        self.graph.in_edge_ids(vertex).len() + self.graph.out_edge_ids(vertex).len()
    }

    /// The in-neighbors of a vertex, in random order.
    fn shuffled_in_neighbors(&self, vertex: usize, rng: &mut SmallRng) -> Vec<usize> {
        let mut neighbors: Vec<usize> = self
            .graph
            .in_edge_ids(vertex)
            .iter()
            .map(|&edge| self.graph.source(edge))
            .collect();
        neighbors.shuffle(rng);
        neighbors
    }

    /// Pops the highest-priority vertex of one of the worker's shards,
    /// probing them in round-robin order starting after the last successful
    /// probe.
    fn pop_root(&self, state: &mut WorkerState, worker: usize) -> Option<(usize, f64)> {
        for probe in 0..QUEUE_MULTIPLE {
            let slot = (probe + state.last_shard) % QUEUE_MULTIPLE;
            let popped = self.shards[worker * QUEUE_MULTIPLE + slot].lock().unwrap().pop();
            if let Some((vertex, priority)) = popped {
                state.last_shard = slot + 1;
                return Some((vertex, priority));
            }
        }
        state.last_shard = 0;
        None
    }

    /// Replaces the worker's splash with a new one grown from the best
    /// available root. On return the splash is empty if and only if all the
    /// worker's shards were empty.
    fn rebuild_splash(&self, state: &mut WorkerState, worker: usize) {
        debug_assert_eq!(state.cursor, state.splash.len());
        state.splash.clear();
        state.cursor = 0;

        let Some((root, root_priority)) = self.pop_root(state, worker) else {
            return;
        };

        let splash_size = self.splash_size.load(Ordering::Relaxed);
        state.splash.push(root);
        let mut splash_work = self.work(root);
        // Urgent roots are delivered alone, without growing a tree.
        if root_priority > 1.0 {
            splash_work = splash_size;
        }

        let mut visited: HashSet<usize> = HashSet::new();
        visited.insert(root);
        let mut frontier: VecDeque<usize> = VecDeque::new();
        for neighbor in self.shuffled_in_neighbors(root, &mut state.rng) {
            visited.insert(neighbor);
            frontier.push_back(neighbor);
        }

        // Grow until the budget is met or the tree becomes disconnected.
        while splash_work < splash_size {
            let Some(vertex) = frontier.pop_front() else {
                break;
            };
            let vertex_work = self.work(vertex);
            // An overweight vertex is left in its queue for a later splash;
            // its neighborhood is not explored.
            if vertex_work + splash_work > splash_size {
                continue;
            }
            // Withdrawing the vertex from its shard takes ownership of it:
            // no other worker can pick it as a root from now on. The active
            // set is left untouched until delivery.
            if !self.shards[self.vmap[vertex]].lock().unwrap().remove(vertex) {
                continue;
            }
            state.splash.push(vertex);
            splash_work += vertex_work;
            for neighbor in self.shuffled_in_neighbors(vertex, &mut state.rng) {
                if visited.insert(neighbor) {
                    frontier.push_back(neighbor);
                }
            }
        }

        debug!(
            "worker {} grew a splash of {} vertices rooted at {} (work {}/{})",
            worker,
            state.splash.len(),
            root,
            splash_work,
            splash_size
        );

        // Extend for the backward pass: the buffer becomes a palindrome
        // whose peak is the root, yielding a down-sweep followed by an
        // up-sweep.
        let forward_len = state.splash.len();
        if forward_len > 1 {
            state.splash.reverse();
            for i in (0..forward_len - 1).rev() {
                let vertex = state.splash[i];
                state.splash.push(vertex);
            }
        }
    }

    /// Advances the worker's splash cursor to the next deliverable vertex,
    /// rebuilding the splash whenever the current one is drained. Returns
    /// `None` when no work is available or the scheduler is aborted.
    fn drain_splash(&self, worker: usize) -> Option<UpdateTask> {
        let mut state = self.workers[worker].lock().unwrap();
        loop {
            if self.aborted.load(Ordering::Relaxed) {
                return None;
            }
            if state.cursor >= state.splash.len() {
                self.rebuild_splash(&mut state, worker);
                if state.splash.is_empty() {
                    return None;
                }
            }
            while state.cursor < state.splash.len() {
                let vertex = state.splash[state.cursor];
                state.cursor += 1;
                // Best-effort removal: the vertex may have been re-submitted
                // and re-queued since it entered the splash.
                self.shards[self.vmap[vertex]].lock().unwrap().remove(vertex);
                // Clearing the active bit is the delivery commit point; a
                // cleared bit means the vertex was already handed out, for
                // example through its first occurrence in the palindrome.
                if self.active_set.swap(vertex, false, Ordering::Relaxed) {
                    let func = self
                        .update_fn
                        .read()
                        .unwrap()
                        .expect("the update function must be set before tasks are scheduled");
                    let task = UpdateTask::new(vertex, func);
                    self.monitor.scheduler_task_scheduled(task, 1.0);
                    return Some(task);
                }
            }
        }
    }
}

impl<G: SchedulerGraph, M: Monitor> Scheduler for SplashScheduler<G, M> {
    fn start(&self) {
        for worker in 0..self.ncpus {
            let mut state = self.workers[worker].lock().unwrap();
            self.rebuild_splash(&mut state, worker);
        }
        self.terminator.reset();
    }

    fn add_task(&self, task: UpdateTask, priority: f64) {
        let configured = *self.update_fn.read().unwrap();
        assert!(
            configured == Some(task.func()),
            "the task function differs from the configured update function"
        );
        let vertex = task.vertex();
        assert!(
            vertex < self.graph.num_vertices(),
            "vertex {} out of range ({} vertices)",
            vertex,
            self.graph.num_vertices()
        );
        let shard = self.vmap[vertex];
        {
            let mut queue = self.shards[shard].lock().unwrap();
            let was_pending = self.active_set.swap(vertex, true, Ordering::Relaxed);
            // A set bit with no queue entry means the vertex sits in some
            // worker's splash buffer and will be delivered by its owner; it
            // must not be enqueued a second time.
            if !was_pending || queue.contains(vertex) {
                queue.insert_max(vertex, priority);
                self.monitor.scheduler_task_added(task, priority);
            }
        }
        self.terminator.new_job(shard / QUEUE_MULTIPLE);
    }

    fn add_task_to_all(&self, func: UpdateFn, priority: f64) {
        self.set_update_function(func);
        for vertex in 0..self.graph.num_vertices() {
            self.add_task(UpdateTask::new(vertex, func), priority);
        }
    }

    fn get_next_task(&self, worker: usize) -> SchedStatus {
        assert!(
            worker < self.ncpus,
            "worker id {} out of range ({} workers)",
            worker,
            self.ncpus
        );
        loop {
            // While aborted, report WAITING without engaging the detector,
            // so an aborted scheduler never declares completion.
            if self.aborted.load(Ordering::Relaxed) {
                return SchedStatus::Waiting;
            }
            if let Some(task) = self.drain_splash(worker) {
                return SchedStatus::NewTask(task);
            }
            self.terminator.begin_sleep_critical_section(worker);
            // A submission may have slipped in between the failed drain and
            // the critical section, so look once more before sleeping.
            if let Some(task) = self.drain_splash(worker) {
                self.terminator.cancel_sleep_critical_section(worker);
                return SchedStatus::NewTask(task);
            }
            if self.terminator.end_sleep_critical_section(worker) {
                return SchedStatus::Complete;
            }
        }
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
        // Kick every sleeper out of the detector so it observes the flag.
        for worker in 0..self.ncpus {
            self.terminator.new_job(worker);
        }
    }

    fn restart(&self) {
        for state in self.workers.iter() {
            let mut state = state.lock().unwrap();
            state.splash.clear();
            state.cursor = 0;
        }
        self.aborted.store(false, Ordering::Relaxed);
    }

    fn set_option(&self, option: SchedulerOption) {
        match option {
            SchedulerOption::SplashSize(size) => self.set_splash_size(size),
            SchedulerOption::UpdateFunction(func) => self.set_update_function(func),
            _ => warn!("the splash scheduler ignores option {:?}", option),
        }
    }
}

/// A callback forwarding submissions to a [`SplashScheduler`] on behalf of a
/// worker, to be handed to the engine running that worker.
pub struct DirectCallback<'a, G: SchedulerGraph, M: Monitor = ()> {
    scheduler: &'a SplashScheduler<G, M>,
    worker: usize,
}

impl<G: SchedulerGraph, M: Monitor> DirectCallback<'_, G, M> {
    /// Returns the worker this callback submits on behalf of.
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Submits a task with the given priority.
    pub fn add_task(&self, task: UpdateTask, priority: f64) {
        self.scheduler.add_task(task, priority);
    }

    /// Submits a task for each of the given vertices.
    pub fn add_tasks(&self, vertices: &[usize], func: UpdateFn, priority: f64) {
        self.scheduler.add_tasks(vertices, func, priority);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graphs::{ErdosRenyi, VecGraph};

    fn noop(_vertex: usize) {}

    /// A chain in which information flows toward vertex 0: the splash rooted
    /// at 0 covers the whole chain.
    fn chain(n: usize) -> VecGraph {
        VecGraph::from_arcs((1..n).map(|v| (v, v - 1)))
    }

    #[test]
    fn test_shard_confinement_and_coverage() {
        let graph = ErdosRenyi::new(40, 0.1, 3).build();
        let scheduler = SplashScheduler::new(&graph, 2);
        scheduler.add_task_to_all(noop, 1.0);
        let mut queued = 0;
        for (index, shard) in scheduler.shards.iter().enumerate() {
            let queue = shard.lock().unwrap();
            for (vertex, _priority) in queue.iter() {
                assert_eq!(scheduler.vmap[vertex], index);
                assert!(scheduler.active_set.get(vertex, Ordering::Relaxed));
                queued += 1;
            }
        }
        assert_eq!(queued, 40);
    }

    #[test]
    fn test_palindrome_shape() {
        let graph = chain(5);
        let scheduler = SplashScheduler::new(&graph, 1);
        scheduler.add_task_to_all(noop, 1.0);
        scheduler.start();
        let state = scheduler.workers[0].lock().unwrap();
        assert_eq!(state.splash.len(), 9);
        // Palindrome with the root at the peak.
        for i in 0..state.splash.len() {
            assert_eq!(state.splash[i], state.splash[8 - i]);
        }
        assert_eq!(state.splash[4], 0);
        assert_eq!(&state.splash[..5], &[4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_urgent_root_is_delivered_alone() {
        let graph = chain(3);
        let scheduler = SplashScheduler::new(&graph, 1);
        scheduler.set_update_function(noop);
        scheduler.add_tasks(&[0, 1, 2], noop, 3.0);
        scheduler.start();
        let state = scheduler.workers[0].lock().unwrap();
        assert_eq!(&*state.splash, &[0]);
    }

    #[test]
    fn test_splash_work_bound() {
        let graph = chain(6);
        let scheduler = SplashScheduler::new(&graph, 1);
        scheduler.set_splash_size(5);
        scheduler.add_task_to_all(noop, 1.0);
        scheduler.start();
        let state = scheduler.workers[0].lock().unwrap();
        assert_eq!(&state.splash[..3], &[2, 1, 0]);
        let forward: HashSet<usize> = state.splash.iter().copied().collect();
        let splash_work: usize = forward.iter().map(|&v| scheduler.work(v)).sum();
        let max_work = (0..6).map(|v| scheduler.work(v)).max().unwrap();
        assert!(splash_work <= 5 + max_work);
        // The rest of the chain is still queued.
        for vertex in 3..6 {
            assert!(scheduler.shards[scheduler.vmap[vertex]]
                .lock()
                .unwrap()
                .contains(vertex));
        }
    }

    #[test]
    fn test_overweight_vertex_is_skipped() {
        let graph = VecGraph::from_arcs([(1, 0), (1, 2), (1, 3), (1, 4), (1, 5)]);
        let scheduler = SplashScheduler::new(&graph, 1);
        scheduler.set_splash_size(4);
        scheduler.add_task_to_all(noop, 1.0);
        scheduler.start();
        {
            let state = scheduler.workers[0].lock().unwrap();
            assert_eq!(&*state.splash, &[0]);
        }
        // The heavy vertex was neither delivered nor lost.
        assert!(scheduler.shards[scheduler.vmap[1]].lock().unwrap().contains(1));
        let mut delivered = vec![];
        while let SchedStatus::NewTask(task) = scheduler.get_next_task(0) {
            delivered.push(task.vertex());
        }
        assert_eq!(delivered[0], 0);
        delivered.sort();
        assert_eq!(delivered, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_root_priority_promotion() {
        // Vertices 0 and 5 share a shard; promoting 5 makes it the root.
        let graph = VecGraph::empty(6);
        let scheduler = SplashScheduler::new(&graph, 1);
        scheduler.set_update_function(noop);
        scheduler.add_task(UpdateTask::new(0, noop), 0.4);
        scheduler.add_task(UpdateTask::new(5, noop), 0.1);
        scheduler.add_task(UpdateTask::new(5, noop), 0.9);
        {
            let queue = scheduler.shards[0].lock().unwrap();
            assert_eq!(queue.priority(5), Some(0.9));
            assert_eq!(queue.top(), Some((5, 0.9)));
        }
        scheduler.start();
        let state = scheduler.workers[0].lock().unwrap();
        assert_eq!(&*state.splash, &[5]);
    }
}
