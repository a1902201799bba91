/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use std::sync::{Condvar, Mutex};

/// A shared termination detector.
///
/// Workers that run out of work register with the detector before going to
/// sleep; submitters signal fresh work with [`new_job`](Self::new_job). The
/// detector declares global quiescence once every worker is asleep at the
/// same time, and from that point on reports completion to every sleeper
/// until [`reset`](Self::reset).
///
/// The sleep protocol is a three-step handshake closing the race between a
/// worker deciding to sleep and a submission arriving at the same time:
///
/// 1. [`begin_sleep_critical_section`](Self::begin_sleep_critical_section)
///    clears the caller's fresh-work flag;
/// 2. the caller checks once more for work; if it finds some, it calls
///    [`cancel_sleep_critical_section`](Self::cancel_sleep_critical_section)
///    and goes on;
/// 3. otherwise it calls
///    [`end_sleep_critical_section`](Self::end_sleep_critical_section),
///    which commits to sleep unless the flag was set again in the meantime,
///    and blocks until either fresh work arrives (returning false) or all
///    workers are simultaneously asleep (returning true).
#[derive(Debug)]
pub struct SharedTermination {
    ncpus: usize,
    state: Mutex<State>,
    cond: Condvar,
}

#[derive(Debug)]
struct State {
    /// Number of workers currently committed to sleep.
    sleeping: usize,
    /// Set when all workers have been observed simultaneously asleep; sticky
    /// until reset.
    done: bool,
    /// Per-worker fresh-work flags.
    new_task: Vec<bool>,
}

impl SharedTermination {
    /// Creates a detector for `ncpus` workers.
    pub fn new(ncpus: usize) -> Self {
        Self {
            ncpus,
            state: Mutex::new(State {
                sleeping: 0,
                done: false,
                new_task: vec![false; ncpus],
            }),
            cond: Condvar::new(),
        }
    }

    /// Returns the detector to its initial state.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.sleeping = 0;
        state.done = false;
        state.new_task.iter_mut().for_each(|flag| *flag = false);
    }

    /// Signals that fresh work is available for the given worker, waking it
    /// if it is asleep.
    pub fn new_job(&self, worker: usize) {
        let mut state = self.state.lock().unwrap();
        state.new_task[worker] = true;
        if state.sleeping > 0 {
            self.cond.notify_all();
        }
    }

    /// Opens the sleep critical section for the given worker.
    pub fn begin_sleep_critical_section(&self, worker: usize) {
        self.state.lock().unwrap().new_task[worker] = false;
    }

    /// Leaves the sleep critical section without sleeping.
    pub fn cancel_sleep_critical_section(&self, _worker: usize) {}

    /// Commits the given worker to sleep and blocks until fresh work arrives
    /// or global quiescence is detected. Returns true on quiescence.
    pub fn end_sleep_critical_section(&self, worker: usize) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.new_task[worker] {
            state.sleeping += 1;
            // Quiescence needs all workers asleep with no outstanding
            // fresh-work flag: a flagged sleeper has a pending wakeup and
            // will resume draining.
            if state.sleeping == self.ncpus && !state.new_task.iter().any(|&flag| flag) {
                state.done = true;
                self.cond.notify_all();
            } else {
                while !state.new_task[worker] && !state.done {
                    state = self.cond.wait(state).unwrap();
                }
            }
            state.sleeping -= 1;
        }
        state.new_task[worker] = false;
        state.done
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_single_worker_quiescence() {
        let t = SharedTermination::new(1);
        t.begin_sleep_critical_section(0);
        assert!(t.end_sleep_critical_section(0));
        // Completion is sticky until reset.
        t.begin_sleep_critical_section(0);
        assert!(t.end_sleep_critical_section(0));
        t.reset();
        t.new_job(0);
        t.begin_sleep_critical_section(0);
        t.new_job(0);
        assert!(!t.end_sleep_critical_section(0));
    }

    #[test]
    fn test_fresh_work_aborts_sleep() {
        let t = SharedTermination::new(2);
        t.begin_sleep_critical_section(0);
        t.new_job(0);
        // The flag raised inside the critical section must abort the sleep.
        assert!(!t.end_sleep_critical_section(0));
    }

    #[test]
    fn test_wakeup_and_quiescence() {
        let t = SharedTermination::new(2);
        let woken = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                t.begin_sleep_critical_section(0);
                // Blocks until the main thread signals fresh work.
                assert!(!t.end_sleep_critical_section(0));
                woken.fetch_add(1, Ordering::Relaxed);
            });
            while t.state.lock().unwrap().sleeping == 0 {
                std::thread::yield_now();
            }
            t.new_job(0);
        });
        assert_eq!(woken.load(Ordering::Relaxed), 1);

        // Now both workers sleep: everybody observes quiescence.
        let t = &t;
        std::thread::scope(|scope| {
            for worker in 0..2 {
                scope.spawn(move || {
                    t.begin_sleep_critical_section(worker);
                    assert!(t.end_sleep_critical_section(worker));
                });
            }
        });
    }
}
