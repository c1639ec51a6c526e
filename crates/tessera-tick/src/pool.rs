//! Fixed pool of worker threads driven by a single dispatcher.
//!
//! Two mutex/condvar pairs gate the pool: one announces a new task, the
//! other counts finished workers. The dispatcher blocks on the second
//! until every worker has reported, so a task may borrow from the
//! dispatcher's stack.

use std::{
    any::Any,
    mem,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

type Task<'a> = dyn Fn(usize) + Sync + 'a;

#[derive(Default)]
struct Dispatch {
    epoch: u64,
    task: Option<&'static Task<'static>>,
    shutdown: bool,
}

#[derive(Default)]
struct Finished {
    count: usize,
    panic: Option<Box<dyn Any + Send>>,
}

#[derive(Default)]
struct Shared {
    dispatch: Mutex<Dispatch>,
    dispatched: Condvar,
    finished: Mutex<Finished>,
    all_finished: Condvar,
}

/// Worker threads that run one task at a time, each with its own index.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` threads.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to create a thread.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let shared = Arc::new(Shared::default());
        let handles = (0..workers)
            .map(|index| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("tessera-worker-{index}"))
                    .spawn(move || worker_loop(&shared, index))
                    .expect("failed to spawn worker thread")
            })
            .collect();
        debug!(workers, "worker pool started");
        Self { shared, handles }
    }

    /// Number of worker threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Run `task(index)` once on every worker and wait for all of them.
    ///
    /// A panic inside the task is re-raised here after the barrier.
    pub fn run(&self, task: &Task<'_>) {
        if self.handles.is_empty() {
            return;
        }

        // SAFETY: the reference is cleared below before `run` returns, and
        // `run` returns only after every worker has finished with it
        #[allow(clippy::transmute_ptr_to_ptr)]
        let task = unsafe { mem::transmute::<&Task<'_>, &'static Task<'static>>(task) };

        self.shared.finished.lock().count = 0;
        {
            let mut dispatch = self.shared.dispatch.lock();
            dispatch.epoch += 1;
            dispatch.task = Some(task);
        }
        self.shared.dispatched.notify_all();

        let panic = {
            let mut finished = self.shared.finished.lock();
            while finished.count < self.handles.len() {
                self.shared.all_finished.wait(&mut finished);
            }
            finished.panic.take()
        };
        self.shared.dispatch.lock().task = None;

        if let Some(payload) = panic {
            panic::resume_unwind(payload);
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.dispatch.lock().shutdown = true;
        self.shared.dispatched.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        debug!("worker pool stopped");
    }
}

fn worker_loop(shared: &Shared, index: usize) {
    let mut seen = 0;
    loop {
        let task = {
            let mut dispatch = shared.dispatch.lock();
            while dispatch.epoch == seen && !dispatch.shutdown {
                shared.dispatched.wait(&mut dispatch);
            }
            if dispatch.shutdown {
                return;
            }
            seen = dispatch.epoch;
            dispatch.task
        };

        let result = task.map(|task| panic::catch_unwind(AssertUnwindSafe(|| task(index))));

        let mut finished = shared.finished.lock();
        if let Some(Err(payload)) = result {
            finished.panic.get_or_insert(payload);
        }
        finished.count += 1;
        shared.all_finished.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_every_worker_runs_once() {
        let pool = WorkerPool::new(4);
        let seen: Vec<AtomicUsize> = (0..4).map(|_| AtomicUsize::new(0)).collect();

        pool.run(&|index| {
            seen[index].fetch_add(1, Ordering::Relaxed);
        });

        assert!(seen.iter().all(|count| count.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn test_pool_is_reusable() {
        let pool = WorkerPool::new(3);
        let total = AtomicUsize::new(0);

        for _ in 0..100 {
            pool.run(&|_| {
                total.fetch_add(1, Ordering::Relaxed);
            });
        }

        assert_eq!(total.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn test_empty_pool_runs_nothing() {
        let pool = WorkerPool::new(0);
        let total = AtomicUsize::new(0);
        pool.run(&|_| {
            total.fetch_add(1, Ordering::Relaxed);
        });
        assert!(pool.is_empty());
        assert_eq!(total.load(Ordering::Relaxed), 0);
    }

    #[test]
    #[should_panic(expected = "worker 1 failed")]
    fn test_panic_is_raised_on_dispatcher() {
        let pool = WorkerPool::new(2);
        pool.run(&|index| {
            assert!(index != 1, "worker 1 failed");
        });
    }

    #[test]
    fn test_pool_survives_a_panicking_task() {
        let pool = WorkerPool::new(2);
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pool.run(&|_| panic!("boom"));
        }));
        assert!(result.is_err());

        let total = AtomicUsize::new(0);
        pool.run(&|_| {
            total.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(total.load(Ordering::Relaxed), 2);
    }
}
