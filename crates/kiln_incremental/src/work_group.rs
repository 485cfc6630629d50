//! Running independent units of work on the rayon pool or inline.

/// A batch of independent tasks run together and awaited as a unit.
///
/// When the host forbids concurrency every task runs on the calling thread
/// in queue order; otherwise tasks are spawned into a `rayon` scope and
/// [`run_and_wait`](Self::run_and_wait) returns once all of them finished.
pub struct WorkGroup<'a> {
    single_threaded: bool,
    tasks: Vec<Box<dyn FnOnce() + Send + 'a>>,
}

impl<'a> WorkGroup<'a> {
    /// Creates an empty group.
    pub fn new(single_threaded: bool) -> Self {
        Self {
            single_threaded,
            tasks: Vec::new(),
        }
    }

    /// Adds a task to the group. Nothing runs until `run_and_wait`.
    pub fn queue(&mut self, task: impl FnOnce() + Send + 'a) {
        self.tasks.push(Box::new(task));
    }

    /// Returns the number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no task is queued.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every queued task and waits for all of them.
    pub fn run_and_wait(self) {
        if self.single_threaded || self.tasks.len() <= 1 {
            for task in self.tasks {
                task();
            }
            return;
        }
        rayon::scope(|scope| {
            for task in self.tasks {
                scope.spawn(move |_| task());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn runs_every_task_in_parallel_mode() {
        let counter = AtomicUsize::new(0);
        let mut group = WorkGroup::new(false);
        for _ in 0..64 {
            group.queue(|| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        assert_eq!(group.len(), 64);
        group.run_and_wait();
        assert_eq!(counter.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn single_threaded_keeps_queue_order_on_caller_thread() {
        let caller = std::thread::current().id();
        let order = Mutex::new(Vec::new());
        let mut group = WorkGroup::new(true);
        for i in 0..8 {
            let order = &order;
            group.queue(move || {
                assert_eq!(std::thread::current().id(), caller);
                order.lock().unwrap().push(i);
            });
        }
        group.run_and_wait();
        assert_eq!(order.into_inner().unwrap(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn empty_group_is_a_no_op() {
        let group = WorkGroup::new(false);
        assert!(group.is_empty());
        group.run_and_wait();
    }
}
