use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A reusable unit of deferred work.
///
/// A task sits in a [`TaskQueue`] at most once: enqueueing it again before
/// it has run is a no-op.
pub struct Task {
    queued: AtomicBool,
    job: Box<dyn Fn() + Send + Sync>,
}

impl Task {
    pub fn new<F>(job: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            queued: AtomicBool::new(false),
            job: Box::new(job),
        })
    }
    pub fn is_queued(&self) -> bool {
        self.queued.load(Ordering::Acquire)
    }
    fn run(&self) {
        // cleared first so the job may re-enqueue itself
        self.queued.store(false, Ordering::Release);
        (self.job)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("queued", &self.is_queued()).finish()
    }
}

enum Work {
    Task(Arc<Task>),
    Once(Box<dyn FnOnce() + Send>),
}

/// FIFO queue of deferred work, drained synchronously by [`poll_for_work`](TaskQueue::poll_for_work).
///
/// Interrupt-side code only enqueues; everything else runs later on the
/// single logical thread that polls the queue.
#[derive(Clone)]
pub struct TaskQueue {
    sender: flume::Sender<Work>,
    receiver: flume::Receiver<Work>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").field("pending", &self.len()).finish()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }
    pub fn enqueue(&self, task: &Arc<Task>) {
        if task.queued.swap(true, Ordering::AcqRel) {
            // already enqueued
            return;
        }
        if self.sender.send(Work::Task(task.clone())).is_err() {
            task.queued.store(false, Ordering::Release);
        }
    }
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        _ = self.sender.send(Work::Once(Box::new(job)));
    }
    pub fn len(&self) -> usize {
        self.receiver.len()
    }
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
    /// Runs queued work in FIFO order until the queue is empty, including
    /// work enqueued by the jobs themselves. Returns the number of jobs run.
    pub fn poll_for_work(&self) -> usize {
        let mut count = 0;
        while let Ok(work) = self.receiver.try_recv() {
            match work {
                Work::Task(task) => task.run(),
                Work::Once(job) => job(),
            }
            count += 1;
        }
        count
    }
}
