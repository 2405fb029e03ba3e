//! FIFO run-to-completion execution queue.
//!
//! A write into store A synchronously triggers a subscriber that writes into
//! store B, whose own subscribers run before the outer write has returned:
//! notification handling is reentrant even on a single thread. Boolean guards
//! suppress the echo, but they do not impose an order on competing handler
//! invocations. `ExclusiveQueue` does: every submission is queued and run to
//! completion in FIFO order, one at a time, whether the competing submission
//! came from another thread or from inside the currently running job.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Job = Box<dyn FnOnce() + Send>;

struct Inner {
    queue: Mutex<VecDeque<Job>>,
    draining: AtomicBool,
}

/// A mutual-exclusion queue: submissions run exactly once, in submission
/// order, never concurrently and never nested inside each other.
#[derive(Clone)]
pub struct ExclusiveQueue {
    inner: Arc<Inner>,
}

impl ExclusiveQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Submit a job. If no job is running the caller drains the queue
    /// inline (running its own job and any queued behind it); otherwise the
    /// job is left for the current drainer and this call returns
    /// immediately. Reentrant submissions from inside a running job are
    /// queued, not nested.
    pub fn run_exclusive(&self, job: impl FnOnce() + Send + 'static) {
        {
            let Ok(mut queue) = self.inner.queue.lock() else {
                return;
            };
            queue.push_back(Box::new(job));
            if self.inner.draining.swap(true, Ordering::AcqRel) {
                return;
            }
        }

        loop {
            let job = {
                let Ok(mut queue) = self.inner.queue.lock() else {
                    self.inner.draining.store(false, Ordering::Release);
                    return;
                };
                match queue.pop_front() {
                    Some(job) => job,
                    None => {
                        // Clear the flag while still holding the queue lock,
                        // so a submission racing with shutdown either lands
                        // before this pop or becomes the next drainer.
                        self.inner.draining.store(false, Ordering::Release);
                        return;
                    }
                }
            };
            job();
        }
    }

    /// Number of jobs waiting behind the one currently running.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl Default for ExclusiveQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExclusiveQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusiveQueue")
            .field("pending", &self.pending())
            .finish()
    }
}
