pub mod set;
mod worker;

pub use set::PipelineSet;
pub(crate) use worker::{WorkerHandle, run_worker};

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::request::KvRequest;

/// Why a request could not be enqueued. The request is handed back so the
/// caller can retry against fresh routing or fail it.
#[derive(Debug)]
pub enum SendError {
    /// The pipeline was torn down, typically by a concurrent
    /// reconfiguration; re-route and retry.
    Closed(KvRequest),
    /// The pipeline is at capacity; admission control, not retried here.
    Full(KvRequest),
}

pub(crate) enum WaitOutcome {
    Request(KvRequest),
    Closed,
}

/// Ordered queue of in-flight and pending requests bound to one node
/// address.
///
/// A pipeline is owned by exactly one `PipelineSet` at a time; its
/// connection workers may be handed to a successor set during
/// reconfiguration so persisting nodes keep their connections.
pub struct Pipeline {
    address: String,
    max_queue: usize,
    state: Mutex<QueueState>,
    work: Notify,
    workers: Mutex<Vec<Arc<WorkerHandle>>>,
}

struct QueueState {
    queue: VecDeque<KvRequest>,
    closed: bool,
}

impl Pipeline {
    pub(crate) fn new(address: String, max_queue: usize) -> Self {
        Self {
            address,
            max_queue,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                closed: false,
            }),
            work: Notify::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn queued_len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Append a request. Bounded time: fails `Full` at capacity rather than
    /// waiting.
    pub fn send_request(&self, request: KvRequest) -> Result<(), SendError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(SendError::Closed(request));
            }
            if state.queue.len() >= self.max_queue {
                return Err(SendError::Full(request));
            }
            state.queue.push_back(request);
        }
        self.work.notify_one();
        Ok(())
    }

    /// Prepend a request: work drained out of a retiring pipeline keeps its
    /// place ahead of new submissions.
    pub fn requeue_request(&self, request: KvRequest) -> Result<(), SendError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(SendError::Closed(request));
            }
            if state.queue.len() >= self.max_queue {
                return Err(SendError::Full(request));
            }
            state.queue.push_front(request);
        }
        self.work.notify_one();
        Ok(())
    }

    /// Claim the next request, or learn the pipeline is gone.
    pub(crate) async fn wait_for_work(&self) -> WaitOutcome {
        loop {
            let mut notified = pin!(self.work.notified());
            notified.as_mut().enable();
            {
                let mut state = self.state.lock().unwrap();
                if let Some(request) = state.queue.pop_front() {
                    return WaitOutcome::Request(request);
                }
                if state.closed {
                    return WaitOutcome::Closed;
                }
            }
            notified.await;
        }
    }

    /// Wait until work is queued without claiming it. Returns false when the
    /// pipeline closed instead. Used by lazily connecting workers.
    pub(crate) async fn wait_until_nonempty(&self) -> bool {
        loop {
            let mut notified = pin!(self.work.notified());
            notified.as_mut().enable();
            {
                let state = self.state.lock().unwrap();
                if !state.queue.is_empty() {
                    return true;
                }
                if state.closed {
                    return false;
                }
            }
            notified.await;
        }
    }

    /// Close the pipeline and return everything still queued.
    pub(crate) fn drain(&self) -> Vec<KvRequest> {
        let drained: Vec<KvRequest> = {
            let mut state = self.state.lock().unwrap();
            state.closed = true;
            state.queue.drain(..).collect()
        };
        self.work.notify_waiters();
        drained
    }

    pub(crate) fn attach_worker(&self, handle: Arc<WorkerHandle>) {
        self.workers.lock().unwrap().push(handle);
    }

    pub(crate) fn detach_workers(&self) -> Vec<Arc<WorkerHandle>> {
        std::mem::take(&mut *self.workers.lock().unwrap())
    }
}
