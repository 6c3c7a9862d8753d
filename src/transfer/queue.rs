//! Continuation Queue
//!
//! FIFO of requests whose first chunk has been moved but which still have
//! blocks left. A fixed pool of worker threads drains it, driving each request
//! to completion chunk by chunk, so large transfers never recurse on the
//! submitting thread's stack.
//!
//! The queue has its own synchronization (the channel); the page tree lock is
//! never held across a hand-off.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{LunError, Result};

use super::engine::TransferEngine;
use super::request::IoRequest;
use super::IoOutcome;

/// Called exactly once when a request finishes, successfully or not
pub type Completion = Box<dyn FnOnce(IoRequest, Result<IoOutcome>) + Send>;

/// The unfinished remainder of a request
pub struct Continuation {
    request: IoRequest,
    done: Completion,
}

impl Continuation {
    pub fn new(request: IoRequest, done: Completion) -> Self {
        Self { request, done }
    }

    /// Complete the request with `error` without running it
    pub fn fail(self, error: LunError) {
        (self.done)(self.request, Err(error));
    }
}

/// Per-LUN worker pool draining continuations in FIFO order
pub struct ContinuationQueue {
    sender: Mutex<Option<Sender<Continuation>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl ContinuationQueue {
    /// Spawn `threads` workers driving requests through `engine`
    pub fn start(engine: Arc<TransferEngine>, threads: usize, name: &str) -> Result<Self> {
        let (sender, receiver) = channel::unbounded::<Continuation>();
        let pending = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let engine = Arc::clone(&engine);
            let receiver = receiver.clone();
            let pending = Arc::clone(&pending);
            let handle = thread::Builder::new()
                .name(format!("{}-io-{}", name, index))
                .spawn(move || worker_loop(engine, receiver, pending))
                .map_err(|e| LunError::WorkerSpawn(e.to_string()))?;
            workers.push(handle);
        }

        tracing::debug!(threads, name, "Continuation workers started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            pending,
        })
    }

    /// Queue the remainder of a request. Hands it back once the queue is closed.
    pub fn enqueue(&self, continuation: Continuation) -> std::result::Result<(), Continuation> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(continuation);
        };
        self.pending.fetch_add(1, Ordering::AcqRel);
        sender.send(continuation).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            e.into_inner()
        })
    }

    /// Continuations queued or running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Close the queue, let the workers drain what is left, and join them.
    ///
    /// Must not be called from a completion callback (it would join itself).
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("Continuation worker panicked");
            }
        }
    }
}

fn worker_loop(engine: Arc<TransferEngine>, receiver: Receiver<Continuation>, pending: Arc<AtomicUsize>) {
    for Continuation { mut request, done } in receiver.iter() {
        let result = engine.run_to_completion(&mut request);
        if let Err(ref e) = result {
            tracing::debug!(lba = request.lba(), blocks = request.blocks(), "Continuation failed: {}", e);
        }
        done(request, result);
        pending.fetch_sub(1, Ordering::AcqRel);
    }
}
