use anyhow::Result;
use async_trait::async_trait;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Processing applied to each item by the drain worker.
#[async_trait]
pub trait WorkHandler<T>: Send {
    async fn handle(&mut self, item: T) -> Result<()>;
}

/// Bounded multi-producer / single-consumer work queue.
///
/// `enqueue` never blocks the caller; a single background task drains the
/// queue in strict FIFO arrival order. The task is the only consumer for
/// the lifetime of the dispatcher, so there is no idle/draining flag to
/// race against and a just-enqueued item can never stall.
///
/// When the queue is full the newest item is dropped and the drop is
/// counted and logged rather than growing memory without bound.
pub struct Dispatcher<T> {
    tx: Option<Sender<T>>,
    dropped: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Dispatcher<T> {
    /// Start the drain worker and return the producer handle.
    pub fn spawn(capacity: usize, handler: Box<dyn WorkHandler<T>>) -> Self {
        let (tx, rx) = bounded(capacity);
        let errors = Arc::new(AtomicU64::new(0));
        let worker = tokio::spawn(drain(rx, handler, errors.clone()));
        Self {
            tx: Some(tx),
            dropped: Arc::new(AtomicU64::new(0)),
            errors,
            worker: Some(worker),
        }
    }

    /// Append an item to the tail of the queue. Returns false if the item
    /// was dropped because the queue is full or already shut down.
    pub fn enqueue(&self, item: T) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        match tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    dropped = self.dropped.load(Ordering::Relaxed),
                    "dispatch queue full, dropping newest item"
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Items currently waiting in the queue.
    pub fn len(&self) -> usize {
        self.tx.as_ref().map(|tx| tx.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Items whose handler returned an error. Draining continues past
    /// them; this counter is how the failures stay visible.
    pub fn handler_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Stop accepting items, let the worker finish the remaining queue in
    /// order, and wait for it to exit. Subsequent enqueues are rejected.
    pub async fn shutdown(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

impl<T> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        // Dropping the sender lets a still-running worker drain and exit.
        self.tx = None;
    }
}

async fn drain<T: Send>(
    rx: Receiver<T>,
    mut handler: Box<dyn WorkHandler<T>>,
    errors: Arc<AtomicU64>,
) {
    loop {
        match rx.try_recv() {
            Ok(item) => {
                // A failing item must not abandon the rest of the queue.
                if let Err(e) = handler.handle(item).await {
                    errors.fetch_add(1, Ordering::Relaxed);
                    warn!("work item failed: {e:#}");
                }
            }
            Err(TryRecvError::Empty) => {
                tokio::task::yield_now().await;
            }
            Err(TryRecvError::Disconnected) => break,
        }
    }
}
