//! Bounded multi-producer multi-consumer queue with an explicit closed state.
//!
//! Closing is the normal shutdown signal between stages, so both `send` and
//! `recv` report it as a value rather than an error. Both also give up as
//! soon as the supplied cancellation token fires.

use async_channel::{Receiver, Sender};
use tokio_util::sync::CancellationToken;

/// Result of [`Queue::recv`].
#[derive(Debug, PartialEq, Eq)]
pub enum Recv<T> {
    Item(T),
    /// Closed and fully drained.
    Closed,
    Cancelled,
}

/// Result of [`Queue::send`].
#[derive(Debug, PartialEq, Eq)]
pub enum Sent {
    Delivered,
    Closed,
    Cancelled,
}

#[derive(Debug)]
pub struct Queue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> Queue<T> {
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Push `item`, waiting while the queue is full.
    pub async fn send(&self, item: T, cancel: &CancellationToken) -> Sent {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Sent::Cancelled,
            sent = self.tx.send(item) => match sent {
                Ok(()) => Sent::Delivered,
                Err(_) => Sent::Closed,
            },
        }
    }

    /// Pop the next item, waiting while the queue is empty.
    ///
    /// Items already queued are still delivered after [`close`](Self::close).
    pub async fn recv(&self, cancel: &CancellationToken) -> Recv<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Recv::Cancelled,
            item = self.rx.recv() => match item {
                Ok(item) => Recv::Item(item),
                Err(_) => Recv::Closed,
            },
        }
    }

    /// Stop accepting items. Returns false if the queue was already closed.
    pub fn close(&self) -> bool {
        self.tx.close()
    }
}
