//! One-shot completion slots.
//!
//! Pending `flush()` calls, the `ready` backpressure signal, image decode
//! requests and the static support probes all hand the caller a [`Promise`]:
//! a single-consumer slot that is either resolved with a value or rejected
//! with a [`WebCodecsError`]. A promise can be awaited or synchronously
//! waited on; the producer side is a [`PromiseResolver`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::error::{abort_error, WebCodecsError};

/// The producer half of a one-shot slot.
pub(crate) struct PromiseResolver<T> {
    tx: oneshot::Sender<Result<T, WebCodecsError>>,
}

impl<T> PromiseResolver<T> {
    pub fn resolve(self, value: T) {
        // The receiver may already be gone; a dropped promise is not an error.
        let _ = self.tx.send(Ok(value));
    }

    pub fn reject(self, error: WebCodecsError) {
        let _ = self.tx.send(Err(error));
    }
}

/// The consumer half of a one-shot slot.
#[derive(Debug)]
pub struct Promise<T> {
    rx: oneshot::Receiver<Result<T, WebCodecsError>>,
}

/// Create a connected resolver/promise pair.
pub(crate) fn promise<T>() -> (PromiseResolver<T>, Promise<T>) {
    let (tx, rx) = oneshot::channel();
    (PromiseResolver { tx }, Promise { rx })
}

impl<T> Promise<T> {
    /// A promise that is already resolved.
    pub(crate) fn resolved(value: T) -> Self {
        let (resolver, promise) = promise();
        resolver.resolve(value);
        promise
    }

    /// A promise that is already rejected.
    pub(crate) fn rejected(error: WebCodecsError) -> Self {
        let (resolver, promise) = promise();
        resolver.reject(error);
        promise
    }

    /// Block the calling thread until the slot settles.
    ///
    /// A resolver dropped without settling reads as an abort; that only
    /// happens when the owning codec is torn down.
    pub fn wait(self) -> Result<T, WebCodecsError> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(abort_error("codec was torn down")))
    }
}

impl<T> Future for Promise<T> {
    type Output = Result<T, WebCodecsError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(abort_error("codec was torn down"))),
            Poll::Pending => Poll::Pending,
        }
    }
}
