//! One-shot completion slots.
//!
//! A [Resolver] is written by a native callback, a [Pending] is awaited
//! by the caller. The caller may stop awaiting at any time (timeout,
//! drop); a later write is then discarded. A second write to the same
//! slot is discarded too.

use crate::*;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Create a linked resolver / pending pair.
pub fn slot<T>() -> (Resolver<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Resolver {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        Pending { rx },
    )
}

/// Write side of a completion slot.
pub struct Resolver<T> {
    tx: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Resolver<T> {
    /// Complete the slot. Returns `false` if the value was discarded,
    /// either because the slot was already resolved or because nobody
    /// is waiting anymore.
    pub fn resolve(&self, val: T) -> bool {
        let tx = match self.tx.lock().take() {
            Some(tx) => tx,
            None => {
                tracing::warn!("duplicate completion discarded");
                return false;
            }
        };
        if tx.send(val).is_err() {
            tracing::warn!("completion for abandoned call discarded");
            return false;
        }
        true
    }

    /// True once the slot has been written.
    pub fn is_resolved(&self) -> bool {
        self.tx.lock().is_none()
    }
}

/// Read side of a completion slot.
///
/// Resolves to [Error::Abandoned] if every [Resolver] is dropped
/// without writing.
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map_err(|_| Error::Abandoned)
    }
}
