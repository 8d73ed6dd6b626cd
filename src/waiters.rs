//! Single-slot rendezvous channels for blocked acquirers.
//!
//! Each waiter in the queue owns a [`WaitChannel`]: a rendezvous slot that
//! accepts a value only while the waiter is blocked in [`WaitChannel::recv`].
//! Closing the channel signals "retry" to the waiter. A bounded
//! [`ChannelCache`] recycles channels so the hot wait path does not allocate.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

struct ChannelState<T> {
    value: Option<T>,
    closed: bool,
    /// True while a receiver is parked in `recv`. Senders may deposit a
    /// value only while this holds, which keeps values out of channels
    /// whose waiters already gave up.
    receiving: bool,
}

/// Single-slot rendezvous channel.
pub(crate) struct WaitChannel<T> {
    state: Mutex<ChannelState<T>>,
    notify: Notify,
}

impl<T> WaitChannel<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ChannelState {
                value: None,
                closed: false,
                receiving: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Attempt a non-blocking handoff.
    ///
    /// Succeeds only while a receiver is parked in [`recv`](Self::recv);
    /// otherwise the value is handed back so the caller can offer it to the
    /// next waiter or return it to the idle list.
    pub(crate) fn try_send(&self, value: T) -> std::result::Result<(), T> {
        let mut state = self.state.lock();
        if state.closed || !state.receiving || state.value.is_some() {
            return Err(value);
        }
        state.value = Some(value);
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    /// Receive a value, parking until a sender delivers or the channel is
    /// closed. Returns `None` on close (the retry signal).
    ///
    /// Cancel-safe: if the returned future is dropped after a value was
    /// deposited, [`close`](Self::close) recovers the value.
    pub(crate) async fn recv(&self) -> Option<T> {
        self.state.lock().receiving = true;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if let Some(value) = state.value.take() {
                    state.receiving = false;
                    return Some(value);
                }
                if state.closed {
                    state.receiving = false;
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Close the channel, waking any parked receiver with the retry signal.
    ///
    /// Idempotent. Returns a value that was deposited but never consumed
    /// (the deliver/abandon race) so the caller can route it back to the
    /// pool instead of leaking it.
    pub(crate) fn close(&self) -> Option<T> {
        let mut state = self.state.lock();
        state.closed = true;
        state.receiving = false;
        let leftover = state.value.take();
        drop(state);
        self.notify.notify_one();
        leftover
    }

    /// A channel is reusable only when empty, unclosed, and unowned.
    pub(crate) fn is_reusable(&self) -> bool {
        let state = self.state.lock();
        !state.closed && !state.receiving && state.value.is_none()
    }
}

/// Bounded free-list of wait channels.
///
/// Only channels that completed a delivery come back here; channels closed
/// to signal retry are discarded, as are channels whose invariants cannot
/// be verified at `put` time.
pub(crate) struct ChannelCache<T> {
    free: Mutex<Vec<Arc<WaitChannel<T>>>>,
    capacity: usize,
}

impl<T> ChannelCache<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Return a recycled channel, or allocate a fresh one.
    pub(crate) fn get_or_new(&self) -> Arc<WaitChannel<T>> {
        if let Some(ch) = self.free.lock().pop() {
            return ch;
        }
        Arc::new(WaitChannel::new())
    }

    /// Re-file a channel for reuse. The channel is dropped instead when it
    /// is closed, holds a value, still has a receiver, or the cache is full.
    pub(crate) fn put(&self, ch: Arc<WaitChannel<T>>) {
        if !ch.is_reusable() {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(ch);
        }
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        self.free.lock().len()
    }
}
