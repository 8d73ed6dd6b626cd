//! Observer callbacks for pool lifecycle events.
//!
//! All callbacks are optional and invoked without the pool lock held.
//! Callback panics are caught and logged, never propagated into pool state.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::error::Error;
use crate::pool::Stats;

type Hook<A> = Arc<dyn Fn(A) + Send + Sync>;

/// Observer callbacks invoked at pool lifecycle points.
///
/// Error-carrying callbacks receive `None` on success.
#[derive(Clone, Default)]
pub struct Trace {
    /// Fired once at construction with the configured limit.
    pub on_new: Option<Hook<usize>>,
    /// Fired when the pool finishes closing.
    pub on_close: Option<Hook<()>>,
    /// Fired when `with` completes, with the attempt count and outcome.
    pub on_with: Option<Arc<dyn Fn(usize, Option<&Error>) + Send + Sync>>,
    /// Fired when a single `try` completes.
    pub on_try: Option<Arc<dyn Fn(Option<&Error>) + Send + Sync>>,
    /// Fired when an acquisition completes, with its attempt count.
    pub on_get: Option<Arc<dyn Fn(usize, Option<&Error>) + Send + Sync>>,
    /// Fired when a release completes.
    pub on_put: Option<Arc<dyn Fn(Option<&Error>) + Send + Sync>>,
    /// Fired when an acquirer enters the waiter queue.
    pub on_wait: Option<Hook<()>>,
    /// Fired after every observable state change with a fresh snapshot.
    pub on_change: Option<Hook<Stats>>,
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trace")
            .field("on_new", &self.on_new.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_with", &self.on_with.is_some())
            .field("on_try", &self.on_try.is_some())
            .field("on_get", &self.on_get.is_some())
            .field("on_put", &self.on_put.is_some())
            .field("on_wait", &self.on_wait.is_some())
            .field("on_change", &self.on_change.is_some())
            .finish()
    }
}

fn guarded(name: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(callback = name, "trace callback panicked");
    }
}

impl Trace {
    /// Set the state-change observer.
    #[must_use]
    pub fn with_on_change(mut self, f: impl Fn(Stats) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(f));
        self
    }

    /// Set the waiter-entry observer.
    #[must_use]
    pub fn with_on_wait(mut self, f: impl Fn(()) + Send + Sync + 'static) -> Self {
        self.on_wait = Some(Arc::new(f));
        self
    }

    pub(crate) fn new_fired(&self, limit: usize) {
        if let Some(f) = &self.on_new {
            guarded("on_new", || f(limit));
        }
    }

    pub(crate) fn close_fired(&self) {
        if let Some(f) = &self.on_close {
            guarded("on_close", || f(()));
        }
    }

    pub(crate) fn with_fired(&self, attempts: usize, err: Option<&Error>) {
        if let Some(f) = &self.on_with {
            guarded("on_with", || f(attempts, err));
        }
    }

    pub(crate) fn try_fired(&self, err: Option<&Error>) {
        if let Some(f) = &self.on_try {
            guarded("on_try", || f(err));
        }
    }

    pub(crate) fn get_fired(&self, attempts: usize, err: Option<&Error>) {
        if let Some(f) = &self.on_get {
            guarded("on_get", || f(attempts, err));
        }
    }

    pub(crate) fn put_fired(&self, err: Option<&Error>) {
        if let Some(f) = &self.on_put {
            guarded("on_put", || f(err));
        }
    }

    pub(crate) fn wait_fired(&self) {
        if let Some(f) = &self.on_wait {
            guarded("on_wait", || f(()));
        }
    }

    pub(crate) fn change_fired(&self, stats: Stats) {
        if let Some(f) = &self.on_change {
            guarded("on_change", || f(stats));
        }
    }
}
