//! Generic pool of server-attached items.
//!
//! `Pool<F>` multiplexes a bounded set of `F::Item` values across concurrent
//! callers: idle items are reused FIFO (with optional node affinity), new
//! items are created on detached tasks, and saturated callers park in a FIFO
//! waiter queue until a release hands an item over.

pub mod config;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::item::{Factory, Item};
use crate::lease::Lease;
use crate::list::{Handle, List};
use crate::retry::RetryOptions;
use crate::waiters::{ChannelCache, WaitChannel};

pub use config::PoolOptions;

/// Attempt budget for a single acquisition.
const MAX_GET_ATTEMPTS: usize = 100;

/// Capacity of the waiter-channel free list.
const WAIT_CACHE_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Snapshot of pool occupancy, taken under the read lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Hard cap on live plus in-creation items; 0 after close.
    pub limit: usize,
    /// Registered items, idle and busy.
    pub index: usize,
    /// Items parked on the idle list.
    pub idle: usize,
    /// Callers parked in the waiter queue.
    pub wait: usize,
    /// Creations currently in flight.
    pub create_in_progress: usize,
}

// ---------------------------------------------------------------------------
// Registry internals
// ---------------------------------------------------------------------------

/// Identity of a registered item, assigned at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(u64);

/// Per-item bookkeeping. The registry owns this; `idle` is a weak
/// back-pointer into the idle list, valid only while the item is parked.
struct ItemInfo {
    idle: Option<Handle>,
    last_used: Instant,
    use_count: u64,
}

/// Combined pool state under a single lock: registry, idle list, waiter
/// queue, and admission counters.
struct PoolState<T> {
    limit: usize,
    index: HashMap<ItemId, ItemInfo>,
    idle: List<(ItemId, T)>,
    wait_q: List<Arc<WaitChannel<(ItemId, T)>>>,
    create_in_progress: usize,
    next_id: u64,
}

impl<T: Item> PoolState<T> {
    fn stats(&self) -> Stats {
        Stats {
            limit: self.limit,
            index: self.index.len(),
            idle: self.idle.len(),
            wait: self.wait_q.len(),
            create_in_progress: self.create_in_progress,
        }
    }

    /// Whether another live or in-creation item fits under the limit.
    fn has_room(&self) -> bool {
        self.index.len() + self.create_in_progress < self.limit
    }

    fn register(&mut self, now: Instant) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        self.index.insert(
            id,
            ItemInfo {
                idle: None,
                last_used: now,
                use_count: 0,
            },
        );
        id
    }

    fn deregister(&mut self, id: ItemId) {
        self.index.remove(&id);
    }

    /// Remove the front idle entry, clearing its back-pointer.
    fn remove_first_idle(&mut self) -> Option<(ItemId, T)> {
        let (id, item) = self.idle.pop_front()?;
        if let Some(info) = self.index.get_mut(&id) {
            info.idle = None;
        }
        Some((id, item))
    }

    /// Remove the first idle entry attached to `node_id`, preserving the
    /// order of the survivors.
    fn remove_idle_by_node(&mut self, node_id: u32) -> Option<(ItemId, T)> {
        let handle = self
            .idle
            .iter()
            .find(|(_, (_, item))| item.node_id() == node_id)
            .map(|(handle, _)| handle)?;
        let (id, item) = self.idle.remove(handle)?;
        if let Some(info) = self.index.get_mut(&id) {
            info.idle = None;
        }
        Some((id, item))
    }

    /// Park an item on the back of the idle list, stamping `last_used`.
    ///
    /// Hands the item back when it has no registry entry; unregistered
    /// items must never enter the idle list.
    fn push_idle(&mut self, id: ItemId, item: T, now: Instant) -> std::result::Result<(), T> {
        let Some(info) = self.index.get_mut(&id) else {
            return Err(item);
        };
        debug_assert!(info.idle.is_none(), "item is already idle");
        info.last_used = now;
        info.idle = Some(self.idle.push_back((id, item)));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pool<F>
// ---------------------------------------------------------------------------

struct PoolInner<F: Factory> {
    factory: F,
    options: PoolOptions,
    state: RwLock<PoolState<F::Item>>,
    wait_cache: ChannelCache<(ItemId, F::Item)>,
    /// Cancelled exactly once, on the first `close` call. Terminal.
    done: CancellationToken,
    closed: AtomicBool,
}

/// Generic pool over a user-supplied [`Factory`].
///
/// Cheap to clone; all clones share the same state.
pub struct Pool<F: Factory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: Factory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Factory> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("stats", &self.stats()).finish()
    }
}

/// Releases the admission-gate slot when a creating task finishes, the
/// factory panicking included. Disarmed when the slot converts into a
/// registry entry instead.
struct CreateSlot<F: Factory> {
    pool: Pool<F>,
    armed: bool,
}

impl<F: Factory> CreateSlot<F> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<F: Factory> Drop for CreateSlot<F> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.pool.inner.state.write();
            state.create_in_progress = state.create_in_progress.saturating_sub(1);
        }
    }
}

/// Close an item bounded by the configured deadline, off the pool lock.
async fn close_with_timeout<T: Item>(item: T, ctx: Context, timeout: Option<Duration>) {
    let close = item.close(&ctx);
    let result = match timeout {
        Some(d) => match tokio::time::timeout(d, close).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout = ?d, "item close timed out");
                return;
            }
        },
        None => close.await,
    };
    if let Err(err) = result {
        tracing::debug!(error = %err, "item close failed");
    }
}

/// Sleeps for `timeout`, or forever when no deadline is configured.
async fn wait_deadline(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

impl<F: Factory> Pool<F> {
    /// Create a new pool over `factory`.
    ///
    /// # Errors
    /// Returns an error if `options` is invalid (e.g. a zero limit).
    pub fn new(factory: F, options: PoolOptions) -> Result<Self> {
        options.validate()?;
        let limit = options.limit;

        tracing::debug!(limit, "created new item pool");
        options.trace.new_fired(limit);

        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                options,
                state: RwLock::new(PoolState {
                    limit,
                    index: HashMap::new(),
                    idle: List::new(),
                    wait_q: List::new(),
                    create_in_progress: 0,
                    next_id: 0,
                }),
                wait_cache: ChannelCache::new(WAIT_CACHE_CAPACITY),
                done: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Snapshot of current pool occupancy.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.inner.state.read().stats()
    }

    fn change_fired(&self, stats: Stats) {
        self.inner.options.trace.change_fired(stats);
    }

    /// Execute `op` with a pooled item, retrying classified-retryable
    /// failures under `retry_options`.
    ///
    /// At most one `op` execution happens per attempt; the item is returned
    /// to the pool after every attempt regardless of the outcome. On final
    /// failure the error reports the attempt count, except for
    /// authorization failures, which surface unwrapped.
    pub async fn with<Op>(
        &self,
        ctx: &Context,
        mut op: Op,
        retry_options: RetryOptions,
    ) -> Result<()>
    where
        Op: for<'a> FnMut(&'a Context, &'a mut F::Item) -> BoxFuture<'a, Result<()>>,
    {
        let mut attempts = 0;

        let result = loop {
            attempts += 1;

            let delay = retry_options.delay_before(attempts);
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    () = self.inner.done.cancelled() => break Err(Error::Closed),
                    () = ctx.cancellation.cancelled() => break Err(Error::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }

            match self.try_with(ctx, &mut op).await {
                Ok(()) => break Ok(()),
                Err(err) if err.is_retryable() && attempts < retry_options.max_attempts => {
                    tracing::debug!(attempt = attempts, error = %err, "retrying pool operation");
                }
                Err(err) => break Err(err),
            }
        };

        match result {
            Ok(()) => {
                self.inner.options.trace.with_fired(attempts, None);
                Ok(())
            }
            Err(err) => {
                // Authorization failures bubble out unwrapped.
                let err = match err {
                    Error::Unauthorized { .. } => err,
                    other => Error::RetriesExhausted {
                        attempts,
                        source: Box::new(other),
                    },
                };
                self.inner.options.trace.with_fired(attempts, Some(&err));
                Err(err)
            }
        }
    }

    /// Acquire an item, wrapped in a [`Lease`] that returns it on drop.
    pub async fn acquire(&self, ctx: &Context) -> Result<Lease<F>> {
        let (id, item) = self.get_item(ctx).await?;
        Ok(Lease::new(self.clone(), id, item))
    }

    /// Return a leased item to the pool.
    pub async fn release(&self, ctx: &Context, lease: Lease<F>) -> Result<()> {
        let (id, item) = lease.into_parts();
        self.put_item(ctx, id, item).await
    }

    /// Close the pool: unblock all waiters with a "pool closed" signal,
    /// close every idle item, and refuse further admissions.
    ///
    /// Returns once all idle items have been closed. A second call fails
    /// with [`Error::Closed`].
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        self.inner.done.cancel();

        let (waiters, idle_items, stats) = {
            let mut state = self.inner.state.write();
            state.limit = 0;
            let waiters = state.wait_q.drain();
            let idle_items = state.idle.drain();
            for (id, _) in &idle_items {
                state.deregister(*id);
            }
            (waiters, idle_items, state.stats())
        };
        self.change_fired(stats);

        // Wake every parked waiter with the retry signal. Drained channels
        // were never handed a value (handoff pops before sending), but
        // recover defensively rather than leak.
        let mut stray = Vec::new();
        for ch in waiters {
            if let Some((id, item)) = ch.close() {
                self.inner.state.write().deregister(id);
                stray.push(item);
            }
        }

        let close_ctx = ctx.detached();
        let timeout = self.inner.options.close_timeout;
        let closes = idle_items
            .into_iter()
            .map(|(_, item)| item)
            .chain(stray)
            .map(|item| close_with_timeout(item, close_ctx.clone(), timeout));
        futures::future::join_all(closes).await;

        tracing::debug!("pool closed");
        self.inner.options.trace.close_fired();
        Ok(())
    }

    // -- single attempt -----------------------------------------------------

    async fn try_with<Op>(&self, ctx: &Context, op: &mut Op) -> Result<()>
    where
        Op: for<'a> FnMut(&'a Context, &'a mut F::Item) -> BoxFuture<'a, Result<()>>,
    {
        let result = self.try_with_inner(ctx, op).await;
        self.inner.options.trace.try_fired(result.as_ref().err());
        result
    }

    async fn try_with_inner<Op>(&self, ctx: &Context, op: &mut Op) -> Result<()>
    where
        Op: for<'a> FnMut(&'a Context, &'a mut F::Item) -> BoxFuture<'a, Result<()>>,
    {
        if self.inner.done.is_cancelled() {
            return Err(Error::Closed);
        }
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (id, mut item) = self.get_item(ctx).await?;

        let result = op(ctx, &mut item).await;

        // The item goes back regardless of the operation's outcome; release
        // failures are already handled (close + deregister) inside put_item.
        if let Err(put_err) = self.put_item(ctx, id, item).await {
            tracing::debug!(error = %put_err, "failed to return item to pool");
        }

        result
    }

    // -- acquisition --------------------------------------------------------

    pub(crate) async fn get_item(&self, ctx: &Context) -> Result<(ItemId, F::Item)> {
        let start = Instant::now();
        let mut attempt = 0;
        let mut last_err: Option<Error> = None;

        while attempt < MAX_GET_ATTEMPTS {
            attempt += 1;

            if self.inner.done.is_cancelled() {
                let err = Error::Closed;
                self.inner.options.trace.get_fired(attempt, Some(&err));
                return Err(err);
            }

            // Try idle, honoring node affinity.
            let removed = {
                let mut state = self.inner.state.write();
                let removed = match ctx.preferred_node_id {
                    Some(node_id) => match state.remove_idle_by_node(node_id) {
                        Some(found) => Some(found),
                        // Room to grow: skip generic removal so a fresh item
                        // is created on the preferred node instead.
                        None if state.has_room() => None,
                        None => state.remove_first_idle(),
                    },
                    None => state.remove_first_idle(),
                };
                removed.map(|found| (found, state.stats()))
            };
            let removed = removed.map(|(found, stats)| {
                self.change_fired(stats);
                found
            });

            if let Some((id, item)) = removed {
                if !item.is_alive() {
                    self.evict(ctx, id, item).await;
                    continue;
                }

                let info = {
                    let mut state = self.inner.state.write();
                    state.index.get_mut(&id).map(|info| {
                        info.use_count += 1;
                        (info.use_count, info.last_used)
                    })
                };
                let Some((use_count, last_used)) = info else {
                    debug_assert!(false, "no registry entry for checked-out item");
                    self.close_item(ctx, item).await;
                    continue;
                };

                let over_used = self
                    .inner
                    .options
                    .item_usage_limit
                    .is_some_and(|cap| use_count > cap);
                let over_aged = self
                    .inner
                    .options
                    .idle_time_to_live
                    .is_some_and(|ttl| last_used.elapsed() > ttl);
                if over_used || over_aged {
                    tracing::debug!(over_used, over_aged, "evicting worn-out item");
                    self.evict(ctx, id, item).await;
                    continue;
                }

                self.inner.options.trace.get_fired(attempt, None);
                return Ok((id, item));
            }

            // Nothing idle: try to create.
            match self.create_item(ctx).await {
                Ok(created) => {
                    self.inner.options.trace.get_fired(attempt, None);
                    return Ok(created);
                }
                Err(err) if !err.is_retryable() => {
                    let err = Error::join(err, last_err.take());
                    self.inner.options.trace.get_fired(attempt, Some(&err));
                    return Err(err);
                }
                Err(err) => last_err = Some(err),
            }

            // Saturated: park until a release hands an item over.
            match self.wait_for_item(ctx).await {
                Ok(Some(found)) => {
                    self.inner.options.trace.get_fired(attempt, None);
                    return Ok(found);
                }
                // Wait deadline, or a channel closed to signal retry.
                Ok(None) => last_err = None,
                Err(err) if !err.is_retryable() => {
                    let err = Error::join(err, last_err.take());
                    self.inner.options.trace.get_fired(attempt, Some(&err));
                    return Err(err);
                }
                Err(err) => last_err = Some(err),
            }
        }

        let stats = self.stats();
        let err = Error::Exhausted {
            attempts: attempt,
            elapsed: start.elapsed(),
            index: stats.index,
            busy: stats.index.saturating_sub(stats.idle),
            idle: stats.idle,
            create_in_progress: stats.create_in_progress,
            source: last_err.map(Box::new),
        };
        self.inner.options.trace.get_fired(attempt, Some(&err));
        Err(err)
    }

    /// Create a new item on a detached task.
    ///
    /// The creation context inherits the caller's values but ties
    /// cancellation to pool shutdown, so a caller walking away mid-create
    /// does not orphan server-side state: the finished item is routed back
    /// through the release path instead.
    async fn create_item(&self, ctx: &Context) -> Result<(ItemId, F::Item)> {
        {
            let mut state = self.inner.state.write();
            if !state.has_room() {
                return Err(Error::Overflow);
            }
            state.create_in_progress += 1;
        }

        let (tx, rx) = tokio::sync::oneshot::channel::<Result<(ItemId, F::Item)>>();

        let pool = self.clone();
        let create_ctx = ctx
            .detached()
            .with_cancellation(self.inner.done.child_token());
        let create_timeout = self.inner.options.create_timeout;

        tokio::spawn(async move {
            let mut slot = CreateSlot {
                pool: pool.clone(),
                armed: true,
            };

            let created = match create_timeout {
                Some(d) => {
                    match tokio::time::timeout(d, pool.inner.factory.create_item(&create_ctx))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(Error::CreateTimeout { timeout: d }),
                    }
                }
                None => pool.inner.factory.create_item(&create_ctx).await,
            };

            match created {
                Ok(item) => {
                    // Convert the admission slot into a registry entry under
                    // one lock so the occupancy bound holds at every moment.
                    let (id, stats) = {
                        let mut state = pool.inner.state.write();
                        let id = state.register(Instant::now());
                        state.create_in_progress = state.create_in_progress.saturating_sub(1);
                        (id, state.stats())
                    };
                    slot.disarm();
                    pool.change_fired(stats);
                    tracing::debug!(node_id = item.node_id(), "created new pool item");

                    if let Err(Ok((id, item))) = tx.send(Ok((id, item))) {
                        // The caller abandoned the create; the item must not
                        // leak, so hand it to a waiter or park it idle.
                        let _ = pool.put_item(&create_ctx, id, item).await;
                    }
                }
                Err(err) => {
                    drop(slot);
                    let _ = tx.send(Err(err));
                }
            }
        });

        tokio::select! {
            biased;
            () = self.inner.done.cancelled() => Err(Error::Closed),
            () = ctx.cancellation.cancelled() => Err(Error::Cancelled),
            result = rx => match result {
                Ok(Ok(created)) => Ok(created),
                // A deadline or cancellation inside the factory is worth a
                // fresh attempt; the fault is not the item source's.
                Ok(Err(err)) if err.is_context() => Err(Error::retryable(err)),
                Ok(Err(err)) => Err(err),
                // Completion channel closed without a result.
                Err(_) => Err(Error::NoProgress),
            },
        }
    }

    /// Park in the waiter queue until a release hands an item over.
    ///
    /// `Ok(None)` means "no item, no fault" — the wait deadline elapsed or
    /// the channel was closed as a retry signal — and triggers the next
    /// acquisition attempt.
    async fn wait_for_item(&self, ctx: &Context) -> Result<Option<(ItemId, F::Item)>> {
        let (ch, handle) = {
            let mut state = self.inner.state.write();
            let ch = self.inner.wait_cache.get_or_new();
            let handle = state.wait_q.push_back(ch.clone());
            let stats = state.stats();
            drop(state);
            self.change_fired(stats);
            (ch, handle)
        };
        self.inner.options.trace.wait_fired();

        enum WaitOutcome<T> {
            Received(Option<T>),
            Shutdown,
            Cancelled,
            Deadline,
        }

        let outcome = tokio::select! {
            biased;
            () = self.inner.done.cancelled() => WaitOutcome::Shutdown,
            () = ctx.cancellation.cancelled() => WaitOutcome::Cancelled,
            received = ch.recv() => WaitOutcome::Received(received),
            () = wait_deadline(self.inner.options.create_timeout) => WaitOutcome::Deadline,
        };

        match outcome {
            WaitOutcome::Received(Some(found)) => {
                // Only a channel that delivered is safe to recycle.
                self.inner.wait_cache.put(ch);
                Ok(Some(found))
            }
            // Closed without delivery: whoever closed the channel already
            // removed us from the queue.
            WaitOutcome::Received(None) => Ok(None),
            WaitOutcome::Shutdown => {
                self.abandon_wait(ctx, &ch, handle).await;
                Err(Error::Closed)
            }
            WaitOutcome::Cancelled => {
                self.abandon_wait(ctx, &ch, handle).await;
                Err(Error::Cancelled)
            }
            WaitOutcome::Deadline => {
                self.abandon_wait(ctx, &ch, handle).await;
                Ok(None)
            }
        }
    }

    /// Leave the waiter queue after losing the wait race.
    async fn abandon_wait(
        &self,
        ctx: &Context,
        ch: &Arc<WaitChannel<(ItemId, F::Item)>>,
        handle: Handle,
    ) {
        let stats = {
            let mut state = self.inner.state.write();
            // A handoff may have popped us already and the slot may have
            // been reused; remove only what is still ours.
            let ours = state
                .wait_q
                .get(handle)
                .is_some_and(|queued| Arc::ptr_eq(queued, ch));
            if ours {
                state.wait_q.remove(handle);
                Some(state.stats())
            } else {
                None
            }
        };
        if let Some(stats) = stats {
            self.change_fired(stats);
        }

        // Closing recovers a value that raced in between losing the select
        // and taking the lock; route it back instead of leaking it.
        if let Some((id, item)) = ch.close() {
            let _ = self.put_item(ctx, id, item).await;
        }
    }

    // -- release ------------------------------------------------------------

    pub(crate) async fn put_item(&self, ctx: &Context, id: ItemId, item: F::Item) -> Result<()> {
        let result = self.put_item_inner(ctx, id, item).await;
        self.inner.options.trace.put_fired(result.as_ref().err());
        result
    }

    async fn put_item_inner(&self, ctx: &Context, id: ItemId, item: F::Item) -> Result<()> {
        if self.inner.done.is_cancelled() {
            self.evict(ctx, id, item).await;
            return Err(Error::Closed);
        }

        if !item.is_alive() {
            self.evict(ctx, id, item).await;
            return Err(Error::ItemNotAlive);
        }

        // Defensive: the admission gate keeps the idle list under the limit,
        // but enforce it so a latent accounting bug cannot grow it unbounded.
        let overflow = {
            let state = self.inner.state.read();
            state.idle.len() >= state.limit
        };
        if overflow {
            self.evict(ctx, id, item).await;
            return Err(Error::Overflow);
        }

        let (id, item) = match self.hand_to_waiter(id, item) {
            None => return Ok(()),
            Some(returned) => returned,
        };

        // No waiter took it: park on the idle list, unless shutdown raced in.
        enum PutOutcome<T> {
            Closed(T),
            Idle,
            Rejected(T),
        }
        let (outcome, stats) = {
            let mut state = self.inner.state.write();
            if self.inner.done.is_cancelled() {
                state.deregister(id);
                (PutOutcome::Closed(item), state.stats())
            } else {
                match state.push_idle(id, item, Instant::now()) {
                    Ok(()) => (PutOutcome::Idle, state.stats()),
                    Err(item) => (PutOutcome::Rejected(item), state.stats()),
                }
            }
        };
        self.change_fired(stats);
        match outcome {
            PutOutcome::Closed(item) => {
                self.close_item(ctx, item).await;
                Err(Error::Closed)
            }
            PutOutcome::Idle => Ok(()),
            PutOutcome::Rejected(item) => {
                self.close_item(ctx, item).await;
                Err(Error::internal("release of an unregistered item"))
            }
        }
    }

    /// Try to hand `item` to the oldest parked waiter, FIFO.
    ///
    /// Returns the item back when no waiter accepts it. Waiters that are
    /// not parked yet, or that already gave up, get their channel closed as
    /// a retry signal and the next waiter is tried.
    fn hand_to_waiter(&self, id: ItemId, item: F::Item) -> Option<(ItemId, F::Item)> {
        let mut payload = (id, item);
        loop {
            let ch = {
                let mut state = self.inner.state.write();
                match state.wait_q.pop_front() {
                    Some(ch) => {
                        let stats = state.stats();
                        drop(state);
                        self.change_fired(stats);
                        ch
                    }
                    None => return Some(payload),
                }
            };

            if self.inner.done.is_cancelled() {
                ch.close();
                continue;
            }

            match ch.try_send(payload) {
                Ok(()) => return None,
                Err(returned) => {
                    payload = returned;
                    ch.close();
                }
            }
        }
    }

    // -- eviction -----------------------------------------------------------

    /// Drop the registry entry for `id` and close `item` off the lock.
    async fn evict(&self, ctx: &Context, id: ItemId, item: F::Item) {
        let stats = {
            let mut state = self.inner.state.write();
            state.deregister(id);
            state.stats()
        };
        self.change_fired(stats);
        self.close_item(ctx, item).await;
    }

    /// Close an item: inline when `sync_close` is set, on a detached task
    /// otherwise. The close context keeps the caller's values but not its
    /// cancellation.
    async fn close_item(&self, ctx: &Context, item: F::Item) {
        let close_ctx = ctx.detached();
        let timeout = self.inner.options.close_timeout;
        if self.inner.options.sync_close {
            close_with_timeout(item, close_ctx, timeout).await;
        } else {
            tokio::spawn(close_with_timeout(item, close_ctx, timeout));
        }
    }
}
