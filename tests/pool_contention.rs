//! Contention tests: many callers sharing a pool with few slots.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use session_pool::{Context, Factory, Item, Pool, PoolOptions, Result, RetryOptions, Trace};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

struct Session {
    alive: bool,
}

#[async_trait]
impl Item for Session {
    fn is_alive(&self) -> bool {
        self.alive
    }

    async fn close(self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct SessionFactory {
    created: Arc<AtomicU64>,
}

#[async_trait]
impl Factory for SessionFactory {
    type Item = Session;

    async fn create_item(&self, _ctx: &Context) -> Result<Session> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Session { alive: true })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn ten_callers_share_a_single_slot() {
    let factory = SessionFactory::default();
    let created = factory.created.clone();

    let peak_waiters = Arc::new(AtomicUsize::new(0));
    let peak_c = peak_waiters.clone();
    let options = PoolOptions {
        limit: 1,
        trace: Trace::default().with_on_change(move |stats| {
            peak_c.fetch_max(stats.wait, Ordering::SeqCst);
        }),
        ..Default::default()
    };
    let pool = Pool::new(factory, options).unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            pool.with(
                &Context::new(),
                |_ctx, _session| {
                    async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(())
                    }
                    .boxed()
                },
                RetryOptions::default(),
            )
            .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(created.load(Ordering::SeqCst), 1, "one slot, one item");
    assert!(
        peak_waiters.load(Ordering::SeqCst) >= 9,
        "all but the holder should have queued, peak was {}",
        peak_waiters.load(Ordering::SeqCst)
    );

    let stats = pool.stats();
    assert_eq!(stats.index, 1);
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.wait, 0);
}

#[tokio::test(start_paused = true)]
async fn waiters_are_served_in_enqueue_order() {
    let pool = Pool::new(
        SessionFactory::default(),
        PoolOptions {
            limit: 1,
            ..Default::default()
        },
    )
    .unwrap();

    // Hold the only slot so every caller below becomes a waiter.
    let holder = pool.acquire(&Context::new()).await.unwrap();

    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..5u32 {
        let pool = pool.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            // Stagger the arrivals so the enqueue order is deterministic.
            tokio::time::sleep(Duration::from_millis(u64::from(i) + 1)).await;
            pool.with(
                &Context::new(),
                move |_ctx, _session| {
                    let order = order.clone();
                    async move {
                        order.lock().push(i);
                        Ok(())
                    }
                    .boxed()
                },
                RetryOptions::default(),
            )
            .await
        }));
    }

    // Let all five park, then release the slot.
    tokio::time::sleep(Duration::from_millis(10)).await;
    pool.release(&Context::new(), holder).await.unwrap();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_withs_never_exceed_limit() {
    let factory = SessionFactory::default();
    let created = factory.created.clone();
    let pool = Pool::new(
        factory,
        PoolOptions {
            limit: 3,
            ..Default::default()
        },
    )
    .unwrap();

    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pool = pool.clone();
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        handles.push(tokio::spawn(async move {
            pool.with(
                &Context::new(),
                move |_ctx, _session| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                    .boxed()
                },
                RetryOptions::default(),
            )
            .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3, "checkout peak exceeded limit");
    assert!(created.load(Ordering::SeqCst) <= 3);

    let stats = pool.stats();
    assert!(stats.index <= 3);
    assert_eq!(stats.index, stats.idle, "everything returned to idle");
}
