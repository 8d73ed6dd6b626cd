//! Property tests for pool occupancy invariants.
//!
//! After any sequence of acquire/release operations,
//! `index + create_in_progress <= limit` must hold, idle items never
//! outnumber registered ones, and a quiescent pool has everything idle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;
use session_pool::{Context, Factory, Item, Pool, PoolOptions, Result};

// ---------------------------------------------------------------------------
// Test resource
// ---------------------------------------------------------------------------

struct Session {
    _seq: u64,
}

#[async_trait]
impl Item for Session {
    fn is_alive(&self) -> bool {
        true
    }

    async fn close(self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CountingFactory {
    counter: Arc<AtomicU64>,
}

#[async_trait]
impl Factory for CountingFactory {
    type Item = Session;

    async fn create_item(&self, _ctx: &Context) -> Result<Session> {
        Ok(Session {
            _seq: self.counter.fetch_add(1, Ordering::SeqCst),
        })
    }
}

fn ctx() -> Context {
    Context::new()
}

// ---------------------------------------------------------------------------
// Property: index + create_in_progress <= limit across arbitrary op mixes
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn occupancy_never_exceeds_limit(
        limit in 1usize..8,
        ops in proptest::collection::vec(prop_oneof![Just(true), Just(false)], 1..30),
    ) {
        // Run the async property test on a paused-clock Tokio runtime.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        rt.block_on(async {
            let options = PoolOptions {
                limit,
                create_timeout: Some(Duration::from_millis(10)),
                ..Default::default()
            };
            let pool = Pool::new(CountingFactory::default(), options).unwrap();
            let mut leases = Vec::new();

            for op_is_acquire in &ops {
                if *op_is_acquire {
                    // Acquire (may fail when the pool is exhausted -- fine).
                    if let Ok(lease) = pool.acquire(&ctx()).await {
                        leases.push(lease);
                    }
                } else if !leases.is_empty() {
                    let lease = leases.pop().unwrap();
                    pool.release(&ctx(), lease).await.unwrap();
                }

                let stats = pool.stats();
                prop_assert!(
                    stats.index + stats.create_in_progress <= limit,
                    "invariant violated: index={} + create_in_progress={} > limit={}",
                    stats.index, stats.create_in_progress, limit,
                );
                prop_assert!(
                    stats.idle <= stats.index,
                    "idle={} outnumbers registered={}",
                    stats.idle, stats.index,
                );
            }

            // Return everything and verify the quiescent state.
            for lease in leases.drain(..) {
                pool.release(&ctx(), lease).await.unwrap();
            }
            let stats = pool.stats();
            prop_assert!(stats.index + stats.create_in_progress <= limit);
            prop_assert_eq!(
                stats.idle, stats.index,
                "all leases returned, everything should be idle"
            );
            prop_assert_eq!(stats.wait, 0);

            Ok(())
        })?;
    }
}

/// Deterministic check: rapid acquire-release cycles preserve the occupancy
/// bound and keep reusing the same item.
#[tokio::test(start_paused = true)]
async fn rapid_cycling_preserves_invariants() {
    let factory = CountingFactory::default();
    let counter = factory.counter.clone();
    let pool = Pool::new(
        factory,
        PoolOptions {
            limit: 4,
            ..Default::default()
        },
    )
    .unwrap();

    for _ in 0..20 {
        let lease = pool.acquire(&ctx()).await.unwrap();
        pool.release(&ctx(), lease).await.unwrap();

        let stats = pool.stats();
        assert!(stats.index + stats.create_in_progress <= 4);
        assert_eq!(stats.idle, stats.index);
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1, "one item served it all");
}
