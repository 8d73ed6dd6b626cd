//! Node-affinity acquisition tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use session_pool::{Context, Factory, Item, Pool, PoolOptions, Result};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

struct Session {
    node: u32,
}

#[async_trait]
impl Item for Session {
    fn is_alive(&self) -> bool {
        true
    }

    fn node_id(&self) -> u32 {
        self.node
    }

    async fn close(self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// Hands out node IDs from a queue, then 0 (unknown).
#[derive(Default)]
struct NodeFactory {
    nodes: Mutex<VecDeque<u32>>,
    created: AtomicU64,
}

impl NodeFactory {
    fn with_nodes(nodes: impl IntoIterator<Item = u32>) -> Arc<Self> {
        Arc::new(Self {
            nodes: Mutex::new(nodes.into_iter().collect()),
            created: AtomicU64::new(0),
        })
    }
}

/// Local wrapper so `Factory` can be implemented on an `Arc`-shared handle
/// without running afoul of the orphan rules.
#[derive(Clone)]
struct NodeFactoryHandle(Arc<NodeFactory>);

#[async_trait]
impl Factory for NodeFactoryHandle {
    type Item = Session;

    async fn create_item(&self, _ctx: &Context) -> Result<Session> {
        self.0.created.fetch_add(1, Ordering::SeqCst);
        let node = self.0.nodes.lock().pop_front().unwrap_or(0);
        Ok(Session { node })
    }
}

/// Fill the pool with one idle item per queued node ID.
async fn fill_idle(pool: &Pool<NodeFactoryHandle>, count: usize) {
    let ctx = Context::new();
    let mut leases = Vec::new();
    for _ in 0..count {
        leases.push(pool.acquire(&ctx).await.unwrap());
    }
    for lease in leases {
        pool.release(&ctx, lease).await.unwrap();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn preferred_node_is_chosen_from_idle() {
    let factory = NodeFactory::with_nodes([10, 20, 30]);
    let pool = Pool::new(
        NodeFactoryHandle(factory.clone()),
        PoolOptions {
            limit: 3,
            ..Default::default()
        },
    )
    .unwrap();
    fill_idle(&pool, 3).await;

    let ctx = Context::new().with_preferred_node(20);
    let lease = pool.acquire(&ctx).await.unwrap();
    assert_eq!(lease.node_id(), 20);

    // The survivors keep their order.
    let generic = Context::new();
    let first = pool.acquire(&generic).await.unwrap();
    let second = pool.acquire(&generic).await.unwrap();
    assert_eq!(first.node_id(), 10);
    assert_eq!(second.node_id(), 30);
    assert_eq!(factory.created.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn preferred_node_creates_fresh_item_when_there_is_room() {
    let factory = NodeFactory::with_nodes([10, 20]);
    let pool = Pool::new(
        NodeFactoryHandle(factory.clone()),
        PoolOptions {
            limit: 2,
            ..Default::default()
        },
    )
    .unwrap();
    fill_idle(&pool, 1).await;
    assert_eq!(pool.stats().idle, 1);

    // No idle item on node 20, but room to grow: create instead of
    // settling for the node-10 item.
    let ctx = Context::new().with_preferred_node(20);
    let lease = pool.acquire(&ctx).await.unwrap();
    assert_eq!(lease.node_id(), 20);
    assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    assert_eq!(pool.stats().idle, 1, "the node-10 item stayed idle");
}

#[tokio::test(start_paused = true)]
async fn preferred_node_falls_back_when_pool_is_full() {
    let factory = NodeFactory::with_nodes([10]);
    let pool = Pool::new(
        NodeFactoryHandle(factory.clone()),
        PoolOptions {
            limit: 1,
            ..Default::default()
        },
    )
    .unwrap();
    fill_idle(&pool, 1).await;

    // No match and no room: take the front idle item anyway.
    let ctx = Context::new().with_preferred_node(20);
    let lease = pool.acquire(&ctx).await.unwrap();
    assert_eq!(lease.node_id(), 10);
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unknown_node_zero_matches_nothing_special() {
    let factory = NodeFactory::with_nodes([10, 20]);
    let pool = Pool::new(
        NodeFactoryHandle(factory.clone()),
        PoolOptions {
            limit: 2,
            ..Default::default()
        },
    )
    .unwrap();
    fill_idle(&pool, 2).await;

    // A caller with no preference takes the front item.
    let lease = pool.acquire(&Context::new()).await.unwrap();
    assert_eq!(lease.node_id(), 10);
}
