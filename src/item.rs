//! Core item traits
//!
//! The `Item` trait defines the capability set a pooled resource must carry;
//! the `Factory` trait defines how new items are created. The pool never
//! constructs an item itself.

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;

/// A pooled, server-attached resource (session, connection, transaction
/// handle).
#[async_trait]
pub trait Item: Send + Sync + Sized + 'static {
    /// Whether the item can still serve requests. Dead items are closed and
    /// evicted on the next acquisition or release that observes them.
    fn is_alive(&self) -> bool;

    /// The server node the item is attached to; `0` means unknown/any.
    fn node_id(&self) -> u32 {
        0
    }

    /// Tear down the item's server-side state.
    async fn close(self, ctx: &Context) -> Result<()>;
}

/// Creates new items on behalf of the pool.
///
/// `create_item` runs on a detached task whose context inherits the caller's
/// values but is cancelled by pool shutdown (plus the configured create
/// timeout), never by the caller walking away.
#[async_trait]
pub trait Factory: Send + Sync + 'static {
    /// The item type this factory produces.
    type Item: Item;

    /// Create a new item. Implementations should observe `ctx.cancellation`
    /// and abort early when the pool shuts down.
    async fn create_item(&self, ctx: &Context) -> Result<Self::Item>;
}
