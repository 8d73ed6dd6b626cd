//! RAII lease over a checked-out item

use crate::context::Context;
use crate::item::Factory;
use crate::pool::{ItemId, Pool};

/// A checked-out item.
///
/// Prefer [`Pool::release`] to return the item explicitly; a lease dropped
/// without release hands the item back on a detached task as a fallback.
pub struct Lease<F: Factory> {
    pool: Pool<F>,
    id: ItemId,
    item: Option<F::Item>,
}

impl<F: Factory> Lease<F> {
    pub(crate) fn new(pool: Pool<F>, id: ItemId, item: F::Item) -> Self {
        Self {
            pool,
            id,
            item: Some(item),
        }
    }

    pub(crate) fn into_parts(mut self) -> (ItemId, F::Item) {
        let item = self.item.take().expect("lease already consumed");
        (self.id, item)
    }
}

impl<F: Factory> std::ops::Deref for Lease<F> {
    type Target = F::Item;

    fn deref(&self) -> &F::Item {
        self.item.as_ref().expect("lease already consumed")
    }
}

impl<F: Factory> std::ops::DerefMut for Lease<F> {
    fn deref_mut(&mut self) -> &mut F::Item {
        self.item.as_mut().expect("lease already consumed")
    }
}

impl<F: Factory> Drop for Lease<F> {
    fn drop(&mut self) {
        let Some(item) = self.item.take() else {
            return;
        };
        let pool = self.pool.clone();
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _ = pool.put_item(&Context::new(), id, item).await;
                });
            }
            Err(_) => {
                tracing::warn!("lease dropped outside a runtime; item leaked");
            }
        }
    }
}

impl<F: Factory> std::fmt::Debug for Lease<F>
where
    F::Item: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease").field("item", &self.item).finish()
    }
}
