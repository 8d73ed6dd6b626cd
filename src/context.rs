//! Caller context with cancellation and node-affinity support

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

/// Context for pool operations.
///
/// Carries cancellation, an optional preferred node, and arbitrary metadata.
/// Passed to [`Factory::create_item`](crate::Factory::create_item) and
/// [`Item::close`](crate::Item::close) so implementations can make
/// cancellation-aware decisions.
#[derive(Clone, Default)]
pub struct Context {
    /// Cooperative cancellation token — operations should check this
    /// periodically and abort early when cancelled.
    pub cancellation: CancellationToken,
    /// Preferred node for acquisition: the pool first looks for an idle item
    /// whose [`Item::node_id`](crate::Item::node_id) matches.
    pub preferred_node_id: Option<u32>,
    /// Arbitrary key-value pairs for passing extra context to item
    /// implementations (e.g. region hints, priority labels).
    pub metadata: HashMap<String, String>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("cancellation", &self.cancellation)
            .field("preferred_node_id", &self.preferred_node_id)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl Context {
    /// Create a new context with a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default cancellation token with the provided one.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Stamp a preferred node ID on the context.
    #[must_use]
    pub fn with_preferred_node(mut self, node_id: u32) -> Self {
        self.preferred_node_id = Some(node_id);
        self
    }

    /// Add a key-value metadata pair to the context.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Value-only view: keeps metadata and affinity, detaches cancellation.
    ///
    /// The pool derives creation and close contexts this way so an in-flight
    /// operation outlives the caller that requested it.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            preferred_node_id: self.preferred_node_id,
            metadata: self.metadata.clone(),
        }
    }

    /// Whether the context has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
