//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::trace::Trace;

/// Default hard cap on live plus in-creation items.
pub const DEFAULT_LIMIT: usize = 50;

/// Default per-create deadline.
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-close deadline.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`Pool`](crate::Pool).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolOptions {
    /// Hard cap: live items plus creations in flight never exceed this.
    pub limit: usize,
    /// Deadline for a single item creation, and for each per-attempt wait
    /// in the acquire loop. `None` disables both.
    pub create_timeout: Option<Duration>,
    /// Deadline for a single item close. `None` disables it.
    pub close_timeout: Option<Duration>,
    /// Idle items older than this are evicted on acquisition. `None`
    /// disables the check.
    pub idle_time_to_live: Option<Duration>,
    /// Items acquired more than this many times are evicted on the next
    /// acquisition. `None` disables the check.
    pub item_usage_limit: Option<u64>,
    /// Close items inline on the releasing caller instead of on a detached
    /// task.
    pub sync_close: bool,
    /// Observer callbacks.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub trace: Trace,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            create_timeout: Some(DEFAULT_CREATE_TIMEOUT),
            close_timeout: Some(DEFAULT_CLOSE_TIMEOUT),
            idle_time_to_live: None,
            item_usage_limit: None,
            sync_close: false,
            trace: Trace::default(),
        }
    }
}

impl PoolOptions {
    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(Error::internal("limit must be greater than 0"));
        }
        Ok(())
    }
}
