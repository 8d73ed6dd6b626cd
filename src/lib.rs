//! # session-pool
//!
//! Bounded asynchronous pool for server-attached resources — sessions,
//! connections, transaction handles — multiplexed across many concurrent
//! callers. The pool reuses idle items FIFO (with optional node affinity),
//! queues waiters fairly when saturated, creates items on detached tasks
//! with timeouts, evicts dead, over-aged, and over-used items, and shuts
//! down cleanly.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use session_pool::{Context, Pool, PoolOptions, RetryOptions};
//!
//! let pool = Pool::new(MySessionFactory::connect(endpoint), PoolOptions::default())?;
//! pool.with(
//!     &Context::new(),
//!     |_ctx, session| Box::pin(session.execute("SELECT 1")),
//!     RetryOptions::default(),
//! )
//! .await?;
//! ```

pub mod context;
pub mod error;
pub mod item;
pub mod lease;
pub mod pool;
pub mod retry;
pub mod trace;

mod list;
mod waiters;

pub use context::Context;
pub use error::{BoxError, Error, Result};
pub use item::{Factory, Item};
pub use lease::Lease;
pub use pool::{Pool, PoolOptions, Stats};
pub use retry::RetryOptions;
pub use trace::Trace;
