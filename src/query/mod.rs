//! Query engine: cached, self-refreshing subscriptions to server resources.
//!
//! Inspired by TanStack Query. Every resource key has at most one driver
//! task that merges its refresh triggers (mount, invalidation, polling
//! interval, window focus, reconnect) and publishes a [`QueryState`] to all
//! subscribers through a watch channel.
//!
//! # Example
//!
//! ```ignore
//! let api = api.clone();
//! let mut tables = client.use_query(
//!   "all-tables",
//!   move || {
//!     let api = api.clone();
//!     async move { api.tables().await }
//!   },
//!   QueryConfig::default().with_refetch_interval(Some(Duration::from_secs(15))),
//! )?;
//!
//! // In event loop tick
//! if tables.poll() {
//!   // State changed, re-render
//! }
//!
//! // In render
//! let state = tables.state();
//! match (state.data(), state.error()) {
//!   (Some(tables), _) => render_tables(tables, state.is_loading()),
//!   (None, Some(e)) => render_error(e),
//!   (None, None) => render_spinner(),
//! }
//! ```

mod client;
mod config;
mod driver;
mod handle;
mod state;

pub use client::{ClientOptions, QueryClient};
pub use config::QueryConfig;
pub use handle::QueryHandle;
pub use state::QueryState;
