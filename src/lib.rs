//! Client-side sync engine for restaurant operations.
//!
//! A [`QueryClient`] keeps backend collections (tables, deliveries,
//! ingredients, per-table orders) cached under string keys, refreshes them
//! on a schedule or when the terminal regains focus, and applies mutations
//! optimistically with rollback. The [`resources`] adapters put the table,
//! delivery and inventory lifecycles on top of it.

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod event;
pub mod fetch;
pub mod logging;
pub mod mutation;
pub mod query;
pub mod resources;
pub mod signals;

pub use query::{ClientOptions, QueryClient, QueryConfig, QueryHandle, QueryState};
pub use resources::Resources;
pub use signals::LifecycleSignals;
