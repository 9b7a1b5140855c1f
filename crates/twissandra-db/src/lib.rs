//! Store adapter for the Twissandra timeline engine.
//!
//! Everything above this crate sees storage as an ordered wide-column store
//! with row-scoped atomicity, described by the [`Store`] trait. Three
//! backends implement it:
//!
//! ```text
//! Engine components
//!     |
//!     +-- Store trait
//!         |-- MemoryStore     (in-process, tests and local runs)
//!         |-- PostgresStore   (one `cells` table, sqlx)
//!         +-- DragonflyStore  (sorted set + hash per row, fred)
//! ```
//!
//! # Modules
//!
//! - [`store`] -- The [`Store`] trait, [`Table`], [`ColumnKey`] and [`Scan`]
//! - [`memory`] -- In-memory backend with fault injection
//! - [`postgres`] -- `PostgreSQL` backend and pool configuration
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) backend
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

// Re-export primary types for convenience.
pub use dragonfly::DragonflyStore;
pub use error::DbError;
pub use memory::MemoryStore;
pub use postgres::{PostgresConfig, PostgresStore};
pub use store::{Cell, ColumnKey, Row, Scan, Store, Table};
