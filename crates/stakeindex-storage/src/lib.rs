//! stakeindex-storage: storage backends for StakeIndex.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - `postgres`: PostgreSQL via `sqlx` (feature `postgres`)
//!
//! Both implement every repository trait from `stakeindex_core::store`, so
//! either satisfies the blanket [`stakeindex_core::Store`] bound.

pub mod memory;
pub mod schema;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresStorage};
