//! Data layer for the City simulation server.
//!
//! `PostgreSQL` holds the durable truth: resident identity and state,
//! inventory, civic tables, shop stock, and the append-only event log.
//! The engine writes through a bounded single-writer queue so the tick
//! worker never awaits the database; reads happen once at startup when
//! world state is reconstituted.
//!
//! # Modules
//!
//! - [`postgres`] -- connection pooling and migrations
//! - [`repository`] -- the repository trait, rows, and implementations
//! - [`writer`] -- the bounded persist queue and its writer task

pub mod error;
pub mod postgres;
pub mod repository;
pub mod writer;

pub use error::DbError;
pub use postgres::{PostgresConfig, PostgresPool};
pub use repository::{
    CheckpointRow, InventoryItemRow, JobRow, MemoryRepository, PetitionRow,
    PostgresRepository, Repository, ResidentRow,
};
pub use writer::{spawn_writer, PersistHandle, PersistRequest};
