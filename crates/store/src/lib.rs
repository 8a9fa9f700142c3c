//! Transactional persistence for the marketplace checkout core.
//!
//! [`Store`] opens units of work ([`StoreTx`]) in which stock, carts and
//! orders are read under lock and written atomically. Two adapters are
//! provided: [`InMemoryStore`] and [`PostgresStore`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTx};
pub use postgres::{PostgresStore, PostgresTx};
pub use store::{RecordedEvent, Store, StoreTx};
