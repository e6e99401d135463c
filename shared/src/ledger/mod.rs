//! Stock allocation ledger
//!
//! [`rules`] holds the storage-free checks; [`StockAllocationLedger`] applies
//! them to in-memory state over a [`StockStore`].

mod engine;
pub mod rules;
mod store;

pub use engine::StockAllocationLedger;
pub use rules::{CommitAction, CommitPlan, CommitStep};
pub use store::{InMemoryStockStore, StockStore};
