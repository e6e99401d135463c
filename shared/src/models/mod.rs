//! Domain models for the allocation engine

mod allocation;
mod order;
mod serial;
mod stock;

pub use allocation::*;
pub use order::*;
pub use serial::*;
pub use stock::*;
