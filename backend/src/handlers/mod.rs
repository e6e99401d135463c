//! HTTP handlers for the allocation server

pub mod allocations;
pub mod health;
pub mod references;
pub mod serials;
pub mod stock;

pub use allocations::*;
pub use health::*;
pub use references::*;
pub use serials::*;
pub use stock::*;
