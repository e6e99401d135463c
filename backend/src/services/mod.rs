//! Business logic services for the allocation server

pub mod allocation;
pub mod reference;
pub mod serial;
pub mod stock;

pub use allocation::AllocationService;
pub use reference::ReferenceService;
pub use serial::SerialService;
pub use stock::StockService;
