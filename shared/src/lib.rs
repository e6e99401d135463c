//! Shared allocation and reference engine
//!
//! This crate contains the domain models and pure engine logic used by the
//! backend service and the WASM previews: order reference sequencing, serial
//! number resolution and stock allocation bookkeeping.

pub mod error;
pub mod events;
pub mod ledger;
pub mod models;
pub mod reference;
pub mod serial;
pub mod settings;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
