// Application layer - use cases and orchestration

pub mod allocations;
pub mod error;
pub mod generator;
pub mod reconcile;
pub mod reversal;
pub mod service;
mod config;

pub use config::*;
pub use error::*;
pub use reversal::*;
pub use service::*;
