mod account;
mod allocation;
mod audit;
mod document;
mod journal;
mod money;
mod payment;
mod reconcile;

pub use account::*;
pub use allocation::*;
pub use audit::*;
pub use document::*;
pub use journal::*;
pub use money::*;
pub use payment::*;
pub use reconcile::*;
