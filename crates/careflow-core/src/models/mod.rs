//! Domain models for the careflow system.

mod audit;
mod inventory;
mod patient;
mod visit;

pub use audit::*;
pub use inventory::*;
pub use patient::*;
pub use visit::*;
