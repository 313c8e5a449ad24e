//! Domain models for the settlement ledger

pub mod account;
pub mod event;
pub mod institution;
pub mod instruction;
pub mod state;
pub mod transaction;
