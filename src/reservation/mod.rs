//! Reserve Stock documents and the ledger that backs them.

mod document;
mod ledger;

pub use document::{ReservationService, ReserveStock};
pub use ledger::StockLedger;
