//! Ledger operations over the clinic store.
//!
//! Every mutating function takes the caller's [`rusqlite::Transaction`] rather than opening its
//! own connection. The caller owns the transaction boundary: all writes made through these
//! functions commit together, or the dropped transaction rolls all of them back.
//!
//! Read-only helpers accept any `&Connection` (a transaction derefs to one).

pub mod audit;
pub mod consultation;
pub mod directory;
pub mod dispense;
pub mod payment;
pub mod registration;
pub mod schedule;
pub mod stock;

#[cfg(test)]
pub(crate) mod test_support;
