//! # Clinic Core
//!
//! Core business logic for the clinic front desk.
//!
//! This crate owns the store and every operation with a concurrency hazard:
//! - the slot ledger bounding bookings per doctor, date and time slot
//! - the registration state machine (book, cancel, restore, consult)
//! - the stock ledger and prescription checks
//! - the dispense and payment sequence
//!
//! **No API concerns**: authentication, HTTP servers and request parsing belong in `api-rest`
//! or `api-shared`. Callers reach the core through [`ClinicService`].

pub mod clock;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod service;
pub mod types;

pub use clinic_types::{Money, NonEmptyText, TextError, TimeSlot};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::CoreConfig;
pub use db::Database;
pub use error::{ClinicError, ClinicResult, ErrorKind};
pub use service::ClinicService;
