//! Constants used throughout the clinic core crate.
//!
//! Defaults for configuration and the fixed labels written to the store live here so the
//! binaries, the ledgers and the tests agree on them.

/// Default SQLite database file when no explicit path is configured.
pub const DEFAULT_DATABASE_PATH: &str = "clinic.db";

/// Default bound on how long a transaction waits for the store's write lock.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Capacity offered by a schedule row when the administrator does not give one.
pub const DEFAULT_MAX_SLOTS: i64 = 20;

/// Prefix of generated medical record numbers.
pub const MEDICAL_RECORD_PREFIX: &str = "MR";

/// Dosage recorded on a prescription line when the doctor leaves it blank.
pub const DEFAULT_DOSAGE: &str = "standard dose";
