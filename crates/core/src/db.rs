//! Store connections, transactions and schema migrations.
//!
//! ## Locking model
//!
//! SQLite has no row-level locks. Every mutating operation instead opens its transaction in
//! *immediate* mode, which takes the database write lock before the first statement runs and
//! holds it until commit or rollback. A row read inside such a transaction therefore cannot be
//! changed by any other writer until this one finishes, which is the guarantee
//! `SELECT ... FOR UPDATE` gives on a server database. The ledgers still read, validate and
//! write in a fixed order (prescription before medicine) so the protocol carries over unchanged
//! to a store with real row locks.
//!
//! Lock waits are bounded by the configured busy timeout; a transaction that cannot acquire the
//! lock in time fails with `SQLITE_BUSY` and writes nothing.
//!
//! ## Migrations
//!
//! The schema is versioned with `PRAGMA user_version`. [`Database::migrate`] applies pending
//! steps once at deployment (`clinic migrate`); request-serving processes only call
//! [`Database::verify_schema`].

use crate::config::CoreConfig;
use crate::error::{ClinicError, ClinicResult};
use clinic_types::{Money, TimeSlot};
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, Row, Transaction, TransactionBehavior};
use std::path::PathBuf;
use std::time::Duration;

/// Ordered schema steps. Step `n` (1-based) moves `user_version` from `n - 1` to `n`.
const MIGRATIONS: &[&str] = &[
    // 1: base schema
    r#"
    CREATE TABLE department (
        dept_id     INTEGER PRIMARY KEY AUTOINCREMENT,
        dept_name   TEXT NOT NULL UNIQUE
    );

    CREATE TABLE doctor (
        doctor_id   INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        title       TEXT,
        dept_id     INTEGER NOT NULL REFERENCES department(dept_id),
        reg_fee     INTEGER NOT NULL DEFAULT 0 CHECK (reg_fee >= 0),
        active      INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE patient (
        patient_id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name                TEXT NOT NULL,
        gender              TEXT,
        age                 INTEGER,
        phone               TEXT,
        allergy             TEXT,
        medical_record_no   TEXT NOT NULL UNIQUE
    );

    CREATE TABLE doctor_schedule (
        schedule_id     INTEGER PRIMARY KEY AUTOINCREMENT,
        doctor_id       INTEGER NOT NULL REFERENCES doctor(doctor_id),
        schedule_date   TEXT NOT NULL,
        time_slot       TEXT NOT NULL,
        shift           TEXT NOT NULL,
        max_slots       INTEGER NOT NULL DEFAULT 20,
        booked_slots    INTEGER NOT NULL DEFAULT 0,
        status          TEXT NOT NULL DEFAULT 'AVAILABLE',
        UNIQUE (doctor_id, schedule_date, time_slot),
        CHECK (booked_slots >= 0 AND booked_slots <= max_slots)
    );

    CREATE TABLE registration (
        reg_id          INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id      INTEGER NOT NULL REFERENCES patient(patient_id),
        doctor_id       INTEGER NOT NULL REFERENCES doctor(doctor_id),
        dept_id         INTEGER NOT NULL REFERENCES department(dept_id),
        visit_date      TEXT NOT NULL,
        shift           TEXT NOT NULL,
        time_slot       TEXT NOT NULL,
        queue_num       INTEGER NOT NULL CHECK (queue_num > 0),
        visit_status    TEXT NOT NULL DEFAULT 'UNSEEN',
        fee_status      TEXT NOT NULL DEFAULT 'UNPAID',
        schedule_id     INTEGER REFERENCES doctor_schedule(schedule_id),
        reg_fee         INTEGER NOT NULL DEFAULT 0,
        check_fee       INTEGER NOT NULL DEFAULT 0,
        reg_time        TEXT NOT NULL,
        paid_time       TEXT
    );

    CREATE TABLE medical_record (
        record_id       INTEGER PRIMARY KEY AUTOINCREMENT,
        reg_id          INTEGER NOT NULL UNIQUE REFERENCES registration(reg_id),
        doctor_id       INTEGER NOT NULL REFERENCES doctor(doctor_id),
        main_complaint  TEXT,
        diagnosis       TEXT NOT NULL,
        create_time     TEXT NOT NULL
    );

    CREATE TABLE medicine (
        med_id      INTEGER PRIMARY KEY AUTOINCREMENT,
        med_name    TEXT NOT NULL,
        price       INTEGER NOT NULL CHECK (price >= 0),
        stock       INTEGER NOT NULL CHECK (stock >= 0)
    );

    CREATE TABLE prescription (
        presc_id        INTEGER PRIMARY KEY AUTOINCREMENT,
        reg_id          INTEGER NOT NULL REFERENCES registration(reg_id),
        med_id          INTEGER NOT NULL REFERENCES medicine(med_id),
        dosage          TEXT NOT NULL,
        med_usage       TEXT,
        total_quantity  INTEGER NOT NULL,
        total_amount    INTEGER NOT NULL,
        dispense_status TEXT NOT NULL DEFAULT 'PENDING',
        dispense_time   TEXT,
        UNIQUE (reg_id, med_id)
    );

    CREATE TABLE operation_log (
        log_id          INTEGER PRIMARY KEY AUTOINCREMENT,
        operator_id     INTEGER,
        operator_name   TEXT NOT NULL,
        operator_role   TEXT NOT NULL,
        op_type         TEXT NOT NULL,
        target_id       INTEGER NOT NULL,
        detail          TEXT NOT NULL,
        created_at      TEXT NOT NULL
    );
    "#,
    // 2: lookup paths used by booking, the doctor queue and the pharmacy list
    r#"
    CREATE INDEX idx_registration_slot_day
        ON registration (doctor_id, visit_date, shift, time_slot);
    CREATE INDEX idx_registration_visit_date ON registration (visit_date);
    CREATE INDEX idx_prescription_pending ON prescription (dispense_status, reg_id);
    CREATE INDEX idx_schedule_date ON doctor_schedule (schedule_date);
    "#,
];

/// Schema version a fully migrated database reports.
pub fn latest_schema_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Opens per-worker connections to the clinic store.
///
/// A `Database` holds no connection itself. Each operation opens its own, so concurrent
/// requests share nothing but the store.
#[derive(Clone, Debug)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Database {
    pub fn new(cfg: &CoreConfig) -> Self {
        Self {
            path: cfg.database_path().to_path_buf(),
            busy_timeout: cfg.busy_timeout(),
        }
    }

    /// Opens a connection with foreign keys enforced, WAL journaling and the busy timeout set.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::Database` if the file cannot be opened or a pragma fails.
    pub fn connect(&self) -> ClinicResult<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Ok(conn)
    }

    /// Applies pending migrations and returns the resulting schema version.
    ///
    /// Each step runs in its own immediate transaction together with the `user_version` bump,
    /// so a failed step leaves the database at the previous version.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::SchemaVersionMismatch` if the database is newer than this build,
    /// or `ClinicError::Database` if a step fails.
    pub fn migrate(&self) -> ClinicResult<u32> {
        let mut conn = self.connect()?;
        let mut version = schema_version(&conn)?;
        let latest = latest_schema_version();

        if version > latest {
            return Err(ClinicError::SchemaVersionMismatch {
                found: version,
                expected: latest,
            });
        }

        for (index, step) in MIGRATIONS.iter().enumerate().skip(version as usize) {
            let target = index as u32 + 1;
            let tx = begin_write(&mut conn)?;
            tx.execute_batch(step)?;
            tx.pragma_update(None, "user_version", target)?;
            tx.commit()?;
            tracing::info!("applied schema migration {}", target);
            version = target;
        }

        Ok(version)
    }

    /// Confirms the database is at exactly the schema version this build expects.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::SchemaVersionMismatch` when migrations are pending or the
    /// database was migrated by a newer build.
    pub fn verify_schema(&self) -> ClinicResult<()> {
        let conn = self.connect()?;
        let found = schema_version(&conn)?;
        let expected = latest_schema_version();
        if found != expected {
            return Err(ClinicError::SchemaVersionMismatch { found, expected });
        }
        Ok(())
    }
}

fn schema_version(conn: &Connection) -> ClinicResult<u32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Begins a transaction that holds the store's write lock from its first statement.
pub fn begin_write(conn: &mut Connection) -> ClinicResult<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

// ============================================================================
// COLUMN HELPERS
// ============================================================================

pub(crate) fn time_slot_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<TimeSlot> {
    let raw: String = row.get(idx)?;
    TimeSlot::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn money_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Money> {
    Ok(Money::from_cents(row.get(idx)?))
}
