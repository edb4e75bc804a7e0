//! Temporary stores and seed data shared by the ledger tests.

use crate::clock::FixedClock;
use crate::config::CoreConfig;
use crate::db::{begin_write, Database};
use crate::error::ClinicResult;
use crate::models::{Department, Doctor, Medicine, NewDoctor, NewPatient, Patient};
use crate::repositories::{directory, stock};
use chrono::{NaiveDate, TimeZone, Utc};
use clinic_types::{Money, NonEmptyText, TimeSlot};
use rusqlite::{Connection, Transaction};
use std::time::Duration;
use tempfile::TempDir;

pub(crate) struct TestStore {
    _dir: TempDir,
    pub db: Database,
    pub clock: FixedClock,
}

pub(crate) struct Fixture {
    pub department: Department,
    pub doctor: Doctor,
    pub patient: Patient,
    pub medicine: Medicine,
}

impl TestStore {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = CoreConfig::new(dir.path().join("clinic.db"), Duration::from_secs(5))
            .expect("CoreConfig::new should succeed");
        let db = Database::new(&cfg);
        db.migrate().expect("migrate should succeed");
        Self {
            _dir: dir,
            db,
            clock: FixedClock(Utc.with_ymd_and_hms(2025, 3, 3, 8, 30, 0).unwrap()),
        }
    }

    pub fn connect(&self) -> Connection {
        self.db.connect().expect("connect should succeed")
    }

    /// Runs `f` in a committed write transaction.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> ClinicResult<T>) -> ClinicResult<T> {
        let mut conn = self.connect();
        let tx = begin_write(&mut conn)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// One department, one doctor (15.00 fee), one patient and one medicine (12.50, stock 10).
    pub fn seed(&self) -> Fixture {
        self.write(|tx| {
            let department =
                directory::add_department(tx, &NonEmptyText::new("General Medicine").unwrap())?;
            let doctor = directory::add_doctor(tx, &NewDoctor {
                name: NonEmptyText::new("Dr Lin").unwrap(),
                title: Some("Attending".into()),
                dept_id: department.dept_id,
                reg_fee: "15.00".parse().unwrap(),
            })?;
            let patient = directory::add_patient(tx, &self.clock, &NewPatient {
                name: "Zhang San".into(),
                gender: Some("M".into()),
                age: Some(42),
                ..NewPatient::default()
            })?;
            let medicine = stock::add_medicine(
                tx,
                &NonEmptyText::new("Amoxicillin").unwrap(),
                "12.50".parse::<Money>().unwrap(),
                10,
            )?;
            Ok(Fixture {
                department,
                doctor,
                patient,
                medicine,
            })
        })
        .expect("seed should succeed")
    }

    pub fn add_patient(&self, name: &str) -> Patient {
        self.write(|tx| {
            directory::add_patient(tx, &self.clock, &NewPatient {
                name: name.into(),
                ..NewPatient::default()
            })
        })
        .expect("add_patient should succeed")
    }

    pub fn add_medicine(&self, name: &str, stock: i64) -> Medicine {
        self.write(|tx| {
            stock::add_medicine(
                tx,
                &NonEmptyText::new(name).unwrap(),
                Money::from_cents(500),
                stock,
            )
        })
        .expect("add_medicine should succeed")
    }
}

pub(crate) fn visit_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
}

pub(crate) fn slot(label: &str) -> TimeSlot {
    TimeSlot::parse(label).unwrap()
}
