//! Departments, doctors and patients referenced by the ledgers.
//!
//! Profile management lives outside the core; this module only provides the rows and lookups
//! that registration needs (doctor fee and department, patient existence) plus the medical record
//! number scheme used when a patient is first added.

use crate::clock::Clock;
use crate::constants::MEDICAL_RECORD_PREFIX;
use crate::db::money_column;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{Department, Doctor, NewDoctor, NewPatient, Patient};
use crate::types::{DeptId, DoctorId, PatientId};
use clinic_types::NonEmptyText;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

const DOCTOR_COLUMNS: &str = "doctor_id, name, title, dept_id, reg_fee, active";
const PATIENT_COLUMNS: &str =
    "patient_id, name, gender, age, phone, allergy, medical_record_no";

fn doctor_from_row(row: &Row<'_>) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        doctor_id: row.get(0)?,
        name: row.get(1)?,
        title: row.get(2)?,
        dept_id: row.get(3)?,
        reg_fee: money_column(row, 4)?,
        active: row.get(5)?,
    })
}

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        patient_id: row.get(0)?,
        name: row.get(1)?,
        gender: row.get(2)?,
        age: row.get(3)?,
        phone: row.get(4)?,
        allergy: row.get(5)?,
        medical_record_no: row.get(6)?,
    })
}

pub fn add_department(tx: &Transaction<'_>, name: &NonEmptyText) -> ClinicResult<Department> {
    tx.execute(
        "INSERT INTO department (dept_name) VALUES (?1)",
        params![name.as_str()],
    )?;
    Ok(Department {
        dept_id: DeptId(tx.last_insert_rowid()),
        name: name.to_string(),
    })
}

pub fn department(conn: &Connection, dept_id: DeptId) -> ClinicResult<Option<Department>> {
    Ok(conn
        .query_row(
            "SELECT dept_id, dept_name FROM department WHERE dept_id = ?1",
            params![dept_id],
            |row| {
                Ok(Department {
                    dept_id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?)
}

pub fn list_departments(conn: &Connection) -> ClinicResult<Vec<Department>> {
    let mut stmt = conn.prepare("SELECT dept_id, dept_name FROM department ORDER BY dept_name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Department {
            dept_id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Adds a doctor to an existing department.
///
/// # Errors
///
/// Returns `ClinicError::DepartmentNotFound` if `new.dept_id` does not exist.
pub fn add_doctor(tx: &Transaction<'_>, new: &NewDoctor) -> ClinicResult<Doctor> {
    if department(tx, new.dept_id)?.is_none() {
        return Err(ClinicError::DepartmentNotFound(new.dept_id));
    }

    tx.execute(
        "INSERT INTO doctor (name, title, dept_id, reg_fee, active) VALUES (?1, ?2, ?3, ?4, 1)",
        params![
            new.name.as_str(),
            new.title,
            new.dept_id,
            new.reg_fee.cents()
        ],
    )?;

    Ok(Doctor {
        doctor_id: DoctorId(tx.last_insert_rowid()),
        name: new.name.to_string(),
        title: new.title.clone(),
        dept_id: new.dept_id,
        reg_fee: new.reg_fee,
        active: true,
    })
}

pub fn set_doctor_active(tx: &Transaction<'_>, doctor_id: DoctorId, active: bool) -> ClinicResult<()> {
    let changed = tx.execute(
        "UPDATE doctor SET active = ?1 WHERE doctor_id = ?2",
        params![active, doctor_id],
    )?;
    if changed == 0 {
        return Err(ClinicError::DoctorNotFound(doctor_id));
    }
    Ok(())
}

pub fn doctor(conn: &Connection, doctor_id: DoctorId) -> ClinicResult<Option<Doctor>> {
    Ok(conn
        .query_row(
            &format!("SELECT {DOCTOR_COLUMNS} FROM doctor WHERE doctor_id = ?1"),
            params![doctor_id],
            doctor_from_row,
        )
        .optional()?)
}

/// Lists doctors accepting registrations, grouped by department name.
pub fn list_active_doctors(conn: &Connection) -> ClinicResult<Vec<Doctor>> {
    let mut stmt = conn.prepare(
        "SELECT d.doctor_id, d.name, d.title, d.dept_id, d.reg_fee, d.active
         FROM doctor d
         JOIN department dept ON d.dept_id = dept.dept_id
         WHERE d.active = 1
         ORDER BY dept.dept_name, d.name",
    )?;
    let rows = stmt.query_map([], doctor_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Adds a patient and assigns a medical record number.
///
/// The number is `MR` + the current date (`yyyymmdd`) + the next patient id, zero-padded to four
/// digits. The write lock held by `tx` keeps the next id stable between reading and inserting.
///
/// # Errors
///
/// Returns `ClinicError::Text` if the name is blank.
pub fn add_patient(
    tx: &Transaction<'_>,
    clock: &dyn Clock,
    new: &NewPatient,
) -> ClinicResult<Patient> {
    let name = NonEmptyText::new(&new.name)?;
    let next_id: i64 = tx.query_row(
        "SELECT COALESCE(MAX(patient_id), 0) + 1 FROM patient",
        [],
        |row| row.get(0),
    )?;
    let medical_record_no = format!(
        "{}{}{:04}",
        MEDICAL_RECORD_PREFIX,
        clock.today().format("%Y%m%d"),
        next_id
    );

    tx.execute(
        "INSERT INTO patient (name, gender, age, phone, allergy, medical_record_no)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            name.as_str(),
            new.gender,
            new.age,
            new.phone,
            new.allergy,
            medical_record_no
        ],
    )?;

    Ok(Patient {
        patient_id: PatientId(tx.last_insert_rowid()),
        name: name.to_string(),
        gender: new.gender.clone(),
        age: new.age,
        phone: new.phone.clone(),
        allergy: new.allergy.clone(),
        medical_record_no,
    })
}

pub fn patient(conn: &Connection, patient_id: PatientId) -> ClinicResult<Option<Patient>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patient WHERE patient_id = ?1"),
            params![patient_id],
            patient_from_row,
        )
        .optional()?)
}

/// Finds a patient by medical record number, falling back to an exact name match.
pub fn find_patient(conn: &Connection, keyword: &str) -> ClinicResult<Option<Patient>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {PATIENT_COLUMNS} FROM patient
                 WHERE medical_record_no = ?1 OR name = ?1
                 ORDER BY medical_record_no = ?1 DESC, patient_id
                 LIMIT 1"
            ),
            params![keyword.trim()],
            patient_from_row,
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_support::TestStore;
    use clinic_types::Money;

    #[test]
    fn test_add_patient_generates_medical_record_numbers() {
        let store = TestStore::new();
        let mut conn = store.connect();
        let tx = crate::db::begin_write(&mut conn).expect("begin should succeed");

        let first = add_patient(&tx, &store.clock, &NewPatient {
            name: "Wang Fang".into(),
            ..NewPatient::default()
        })
        .expect("add_patient should succeed");
        let second = add_patient(&tx, &store.clock, &NewPatient {
            name: "Li Lei".into(),
            ..NewPatient::default()
        })
        .expect("add_patient should succeed");

        assert_eq!(first.medical_record_no, "MR202503030001");
        assert_eq!(second.medical_record_no, "MR202503030002");
    }

    #[test]
    fn test_add_patient_rejects_blank_name() {
        let store = TestStore::new();
        let mut conn = store.connect();
        let tx = crate::db::begin_write(&mut conn).expect("begin should succeed");

        let err = add_patient(&tx, &store.clock, &NewPatient::default())
            .expect_err("blank name should be rejected");
        assert!(matches!(err, ClinicError::Text(_)));
    }

    #[test]
    fn test_add_doctor_requires_department() {
        let store = TestStore::new();
        let mut conn = store.connect();
        let tx = crate::db::begin_write(&mut conn).expect("begin should succeed");

        let err = add_doctor(&tx, &NewDoctor {
            name: NonEmptyText::new("Dr Nobody").unwrap(),
            title: None,
            dept_id: DeptId(99),
            reg_fee: Money::ZERO,
        })
        .expect_err("unknown department should be rejected");
        assert!(matches!(err, ClinicError::DepartmentNotFound(DeptId(99))));
    }

    #[test]
    fn test_find_patient_by_record_number_or_name() {
        let store = TestStore::new();
        let fixture = store.seed();
        let conn = store.connect();

        let by_mrn = find_patient(&conn, &fixture.patient.medical_record_no)
            .expect("lookup should succeed")
            .expect("patient should be found by MRN");
        assert_eq!(by_mrn.patient_id, fixture.patient.patient_id);

        let by_name = find_patient(&conn, "  Zhang San ")
            .expect("lookup should succeed")
            .expect("patient should be found by name");
        assert_eq!(by_name.patient_id, fixture.patient.patient_id);

        assert!(find_patient(&conn, "nobody").expect("lookup should succeed").is_none());
    }

    #[test]
    fn test_inactive_doctors_are_not_listed() {
        let store = TestStore::new();
        let fixture = store.seed();
        let mut conn = store.connect();
        {
            let tx = crate::db::begin_write(&mut conn).expect("begin should succeed");
            set_doctor_active(&tx, fixture.doctor.doctor_id, false)
                .expect("set_doctor_active should succeed");
            tx.commit().expect("commit should succeed");
        }

        let doctors = list_active_doctors(&conn).expect("list should succeed");
        assert!(doctors.iter().all(|d| d.doctor_id != fixture.doctor.doctor_id));
    }
}
