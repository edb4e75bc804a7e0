//! Consultation steps of the visit lifecycle.

use crate::clock::Clock;
use crate::error::ClinicResult;
use crate::models::{ConsultationSubmission, Prescription};
use crate::repositories::{registration, stock};
use crate::types::{RegId, VisitStatus, VisitTransition};
use rusqlite::{params, Transaction};

/// Calls the patient in. Re-entering a consultation already in progress is allowed.
///
/// # Errors
///
/// * `ClinicError::RegistrationNotFound` - unknown id.
/// * `ClinicError::InvalidTransition` - the visit is cancelled or already seen.
pub fn start(tx: &Transaction<'_>, reg_id: RegId) -> ClinicResult<VisitStatus> {
    let status = registration::advance(tx, reg_id, VisitTransition::StartConsultation)?;
    tracing::info!("consultation started for registration {}", reg_id);
    Ok(status)
}

/// Records the diagnosis and prescriptions and marks the visit seen.
///
/// Every prescription line is checked against stock before any is written. Any failure leaves
/// the caller's transaction to roll back the status change, the medical record and all lines.
///
/// # Errors
///
/// * `ClinicError::InvalidTransition` - the consultation was not started.
/// * `ClinicError::MedicineNotFound` / `ClinicError::InsufficientStock` /
///   `ClinicError::InvalidQuantity` - from the stock check.
pub fn submit(
    tx: &Transaction<'_>,
    clock: &dyn Clock,
    reg_id: RegId,
    submission: &ConsultationSubmission,
) -> ClinicResult<Vec<Prescription>> {
    let visit = registration::load(tx, reg_id)?;
    registration::advance(tx, reg_id, VisitTransition::SubmitConsultation)?;

    let main_complaint = submission
        .main_complaint
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    tx.execute(
        "INSERT INTO medical_record (reg_id, doctor_id, main_complaint, diagnosis, create_time)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            reg_id,
            visit.doctor_id,
            main_complaint,
            submission.diagnosis.as_str(),
            clock.now()
        ],
    )?;

    let prescriptions = stock::check_and_create_prescriptions(tx, reg_id, &submission.lines)?;

    tracing::info!(
        "consultation for registration {} submitted with {} prescription line(s)",
        reg_id,
        prescriptions.len()
    );
    Ok(prescriptions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClinicError;
    use crate::models::{PrescriptionLine, RegistrationRequest};
    use crate::repositories::test_support::{slot, visit_date, Fixture, TestStore};
    use crate::types::MedId;
    use clinic_types::NonEmptyText;

    fn booked(store: &TestStore) -> (Fixture, RegId) {
        let fixture = store.seed();
        let reg = store
            .write(|tx| {
                registration::create(tx, &store.clock, &RegistrationRequest {
                    patient_id: fixture.patient.patient_id,
                    doctor_id: fixture.doctor.doctor_id,
                    dept_id: None,
                    visit_date: visit_date(),
                    time_slot: slot("15:00-16:00"),
                    shift: None,
                })
            })
            .expect("create should succeed");
        (fixture, reg.reg_id)
    }

    fn submission(lines: Vec<PrescriptionLine>) -> ConsultationSubmission {
        ConsultationSubmission {
            main_complaint: Some("sore throat".into()),
            diagnosis: NonEmptyText::new("pharyngitis").unwrap(),
            lines,
        }
    }

    fn visit_status(store: &TestStore, reg_id: RegId) -> VisitStatus {
        registration::load(&store.connect(), reg_id)
            .expect("load should succeed")
            .visit_status
    }

    #[test]
    fn test_submit_requires_started_consultation() {
        let store = TestStore::new();
        let (_, reg_id) = booked(&store);

        let err = store
            .write(|tx| submit(tx, &store.clock, reg_id, &submission(vec![])))
            .expect_err("submitting before start should fail");
        assert!(matches!(
            err,
            ClinicError::InvalidTransition {
                from: VisitStatus::Unseen,
                ..
            }
        ));
    }

    #[test]
    fn test_submit_records_diagnosis_and_prescriptions() {
        let store = TestStore::new();
        let (fixture, reg_id) = booked(&store);
        store.write(|tx| start(tx, reg_id)).expect("start should succeed");

        let created = store
            .write(|tx| {
                submit(tx, &store.clock, reg_id, &submission(vec![PrescriptionLine::new(
                    fixture.medicine.med_id,
                    2,
                )]))
            })
            .expect("submit should succeed");

        assert_eq!(created.len(), 1);
        assert_eq!(visit_status(&store, reg_id), VisitStatus::Seen);
        let diagnosis: String = store
            .connect()
            .query_row(
                "SELECT diagnosis FROM medical_record WHERE reg_id = ?1",
                params![reg_id],
                |row| row.get(0),
            )
            .expect("medical record should exist");
        assert_eq!(diagnosis, "pharyngitis");
    }

    #[test]
    fn test_rejected_submission_leaves_no_trace() {
        let store = TestStore::new();
        let (fixture, reg_id) = booked(&store);
        store.write(|tx| start(tx, reg_id)).expect("start should succeed");

        let err = store
            .write(|tx| {
                submit(tx, &store.clock, reg_id, &submission(vec![
                    PrescriptionLine::new(fixture.medicine.med_id, 1),
                    PrescriptionLine::new(MedId(404), 1),
                ]))
            })
            .expect_err("unknown medicine should reject the submission");
        assert!(matches!(err, ClinicError::MedicineNotFound(MedId(404))));

        assert_eq!(visit_status(&store, reg_id), VisitStatus::InProgress);
        let conn = store.connect();
        let records: i64 = conn
            .query_row("SELECT COUNT(*) FROM medical_record", [], |row| row.get(0))
            .expect("count should succeed");
        assert_eq!(records, 0);
        assert!(stock::prescriptions_for(&conn, reg_id)
            .expect("list should succeed")
            .is_empty());
    }
}
