//! Registration state machine.
//!
//! Booking, cancelling and restoring a registration each change the registration row and the
//! slot ledger together. Visit status changes go through [`VisitStatus::apply`], so the
//! lifecycle rules live in one place.

use crate::clock::Clock;
use crate::db::{money_column, time_slot_column};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{CancelOutcome, Operator, Registration, RegistrationRequest, Reservation};
use crate::repositories::audit::{self, AuditAction};
use crate::repositories::{directory, schedule};
use crate::types::{DoctorId, FeeStatus, RegId, ScheduleId, Shift, VisitStatus, VisitTransition};
use chrono::NaiveDate;
use clinic_types::{Money, TimeSlot};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

const REGISTRATION_COLUMNS: &str = "reg_id, patient_id, doctor_id, dept_id, visit_date, shift, \
     time_slot, queue_num, visit_status, fee_status, schedule_id, reg_fee, check_fee, reg_time, \
     paid_time";

fn registration_from_row(row: &Row<'_>) -> rusqlite::Result<Registration> {
    let schedule_id: Option<ScheduleId> = row.get(10)?;
    Ok(Registration {
        reg_id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        dept_id: row.get(3)?,
        visit_date: row.get(4)?,
        shift: row.get(5)?,
        time_slot: time_slot_column(row, 6)?,
        queue_num: row.get(7)?,
        visit_status: row.get(8)?,
        fee_status: row.get(9)?,
        reservation: Reservation::from(schedule_id),
        reg_fee: money_column(row, 11)?,
        check_fee: money_column(row, 12)?,
        reg_time: row.get(13)?,
        paid_time: row.get(14)?,
    })
}

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Books a visit: reserves slot capacity, assigns a queue number and inserts the registration.
///
/// The shift defaults to the one implied by the time slot, and the department to the doctor's.
/// The registration fee is the doctor's current fee.
///
/// # Errors
///
/// * `ClinicError::DoctorNotFound` / `ClinicError::PatientNotFound` - unknown ids.
/// * `ClinicError::DoctorInactive` - the doctor no longer takes bookings.
/// * `ClinicError::DepartmentMismatch` - `dept_id` is not the doctor's department.
/// * `ClinicError::SlotSuspended` / `ClinicError::SlotFull` - from the slot ledger.
pub fn create(
    tx: &Transaction<'_>,
    clock: &dyn Clock,
    request: &RegistrationRequest,
) -> ClinicResult<Registration> {
    let doctor = directory::doctor(tx, request.doctor_id)?
        .ok_or(ClinicError::DoctorNotFound(request.doctor_id))?;
    if !doctor.active {
        return Err(ClinicError::DoctorInactive(doctor.doctor_id));
    }
    let dept_id = match request.dept_id {
        Some(dept_id) if dept_id != doctor.dept_id => {
            return Err(ClinicError::DepartmentMismatch {
                doctor_id: doctor.doctor_id,
                dept_id,
            });
        }
        _ => doctor.dept_id,
    };
    if directory::patient(tx, request.patient_id)?.is_none() {
        return Err(ClinicError::PatientNotFound(request.patient_id));
    }

    let shift = request
        .shift
        .unwrap_or_else(|| Shift::from_time_slot(&request.time_slot));
    let reservation = schedule::reserve(
        tx,
        doctor.doctor_id,
        request.visit_date,
        &request.time_slot,
        shift,
    )?;
    let queue_num = next_queue_num(
        tx,
        doctor.doctor_id,
        request.visit_date,
        shift,
        &request.time_slot,
    )?;
    let reg_time = clock.now();

    tx.execute(
        "INSERT INTO registration
             (patient_id, doctor_id, dept_id, visit_date, shift, time_slot, queue_num,
              visit_status, fee_status, schedule_id, reg_fee, check_fee, reg_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            request.patient_id,
            doctor.doctor_id,
            dept_id,
            request.visit_date,
            shift,
            request.time_slot.as_str(),
            queue_num,
            VisitStatus::Unseen,
            FeeStatus::Unpaid,
            reservation.schedule_id(),
            doctor.reg_fee.cents(),
            Money::ZERO.cents(),
            reg_time
        ],
    )?;
    let reg_id = RegId(tx.last_insert_rowid());

    tracing::info!(
        "registration {} booked with doctor {} on {} {} as number {}",
        reg_id,
        doctor.doctor_id,
        request.visit_date,
        request.time_slot,
        queue_num
    );

    Ok(Registration {
        reg_id,
        patient_id: request.patient_id,
        doctor_id: doctor.doctor_id,
        dept_id,
        visit_date: request.visit_date,
        shift,
        time_slot: request.time_slot.clone(),
        queue_num,
        visit_status: VisitStatus::Unseen,
        fee_status: FeeStatus::Unpaid,
        reservation,
        reg_fee: doctor.reg_fee,
        check_fee: Money::ZERO,
        reg_time,
        paid_time: None,
    })
}

/// Next queue position for a doctor's slot-day.
///
/// Cancelled registrations keep their numbers, so taking the maximum rather than counting live
/// rows guarantees a number is never handed out twice.
fn next_queue_num(
    tx: &Transaction<'_>,
    doctor_id: DoctorId,
    date: NaiveDate,
    shift: Shift,
    time_slot: &TimeSlot,
) -> ClinicResult<i64> {
    Ok(tx.query_row(
        "SELECT COALESCE(MAX(queue_num), 0) + 1
         FROM registration
         WHERE doctor_id = ?1 AND visit_date = ?2 AND shift = ?3 AND time_slot = ?4",
        params![doctor_id, date, shift, time_slot.as_str()],
        |row| row.get(0),
    )?)
}

/// Cancels an unseen registration and gives its slot back.
///
/// A paid fee is relabelled `REFUNDED`. Cancelling an already cancelled registration is reported
/// as [`CancelOutcome::AlreadyCancelled`] and changes nothing.
///
/// # Errors
///
/// * `ClinicError::RegistrationNotFound` - unknown id.
/// * `ClinicError::InvalidTransition` - the visit has started or finished.
/// * `ClinicError::HasPrescriptions` - prescriptions reference the registration.
pub fn cancel(
    tx: &Transaction<'_>,
    clock: &dyn Clock,
    reg_id: RegId,
    operator: &Operator,
) -> ClinicResult<CancelOutcome> {
    let registration = load(tx, reg_id)?;
    if registration.visit_status == VisitStatus::Cancelled {
        tracing::info!("registration {} is already cancelled", reg_id);
        return Ok(CancelOutcome::AlreadyCancelled);
    }
    let next = transition(&registration, VisitTransition::Cancel)?;

    let prescriptions: i64 = tx.query_row(
        "SELECT COUNT(*) FROM prescription WHERE reg_id = ?1",
        params![reg_id],
        |row| row.get(0),
    )?;
    if prescriptions > 0 {
        return Err(ClinicError::HasPrescriptions(reg_id));
    }

    let refunded = registration.fee_status == FeeStatus::Paid;
    let fee_status = if refunded {
        FeeStatus::Refunded
    } else {
        registration.fee_status
    };
    tx.execute(
        "UPDATE registration SET visit_status = ?1, fee_status = ?2 WHERE reg_id = ?3",
        params![next, fee_status, reg_id],
    )?;

    let booked_slots = match registration.reservation {
        Reservation::Reserved(schedule_id) => Some(schedule::release(tx, schedule_id, -1)?),
        Reservation::Unconstrained => None,
    };

    audit::record(
        tx,
        clock,
        operator,
        AuditAction::CancelRegistration,
        reg_id.0,
        &format!(
            "cancelled registration {} (fee {} -> {})",
            reg_id, registration.fee_status, fee_status
        ),
    );
    tracing::info!("registration {} cancelled (refunded: {})", reg_id, refunded);

    Ok(CancelOutcome::Cancelled {
        refunded,
        booked_slots,
    })
}

/// Returns a cancelled registration to `UNSEEN` and takes its slot again.
///
/// The fee status is left as it is. Returns the slot occupancy after the restore when the
/// registration holds a reservation.
///
/// A restore is never refused for capacity. If the slot was refilled while the registration
/// was cancelled, `booked_slots` stays clamped at `max_slots` and the slot now holds one more
/// live registration than it counts. The audit entry records the occupancy and marks that case
/// as over capacity so the desk can move someone.
///
/// # Errors
///
/// * `ClinicError::RegistrationNotFound` - unknown id.
/// * `ClinicError::InvalidTransition` - the registration is not cancelled.
pub fn restore(
    tx: &Transaction<'_>,
    clock: &dyn Clock,
    reg_id: RegId,
    operator: &Operator,
) -> ClinicResult<Option<i64>> {
    let registration = load(tx, reg_id)?;
    let next = transition(&registration, VisitTransition::Restore)?;

    tx.execute(
        "UPDATE registration SET visit_status = ?1 WHERE reg_id = ?2",
        params![next, reg_id],
    )?;

    let mut detail = format!("restored registration {}", reg_id);
    let booked_slots = match registration.reservation {
        Reservation::Reserved(schedule_id) => {
            let slot = schedule::get(tx, schedule_id)?
                .ok_or(ClinicError::ScheduleNotFound(schedule_id))?;
            let over_capacity = slot.booked_slots >= slot.max_slots;
            let booked = schedule::release(tx, schedule_id, 1)?;
            detail.push_str(&format!(
                "; slot {} at {}/{}",
                schedule_id, booked, slot.max_slots
            ));
            if over_capacity {
                detail.push_str(", over capacity");
                tracing::warn!(
                    "registration {} restored into full slot {} ({}/{})",
                    reg_id,
                    schedule_id,
                    booked,
                    slot.max_slots
                );
            }
            Some(booked)
        }
        Reservation::Unconstrained => None,
    };

    audit::record(
        tx,
        clock,
        operator,
        AuditAction::RestoreRegistration,
        reg_id.0,
        &detail,
    );
    tracing::info!("registration {} restored", reg_id);

    Ok(booked_slots)
}

/// Applies a visit transition to the stored row and returns the new status.
///
/// # Errors
///
/// Returns `ClinicError::InvalidTransition` if the lifecycle forbids `action` from the current
/// status.
pub(crate) fn advance(
    tx: &Transaction<'_>,
    reg_id: RegId,
    action: VisitTransition,
) -> ClinicResult<VisitStatus> {
    let registration = load(tx, reg_id)?;
    let next = transition(&registration, action)?;
    tx.execute(
        "UPDATE registration SET visit_status = ?1 WHERE reg_id = ?2",
        params![next, reg_id],
    )?;
    Ok(next)
}

fn transition(registration: &Registration, action: VisitTransition) -> ClinicResult<VisitStatus> {
    registration
        .visit_status
        .apply(action)
        .ok_or(ClinicError::InvalidTransition {
            reg_id: registration.reg_id,
            from: registration.visit_status,
            action,
        })
}

// ============================================================================
// READS
// ============================================================================

pub fn get(conn: &Connection, reg_id: RegId) -> ClinicResult<Option<Registration>> {
    Ok(conn
        .query_row(
            &format!("SELECT {REGISTRATION_COLUMNS} FROM registration WHERE reg_id = ?1"),
            params![reg_id],
            registration_from_row,
        )
        .optional()?)
}

/// Like [`get`], but a missing row is an error.
pub(crate) fn load(conn: &Connection, reg_id: RegId) -> ClinicResult<Registration> {
    get(conn, reg_id)?.ok_or(ClinicError::RegistrationNotFound(reg_id))
}

/// Patients waiting for a doctor on a date: the visit in progress first, then by time slot and
/// queue number.
pub fn doctor_queue(
    conn: &Connection,
    doctor_id: DoctorId,
    date: NaiveDate,
) -> ClinicResult<Vec<Registration>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REGISTRATION_COLUMNS} FROM registration
         WHERE doctor_id = ?1 AND visit_date = ?2 AND visit_status IN ('UNSEEN', 'IN_PROGRESS')
         ORDER BY CASE visit_status WHEN 'IN_PROGRESS' THEN 0 ELSE 1 END, time_slot, queue_num"
    ))?;
    let rows = stmt.query_map(params![doctor_id, date], registration_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
