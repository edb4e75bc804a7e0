//! Dispense sequencer.
//!
//! Fulfilling a prescription line reads payment, then the prescription, then the medicine, and
//! only then writes. The order is the same for every caller: prescription strictly before
//! medicine. Under the store's write lock no other transaction can interleave, and the final
//! conditional update on the prescription catches a lost race on any store where it could.

use crate::clock::Clock;
use crate::db::money_column;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{DispenseOutcome, PendingDispense};
use crate::repositories::{registration, stock};
use crate::types::{DispenseStatus, FeeStatus, MedId, PrescId, RegId};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

struct LockedLine {
    presc_id: PrescId,
    total_quantity: i64,
    dispense_status: DispenseStatus,
}

fn lock_prescription(tx: &Transaction<'_>, reg_id: RegId, med_id: MedId) -> ClinicResult<LockedLine> {
    tx.query_row(
        "SELECT presc_id, total_quantity, dispense_status
         FROM prescription
         WHERE reg_id = ?1 AND med_id = ?2",
        params![reg_id, med_id],
        |row| {
            Ok(LockedLine {
                presc_id: row.get(0)?,
                total_quantity: row.get(1)?,
                dispense_status: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or(ClinicError::PrescriptionNotFound { reg_id, med_id })
}

/// Hands out one prescription line and takes its quantity from stock.
///
/// A line that is already dispensed returns [`DispenseOutcome::AlreadyDispensed`] without
/// touching stock. Any error leaves the caller's transaction to roll back, so stock and
/// dispense status change together or not at all.
///
/// # Errors
///
/// * `ClinicError::RegistrationNotFound` - unknown registration.
/// * `ClinicError::NotPaid` - the registration is not paid.
/// * `ClinicError::PrescriptionNotFound` - no line for this medicine on the registration.
/// * `ClinicError::InvalidQuantity` - the stored quantity is not positive.
/// * `ClinicError::MedicineNotFound` / `ClinicError::InsufficientStock` - stock check.
/// * `ClinicError::ConcurrentDispenseConflict` - the line was dispensed by another request
///   between the check and the update.
pub fn dispense(
    tx: &Transaction<'_>,
    clock: &dyn Clock,
    reg_id: RegId,
    med_id: MedId,
) -> ClinicResult<DispenseOutcome> {
    let visit = registration::load(tx, reg_id)?;
    if visit.fee_status != FeeStatus::Paid {
        return Err(ClinicError::NotPaid {
            reg_id,
            fee_status: visit.fee_status,
        });
    }

    let line = lock_prescription(tx, reg_id, med_id)?;
    if line.dispense_status == DispenseStatus::Dispensed {
        tracing::info!(
            "medicine {} on registration {} was already dispensed",
            med_id,
            reg_id
        );
        return Ok(DispenseOutcome::AlreadyDispensed);
    }
    if line.total_quantity <= 0 {
        return Err(ClinicError::InvalidQuantity {
            reg_id,
            med_id,
            quantity: line.total_quantity,
        });
    }

    let medicine = stock::lock_medicine(tx, med_id)?;
    let insufficient = |available| ClinicError::InsufficientStock {
        med_id,
        requested: line.total_quantity,
        available,
    };
    if medicine.stock < line.total_quantity {
        return Err(insufficient(medicine.stock));
    }

    let decremented = tx.execute(
        "UPDATE medicine SET stock = stock - ?1 WHERE med_id = ?2 AND stock >= ?1",
        params![line.total_quantity, med_id],
    )?;
    if decremented != 1 {
        return Err(insufficient(medicine.stock));
    }

    let marked = tx.execute(
        "UPDATE prescription
         SET dispense_status = ?1, dispense_time = ?2
         WHERE presc_id = ?3 AND dispense_status != ?1",
        params![DispenseStatus::Dispensed, clock.now(), line.presc_id],
    )?;
    if marked != 1 {
        tracing::warn!(
            "prescription {} changed during dispense; rolling back",
            line.presc_id
        );
        return Err(ClinicError::ConcurrentDispenseConflict { reg_id, med_id });
    }

    let remaining_stock = medicine.stock - line.total_quantity;
    tracing::info!(
        "dispensed {} x medicine {} for registration {} ({} left)",
        line.total_quantity,
        med_id,
        reg_id,
        remaining_stock
    );

    Ok(DispenseOutcome::Dispensed {
        quantity: line.total_quantity,
        remaining_stock,
    })
}

/// Paid prescription lines the pharmacy has not handed out yet, oldest visit first.
pub fn pending(conn: &Connection) -> ClinicResult<Vec<PendingDispense>> {
    let mut stmt = conn.prepare(
        "SELECT r.reg_id, pa.name, pa.medical_record_no, d.name, r.visit_date, r.shift,
                m.med_id, m.med_name, p.total_quantity, p.total_amount
         FROM prescription p
         JOIN registration r ON p.reg_id = r.reg_id
         JOIN patient pa ON r.patient_id = pa.patient_id
         JOIN doctor d ON r.doctor_id = d.doctor_id
         JOIN medicine m ON p.med_id = m.med_id
         WHERE p.dispense_status = 'PENDING'
           AND r.fee_status = 'PAID'
           AND r.visit_status != 'CANCELLED'
         ORDER BY r.visit_date, r.reg_id, m.med_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(PendingDispense {
            reg_id: row.get(0)?,
            patient_name: row.get(1)?,
            medical_record_no: row.get(2)?,
            doctor_name: row.get(3)?,
            visit_date: row.get(4)?,
            shift: row.get(5)?,
            med_id: row.get(6)?,
            med_name: row.get(7)?,
            total_quantity: row.get(8)?,
            total_amount: money_column(row, 9)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
