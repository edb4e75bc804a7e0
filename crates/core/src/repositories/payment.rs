//! Cashier operations.

use crate::clock::Clock;
use crate::db::{money_column, time_slot_column};
use crate::error::{ClinicError, ClinicResult};
use crate::models::{Bill, DaySheet, DaySheetRow, PaymentOutcome};
use crate::repositories::registration;
use crate::types::{FeeFilter, FeeStatus, RegId, VisitStatus};
use chrono::NaiveDate;
use clinic_types::Money;
use rusqlite::{params, Connection, Transaction};

/// Marks a registration paid and stamps `paid_time`.
///
/// Paying an already paid registration returns [`PaymentOutcome::AlreadyPaid`] and keeps the
/// original `paid_time`, so a retried request is harmless. A refunded registration may be paid
/// again once it has been restored.
///
/// # Errors
///
/// * `ClinicError::RegistrationNotFound` - unknown id.
/// * `ClinicError::RegistrationCancelled` - the registration is cancelled.
pub fn pay(tx: &Transaction<'_>, clock: &dyn Clock, reg_id: RegId) -> ClinicResult<PaymentOutcome> {
    let current = registration::load(tx, reg_id)?;
    if current.fee_status == FeeStatus::Paid {
        tracing::info!("registration {} is already paid", reg_id);
        return Ok(PaymentOutcome::AlreadyPaid);
    }
    if current.visit_status == VisitStatus::Cancelled {
        return Err(ClinicError::RegistrationCancelled(reg_id));
    }

    let paid_time = clock.now();
    tx.execute(
        "UPDATE registration SET fee_status = ?1, paid_time = ?2 WHERE reg_id = ?3",
        params![FeeStatus::Paid, paid_time, reg_id],
    )?;
    tracing::info!("registration {} paid", reg_id);

    Ok(PaymentOutcome::Paid { paid_time })
}

/// What a registration owes: registration and check fees plus all prescription amounts.
///
/// # Errors
///
/// Returns `ClinicError::RegistrationNotFound` if the registration does not exist.
pub fn bill(conn: &Connection, reg_id: RegId) -> ClinicResult<Bill> {
    let current = registration::load(conn, reg_id)?;
    let med_cents: i64 = conn.query_row(
        "SELECT COALESCE(SUM(total_amount), 0) FROM prescription WHERE reg_id = ?1",
        params![reg_id],
        |row| row.get(0),
    )?;
    let med_fee = Money::from_cents(med_cents);

    Ok(Bill {
        reg_id,
        fee_status: current.fee_status,
        reg_fee: current.reg_fee,
        check_fee: current.check_fee,
        med_fee,
        total: current
            .reg_fee
            .saturating_add(current.check_fee)
            .saturating_add(med_fee),
    })
}

/// Lists every registration for `date`, cancelled ones included, with its fees and
/// prescription amount. Rows come in time slot and queue order.
///
/// `FeeFilter::Paid` and `FeeFilter::Unpaid` keep rows with that fee status; refunded rows only
/// appear under `FeeFilter::All`.
///
/// # Errors
///
/// Returns `ClinicError::Database` if the query fails.
pub fn day_sheet(conn: &Connection, date: NaiveDate, filter: FeeFilter) -> ClinicResult<DaySheet> {
    let mut stmt = conn.prepare(
        "SELECT r.reg_id, r.queue_num, pa.name, pa.medical_record_no, d.name, r.shift,
                r.time_slot, r.visit_status, r.fee_status, r.reg_fee, r.check_fee,
                (SELECT COALESCE(SUM(p.total_amount), 0) FROM prescription p
                 WHERE p.reg_id = r.reg_id),
                r.paid_time
         FROM registration r
         JOIN patient pa ON r.patient_id = pa.patient_id
         JOIN doctor d ON r.doctor_id = d.doctor_id
         WHERE r.visit_date = ?1
           AND (?2 = 'ALL' OR r.fee_status = ?2)
         ORDER BY r.time_slot, r.queue_num, r.reg_id",
    )?;
    let rows = stmt
        .query_map(params![date, filter], |row| {
            let reg_fee = money_column(row, 9)?;
            let check_fee = money_column(row, 10)?;
            let med_fee = money_column(row, 11)?;
            Ok(DaySheetRow {
                reg_id: row.get(0)?,
                queue_num: row.get(1)?,
                patient_name: row.get(2)?,
                medical_record_no: row.get(3)?,
                doctor_name: row.get(4)?,
                shift: row.get(5)?,
                time_slot: time_slot_column(row, 6)?,
                visit_status: row.get(7)?,
                fee_status: row.get(8)?,
                reg_fee,
                check_fee,
                med_fee,
                total: reg_fee.saturating_add(check_fee).saturating_add(med_fee),
                paid_time: row.get(12)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let amount = rows
        .iter()
        .filter(|r| r.visit_status != VisitStatus::Cancelled)
        .fold(Money::default(), |sum, r| sum.saturating_add(r.total));
    tracing::debug!("day sheet for {} ({}): {} rows", date, filter, rows.len());

    Ok(DaySheet {
        date,
        filter,
        count: rows.len(),
        rows,
        amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{Operator, PrescriptionLine, RegistrationRequest};
    use crate::repositories::test_support::{slot, visit_date, TestStore};
    use crate::types::MedId;
    use crate::repositories::stock;
    use chrono::Duration;

    fn booked(store: &TestStore) -> RegId {
        let fixture = store.seed();
        store
            .write(|tx| {
                registration::create(tx, &store.clock, &RegistrationRequest {
                    patient_id: fixture.patient.patient_id,
                    doctor_id: fixture.doctor.doctor_id,
                    dept_id: None,
                    visit_date: visit_date(),
                    time_slot: slot("09:00-10:00"),
                    shift: None,
                })
            })
            .expect("create should succeed")
            .reg_id
    }

    #[test]
    fn test_repeat_payment_keeps_paid_time() {
        let store = TestStore::new();
        let reg_id = booked(&store);

        let first = store
            .write(|tx| pay(tx, &store.clock, reg_id))
            .expect("pay should succeed");
        assert_eq!(first, PaymentOutcome::Paid { paid_time: store.clock.0 });

        let later = FixedClock(store.clock.0 + Duration::minutes(10));
        let second = store
            .write(|tx| pay(tx, &later, reg_id))
            .expect("repeat pay should succeed");
        assert_eq!(second, PaymentOutcome::AlreadyPaid);

        let stored = registration::load(&store.connect(), reg_id).expect("load should succeed");
        assert_eq!(stored.fee_status, FeeStatus::Paid);
        assert_eq!(stored.paid_time, Some(store.clock.0));
    }

    #[test]
    fn test_cancelled_registration_cannot_be_paid() {
        let store = TestStore::new();
        let reg_id = booked(&store);
        store
            .write(|tx| {
                registration::cancel(tx, &store.clock, reg_id, &Operator::new(None, "desk", "ADMIN"))
            })
            .expect("cancel should succeed");

        let err = store
            .write(|tx| pay(tx, &store.clock, reg_id))
            .expect_err("paying a cancelled registration should fail");
        assert!(matches!(err, ClinicError::RegistrationCancelled(id) if id == reg_id));
    }

    #[test]
    fn test_bill_adds_prescriptions_to_fees() {
        let store = TestStore::new();
        let reg_id = booked(&store);
        store
            .write(|tx| {
                stock::check_and_create_prescriptions(tx, reg_id, &[PrescriptionLine::new(
                    crate::types::MedId(1),
                    2,
                )])
            })
            .expect("prescribing should succeed");

        let owed = bill(&store.connect(), reg_id).expect("bill should succeed");
        assert_eq!(owed.reg_fee, Money::from_cents(1_500));
        assert_eq!(owed.med_fee, Money::from_cents(2_500));
        assert_eq!(owed.total, Money::from_cents(4_000));
        assert_eq!(owed.fee_status, FeeStatus::Unpaid);
    }

    #[test]
    fn test_day_sheet_filters_by_fee_status_and_totals_live_rows() {
        let store = TestStore::new();
        let first = booked(&store);
        store
            .write(|tx| {
                stock::check_and_create_prescriptions(tx, first, &[PrescriptionLine::new(MedId(1), 2)])
            })
            .expect("prescribing should succeed");
        store
            .write(|tx| pay(tx, &store.clock, first))
            .expect("pay should succeed");

        let doctor_id = registration::load(&store.connect(), first)
            .expect("load should succeed")
            .doctor_id;
        let book = |name: &str, time_slot: &str| {
            let patient = store.add_patient(name);
            store
                .write(|tx| {
                    registration::create(tx, &store.clock, &RegistrationRequest {
                        patient_id: patient.patient_id,
                        doctor_id,
                        dept_id: None,
                        visit_date: visit_date(),
                        time_slot: slot(time_slot),
                        shift: None,
                    })
                })
                .expect("create should succeed")
                .reg_id
        };
        let second = book("Li Si", "10:00-11:00");
        let cancelled = book("Wang Wu", "08:00-09:00");
        store
            .write(|tx| {
                registration::cancel(tx, &store.clock, cancelled, &Operator::new(None, "desk", "ADMIN"))
            })
            .expect("cancel should succeed");

        let conn = store.connect();
        let all = day_sheet(&conn, visit_date(), FeeFilter::All).expect("day sheet should succeed");
        let ids: Vec<RegId> = all.rows.iter().map(|r| r.reg_id).collect();
        assert_eq!(ids, vec![cancelled, first, second]);
        assert_eq!(all.count, 3);
        assert_eq!(all.rows[0].visit_status, VisitStatus::Cancelled);
        assert_eq!(all.rows[1].med_fee, Money::from_cents(2_500));
        assert_eq!(all.rows[1].total, Money::from_cents(4_000));
        assert_eq!(all.rows[1].paid_time, Some(store.clock.0));
        // 40.00 for the paid visit plus 15.00 for the open one; the cancelled row is excluded.
        assert_eq!(all.amount, Money::from_cents(5_500));

        let paid = day_sheet(&conn, visit_date(), FeeFilter::Paid).expect("day sheet should succeed");
        assert_eq!(paid.rows.len(), 1);
        assert_eq!(paid.rows[0].reg_id, first);
        assert_eq!(paid.amount, Money::from_cents(4_000));

        let unpaid =
            day_sheet(&conn, visit_date(), FeeFilter::Unpaid).expect("day sheet should succeed");
        let ids: Vec<RegId> = unpaid.rows.iter().map(|r| r.reg_id).collect();
        assert_eq!(ids, vec![cancelled, second]);
        assert_eq!(unpaid.amount, Money::from_cents(1_500));
    }

    #[test]
    fn test_day_sheet_for_quiet_date_is_empty() {
        let store = TestStore::new();
        booked(&store);

        let other_day = visit_date().succ_opt().expect("next day should exist");
        let sheet =
            day_sheet(&store.connect(), other_day, FeeFilter::All).expect("day sheet should succeed");
        assert!(sheet.rows.is_empty());
        assert_eq!(sheet.count, 0);
        assert_eq!(sheet.amount, Money::from_cents(0));
    }
}
