//! Slot ledger.
//!
//! A `doctor_schedule` row bounds how many registrations one doctor takes for one date and time
//! slot. `booked_slots` only moves through [`reserve`] and [`release`], always inside the
//! caller's write transaction, so `0 <= booked_slots <= max_slots` holds for every committed row.
//! The table also carries a `CHECK` constraint for the same bound.

use crate::db::time_slot_column;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{Reservation, ScheduleRequest, ScheduleSlot};
use crate::repositories::directory;
use crate::types::{DoctorId, ScheduleId, Shift, SlotStatus};
use chrono::NaiveDate;
use clinic_types::TimeSlot;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

const SLOT_COLUMNS: &str =
    "schedule_id, doctor_id, schedule_date, time_slot, shift, max_slots, booked_slots, status";

fn slot_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduleSlot> {
    Ok(ScheduleSlot {
        schedule_id: row.get(0)?,
        doctor_id: row.get(1)?,
        date: row.get(2)?,
        time_slot: time_slot_column(row, 3)?,
        shift: row.get(4)?,
        max_slots: row.get(5)?,
        booked_slots: row.get(6)?,
        status: row.get(7)?,
    })
}

// ============================================================================
// BOOKING
// ============================================================================

/// Takes one unit of capacity from the slot matching a booking.
///
/// The slot row is found by its key (doctor, date, time slot) alone. Only when no such row
/// exists is the booking unconstrained, and then nothing is written. A row whose shift is
/// neither the booking's shift nor `ALL_DAY` rejects the booking instead of being skipped.
///
/// # Errors
///
/// * `ClinicError::InvalidInput` - the row belongs to a different shift.
/// * `ClinicError::SlotSuspended` - the row is suspended.
/// * `ClinicError::SlotFull` - the row has no capacity left.
pub fn reserve(
    tx: &Transaction<'_>,
    doctor_id: DoctorId,
    date: NaiveDate,
    time_slot: &TimeSlot,
    shift: Shift,
) -> ClinicResult<Reservation> {
    let row: Option<(ScheduleId, Shift, i64, i64, SlotStatus)> = tx
        .query_row(
            "SELECT schedule_id, shift, max_slots, booked_slots, status
             FROM doctor_schedule
             WHERE doctor_id = ?1 AND schedule_date = ?2 AND time_slot = ?3",
            params![doctor_id, date, time_slot.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .optional()?;

    let Some((schedule_id, slot_shift, max_slots, booked_slots, status)) = row else {
        tracing::debug!(
            "no schedule for doctor {} on {} {}; booking without capacity limit",
            doctor_id,
            date,
            time_slot
        );
        return Ok(Reservation::Unconstrained);
    };

    if slot_shift != shift && slot_shift != Shift::AllDay {
        return Err(ClinicError::InvalidInput(format!(
            "doctor {doctor_id} sees {time_slot} on {date} in the {slot_shift} shift, not {shift}"
        )));
    }

    if status == SlotStatus::Suspended {
        return Err(ClinicError::SlotSuspended {
            doctor_id,
            date,
            time_slot: time_slot.clone(),
        });
    }

    let full = || ClinicError::SlotFull {
        doctor_id,
        date,
        time_slot: time_slot.clone(),
        max_slots,
    };
    if booked_slots >= max_slots {
        return Err(full());
    }

    let changed = tx.execute(
        "UPDATE doctor_schedule
         SET booked_slots = booked_slots + 1
         WHERE schedule_id = ?1 AND booked_slots < max_slots AND status = 'AVAILABLE'",
        params![schedule_id],
    )?;
    if changed != 1 {
        return Err(full());
    }

    Ok(Reservation::Reserved(schedule_id))
}

/// Moves a slot's occupancy by `delta`, clamped to `[0, max_slots]`, and returns the new value.
///
/// Cancellation passes `-1` and restore passes `+1`. A delta that would leave the range is
/// clamped and logged rather than rejected, so a repeated release cannot corrupt the count.
///
/// # Errors
///
/// Returns `ClinicError::ScheduleNotFound` if the row does not exist.
pub fn release(tx: &Transaction<'_>, schedule_id: ScheduleId, delta: i64) -> ClinicResult<i64> {
    let (max_slots, booked_slots): (i64, i64) = tx
        .query_row(
            "SELECT max_slots, booked_slots FROM doctor_schedule WHERE schedule_id = ?1",
            params![schedule_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or(ClinicError::ScheduleNotFound(schedule_id))?;

    let wanted = booked_slots.saturating_add(delta);
    let target = wanted.clamp(0, max_slots.max(0));
    if target != wanted {
        tracing::warn!(
            "schedule {} occupancy {} + {} clamped to {} (max {})",
            schedule_id,
            booked_slots,
            delta,
            target,
            max_slots
        );
    }

    tx.execute(
        "UPDATE doctor_schedule SET booked_slots = ?1 WHERE schedule_id = ?2",
        params![target, schedule_id],
    )?;

    Ok(target)
}

// ============================================================================
// ADMINISTRATION
// ============================================================================

/// Creates or replaces the capacity definition for a doctor, date and time slot.
///
/// An existing row keeps its `booked_slots`; only shift, `max_slots` and status are overwritten.
///
/// # Errors
///
/// * `ClinicError::InvalidInput` - `max_slots` is negative.
/// * `ClinicError::DoctorNotFound` - the doctor does not exist.
/// * `ClinicError::CapacityBelowBooked` - the new capacity is below the current bookings.
pub fn upsert(tx: &Transaction<'_>, request: &ScheduleRequest) -> ClinicResult<ScheduleSlot> {
    if request.max_slots < 0 {
        return Err(ClinicError::InvalidInput(format!(
            "max_slots must not be negative, got {}",
            request.max_slots
        )));
    }
    if directory::doctor(tx, request.doctor_id)?.is_none() {
        return Err(ClinicError::DoctorNotFound(request.doctor_id));
    }

    let existing = find(tx, request.doctor_id, request.date, &request.time_slot)?;
    if let Some(slot) = &existing {
        if request.max_slots < slot.booked_slots {
            return Err(ClinicError::CapacityBelowBooked {
                schedule_id: slot.schedule_id,
                max_slots: request.max_slots,
                booked_slots: slot.booked_slots,
            });
        }
    }

    tx.execute(
        "INSERT INTO doctor_schedule (doctor_id, schedule_date, time_slot, shift, max_slots, booked_slots, status)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
         ON CONFLICT (doctor_id, schedule_date, time_slot) DO UPDATE SET
             shift = excluded.shift,
             max_slots = excluded.max_slots,
             status = excluded.status",
        params![
            request.doctor_id,
            request.date,
            request.time_slot.as_str(),
            request.shift,
            request.max_slots,
            request.status
        ],
    )?;

    let slot = find(tx, request.doctor_id, request.date, &request.time_slot)?
        .ok_or(ClinicError::Database(rusqlite::Error::QueryReturnedNoRows))?;

    tracing::info!(
        "schedule {} for doctor {} on {} {}: {}/{} {}",
        slot.schedule_id,
        slot.doctor_id,
        slot.date,
        slot.time_slot,
        slot.booked_slots,
        slot.max_slots,
        slot.status
    );

    Ok(slot)
}

/// Opens or suspends a slot without touching its capacity or bookings.
///
/// # Errors
///
/// Returns `ClinicError::ScheduleNotFound` if the row does not exist.
pub fn set_status(
    tx: &Transaction<'_>,
    schedule_id: ScheduleId,
    status: SlotStatus,
) -> ClinicResult<ScheduleSlot> {
    let changed = tx.execute(
        "UPDATE doctor_schedule SET status = ?1 WHERE schedule_id = ?2",
        params![status, schedule_id],
    )?;
    if changed == 0 {
        return Err(ClinicError::ScheduleNotFound(schedule_id));
    }
    tracing::info!("schedule {} is now {}", schedule_id, status);

    get(tx, schedule_id)?.ok_or(ClinicError::ScheduleNotFound(schedule_id))
}

// ============================================================================
// READS
// ============================================================================

pub fn get(conn: &Connection, schedule_id: ScheduleId) -> ClinicResult<Option<ScheduleSlot>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SLOT_COLUMNS} FROM doctor_schedule WHERE schedule_id = ?1"),
            params![schedule_id],
            slot_from_row,
        )
        .optional()?)
}

fn find(
    conn: &Connection,
    doctor_id: DoctorId,
    date: NaiveDate,
    time_slot: &TimeSlot,
) -> ClinicResult<Option<ScheduleSlot>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {SLOT_COLUMNS} FROM doctor_schedule
                 WHERE doctor_id = ?1 AND schedule_date = ?2 AND time_slot = ?3"
            ),
            params![doctor_id, date, time_slot.as_str()],
            slot_from_row,
        )
        .optional()?)
}

/// All slots defined for `date`, ordered by doctor then time slot.
pub fn list_for_date(conn: &Connection, date: NaiveDate) -> ClinicResult<Vec<ScheduleSlot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLOT_COLUMNS} FROM doctor_schedule
         WHERE schedule_date = ?1
         ORDER BY doctor_id, time_slot"
    ))?;
    let rows = stmt.query_map(params![date], slot_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::test_support::{slot, visit_date, TestStore};

    fn request(doctor_id: DoctorId, max_slots: i64) -> ScheduleRequest {
        ScheduleRequest {
            doctor_id,
            date: visit_date(),
            time_slot: slot("09:00-10:00"),
            shift: Shift::Morning,
            max_slots,
            status: SlotStatus::Available,
        }
    }

    #[test]
    fn test_reserve_without_schedule_is_unconstrained() {
        let store = TestStore::new();
        let fixture = store.seed();

        let reservation = store
            .write(|tx| {
                reserve(
                    tx,
                    fixture.doctor.doctor_id,
                    visit_date(),
                    &slot("09:00-10:00"),
                    Shift::Morning,
                )
            })
            .expect("reserve should succeed");

        assert_eq!(reservation, Reservation::Unconstrained);
    }

    #[test]
    fn test_reserve_until_full() {
        let store = TestStore::new();
        let fixture = store.seed();
        let doctor_id = fixture.doctor.doctor_id;
        let created = store
            .write(|tx| upsert(tx, &request(doctor_id, 2)))
            .expect("upsert should succeed");

        for _ in 0..2 {
            let reservation = store
                .write(|tx| {
                    reserve(tx, doctor_id, visit_date(), &slot("09:00-10:00"), Shift::Morning)
                })
                .expect("reserve should succeed");
            assert_eq!(reservation, Reservation::Reserved(created.schedule_id));
        }

        let err = store
            .write(|tx| reserve(tx, doctor_id, visit_date(), &slot("09:00-10:00"), Shift::Morning))
            .expect_err("third reservation should fail");
        assert!(matches!(err, ClinicError::SlotFull { max_slots: 2, .. }));

        let conn = store.connect();
        let slot_row = get(&conn, created.schedule_id)
            .expect("get should succeed")
            .expect("slot should exist");
        assert_eq!(slot_row.booked_slots, 2);
        assert_eq!(slot_row.remaining(), 0);
    }

    #[test]
    fn test_reserve_matches_all_day_rows() {
        let store = TestStore::new();
        let fixture = store.seed();
        let doctor_id = fixture.doctor.doctor_id;
        let created = store
            .write(|tx| {
                upsert(tx, &ScheduleRequest {
                    shift: Shift::AllDay,
                    ..request(doctor_id, 3)
                })
            })
            .expect("upsert should succeed");

        let reservation = store
            .write(|tx| reserve(tx, doctor_id, visit_date(), &slot("09:00-10:00"), Shift::Morning))
            .expect("reserve should succeed");
        assert_eq!(reservation, Reservation::Reserved(created.schedule_id));
    }

    #[test]
    fn test_reserve_rejects_suspended_slot() {
        let store = TestStore::new();
        let fixture = store.seed();
        let doctor_id = fixture.doctor.doctor_id;
        let created = store
            .write(|tx| upsert(tx, &request(doctor_id, 5)))
            .expect("upsert should succeed");
        store
            .write(|tx| set_status(tx, created.schedule_id, SlotStatus::Suspended))
            .expect("set_status should succeed");

        let err = store
            .write(|tx| reserve(tx, doctor_id, visit_date(), &slot("09:00-10:00"), Shift::Morning))
            .expect_err("suspended slot should reject bookings");
        assert!(matches!(err, ClinicError::SlotSuspended { .. }));
    }

    #[test]
    fn test_reserve_rejects_other_shift_on_defined_slot() {
        let store = TestStore::new();
        let fixture = store.seed();
        let doctor_id = fixture.doctor.doctor_id;
        let created = store
            .write(|tx| upsert(tx, &request(doctor_id, 1)))
            .expect("upsert should succeed");
        store
            .write(|tx| reserve(tx, doctor_id, visit_date(), &slot("09:00-10:00"), Shift::Morning))
            .expect("reserve should succeed");

        for shift in [Shift::Afternoon, Shift::Evening] {
            let err = store
                .write(|tx| reserve(tx, doctor_id, visit_date(), &slot("09:00-10:00"), shift))
                .expect_err("a defined slot should not be bypassed by naming another shift");
            assert!(matches!(err, ClinicError::InvalidInput(_)));
        }

        let slot_row = get(&store.connect(), created.schedule_id)
            .expect("get should succeed")
            .expect("slot should exist");
        assert_eq!(slot_row.booked_slots, 1);
    }

    #[test]
    fn test_release_clamps_to_bounds() {
        let store = TestStore::new();
        let fixture = store.seed();
        let doctor_id = fixture.doctor.doctor_id;
        let created = store
            .write(|tx| upsert(tx, &request(doctor_id, 1)))
            .expect("upsert should succeed");

        assert_eq!(
            store.write(|tx| release(tx, created.schedule_id, -1)).expect("release should succeed"),
            0
        );
        assert_eq!(
            store.write(|tx| release(tx, created.schedule_id, 1)).expect("release should succeed"),
            1
        );
        assert_eq!(
            store.write(|tx| release(tx, created.schedule_id, 1)).expect("release should succeed"),
            1
        );
    }

    #[test]
    fn test_release_unknown_schedule() {
        let store = TestStore::new();
        let err = store
            .write(|tx| release(tx, ScheduleId(404), -1))
            .expect_err("unknown schedule should fail");
        assert!(matches!(err, ClinicError::ScheduleNotFound(ScheduleId(404))));
    }

    #[test]
    fn test_upsert_keeps_bookings_and_rejects_lower_capacity() {
        let store = TestStore::new();
        let fixture = store.seed();
        let doctor_id = fixture.doctor.doctor_id;
        let created = store
            .write(|tx| upsert(tx, &request(doctor_id, 3)))
            .expect("upsert should succeed");
        for _ in 0..2 {
            store
                .write(|tx| reserve(tx, doctor_id, visit_date(), &slot("09:00-10:00"), Shift::Morning))
                .expect("reserve should succeed");
        }

        let updated = store
            .write(|tx| upsert(tx, &request(doctor_id, 5)))
            .expect("raising capacity should succeed");
        assert_eq!(updated.schedule_id, created.schedule_id);
        assert_eq!(updated.booked_slots, 2);
        assert_eq!(updated.max_slots, 5);

        let err = store
            .write(|tx| upsert(tx, &request(doctor_id, 1)))
            .expect_err("capacity below bookings should fail");
        assert!(matches!(
            err,
            ClinicError::CapacityBelowBooked {
                max_slots: 1,
                booked_slots: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_upsert_rejects_unknown_doctor_and_negative_capacity() {
        let store = TestStore::new();
        store.seed();

        let err = store
            .write(|tx| upsert(tx, &request(DoctorId(77), 3)))
            .expect_err("unknown doctor should fail");
        assert!(matches!(err, ClinicError::DoctorNotFound(DoctorId(77))));

        let err = store
            .write(|tx| upsert(tx, &request(DoctorId(1), -1)))
            .expect_err("negative capacity should fail");
        assert!(matches!(err, ClinicError::InvalidInput(_)));
    }

    #[test]
    fn test_list_for_date() {
        let store = TestStore::new();
        let fixture = store.seed();
        let doctor_id = fixture.doctor.doctor_id;
        for label in ["14:00-15:00", "09:00-10:00"] {
            store
                .write(|tx| {
                    upsert(tx, &ScheduleRequest {
                        time_slot: slot(label),
                        ..request(doctor_id, 4)
                    })
                })
                .expect("upsert should succeed");
        }

        let conn = store.connect();
        let slots = list_for_date(&conn, visit_date()).expect("list should succeed");
        let labels: Vec<&str> = slots.iter().map(|s| s.time_slot.as_str()).collect();
        assert_eq!(labels, vec!["09:00-10:00", "14:00-15:00"]);
        assert!(list_for_date(&conn, visit_date().succ_opt().unwrap())
            .expect("list should succeed")
            .is_empty());
    }
}
