//! Stock ledger and prescription creation.
//!
//! Prescribing only checks stock; the count is decremented at dispense time, after payment.
//! Outside the dispense path, stock changes are catalogue maintenance done by an administrator.

use crate::constants::DEFAULT_DOSAGE;
use crate::db::money_column;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{Medicine, MedicineUpdate, Prescription, PrescriptionLine};
use crate::types::{DispenseStatus, MedId, PrescId, RegId};
use clinic_types::{Money, NonEmptyText};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::BTreeMap;

fn medicine_from_row(row: &Row<'_>) -> rusqlite::Result<Medicine> {
    Ok(Medicine {
        med_id: row.get(0)?,
        name: row.get(1)?,
        price: money_column(row, 2)?,
        stock: row.get(3)?,
    })
}

fn prescription_from_row(row: &Row<'_>) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        presc_id: row.get(0)?,
        reg_id: row.get(1)?,
        med_id: row.get(2)?,
        dosage: row.get(3)?,
        usage: row.get(4)?,
        total_quantity: row.get(5)?,
        total_amount: money_column(row, 6)?,
        dispense_status: row.get(7)?,
        dispense_time: row.get(8)?,
    })
}

// ============================================================================
// PRESCRIPTIONS
// ============================================================================

/// Validates every line against current stock, then inserts one prescription per medicine.
///
/// Lines naming the same medicine are merged by summing their quantities; the first line's
/// dosage and usage are kept. Nothing is inserted unless every line passes, and the caller's
/// transaction rolls back any partial work on error.
///
/// # Errors
///
/// * `ClinicError::InvalidQuantity` - a merged quantity is not positive.
/// * `ClinicError::MedicineNotFound` - a line names an unknown medicine.
/// * `ClinicError::InsufficientStock` - a merged quantity exceeds the current stock.
pub fn check_and_create_prescriptions(
    tx: &Transaction<'_>,
    reg_id: RegId,
    lines: &[PrescriptionLine],
) -> ClinicResult<Vec<Prescription>> {
    let merged = merge_lines(lines);

    let mut checked = Vec::with_capacity(merged.len());
    for line in merged {
        if line.quantity <= 0 {
            return Err(ClinicError::InvalidQuantity {
                reg_id,
                med_id: line.med_id,
                quantity: line.quantity,
            });
        }
        let medicine = get_medicine(tx, line.med_id)?
            .ok_or(ClinicError::MedicineNotFound(line.med_id))?;
        if medicine.stock < line.quantity {
            return Err(ClinicError::InsufficientStock {
                med_id: line.med_id,
                requested: line.quantity,
                available: medicine.stock,
            });
        }
        checked.push((line, medicine));
    }

    let mut created = Vec::with_capacity(checked.len());
    for (line, medicine) in checked {
        let dosage = line
            .dosage
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DOSAGE)
            .to_owned();
        let total_amount = medicine.price.times(line.quantity);

        tx.execute(
            "INSERT INTO prescription (reg_id, med_id, dosage, med_usage, total_quantity, total_amount, dispense_status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                reg_id,
                line.med_id,
                dosage,
                line.usage,
                line.quantity,
                total_amount.cents(),
                DispenseStatus::Pending
            ],
        )?;

        created.push(Prescription {
            presc_id: PrescId(tx.last_insert_rowid()),
            reg_id,
            med_id: line.med_id,
            dosage,
            usage: line.usage,
            total_quantity: line.quantity,
            total_amount,
            dispense_status: DispenseStatus::Pending,
            dispense_time: None,
        });
    }

    Ok(created)
}

fn merge_lines(lines: &[PrescriptionLine]) -> Vec<PrescriptionLine> {
    let mut merged: BTreeMap<MedId, PrescriptionLine> = BTreeMap::new();
    for line in lines {
        merged
            .entry(line.med_id)
            .and_modify(|existing| existing.quantity = existing.quantity.saturating_add(line.quantity))
            .or_insert_with(|| line.clone());
    }
    merged.into_values().collect()
}

pub fn prescriptions_for(conn: &Connection, reg_id: RegId) -> ClinicResult<Vec<Prescription>> {
    let mut stmt = conn.prepare(
        "SELECT presc_id, reg_id, med_id, dosage, med_usage, total_quantity, total_amount,
                dispense_status, dispense_time
         FROM prescription
         WHERE reg_id = ?1
         ORDER BY presc_id",
    )?;
    let rows = stmt.query_map(params![reg_id], prescription_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

// ============================================================================
// CATALOGUE
// ============================================================================

/// # Errors
///
/// Returns `ClinicError::InvalidInput` if `stock` is negative.
pub fn add_medicine(
    tx: &Transaction<'_>,
    name: &NonEmptyText,
    price: Money,
    stock: i64,
) -> ClinicResult<Medicine> {
    check_stock_value(stock)?;
    tx.execute(
        "INSERT INTO medicine (med_name, price, stock) VALUES (?1, ?2, ?3)",
        params![name.as_str(), price.cents(), stock],
    )?;
    let medicine = Medicine {
        med_id: MedId(tx.last_insert_rowid()),
        name: name.to_string(),
        price,
        stock,
    };
    tracing::info!("medicine {} '{}' added with stock {}", medicine.med_id, medicine.name, stock);
    Ok(medicine)
}

/// Overwrites the given catalogue fields of a medicine.
///
/// # Errors
///
/// * `ClinicError::MedicineNotFound` - unknown id.
/// * `ClinicError::InvalidInput` - the new stock is negative.
pub fn update_medicine(
    tx: &Transaction<'_>,
    med_id: MedId,
    update: &MedicineUpdate,
) -> ClinicResult<Medicine> {
    let current = lock_medicine(tx, med_id)?;
    let stock = update.stock.unwrap_or(current.stock);
    check_stock_value(stock)?;
    let name = update
        .name
        .as_ref()
        .map_or(current.name, |n| n.to_string());
    let price = update.price.unwrap_or(current.price);

    tx.execute(
        "UPDATE medicine SET med_name = ?1, price = ?2, stock = ?3 WHERE med_id = ?4",
        params![name, price.cents(), stock, med_id],
    )?;

    Ok(Medicine {
        med_id,
        name,
        price,
        stock,
    })
}

/// Adds `delta` to a medicine's stock (negative to write off) and returns the new count.
///
/// # Errors
///
/// * `ClinicError::MedicineNotFound` - unknown id.
/// * `ClinicError::InsufficientStock` - the result would be negative.
pub fn adjust_stock(tx: &Transaction<'_>, med_id: MedId, delta: i64) -> ClinicResult<i64> {
    let medicine = lock_medicine(tx, med_id)?;
    let stock = medicine.stock.saturating_add(delta);
    if stock < 0 {
        return Err(ClinicError::InsufficientStock {
            med_id,
            requested: delta.saturating_neg(),
            available: medicine.stock,
        });
    }

    tx.execute(
        "UPDATE medicine SET stock = ?1 WHERE med_id = ?2",
        params![stock, med_id],
    )?;
    tracing::info!("medicine {} stock {} -> {}", med_id, medicine.stock, stock);

    Ok(stock)
}

/// Removes a medicine that no prescription references.
///
/// # Errors
///
/// * `ClinicError::MedicineNotFound` - unknown id.
/// * `ClinicError::MedicineInUse` - prescriptions reference the medicine.
pub fn remove_medicine(tx: &Transaction<'_>, med_id: MedId) -> ClinicResult<()> {
    lock_medicine(tx, med_id)?;
    let references: i64 = tx.query_row(
        "SELECT COUNT(*) FROM prescription WHERE med_id = ?1",
        params![med_id],
        |row| row.get(0),
    )?;
    if references > 0 {
        return Err(ClinicError::MedicineInUse(med_id));
    }

    tx.execute("DELETE FROM medicine WHERE med_id = ?1", params![med_id])?;
    tracing::info!("medicine {} removed", med_id);
    Ok(())
}

fn check_stock_value(stock: i64) -> ClinicResult<()> {
    if stock < 0 {
        return Err(ClinicError::InvalidInput(format!(
            "stock must not be negative, got {stock}"
        )));
    }
    Ok(())
}

// ============================================================================
// READS
// ============================================================================

/// Reads a medicine row inside a write transaction, which holds the store's write lock.
///
/// # Errors
///
/// Returns `ClinicError::MedicineNotFound` if the row does not exist.
pub(crate) fn lock_medicine(tx: &Transaction<'_>, med_id: MedId) -> ClinicResult<Medicine> {
    get_medicine(tx, med_id)?.ok_or(ClinicError::MedicineNotFound(med_id))
}

pub fn get_medicine(conn: &Connection, med_id: MedId) -> ClinicResult<Option<Medicine>> {
    Ok(conn
        .query_row(
            "SELECT med_id, med_name, price, stock FROM medicine WHERE med_id = ?1",
            params![med_id],
            medicine_from_row,
        )
        .optional()?)
}

pub fn list_medicines(conn: &Connection) -> ClinicResult<Vec<Medicine>> {
    let mut stmt =
        conn.prepare("SELECT med_id, med_name, price, stock FROM medicine ORDER BY med_name")?;
    let rows = stmt.query_map([], medicine_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
