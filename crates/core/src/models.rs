//! Rows, requests and operation outcomes exchanged with the ledgers.

use crate::types::{
    DeptId, DispenseStatus, DoctorId, FeeFilter, FeeStatus, MedId, PatientId, PrescId, RegId,
    ScheduleId, Shift, SlotStatus, VisitStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use clinic_types::{Money, NonEmptyText, TimeSlot};
use serde::Serialize;

// ============================================================================
// DIRECTORY
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Department {
    pub dept_id: DeptId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Doctor {
    pub doctor_id: DoctorId,
    pub name: String,
    pub title: Option<String>,
    pub dept_id: DeptId,
    pub reg_fee: Money,
    /// Inactive doctors keep their history but cannot be booked.
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Patient {
    pub patient_id: PatientId,
    pub name: String,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub phone: Option<String>,
    pub allergy: Option<String>,
    /// `MR<yyyymmdd><id>` assigned when the patient is first registered.
    pub medical_record_no: String,
}

/// Input for adding a doctor to the directory.
#[derive(Clone, Debug)]
pub struct NewDoctor {
    pub name: NonEmptyText,
    pub title: Option<String>,
    pub dept_id: DeptId,
    pub reg_fee: Money,
}

/// Input for adding a patient to the directory.
#[derive(Clone, Debug, Default)]
pub struct NewPatient {
    pub name: String,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub phone: Option<String>,
    pub allergy: Option<String>,
}

// ============================================================================
// SLOT LEDGER
// ============================================================================

/// Bounded booking capacity for one doctor, date and time slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScheduleSlot {
    pub schedule_id: ScheduleId,
    pub doctor_id: DoctorId,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub shift: Shift,
    pub max_slots: i64,
    pub booked_slots: i64,
    pub status: SlotStatus,
}

impl ScheduleSlot {
    pub fn remaining(&self) -> i64 {
        (self.max_slots - self.booked_slots).max(0)
    }
}

/// Admin-defined capacity for a slot.
#[derive(Clone, Debug)]
pub struct ScheduleRequest {
    pub doctor_id: DoctorId,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    pub shift: Shift,
    pub max_slots: i64,
    pub status: SlotStatus,
}

/// How a registration relates to slot capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "schedule_id", rename_all = "snake_case")]
pub enum Reservation {
    /// No schedule row existed for the slot, so no capacity was enforced.
    Unconstrained,
    /// One unit of the referenced slot's capacity is held by the registration.
    Reserved(ScheduleId),
}

impl Reservation {
    pub fn schedule_id(self) -> Option<ScheduleId> {
        match self {
            Reservation::Unconstrained => None,
            Reservation::Reserved(id) => Some(id),
        }
    }
}

impl From<Option<ScheduleId>> for Reservation {
    fn from(value: Option<ScheduleId>) -> Self {
        value.map_or(Reservation::Unconstrained, Reservation::Reserved)
    }
}

// ============================================================================
// REGISTRATION
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub reg_id: RegId,
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub dept_id: DeptId,
    pub visit_date: NaiveDate,
    pub shift: Shift,
    pub time_slot: TimeSlot,
    pub queue_num: i64,
    pub visit_status: VisitStatus,
    pub fee_status: FeeStatus,
    pub reservation: Reservation,
    pub reg_fee: Money,
    pub check_fee: Money,
    pub reg_time: DateTime<Utc>,
    pub paid_time: Option<DateTime<Utc>>,
}

/// A booking request from the front desk or a patient.
#[derive(Clone, Debug)]
pub struct RegistrationRequest {
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    /// Defaults to the doctor's department. A different department is rejected.
    pub dept_id: Option<DeptId>,
    pub visit_date: NaiveDate,
    pub time_slot: TimeSlot,
    /// Inferred from the time slot when absent.
    pub shift: Option<Shift>,
}

/// Who performed an administrative action, for the audit log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Operator {
    pub id: Option<i64>,
    pub name: String,
    pub role: String,
}

impl Operator {
    pub fn new(id: Option<i64>, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            role: role.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled {
        /// The fee was PAID and is now labelled REFUNDED.
        refunded: bool,
        /// Slot occupancy after release, when the registration held a reservation.
        booked_slots: Option<i64>,
    },
    /// The registration was already cancelled; nothing changed.
    AlreadyCancelled,
}

// ============================================================================
// CONSULTATION & STOCK
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Medicine {
    pub med_id: MedId,
    pub name: String,
    pub price: Money,
    pub stock: i64,
}

/// Catalogue changes for one medicine. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default)]
pub struct MedicineUpdate {
    pub name: Option<NonEmptyText>,
    pub price: Option<Money>,
    pub stock: Option<i64>,
}

/// One requested medicine on a consultation submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrescriptionLine {
    pub med_id: MedId,
    pub quantity: i64,
    pub dosage: Option<String>,
    pub usage: Option<String>,
}

impl PrescriptionLine {
    pub fn new(med_id: MedId, quantity: i64) -> Self {
        Self {
            med_id,
            quantity,
            dosage: None,
            usage: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsultationSubmission {
    pub main_complaint: Option<String>,
    pub diagnosis: NonEmptyText,
    pub lines: Vec<PrescriptionLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Prescription {
    pub presc_id: PrescId,
    pub reg_id: RegId,
    pub med_id: MedId,
    pub dosage: String,
    pub usage: Option<String>,
    pub total_quantity: i64,
    pub total_amount: Money,
    pub dispense_status: DispenseStatus,
    pub dispense_time: Option<DateTime<Utc>>,
}

// ============================================================================
// DISPENSE & PAYMENT
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispenseOutcome {
    Dispensed { quantity: i64, remaining_stock: i64 },
    /// Another request already fulfilled the line; nothing changed.
    AlreadyDispensed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Paid { paid_time: DateTime<Utc> },
    /// The registration was already paid; `paid_time` is unchanged.
    AlreadyPaid,
}

/// A paid, undispensed prescription line awaiting the pharmacy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingDispense {
    pub reg_id: RegId,
    pub patient_name: String,
    pub medical_record_no: String,
    pub doctor_name: String,
    pub visit_date: NaiveDate,
    pub shift: Shift,
    pub med_id: MedId,
    pub med_name: String,
    pub total_quantity: i64,
    pub total_amount: Money,
}

/// Cashier view of what a registration owes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Bill {
    pub reg_id: RegId,
    pub fee_status: FeeStatus,
    pub reg_fee: Money,
    pub check_fee: Money,
    pub med_fee: Money,
    pub total: Money,
}

/// One registration on a cashier day sheet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DaySheetRow {
    pub reg_id: RegId,
    pub queue_num: i64,
    pub patient_name: String,
    pub medical_record_no: String,
    pub doctor_name: String,
    pub shift: Shift,
    pub time_slot: TimeSlot,
    pub visit_status: VisitStatus,
    pub fee_status: FeeStatus,
    pub reg_fee: Money,
    pub check_fee: Money,
    pub med_fee: Money,
    pub total: Money,
    pub paid_time: Option<DateTime<Utc>>,
}

/// A date's registrations with the amounts they carry.
///
/// `count` covers every listed row. `amount` sums `total` over rows that are not cancelled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DaySheet {
    pub date: NaiveDate,
    pub filter: FeeFilter,
    pub rows: Vec<DaySheetRow>,
    pub count: usize,
    pub amount: Money,
}

// ============================================================================
// AUDIT
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub log_id: i64,
    pub operator_id: Option<i64>,
    pub operator_name: String,
    pub operator_role: String,
    pub op_type: String,
    pub target_id: i64,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}
