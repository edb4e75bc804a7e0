//! Wire types for the clinic APIs.
//!
//! Requests carry plain strings and numbers; conversion into core types validates them and
//! reports failures as `ClinicError::InvalidInput`. Responses render dates as `YYYY-MM-DD`,
//! timestamps as RFC 3339 and money as a two-decimal string.

use chrono::NaiveDate;
use clinic_core::constants::DEFAULT_MAX_SLOTS;
use clinic_core::models::{
    AuditEntry, Bill, CancelOutcome, ConsultationSubmission, DaySheet, DaySheetRow,
    DispenseOutcome, Medicine, MedicineUpdate, Operator, PaymentOutcome, PendingDispense,
    Prescription, PrescriptionLine, Registration, RegistrationRequest, ScheduleRequest,
    ScheduleSlot,
};
use clinic_core::types::{
    DeptId, DoctorId, FeeFilter, MedId, PatientId, RegId, Shift, SlotStatus,
};
use clinic_core::{ClinicError, ClinicResult, Money, NonEmptyText, TimeSlot};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

fn parse_date(value: &str) -> ClinicResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ClinicError::InvalidInput(format!("invalid date '{value}': expected YYYY-MM-DD")))
}

fn parse_label<T>(value: &str) -> ClinicResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ClinicError::InvalidInput(e.to_string()))
}

// ============================================================================
// HEALTH & ERRORS
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    /// Human-readable description.
    pub error: String,
    /// Coarse category, e.g. `not_found` or `capacity_exceeded`.
    pub kind: String,
}

// ============================================================================
// REGISTRATION
// ============================================================================

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct CreateRegistrationReq {
    pub patient_id: i64,
    pub doctor_id: i64,
    pub dept_id: Option<i64>,
    /// `YYYY-MM-DD`
    pub visit_date: String,
    /// `HH:MM-HH:MM`
    pub time_slot: String,
    /// Inferred from the time slot when omitted.
    pub shift: Option<String>,
}

impl CreateRegistrationReq {
    pub fn to_core(&self) -> ClinicResult<RegistrationRequest> {
        Ok(RegistrationRequest {
            patient_id: PatientId(self.patient_id),
            doctor_id: DoctorId(self.doctor_id),
            dept_id: self.dept_id.map(DeptId),
            visit_date: parse_date(&self.visit_date)?,
            time_slot: TimeSlot::parse(&self.time_slot)?,
            shift: self.shift.as_deref().map(parse_label::<Shift>).transpose()?,
        })
    }
}

/// Identifies the staff member behind a cancel or restore.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct OperatorReq {
    pub operator_id: Option<i64>,
    pub operator_name: Option<String>,
}

impl OperatorReq {
    pub fn to_operator(&self, role: &str) -> Operator {
        Operator::new(
            self.operator_id,
            self.operator_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or("unknown"),
            role,
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RegistrationRes {
    pub reg_id: i64,
    pub patient_id: i64,
    pub doctor_id: i64,
    pub dept_id: i64,
    pub visit_date: String,
    pub shift: String,
    pub time_slot: String,
    pub queue_num: i64,
    pub visit_status: String,
    pub fee_status: String,
    /// Present when the booking holds slot capacity.
    pub schedule_id: Option<i64>,
    pub reg_fee: String,
    pub check_fee: String,
    pub reg_time: String,
    pub paid_time: Option<String>,
}

impl From<Registration> for RegistrationRes {
    fn from(r: Registration) -> Self {
        Self {
            reg_id: r.reg_id.0,
            patient_id: r.patient_id.0,
            doctor_id: r.doctor_id.0,
            dept_id: r.dept_id.0,
            visit_date: r.visit_date.to_string(),
            shift: r.shift.to_string(),
            time_slot: r.time_slot.to_string(),
            queue_num: r.queue_num,
            visit_status: r.visit_status.to_string(),
            fee_status: r.fee_status.to_string(),
            schedule_id: r.reservation.schedule_id().map(|id| id.0),
            reg_fee: r.reg_fee.to_string(),
            check_fee: r.check_fee.to_string(),
            reg_time: r.reg_time.to_rfc3339(),
            paid_time: r.paid_time.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CancelRes {
    /// `cancelled` or `already_cancelled`.
    pub outcome: String,
    pub refunded: bool,
    pub booked_slots: Option<i64>,
}

impl From<CancelOutcome> for CancelRes {
    fn from(outcome: CancelOutcome) -> Self {
        match outcome {
            CancelOutcome::Cancelled {
                refunded,
                booked_slots,
            } => Self {
                outcome: "cancelled".into(),
                refunded,
                booked_slots,
            },
            CancelOutcome::AlreadyCancelled => Self {
                outcome: "already_cancelled".into(),
                refunded: false,
                booked_slots: None,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RestoreRes {
    pub reg_id: i64,
    pub booked_slots: Option<i64>,
}

// ============================================================================
// SCHEDULES
// ============================================================================

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ScheduleReq {
    pub doctor_id: i64,
    /// `YYYY-MM-DD`
    pub date: String,
    pub time_slot: String,
    /// Inferred from the time slot when omitted.
    pub shift: Option<String>,
    /// Defaults to 20.
    pub max_slots: Option<i64>,
    /// `AVAILABLE` (default) or `SUSPENDED`.
    pub status: Option<String>,
}

impl ScheduleReq {
    pub fn to_core(&self) -> ClinicResult<ScheduleRequest> {
        let time_slot = TimeSlot::parse(&self.time_slot)?;
        let shift = match self.shift.as_deref() {
            Some(label) => parse_label::<Shift>(label)?,
            None => Shift::from_time_slot(&time_slot),
        };
        Ok(ScheduleRequest {
            doctor_id: DoctorId(self.doctor_id),
            date: parse_date(&self.date)?,
            time_slot,
            shift,
            max_slots: self.max_slots.unwrap_or(DEFAULT_MAX_SLOTS),
            status: self
                .status
                .as_deref()
                .map(parse_label::<SlotStatus>)
                .transpose()?
                .unwrap_or(SlotStatus::Available),
        })
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ScheduleStatusReq {
    pub status: String,
}

impl ScheduleStatusReq {
    pub fn to_core(&self) -> ClinicResult<SlotStatus> {
        parse_label(&self.status)
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct DateQuery {
    /// `YYYY-MM-DD`
    pub date: String,
}

impl DateQuery {
    pub fn to_core(&self) -> ClinicResult<NaiveDate> {
        parse_date(&self.date)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ScheduleRes {
    pub schedule_id: i64,
    pub doctor_id: i64,
    pub date: String,
    pub time_slot: String,
    pub shift: String,
    pub max_slots: i64,
    pub booked_slots: i64,
    pub remaining: i64,
    pub status: String,
}

impl From<ScheduleSlot> for ScheduleRes {
    fn from(s: ScheduleSlot) -> Self {
        Self {
            schedule_id: s.schedule_id.0,
            doctor_id: s.doctor_id.0,
            date: s.date.to_string(),
            time_slot: s.time_slot.to_string(),
            shift: s.shift.to_string(),
            max_slots: s.max_slots,
            booked_slots: s.booked_slots,
            remaining: s.remaining(),
            status: s.status.to_string(),
        }
    }
}

// ============================================================================
// CONSULTATION
// ============================================================================

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct PrescriptionLineReq {
    pub med_id: i64,
    pub quantity: i64,
    pub dosage: Option<String>,
    pub usage: Option<String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ConsultationReq {
    pub main_complaint: Option<String>,
    pub diagnosis: String,
    #[serde(default)]
    pub prescriptions: Vec<PrescriptionLineReq>,
}

impl ConsultationReq {
    pub fn to_core(&self) -> ClinicResult<ConsultationSubmission> {
        Ok(ConsultationSubmission {
            main_complaint: self.main_complaint.clone(),
            diagnosis: NonEmptyText::new(&self.diagnosis)?,
            lines: self
                .prescriptions
                .iter()
                .map(|l| PrescriptionLine {
                    med_id: MedId(l.med_id),
                    quantity: l.quantity,
                    dosage: l.dosage.clone(),
                    usage: l.usage.clone(),
                })
                .collect(),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PrescriptionRes {
    pub presc_id: i64,
    pub reg_id: i64,
    pub med_id: i64,
    pub dosage: String,
    pub usage: Option<String>,
    pub total_quantity: i64,
    pub total_amount: String,
    pub dispense_status: String,
    pub dispense_time: Option<String>,
}

impl From<Prescription> for PrescriptionRes {
    fn from(p: Prescription) -> Self {
        Self {
            presc_id: p.presc_id.0,
            reg_id: p.reg_id.0,
            med_id: p.med_id.0,
            dosage: p.dosage,
            usage: p.usage,
            total_quantity: p.total_quantity,
            total_amount: p.total_amount.to_string(),
            dispense_status: p.dispense_status.to_string(),
            dispense_time: p.dispense_time.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct VisitStatusRes {
    pub reg_id: i64,
    pub visit_status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsultationRes {
    pub reg_id: i64,
    pub visit_status: String,
    pub prescriptions: Vec<PrescriptionRes>,
}

// ============================================================================
// CASHIER & PHARMACY
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentRes {
    /// `paid` or `already_paid`.
    pub outcome: String,
    /// Set when this request took the payment.
    pub paid_time: Option<String>,
}

impl From<PaymentOutcome> for PaymentRes {
    fn from(outcome: PaymentOutcome) -> Self {
        match outcome {
            PaymentOutcome::Paid { paid_time } => Self {
                outcome: "paid".into(),
                paid_time: Some(paid_time.to_rfc3339()),
            },
            PaymentOutcome::AlreadyPaid => Self {
                outcome: "already_paid".into(),
                paid_time: None,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BillRes {
    pub reg_id: i64,
    pub fee_status: String,
    pub reg_fee: String,
    pub check_fee: String,
    pub med_fee: String,
    pub total: String,
}

impl From<Bill> for BillRes {
    fn from(b: Bill) -> Self {
        Self {
            reg_id: b.reg_id.0,
            fee_status: b.fee_status.to_string(),
            reg_fee: b.reg_fee.to_string(),
            check_fee: b.check_fee.to_string(),
            med_fee: b.med_fee.to_string(),
            total: b.total.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct DaySheetQuery {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `all` (default), `paid` or `unpaid`.
    pub status: Option<String>,
}

impl DaySheetQuery {
    pub fn to_core(&self) -> ClinicResult<(NaiveDate, FeeFilter)> {
        let filter = match self.status.as_deref().map(str::trim) {
            None | Some("") => FeeFilter::All,
            Some(status) => parse_label(status)?,
        };
        Ok((parse_date(&self.date)?, filter))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DaySheetRowRes {
    pub reg_id: i64,
    pub queue_num: i64,
    pub patient_name: String,
    pub medical_record_no: String,
    pub doctor_name: String,
    pub shift: String,
    pub time_slot: String,
    pub visit_status: String,
    pub fee_status: String,
    pub reg_fee: String,
    pub check_fee: String,
    pub med_fee: String,
    pub total: String,
    pub paid_time: Option<String>,
}

impl From<DaySheetRow> for DaySheetRowRes {
    fn from(r: DaySheetRow) -> Self {
        Self {
            reg_id: r.reg_id.0,
            queue_num: r.queue_num,
            patient_name: r.patient_name,
            medical_record_no: r.medical_record_no,
            doctor_name: r.doctor_name,
            shift: r.shift.to_string(),
            time_slot: r.time_slot.to_string(),
            visit_status: r.visit_status.to_string(),
            fee_status: r.fee_status.to_string(),
            reg_fee: r.reg_fee.to_string(),
            check_fee: r.check_fee.to_string(),
            med_fee: r.med_fee.to_string(),
            total: r.total.to_string(),
            paid_time: r.paid_time.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DaySheetRes {
    pub date: String,
    /// `ALL`, `PAID` or `UNPAID`.
    pub status: String,
    pub count: usize,
    /// Sum of `total` over rows that are not cancelled.
    pub amount: String,
    pub rows: Vec<DaySheetRowRes>,
}

impl From<DaySheet> for DaySheetRes {
    fn from(sheet: DaySheet) -> Self {
        Self {
            date: sheet.date.to_string(),
            status: sheet.filter.to_string(),
            count: sheet.count,
            amount: sheet.amount.to_string(),
            rows: sheet.rows.into_iter().map(DaySheetRowRes::from).collect(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct DispenseReq {
    pub reg_id: i64,
    pub med_id: i64,
}

impl DispenseReq {
    pub fn ids(&self) -> (RegId, MedId) {
        (RegId(self.reg_id), MedId(self.med_id))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DispenseRes {
    /// `dispensed` or `already_dispensed`.
    pub outcome: String,
    pub quantity: Option<i64>,
    pub remaining_stock: Option<i64>,
}

impl From<DispenseOutcome> for DispenseRes {
    fn from(outcome: DispenseOutcome) -> Self {
        match outcome {
            DispenseOutcome::Dispensed {
                quantity,
                remaining_stock,
            } => Self {
                outcome: "dispensed".into(),
                quantity: Some(quantity),
                remaining_stock: Some(remaining_stock),
            },
            DispenseOutcome::AlreadyDispensed => Self {
                outcome: "already_dispensed".into(),
                quantity: None,
                remaining_stock: None,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PendingDispenseRes {
    pub reg_id: i64,
    pub patient_name: String,
    pub medical_record_no: String,
    pub doctor_name: String,
    pub visit_date: String,
    pub shift: String,
    pub med_id: i64,
    pub med_name: String,
    pub total_quantity: i64,
    pub total_amount: String,
}

impl From<PendingDispense> for PendingDispenseRes {
    fn from(p: PendingDispense) -> Self {
        Self {
            reg_id: p.reg_id.0,
            patient_name: p.patient_name,
            medical_record_no: p.medical_record_no,
            doctor_name: p.doctor_name,
            visit_date: p.visit_date.to_string(),
            shift: p.shift.to_string(),
            med_id: p.med_id.0,
            med_name: p.med_name,
            total_quantity: p.total_quantity,
            total_amount: p.total_amount.to_string(),
        }
    }
}

// ============================================================================
// MEDICINES
// ============================================================================

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct MedicineReq {
    pub name: String,
    /// Decimal amount, e.g. `12.50`.
    pub price: String,
    pub stock: i64,
}

impl MedicineReq {
    pub fn to_core(&self) -> ClinicResult<(NonEmptyText, Money, i64)> {
        Ok((
            NonEmptyText::new(&self.name)?,
            self.price.parse()?,
            self.stock,
        ))
    }
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct MedicineUpdateReq {
    pub name: Option<String>,
    pub price: Option<String>,
    pub stock: Option<i64>,
}

impl MedicineUpdateReq {
    pub fn to_core(&self) -> ClinicResult<MedicineUpdate> {
        Ok(MedicineUpdate {
            name: self.name.as_deref().map(NonEmptyText::new).transpose()?,
            price: self.price.as_deref().map(str::parse::<Money>).transpose()?,
            stock: self.stock,
        })
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct StockAdjustReq {
    /// Positive to restock, negative to write off.
    pub delta: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StockRes {
    pub med_id: i64,
    pub stock: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MedicineRes {
    pub med_id: i64,
    pub name: String,
    pub price: String,
    pub stock: i64,
}

impl From<Medicine> for MedicineRes {
    fn from(m: Medicine) -> Self {
        Self {
            med_id: m.med_id.0,
            name: m.name,
            price: m.price.to_string(),
            stock: m.stock,
        }
    }
}

// ============================================================================
// AUDIT
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AuditEntryRes {
    pub log_id: i64,
    pub operator_id: Option<i64>,
    pub operator_name: String,
    pub operator_role: String,
    pub op_type: String,
    pub target_id: i64,
    pub detail: String,
    pub created_at: String,
}

impl From<AuditEntry> for AuditEntryRes {
    fn from(e: AuditEntry) -> Self {
        Self {
            log_id: e.log_id,
            operator_id: e.operator_id,
            operator_name: e.operator_name,
            operator_role: e.operator_role,
            op_type: e.op_type,
            target_id: e.target_id,
            detail: e.detail,
            created_at: e.created_at.to_rfc3339(),
        }
    }
}
