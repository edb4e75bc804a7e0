//! Transaction-scoped entry points for callers of the core.
//!
//! Each method opens its own connection and runs exactly one transaction: writes commit when the
//! ledger call returns `Ok`, and an `Err` drops the transaction, rolling every statement back.
//! Requests handled on different threads therefore share nothing but the store.

use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::db::{begin_write, Database};
use crate::error::ClinicResult;
use crate::models::{
    AuditEntry, Bill, CancelOutcome, ConsultationSubmission, DaySheet, Department,
    DispenseOutcome, Doctor, Medicine, MedicineUpdate, NewDoctor, NewPatient, Operator, Patient,
    PaymentOutcome, PendingDispense, Prescription, Registration, RegistrationRequest,
    ScheduleRequest, ScheduleSlot,
};
use crate::repositories::{
    audit, consultation, directory, dispense, payment, registration, schedule, stock,
};
use crate::types::{
    DoctorId, FeeFilter, MedId, PatientId, RegId, ScheduleId, SlotStatus, VisitStatus,
};
use chrono::NaiveDate;
use clinic_types::{Money, NonEmptyText};
use rusqlite::{Connection, Transaction};
use std::sync::Arc;

/// Front-desk, consulting room, cashier and pharmacy operations over one clinic store.
#[derive(Clone)]
pub struct ClinicService {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl ClinicService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn with_clock(cfg: Arc<CoreConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db: Database::new(&cfg),
            clock,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>, &dyn Clock) -> ClinicResult<T>,
    ) -> ClinicResult<T> {
        let mut conn = self.db.connect()?;
        let tx = begin_write(&mut conn)?;
        let value = f(&tx, self.clock.as_ref())?;
        tx.commit()?;
        Ok(value)
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> ClinicResult<T>) -> ClinicResult<T> {
        let conn = self.db.connect()?;
        f(&conn)
    }
}

// ============================================================================
// REGISTRATION
// ============================================================================

impl ClinicService {
    /// Books a visit. The returned registration carries its queue number.
    ///
    /// # Errors
    ///
    /// Returns a `ClinicError` if a referenced row is missing, the doctor is inactive, the
    /// department does not match, or the slot is suspended or full. Nothing is written on error.
    pub fn create_registration(&self, request: &RegistrationRequest) -> ClinicResult<Registration> {
        self.write(|tx, clock| registration::create(tx, clock, request))
    }

    /// Cancels an unseen registration, releasing its slot and logging the operator.
    ///
    /// # Errors
    ///
    /// Returns a `ClinicError` if the registration is missing, has started, or has prescriptions.
    pub fn cancel_registration(
        &self,
        reg_id: RegId,
        operator: &Operator,
    ) -> ClinicResult<CancelOutcome> {
        self.write(|tx, clock| registration::cancel(tx, clock, reg_id, operator))
    }

    /// Returns a cancelled registration to the queue and re-takes its slot.
    ///
    /// # Errors
    ///
    /// Returns a `ClinicError` if the registration is missing or not cancelled.
    pub fn restore_registration(
        &self,
        reg_id: RegId,
        operator: &Operator,
    ) -> ClinicResult<Option<i64>> {
        self.write(|tx, clock| registration::restore(tx, clock, reg_id, operator))
    }

    pub fn registration(&self, reg_id: RegId) -> ClinicResult<Option<Registration>> {
        self.read(|conn| registration::get(conn, reg_id))
    }

    pub fn doctor_queue(&self, doctor_id: DoctorId, date: NaiveDate) -> ClinicResult<Vec<Registration>> {
        self.read(|conn| registration::doctor_queue(conn, doctor_id, date))
    }
}

// ============================================================================
// SCHEDULES
// ============================================================================

impl ClinicService {
    /// Defines or redefines a slot's capacity, keeping existing bookings.
    ///
    /// # Errors
    ///
    /// Returns a `ClinicError` if the doctor is unknown or the capacity is negative or below the
    /// slot's current bookings.
    pub fn upsert_schedule(&self, request: &ScheduleRequest) -> ClinicResult<ScheduleSlot> {
        self.write(|tx, _| schedule::upsert(tx, request))
    }

    /// # Errors
    ///
    /// Returns `ClinicError::ScheduleNotFound` if the slot does not exist.
    pub fn set_schedule_status(
        &self,
        schedule_id: ScheduleId,
        status: SlotStatus,
    ) -> ClinicResult<ScheduleSlot> {
        self.write(|tx, _| schedule::set_status(tx, schedule_id, status))
    }

    pub fn schedules_for_date(&self, date: NaiveDate) -> ClinicResult<Vec<ScheduleSlot>> {
        self.read(|conn| schedule::list_for_date(conn, date))
    }
}

// ============================================================================
// CONSULTATION
// ============================================================================

impl ClinicService {
    /// # Errors
    ///
    /// Returns a `ClinicError` if the registration is missing, cancelled or already seen.
    pub fn start_consultation(&self, reg_id: RegId) -> ClinicResult<VisitStatus> {
        self.write(|tx, _| consultation::start(tx, reg_id))
    }

    /// Records diagnosis and prescriptions and closes the visit.
    ///
    /// # Errors
    ///
    /// Returns a `ClinicError` if the consultation was not started or any prescription line fails
    /// its stock check. The whole submission is rejected in that case.
    pub fn submit_consultation(
        &self,
        reg_id: RegId,
        submission: &ConsultationSubmission,
    ) -> ClinicResult<Vec<Prescription>> {
        self.write(|tx, clock| consultation::submit(tx, clock, reg_id, submission))
    }

    pub fn prescriptions(&self, reg_id: RegId) -> ClinicResult<Vec<Prescription>> {
        self.read(|conn| stock::prescriptions_for(conn, reg_id))
    }
}

// ============================================================================
// CASHIER & PHARMACY
// ============================================================================

impl ClinicService {
    /// # Errors
    ///
    /// Returns a `ClinicError` if the registration is missing or cancelled.
    pub fn pay_registration(&self, reg_id: RegId) -> ClinicResult<PaymentOutcome> {
        self.write(|tx, clock| payment::pay(tx, clock, reg_id))
    }

    pub fn bill(&self, reg_id: RegId) -> ClinicResult<Bill> {
        self.read(|conn| payment::bill(conn, reg_id))
    }

    /// The cashier's list of a date's registrations with fees and totals.
    pub fn day_sheet(&self, date: NaiveDate, filter: FeeFilter) -> ClinicResult<DaySheet> {
        self.read(|conn| payment::day_sheet(conn, date, filter))
    }

    /// Hands out one prescription line.
    ///
    /// # Errors
    ///
    /// Returns a `ClinicError` if the registration is unpaid, the line or medicine is missing,
    /// stock is short, or a concurrent dispense won the line. Stock is unchanged on error.
    pub fn dispense(&self, reg_id: RegId, med_id: MedId) -> ClinicResult<DispenseOutcome> {
        self.write(|tx, clock| dispense::dispense(tx, clock, reg_id, med_id))
    }

    pub fn pending_dispense(&self) -> ClinicResult<Vec<PendingDispense>> {
        self.read(dispense::pending)
    }
}

// ============================================================================
// CATALOGUE & DIRECTORY
// ============================================================================

impl ClinicService {
    pub fn add_medicine(&self, name: &NonEmptyText, price: Money, stock: i64) -> ClinicResult<Medicine> {
        self.write(|tx, _| stock::add_medicine(tx, name, price, stock))
    }

    pub fn update_medicine(&self, med_id: MedId, update: &MedicineUpdate) -> ClinicResult<Medicine> {
        self.write(|tx, _| stock::update_medicine(tx, med_id, update))
    }

    pub fn adjust_stock(&self, med_id: MedId, delta: i64) -> ClinicResult<i64> {
        self.write(|tx, _| stock::adjust_stock(tx, med_id, delta))
    }

    pub fn remove_medicine(&self, med_id: MedId) -> ClinicResult<()> {
        self.write(|tx, _| stock::remove_medicine(tx, med_id))
    }

    pub fn medicines(&self) -> ClinicResult<Vec<Medicine>> {
        self.read(stock::list_medicines)
    }

    pub fn add_department(&self, name: &NonEmptyText) -> ClinicResult<Department> {
        self.write(|tx, _| directory::add_department(tx, name))
    }

    pub fn departments(&self) -> ClinicResult<Vec<Department>> {
        self.read(directory::list_departments)
    }

    pub fn add_doctor(&self, new: &NewDoctor) -> ClinicResult<Doctor> {
        self.write(|tx, _| directory::add_doctor(tx, new))
    }

    pub fn set_doctor_active(&self, doctor_id: DoctorId, active: bool) -> ClinicResult<()> {
        self.write(|tx, _| directory::set_doctor_active(tx, doctor_id, active))
    }

    pub fn doctors(&self) -> ClinicResult<Vec<Doctor>> {
        self.read(directory::list_active_doctors)
    }

    pub fn add_patient(&self, new: &NewPatient) -> ClinicResult<Patient> {
        self.write(|tx, clock| directory::add_patient(tx, clock, new))
    }

    pub fn patient(&self, patient_id: PatientId) -> ClinicResult<Option<Patient>> {
        self.read(|conn| directory::patient(conn, patient_id))
    }

    /// Looks a patient up by medical record number or exact name.
    pub fn find_patient(&self, keyword: &str) -> ClinicResult<Option<Patient>> {
        self.read(|conn| directory::find_patient(conn, keyword))
    }

    pub fn audit_log(&self, limit: u32) -> ClinicResult<Vec<AuditEntry>> {
        self.read(|conn| audit::list(conn, limit))
    }
}
