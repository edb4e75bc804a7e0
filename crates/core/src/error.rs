use crate::types::{
    DeptId, DoctorId, FeeStatus, MedId, PatientId, RegId, ScheduleId, VisitStatus,
    VisitTransition,
};
use chrono::NaiveDate;
use clinic_types::{TextError, TimeSlot};

/// Coarse classification used by callers to render a message or pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    CapacityExceeded,
    Conflict,
    InvalidInput,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid input: {0}")]
    Text(#[from] TextError),

    #[error("doctor {0} not found")]
    DoctorNotFound(DoctorId),
    #[error("doctor {0} is not accepting registrations")]
    DoctorInactive(DoctorId),
    #[error("department {0} not found")]
    DepartmentNotFound(DeptId),
    #[error("doctor {doctor_id} does not belong to department {dept_id}")]
    DepartmentMismatch { doctor_id: DoctorId, dept_id: DeptId },
    #[error("patient {0} not found")]
    PatientNotFound(PatientId),
    #[error("registration {0} not found")]
    RegistrationNotFound(RegId),
    #[error("schedule {0} not found")]
    ScheduleNotFound(ScheduleId),
    #[error("medicine {0} not found")]
    MedicineNotFound(MedId),
    #[error("no prescription of medicine {med_id} on registration {reg_id}")]
    PrescriptionNotFound { reg_id: RegId, med_id: MedId },

    #[error("doctor {doctor_id} is suspended on {date} {time_slot}")]
    SlotSuspended {
        doctor_id: DoctorId,
        date: NaiveDate,
        time_slot: TimeSlot,
    },
    #[error("doctor {doctor_id} is fully booked on {date} {time_slot} ({max_slots} slots)")]
    SlotFull {
        doctor_id: DoctorId,
        date: NaiveDate,
        time_slot: TimeSlot,
        max_slots: i64,
    },
    #[error("schedule {schedule_id} already has {booked_slots} bookings; max_slots {max_slots} is too low")]
    CapacityBelowBooked {
        schedule_id: ScheduleId,
        max_slots: i64,
        booked_slots: i64,
    },
    #[error("insufficient stock of medicine {med_id}: requested {requested}, available {available}")]
    InsufficientStock {
        med_id: MedId,
        requested: i64,
        available: i64,
    },

    #[error("cannot {action} registration {reg_id} while it is {from}")]
    InvalidTransition {
        reg_id: RegId,
        from: VisitStatus,
        action: VisitTransition,
    },
    #[error("registration {0} is cancelled")]
    RegistrationCancelled(RegId),
    #[error("registration {0} has prescriptions; resolve them with the doctor or pharmacy first")]
    HasPrescriptions(RegId),
    #[error("registration {reg_id} is {fee_status}; only paid orders can be dispensed")]
    NotPaid { reg_id: RegId, fee_status: FeeStatus },
    #[error("invalid quantity {quantity} of medicine {med_id} on registration {reg_id}")]
    InvalidQuantity {
        reg_id: RegId,
        med_id: MedId,
        quantity: i64,
    },
    #[error("medicine {0} is referenced by prescriptions and cannot be removed")]
    MedicineInUse(MedId),

    #[error("prescription of medicine {med_id} on registration {reg_id} changed during dispense; nothing was dispensed")]
    ConcurrentDispenseConflict { reg_id: RegId, med_id: MedId },

    #[error("database schema is at version {found}, expected {expected}; run `clinic migrate`")]
    SchemaVersionMismatch { found: u32, expected: u32 },
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl ClinicError {
    pub fn kind(&self) -> ErrorKind {
        use ClinicError::*;

        match self {
            InvalidInput(_) | Text(_) | DepartmentMismatch { .. } | InvalidQuantity { .. }
            | CapacityBelowBooked { .. } => ErrorKind::InvalidInput,
            DoctorNotFound(_)
            | DepartmentNotFound(_)
            | PatientNotFound(_)
            | RegistrationNotFound(_)
            | ScheduleNotFound(_)
            | MedicineNotFound(_)
            | PrescriptionNotFound { .. } => ErrorKind::NotFound,
            SlotSuspended { .. } | SlotFull { .. } | InsufficientStock { .. } => {
                ErrorKind::CapacityExceeded
            }
            InvalidTransition { .. }
            | DoctorInactive(_)
            | RegistrationCancelled(_)
            | HasPrescriptions(_)
            | NotPaid { .. }
            | MedicineInUse(_) => ErrorKind::InvalidTransition,
            ConcurrentDispenseConflict { .. } => ErrorKind::Conflict,
            SchemaVersionMismatch { .. } | Database(_) => ErrorKind::Internal,
        }
    }
}

pub type ClinicResult<T> = std::result::Result<T, ClinicError>;
