//! Identifiers and closed status enumerations.
//!
//! Every status column in the store is one of these enums, persisted as its
//! upper-snake-case label. Unknown labels read back from the store are conversion errors rather
//! than silently compared strings.

use clinic_types::TimeSlot;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A status label that does not name any variant of the target enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value.as_i64().map($name)
            }
        }
    };
}

row_id!(
    /// Primary key of a `department` row.
    DeptId
);
row_id!(
    /// Primary key of a `doctor` row.
    DoctorId
);
row_id!(
    /// Primary key of a `patient` row.
    PatientId
);
row_id!(
    /// Primary key of a `doctor_schedule` row.
    ScheduleId
);
row_id!(
    /// Primary key of a `registration` row.
    RegId
);
row_id!(
    /// Primary key of a `medicine` row.
    MedId
);
row_id!(
    /// Primary key of a `prescription` row.
    PrescId
);

// ============================================================================
// STATUS ENUMERATIONS
// ============================================================================

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Label persisted in the store and used on the wire.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($label => Ok($name::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: s.to_owned(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(
    /// Part of the clinic day a slot or registration belongs to.
    Shift, "shift" {
        Morning => "MORNING",
        Afternoon => "AFTERNOON",
        Evening => "EVENING",
        /// Matches a registration in any shift when used on a schedule row.
        AllDay => "ALL_DAY",
    }
);

text_enum!(
    /// Whether a schedule slot accepts bookings.
    SlotStatus, "slot status" {
        Available => "AVAILABLE",
        Suspended => "SUSPENDED",
    }
);

text_enum!(
    /// Where a registration is in the visit lifecycle.
    VisitStatus, "visit status" {
        Unseen => "UNSEEN",
        InProgress => "IN_PROGRESS",
        Seen => "SEEN",
        Cancelled => "CANCELLED",
    }
);

text_enum!(
    /// Payment state of a registration.
    FeeStatus, "fee status" {
        Unpaid => "UNPAID",
        Paid => "PAID",
        /// A paid registration that was cancelled. Status label only.
        Refunded => "REFUNDED",
    }
);

text_enum!(
    /// Fulfilment state of a prescription line.
    DispenseStatus, "dispense status" {
        Pending => "PENDING",
        Dispensed => "DISPENSED",
    }
);

text_enum!(
    /// Which registrations a cashier day sheet lists.
    FeeFilter, "fee filter" {
        All => "ALL",
        Paid => "PAID",
        Unpaid => "UNPAID",
    }
);

impl Shift {
    /// Infers the shift from the hour a time slot starts.
    ///
    /// Slots starting before noon are morning, before 18:00 afternoon, otherwise evening.
    pub fn from_time_slot(slot: &TimeSlot) -> Self {
        match slot.start_hour() {
            h if h < 12 => Shift::Morning,
            h if h < 18 => Shift::Afternoon,
            _ => Shift::Evening,
        }
    }
}

// ============================================================================
// VISIT STATE MACHINE
// ============================================================================

/// Externally triggered transitions of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitTransition {
    StartConsultation,
    SubmitConsultation,
    Cancel,
    Restore,
}

impl fmt::Display for VisitTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VisitTransition::StartConsultation => "start consultation",
            VisitTransition::SubmitConsultation => "submit consultation",
            VisitTransition::Cancel => "cancel",
            VisitTransition::Restore => "restore",
        })
    }
}

impl VisitStatus {
    /// Returns the status reached by applying `transition`, or `None` if the lifecycle forbids it.
    ///
    /// ```text
    /// UNSEEN ──start──▶ IN_PROGRESS ──submit──▶ SEEN
    ///   │  ▲              └─start (re-entry)
    /// cancel restore
    ///   ▼  │
    /// CANCELLED
    /// ```
    pub fn apply(self, transition: VisitTransition) -> Option<VisitStatus> {
        use VisitStatus::*;
        use VisitTransition::*;

        match (self, transition) {
            (Unseen | InProgress, StartConsultation) => Some(InProgress),
            (InProgress, SubmitConsultation) => Some(Seen),
            (Unseen, Cancel) => Some(Cancelled),
            (Cancelled, Restore) => Some(Unseen),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_inferred_from_slot_start() {
        let slot = |s: &str| TimeSlot::parse(s).unwrap();
        assert_eq!(Shift::from_time_slot(&slot("08:00-09:00")), Shift::Morning);
        assert_eq!(Shift::from_time_slot(&slot("11:30-12:30")), Shift::Morning);
        assert_eq!(Shift::from_time_slot(&slot("12:00-13:00")), Shift::Afternoon);
        assert_eq!(Shift::from_time_slot(&slot("17:00-18:00")), Shift::Afternoon);
        assert_eq!(Shift::from_time_slot(&slot("18:00-19:00")), Shift::Evening);
    }

    #[test]
    fn test_status_labels_parse_case_insensitively() {
        assert_eq!("in_progress".parse::<VisitStatus>(), Ok(VisitStatus::InProgress));
        assert_eq!("ALL_DAY".parse::<Shift>(), Ok(Shift::AllDay));
        let err = "maybe".parse::<FeeStatus>().expect_err("should reject unknown label");
        assert_eq!(err.kind, "fee status");
    }

    #[test]
    fn test_only_unseen_can_be_cancelled() {
        assert_eq!(
            VisitStatus::Unseen.apply(VisitTransition::Cancel),
            Some(VisitStatus::Cancelled)
        );
        for status in [VisitStatus::InProgress, VisitStatus::Seen, VisitStatus::Cancelled] {
            assert_eq!(status.apply(VisitTransition::Cancel), None, "{status}");
        }
    }

    #[test]
    fn test_restore_only_from_cancelled() {
        assert_eq!(
            VisitStatus::Cancelled.apply(VisitTransition::Restore),
            Some(VisitStatus::Unseen)
        );
        for status in [VisitStatus::Unseen, VisitStatus::InProgress, VisitStatus::Seen] {
            assert_eq!(status.apply(VisitTransition::Restore), None, "{status}");
        }
    }

    #[test]
    fn test_consultation_path() {
        assert_eq!(
            VisitStatus::Unseen.apply(VisitTransition::StartConsultation),
            Some(VisitStatus::InProgress)
        );
        assert_eq!(
            VisitStatus::InProgress.apply(VisitTransition::StartConsultation),
            Some(VisitStatus::InProgress)
        );
        assert_eq!(
            VisitStatus::InProgress.apply(VisitTransition::SubmitConsultation),
            Some(VisitStatus::Seen)
        );
        assert_eq!(VisitStatus::Unseen.apply(VisitTransition::SubmitConsultation), None);
        assert_eq!(VisitStatus::Seen.apply(VisitTransition::StartConsultation), None);
    }
}
