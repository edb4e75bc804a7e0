//! Request gate shared by the API front ends.
//!
//! Two checks run before a handler touches the core: the caller's API key must match the key
//! configured at startup, and the caller's role must be allowed to perform the requested action.
//! Both are plain allow/deny decisions; the core never sees identities.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("missing or unknown role")]
    UnknownRole,
    #[error("role {role} may not {action}")]
    Forbidden { role: Role, action: Action },
}

/// Validates the provided API key against the key resolved at startup.
///
/// # Errors
///
/// Returns `AuthError::MissingApiKey` if no key was sent, or `AuthError::InvalidApiKey` if it
/// does not match.
pub fn validate_api_key(provided_key: Option<&str>, expected_key: &str) -> Result<(), AuthError> {
    let provided_key = provided_key.ok_or(AuthError::MissingApiKey)?;
    if provided_key == expected_key {
        Ok(())
    } else {
        Err(AuthError::InvalidApiKey)
    }
}

/// Who is calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Front desk, cashier and pharmacy staff.
    Admin,
    Doctor,
    Patient,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Doctor => "DOCTOR",
            Role::Patient => "PATIENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            _ => Err(AuthError::UnknownRole),
        }
    }
}

/// Operations behind the role gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    BookRegistration,
    CancelRegistration,
    RestoreRegistration,
    ViewRegistration,
    ManageSchedule,
    ViewSchedule,
    Consult,
    ViewQueue,
    Pay,
    ViewBill,
    ViewDaySheet,
    Dispense,
    ManageMedicine,
    ViewMedicines,
    ViewAudit,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::BookRegistration => "book registrations",
            Action::CancelRegistration => "cancel registrations",
            Action::RestoreRegistration => "restore registrations",
            Action::ViewRegistration => "view registrations",
            Action::ManageSchedule => "manage schedules",
            Action::ViewSchedule => "view schedules",
            Action::Consult => "record consultations",
            Action::ViewQueue => "view the doctor queue",
            Action::Pay => "take payments",
            Action::ViewBill => "view bills",
            Action::ViewDaySheet => "view the cashier day sheet",
            Action::Dispense => "dispense medicine",
            Action::ManageMedicine => "manage medicines",
            Action::ViewMedicines => "view medicines",
            Action::ViewAudit => "view the audit log",
        })
    }
}

/// Whether `role` may perform `action`.
pub fn permits(role: Role, action: Action) -> bool {
    use Action::*;

    match role {
        Role::Admin => !matches!(action, Consult),
        Role::Doctor => matches!(
            action,
            Consult | ViewQueue | ViewSchedule | ViewRegistration | ViewMedicines
        ),
        Role::Patient => matches!(
            action,
            BookRegistration | Pay | ViewBill | ViewSchedule | ViewRegistration
        ),
    }
}

/// Runs both checks for one request.
///
/// # Errors
///
/// Returns the first failing check as an `AuthError`.
pub fn authorise(
    provided_key: Option<&str>,
    expected_key: &str,
    role: Option<&str>,
    action: Action,
) -> Result<Role, AuthError> {
    validate_api_key(provided_key, expected_key)?;
    let role: Role = role.ok_or(AuthError::UnknownRole)?.parse()?;
    if permits(role, action) {
        Ok(role)
    } else {
        Err(AuthError::Forbidden { role, action })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_must_match() {
        assert_eq!(validate_api_key(Some("secret"), "secret"), Ok(()));
        assert_eq!(
            validate_api_key(Some("guess"), "secret"),
            Err(AuthError::InvalidApiKey)
        );
        assert_eq!(validate_api_key(None, "secret"), Err(AuthError::MissingApiKey));
    }

    #[test]
    fn test_roles_split_front_desk_and_consulting_room() {
        assert!(permits(Role::Admin, Action::Dispense));
        assert!(permits(Role::Admin, Action::CancelRegistration));
        assert!(!permits(Role::Admin, Action::Consult));
        assert!(permits(Role::Doctor, Action::Consult));
        assert!(!permits(Role::Doctor, Action::Dispense));
        assert!(permits(Role::Patient, Action::BookRegistration));
        assert!(!permits(Role::Patient, Action::CancelRegistration));
        assert!(permits(Role::Admin, Action::ViewDaySheet));
        assert!(permits(Role::Patient, Action::ViewBill));
        assert!(!permits(Role::Patient, Action::ViewDaySheet));
        assert!(!permits(Role::Doctor, Action::ViewDaySheet));
    }

    #[test]
    fn test_authorise_reports_first_failure() {
        assert_eq!(
            authorise(Some("k"), "k", Some("doctor"), Action::Consult),
            Ok(Role::Doctor)
        );
        assert_eq!(
            authorise(Some("k"), "k", Some("nurse"), Action::Consult),
            Err(AuthError::UnknownRole)
        );
        assert_eq!(
            authorise(Some("x"), "k", Some("admin"), Action::Pay),
            Err(AuthError::InvalidApiKey)
        );
        assert!(matches!(
            authorise(Some("k"), "k", Some("PATIENT"), Action::Dispense),
            Err(AuthError::Forbidden {
                role: Role::Patient,
                ..
            })
        ));
    }
}
