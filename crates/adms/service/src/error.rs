//! Service errors.

use adms_core::PersonRef;
use adms_storage::StoreError;

/// Protocol-level rejection of a device request.
///
/// Devices are embedded peers, so these are rendered as a terse
/// `ERROR: <reason>` body rather than a structured error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Serial number is not registered.
    #[error("unknown device {0}")]
    UnknownDevice(String),
    /// Device is registered but inactive.
    #[error("device {0} is inactive")]
    InactiveDevice(String),
    /// The server could not record anything for this request.
    #[error("server unavailable")]
    Unavailable,
}

impl Rejection {
    /// Body sent back to the device.
    pub fn body(&self) -> String {
        format!("ERROR: {}", self)
    }
}

/// Why a punch was recorded but not applied to attendance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PunchRejection {
    /// No enrollment for the device user id.
    #[error("device user {0} is not enrolled on this device")]
    NotEnrolled(String),
    /// Enrollment exists but is inactive.
    #[error("enrollment for device user {0} is inactive")]
    EnrollmentInactive(String),
    /// The enrolled person is not in the directory.
    #[error("{0} not found")]
    PersonMissing(PersonRef),
    /// The enrolled person is inactive.
    #[error("{0} is inactive")]
    PersonInactive(PersonRef),
}

/// Failure of an attendance state transition.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    /// A check-out was requested with nothing open.
    #[error("no open session for {0}")]
    NoOpenSession(PersonRef),
    /// The punch is older than the currently open session.
    #[error("punch precedes open session {session_id}")]
    OutOfOrder {
        /// The open session.
        session_id: i64,
    },
    /// Concurrent writers kept changing the person's open session.
    #[error("session for {0} changed concurrently")]
    Contended(PersonRef),
    /// Session store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced to administrative callers.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// Uniqueness rule violated.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Attendance transition failed.
    #[error(transparent)]
    Attendance(AttendanceError),
    /// Storage failure.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AdminError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(message) => Self::Conflict(message),
            other => Self::Store(other),
        }
    }
}

impl From<AttendanceError> for AdminError {
    fn from(error: AttendanceError) -> Self {
        match error {
            AttendanceError::NoOpenSession(person) => {
                Self::NotFound(format!("open session for {}", person))
            }
            other => Self::Attendance(other),
        }
    }
}
