//! Storage traits.

use adms_core::{
    AckOutcome, AttendanceSession, CommandType, Device, DeviceCommand, DeviceMetadata, Enrollment,
    NewPunchLog, Person, PersonRef, PunchLog, SessionClose, Status,
};
use chrono::{DateTime, Utc};

use crate::StoreError;

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Device registry storage.
pub trait DeviceStore: Send + Sync {
    /// Insert a device. Fails with `Conflict` if the serial number is taken.
    fn create_device(
        &self,
        serial_number: &str,
        metadata: &DeviceMetadata,
        now: DateTime<Utc>,
    ) -> StoreResult<Device>;

    /// Look up a device by serial number.
    fn device_by_serial(&self, serial_number: &str) -> StoreResult<Option<Device>>;

    /// Stamp the last-sync time. Returns `false` for unknown serials.
    fn touch_device(&self, serial_number: &str, now: DateTime<Utc>) -> StoreResult<bool>;

    /// Change a device's status.
    fn set_device_status(&self, serial_number: &str, status: Status)
    -> StoreResult<Option<Device>>;

    /// All devices, by serial number.
    fn list_devices(&self) -> StoreResult<Vec<Device>>;
}

/// Person directory mirror.
pub trait PersonStore: Send + Sync {
    /// Insert or replace a person.
    fn upsert_person(&self, person: &Person) -> StoreResult<()>;

    /// Look up a person.
    fn person(&self, person: PersonRef) -> StoreResult<Option<Person>>;
}

/// Enrollment storage.
pub trait EnrollmentStore: Send + Sync {
    /// Bind a device user id to a person. Fails with `Conflict` if either pair exists.
    fn create_enrollment(
        &self,
        device_id: i64,
        device_user_id: &str,
        person: PersonRef,
        now: DateTime<Utc>,
    ) -> StoreResult<Enrollment>;

    /// Look up the enrollment for a device user id.
    fn enrollment_by_user(
        &self,
        device_id: i64,
        device_user_id: &str,
    ) -> StoreResult<Option<Enrollment>>;

    /// Remove a person's enrollment from a device, returning what was removed.
    fn delete_enrollment(&self, device_id: i64, person: PersonRef)
    -> StoreResult<Option<Enrollment>>;

    /// All enrollments on a device.
    fn list_enrollments(&self, device_id: i64) -> StoreResult<Vec<Enrollment>>;
}

/// Append-only punch log.
pub trait PunchLogStore: Send + Sync {
    /// Append a punch log row.
    fn append_punch_log(&self, log: &NewPunchLog, now: DateTime<Utc>) -> StoreResult<PunchLog>;

    /// Most recent punch logs for a device.
    fn punch_logs(&self, device_id: i64, limit: i64) -> StoreResult<Vec<PunchLog>>;
}

/// Writes applied to a person's sessions in one transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionWrite {
    /// Open session to close.
    pub close: Option<SessionClose>,
    /// Open a new session at this instant.
    pub open_at: Option<DateTime<Utc>>,
}

/// Sessions touched by a [`SessionWrite`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionWriteResult {
    /// The session that was closed.
    pub closed: Option<AttendanceSession>,
    /// The session that was opened.
    pub opened: Option<AttendanceSession>,
}

/// Attendance session storage.
pub trait SessionStore: Send + Sync {
    /// The person's open session, if any.
    fn open_session(&self, person: PersonRef) -> StoreResult<Option<AttendanceSession>>;

    /// Apply `write` atomically, provided the person's open session is still
    /// `expected_open`. Fails with `Conflict` otherwise.
    fn write_session(
        &self,
        person: PersonRef,
        tenant_id: i64,
        expected_open: Option<i64>,
        write: &SessionWrite,
        now: DateTime<Utc>,
    ) -> StoreResult<SessionWriteResult>;

    /// Close a session if it is still open. Returns `None` if it was not.
    fn close_session(
        &self,
        close: &SessionClose,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AttendanceSession>>;

    /// Every open session.
    fn open_sessions(&self) -> StoreResult<Vec<AttendanceSession>>;

    /// A person's sessions, oldest first.
    fn sessions_for(&self, person: PersonRef) -> StoreResult<Vec<AttendanceSession>>;
}

/// A session write planned against the open session the caller observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedSession {
    /// Whose sessions are written.
    pub person: PersonRef,
    /// Tenant stamped on an opened session.
    pub tenant_id: i64,
    /// Open session seen when planning.
    pub expected_open: Option<i64>,
    /// What to change.
    pub write: SessionWrite,
}

/// A punch log row and the session change it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct PunchRecord {
    /// Row to append.
    pub log: NewPunchLog,
    /// A logged punch for the same device user this close makes the record a
    /// retransmission.
    pub dedup_window: chrono::Duration,
    /// Session change committed with the row, if any.
    pub session: Option<PlannedSession>,
}

/// What [`PunchStore::record_punch`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedPunch {
    /// A punch already logged within the window; nothing was written.
    Duplicate,
    /// The row was appended and the session change applied.
    Recorded {
        /// The appended row.
        log: PunchLog,
        /// Sessions touched.
        sessions: SessionWriteResult,
    },
}

/// Punch recording that keeps the log and sessions in step.
pub trait PunchStore: PunchLogStore + SessionStore {
    /// In one transaction: drop the record as a retransmission if a punch for
    /// the same device user is already logged within the window, otherwise
    /// apply the planned session write (failing with `Conflict` if the open
    /// session moved) and append the log row.
    fn record_punch(&self, record: &PunchRecord, now: DateTime<Utc>)
    -> StoreResult<RecordedPunch>;
}

/// Device command queue storage.
pub trait CommandStore: Send + Sync {
    /// Queue a command for a device.
    fn enqueue_command(
        &self,
        device_id: i64,
        command_type: CommandType,
        payload: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<DeviceCommand>;

    /// Atomically take every pending command for a device, oldest first,
    /// marking each as sent.
    fn drain_commands(&self, device_id: i64, now: DateTime<Utc>)
    -> StoreResult<Vec<DeviceCommand>>;

    /// Record a device's acknowledgement of a command.
    fn acknowledge_command(
        &self,
        device_id: i64,
        uuid: &str,
        success: bool,
        return_value: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<AckOutcome>;

    /// Look up a command.
    fn command_by_uuid(&self, uuid: &str) -> StoreResult<Option<DeviceCommand>>;

    /// All commands for a device, oldest first.
    fn list_commands(&self, device_id: i64) -> StoreResult<Vec<DeviceCommand>>;
}

/// Combined storage trait.
pub trait AllStorage:
    DeviceStore + PersonStore + EnrollmentStore + PunchStore + CommandStore
{
}

impl<T> AllStorage for T where
    T: DeviceStore + PersonStore + EnrollmentStore + PunchStore + CommandStore
{
}
