//! Database models.

use diesel::prelude::*;

use adms_core::{
    AttendanceSession, CheckoutMethod, CommandStatus, CommandType, Device, DeviceCommand,
    Enrollment, Person, PersonRef, PunchLog, PunchType, SessionStatus, Status, TzOffset,
    VerifyMethod,
};

use crate::StoreError;
use crate::schema::{attendance_sessions, device_commands, devices, enrollments, persons, punch_logs};

pub(crate) fn utc(value: chrono::NaiveDateTime) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_naive_utc_and_offset(value, chrono::Utc)
}

fn person_ref(kind: &str, id: i64) -> Result<PersonRef, StoreError> {
    PersonRef::from_db(kind, id).map_err(|e| StoreError::Corrupt(e.to_string()))
}

/// Device record.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = devices)]
pub struct DeviceRow {
    pub id: i64,
    pub serial_number: String,
    pub tenant_id: i64,
    pub name: String,
    pub model: Option<String>,
    pub status: String,
    pub tz_offset_minutes: i32,
    pub last_sync_at: Option<chrono::NaiveDateTime>,
    pub created_at: chrono::NaiveDateTime,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Self {
            id: row.id,
            serial_number: row.serial_number,
            tenant_id: row.tenant_id,
            name: row.name,
            model: row.model,
            status: Status::from_db(&row.status),
            timezone_offset: TzOffset::from_minutes(row.tz_offset_minutes),
            last_sync_at: row.last_sync_at.map(utc),
            created_at: utc(row.created_at),
        }
    }
}

/// New device for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = devices)]
pub struct NewDevice<'a> {
    pub serial_number: &'a str,
    pub tenant_id: i64,
    pub name: &'a str,
    pub model: Option<&'a str>,
    pub status: &'a str,
    pub tz_offset_minutes: i32,
    pub created_at: chrono::NaiveDateTime,
}

/// Person directory record.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = persons)]
pub struct PersonRow {
    pub kind: String,
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub status: String,
}

impl TryFrom<PersonRow> for Person {
    type Error = StoreError;

    fn try_from(row: PersonRow) -> Result<Self, Self::Error> {
        Ok(Self {
            person: person_ref(&row.kind, row.id)?,
            tenant_id: row.tenant_id,
            name: row.name,
            status: Status::from_db(&row.status),
        })
    }
}

/// Enrollment record.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = enrollments)]
pub struct EnrollmentRow {
    pub id: i64,
    pub device_id: i64,
    pub device_user_id: String,
    pub person_kind: String,
    pub person_id: i64,
    pub status: String,
    pub created_at: chrono::NaiveDateTime,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = StoreError;

    fn try_from(row: EnrollmentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            device_id: row.device_id,
            person: person_ref(&row.person_kind, row.person_id)?,
            device_user_id: row.device_user_id,
            status: Status::from_db(&row.status),
            created_at: utc(row.created_at),
        })
    }
}

/// New enrollment for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = enrollments)]
pub struct NewEnrollment<'a> {
    pub device_id: i64,
    pub device_user_id: &'a str,
    pub person_kind: &'a str,
    pub person_id: i64,
    pub status: &'a str,
    pub created_at: chrono::NaiveDateTime,
}

/// Punch log record.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = punch_logs)]
pub struct PunchLogRow {
    pub id: i64,
    pub device_id: i64,
    pub device_user_id: String,
    pub punch_time: chrono::NaiveDateTime,
    pub punch_type: String,
    pub verify_method: i32,
    pub processed: bool,
    pub error: Option<String>,
    pub created_at: chrono::NaiveDateTime,
}

impl From<PunchLogRow> for PunchLog {
    fn from(row: PunchLogRow) -> Self {
        Self {
            id: row.id,
            device_id: row.device_id,
            device_user_id: row.device_user_id,
            punch_time: utc(row.punch_time),
            punch_type: PunchType::from_db(&row.punch_type),
            verify_method: VerifyMethod::from_code(row.verify_method),
            processed: row.processed,
            error: row.error,
            created_at: utc(row.created_at),
        }
    }
}

/// New punch log for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = punch_logs)]
pub struct NewPunchLogRow<'a> {
    pub device_id: i64,
    pub device_user_id: &'a str,
    pub punch_time: chrono::NaiveDateTime,
    pub punch_type: &'a str,
    pub verify_method: i32,
    pub processed: bool,
    pub error: Option<&'a str>,
    pub created_at: chrono::NaiveDateTime,
}

/// Attendance session record.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = attendance_sessions)]
pub struct SessionRow {
    pub id: i64,
    pub tenant_id: i64,
    pub person_kind: String,
    pub person_id: i64,
    pub checkin_time: chrono::NaiveDateTime,
    pub checkout_time: Option<chrono::NaiveDateTime>,
    pub checkout_method: Option<String>,
    pub status: String,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

impl TryFrom<SessionRow> for AttendanceSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            tenant_id: row.tenant_id,
            person: person_ref(&row.person_kind, row.person_id)?,
            checkin_time: utc(row.checkin_time),
            checkout_time: row.checkout_time.map(utc),
            checkout_method: row.checkout_method.as_deref().and_then(CheckoutMethod::from_db),
            status: SessionStatus::from_db(&row.status),
        })
    }
}

/// New attendance session for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = attendance_sessions)]
pub struct NewSession<'a> {
    pub tenant_id: i64,
    pub person_kind: &'a str,
    pub person_id: i64,
    pub checkin_time: chrono::NaiveDateTime,
    pub status: &'a str,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

/// Device command record.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = device_commands)]
pub struct CommandRow {
    pub id: i64,
    pub uuid: String,
    pub device_id: i64,
    pub command_type: String,
    pub payload: String,
    pub status: String,
    pub created_at: chrono::NaiveDateTime,
    pub sent_at: Option<chrono::NaiveDateTime>,
    pub executed_at: Option<chrono::NaiveDateTime>,
    pub return_value: Option<String>,
}

impl From<CommandRow> for DeviceCommand {
    fn from(row: CommandRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            device_id: row.device_id,
            command_type: CommandType::from_db(&row.command_type),
            payload: row.payload,
            status: CommandStatus::from_db(&row.status),
            created_at: utc(row.created_at),
            sent_at: row.sent_at.map(utc),
            executed_at: row.executed_at.map(utc),
            return_value: row.return_value,
        }
    }
}

/// New command for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = device_commands)]
pub struct NewCommand<'a> {
    pub uuid: &'a str,
    pub device_id: i64,
    pub command_type: &'a str,
    pub payload: &'a str,
    pub status: &'a str,
    pub created_at: chrono::NaiveDateTime,
}
