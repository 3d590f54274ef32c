//! SQLite storage implementation.

use adms_core::{
    AckOutcome, AttendanceSession, CommandStatus, CommandType, Device, DeviceCommand,
    DeviceMetadata, Enrollment, NewPunchLog, Person, PersonRef, PunchLog, SessionClose,
    SessionStatus, Status,
};
use chrono::{DateTime, Utc};
use color_eyre::eyre::WrapErr as _;
use diesel::connection::SimpleConnection as _;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;

use crate::StoreError;
use crate::models::*;
use crate::schema::*;
use crate::traits::*;

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

/// Per-connection settings: wait on locks instead of failing, WAL, FK checks.
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// SQLite-based storage.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database URL.
    pub fn new(database_url: &str) -> color_eyre::eyre::Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(10)
            .connection_customizer(Box::new(ConnectionPragmas))
            .build(manager)
            .wrap_err("failed to create connection pool")?;

        Ok(Self { pool })
    }

    /// Run migrations.
    pub fn run_migrations(&self) -> color_eyre::eyre::Result<()> {
        use diesel_migrations::MigrationHarness as _;

        let mut conn = self
            .pool
            .get()
            .wrap_err("failed to get connection for migrations")?;

        let applied = conn
            .run_pending_migrations(crate::MIGRATIONS)
            .map_err(|e| color_eyre::eyre::eyre!("migration failed: {}", e))?;

        if !applied.is_empty() {
            tracing::info!(count = applied.len(), "applied migrations");
        }

        Ok(())
    }

    fn conn(&self) -> StoreResult<PooledConnection<ConnectionManager<SqliteConnection>>> {
        Ok(self.pool.get()?)
    }
}

impl DeviceStore for SqliteStorage {
    fn create_device(
        &self,
        serial_number: &str,
        metadata: &DeviceMetadata,
        now: DateTime<Utc>,
    ) -> StoreResult<Device> {
        let mut conn = self.conn()?;

        let new_device = NewDevice {
            serial_number,
            tenant_id: metadata.tenant_id,
            name: &metadata.name,
            model: metadata.model.as_deref(),
            status: Status::Active.as_str(),
            tz_offset_minutes: metadata.timezone_offset.minutes(),
            created_at: now.naive_utc(),
        };

        diesel::insert_into(devices::table)
            .values(&new_device)
            .execute(&mut conn)?;

        let row = devices::table
            .filter(devices::serial_number.eq(serial_number))
            .select(DeviceRow::as_select())
            .first(&mut conn)?;

        Ok(row.into())
    }

    fn device_by_serial(&self, serial_number: &str) -> StoreResult<Option<Device>> {
        let mut conn = self.conn()?;

        let row = devices::table
            .filter(devices::serial_number.eq(serial_number))
            .select(DeviceRow::as_select())
            .first(&mut conn)
            .optional()?;

        Ok(row.map(Device::from))
    }

    fn touch_device(&self, serial_number: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut conn = self.conn()?;

        let updated = diesel::update(devices::table.filter(devices::serial_number.eq(serial_number)))
            .set(devices::last_sync_at.eq(Some(now.naive_utc())))
            .execute(&mut conn)?;

        Ok(updated > 0)
    }

    fn set_device_status(
        &self,
        serial_number: &str,
        status: Status,
    ) -> StoreResult<Option<Device>> {
        let mut conn = self.conn()?;

        diesel::update(devices::table.filter(devices::serial_number.eq(serial_number)))
            .set(devices::status.eq(status.as_str()))
            .execute(&mut conn)?;

        drop(conn);
        self.device_by_serial(serial_number)
    }

    fn list_devices(&self) -> StoreResult<Vec<Device>> {
        let mut conn = self.conn()?;

        let rows = devices::table
            .order(devices::serial_number.asc())
            .select(DeviceRow::as_select())
            .load(&mut conn)?;

        Ok(rows.into_iter().map(Device::from).collect())
    }
}

impl PersonStore for SqliteStorage {
    fn upsert_person(&self, person: &Person) -> StoreResult<()> {
        let mut conn = self.conn()?;

        let row = PersonRow {
            kind: person.person.kind().as_str().to_string(),
            id: person.person.id(),
            tenant_id: person.tenant_id,
            name: person.name.clone(),
            status: person.status.as_str().to_string(),
        };

        diesel::insert_into(persons::table)
            .values(&row)
            .on_conflict((persons::kind, persons::id))
            .do_update()
            .set((
                persons::tenant_id.eq(row.tenant_id),
                persons::name.eq(&row.name),
                persons::status.eq(&row.status),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    fn person(&self, person: PersonRef) -> StoreResult<Option<Person>> {
        let mut conn = self.conn()?;

        let row = persons::table
            .filter(persons::kind.eq(person.kind().as_str()))
            .filter(persons::id.eq(person.id()))
            .select(PersonRow::as_select())
            .first(&mut conn)
            .optional()?;

        row.map(Person::try_from).transpose()
    }
}

impl EnrollmentStore for SqliteStorage {
    fn create_enrollment(
        &self,
        device_id: i64,
        device_user_id: &str,
        person: PersonRef,
        now: DateTime<Utc>,
    ) -> StoreResult<Enrollment> {
        let mut conn = self.conn()?;

        let new_enrollment = NewEnrollment {
            device_id,
            device_user_id,
            person_kind: person.kind().as_str(),
            person_id: person.id(),
            status: Status::Active.as_str(),
            created_at: now.naive_utc(),
        };

        diesel::insert_into(enrollments::table)
            .values(&new_enrollment)
            .execute(&mut conn)?;

        let row = enrollments::table
            .filter(enrollments::device_id.eq(device_id))
            .filter(enrollments::device_user_id.eq(device_user_id))
            .select(EnrollmentRow::as_select())
            .first(&mut conn)?;

        Enrollment::try_from(row)
    }

    fn enrollment_by_user(
        &self,
        device_id: i64,
        device_user_id: &str,
    ) -> StoreResult<Option<Enrollment>> {
        let mut conn = self.conn()?;

        let row = enrollments::table
            .filter(enrollments::device_id.eq(device_id))
            .filter(enrollments::device_user_id.eq(device_user_id))
            .select(EnrollmentRow::as_select())
            .first(&mut conn)
            .optional()?;

        row.map(Enrollment::try_from).transpose()
    }

    fn delete_enrollment(
        &self,
        device_id: i64,
        person: PersonRef,
    ) -> StoreResult<Option<Enrollment>> {
        let mut conn = self.conn()?;

        conn.immediate_transaction(|conn| {
            let row = enrollments::table
                .filter(enrollments::device_id.eq(device_id))
                .filter(enrollments::person_kind.eq(person.kind().as_str()))
                .filter(enrollments::person_id.eq(person.id()))
                .select(EnrollmentRow::as_select())
                .first(conn)
                .optional()?;

            let Some(row) = row else {
                return Ok(None);
            };

            diesel::delete(enrollments::table.find(row.id)).execute(conn)?;

            Enrollment::try_from(row).map(Some)
        })
    }

    fn list_enrollments(&self, device_id: i64) -> StoreResult<Vec<Enrollment>> {
        let mut conn = self.conn()?;

        enrollments::table
            .filter(enrollments::device_id.eq(device_id))
            .order(enrollments::id.asc())
            .select(EnrollmentRow::as_select())
            .load(&mut conn)?
            .into_iter()
            .map(Enrollment::try_from)
            .collect()
    }
}

fn insert_punch_log(
    conn: &mut SqliteConnection,
    log: &NewPunchLog,
    now: DateTime<Utc>,
) -> StoreResult<PunchLog> {
    let new_log = NewPunchLogRow {
        device_id: log.device_id,
        device_user_id: &log.device_user_id,
        punch_time: log.punch_time.naive_utc(),
        punch_type: log.punch_type.as_str(),
        verify_method: log.verify_method.code(),
        processed: log.processed,
        error: log.error.as_deref(),
        created_at: now.naive_utc(),
    };

    diesel::insert_into(punch_logs::table)
        .values(&new_log)
        .execute(conn)?;

    let row = punch_logs::table
        .order(punch_logs::id.desc())
        .select(PunchLogRow::as_select())
        .first(conn)?;

    Ok(row.into())
}

/// Whether a punch for the device user is logged within `window` of `at`, bounds inclusive.
fn punch_logged_near(
    conn: &mut SqliteConnection,
    log: &NewPunchLog,
    window: chrono::Duration,
) -> StoreResult<bool> {
    let at = log.punch_time;
    let count: i64 = punch_logs::table
        .filter(punch_logs::device_id.eq(log.device_id))
        .filter(punch_logs::device_user_id.eq(&log.device_user_id))
        .filter(
            punch_logs::punch_time.between((at - window).naive_utc(), (at + window).naive_utc()),
        )
        .count()
        .get_result(conn)?;

    Ok(count > 0)
}

impl PunchLogStore for SqliteStorage {
    fn append_punch_log(&self, log: &NewPunchLog, now: DateTime<Utc>) -> StoreResult<PunchLog> {
        let mut conn = self.conn()?;

        conn.immediate_transaction(|conn| insert_punch_log(conn, log, now))
    }

    fn punch_logs(&self, device_id: i64, limit: i64) -> StoreResult<Vec<PunchLog>> {
        let mut conn = self.conn()?;

        let rows = punch_logs::table
            .filter(punch_logs::device_id.eq(device_id))
            .order(punch_logs::id.desc())
            .limit(limit)
            .select(PunchLogRow::as_select())
            .load(&mut conn)?;

        Ok(rows.into_iter().map(PunchLog::from).collect())
    }
}

impl PunchStore for SqliteStorage {
    fn record_punch(
        &self,
        record: &PunchRecord,
        now: DateTime<Utc>,
    ) -> StoreResult<RecordedPunch> {
        let mut conn = self.conn()?;

        // IMMEDIATE takes the write lock up front, so concurrent deliveries of
        // one punch see each other's rows.
        conn.immediate_transaction(|conn| {
            if punch_logged_near(conn, &record.log, record.dedup_window)? {
                return Ok(RecordedPunch::Duplicate);
            }

            let sessions = match &record.session {
                Some(planned) => write_session_in(conn, planned, now)?,
                None => SessionWriteResult::default(),
            };

            let log = insert_punch_log(conn, &record.log, now)?;

            Ok(RecordedPunch::Recorded { log, sessions })
        })
    }
}

fn open_session_row(
    conn: &mut SqliteConnection,
    person: PersonRef,
) -> StoreResult<Option<SessionRow>> {
    Ok(attendance_sessions::table
        .filter(attendance_sessions::person_kind.eq(person.kind().as_str()))
        .filter(attendance_sessions::person_id.eq(person.id()))
        .filter(attendance_sessions::checkout_time.is_null())
        .select(SessionRow::as_select())
        .first(conn)
        .optional()?)
}

fn close_session_in(
    conn: &mut SqliteConnection,
    close: &SessionClose,
    now: DateTime<Utc>,
) -> StoreResult<Option<AttendanceSession>> {
    let updated = diesel::update(
        attendance_sessions::table
            .filter(attendance_sessions::id.eq(close.session_id))
            .filter(attendance_sessions::checkout_time.is_null()),
    )
    .set((
        attendance_sessions::checkout_time.eq(Some(close.checkout_time.naive_utc())),
        attendance_sessions::checkout_method.eq(Some(close.method.as_str())),
        attendance_sessions::status.eq(SessionStatus::CheckedOut.as_str()),
        attendance_sessions::updated_at.eq(now.naive_utc()),
    ))
    .execute(conn)?;

    if updated == 0 {
        return Ok(None);
    }

    let row = attendance_sessions::table
        .find(close.session_id)
        .select(SessionRow::as_select())
        .first(conn)?;

    AttendanceSession::try_from(row).map(Some)
}

fn write_session_in(
    conn: &mut SqliteConnection,
    planned: &PlannedSession,
    now: DateTime<Utc>,
) -> StoreResult<SessionWriteResult> {
    let person = planned.person;
    let current = open_session_row(conn, person)?.map(|row| row.id);
    if current != planned.expected_open {
        return Err(StoreError::Conflict(format!(
            "open session for {} changed concurrently",
            person
        )));
    }

    let mut result = SessionWriteResult::default();

    if let Some(close) = &planned.write.close {
        let closed = close_session_in(conn, close, now)?.ok_or_else(|| {
            StoreError::Conflict(format!("session {} is not open", close.session_id))
        })?;
        result.closed = Some(closed);
    }

    if let Some(at) = planned.write.open_at {
        let new_session = NewSession {
            tenant_id: planned.tenant_id,
            person_kind: person.kind().as_str(),
            person_id: person.id(),
            checkin_time: at.naive_utc(),
            status: SessionStatus::CheckedIn.as_str(),
            created_at: now.naive_utc(),
            updated_at: now.naive_utc(),
        };

        diesel::insert_into(attendance_sessions::table)
            .values(&new_session)
            .execute(conn)?;

        let opened = open_session_row(conn, person)?.ok_or_else(|| {
            StoreError::Conflict(format!("session for {} vanished after insert", person))
        })?;
        result.opened = Some(AttendanceSession::try_from(opened)?);
    }

    Ok(result)
}

impl SessionStore for SqliteStorage {
    fn open_session(&self, person: PersonRef) -> StoreResult<Option<AttendanceSession>> {
        let mut conn = self.conn()?;

        open_session_row(&mut conn, person)?
            .map(AttendanceSession::try_from)
            .transpose()
    }

    fn write_session(
        &self,
        person: PersonRef,
        tenant_id: i64,
        expected_open: Option<i64>,
        write: &SessionWrite,
        now: DateTime<Utc>,
    ) -> StoreResult<SessionWriteResult> {
        let mut conn = self.conn()?;
        let planned = PlannedSession {
            person,
            tenant_id,
            expected_open,
            write: *write,
        };

        conn.immediate_transaction(|conn| write_session_in(conn, &planned, now))
    }

    fn close_session(
        &self,
        close: &SessionClose,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<AttendanceSession>> {
        let mut conn = self.conn()?;

        conn.immediate_transaction(|conn| close_session_in(conn, close, now))
    }

    fn open_sessions(&self) -> StoreResult<Vec<AttendanceSession>> {
        let mut conn = self.conn()?;

        attendance_sessions::table
            .filter(attendance_sessions::checkout_time.is_null())
            .order(attendance_sessions::id.asc())
            .select(SessionRow::as_select())
            .load(&mut conn)?
            .into_iter()
            .map(AttendanceSession::try_from)
            .collect()
    }

    fn sessions_for(&self, person: PersonRef) -> StoreResult<Vec<AttendanceSession>> {
        let mut conn = self.conn()?;

        attendance_sessions::table
            .filter(attendance_sessions::person_kind.eq(person.kind().as_str()))
            .filter(attendance_sessions::person_id.eq(person.id()))
            .order((
                attendance_sessions::checkin_time.asc(),
                attendance_sessions::id.asc(),
            ))
            .select(SessionRow::as_select())
            .load(&mut conn)?
            .into_iter()
            .map(AttendanceSession::try_from)
            .collect()
    }
}

impl CommandStore for SqliteStorage {
    fn enqueue_command(
        &self,
        device_id: i64,
        command_type: CommandType,
        payload: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<DeviceCommand> {
        let mut conn = self.conn()?;
        let uuid = adms_core::new_command_uuid();

        let new_command = NewCommand {
            uuid: &uuid,
            device_id,
            command_type: command_type.as_str(),
            payload,
            status: CommandStatus::Pending.as_str(),
            created_at: now.naive_utc(),
        };

        diesel::insert_into(device_commands::table)
            .values(&new_command)
            .execute(&mut conn)?;

        let row = device_commands::table
            .filter(device_commands::uuid.eq(&uuid))
            .select(CommandRow::as_select())
            .first(&mut conn)?;

        Ok(row.into())
    }

    fn drain_commands(
        &self,
        device_id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<DeviceCommand>> {
        let mut conn = self.conn()?;

        conn.immediate_transaction(|conn| {
            let rows = device_commands::table
                .filter(device_commands::device_id.eq(device_id))
                .filter(device_commands::status.eq(CommandStatus::Pending.as_str()))
                .order(device_commands::id.asc())
                .select(CommandRow::as_select())
                .load(conn)?;

            if rows.is_empty() {
                return Ok(Vec::new());
            }

            let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
            diesel::update(device_commands::table.filter(device_commands::id.eq_any(&ids)))
                .set((
                    device_commands::status.eq(CommandStatus::Sent.as_str()),
                    device_commands::sent_at.eq(Some(now.naive_utc())),
                ))
                .execute(conn)?;

            Ok(rows
                .into_iter()
                .map(|row| DeviceCommand {
                    status: CommandStatus::Sent,
                    sent_at: Some(now),
                    ..DeviceCommand::from(row)
                })
                .collect())
        })
    }

    fn acknowledge_command(
        &self,
        device_id: i64,
        uuid: &str,
        success: bool,
        return_value: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<AckOutcome> {
        let mut conn = self.conn()?;

        conn.immediate_transaction(|conn| {
            let row = device_commands::table
                .filter(device_commands::device_id.eq(device_id))
                .filter(device_commands::uuid.eq(uuid))
                .select(CommandRow::as_select())
                .first(conn)
                .optional()?;

            let Some(row) = row else {
                return Ok(AckOutcome::Unknown);
            };

            let command = DeviceCommand::from(row);
            if command.status.is_terminal() {
                return Ok(AckOutcome::AlreadyTerminal(command));
            }

            let status = if success {
                CommandStatus::Executed
            } else {
                CommandStatus::Failed
            };

            diesel::update(device_commands::table.find(command.id))
                .set((
                    device_commands::status.eq(status.as_str()),
                    device_commands::executed_at.eq(Some(now.naive_utc())),
                    device_commands::return_value.eq(Some(return_value)),
                ))
                .execute(conn)?;

            Ok(AckOutcome::Recorded(DeviceCommand {
                status,
                executed_at: Some(now),
                return_value: Some(return_value.to_string()),
                ..command
            }))
        })
    }

    fn command_by_uuid(&self, uuid: &str) -> StoreResult<Option<DeviceCommand>> {
        let mut conn = self.conn()?;

        let row = device_commands::table
            .filter(device_commands::uuid.eq(uuid))
            .select(CommandRow::as_select())
            .first(&mut conn)
            .optional()?;

        Ok(row.map(DeviceCommand::from))
    }

    fn list_commands(&self, device_id: i64) -> StoreResult<Vec<DeviceCommand>> {
        let mut conn = self.conn()?;

        let rows = device_commands::table
            .filter(device_commands::device_id.eq(device_id))
            .order(device_commands::id.asc())
            .select(CommandRow::as_select())
            .load(&mut conn)?;

        Ok(rows.into_iter().map(DeviceCommand::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adms_core::{CheckoutMethod, PunchType, TzOffset, VerifyMethod};

    fn storage() -> (SqliteStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("adms.db");
        let storage = SqliteStorage::new(url.to_str().unwrap()).unwrap();
        storage.run_migrations().unwrap();
        (storage, dir)
    }

    fn device(storage: &SqliteStorage, serial: &str) -> Device {
        let metadata = DeviceMetadata {
            tenant_id: 1,
            name: "Gate".into(),
            model: Some("SpeedFace".into()),
            timezone_offset: TzOffset::from_hours(1),
        };
        storage.create_device(serial, &metadata, Utc::now()).unwrap()
    }

    #[test]
    fn test_create_device_conflict() {
        let (storage, _dir) = storage();
        let created = device(&storage, "ZK001");
        assert_eq!(created.serial_number, "ZK001");
        assert_eq!(created.timezone_offset, TzOffset::from_hours(1));
        assert_eq!(created.status, Status::Active);

        let err = storage
            .create_device("ZK001", &DeviceMetadata::default(), Utc::now())
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_touch_device() {
        let (storage, _dir) = storage();
        device(&storage, "ZK001");

        assert!(!storage.touch_device("NOPE", Utc::now()).unwrap());
        assert!(storage.touch_device("ZK001", Utc::now()).unwrap());
        assert!(
            storage
                .device_by_serial("ZK001")
                .unwrap()
                .unwrap()
                .last_sync_at
                .is_some()
        );
    }

    #[test]
    fn test_enrollment_pairs_are_unique() {
        let (storage, _dir) = storage();
        let d = device(&storage, "ZK001");
        let now = Utc::now();

        storage
            .create_enrollment(d.id, "1001", PersonRef::Student(1), now)
            .unwrap();
        assert!(
            storage
                .create_enrollment(d.id, "1001", PersonRef::Student(2), now)
                .unwrap_err()
                .is_conflict()
        );
        assert!(
            storage
                .create_enrollment(d.id, "1002", PersonRef::Student(1), now)
                .unwrap_err()
                .is_conflict()
        );

        let found = storage.enrollment_by_user(d.id, "1001").unwrap().unwrap();
        assert_eq!(found.person, PersonRef::Student(1));

        let removed = storage
            .delete_enrollment(d.id, PersonRef::Student(1))
            .unwrap();
        assert!(removed.is_some());
        assert!(storage.enrollment_by_user(d.id, "1001").unwrap().is_none());
    }

    fn punch(device_id: i64, at: DateTime<Utc>) -> NewPunchLog {
        NewPunchLog {
            device_id,
            device_user_id: "1001".into(),
            punch_time: at,
            punch_type: PunchType::In,
            verify_method: VerifyMethod::Fingerprint,
            processed: true,
            error: None,
        }
    }

    fn check_in(person: PersonRef, at: DateTime<Utc>) -> PlannedSession {
        PlannedSession {
            person,
            tenant_id: 1,
            expected_open: None,
            write: SessionWrite {
                close: None,
                open_at: Some(at),
            },
        }
    }

    #[test]
    fn test_record_punch_window() {
        let (storage, _dir) = storage();
        let d = device(&storage, "ZK001");
        let at = Utc::now();
        let window = chrono::Duration::seconds(60);

        let record = |offset: i64| PunchRecord {
            log: punch(d.id, at + chrono::Duration::seconds(offset)),
            dedup_window: window,
            session: None,
        };

        assert!(matches!(
            storage.record_punch(&record(0), at).unwrap(),
            RecordedPunch::Recorded { .. }
        ));
        assert_eq!(storage.record_punch(&record(0), at).unwrap(), RecordedPunch::Duplicate);
        assert_eq!(storage.record_punch(&record(60), at).unwrap(), RecordedPunch::Duplicate);
        assert_eq!(storage.record_punch(&record(-60), at).unwrap(), RecordedPunch::Duplicate);
        assert!(matches!(
            storage.record_punch(&record(61), at).unwrap(),
            RecordedPunch::Recorded { .. }
        ));

        let other_user = PunchRecord {
            log: NewPunchLog {
                device_user_id: "1002".into(),
                ..punch(d.id, at)
            },
            dedup_window: window,
            session: None,
        };
        assert!(matches!(
            storage.record_punch(&other_user, at).unwrap(),
            RecordedPunch::Recorded { .. }
        ));
        assert_eq!(storage.punch_logs(d.id, 10).unwrap().len(), 3);
    }

    #[test]
    fn test_record_punch_applies_session_with_log() {
        let (storage, _dir) = storage();
        let d = device(&storage, "ZK001");
        let person = PersonRef::Student(1);
        let at = Utc::now();

        let recorded = storage
            .record_punch(
                &PunchRecord {
                    log: punch(d.id, at),
                    dedup_window: chrono::Duration::seconds(60),
                    session: Some(check_in(person, at)),
                },
                at,
            )
            .unwrap();
        let RecordedPunch::Recorded { log, sessions } = recorded else {
            panic!("punch was not recorded");
        };
        assert!(log.processed);
        assert_eq!(sessions.opened.unwrap().checkin_time, at);

        // A stale plan loses and leaves no row behind.
        let err = storage
            .record_punch(
                &PunchRecord {
                    log: punch(d.id, at + chrono::Duration::minutes(5)),
                    dedup_window: chrono::Duration::seconds(60),
                    session: Some(check_in(person, at + chrono::Duration::minutes(5))),
                },
                at,
            )
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(storage.punch_logs(d.id, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_record_punch_rolls_back_session_when_log_fails() {
        let (storage, _dir) = storage();
        let person = PersonRef::Student(1);
        let at = Utc::now();

        // No such device: the log insert trips the foreign key after the
        // session write.
        let err = storage
            .record_punch(
                &PunchRecord {
                    log: punch(404, at),
                    dedup_window: chrono::Duration::seconds(60),
                    session: Some(check_in(person, at)),
                },
                at,
            )
            .unwrap_err();
        assert!(!err.is_conflict());
        assert!(storage.open_session(person).unwrap().is_none());
        assert!(storage.sessions_for(person).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_delivery_records_once() {
        let (storage, _dir) = storage();
        let d = device(&storage, "ZK001");
        let person = PersonRef::Student(1);
        let at = Utc::now();

        let record = PunchRecord {
            log: punch(d.id, at),
            dedup_window: chrono::Duration::seconds(60),
            session: Some(check_in(person, at)),
        };

        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| storage.record_punch(&record, at)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        let recorded = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Ok(RecordedPunch::Recorded { .. })))
            .count();
        assert_eq!(recorded, 1);
        assert!(
            outcomes
                .iter()
                .all(|outcome| matches!(outcome, Ok(RecordedPunch::Duplicate | RecordedPunch::Recorded { .. })))
        );
        assert_eq!(storage.punch_logs(d.id, 10).unwrap().len(), 1);
        assert_eq!(storage.sessions_for(person).unwrap().len(), 1);
    }

    #[test]
    fn test_write_session_checks_expected_open() {
        let (storage, _dir) = storage();
        let person = PersonRef::Staff(9);
        let now = Utc::now();

        let opened = storage
            .write_session(
                person,
                1,
                None,
                &SessionWrite {
                    close: None,
                    open_at: Some(now),
                },
                now,
            )
            .unwrap()
            .opened
            .unwrap();
        assert!(opened.is_open());

        // A second writer that still believes the person is out loses.
        let err = storage
            .write_session(
                person,
                1,
                None,
                &SessionWrite {
                    close: None,
                    open_at: Some(now),
                },
                now,
            )
            .unwrap_err();
        assert!(err.is_conflict());

        let closed = storage
            .write_session(
                person,
                1,
                Some(opened.id),
                &SessionWrite {
                    close: Some(SessionClose {
                        session_id: opened.id,
                        checkout_time: now + chrono::Duration::minutes(5),
                        method: CheckoutMethod::Biometric,
                    }),
                    open_at: None,
                },
                now,
            )
            .unwrap()
            .closed
            .unwrap();
        assert_eq!(closed.checkout_method, Some(CheckoutMethod::Biometric));
        assert_eq!(closed.status, SessionStatus::CheckedOut);
        assert!(storage.open_session(person).unwrap().is_none());
        assert_eq!(storage.sessions_for(person).unwrap().len(), 1);
    }

    #[test]
    fn test_close_session_only_once() {
        let (storage, _dir) = storage();
        let person = PersonRef::Student(3);
        let now = Utc::now();

        let opened = storage
            .write_session(
                person,
                1,
                None,
                &SessionWrite {
                    close: None,
                    open_at: Some(now),
                },
                now,
            )
            .unwrap()
            .opened
            .unwrap();

        let close = SessionClose {
            session_id: opened.id,
            checkout_time: now,
            method: CheckoutMethod::AutoCheckout,
        };
        assert!(storage.close_session(&close, now).unwrap().is_some());
        assert!(storage.close_session(&close, now).unwrap().is_none());
        assert!(storage.open_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_drain_is_fifo_and_single_shot() {
        let (storage, _dir) = storage();
        let d = device(&storage, "ZK001");
        let other = device(&storage, "ZK002");
        let now = Utc::now();

        let first = storage
            .enqueue_command(d.id, CommandType::Reboot, "REBOOT", now)
            .unwrap();
        let second = storage
            .enqueue_command(d.id, CommandType::Info, "INFO", now)
            .unwrap();
        storage
            .enqueue_command(other.id, CommandType::Info, "INFO", now)
            .unwrap();

        let drained = storage.drain_commands(d.id, now).unwrap();
        assert_eq!(
            drained.iter().map(|c| c.uuid.as_str()).collect::<Vec<_>>(),
            vec![first.uuid.as_str(), second.uuid.as_str()]
        );
        assert!(drained.iter().all(|c| c.status == CommandStatus::Sent));
        assert!(storage.drain_commands(d.id, now).unwrap().is_empty());
        assert_eq!(storage.drain_commands(other.id, now).unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_drains_never_share_a_command() {
        let (storage, _dir) = storage();
        let d = device(&storage, "ZK001");
        let now = Utc::now();

        let queued: Vec<String> = (0..20)
            .map(|_| {
                storage
                    .enqueue_command(d.id, CommandType::Info, "INFO", now)
                    .unwrap()
                    .uuid
            })
            .collect();

        let drained: Vec<Vec<DeviceCommand>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| storage.drain_commands(d.id, now).unwrap()))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        });

        let mut seen: Vec<String> = drained
            .into_iter()
            .flatten()
            .map(|command| command.uuid)
            .collect();
        assert_eq!(seen.len(), queued.len());
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), queued.len());
        assert!(storage.drain_commands(d.id, now).unwrap().is_empty());
    }

    #[test]
    fn test_acknowledge_is_idempotent() {
        let (storage, _dir) = storage();
        let d = device(&storage, "ZK001");
        let now = Utc::now();

        let cmd = storage
            .enqueue_command(d.id, CommandType::Reboot, "REBOOT", now)
            .unwrap();
        storage.drain_commands(d.id, now).unwrap();

        let first = storage
            .acknowledge_command(d.id, &cmd.uuid, false, "-1", now)
            .unwrap();
        match first {
            AckOutcome::Recorded(c) => {
                assert_eq!(c.status, CommandStatus::Failed);
                assert_eq!(c.return_value.as_deref(), Some("-1"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let again = storage
            .acknowledge_command(d.id, &cmd.uuid, true, "0", now)
            .unwrap();
        assert!(matches!(again, AckOutcome::AlreadyTerminal(c) if c.status == CommandStatus::Failed));

        assert_eq!(
            storage
                .acknowledge_command(d.id, "missing", true, "0", now)
                .unwrap(),
            AckOutcome::Unknown
        );
    }
}
