//! Attendance session driver.
//!
//! Classification is pure (see [`adms_core::classify`]); this module reads the
//! person's open session, commits the resulting transition optimistically and
//! reclassifies once if another writer got there first. Punches commit through
//! [`PunchStore::record_punch`] so the dedup check, the session write and the
//! log row land in one transaction.

use std::sync::Arc;

use adms_core::{
    AttendanceSession, CheckoutMethod, Clock, NewPunchLog, Person, PersonRef, PunchType,
    SessionClose, SessionEvent, Timebase, Transition, classify, sweep_checkout_time,
};
use adms_storage::{
    PlannedSession, PunchRecord, PunchStore, RecordedPunch, SessionStore, SessionWrite,
    SessionWriteResult, StoreError, StoreResult,
};
use chrono::{DateTime, NaiveTime, Utc};

use crate::AttendanceError;

/// Extra attempts after a write loses a race.
const CONFLICT_RETRIES: usize = 1;

/// Sessions closed or opened by one punch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionChange {
    /// Session that was closed, stale or current.
    pub closed: Option<AttendanceSession>,
    /// Session that was opened.
    pub opened: Option<AttendanceSession>,
}

impl SessionChange {
    /// Direction recorded on the punch log.
    pub fn punch_type(&self) -> PunchType {
        match (&self.opened, &self.closed) {
            (Some(_), _) => PunchType::In,
            (None, Some(_)) => PunchType::Out,
            (None, None) => PunchType::Unknown,
        }
    }

    /// Events to publish, closes before opens.
    pub fn events(&self) -> Vec<SessionEvent> {
        self.closed
            .iter()
            .chain(self.opened.iter())
            .map(SessionEvent::from_session)
            .collect()
    }
}

impl From<SessionWriteResult> for SessionChange {
    fn from(result: SessionWriteResult) -> Self {
        Self {
            closed: result.closed,
            opened: result.opened,
        }
    }
}

/// Result of applying a punch.
#[derive(Debug, Clone, PartialEq)]
pub enum PunchOutcome {
    /// Logged and applied.
    Applied(SessionChange),
    /// Already logged within the dedup window; nothing written.
    Duplicate,
}

/// Applies punches and check-outs to attendance sessions.
pub struct Attendance<S> {
    store: S,
    timebase: Timebase,
    clock: Arc<dyn Clock>,
}

impl<S: SessionStore> Attendance<S> {
    /// Create a driver over `store`.
    pub fn new(store: S, timebase: Timebase, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            timebase,
            clock,
        }
    }

    /// Close the person's open session outside of a punch.
    pub fn checkout(
        &self,
        person: PersonRef,
        at: DateTime<Utc>,
        method: CheckoutMethod,
    ) -> Result<AttendanceSession, AttendanceError> {
        let result = self.with_retry(
            person,
            |open| {
                let open = open.ok_or(AttendanceError::NoOpenSession(person))?;
                let write = SessionWrite {
                    close: Some(SessionClose {
                        session_id: open.id,
                        checkout_time: at.max(open.checkin_time),
                        method,
                    }),
                    open_at: None,
                };
                Ok((open.tenant_id, write))
            },
            |planned| {
                self.store.write_session(
                    planned.person,
                    planned.tenant_id,
                    planned.expected_open,
                    &planned.write,
                    self.clock.now(),
                )
            },
        )?;

        result.closed.ok_or(AttendanceError::NoOpenSession(person))
    }

    /// Close every open session whose check-in day has passed `cutoff`.
    pub fn sweep(&self, cutoff: NaiveTime) -> Result<Vec<AttendanceSession>, StoreError> {
        let now = self.clock.now();
        let mut closed = Vec::new();

        for session in self.store.open_sessions()? {
            let Some(checkout_time) = sweep_checkout_time(&session, now, cutoff, &self.timebase)
            else {
                continue;
            };

            let close = SessionClose {
                session_id: session.id,
                checkout_time,
                method: CheckoutMethod::AutoCheckout,
            };

            match self.store.close_session(&close, now)? {
                Some(session) => {
                    tracing::info!(
                        session_id = session.id,
                        person = %session.person,
                        checkout_time = %checkout_time,
                        "auto checkout"
                    );
                    closed.push(session);
                }
                None => {
                    tracing::debug!(session_id = session.id, "session closed before sweep reached it");
                }
            }
        }

        Ok(closed)
    }

    /// A person's sessions, oldest first.
    pub fn sessions(&self, person: PersonRef) -> Result<Vec<AttendanceSession>, StoreError> {
        self.store.sessions_for(person)
    }

    fn with_retry<T, F, C>(
        &self,
        person: PersonRef,
        plan: F,
        commit: C,
    ) -> Result<T, AttendanceError>
    where
        F: Fn(Option<&AttendanceSession>) -> Result<(i64, SessionWrite), AttendanceError>,
        C: Fn(PlannedSession) -> StoreResult<T>,
    {
        for attempt in 0..=CONFLICT_RETRIES {
            let open = self.store.open_session(person)?;
            let (tenant_id, write) = plan(open.as_ref())?;

            let planned = PlannedSession {
                person,
                tenant_id,
                expected_open: open.as_ref().map(|s| s.id),
                write,
            };

            match commit(planned) {
                Ok(result) => return Ok(result),
                Err(e) if e.is_conflict() => {
                    tracing::warn!(person = %person, attempt, error = %e, "session write lost a race");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AttendanceError::Contended(person))
    }
}

impl<S: PunchStore> Attendance<S> {
    /// Apply `punch` for `person`, logging it in the same transaction.
    ///
    /// The direction, `processed` flag and error on `punch` are filled in
    /// here. A punch already logged within `dedup_window` is dropped.
    pub fn apply_punch(
        &self,
        person: &Person,
        punch: &NewPunchLog,
        dedup_window: chrono::Duration,
    ) -> Result<PunchOutcome, AttendanceError> {
        let at = punch.punch_time;
        let recorded = self.with_retry(
            person.person,
            |open| {
                let write = match classify(open, at, &self.timebase) {
                    Transition::CheckIn { close_stale } => SessionWrite {
                        close: close_stale,
                        open_at: Some(at),
                    },
                    Transition::CheckOut(close) => SessionWrite {
                        close: Some(close),
                        open_at: None,
                    },
                    Transition::OutOfOrder { session_id } => {
                        return Err(AttendanceError::OutOfOrder { session_id });
                    }
                };
                Ok((person.tenant_id, write))
            },
            |planned| {
                let record = PunchRecord {
                    log: NewPunchLog {
                        punch_type: planned_punch_type(&planned.write),
                        processed: true,
                        error: None,
                        ..punch.clone()
                    },
                    dedup_window,
                    session: Some(planned),
                };
                self.store.record_punch(&record, self.clock.now())
            },
        )?;

        Ok(match recorded {
            RecordedPunch::Recorded { sessions, .. } => PunchOutcome::Applied(sessions.into()),
            RecordedPunch::Duplicate => PunchOutcome::Duplicate,
        })
    }

    /// Log `punch` as not applied, unless it is a retransmission.
    ///
    /// Returns `false` for a retransmission.
    pub fn reject_punch(
        &self,
        punch: &NewPunchLog,
        reason: &str,
        dedup_window: chrono::Duration,
    ) -> Result<bool, StoreError> {
        let record = PunchRecord {
            log: NewPunchLog {
                punch_type: PunchType::Unknown,
                processed: false,
                error: Some(reason.to_string()),
                ..punch.clone()
            },
            dedup_window,
            session: None,
        };

        Ok(matches!(
            self.store.record_punch(&record, self.clock.now())?,
            RecordedPunch::Recorded { .. }
        ))
    }
}

/// Direction a write will record, matching [`SessionChange::punch_type`].
fn planned_punch_type(write: &SessionWrite) -> PunchType {
    match (write.open_at, write.close) {
        (Some(_), _) => PunchType::In,
        (None, Some(_)) => PunchType::Out,
        (None, None) => PunchType::Unknown,
    }
}
