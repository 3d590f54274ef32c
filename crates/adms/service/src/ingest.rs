//! Punch ingestion pipeline.
//!
//! Every line of a batch is handled on its own: a bad line is logged and the
//! rest of the batch continues. Only when nothing at all can be written does
//! the batch fail, so the device keeps its buffer and retries.

use adms_core::{Device, NewPunchLog, Person, PunchLine, PunchType};
use adms_notify::{Notifier, spawn_notify};
use adms_storage::{AllStorage, StoreResult};
use chrono::{DateTime, Utc};

use crate::{Adms, AliasTable, PunchOutcome, PunchRejection, Rejection};

/// What happened to one punch line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Logged and applied to a session.
    Applied(PunchType),
    /// Dropped as a retransmission.
    Duplicate,
    /// Logged but not applied.
    NotApplied(String),
}

/// Per-batch tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchReport {
    /// Punches that changed a session.
    pub applied: usize,
    /// Retransmissions dropped.
    pub duplicates: usize,
    /// Punches logged with an error.
    pub not_applied: usize,
    /// Lines whose log row could not be written.
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &LineOutcome) {
        match outcome {
            LineOutcome::Applied(_) => self.applied += 1,
            LineOutcome::Duplicate => self.duplicates += 1,
            LineOutcome::NotApplied(_) => self.not_applied += 1,
        }
    }

    /// Lines seen.
    pub fn total(&self) -> usize {
        self.applied + self.duplicates + self.not_applied + self.failed
    }
}

impl<S, N, A> Adms<S, N, A>
where
    S: AllStorage + Clone,
    N: Notifier + 'static,
    A: AliasTable,
{
    /// Ingest a batch of punch lines from `serial_number`.
    pub fn ingest_batch(
        &self,
        serial_number: &str,
        lines: &[PunchLine],
    ) -> Result<BatchReport, Rejection> {
        let device = self.registry.resolve_active(serial_number).inspect_err(|e| {
            tracing::warn!(serial = %serial_number, reason = %e, "punch batch rejected");
        })?;

        let mut report = BatchReport::default();
        for line in lines {
            match self.ingest_line(&device, line) {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    tracing::error!(
                        serial = %serial_number,
                        device_user_id = %line.device_user_id,
                        error = %e,
                        "failed to record punch"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.failed < lines.len() {
            self.registry.touch_sync_logged(serial_number);
        }

        tracing::info!(
            serial = %serial_number,
            applied = report.applied,
            duplicates = report.duplicates,
            not_applied = report.not_applied,
            failed = report.failed,
            "punch batch"
        );

        if !lines.is_empty() && report.failed == lines.len() {
            return Err(Rejection::Unavailable);
        }

        Ok(report)
    }

    fn ingest_line(&self, device: &Device, line: &PunchLine) -> StoreResult<LineOutcome> {
        let punch_time = self.punch_time(device, line);

        let person = match self.enrolled_person(device, &line.device_user_id)? {
            Ok(person) => person,
            Err(rejection) => {
                tracing::warn!(
                    serial = %device.serial_number,
                    device_user_id = %line.device_user_id,
                    reason = %rejection,
                    "punch not attributable"
                );
                let reason = rejection.to_string();
                self.append_log(device, line, punch_time, &reason)?;
                return Ok(LineOutcome::NotApplied(reason));
            }
        };

        let punch = self.punch_log(device, line, punch_time);
        let window = self.settings.dedup_window;

        let reason = match self.attendance.apply_punch(&person, &punch, window) {
            Ok(PunchOutcome::Applied(change)) => {
                for event in change.events() {
                    spawn_notify(self.notifier.clone(), event);
                }
                return Ok(LineOutcome::Applied(change.punch_type()));
            }
            Ok(PunchOutcome::Duplicate) => return Ok(self.duplicate(device, &punch)),
            Err(e) => {
                tracing::warn!(
                    serial = %device.serial_number,
                    person = %person.person,
                    error = %e,
                    "punch not applied"
                );
                e.to_string()
            }
        };

        if self.attendance.reject_punch(&punch, &reason, window)? {
            Ok(LineOutcome::NotApplied(reason))
        } else {
            Ok(self.duplicate(device, &punch))
        }
    }

    fn duplicate(&self, device: &Device, punch: &NewPunchLog) -> LineOutcome {
        tracing::debug!(
            serial = %device.serial_number,
            device_user_id = %punch.device_user_id,
            punch_time = %punch.punch_time,
            "duplicate punch dropped"
        );
        LineOutcome::Duplicate
    }

    /// Device wall clock to UTC, falling back to the receive time.
    fn punch_time(&self, device: &Device, line: &PunchLine) -> DateTime<Utc> {
        match line.timestamp {
            Some(local) => self
                .settings
                .timebase
                .device_to_utc(local, device.timezone_offset),
            None => {
                tracing::warn!(
                    serial = %device.serial_number,
                    raw = %line.raw_timestamp,
                    "unparseable punch timestamp, using receive time"
                );
                self.clock.now()
            }
        }
    }

    fn enrolled_person(
        &self,
        device: &Device,
        device_user_id: &str,
    ) -> StoreResult<Result<Person, PunchRejection>> {
        let Some(enrollment) = self.store.enrollment_by_user(device.id, device_user_id)? else {
            return Ok(Err(PunchRejection::NotEnrolled(device_user_id.to_string())));
        };
        if !enrollment.status.is_active() {
            return Ok(Err(PunchRejection::EnrollmentInactive(
                device_user_id.to_string(),
            )));
        }

        let Some(person) = self.store.person(enrollment.person)? else {
            return Ok(Err(PunchRejection::PersonMissing(enrollment.person)));
        };
        if !person.status.is_active() {
            return Ok(Err(PunchRejection::PersonInactive(person.person)));
        }

        Ok(Ok(person))
    }

    fn punch_log(&self, device: &Device, line: &PunchLine, punch_time: DateTime<Utc>) -> NewPunchLog {
        NewPunchLog {
            device_id: device.id,
            device_user_id: line.device_user_id.clone(),
            punch_time,
            punch_type: PunchType::Unknown,
            verify_method: line.verify,
            processed: false,
            error: None,
        }
    }

    fn append_log(
        &self,
        device: &Device,
        line: &PunchLine,
        punch_time: DateTime<Utc>,
        reason: &str,
    ) -> StoreResult<()> {
        let log = NewPunchLog {
            error: Some(reason.to_string()),
            ..self.punch_log(device, line, punch_time)
        };
        self.store.append_punch_log(&log, self.clock.now())?;
        Ok(())
    }
}
