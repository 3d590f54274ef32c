//! Core ADMS service implementation.

use std::sync::Arc;

use adms_core::{
    AckOutcome, AckParams, AttendanceSession, Clock, Device, DeviceCommand, DeviceMetadata,
    Enrollment, HandshakeParams, HandshakeReply, Person, PersonRef, PunchLine, PunchLog, Status,
    SystemClock,
};
use adms_notify::Notifier;
use adms_storage::AllStorage;

use crate::{
    AdminError, Administration, AliasCounter, AliasTable, Attendance, BatchReport, CommandQueue,
    CommandRequest, DeviceProtocol, DeviceRegistry, DeviceSummary, IssuedCommand,
    MemoryAliasTable, Rejection, Settings,
};

/// The push-protocol server: device registry, punch ingestion, attendance
/// sessions and the command queue over one store.
pub struct Adms<S, N, A = MemoryAliasTable> {
    pub(crate) store: S,
    pub(crate) registry: DeviceRegistry<S>,
    pub(crate) attendance: Attendance<S>,
    pub(crate) queue: CommandQueue<S, A>,
    pub(crate) notifier: Arc<N>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: Settings,
}

impl<S: AllStorage + Clone, N> Adms<S, N, MemoryAliasTable> {
    /// Create a service on the wall clock with an in-process alias table.
    pub fn new(store: S, notifier: N, settings: Settings) -> Self {
        Self::with_clock(store, notifier, settings, Arc::new(SystemClock))
    }

    /// Create a service on a supplied clock.
    pub fn with_clock(store: S, notifier: N, settings: Settings, clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(
            store,
            notifier,
            settings,
            clock,
            MemoryAliasTable::new(),
            AliasCounter::default(),
        )
    }
}

impl<S: AllStorage + Clone, N, A: AliasTable> Adms<S, N, A> {
    /// Assemble a service from explicit parts.
    pub fn from_parts(
        store: S,
        notifier: N,
        settings: Settings,
        clock: Arc<dyn Clock>,
        aliases: A,
        counter: AliasCounter,
    ) -> Self {
        Self {
            registry: DeviceRegistry::new(store.clone(), clock.clone()),
            attendance: Attendance::new(store.clone(), settings.timebase, clock.clone()),
            queue: CommandQueue::new(
                store.clone(),
                aliases,
                counter,
                settings.alias_ttl,
                clock.clone(),
            ),
            store,
            notifier: Arc::new(notifier),
            clock,
            settings,
        }
    }

    /// Device registry.
    pub fn registry(&self) -> &DeviceRegistry<S> {
        &self.registry
    }

    /// Attendance session driver.
    pub fn attendance(&self) -> &Attendance<S> {
        &self.attendance
    }

    /// Command queue.
    pub fn queue(&self) -> &CommandQueue<S, A> {
        &self.queue
    }

    /// Active settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn device(&self, serial_number: &str) -> Result<Device, AdminError> {
        self.registry
            .find_by_serial(serial_number)?
            .ok_or_else(|| AdminError::NotFound(format!("device {}", serial_number)))
    }
}

impl<S, N, A> DeviceProtocol for Adms<S, N, A>
where
    S: AllStorage + Clone,
    N: Notifier + 'static,
    A: AliasTable,
{
    async fn handshake(
        &self,
        serial_number: &str,
        params: &HandshakeParams,
    ) -> Result<HandshakeReply, Rejection> {
        self.handshake_reply(serial_number, params)
    }

    async fn ingest_punches(
        &self,
        serial_number: &str,
        lines: &[PunchLine],
    ) -> Result<BatchReport, Rejection> {
        self.ingest_batch(serial_number, lines)
    }

    async fn poll(&self, serial_number: &str) -> Result<Vec<IssuedCommand>, Rejection> {
        self.poll_commands(serial_number)
    }

    async fn acknowledge(&self, serial_number: &str, acks: &[AckParams]) -> Vec<AckOutcome> {
        self.record_acks(serial_number, acks)
    }
}

impl<S, N, A> Administration for Adms<S, N, A>
where
    S: AllStorage + Clone,
    N: Notifier + 'static,
    A: AliasTable,
{
    async fn register_device(
        &self,
        serial_number: &str,
        metadata: &DeviceMetadata,
    ) -> Result<Device, AdminError> {
        self.registry.register(serial_number, metadata)
    }

    async fn set_device_status(
        &self,
        serial_number: &str,
        status: Status,
    ) -> Result<Device, AdminError> {
        self.registry.set_status(serial_number, status)
    }

    async fn devices(&self) -> Result<Vec<DeviceSummary>, AdminError> {
        let devices = self.registry.list()?;
        Ok(devices
            .into_iter()
            .map(|device| DeviceSummary {
                online: self.registry.is_online(&device),
                device,
            })
            .collect())
    }

    async fn enqueue_command(
        &self,
        serial_number: &str,
        request: &CommandRequest,
    ) -> Result<DeviceCommand, AdminError> {
        self.enqueue_request(serial_number, request)
    }

    async fn commands(&self, serial_number: &str) -> Result<Vec<DeviceCommand>, AdminError> {
        let device = self.device(serial_number)?;
        Ok(self.queue.list(device.id)?)
    }

    async fn punch_logs(
        &self,
        serial_number: &str,
        limit: i64,
    ) -> Result<Vec<PunchLog>, AdminError> {
        let device = self.device(serial_number)?;
        Ok(self.store.punch_logs(device.id, limit.max(1))?)
    }

    async fn upsert_person(&self, person: &Person) -> Result<(), AdminError> {
        self.store.upsert_person(person)?;
        tracing::info!(person = %person.person, status = %person.status, "person updated");
        Ok(())
    }

    async fn enroll(
        &self,
        serial_number: &str,
        person: PersonRef,
        device_user_id: &str,
    ) -> Result<Enrollment, AdminError> {
        self.enroll_person(serial_number, person, device_user_id)
    }

    async fn unenroll(
        &self,
        serial_number: &str,
        person: PersonRef,
    ) -> Result<Enrollment, AdminError> {
        self.unenroll_person(serial_number, person)
    }

    async fn enrollments(&self, serial_number: &str) -> Result<Vec<Enrollment>, AdminError> {
        let device = self.device(serial_number)?;
        Ok(self.store.list_enrollments(device.id)?)
    }

    async fn self_service_checkout(
        &self,
        person: PersonRef,
    ) -> Result<AttendanceSession, AdminError> {
        self.checkout_now(person)
    }

    async fn sessions(&self, person: PersonRef) -> Result<Vec<AttendanceSession>, AdminError> {
        Ok(self.attendance.sessions(person)?)
    }
}
