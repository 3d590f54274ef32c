//! Service traits.

use std::sync::Arc;

use adms_core::{
    AckOutcome, AckParams, AttendanceSession, Device, DeviceCommand, DeviceMetadata, Enrollment,
    HandshakeParams, HandshakeReply, Person, PersonRef, PunchLine, PunchLog, Status,
};

use crate::{AdminError, BatchReport, CommandRequest, DeviceSummary, IssuedCommand, Rejection};

/// Requests arriving from devices over the push protocol.
#[trait_variant::make(Send)]
pub trait DeviceProtocol: Send + Sync {
    /// Initial contact. Returns the option block the device should adopt.
    async fn handshake(
        &self,
        serial_number: &str,
        params: &HandshakeParams,
    ) -> Result<HandshakeReply, Rejection>;

    /// A batch of attendance records.
    async fn ingest_punches(
        &self,
        serial_number: &str,
        lines: &[PunchLine],
    ) -> Result<BatchReport, Rejection>;

    /// Pending commands for the device.
    async fn poll(&self, serial_number: &str) -> Result<Vec<IssuedCommand>, Rejection>;

    /// Command results. Never fails; problems are logged.
    async fn acknowledge(&self, serial_number: &str, acks: &[AckParams]) -> Vec<AckOutcome>;
}

/// Operator-facing management.
#[trait_variant::make(Send)]
pub trait Administration: Send + Sync {
    /// Register a device.
    async fn register_device(
        &self,
        serial_number: &str,
        metadata: &DeviceMetadata,
    ) -> Result<Device, AdminError>;

    /// Activate or deactivate a device.
    async fn set_device_status(
        &self,
        serial_number: &str,
        status: Status,
    ) -> Result<Device, AdminError>;

    /// Every device with its liveness.
    async fn devices(&self) -> Result<Vec<DeviceSummary>, AdminError>;

    /// Queue a command for a device.
    async fn enqueue_command(
        &self,
        serial_number: &str,
        request: &CommandRequest,
    ) -> Result<DeviceCommand, AdminError>;

    /// A device's command history.
    async fn commands(&self, serial_number: &str) -> Result<Vec<DeviceCommand>, AdminError>;

    /// A device's most recent punch logs.
    async fn punch_logs(&self, serial_number: &str, limit: i64)
    -> Result<Vec<PunchLog>, AdminError>;

    /// Insert or update a person in the directory mirror.
    async fn upsert_person(&self, person: &Person) -> Result<(), AdminError>;

    /// Bind a person to a device user id and push the user to the device.
    async fn enroll(
        &self,
        serial_number: &str,
        person: PersonRef,
        device_user_id: &str,
    ) -> Result<Enrollment, AdminError>;

    /// Remove a person from a device.
    async fn unenroll(
        &self,
        serial_number: &str,
        person: PersonRef,
    ) -> Result<Enrollment, AdminError>;

    /// A device's enrollments.
    async fn enrollments(&self, serial_number: &str) -> Result<Vec<Enrollment>, AdminError>;

    /// Close the person's open session at the current time.
    async fn self_service_checkout(
        &self,
        person: PersonRef,
    ) -> Result<AttendanceSession, AdminError>;

    /// A person's sessions, oldest first.
    async fn sessions(&self, person: PersonRef) -> Result<Vec<AttendanceSession>, AdminError>;
}

impl<T: DeviceProtocol> DeviceProtocol for Arc<T> {
    async fn handshake(
        &self,
        serial_number: &str,
        params: &HandshakeParams,
    ) -> Result<HandshakeReply, Rejection> {
        (**self).handshake(serial_number, params).await
    }

    async fn ingest_punches(
        &self,
        serial_number: &str,
        lines: &[PunchLine],
    ) -> Result<BatchReport, Rejection> {
        (**self).ingest_punches(serial_number, lines).await
    }

    async fn poll(&self, serial_number: &str) -> Result<Vec<IssuedCommand>, Rejection> {
        (**self).poll(serial_number).await
    }

    async fn acknowledge(&self, serial_number: &str, acks: &[AckParams]) -> Vec<AckOutcome> {
        (**self).acknowledge(serial_number, acks).await
    }
}

impl<T: Administration> Administration for Arc<T> {
    async fn register_device(
        &self,
        serial_number: &str,
        metadata: &DeviceMetadata,
    ) -> Result<Device, AdminError> {
        (**self).register_device(serial_number, metadata).await
    }

    async fn set_device_status(
        &self,
        serial_number: &str,
        status: Status,
    ) -> Result<Device, AdminError> {
        (**self).set_device_status(serial_number, status).await
    }

    async fn devices(&self) -> Result<Vec<DeviceSummary>, AdminError> {
        (**self).devices().await
    }

    async fn enqueue_command(
        &self,
        serial_number: &str,
        request: &CommandRequest,
    ) -> Result<DeviceCommand, AdminError> {
        (**self).enqueue_command(serial_number, request).await
    }

    async fn commands(&self, serial_number: &str) -> Result<Vec<DeviceCommand>, AdminError> {
        (**self).commands(serial_number).await
    }

    async fn punch_logs(
        &self,
        serial_number: &str,
        limit: i64,
    ) -> Result<Vec<PunchLog>, AdminError> {
        (**self).punch_logs(serial_number, limit).await
    }

    async fn upsert_person(&self, person: &Person) -> Result<(), AdminError> {
        (**self).upsert_person(person).await
    }

    async fn enroll(
        &self,
        serial_number: &str,
        person: PersonRef,
        device_user_id: &str,
    ) -> Result<Enrollment, AdminError> {
        (**self).enroll(serial_number, person, device_user_id).await
    }

    async fn unenroll(
        &self,
        serial_number: &str,
        person: PersonRef,
    ) -> Result<Enrollment, AdminError> {
        (**self).unenroll(serial_number, person).await
    }

    async fn enrollments(&self, serial_number: &str) -> Result<Vec<Enrollment>, AdminError> {
        (**self).enrollments(serial_number).await
    }

    async fn self_service_checkout(
        &self,
        person: PersonRef,
    ) -> Result<AttendanceSession, AdminError> {
        (**self).self_service_checkout(person).await
    }

    async fn sessions(&self, person: PersonRef) -> Result<Vec<AttendanceSession>, AdminError> {
        (**self).sessions(person).await
    }
}
