//! Operator actions that end up as device commands.

use adms_core::{
    AttendanceSession, CLEAR_LOG_PAYLOAD, CheckoutMethod, CommandType, Device, DeviceCommand,
    Enrollment, INFO_PAYLOAD, PersonRef, REBOOT_PAYLOAD, SessionEvent, delete_user_payload,
    set_user_payload, sync_time_payload,
};
use adms_notify::{Notifier, spawn_notify};
use adms_storage::AllStorage;

use crate::{AdminError, Adms, AliasTable};

/// Privilege level given to enrolled users (ordinary user).
const USER_PRIVILEGE: u8 = 0;

/// A device with its liveness.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DeviceSummary {
    /// The device.
    #[serde(flatten)]
    pub device: Device,
    /// Contacted the server recently.
    pub online: bool,
}

/// Operator request for a device command.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandRequest {
    /// Create or update a user on the device.
    SetUser {
        /// Device-local user id (PIN).
        device_user_id: String,
        /// Name shown on the device.
        name: String,
        /// Device privilege level.
        #[serde(default)]
        privilege: u8,
    },
    /// Remove a user from the device.
    DeleteUser {
        /// Device-local user id (PIN).
        device_user_id: String,
    },
    /// Set the device clock to the server's idea of device-local time.
    SyncTime,
    /// Restart the device.
    Reboot,
    /// Clear the device's attendance buffer.
    ClearLog,
    /// Ask the device to report its info.
    Info,
    /// Raw payload, sent as-is.
    Custom {
        /// Protocol payload.
        payload: String,
    },
}

impl<S: AllStorage + Clone, N, A: AliasTable> Adms<S, N, A> {
    /// Queue a command described by an operator request.
    pub fn enqueue_request(
        &self,
        serial_number: &str,
        request: &CommandRequest,
    ) -> Result<DeviceCommand, AdminError> {
        let device = self.device(serial_number)?;

        let (command_type, payload) = match request {
            CommandRequest::SetUser {
                device_user_id,
                name,
                privilege,
            } => (
                CommandType::SetUser,
                set_user_payload(non_empty(device_user_id, "device_user_id")?, name, *privilege),
            ),
            CommandRequest::DeleteUser { device_user_id } => (
                CommandType::DeleteUser,
                delete_user_payload(non_empty(device_user_id, "device_user_id")?),
            ),
            CommandRequest::SyncTime => {
                let local = self
                    .settings
                    .timebase
                    .utc_to_device(self.clock.now(), device.timezone_offset);
                (CommandType::SyncTime, sync_time_payload(local))
            }
            CommandRequest::Reboot => (CommandType::Reboot, REBOOT_PAYLOAD.to_string()),
            CommandRequest::ClearLog => (CommandType::ClearLog, CLEAR_LOG_PAYLOAD.to_string()),
            CommandRequest::Info => (CommandType::Info, INFO_PAYLOAD.to_string()),
            CommandRequest::Custom { payload } => (
                CommandType::Custom,
                non_empty(payload, "payload")?.to_string(),
            ),
        };

        Ok(self.queue.enqueue(device.id, command_type, &payload)?)
    }

    /// Enroll a person on a device and queue the user push.
    pub fn enroll_person(
        &self,
        serial_number: &str,
        person: PersonRef,
        device_user_id: &str,
    ) -> Result<Enrollment, AdminError> {
        let device_user_id = non_empty(device_user_id, "device_user_id")?;
        let device = self.device(serial_number)?;
        let person = self
            .store
            .person(person)?
            .ok_or_else(|| AdminError::NotFound(person.to_string()))?;

        let enrollment = self
            .store
            .create_enrollment(device.id, device_user_id, person.person, self.clock.now())?;

        self.queue.enqueue(
            device.id,
            CommandType::SetUser,
            &set_user_payload(device_user_id, &person.name, USER_PRIVILEGE),
        )?;

        tracing::info!(
            serial = %serial_number,
            person = %person.person,
            device_user_id,
            "enrolled"
        );

        Ok(enrollment)
    }

    /// Remove a person's enrollment and queue the user removal.
    pub fn unenroll_person(
        &self,
        serial_number: &str,
        person: PersonRef,
    ) -> Result<Enrollment, AdminError> {
        let device = self.device(serial_number)?;
        let enrollment = self
            .store
            .delete_enrollment(device.id, person)?
            .ok_or_else(|| {
                AdminError::NotFound(format!("{} on device {}", person, serial_number))
            })?;

        self.queue.enqueue(
            device.id,
            CommandType::DeleteUser,
            &delete_user_payload(&enrollment.device_user_id),
        )?;

        tracing::info!(serial = %serial_number, person = %person, "unenrolled");

        Ok(enrollment)
    }
}

impl<S, N, A> Adms<S, N, A>
where
    S: AllStorage + Clone,
    N: Notifier + 'static,
    A: AliasTable,
{
    /// Close the person's open session now.
    pub fn checkout_now(&self, person: PersonRef) -> Result<AttendanceSession, AdminError> {
        let session =
            self.attendance
                .checkout(person, self.clock.now(), CheckoutMethod::SelfService)?;

        tracing::info!(person = %person, session_id = session.id, "self-service checkout");
        spawn_notify(self.notifier.clone(), SessionEvent::from_session(&session));

        Ok(session)
    }
}

fn non_empty<'a>(value: &'a str, field: &str) -> Result<&'a str, AdminError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AdminError::InvalidInput(format!("{} is empty", field)));
    }
    Ok(value)
}
