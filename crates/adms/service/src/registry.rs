//! Device registry.

use std::sync::Arc;

use adms_core::{Clock, Device, DeviceMetadata, Status};
use adms_storage::{DeviceStore, StoreResult};

use crate::{AdminError, Rejection};

/// Registration, lookup and liveness of devices.
pub struct DeviceRegistry<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: DeviceStore> DeviceRegistry<S> {
    /// Create a registry over `store`.
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Register a new device. Serial numbers are unique.
    pub fn register(
        &self,
        serial_number: &str,
        metadata: &DeviceMetadata,
    ) -> Result<Device, AdminError> {
        let serial_number = serial_number.trim();
        if serial_number.is_empty() {
            return Err(AdminError::InvalidInput("serial number is empty".into()));
        }

        let device = self
            .store
            .create_device(serial_number, metadata, self.clock.now())
            .map_err(|e| match AdminError::from(e) {
                AdminError::Conflict(_) => {
                    AdminError::Conflict(format!("device {} already registered", serial_number))
                }
                other => other,
            })?;

        tracing::info!(
            serial = %device.serial_number,
            tenant_id = device.tenant_id,
            timezone_offset = %device.timezone_offset,
            "registered device"
        );

        Ok(device)
    }

    /// Look up a device by serial number.
    pub fn find_by_serial(&self, serial_number: &str) -> StoreResult<Option<Device>> {
        self.store.device_by_serial(serial_number)
    }

    /// The device behind `serial_number`, if it may talk to the server.
    pub fn resolve_active(&self, serial_number: &str) -> Result<Device, Rejection> {
        let device = self
            .find_by_serial(serial_number)
            .map_err(|e| {
                tracing::error!(serial = %serial_number, error = %e, "device lookup failed");
                Rejection::Unavailable
            })?
            .ok_or_else(|| Rejection::UnknownDevice(serial_number.to_string()))?;

        if !device.status.is_active() {
            return Err(Rejection::InactiveDevice(serial_number.to_string()));
        }

        Ok(device)
    }

    /// Record contact from a device. Unknown serials are tolerated.
    pub fn touch_sync(&self, serial_number: &str) -> StoreResult<()> {
        if !self.store.touch_device(serial_number, self.clock.now())? {
            tracing::debug!(serial = %serial_number, "sync from unregistered device ignored");
        }
        Ok(())
    }

    /// Like [`Self::touch_sync`] but only logs failures.
    pub(crate) fn touch_sync_logged(&self, serial_number: &str) {
        if let Err(e) = self.touch_sync(serial_number) {
            tracing::warn!(serial = %serial_number, error = %e, "failed to record device sync");
        }
    }

    /// Whether a device has been in contact recently.
    pub fn is_online(&self, device: &Device) -> bool {
        device.is_online(self.clock.now())
    }

    /// Activate or deactivate a device.
    pub fn set_status(&self, serial_number: &str, status: Status) -> Result<Device, AdminError> {
        let device = self
            .store
            .set_device_status(serial_number, status)?
            .ok_or_else(|| AdminError::NotFound(format!("device {}", serial_number)))?;

        tracing::info!(serial = %serial_number, status = %status, "device status changed");

        Ok(device)
    }

    /// Every registered device.
    pub fn list(&self) -> StoreResult<Vec<Device>> {
        self.store.list_devices()
    }
}
