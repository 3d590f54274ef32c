//! Handshake, poll and acknowledgement handling.

use adms_core::{AckOutcome, AckParams, HandshakeParams, HandshakeReply};
use adms_storage::AllStorage;

use crate::{Adms, AliasTable, IssuedCommand, Rejection};

impl<S: AllStorage + Clone, N, A: AliasTable> Adms<S, N, A> {
    /// Accept a device's initial contact and tell it how to behave.
    ///
    /// `TimeZone` carries the device's absolute offset: the server baseline
    /// plus the device's own relative offset.
    pub fn handshake_reply(
        &self,
        serial_number: &str,
        params: &HandshakeParams,
    ) -> Result<HandshakeReply, Rejection> {
        let device = self.registry.resolve_active(serial_number).inspect_err(|e| {
            tracing::warn!(serial = %serial_number, reason = %e, "handshake rejected");
        })?;

        self.registry.touch_sync_logged(serial_number);

        let timezone = self.settings.timebase.device_offset(device.timezone_offset);
        tracing::info!(
            serial = %serial_number,
            push_version = params.push_version.as_deref().unwrap_or("-"),
            language = params.language.as_deref().unwrap_or("-"),
            timezone = %timezone,
            "handshake"
        );

        Ok(HandshakeReply {
            serial_number: device.serial_number,
            server_time: self.clock.now(),
            timezone,
        })
    }

    /// Hand out every pending command for the device.
    pub fn poll_commands(&self, serial_number: &str) -> Result<Vec<IssuedCommand>, Rejection> {
        let device = self.registry.resolve_active(serial_number)?;
        self.registry.touch_sync_logged(serial_number);

        self.queue.drain(&device).map_err(|e| {
            tracing::error!(serial = %serial_number, error = %e, "failed to drain command queue");
            Rejection::Unavailable
        })
    }

    /// Apply command results reported by a device.
    pub fn record_acks(&self, serial_number: &str, acks: &[AckParams]) -> Vec<AckOutcome> {
        let device = match self.registry.find_by_serial(serial_number) {
            Ok(Some(device)) => device,
            Ok(None) => {
                tracing::warn!(serial = %serial_number, count = acks.len(), "acks from unknown device dropped");
                return Vec::new();
            }
            Err(e) => {
                tracing::error!(serial = %serial_number, error = %e, "device lookup failed");
                return Vec::new();
            }
        };

        acks.iter()
            .filter_map(|ack| {
                self.queue
                    .acknowledge_echoed(device.id, &ack.id, &ack.return_code)
                    .inspect_err(|e| {
                        tracing::error!(
                            serial = %serial_number,
                            id = %ack.id,
                            error = %e,
                            "failed to record acknowledgement"
                        );
                    })
                    .ok()
            })
            .collect()
    }
}
