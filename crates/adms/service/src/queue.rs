//! Device command queue.

use std::sync::Arc;

use adms_core::{AckOutcome, Clock, CommandType, Device, DeviceCommand, is_success};
use adms_storage::{CommandStore, StoreResult};

use crate::{AliasCounter, AliasTable};

/// A command handed to a device in a poll reply.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCommand {
    /// Short id the device will echo back.
    pub alias: u32,
    /// The command itself.
    pub command: DeviceCommand,
}

/// Queues commands per device and tracks their acknowledgements.
pub struct CommandQueue<S, A> {
    store: S,
    aliases: A,
    counter: AliasCounter,
    alias_ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl<S: CommandStore, A: AliasTable> CommandQueue<S, A> {
    /// Create a queue over `store`, handing out aliases from `counter`.
    pub fn new(
        store: S,
        aliases: A,
        counter: AliasCounter,
        alias_ttl: chrono::Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            aliases,
            counter,
            alias_ttl,
            clock,
        }
    }

    /// Queue a command for a device.
    pub fn enqueue(
        &self,
        device_id: i64,
        command_type: CommandType,
        payload: &str,
    ) -> StoreResult<DeviceCommand> {
        let command = self
            .store
            .enqueue_command(device_id, command_type, payload, self.clock.now())?;

        tracing::info!(
            device_id,
            command_uuid = %command.uuid,
            command_type = command_type.as_str(),
            "queued command"
        );

        Ok(command)
    }

    /// Take every pending command for `device`, oldest first, and alias each.
    ///
    /// Each command is handed out at most once.
    pub fn drain(&self, device: &Device) -> StoreResult<Vec<IssuedCommand>> {
        let now = self.clock.now();
        let commands = self.store.drain_commands(device.id, now)?;
        let expires_at = now + self.alias_ttl;

        let issued: Vec<_> = commands
            .into_iter()
            .map(|command| {
                let alias = self.counter.next();
                self.aliases.put(device.id, alias, &command.uuid, expires_at);
                IssuedCommand { alias, command }
            })
            .collect();

        if !issued.is_empty() {
            tracing::info!(serial = %device.serial_number, count = issued.len(), "issued commands");
        }

        Ok(issued)
    }

    /// Record an acknowledgement for a command UUID.
    pub fn acknowledge(
        &self,
        device_id: i64,
        command_uuid: &str,
        return_code: &str,
    ) -> StoreResult<AckOutcome> {
        let success = is_success(return_code);
        let outcome = self.store.acknowledge_command(
            device_id,
            command_uuid,
            success,
            return_code,
            self.clock.now(),
        )?;

        match &outcome {
            AckOutcome::Recorded(command) => tracing::info!(
                device_id,
                command_uuid = %command.uuid,
                status = %command.status,
                return_code,
                "command acknowledged"
            ),
            AckOutcome::AlreadyTerminal(command) => tracing::debug!(
                device_id,
                command_uuid = %command.uuid,
                status = %command.status,
                "repeat acknowledgement ignored"
            ),
            AckOutcome::Unknown => tracing::warn!(
                device_id,
                command_uuid,
                "acknowledgement for unknown command dropped"
            ),
        }

        Ok(outcome)
    }

    /// Record an acknowledgement for whatever id the device echoed back.
    ///
    /// Numeric ids are looked up in the alias table first. Anything that does
    /// not resolve is tried as a command UUID on the same device.
    pub fn acknowledge_echoed(
        &self,
        device_id: i64,
        echoed_id: &str,
        return_code: &str,
    ) -> StoreResult<AckOutcome> {
        let echoed_id = echoed_id.trim();
        let resolved = echoed_id.parse::<u32>().ok().and_then(|alias| {
            self.aliases
                .resolve(device_id, alias, self.clock.now())
                .map(|uuid| (alias, uuid))
        });

        match resolved {
            Some((alias, uuid)) => {
                let outcome = self.acknowledge(device_id, &uuid, return_code)?;
                self.aliases.evict(device_id, alias);
                Ok(outcome)
            }
            None => self.acknowledge(device_id, echoed_id, return_code),
        }
    }

    /// Drop expired aliases.
    pub fn evict_expired_aliases(&self) -> usize {
        self.aliases.evict_expired(self.clock.now())
    }

    /// A device's commands, oldest first.
    pub fn list(&self, device_id: i64) -> StoreResult<Vec<DeviceCommand>> {
        self.store.list_commands(device_id)
    }
}

#[cfg(test)]
mod tests {
    use adms_core::{CommandStatus, DeviceMetadata, FixedClock, REBOOT_PAYLOAD};
    use adms_storage::{DeviceStore, SqliteStorage};
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::MemoryAliasTable;

    struct Fixture {
        _dir: tempfile::TempDir,
        clock: Arc<FixedClock>,
        device: Device,
        queue: CommandQueue<SqliteStorage, Arc<MemoryAliasTable>>,
        aliases: Arc<MemoryAliasTable>,
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_709_280_000, 0).unwrap()
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("queue.db");
        let store = SqliteStorage::new(url.to_str().unwrap()).unwrap();
        store.run_migrations().unwrap();
        let device = store
            .create_device("ZK001", &DeviceMetadata::default(), now())
            .unwrap();

        let clock = Arc::new(FixedClock::new(now()));
        let aliases = Arc::new(MemoryAliasTable::new());
        let queue = CommandQueue::new(
            store,
            aliases.clone(),
            AliasCounter::default(),
            chrono::Duration::hours(1),
            clock.clone(),
        );

        Fixture {
            _dir: dir,
            clock,
            device,
            queue,
            aliases,
        }
    }

    #[test]
    fn test_drain_assigns_increasing_aliases() {
        let fx = fixture();
        let first = fx.queue.enqueue(fx.device.id, CommandType::Info, "INFO").unwrap();
        let second = fx
            .queue
            .enqueue(fx.device.id, CommandType::Reboot, REBOOT_PAYLOAD)
            .unwrap();

        let issued = fx.queue.drain(&fx.device).unwrap();
        assert_eq!(issued.len(), 2);
        assert_eq!((issued[0].alias, &issued[0].command.uuid), (1, &first.uuid));
        assert_eq!((issued[1].alias, &issued[1].command.uuid), (2, &second.uuid));
        assert!(issued.iter().all(|c| c.command.status == CommandStatus::Sent));

        assert!(fx.queue.drain(&fx.device).unwrap().is_empty());
        assert_eq!(fx.aliases.len(), 2);
    }

    #[test]
    fn test_ack_by_alias() {
        let fx = fixture();
        let command = fx.queue.enqueue(fx.device.id, CommandType::Info, "INFO").unwrap();
        let issued = fx.queue.drain(&fx.device).unwrap();

        let outcome = fx
            .queue
            .acknowledge_echoed(fx.device.id, &issued[0].alias.to_string(), "0")
            .unwrap();
        let AckOutcome::Recorded(acked) = outcome else {
            panic!("expected recorded ack, got {:?}", outcome);
        };
        assert_eq!(acked.uuid, command.uuid);
        assert_eq!(acked.status, CommandStatus::Executed);
        assert!(fx.aliases.is_empty());
    }

    #[test]
    fn test_ack_by_uuid_fallback() {
        let fx = fixture();
        let command = fx.queue.enqueue(fx.device.id, CommandType::Info, "INFO").unwrap();
        fx.queue.drain(&fx.device).unwrap();

        let outcome = fx
            .queue
            .acknowledge_echoed(fx.device.id, &command.uuid, "-1")
            .unwrap();
        let AckOutcome::Recorded(acked) = outcome else {
            panic!("expected recorded ack, got {:?}", outcome);
        };
        assert_eq!(acked.status, CommandStatus::Failed);
        assert_eq!(acked.return_value.as_deref(), Some("-1"));
    }

    #[test]
    fn test_expired_alias_is_dropped() {
        let fx = fixture();
        fx.queue.enqueue(fx.device.id, CommandType::Info, "INFO").unwrap();
        let issued = fx.queue.drain(&fx.device).unwrap();

        fx.clock.advance(chrono::Duration::hours(2));
        let outcome = fx
            .queue
            .acknowledge_echoed(fx.device.id, &issued[0].alias.to_string(), "0")
            .unwrap();
        assert_eq!(outcome, AckOutcome::Unknown);
        assert_eq!(fx.queue.evict_expired_aliases(), 0);
    }

    #[test]
    fn test_repeat_ack_keeps_first_result() {
        let fx = fixture();
        let command = fx.queue.enqueue(fx.device.id, CommandType::Info, "INFO").unwrap();
        fx.queue.drain(&fx.device).unwrap();

        fx.queue.acknowledge(fx.device.id, &command.uuid, "0").unwrap();
        let outcome = fx.queue.acknowledge(fx.device.id, &command.uuid, "-1").unwrap();
        let AckOutcome::AlreadyTerminal(command) = outcome else {
            panic!("expected terminal command, got {:?}", outcome);
        };
        assert_eq!(command.status, CommandStatus::Executed);
    }
}
