//! Notification traits.

use adms_core::SessionEvent;

/// Receives attendance session changes.
#[trait_variant::make(Send)]
pub trait Notifier: Send + Sync {
    /// Deliver one event.
    async fn notify(&self, event: &SessionEvent) -> color_eyre::eyre::Result<()>;
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, event: &SessionEvent) -> color_eyre::eyre::Result<()> {
        tracing::info!(
            person = %event.person,
            tenant_id = event.tenant_id,
            kind = ?event.kind,
            duration_minutes = ?event.duration_minutes,
            "session event"
        );
        Ok(())
    }
}

impl<N: Notifier> Notifier for std::sync::Arc<N> {
    async fn notify(&self, event: &SessionEvent) -> color_eyre::eyre::Result<()> {
        (**self).notify(event).await
    }
}
