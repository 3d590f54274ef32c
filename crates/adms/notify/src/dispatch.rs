//! Notifier composition and fire-and-forget dispatch.

use std::sync::Arc;

use adms_core::SessionEvent;

use crate::Notifier;

/// Compose notifiers - primary decides the result, secondaries are best effort.
pub struct MultiNotifier<P, S> {
    primary: P,
    secondary: Vec<S>,
}

impl<P, S> MultiNotifier<P, S> {
    /// Create a new multi-notifier with a primary and secondary notifiers.
    pub fn new(primary: P, secondary: Vec<S>) -> Self {
        Self { primary, secondary }
    }

    /// Add a secondary notifier.
    pub fn with_secondary(mut self, notifier: S) -> Self {
        self.secondary.push(notifier);
        self
    }
}

impl<P: Notifier, S: Notifier> Notifier for MultiNotifier<P, S> {
    async fn notify(&self, event: &SessionEvent) -> color_eyre::eyre::Result<()> {
        self.primary.notify(event).await?;

        for secondary in &self.secondary {
            if let Err(e) = secondary.notify(event).await {
                tracing::warn!(error = %e, "secondary notifier failed");
            }
        }

        Ok(())
    }
}

/// Deliver `event` on a background task. Failures are logged, never returned.
pub fn spawn_notify<N>(notifier: Arc<N>, event: SessionEvent)
where
    N: Notifier + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&event).await {
            tracing::warn!(
                error = %e,
                person = %event.person,
                kind = ?event.kind,
                "notification delivery failed"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use adms_core::{PersonRef, SessionEventKind};

    struct Recording(tokio::sync::mpsc::UnboundedSender<SessionEvent>);

    impl Notifier for Recording {
        async fn notify(&self, event: &SessionEvent) -> color_eyre::eyre::Result<()> {
            self.0
                .send(event.clone())
                .map_err(|_| color_eyre::eyre::eyre!("receiver dropped"))
        }
    }

    struct Failing;

    impl Notifier for Failing {
        async fn notify(&self, _event: &SessionEvent) -> color_eyre::eyre::Result<()> {
            color_eyre::eyre::bail!("gateway down")
        }
    }

    fn event() -> SessionEvent {
        SessionEvent {
            person: PersonRef::Student(1),
            tenant_id: 1,
            kind: SessionEventKind::Checkin,
            checkin_time: chrono::Utc::now(),
            checkout_time: None,
            checkout_method: None,
            duration_minutes: None,
        }
    }

    #[tokio::test]
    async fn test_secondary_failure_is_swallowed() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let multi = MultiNotifier::new(Recording(tx), vec![Failing]);

        multi.notify(&event()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, SessionEventKind::Checkin);
    }

    #[tokio::test]
    async fn test_primary_failure_is_returned() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let multi = MultiNotifier::new(Failing, vec![Recording(tx)]);

        assert!(multi.notify(&event()).await.is_err());
    }

    #[tokio::test]
    async fn test_spawn_notify_delivers_in_background() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        spawn_notify(Arc::new(Recording(tx)), event());

        let delivered = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.person, PersonRef::Student(1));

        // A failing notifier must not panic the task or the caller.
        spawn_notify(Arc::new(Failing), event());
    }
}
