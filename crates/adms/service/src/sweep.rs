//! End-of-day auto checkout.

use std::sync::Arc;
use std::time::Duration;

use adms_core::SessionEvent;
use adms_notify::{Notifier, spawn_notify};
use adms_storage::{AllStorage, StoreError};
use tokio::time::{MissedTickBehavior, interval};

use crate::{Adms, AliasTable};

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions auto-closed.
    pub closed: usize,
    /// Expired command aliases dropped.
    pub aliases_evicted: usize,
}

impl<S, N, A> Adms<S, N, A>
where
    S: AllStorage + Clone,
    N: Notifier + 'static,
    A: AliasTable,
{
    /// Close sessions left open past the cutoff and drop expired aliases.
    pub fn sweep_once(&self) -> Result<SweepReport, StoreError> {
        let closed = self.attendance.sweep(self.settings.auto_checkout_at)?;
        for session in &closed {
            spawn_notify(self.notifier.clone(), SessionEvent::from_session(session));
        }

        let report = SweepReport {
            closed: closed.len(),
            aliases_evicted: self.queue.evict_expired_aliases(),
        };

        if report.closed > 0 || report.aliases_evicted > 0 {
            tracing::info!(
                closed = report.closed,
                aliases_evicted = report.aliases_evicted,
                "sweep"
            );
        }

        Ok(report)
    }
}

/// Run [`Adms::sweep_once`] every `period`, forever.
pub async fn run_sweeper<S, N, A>(service: Arc<Adms<S, N, A>>, period: Duration)
where
    S: AllStorage + Clone,
    N: Notifier + 'static,
    A: AliasTable,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if let Err(e) = service.sweep_once() {
            tracing::error!(error = %e, "sweep failed");
        }
    }
}
