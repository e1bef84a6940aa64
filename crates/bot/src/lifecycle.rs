//! Reacts to poller events on behalf of the command layer.
//!
//! A user whose chat permanently rejects messages is marked disabled in the
//! store and their poller is stopped. They come back with `/start`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use jobwatch_scheduler::{PollerEvent, Supervisor};
use jobwatch_store::SettingsStore;

pub struct LifecycleListener {
    store: Arc<dyn SettingsStore>,
    supervisor: Arc<Supervisor>,
}

impl LifecycleListener {
    pub fn new(store: Arc<dyn SettingsStore>, supervisor: Arc<Supervisor>) -> Self {
        Self { store, supervisor }
    }

    pub async fn handle(&self, event: PollerEvent) {
        match event {
            PollerEvent::DeliveryBlocked { user, reason } => {
                info!(user = %user, reason = %reason, "Disabling unreachable user");
                if let Err(e) = self.store.disable(user).await {
                    // Without the flag the poller would be restarted on the next boot.
                    warn!(user = %user, error = %e, "Could not persist disabled flag");
                }
                self.supervisor.on_user_disabled(user);
            }
        }
    }

    /// Consume events until the channel closes or `stop` is cancelled.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<PollerEvent>, stop: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }
    }
}
