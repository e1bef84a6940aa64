//! The per-user polling loop.
//!
//! A poller reads its interval and watermark once on entry, runs one cycle
//! immediately, then waits on a single `select!` over the interval timer and
//! its cancellation token. Cancellation is observed only at that wait point,
//! so a cycle that is already fetching or delivering always runs to the end.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jobwatch_core::config::SchedulerConfig;
use jobwatch_core::{PollingInterval, UserKey, DEFAULT_INTERVAL_MINUTES};
use jobwatch_listings::ListingsClient;
use jobwatch_notify::{MessageRenderer, Notifier};
use jobwatch_store::SettingsStore;

use crate::event::PollerEvent;

/// Tunables shared by every poller.
#[derive(Debug, Clone)]
pub struct PollerOptions {
    /// Interval used when the user has none stored.
    pub default_interval_minutes: i64,
    /// Upper bound on one listings fetch.
    pub fetch_timeout: Duration,
    /// Send a "nothing new" message when a fetch returns no candidates.
    pub notify_when_empty: bool,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            default_interval_minutes: DEFAULT_INTERVAL_MINUTES,
            fetch_timeout: Duration::from_secs(10),
            notify_when_empty: true,
        }
    }
}

impl From<&SchedulerConfig> for PollerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            default_interval_minutes: config.default_interval_minutes,
            fetch_timeout: config.fetch_timeout(),
            notify_when_empty: config.notify_when_empty,
        }
    }
}

/// Collaborators shared by every poller.
#[derive(Clone)]
pub struct PollerDeps {
    pub store: Arc<dyn SettingsStore>,
    pub listings: Arc<dyn ListingsClient>,
    pub notifier: Arc<dyn Notifier>,
    pub renderer: MessageRenderer,
    pub events: Option<mpsc::UnboundedSender<PollerEvent>>,
    pub options: PollerOptions,
}

impl PollerDeps {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        listings: Arc<dyn ListingsClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            listings,
            notifier,
            renderer: MessageRenderer::new(),
            events: None,
            options: PollerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PollerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_renderer(mut self, renderer: MessageRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<PollerEvent>) -> Self {
        self.events = Some(events);
        self
    }
}

/// One user's polling state.
pub struct Poller {
    pub(crate) user: UserKey,
    pub(crate) deps: PollerDeps,
    pub(crate) interval: PollingInterval,
    /// Cached lower bound for the next fetch; reconciled with the store
    /// at the start of every cycle.
    pub(crate) watermark: DateTime<Utc>,
    /// Held for the duration of a cycle so a replacement poller for the
    /// same user never overlaps an old one that is still finishing.
    pub(crate) cycle_lock: Arc<Mutex<()>>,
}

impl Poller {
    /// Read the user's interval and watermark and build the poller.
    ///
    /// Unreadable settings fall back to the default interval and to a
    /// watermark one interval in the past.
    pub async fn start(user: UserKey, deps: PollerDeps, cycle_lock: Arc<Mutex<()>>) -> Self {
        let stored_interval = match deps.store.get_interval(user).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(user = %user, error = %e, "Could not read interval, using default");
                None
            }
        };
        let interval = PollingInterval::from_stored(stored_interval, deps.options.default_interval_minutes);

        let watermark = match deps.store.get_watermark(user).await {
            Ok(Some(at)) => at,
            Ok(None) => Utc::now() - interval.as_chrono(),
            Err(e) => {
                warn!(user = %user, error = %e, "Could not read watermark, looking back one interval");
                Utc::now() - interval.as_chrono()
            }
        };

        debug!(user = %user, interval = %interval, watermark = %watermark, "Poller initialised");

        Self {
            user,
            deps,
            interval,
            watermark,
            cycle_lock,
        }
    }

    pub fn user(&self) -> UserKey {
        self.user
    }

    pub fn interval(&self) -> PollingInterval {
        self.interval
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    /// Run cycles until `stop` is cancelled.
    pub async fn run(mut self, stop: CancellationToken) {
        info!(user = %self.user, interval = %self.interval, "Poller started");

        let mut ticker = tokio::time::interval(self.interval.as_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The first tick completes immediately, giving the initial cycle.
            tokio::select! {
                biased;

                _ = stop.cancelled() => break,

                _ = ticker.tick() => {
                    let lock = self.cycle_lock.clone();
                    let _guard = tokio::select! {
                        biased;
                        _ = stop.cancelled() => break,
                        guard = lock.lock_owned() => guard,
                    };
                    let report = self.run_cycle().await;
                    report.log(self.user);
                }
            }
        }

        info!(user = %self.user, "Poller stopped");
    }
}

/// Entry point spawned by the supervisor.
pub async fn run(user: UserKey, deps: PollerDeps, cycle_lock: Arc<Mutex<()>>, stop: CancellationToken) {
    if stop.is_cancelled() {
        return;
    }
    Poller::start(user, deps, cycle_lock).await.run(stop).await;
}
