use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use jobwatch_bot::{CommandHandler, LifecycleListener};
use jobwatch_core::{Candidate, UserKey};
use jobwatch_listings::{ListingQuery, ListingsClient, ListingsError};
use jobwatch_notify::{Notification, Notifier, NotifyError};
use jobwatch_scheduler::{PollerDeps, PollerEvent, Supervisor};
use jobwatch_store::{MemoryStore, SettingsStore};

const USER: UserKey = UserKey(42);

#[derive(Default)]
struct CountingListings {
    calls: AtomicUsize,
}

#[async_trait]
impl ListingsClient for CountingListings {
    async fn fetch(&self, _query: &ListingQuery) -> Result<Vec<Candidate>, ListingsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![])
    }

    fn source_name(&self) -> &str {
        "counting"
    }
}

#[derive(Default)]
struct MockNotifier {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, _user: UserKey, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "mock"
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    listings: Arc<CountingListings>,
    supervisor: Arc<Supervisor>,
    handler: CommandHandler,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let listings = Arc::new(CountingListings::default());
    let deps = PollerDeps::new(store.clone(), listings.clone(), Arc::new(MockNotifier::default()));
    let supervisor = Arc::new(Supervisor::new(deps));
    let handler = CommandHandler::new(store.clone(), supervisor.clone(), "golang");
    Fixture {
        store,
        listings,
        supervisor,
        handler,
    }
}

async fn wait_for_calls(listings: &CountingListings, n: usize) -> bool {
    for _ in 0..600 {
        if listings.calls.load(Ordering::SeqCst) >= n {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test(start_paused = true)]
async fn start_registers_and_activates() {
    let f = fixture();
    let reply = f.handler.handle(USER, "/start").await;
    assert!(reply.contains("Alerts are on"));
    assert!(f.supervisor.is_running(USER));
    assert_eq!(f.store.list_active_users().await.unwrap(), vec![USER]);
}

#[tokio::test(start_paused = true)]
async fn invalid_intervals_are_rejected_without_side_effects() {
    let f = fixture();
    f.handler.handle(USER, "/start").await;

    for bad in ["/interval 3", "/interval 0", "/interval -1", "/interval often"] {
        let reply = f.handler.handle(USER, bad).await;
        assert!(reply.contains("5 or more"), "{bad}: {reply}");
    }
    assert_eq!(f.store.get_interval(USER).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn oversized_interval_names_the_upper_bound() {
    let f = fixture();
    let reply = f.handler.handle(USER, "/interval 5000000000").await;
    assert!(reply.contains("at most 4294967295 minutes"), "{reply}");
    assert_eq!(f.store.get_interval(USER).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn accepted_interval_restarts_the_poller() {
    let f = fixture();
    f.handler.handle(USER, "/start").await;
    assert!(wait_for_calls(&f.listings, 1).await);

    let reply = f.handler.handle(USER, "/interval 60").await;
    assert_eq!(reply, "Checking every 60 minutes from now on.");
    assert_eq!(f.store.get_interval(USER).await.unwrap(), Some(60));

    // The replacement poller runs its immediate cycle.
    assert!(wait_for_calls(&f.listings, 2).await);
    assert_eq!(f.supervisor.live_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_drive_the_supervisor() {
    let f = fixture();
    f.handler.handle(USER, "/start").await;

    f.handler.handle(USER, "/pause").await;
    assert!(!f.supervisor.is_running(USER));
    assert!(f.store.get_profile(USER).await.unwrap().paused);

    let reply = f.handler.handle(USER, "/start").await;
    assert!(reply.contains("paused"));
    assert!(!f.supervisor.is_running(USER));

    f.handler.handle(USER, "/resume").await;
    assert!(f.supervisor.is_running(USER));
    assert!(!f.store.get_profile(USER).await.unwrap().paused);
}

#[tokio::test(start_paused = true)]
async fn filters_are_normalised_and_shown_in_status() {
    let f = fixture();
    f.handler.handle(USER, "/start").await;

    let reply = f.handler.handle(USER, "/keywords Golang, DevOps, golang").await;
    assert_eq!(reply, "Keywords saved: golang, devops");
    f.handler.handle(USER, "/cities Москва, москва, Казань").await;

    let status = f.handler.handle(USER, "/status").await;
    assert!(status.contains("Alerts: on"));
    assert!(status.contains("Keywords: golang, devops"));
    assert!(status.contains("Cities: Москва, Казань"));
    assert!(status.contains("Interval: 30 minutes"));
}

#[tokio::test(start_paused = true)]
async fn status_shows_default_keyword() {
    let f = fixture();
    let status = f.handler.handle(USER, "/status").await;
    assert!(status.contains("Keywords: golang (default)"));
    assert!(status.contains("Last successful check: never"));
}

#[tokio::test(start_paused = true)]
async fn unknown_text_gets_help() {
    let f = fixture();
    let reply = f.handler.handle(USER, "what can you do?").await;
    assert!(reply.contains("/keywords"));
    assert!(!f.supervisor.is_running(USER));
}

#[tokio::test(start_paused = true)]
async fn blocked_user_is_disabled_until_start() {
    let f = fixture();
    f.handler.handle(USER, "/start").await;
    assert!(f.supervisor.is_running(USER));

    let listener = LifecycleListener::new(f.store.clone(), f.supervisor.clone());
    listener
        .handle(PollerEvent::DeliveryBlocked {
            user: USER,
            reason: "Forbidden: bot was blocked by the user".to_string(),
        })
        .await;

    assert!(!f.supervisor.is_running(USER));
    assert!(f.store.get_profile(USER).await.unwrap().disabled);
    assert!(f.store.list_active_users().await.unwrap().is_empty());

    let reply = f.handler.handle(USER, "/resume").await;
    assert!(reply.contains("/start"));
    assert!(!f.supervisor.is_running(USER));

    f.handler.handle(USER, "/start").await;
    assert!(f.supervisor.is_running(USER));
    assert!(!f.store.get_profile(USER).await.unwrap().disabled);
}
