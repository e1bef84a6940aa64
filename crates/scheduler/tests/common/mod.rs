#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use jobwatch_core::{Candidate, UserKey};
use jobwatch_listings::{ListingQuery, ListingsClient, ListingsError};
use jobwatch_notify::{Notification, Notifier, NotifyError};
use jobwatch_scheduler::{PollerDeps, PollerOptions};
use jobwatch_store::MemoryStore;

/// What the next fetch call does.
pub enum Scripted {
    Items(Vec<Candidate>),
    Status(u16),
    /// Sleep this long, then return no items.
    Hang(Duration),
}

/// Listings client that replays a script and records every query.
#[derive(Default)]
pub struct ScriptedListings {
    script: Mutex<VecDeque<Scripted>>,
    queries: Mutex<Vec<ListingQuery>>,
    gate: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedListings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch waits for a permit on `gate` before answering.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn push(&self, step: Scripted) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn queries(&self) -> Vec<ListingQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingsClient for ScriptedListings {
    async fn fetch(&self, query: &ListingQuery) -> Result<Vec<Candidate>, ListingsError> {
        self.queries.lock().unwrap().push(query.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let step = self.script.lock().unwrap().pop_front();
        let result = match step {
            Some(Scripted::Items(items)) => Ok(items),
            Some(Scripted::Status(status)) => Err(ListingsError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            Some(Scripted::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(vec![])
            }
            None => Ok(vec![]),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn source_name(&self) -> &str {
        "scripted"
    }
}

/// Notifier that records deliveries and fails on demand.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserKey, Notification)>>,
    failing: Mutex<HashSet<String>>,
    blocked: AtomicBool,
    attempts: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages whose body contains `needle` fail with a transient error.
    pub fn fail_on(&self, needle: &str) {
        self.failing.lock().unwrap().insert(needle.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn block(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    /// Every `send` call, including the ones that failed.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(UserKey, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, n)| n.body).collect()
    }

    /// Bodies that mention the given vacancy id.
    pub fn count_for(&self, id: &str) -> usize {
        let link = format!("/vacancy/{id})");
        self.bodies().iter().filter(|b| b.contains(&link)).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, user: UserKey, notification: &Notification) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.blocked.load(Ordering::SeqCst) {
            return Err(NotifyError::Blocked(
                "Forbidden: bot was blocked by the user".to_string(),
            ));
        }
        let failing = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|needle| notification.body.contains(needle.as_str()));
        if failing {
            return Err(NotifyError::Api("Telegram API error: Bad Gateway".to_string()));
        }
        self.sent.lock().unwrap().push((user, notification.clone()));
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub listings: Arc<ScriptedListings>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_listings(ScriptedListings::new())
    }

    pub fn with_listings(listings: ScriptedListings) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            listings: Arc::new(listings),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    pub fn deps(&self) -> PollerDeps {
        self.deps_with(PollerOptions::default())
    }

    pub fn deps_with(&self, options: PollerOptions) -> PollerDeps {
        PollerDeps::new(self.store.clone(), self.listings.clone(), self.notifier.clone())
            .with_options(options)
    }
}

pub fn vacancy(id: &str, title: &str, city: &str) -> Candidate {
    Candidate::new(id, title, city)
}

/// Poll `check` on a paused clock until it holds or a minute of virtual
/// time passes.
pub async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..600 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    check()
}
