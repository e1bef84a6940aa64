//! One fetch → dedup → deliver → advance-watermark pass.
//!
//! The watermark only moves when the whole cycle was clean: the fetch
//! succeeded, every new candidate was delivered and every seen marker was
//! read and written. Anything less keeps the window open so the next cycle
//! asks for the same postings again, and the seen markers suppress the ones
//! that did get through.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use jobwatch_core::{Candidate, UserKey};
use jobwatch_listings::{ListingQuery, ListingsError};
use jobwatch_notify::NotifyError;

use crate::event::PollerEvent;
use crate::poller::Poller;

/// How far a cycle got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The fetch succeeded and every candidate was processed.
    Completed,
    /// Settings could not be read; nothing was fetched.
    StoreUnavailable(String),
    /// The listings API failed or timed out; nothing was delivered.
    FetchFailed(String),
}

/// Counters describing one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    /// Lower bound used for the fetch.
    pub since: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub fetched: usize,
    pub already_seen: usize,
    pub delivered: usize,
    pub failed_deliveries: usize,
    /// Seen-marker reads or writes that failed.
    pub store_errors: usize,
    /// Set when the chat transport reported the user unreachable.
    pub blocked: Option<String>,
    pub sent_nothing_new: bool,
    pub watermark_advanced: bool,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>, since: DateTime<Utc>) -> Self {
        Self {
            started_at,
            since,
            outcome: CycleOutcome::Completed,
            fetched: 0,
            already_seen: 0,
            delivered: 0,
            failed_deliveries: 0,
            store_errors: 0,
            blocked: None,
            sent_nothing_new: false,
            watermark_advanced: false,
        }
    }

    /// Whether the watermark may move past this cycle's window.
    pub fn is_clean(&self) -> bool {
        self.outcome == CycleOutcome::Completed
            && self.failed_deliveries == 0
            && self.store_errors == 0
            && self.blocked.is_none()
    }

    pub(crate) fn log(&self, user: UserKey) {
        match &self.outcome {
            CycleOutcome::Completed => info!(
                user = %user,
                fetched = self.fetched,
                delivered = self.delivered,
                already_seen = self.already_seen,
                failed = self.failed_deliveries,
                store_errors = self.store_errors,
                watermark_advanced = self.watermark_advanced,
                "Cycle complete"
            ),
            CycleOutcome::StoreUnavailable(e) => {
                warn!(user = %user, error = %e, "Cycle skipped, settings unavailable")
            }
            CycleOutcome::FetchFailed(e) => {
                warn!(user = %user, since = %self.since, error = %e, "Cycle skipped, fetch failed")
            }
        }
    }
}

impl Poller {
    /// Run a single cycle and report what happened.
    ///
    /// Never returns an error: every failure is logged, counted and leaves
    /// the watermark where it was.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started_at = Utc::now();

        // Another poller for this user may have advanced it since our last look.
        match self.deps.store.get_watermark(self.user).await {
            Ok(Some(persisted)) if persisted > self.watermark => self.watermark = persisted,
            Ok(_) => {}
            Err(e) => {
                let mut report = CycleReport::new(started_at, self.watermark);
                report.outcome = CycleOutcome::StoreUnavailable(e.to_string());
                return report;
            }
        }

        let since = self.watermark;
        let mut report = CycleReport::new(started_at, since);

        let filters = match self.deps.store.get_filters(self.user).await {
            Ok(filters) => filters,
            Err(e) => {
                report.outcome = CycleOutcome::StoreUnavailable(e.to_string());
                return report;
            }
        };

        let query = ListingQuery::new(&filters, since);
        let candidates = match self.fetch(&query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                report.outcome = CycleOutcome::FetchFailed(e.to_string());
                return report;
            }
        };
        report.fetched = candidates.len();

        if candidates.is_empty() {
            if self.deps.options.notify_when_empty {
                self.send_nothing_new(since, &mut report).await;
            }
        } else {
            self.deliver_all(&candidates, &mut report).await;
        }

        if let Some(reason) = &report.blocked {
            self.emit_blocked(reason.clone());
        }

        if report.is_clean() {
            let next = started_at.max(since);
            match self.deps.store.set_watermark(self.user, next).await {
                Ok(_) => {
                    self.watermark = next;
                    report.watermark_advanced = true;
                }
                Err(e) => warn!(user = %self.user, error = %e, "Could not persist watermark"),
            }
        }

        report
    }

    async fn fetch(&self, query: &ListingQuery) -> Result<Vec<Candidate>, ListingsError> {
        let timeout = self.deps.options.fetch_timeout;
        match tokio::time::timeout(timeout, self.deps.listings.fetch(query)).await {
            Ok(result) => result,
            Err(_) => Err(ListingsError::Timeout(timeout.as_secs())),
        }
    }

    /// Deliver candidates in API order, skipping those already seen.
    async fn deliver_all(&self, candidates: &[Candidate], report: &mut CycleReport) {
        for candidate in candidates {
            match self.deps.store.is_seen(self.user, &candidate.id).await {
                Ok(true) => {
                    report.already_seen += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(user = %self.user, posting = %candidate.id, error = %e, "Seen check failed, skipping");
                    report.store_errors += 1;
                    continue;
                }
            }

            let delivery = match self.deps.renderer.vacancy(candidate) {
                Ok(notification) => self.deps.notifier.send(self.user, &notification).await,
                Err(e) => Err(e),
            };

            match delivery {
                Ok(()) => {
                    report.delivered += 1;
                    debug!(user = %self.user, posting = %candidate.id, "Delivered");
                    if let Err(e) = self.deps.store.mark_seen(self.user, &candidate.id).await {
                        warn!(user = %self.user, posting = %candidate.id, error = %e, "Could not record seen marker");
                        report.store_errors += 1;
                    }
                }
                Err(e) if e.is_permanent() => {
                    warn!(user = %self.user, posting = %candidate.id, error = %e, "Recipient unreachable");
                    report.failed_deliveries += 1;
                    report.blocked.get_or_insert_with(|| e.to_string());
                }
                Err(e) => {
                    warn!(user = %self.user, posting = %candidate.id, error = %e, "Delivery failed");
                    report.failed_deliveries += 1;
                }
            }
        }
    }

    async fn send_nothing_new(&self, since: DateTime<Utc>, report: &mut CycleReport) {
        let delivery = match self.deps.renderer.nothing_new(since, self.interval.minutes()) {
            Ok(notification) => self.deps.notifier.send(self.user, &notification).await,
            Err(e) => Err(e),
        };
        match delivery {
            Ok(()) => report.sent_nothing_new = true,
            Err(NotifyError::Blocked(reason)) => {
                warn!(user = %self.user, reason = %reason, "Recipient unreachable");
                report.blocked = Some(reason);
            }
            // Nothing was lost, so this does not hold the watermark back.
            Err(e) => warn!(user = %self.user, error = %e, "Could not send status message"),
        }
    }

    fn emit_blocked(&self, reason: String) {
        let Some(events) = &self.deps.events else {
            return;
        };
        if events
            .send(PollerEvent::DeliveryBlocked {
                user: self.user,
                reason,
            })
            .is_err()
        {
            debug!(user = %self.user, "No listener for poller events");
        }
    }
}
