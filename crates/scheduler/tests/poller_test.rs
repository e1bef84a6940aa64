mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use common::{vacancy, Harness, Scripted};
use jobwatch_core::UserKey;
use jobwatch_notify::{MessageFormat, MessageRenderer};
use jobwatch_scheduler::{CycleOutcome, Poller, PollerEvent, PollerOptions};
use jobwatch_store::SettingsStore;

const USER: UserKey = UserKey(42);

async fn registered(h: &Harness) {
    h.store.register_user(USER).await.unwrap();
    h.store
        .set_keywords(USER, &["golang".to_string(), "devops".to_string()])
        .await
        .unwrap();
}

async fn poller(h: &Harness) -> Poller {
    Poller::start(USER, h.deps(), Arc::new(Mutex::new(()))).await
}

#[tokio::test(start_paused = true)]
async fn new_postings_are_delivered_once() {
    let h = Harness::new();
    registered(&h).await;
    let items = vec![
        vacancy("111", "Go developer", "Москва"),
        vacancy("222", "DevOps engineer", "Санкт-Петербург"),
    ];
    h.listings.push(Scripted::Items(items.clone()));
    h.listings.push(Scripted::Items(items));

    let mut poller = poller(&h).await;
    let first = poller.run_cycle().await;
    assert_eq!(first.outcome, CycleOutcome::Completed);
    assert_eq!(first.delivered, 2);
    assert!(first.watermark_advanced);

    let second = poller.run_cycle().await;
    assert_eq!(second.delivered, 0);
    assert_eq!(second.already_seen, 2);
    assert!(second.since >= first.started_at);

    assert_eq!(h.notifier.count_for("111"), 1);
    assert_eq!(h.notifier.count_for("222"), 1);

    let queries = h.listings.queries();
    assert_eq!(queries[0].keywords, vec!["golang", "devops"]);
}

#[tokio::test(start_paused = true)]
async fn messages_follow_api_order_and_use_markdown() {
    let h = Harness::new();
    registered(&h).await;
    h.listings.push(Scripted::Items(vec![
        vacancy("222", "Second", "Москва"),
        vacancy("111", "First", "Москва"),
    ]));

    poller(&h).await.run_cycle().await;

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(user, n)| *user == USER && n.format == MessageFormat::MarkdownV2));
    assert!(sent[0].1.body.contains("/vacancy/222)"));
    assert!(sent[1].1.body.contains("/vacancy/111)"));
}

#[tokio::test(start_paused = true)]
async fn failed_delivery_keeps_the_window_open() {
    let h = Harness::new();
    registered(&h).await;
    let items = vec![
        vacancy("111", "Go developer", "Москва"),
        vacancy("222", "DevOps engineer", "Москва"),
    ];
    h.listings.push(Scripted::Items(items.clone()));
    h.listings.push(Scripted::Items(items));
    h.notifier.fail_on("/vacancy/222)");

    let mut poller = poller(&h).await;
    let first = poller.run_cycle().await;
    assert_eq!(first.delivered, 1);
    assert_eq!(first.failed_deliveries, 1);
    assert!(!first.watermark_advanced);
    assert_eq!(h.store.get_watermark(USER).await.unwrap(), None);

    h.notifier.heal();
    let second = poller.run_cycle().await;
    assert_eq!(second.since, first.since);
    assert_eq!(second.already_seen, 1);
    assert_eq!(second.delivered, 1);
    assert!(second.watermark_advanced);

    assert_eq!(h.notifier.count_for("111"), 1);
    assert_eq!(h.notifier.count_for("222"), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_times_out_without_side_effects() {
    let h = Harness::new();
    registered(&h).await;
    h.listings.push(Scripted::Hang(Duration::from_secs(60)));

    let options = PollerOptions {
        fetch_timeout: Duration::from_secs(10),
        ..PollerOptions::default()
    };
    let mut poller = Poller::start(USER, h.deps_with(options), Arc::new(Mutex::new(()))).await;
    let before = poller.watermark();

    let report = poller.run_cycle().await;
    match &report.outcome {
        CycleOutcome::FetchFailed(msg) => assert!(msg.contains("timed out after 10s")),
        other => panic!("expected fetch failure, got {other:?}"),
    }
    assert!(h.notifier.sent().is_empty());
    assert_eq!(poller.watermark(), before);
    assert_eq!(h.store.get_watermark(USER).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn api_error_skips_the_cycle() {
    let h = Harness::new();
    registered(&h).await;
    h.listings.push(Scripted::Status(503));

    let report = poller(&h).await.run_cycle().await;
    assert!(matches!(report.outcome, CycleOutcome::FetchFailed(ref msg) if msg.contains("503")));
    assert!(!report.watermark_advanced);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_result_sends_status_message() {
    let h = Harness::new();
    registered(&h).await;

    let report = poller(&h).await.run_cycle().await;
    assert!(report.sent_nothing_new);
    assert!(report.watermark_advanced);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.format, MessageFormat::Plain);
    assert!(sent[0].1.body.starts_with("No new vacancies since"));
}

#[tokio::test(start_paused = true)]
async fn empty_result_is_silent_when_configured() {
    let h = Harness::new();
    registered(&h).await;
    let options = PollerOptions {
        notify_when_empty: false,
        ..PollerOptions::default()
    };

    let mut poller = Poller::start(USER, h.deps_with(options), Arc::new(Mutex::new(()))).await;
    let report = poller.run_cycle().await;
    assert!(!report.sent_nothing_new);
    assert!(report.watermark_advanced);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn blocked_recipient_raises_one_event_after_every_candidate_is_tried() {
    let h = Harness::new();
    registered(&h).await;
    h.listings.push(Scripted::Items(vec![
        vacancy("111", "Go developer", "Москва"),
        vacancy("222", "SRE", "Москва"),
        vacancy("333", "Rust developer", "Казань"),
    ]));
    h.notifier.block();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let deps = h.deps().with_events(tx);
    let mut poller = Poller::start(USER, deps, Arc::new(Mutex::new(()))).await;

    let report = poller.run_cycle().await;
    assert_eq!(report.fetched, 3);
    assert_eq!(h.notifier.attempts(), 3);
    assert_eq!(report.failed_deliveries, 3);
    assert!(report.blocked.is_some());
    assert!(!report.watermark_advanced);
    assert_eq!(h.store.seen_count(USER), 0);

    match rx.try_recv() {
        Ok(PollerEvent::DeliveryBlocked { user, reason }) => {
            assert_eq!(user, USER);
            assert!(reason.contains("blocked by the user"));
        }
        other => panic!("expected DeliveryBlocked, got {other:?}"),
    }
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn configured_vacancy_template_is_used_for_delivery() {
    let h = Harness::new();
    registered(&h).await;
    h.listings.push(Scripted::Items(vec![vacancy("111", "Go developer", "Москва")]));

    let renderer = MessageRenderer::new()
        .with_vacancy_template("{{ title | upper }} in {{ location }}")
        .unwrap();
    let deps = h.deps().with_renderer(renderer);
    let mut poller = Poller::start(USER, deps, Arc::new(Mutex::new(()))).await;

    let report = poller.run_cycle().await;
    assert_eq!(report.delivered, 1);
    assert_eq!(h.notifier.bodies(), vec!["GO DEVELOPER in Москва".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn first_fetch_looks_back_one_interval() {
    let h = Harness::new();
    registered(&h).await;
    h.store.set_interval(USER, 60).await.unwrap();

    let before = Utc::now();
    let mut poller = poller(&h).await;
    poller.run_cycle().await;
    let after = Utc::now();

    let since = h.listings.queries()[0].since;
    assert!(since >= before - chrono::Duration::minutes(60));
    assert!(since <= after - chrono::Duration::minutes(60));
}

#[tokio::test(start_paused = true)]
async fn watermark_never_moves_backwards() {
    let h = Harness::new();
    registered(&h).await;
    let mut poller = poller(&h).await;

    // Another poller for the same user got further ahead.
    let ahead = Utc::now() + chrono::Duration::hours(1);
    h.store.set_watermark(USER, ahead).await.unwrap();

    let report = poller.run_cycle().await;
    assert_eq!(report.since, ahead);
    assert!(report.watermark_advanced);
    assert_eq!(h.store.get_watermark(USER).await.unwrap(), Some(ahead));
    assert_eq!(poller.watermark(), ahead);
}

#[tokio::test(start_paused = true)]
async fn stored_interval_is_sanitised() {
    let h = Harness::new();
    registered(&h).await;

    h.store.set_raw_interval(USER, Some(2));
    assert_eq!(poller(&h).await.interval().minutes(), 5);

    h.store.set_raw_interval(USER, Some(-3));
    assert_eq!(poller(&h).await.interval().minutes(), 30);

    h.store.set_raw_interval(USER, None);
    assert_eq!(poller(&h).await.interval().minutes(), 30);
}

#[tokio::test(start_paused = true)]
async fn run_loop_ticks_on_interval_until_cancelled() {
    let h = Harness::new();
    registered(&h).await;
    h.store.set_interval(USER, 5).await.unwrap();

    let stop = CancellationToken::new();
    let task = tokio::spawn(poller(&h).await.run(stop.clone()));

    assert!(common::wait_until(|| h.listings.calls() == 1).await);

    tokio::time::sleep(Duration::from_secs(5 * 60)).await;
    assert!(common::wait_until(|| h.listings.calls() == 2).await);

    stop.cancel();
    task.await.unwrap();

    tokio::time::sleep(Duration::from_secs(60 * 60)).await;
    assert_eq!(h.listings.calls(), 2);
}
