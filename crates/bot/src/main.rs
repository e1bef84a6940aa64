use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use jobwatch_bot::{CommandHandler, LifecycleListener, UpdatePoller};
use jobwatch_core::config::load_dotenv;
use jobwatch_core::Config;
use jobwatch_listings::{AreaDirectory, HhClient};
use jobwatch_notify::{MessageRenderer, Notification, Notifier, TelegramNotifier};
use jobwatch_scheduler::{PollerDeps, PollerOptions, Supervisor};
use jobwatch_store::{MemoryStore, RedisStore, SettingsStore};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Telegram bot that watches hh.ru and alerts each user about new vacancies.
#[derive(Parser, Debug)]
#[command(name = "jobwatch", version, about)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Config profile; keys are read as {PROFILE}_{KEY} before {KEY}
    #[arg(long, env = "JOBWATCH_PROFILE")]
    profile: Option<String>,

    /// Keep settings in memory instead of Redis (lost on exit)
    #[arg(long)]
    memory_store: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
async fn os_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

async fn open_store(cli: &Cli, config: &Config) -> anyhow::Result<Arc<dyn SettingsStore>> {
    let retention = config.scheduler.seen_retention();
    if cli.memory_store {
        warn!("Using in-memory store, settings will not survive a restart");
        return Ok(Arc::new(MemoryStore::with_retention(retention)));
    }

    let store = RedisStore::connect(&config.redis.connection_url())
        .await
        .with_context(|| format!("failed to connect to Redis at {}", config.redis.addr))?
        .with_seen_retention(retention)
        .with_default_interval(config.scheduler.default_interval_minutes);
    Ok(Arc::new(store))
}

async fn run_updates(
    mut updates: UpdatePoller,
    handler: &CommandHandler,
    replies: &dyn Notifier,
    shutdown: &CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = updates.next_update() => next,
        };

        match next {
            Ok(Some(update)) => {
                let Some((user, text)) = update.text_message() else {
                    continue;
                };
                let reply = handler.handle(user, text).await;
                if let Err(e) = replies.send(user, &Notification::plain(reply)).await {
                    warn!(user = %user, error = %e, "Could not send reply");
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Failed to fetch updates");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = match &cli.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    config.log_summary();

    let token = config
        .telegram
        .bot_token
        .clone()
        .context("TELEGRAM_BOT_TOKEN is not set")?;

    let store = open_store(&cli, &config).await?;

    let http = HhClient::http_client(&config.listings)?;
    let areas = match AreaDirectory::load(&http, &config.listings.api_url).await {
        Ok(areas) => areas,
        Err(e) => {
            warn!(error = %e, "Could not load hh.ru areas, city filters fall back to default areas");
            AreaDirectory::empty()
        }
    };
    let listings = Arc::new(HhClient::new(http, &config.listings, areas));

    // Long polls hold the connection for poll_timeout_secs.
    let telegram_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.telegram.poll_timeout_secs + 10))
        .build()?;
    let telegram = TelegramNotifier::from_config(token, config.telegram.api_url.clone(), telegram_http)?;
    let notifier = Arc::new(telegram.clone());

    let renderer = match &config.scheduler.vacancy_template {
        Some(template) => MessageRenderer::new()
            .with_vacancy_template(template.as_str())
            .context("JOBWATCH_VACANCY_TEMPLATE is not a valid template")?,
        None => MessageRenderer::new(),
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let deps = PollerDeps::new(store.clone(), listings, notifier.clone())
        .with_options(PollerOptions::from(&config.scheduler))
        .with_renderer(renderer)
        .with_events(events_tx);
    let supervisor = Arc::new(Supervisor::new(deps));

    supervisor
        .on_process_start()
        .await
        .context("failed to load active users")?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = os_signal().await {
                error!(error = %e, "Failed to listen for shutdown signals");
                return;
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        });
    }

    let listener = LifecycleListener::new(store.clone(), supervisor.clone());
    let listener_task = tokio::spawn(listener.run(events_rx, shutdown.clone()));

    let handler = CommandHandler::new(store, supervisor.clone(), config.listings.default_keyword.clone());
    let updates = UpdatePoller::new(telegram, config.telegram.poll_timeout_secs);
    info!("Listening for commands");
    run_updates(updates, &handler, notifier.as_ref(), &shutdown).await;

    supervisor.shutdown().await;
    shutdown.cancel();
    if let Err(e) = listener_task.await {
        warn!(error = %e, "Lifecycle listener ended abnormally");
    }

    info!("jobwatch stopped");
    Ok(())
}
