use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{error, info};

use starbase_watchbot::collect::Collectors;
use starbase_watchbot::config;
use starbase_watchbot::db::{self, SqliteStore};
use starbase_watchbot::notams::NotamWatchList;
use starbase_watchbot::outbox::AnnounceQueue;
use starbase_watchbot::reconcile::Reconciler;
use starbase_watchbot::reminders::ReminderScheduler;
use starbase_watchbot::telegram::TelegramAnnouncer;
use starbase_watchbot::watch::{ErrorThrottle, Watcher};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let announcer = Arc::new(TelegramAnnouncer::new(bot, cfg.telegram.channels.clone()));
    let (queue, queue_worker) = AnnounceQueue::start(announcer, cfg.app.announce_delay());

    let reconciler = Arc::new(Reconciler::new(store.clone()));
    let reminders = Arc::new(ReminderScheduler::new(store.clone(), queue.clone()));
    if let Err(err) = reminders.register_existing().await {
        error!(?err, "failed to register existing launch reminders");
    }

    let watcher = Arc::new(Watcher::new(
        reconciler,
        NotamWatchList::new(store),
        reminders,
        queue,
        Collectors::from_sources(&cfg.sources)?,
        ErrorThrottle::new(cfg.app.error_cooldown()),
    ));
    let loops = watcher.spawn(&cfg.sources);
    info!(loops = loops.len(), "watch loops started");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    for handle in loops {
        handle.abort();
    }
    queue_worker.abort();
    Ok(())
}
