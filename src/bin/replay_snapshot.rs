use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use starbase_watchbot::collect::records_from_value;
use starbase_watchbot::config;
use starbase_watchbot::db::{self, SqliteStore};
use starbase_watchbot::model::{
    Booster, CollectionReport, Domain, Launch, Notam, RoadClosure, Tracked, WeatherSnapshot,
};
use starbase_watchbot::notams::NotamWatchList;
use starbase_watchbot::reconcile::Reconciler;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Feed a JSON snapshot through one domain's reconciliation and print the change report"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// boosters, closures, launches, notams or weather
    #[arg(long)]
    domain: String,

    /// JSON file holding an array of normalized records
    #[arg(long)]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let domain = Domain::parse_domain(&args.domain)
        .ok_or_else(|| anyhow!("unknown domain '{}'", args.domain))?;
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let raw = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let snapshot: Value = serde_json::from_str(&raw).context("snapshot is not valid JSON")?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));
    let reconciler = Reconciler::new(store.clone());

    info!(%domain, file = %args.file.display(), "replaying snapshot");
    let printed = match domain {
        Domain::Boosters => replay::<Booster>(&reconciler, snapshot).await?,
        Domain::Closures => replay::<RoadClosure>(&reconciler, snapshot).await?,
        Domain::Launches => replay::<Launch>(&reconciler, snapshot).await?,
        Domain::Notams => {
            let report = CollectionReport::ok(records_from_value::<Notam>(snapshot)?);
            let watch = NotamWatchList::new(store);
            pretty(&watch.reconcile(&reconciler, report).await)?
        }
        Domain::Weather => {
            let report = CollectionReport::ok(records_from_value::<WeatherSnapshot>(snapshot)?);
            pretty(&reconciler.replace_weather(report).await)?
        }
    };
    println!("{printed}");
    Ok(())
}

async fn replay<T: Tracked>(reconciler: &Reconciler, snapshot: Value) -> Result<String> {
    let report = CollectionReport::ok(records_from_value::<T>(snapshot)?);
    pretty(&reconciler.reconcile(report).await)
}

fn pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to encode change report")
}
