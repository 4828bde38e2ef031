use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use starbase_watchbot::config;
use starbase_watchbot::dashboard::{load_today, render_today};
use starbase_watchbot::db::{self, SqliteStore};

#[derive(Debug, Parser)]
#[command(about = "Render the \"today\" dashboard from the store into a static HTML file")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output file; defaults to {data_dir}/html/index.html
    #[arg(long)]
    out: Option<PathBuf>,
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
    let store = SqliteStore::new(pool);

    let view = load_today(&store, chrono::Utc::now()).await?;
    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(cfg.app.resolved_data_dir()).join("html").join("index.html"));
    if let Some(parent) = out.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&out, render_today(&view))
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;

    println!(
        "Wrote {} ({} closures, {} NOTAMs)",
        out.display(),
        view.closures.len(),
        view.notams.len()
    );
    Ok(())
}
