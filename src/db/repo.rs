use super::model::{StoredRecord, UpsertRow, WatchEntry};
use crate::model::Domain;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

// Stay well below SQLite's bound-parameter limit.
const KEY_CHUNK: usize = 500;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    if normalized.starts_with("sqlite::memory") {
        return init_memory_pool().await;
    }
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("connect {normalized}"))?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Single-connection in-memory database; every pooled connection would
/// otherwise see its own empty database.
pub async fn init_memory_pool() -> Result<Pool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // The database file is created on first start.
    let mut rebuilt = format!("sqlite://{expanded_path}");
    match query_part {
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            if !q.contains("mode=") {
                rebuilt.push_str("&mode=rwc");
            }
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn record_from_row(row: &SqliteRow) -> Result<StoredRecord> {
    let body: String = row.get("body");
    let natural_key: String = row.get("natural_key");
    Ok(StoredRecord {
        id: row.get("id"),
        body: serde_json::from_str(&body)
            .with_context(|| format!("decode stored body for {natural_key}"))?,
        natural_key,
    })
}

/// All stored records of `domain` whose natural key is one of `keys`.
#[instrument(skip_all, fields(domain = %domain, keys = keys.len()))]
pub async fn find_by_keys(pool: &Pool, domain: Domain, keys: &[String]) -> Result<Vec<StoredRecord>> {
    let mut out = Vec::new();
    for chunk in keys.chunks(KEY_CHUNK) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, natural_key, body FROM records WHERE domain = ");
        qb.push_bind(domain.as_str());
        qb.push(" AND natural_key IN (");
        let mut separated = qb.separated(", ");
        for key in chunk {
            separated.push_bind(key.as_str());
        }
        separated.push_unseparated(")");
        let rows = qb.build().fetch_all(pool).await?;
        for row in &rows {
            out.push(record_from_row(row)?);
        }
    }
    Ok(out)
}

#[instrument(skip_all, fields(domain = %domain))]
pub async fn find_one(pool: &Pool, domain: Domain, key: &str) -> Result<Option<StoredRecord>> {
    let row = sqlx::query(
        "SELECT id, natural_key, body FROM records WHERE domain = ? AND natural_key = ?",
    )
    .bind(domain.as_str())
    .bind(key)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(record_from_row).transpose()
}

#[instrument(skip_all, fields(domain = %domain))]
pub async fn find_all(pool: &Pool, domain: Domain) -> Result<Vec<StoredRecord>> {
    let rows = sqlx::query("SELECT id, natural_key, body FROM records WHERE domain = ? ORDER BY id")
        .bind(domain.as_str())
        .fetch_all(pool)
        .await?;
    rows.iter().map(record_from_row).collect()
}

/// Upsert every row by `(domain, natural_key)` in one transaction. Returns the
/// number of rows written.
#[instrument(skip_all, fields(domain = %domain, rows = rows.len()))]
pub async fn upsert_batch(pool: &Pool, domain: Domain, rows: &[UpsertRow]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut written = 0u64;
    for row in rows {
        let body = serde_json::to_string(&row.body)?;
        let res = sqlx::query(
            "INSERT INTO records (domain, natural_key, body) VALUES (?, ?, ?) \
             ON CONFLICT(domain, natural_key) DO UPDATE SET body = excluded.body, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(domain.as_str())
        .bind(&row.natural_key)
        .bind(body)
        .execute(&mut *tx)
        .await?;
        written += res.rows_affected();
    }
    tx.commit().await?;
    Ok(written)
}

/// Insert or refresh a live watch entry. Returns `true` when the entry had
/// been marked removed and is live again.
#[instrument(skip_all)]
pub async fn upsert_watch(pool: &Pool, notam_id: &str, expires_at: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let removed = sqlx::query_scalar::<_, bool>("SELECT removed FROM notam_watch WHERE notam_id = ?")
        .bind(notam_id)
        .fetch_optional(&mut *tx)
        .await?;
    if removed.is_some() {
        sqlx::query("UPDATE notam_watch SET expires_at = ?, removed = 0 WHERE notam_id = ?")
            .bind(expires_at)
            .bind(notam_id)
            .execute(&mut *tx)
            .await?;
    } else {
        sqlx::query("INSERT INTO notam_watch (notam_id, expires_at) VALUES (?, ?)")
            .bind(notam_id)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(removed == Some(true))
}

#[instrument(skip_all)]
pub async fn list_watches(pool: &Pool) -> Result<Vec<WatchEntry>> {
    let rows = sqlx::query("SELECT notam_id, expires_at, removed FROM notam_watch ORDER BY notam_id")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|r| WatchEntry {
            notam_id: r.get("notam_id"),
            expires_at: r.get("expires_at"),
            removed: r.get("removed"),
        })
        .collect())
}

#[instrument(skip_all)]
pub async fn mark_watch_removed(pool: &Pool, notam_id: &str) -> Result<()> {
    sqlx::query("UPDATE notam_watch SET removed = 1 WHERE notam_id = ?")
        .bind(notam_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn delete_watch(pool: &Pool, notam_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM notam_watch WHERE notam_id = ?")
        .bind(notam_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn setup_pool() -> Pool {
        let pool = init_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn row(key: &str, body: serde_json::Value) -> UpsertRow {
        UpsertRow {
            natural_key: key.to_string(),
            body,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_find() {
        let pool = setup_pool().await;
        let written = upsert_batch(
            &pool,
            Domain::Closures,
            &[row("0_6.1.2024", json!({"a": 1})), row("1_6.1.2024", json!({"a": 2}))],
        )
        .await
        .unwrap();
        assert_eq!(written, 2);

        // Same key in another domain is a different record.
        upsert_batch(&pool, Domain::Notams, &[row("0_6.1.2024", json!({"n": 1}))])
            .await
            .unwrap();

        let found = find_by_keys(
            &pool,
            Domain::Closures,
            &["0_6.1.2024".to_string(), "missing".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].body, json!({"a": 1}));

        // Upsert replaces the body in place.
        upsert_batch(&pool, Domain::Closures, &[row("0_6.1.2024", json!({"a": 9}))])
            .await
            .unwrap();
        let one = find_one(&pool, Domain::Closures, "0_6.1.2024")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(one.body, json!({"a": 9}));
        assert_eq!(one.id, found[0].id);
        assert_eq!(find_all(&pool, Domain::Closures).await.unwrap().len(), 2);
        assert!(find_one(&pool, Domain::Launches, "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_keys_chunks() {
        let pool = setup_pool().await;
        let rows: Vec<UpsertRow> = (0..1200).map(|i| row(&format!("k{i}"), json!(i))).collect();
        upsert_batch(&pool, Domain::Boosters, &rows).await.unwrap();
        let keys: Vec<String> = rows.iter().map(|r| r.natural_key.clone()).collect();
        let found = find_by_keys(&pool, Domain::Boosters, &keys).await.unwrap();
        assert_eq!(found.len(), 1200);
    }

    #[tokio::test]
    async fn test_watch_lifecycle() {
        let pool = setup_pool().await;
        assert!(!upsert_watch(&pool, "4/1234", 100).await.unwrap());
        assert!(!upsert_watch(&pool, "4/1234", 200).await.unwrap());
        let watches = list_watches(&pool).await.unwrap();
        assert_eq!(
            watches,
            vec![WatchEntry {
                notam_id: "4/1234".into(),
                expires_at: 200,
                removed: false,
            }]
        );

        mark_watch_removed(&pool, "4/1234").await.unwrap();
        assert!(list_watches(&pool).await.unwrap()[0].removed);
        assert!(upsert_watch(&pool, "4/1234", 300).await.unwrap());
        assert!(!list_watches(&pool).await.unwrap()[0].removed);

        delete_watch(&pool, "4/1234").await.unwrap();
        assert!(list_watches(&pool).await.unwrap().is_empty());
        assert!(!upsert_watch(&pool, "4/1234", 200).await.unwrap());
    }

    #[test]
    fn test_prepare_sqlite_url() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested/watchbot.db");
        let url = prepare_sqlite_url(&format!("sqlite://{}", path.display()));
        assert_eq!(url, format!("sqlite://{}?mode=rwc", path.display()));
        assert!(td.path().join("nested").exists());
    }
}
