mod common;

use std::sync::Arc;

use common::{closure, launch, setup_pool};
use starbase_watchbot::db::{self, SqliteStore};
use starbase_watchbot::launch_time::LaunchTime;
use starbase_watchbot::model::{
    ChangeType, ClosureStatus, CollectionReport, Domain, OriginalData, RoadClosure,
    WeatherSnapshot,
};
use starbase_watchbot::reconcile::Reconciler;

async fn setup() -> (sqlx::SqlitePool, Reconciler) {
    let pool = setup_pool().await;
    let reconciler = Reconciler::new(Arc::new(SqliteStore::new(pool.clone())));
    (pool, reconciler)
}

#[tokio::test]
async fn closure_posted_then_unchanged_then_updated() {
    let (pool, reconciler) = setup().await;

    let first = reconciler
        .reconcile(CollectionReport::ok(vec![closure("0_6.1.2024", ClosureStatus::Scheduled)]))
        .await;
    assert!(first.success);
    assert_eq!(first.changes().len(), 1);
    assert_eq!(first.changes()[0].change_type, ChangeType::New);
    assert_eq!(first.changes()[0].original_data, OriginalData::Absent);

    let second = reconciler
        .reconcile(CollectionReport::ok(vec![closure("0_6.1.2024", ClosureStatus::Scheduled)]))
        .await;
    assert!(second.success);
    assert!(second.changes().is_empty());

    let third = reconciler
        .reconcile(CollectionReport::ok(vec![closure("0_6.1.2024", ClosureStatus::Canceled)]))
        .await;
    assert!(third.success);
    let change = &third.changes()[0];
    assert_eq!(change.change_type, ChangeType::Updated);
    assert_eq!(change.data.as_ref().unwrap().status, ClosureStatus::Canceled);
    assert_eq!(
        change.original_data.previous().unwrap().status,
        ClosureStatus::Scheduled
    );

    let stored = db::find_one(&pool, Domain::Closures, "0_6.1.2024")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.body["status"], "CANCELED");
}

#[tokio::test]
async fn reconciling_twice_reports_nothing_the_second_time() {
    let (_pool, reconciler) = setup().await;
    let batch = vec![
        closure("0_6.1.2024", ClosureStatus::Scheduled),
        closure("1_6.1.2024", ClosureStatus::Possible),
        closure("0_6.2.2024", ClosureStatus::Scheduled),
    ];
    let first = reconciler.reconcile(CollectionReport::ok(batch.clone())).await;
    assert_eq!(first.changes().len(), 3);
    let second = reconciler.reconcile(CollectionReport::ok(batch)).await;
    assert!(second.success);
    assert!(second.changes().is_empty());
}

#[tokio::test]
async fn stored_key_order_and_storage_fields_do_not_matter() {
    let (pool, reconciler) = setup().await;
    // Same content as `closure(..)`, written by another writer with different
    // key order, a float-typed whole number, and a storage id.
    let body = r#"{"type":"PRIMARY","stopDate":1717286400000.0,"_id":"65f0c0ffee","status":"SCHEDULED","startDate":1717243200000,"closureCode":"0_6.1.2024"}"#;
    sqlx::query("INSERT INTO records (domain, natural_key, body) VALUES (?, ?, ?)")
        .bind(Domain::Closures.as_str())
        .bind("0_6.1.2024")
        .bind(body)
        .execute(&pool)
        .await
        .unwrap();

    let report = reconciler
        .reconcile(CollectionReport::ok(vec![closure("0_6.1.2024", ClosureStatus::Scheduled)]))
        .await;
    assert!(report.success);
    assert!(report.changes().is_empty());
}

#[tokio::test]
async fn repeated_key_in_one_collection_keeps_the_last_record() {
    let (pool, reconciler) = setup().await;
    let batch = || {
        CollectionReport::ok(vec![
            closure("0_6.1.2024", ClosureStatus::Scheduled),
            closure("1_6.1.2024", ClosureStatus::Possible),
            closure("0_6.1.2024", ClosureStatus::Canceled),
        ])
    };

    let first = reconciler.reconcile(batch()).await;
    let kept: Vec<(String, ClosureStatus)> = first
        .changes()
        .iter()
        .map(|c| {
            let d = c.data.as_ref().unwrap();
            (d.closure_code.clone(), d.status)
        })
        .collect();
    assert_eq!(
        kept,
        vec![
            ("1_6.1.2024".to_string(), ClosureStatus::Possible),
            ("0_6.1.2024".to_string(), ClosureStatus::Canceled),
        ]
    );

    for _ in 0..3 {
        let again = reconciler.reconcile(batch()).await;
        assert!(again.success);
        assert!(again.changes().is_empty());
    }
    let stored = db::find_one(&pool, Domain::Closures, "0_6.1.2024")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.body["status"], "CANCELED");
}

#[tokio::test]
async fn failed_collection_leaves_store_untouched() {
    let (pool, reconciler) = setup().await;
    let report = reconciler
        .reconcile::<RoadClosure>(CollectionReport::failed())
        .await;
    assert!(!report.success);
    assert!(report.changes.is_none());
    assert!(db::find_all(&pool, Domain::Closures).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_passes_of_one_domain_report_a_record_once() {
    let (_pool, reconciler) = setup().await;
    let batch = || CollectionReport::ok(vec![closure("0_6.1.2024", ClosureStatus::Scheduled)]);

    let (a, b) = tokio::join!(reconciler.reconcile(batch()), reconciler.reconcile(batch()));
    assert!(a.success && b.success);
    assert_eq!(a.changes().len() + b.changes().len(), 1);
}

#[tokio::test]
async fn renamed_mission_is_new_and_old_record_stays() {
    let (pool, reconciler) = setup().await;
    let time = LaunchTime::Exact {
        start_date: 1_763_130_600_000,
    };
    reconciler
        .reconcile(CollectionReport::ok(vec![launch("Starlink 10-1", time)]))
        .await;
    let report = reconciler
        .reconcile(CollectionReport::ok(vec![launch("Starlink Group 10-1", time)]))
        .await;
    assert_eq!(report.changes().len(), 1);
    assert_eq!(report.changes()[0].change_type, ChangeType::New);
    assert_eq!(db::find_all(&pool, Domain::Launches).await.unwrap().len(), 2);
}

#[tokio::test]
async fn weather_replaces_the_single_snapshot() {
    let (pool, reconciler) = setup().await;
    let snapshot = |t: f64| {
        let mut map = serde_json::Map::new();
        map.insert("id".into(), serde_json::json!("KXMR"));
        map.insert("temperature".into(), serde_json::json!(t));
        WeatherSnapshot(map)
    };

    let first = reconciler
        .replace_weather(CollectionReport::ok(vec![snapshot(80.0)]))
        .await;
    assert_eq!(first.changes()[0].change_type, ChangeType::Updated);
    assert_eq!(first.changes()[0].original_data, OriginalData::Absent);

    let second = reconciler
        .replace_weather(CollectionReport::ok(vec![snapshot(80.0)]))
        .await;
    assert_eq!(second.changes().len(), 1);
    assert_eq!(
        second.changes()[0]
            .original_data
            .previous()
            .and_then(|w| w.number("temperature")),
        Some(80.0)
    );
    let stored = db::find_all(&pool, Domain::Weather).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].body["id"], "KXMR");
}
