#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use starbase_watchbot::collect::Collector;
use starbase_watchbot::db::{self, RecordStore, StoredRecord, UpsertRow, WatchEntry, WatchStore};
use starbase_watchbot::launch_time::LaunchTime;
use starbase_watchbot::model::{
    Affiliation, ClosureKind, ClosureStatus, CollectionReport, Domain, Launch, Notam, RoadClosure,
};
use starbase_watchbot::outbox::Announcement;
use starbase_watchbot::telegram::Announcer;

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = db::init_memory_pool().await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

/// Store double without I/O, usable under paused time.
#[derive(Default)]
pub struct MemStore {
    rows: Mutex<HashMap<Domain, BTreeMap<String, serde_json::Value>>>,
    watches: Mutex<BTreeMap<String, (i64, bool)>>,
}

impl MemStore {
    pub fn insert<T: serde::Serialize>(&self, domain: Domain, key: &str, record: &T) {
        self.rows
            .lock()
            .unwrap()
            .entry(domain)
            .or_default()
            .insert(key.to_string(), serde_json::to_value(record).unwrap());
    }

    pub fn count(&self, domain: Domain) -> usize {
        self.rows
            .lock()
            .unwrap()
            .get(&domain)
            .map_or(0, |rows| rows.len())
    }
}

fn stored(key: &str, body: &serde_json::Value) -> StoredRecord {
    StoredRecord {
        id: 1,
        natural_key: key.to_string(),
        body: body.clone(),
    }
}

#[async_trait]
impl RecordStore for MemStore {
    async fn find_by_keys(&self, domain: Domain, keys: &[String]) -> Result<Vec<StoredRecord>> {
        let rows = self.rows.lock().unwrap();
        let Some(rows) = rows.get(&domain) else {
            return Ok(Vec::new());
        };
        Ok(keys
            .iter()
            .filter_map(|k| rows.get(k).map(|body| stored(k, body)))
            .collect())
    }

    async fn find_one(&self, domain: Domain, key: &str) -> Result<Option<StoredRecord>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(&domain)
            .and_then(|rows| rows.get(key))
            .map(|body| stored(key, body)))
    }

    async fn find_all(&self, domain: Domain) -> Result<Vec<StoredRecord>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .get(&domain)
            .map(|rows| rows.iter().map(|(k, body)| stored(k, body)).collect())
            .unwrap_or_default())
    }

    async fn upsert_batch(&self, domain: Domain, rows: &[UpsertRow]) -> Result<u64> {
        let mut stored = self.rows.lock().unwrap();
        let table = stored.entry(domain).or_default();
        for row in rows {
            table.insert(row.natural_key.clone(), row.body.clone());
        }
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl WatchStore for MemStore {
    async fn upsert_watch(&self, notam_id: &str, expires_at: i64) -> Result<bool> {
        let previous = self
            .watches
            .lock()
            .unwrap()
            .insert(notam_id.to_string(), (expires_at, false));
        Ok(matches!(previous, Some((_, true))))
    }

    async fn list_watches(&self) -> Result<Vec<WatchEntry>> {
        Ok(self
            .watches
            .lock()
            .unwrap()
            .iter()
            .map(|(id, (expires_at, removed))| WatchEntry {
                notam_id: id.clone(),
                expires_at: *expires_at,
                removed: *removed,
            })
            .collect())
    }

    async fn mark_removed(&self, notam_id: &str) -> Result<()> {
        if let Some(entry) = self.watches.lock().unwrap().get_mut(notam_id) {
            entry.1 = true;
        }
        Ok(())
    }

    async fn delete_watch(&self, notam_id: &str) -> Result<()> {
        self.watches.lock().unwrap().remove(notam_id);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingAnnouncer {
    sent: Arc<Mutex<Vec<Announcement>>>,
}

impl RecordingAnnouncer {
    pub fn sent(&self) -> Vec<Announcement> {
        self.sent.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|a| a.title.unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn announce(&self, item: &Announcement) -> bool {
        self.sent.lock().unwrap().push(item.clone());
        true
    }
}

/// Hands out scripted reports, then empty successful ones.
pub struct ScriptedCollector<T> {
    reports: Mutex<VecDeque<CollectionReport<T>>>,
    calls: Mutex<u32>,
}

impl<T> ScriptedCollector<T> {
    pub fn new(reports: Vec<CollectionReport<T>>) -> Self {
        Self {
            reports: Mutex::new(reports.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl<T: Send + Sync> Collector<T> for ScriptedCollector<T> {
    async fn collect(&self) -> CollectionReport<T> {
        *self.calls.lock().unwrap() += 1;
        self.reports
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| CollectionReport::ok(Vec::new()))
    }
}

pub fn closure(code: &str, status: ClosureStatus) -> RoadClosure {
    RoadClosure {
        closure_code: code.into(),
        start_date: 1_717_243_200_000,
        stop_date: 1_717_286_400_000,
        status,
        kind: ClosureKind::Primary,
    }
}

pub fn notam(id: &str, start_date: i64, stop_date: i64) -> Notam {
    Notam {
        notam_id: id.into(),
        altitude: Notam::UNLIMITED_ALTITUDE,
        image_url: format!("https://tfr.example/{id}.gif"),
        issued_date: start_date - 86_400_000,
        notam_url: format!("https://tfr.example/{id}"),
        start_date,
        stop_date,
    }
}

pub fn launch(mission: &str, time: LaunchTime) -> Launch {
    Launch {
        mission: mission.into(),
        vehicle: "Falcon 9".into(),
        date: "2025-11-14".into(),
        description: "A batch of Starlink satellites for SpaceX.".into(),
        launch_site: "SLC-40".into(),
        affiliations: vec![Affiliation::SpaceX],
        net: false,
        time,
    }
}
