//! Change detection between a fresh collection and the stored records of one
//! domain.
//!
//! A pass runs under the domain's lock: read the stored records for every
//! fresh key in one query, classify each fresh record as NEW, UPDATED or
//! unchanged by natural key, then write all NEW/UPDATED bodies in one batch.
//! Unchanged records are neither reported nor written.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, instrument, warn};

use crate::canonical;
use crate::db::{RecordStore, UpsertRow};
use crate::model::{
    ChangeItem, ChangeReport, ChangeType, CollectionReport, Domain, OriginalData, Tracked,
    WeatherSnapshot,
};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store failure: {0:#}")]
    Store(anyhow::Error),
    #[error("database performed an unexpected number of results (expected {expected}, wrote {written})")]
    CountMismatch { expected: u64, written: u64 },
    #[error("record codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result of the diff step, before any domain extension runs.
#[derive(Debug)]
pub struct PassOutcome<T> {
    /// NEW and UPDATED items in input order.
    pub changes: Vec<ChangeItem<T>>,
    /// Keys of fresh records found stored with equal content.
    pub unchanged: HashSet<String>,
}

impl<T> Default for PassOutcome<T> {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
            unchanged: HashSet::new(),
        }
    }
}

pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    locks: [Mutex<()>; Domain::COUNT],
}

impl Reconciler {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            locks: Default::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Serializes read → diff → write for one domain.
    pub async fn lock(&self, domain: Domain) -> MutexGuard<'_, ()> {
        self.locks[domain as usize].lock().await
    }

    /// Run one pass for `T`'s domain. A failed collection is reported as
    /// failure without touching the store.
    pub async fn reconcile<T: Tracked>(&self, report: CollectionReport<T>) -> ChangeReport<T> {
        let Some(fresh) = report.into_records() else {
            warn!(domain = %T::DOMAIN, "collection failed; skipping reconciliation");
            return ChangeReport::failed(None);
        };
        let _guard = self.lock(T::DOMAIN).await;
        match self.reconcile_locked(&fresh).await {
            Ok(outcome) => ChangeReport::ok(outcome.changes),
            Err(err) => {
                warn!(domain = %T::DOMAIN, %err, "reconciliation failed");
                ChangeReport::failed(Some(err.to_string()))
            }
        }
    }

    /// Diff and write `fresh`. The caller must hold `lock(T::DOMAIN)`.
    #[instrument(skip_all, fields(domain = %T::DOMAIN, fresh = fresh.len()))]
    pub async fn reconcile_locked<T: Tracked>(
        &self,
        fresh: &[T],
    ) -> Result<PassOutcome<T>, ReconcileError> {
        if fresh.is_empty() {
            return Ok(PassOutcome::default());
        }

        let fresh = latest_per_key(fresh);
        let keys: Vec<String> = fresh.iter().map(|(_, key)| key.clone()).collect();
        let existing: HashMap<String, serde_json::Value> = self
            .store
            .find_by_keys(T::DOMAIN, &keys)
            .await
            .map_err(ReconcileError::Store)?
            .into_iter()
            .map(|r| (r.natural_key, r.body))
            .collect();

        let mut outcome = PassOutcome::default();
        let mut rows = Vec::new();
        for (record, key) in fresh {
            let mut body = serde_json::to_value(record)?;
            canonical::strip_storage_fields(&mut body);
            match existing.get(&key) {
                None => {
                    outcome.changes.push(ChangeItem::new_record(record.clone()));
                }
                Some(stored) if T::content_eq(stored, &body) => {
                    outcome.unchanged.insert(key);
                    continue;
                }
                Some(stored) => {
                    let mut previous = stored.clone();
                    canonical::strip_storage_fields(&mut previous);
                    let previous: T = serde_json::from_value(previous)?;
                    outcome
                        .changes
                        .push(ChangeItem::updated(record.clone(), previous));
                }
            }
            rows.push(UpsertRow {
                natural_key: key,
                body,
            });
        }

        self.write_rows(T::DOMAIN, &rows).await?;
        debug!(
            changes = outcome.changes.len(),
            unchanged = outcome.unchanged.len(),
            "diff applied"
        );
        Ok(outcome)
    }

    /// Weather is a single-row telemetry stream: every poll replaces the
    /// stored snapshot and is reported as UPDATED.
    pub async fn replace_weather(
        &self,
        report: CollectionReport<WeatherSnapshot>,
    ) -> ChangeReport<WeatherSnapshot> {
        let Some(mut fresh) = report.into_records() else {
            warn!(domain = %Domain::Weather, "collection failed; skipping reconciliation");
            return ChangeReport::failed(None);
        };
        let Some(snapshot) = fresh.pop() else {
            return ChangeReport::ok(Vec::new());
        };
        let _guard = self.lock(Domain::Weather).await;
        match self.replace_weather_locked(snapshot).await {
            Ok(item) => ChangeReport::ok(vec![item]),
            Err(err) => {
                warn!(domain = %Domain::Weather, %err, "weather replace failed");
                ChangeReport::failed(Some(err.to_string()))
            }
        }
    }

    #[instrument(skip_all)]
    async fn replace_weather_locked(
        &self,
        snapshot: WeatherSnapshot,
    ) -> Result<ChangeItem<WeatherSnapshot>, ReconcileError> {
        let previous = self
            .store
            .find_one(Domain::Weather, WeatherSnapshot::KEY)
            .await
            .map_err(ReconcileError::Store)?;
        let original_data = match previous {
            Some(stored) => {
                let mut body = stored.body;
                canonical::strip_storage_fields(&mut body);
                OriginalData::Previous(serde_json::from_value(body)?)
            }
            None => OriginalData::Absent,
        };

        let mut body = serde_json::to_value(&snapshot)?;
        canonical::strip_storage_fields(&mut body);
        self.write_rows(
            Domain::Weather,
            &[UpsertRow {
                natural_key: WeatherSnapshot::KEY.to_string(),
                body,
            }],
        )
        .await?;

        Ok(ChangeItem {
            change_type: ChangeType::Updated,
            data: Some(snapshot),
            original_data,
        })
    }

    async fn write_rows(&self, domain: Domain, rows: &[UpsertRow]) -> Result<(), ReconcileError> {
        if rows.is_empty() {
            return Ok(());
        }
        let written = self
            .store
            .upsert_batch(domain, rows)
            .await
            .map_err(ReconcileError::Store)?;
        let expected = rows.len() as u64;
        if written != expected {
            return Err(ReconcileError::CountMismatch { expected, written });
        }
        Ok(())
    }
}

/// Pair each record with its natural key, keeping only the last record seen
/// for a key. Kept records stay in input order.
fn latest_per_key<T: Tracked>(fresh: &[T]) -> Vec<(&T, String)> {
    let keys: Vec<String> = fresh.iter().map(T::natural_key).collect();
    let mut last: HashMap<&str, usize> = HashMap::new();
    for (i, key) in keys.iter().enumerate() {
        if last.insert(key.as_str(), i).is_some() {
            warn!(domain = %T::DOMAIN, key = %key, "duplicate natural key in one collection; keeping the last record");
        }
    }
    let keep: HashSet<usize> = last.into_values().collect();
    fresh
        .iter()
        .zip(keys.iter())
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, (record, key))| (record, key.clone()))
        .collect()
}
