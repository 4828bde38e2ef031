//! NOTAM watch-list: detects restrictions that silently leave the upstream
//! listing before they expire (REMOVED) and restrictions that come back with
//! identical content (repost).
//!
//! Every watched NOTAM has one `notam_watch` row holding its stop date. A
//! removal marks the row instead of deleting it, so only a NOTAM that was
//! reported removed can be reported reposted. Rows are dropped at expiry.
//! The watch-list runs after the main diff, under the same domain lock, and
//! its failures are logged without failing the pass.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::canonical;
use crate::db::{RecordStore, WatchStore};
use crate::model::{ChangeItem, ChangeReport, CollectionReport, Domain, Notam};
use crate::reconcile::Reconciler;

pub struct NotamWatchList {
    watches: Arc<dyn WatchStore>,
}

impl NotamWatchList {
    pub fn new(watches: Arc<dyn WatchStore>) -> Self {
        Self { watches }
    }

    pub async fn reconcile(
        &self,
        reconciler: &Reconciler,
        report: CollectionReport<Notam>,
    ) -> ChangeReport<Notam> {
        let now = chrono::Utc::now().timestamp_millis();
        self.reconcile_at(reconciler, report, now).await
    }

    /// One NOTAM pass evaluated at `now` (unix milliseconds). Changes are
    /// ordered: NEW/UPDATED in input order, then reposts, then removals.
    pub async fn reconcile_at(
        &self,
        reconciler: &Reconciler,
        report: CollectionReport<Notam>,
        now: i64,
    ) -> ChangeReport<Notam> {
        let Some(fresh) = report.into_records() else {
            warn!(domain = %Domain::Notams, "collection failed; skipping reconciliation");
            return ChangeReport::failed(None);
        };

        let _guard = reconciler.lock(Domain::Notams).await;
        let outcome = match reconciler.reconcile_locked(&fresh).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(domain = %Domain::Notams, %err, "reconciliation failed");
                return ChangeReport::failed(Some(err.to_string()));
            }
        };

        let mut changes = outcome.changes;
        changes.extend(self.track(&fresh, &outcome.unchanged, now).await);
        changes.extend(self.sweep(reconciler.store().as_ref(), &fresh, now).await);
        ChangeReport::ok(changes)
    }

    /// Refresh the watch entry of every live fresh NOTAM. A NOTAM whose entry
    /// was marked removed and whose stored content is unchanged has been
    /// reposted.
    #[instrument(skip_all, fields(fresh = fresh.len()))]
    async fn track(
        &self,
        fresh: &[Notam],
        unchanged: &HashSet<String>,
        now: i64,
    ) -> Vec<ChangeItem<Notam>> {
        let mut reposts = Vec::new();
        for notam in fresh {
            // Past its stop date: nothing left to watch for.
            if notam.stop_date <= now {
                if let Err(err) = self.watches.delete_watch(&notam.notam_id).await {
                    warn!(notam_id = %notam.notam_id, ?err, "failed to drop expired notam watch");
                }
                continue;
            }
            match self.watches.upsert_watch(&notam.notam_id, notam.stop_date).await {
                Ok(true) if unchanged.contains(&notam.notam_id) => {
                    info!(notam_id = %notam.notam_id, "notam reposted");
                    reposts.push(ChangeItem::repost(notam.clone()));
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(notam_id = %notam.notam_id, ?err, "failed to refresh notam watch");
                }
            }
        }
        reposts
    }

    /// Drop expired entries and report live watched NOTAMs missing from
    /// `fresh`.
    #[instrument(skip_all)]
    async fn sweep(
        &self,
        store: &dyn RecordStore,
        fresh: &[Notam],
        now: i64,
    ) -> Vec<ChangeItem<Notam>> {
        let entries = match self.watches.list_watches().await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(?err, "failed to list notam watches");
                return Vec::new();
            }
        };
        let present: HashSet<&str> = fresh.iter().map(|n| n.notam_id.as_str()).collect();

        let mut removed = Vec::new();
        for entry in entries {
            if entry.expires_at <= now {
                if let Err(err) = self.watches.delete_watch(&entry.notam_id).await {
                    warn!(notam_id = %entry.notam_id, ?err, "failed to drop expired notam watch");
                }
                continue;
            }
            if entry.removed || present.contains(entry.notam_id.as_str()) {
                continue;
            }

            let last_known = match store.find_one(Domain::Notams, &entry.notam_id).await {
                Ok(found) => found,
                Err(err) => {
                    warn!(notam_id = %entry.notam_id, ?err, "failed to load removed notam");
                    continue;
                }
            };
            if let Err(err) = self.watches.mark_removed(&entry.notam_id).await {
                // Left live so the removal is retried next pass.
                warn!(notam_id = %entry.notam_id, ?err, "failed to mark notam watch removed");
                continue;
            }
            let Some(stored) = last_known else {
                warn!(notam_id = %entry.notam_id, "watched notam has no stored record");
                continue;
            };
            let mut body = stored.body;
            canonical::strip_storage_fields(&mut body);
            match serde_json::from_value::<Notam>(body) {
                Ok(notam) => {
                    info!(notam_id = %entry.notam_id, "notam removed before expiry");
                    removed.push(ChangeItem::removed(notam));
                }
                Err(err) => {
                    warn!(notam_id = %entry.notam_id, ?err, "stored notam does not decode");
                }
            }
        }
        removed
    }
}
