//! Launch reminders: one day-before and one hour-before announcement per
//! upcoming launch, re-derived whenever the launch changes.
//!
//! Rescheduling a mission always cancels its previous pair first, so a mission
//! never has more than two live timers. Reminder text is rendered at schedule
//! time, including the booster cross-reference.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::db::RecordStore;
use crate::handlers::{assigned_boosters, launch_body, launch_tags};
use crate::model::{ChangeReport, ChannelClass, Domain, Launch};
use crate::outbox::{AnnounceQueue, Announcement};
use crate::timer::ExtendedTimeout;

pub const DAY_MS: i64 = 86_400_000;
pub const HOUR_MS: i64 = 3_600_000;

/// Timers armed for one mission.
#[derive(Debug, Default)]
struct PendingReminder {
    day_before: Option<ExtendedTimeout>,
    hour_before: Option<ExtendedTimeout>,
}

impl PendingReminder {
    fn timers(&self) -> impl Iterator<Item = &ExtendedTimeout> {
        self.day_before.iter().chain(self.hour_before.iter())
    }

    fn cancel(&self) {
        self.timers().for_each(ExtendedTimeout::cancel);
    }

    fn active(&self) -> usize {
        self.timers().filter(|t| t.is_active()).count()
    }
}

pub struct ReminderScheduler {
    store: Arc<dyn RecordStore>,
    queue: AnnounceQueue,
    pending: Mutex<HashMap<String, PendingReminder>>,
}

impl ReminderScheduler {
    pub fn new(store: Arc<dyn RecordStore>, queue: AnnounceQueue) -> Self {
        Self {
            store,
            queue,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub async fn schedule(&self, launch: &Launch) -> Result<usize> {
        self.schedule_at(launch, chrono::Utc::now().timestamp_millis())
            .await
    }

    /// Cancel the mission's reminders and arm new ones relative to `now`
    /// (unix milliseconds). Returns the number of timers armed.
    #[instrument(skip_all, fields(mission = %launch.mission))]
    pub async fn schedule_at(&self, launch: &Launch, now: i64) -> Result<usize> {
        let start = launch
            .time
            .concrete_start()
            .filter(|start| start - now > HOUR_MS);
        let prepared = match start {
            Some(start) => self.prepare(launch).await.map(|msgs| Some((start, msgs))),
            None => Ok(None),
        };

        let mut pending = self.pending.lock().await;
        if let Some(old) = pending.remove(&launch.mission) {
            old.cancel();
        }
        pending.retain(|_, p| p.active() > 0);

        let Some((start, (day_msg, hour_msg))) = prepared? else {
            return Ok(0);
        };
        let until_start = start - now;
        let label = format!("launch_{}", launch.mission);
        let entry = PendingReminder {
            day_before: self.arm(until_start - DAY_MS, &label, day_msg),
            hour_before: self.arm(until_start - HOUR_MS, &label, hour_msg),
        };
        let armed = entry.active();
        pending.insert(launch.mission.clone(), entry);
        info!(armed, "launch reminders scheduled");
        Ok(armed)
    }

    async fn prepare(&self, launch: &Launch) -> Result<(Announcement, Announcement)> {
        let boosters = assigned_boosters(self.store.as_ref(), launch).await?;
        let time = launch.time.render(launch.net);
        let reminder = |title: &str, heading: &str| {
            Announcement::new(
                ChannelClass::LaunchReminder,
                launch_body(heading, launch, time.clone(), launch.launch_site.clone(), &boosters),
            )
            .with_title(title)
            .with_tags(launch_tags(launch))
        };
        Ok((
            reminder("Launch Notice", "L-24h Reminder!"),
            reminder("Launch Alert", "L-1h Reminder!"),
        ))
    }

    fn arm(&self, delay_ms: i64, label: &str, msg: Announcement) -> Option<ExtendedTimeout> {
        if delay_ms <= 0 {
            return None;
        }
        let queue = self.queue.clone();
        let timer = ExtendedTimeout::spawn(
            Duration::from_millis(delay_ms as u64),
            label,
            move || {
                queue.enqueue(msg);
                std::future::ready(())
            },
        );
        debug!(timer = %timer.id(), label = timer.label(), delay_ms, "reminder armed");
        Some(timer)
    }

    pub async fn cancel(&self, mission: &str) {
        if let Some(old) = self.pending.lock().await.remove(mission) {
            old.cancel();
        }
    }

    /// Live timers for `mission`.
    pub async fn active_timers(&self, mission: &str) -> usize {
        self.pending
            .lock()
            .await
            .get(mission)
            .map(PendingReminder::active)
            .unwrap_or(0)
    }

    /// Re-derive reminders for every NEW/UPDATED launch. One mission failing
    /// never stops the others.
    pub async fn handle_changes(&self, report: &ChangeReport<Launch>) {
        if !report.success {
            return;
        }
        for change in report.changes() {
            let Some(launch) = &change.data else {
                continue;
            };
            if let Err(err) = self.schedule(launch).await {
                warn!(mission = %launch.mission, ?err, "failed to schedule launch reminders");
            }
        }
    }

    /// Cold start: arm reminders for stored launches more than an hour away.
    pub async fn register_existing(&self) -> Result<usize> {
        self.register_existing_at(chrono::Utc::now().timestamp_millis())
            .await
    }

    #[instrument(skip_all)]
    pub async fn register_existing_at(&self, now: i64) -> Result<usize> {
        info!("registering existing launch reminders");
        let mut registered = 0;
        for stored in self.store.find_all(Domain::Launches).await? {
            let launch = match serde_json::from_value::<Launch>(stored.body) {
                Ok(launch) => launch,
                Err(err) => {
                    warn!(key = %stored.natural_key, ?err, "stored launch does not decode");
                    continue;
                }
            };
            if !launch
                .time
                .concrete_start()
                .is_some_and(|start| start - now > HOUR_MS)
            {
                continue;
            }
            match self.schedule_at(&launch, now).await {
                Ok(_) => registered += 1,
                Err(err) => {
                    warn!(mission = %launch.mission, ?err, "failed to schedule launch reminders");
                }
            }
        }
        info!(registered, "existing launch reminders registered");
        Ok(registered)
    }
}
