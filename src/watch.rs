//! Per-domain poll loops and the process-wide error throttle.
//!
//! Every pass is collect, reconcile, then hand the report to the domain's
//! consumers. A failed collection or merge skips the consumers and is reported
//! through [`ErrorThrottle`]; the next tick simply tries again.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

use crate::collect::Collectors;
use crate::config::Sources;
use crate::handlers;
use crate::model::{ChangeReport, CollectionReport, Domain};
use crate::notams::NotamWatchList;
use crate::outbox::AnnounceQueue;
use crate::reconcile::Reconciler;
use crate::reminders::ReminderScheduler;

/// Intervals above this get an early first pass.
pub const EARLY_START_THRESHOLD: Duration = Duration::from_secs(20);
pub const EARLY_START_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Collection,
    Merge,
}

impl Failure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Failure::Collection => "SCRAPE_FAILURE",
            Failure::Merge => "DB_MERGE_FAILURE",
        }
    }
}

#[derive(Debug, Default)]
struct ThrottleState {
    last_report: Option<Instant>,
    suppressed: u64,
}

/// Reports failures at most once per cooldown window; the rest are counted
/// and folded into the next report.
#[derive(Debug)]
pub struct ErrorThrottle {
    cooldown: Duration,
    state: Mutex<ThrottleState>,
}

impl ErrorThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    /// Returns `true` when this failure was reported rather than suppressed.
    pub fn report(&self, failure: Failure, domain: Domain, message: Option<&str>) -> bool {
        self.report_at(Instant::now(), failure, domain, message)
    }

    pub fn report_at(
        &self,
        now: Instant,
        failure: Failure,
        domain: Domain,
        message: Option<&str>,
    ) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let open = state
            .last_report
            .map_or(true, |last| now.duration_since(last) >= self.cooldown);
        if !open {
            state.suppressed += 1;
            debug!(%domain, category = failure.as_str(), suppressed = state.suppressed, "error report throttled");
            return false;
        }
        let suppressed = std::mem::take(&mut state.suppressed);
        state.last_report = Some(now);
        error!(
            %domain,
            category = failure.as_str(),
            message = message.unwrap_or(""),
            suppressed,
            "poll pass failed"
        );
        true
    }
}

/// What one successful pass produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub domain: Domain,
    pub changes: usize,
    pub announced: usize,
}

impl PassSummary {
    fn new<T>(domain: Domain, report: &ChangeReport<T>, announced: usize) -> Self {
        Self {
            domain,
            changes: report.changes().len(),
            announced,
        }
    }
}

/// Delay before a domain's first pass.
pub fn first_delay(interval: Duration) -> Duration {
    if interval > EARLY_START_THRESHOLD {
        EARLY_START_DELAY
    } else {
        interval
    }
}

pub struct Watcher {
    reconciler: Arc<Reconciler>,
    notams: NotamWatchList,
    reminders: Arc<ReminderScheduler>,
    queue: AnnounceQueue,
    collectors: Collectors,
    throttle: ErrorThrottle,
}

impl Watcher {
    pub fn new(
        reconciler: Arc<Reconciler>,
        notams: NotamWatchList,
        reminders: Arc<ReminderScheduler>,
        queue: AnnounceQueue,
        collectors: Collectors,
        throttle: ErrorThrottle,
    ) -> Self {
        Self {
            reconciler,
            notams,
            reminders,
            queue,
            collectors,
            throttle,
        }
    }

    fn collected<T>(&self, domain: Domain, report: &CollectionReport<T>) -> bool {
        if !report.success {
            self.throttle.report(Failure::Collection, domain, None);
        }
        report.success
    }

    fn merged<T>(&self, domain: Domain, report: &ChangeReport<T>) -> bool {
        if !report.success {
            self.throttle
                .report(Failure::Merge, domain, report.message.as_deref());
        }
        report.success
    }

    /// One collect/reconcile/consume pass. `None` when the pass failed.
    #[instrument(skip(self))]
    pub async fn poll(&self, domain: Domain) -> Option<PassSummary> {
        let queue = &self.queue;
        let summary = match domain {
            Domain::Boosters => {
                let collected = self.collectors.boosters.collect().await;
                if !self.collected(domain, &collected) {
                    return None;
                }
                let report = self.reconciler.reconcile(collected).await;
                if !self.merged(domain, &report) {
                    return None;
                }
                PassSummary::new(domain, &report, handlers::announce_boosters(queue, &report))
            }
            Domain::Closures => {
                let collected = self.collectors.closures.collect().await;
                if !self.collected(domain, &collected) {
                    return None;
                }
                let report = self.reconciler.reconcile(collected).await;
                if !self.merged(domain, &report) {
                    return None;
                }
                PassSummary::new(domain, &report, handlers::announce_closures(queue, &report))
            }
            Domain::Launches => {
                let collected = self.collectors.launches.collect().await;
                if !self.collected(domain, &collected) {
                    return None;
                }
                let report = self.reconciler.reconcile(collected).await;
                if !self.merged(domain, &report) {
                    return None;
                }
                self.reminders.handle_changes(&report).await;
                let store = self.reconciler.store().as_ref();
                let announced = handlers::announce_launches(queue, store, &report).await;
                PassSummary::new(domain, &report, announced)
            }
            Domain::Notams => {
                let collected = self.collectors.notams.collect().await;
                if !self.collected(domain, &collected) {
                    return None;
                }
                let report = self.notams.reconcile(&self.reconciler, collected).await;
                if !self.merged(domain, &report) {
                    return None;
                }
                PassSummary::new(domain, &report, handlers::announce_notams(queue, &report))
            }
            Domain::Weather => {
                let collected = self.collectors.weather.collect().await;
                if !self.collected(domain, &collected) {
                    return None;
                }
                let report = self.reconciler.replace_weather(collected).await;
                if !self.merged(domain, &report) {
                    return None;
                }
                PassSummary::new(domain, &report, handlers::announce_weather(queue, &report))
            }
        };
        info!(changes = summary.changes, announced = summary.announced, "poll pass complete");
        Some(summary)
    }

    /// Poll `domain` forever: early first pass for long intervals, then on a
    /// fixed cadence. Passes of one domain never overlap.
    pub async fn run(&self, domain: Domain, interval: Duration) {
        info!(%domain, interval_ms = interval.as_millis() as u64, "poll loop started");
        let start = Instant::now();
        let first = first_delay(interval);
        if first < interval {
            tokio::time::sleep(first).await;
            self.poll(domain).await;
        }
        let mut ticker = interval_at(start + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll(domain).await;
        }
    }

    /// Spawn a loop for every enabled source.
    pub fn spawn(self: Arc<Self>, sources: &Sources) -> Vec<JoinHandle<()>> {
        Domain::ALL
            .into_iter()
            .filter(|domain| sources.get(*domain).enabled)
            .map(|domain| {
                let interval = sources.get(domain).interval();
                let watcher = Arc::clone(&self);
                tokio::spawn(async move { watcher.run(domain, interval).await })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_intervals_start_early() {
        assert_eq!(first_delay(Duration::from_secs(1800)), EARLY_START_DELAY);
        assert_eq!(first_delay(Duration::from_secs(20)), Duration::from_secs(20));
        assert_eq!(first_delay(Duration::from_secs(3)), Duration::from_secs(3));
    }

    #[test]
    fn throttle_reports_once_per_cooldown() {
        let throttle = ErrorThrottle::new(Duration::from_secs(900));
        let t0 = Instant::now();
        assert!(throttle.report_at(t0, Failure::Collection, Domain::Launches, None));
        assert!(!throttle.report_at(
            t0 + Duration::from_secs(60),
            Failure::Collection,
            Domain::Notams,
            None
        ));
        assert!(!throttle.report_at(
            t0 + Duration::from_secs(899),
            Failure::Merge,
            Domain::Closures,
            Some("boom")
        ));
        assert!(throttle.report_at(
            t0 + Duration::from_secs(900),
            Failure::Collection,
            Domain::Launches,
            None
        ));
        let state = throttle.state.lock().unwrap();
        assert_eq!(state.suppressed, 0);
    }
}
