//! Collectors: fetch one upstream feed and normalize it into records.
//!
//! Feeds are JSON documents (an array of records, or one object for
//! single-row feeds such as weather). Any transport or decode failure becomes
//! a failed [`CollectionReport`]; the reconciler then skips the pass.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::Sources;
use crate::launch_time::{parse_launch_time, LaunchTime};
use crate::model::{
    Affiliation, Booster, ClosureKind, ClosureStatus, CollectionReport, Launch, Notam,
    RoadClosure, WeatherSnapshot,
};

#[async_trait]
pub trait Collector<T>: Send + Sync {
    async fn collect(&self) -> CollectionReport<T>;
}

/// Closure row as published: the closure code is derived from its day.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawClosure {
    pub day: NaiveDate,
    pub start_date: i64,
    pub stop_date: i64,
    pub status: ClosureStatus,
    #[serde(rename = "type")]
    pub kind: ClosureKind,
}

/// Launch card as published, with free-text date and time.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLaunch {
    pub mission: String,
    pub vehicle: String,
    pub date_text: String,
    #[serde(default)]
    pub time_text: String,
    #[serde(default)]
    pub description: String,
    pub launch_site: String,
    #[serde(default)]
    pub provider: String,
}

/// Number closures by their position within each day.
pub fn normalize_closures(raw: Vec<RawClosure>) -> Vec<RoadClosure> {
    let mut per_day: std::collections::HashMap<NaiveDate, usize> = Default::default();
    raw.into_iter()
        .map(|r| {
            let index = per_day.entry(r.day).or_insert(0);
            let closure_code = RoadClosure::closure_code(*index, r.day);
            *index += 1;
            RoadClosure {
                closure_code,
                start_date: r.start_date,
                stop_date: r.stop_date,
                status: r.status,
                kind: r.kind,
            }
        })
        .collect()
}

/// Parse launch times and tag affiliations; placeholder payloads are dropped.
pub fn normalize_launches(raw: Vec<RawLaunch>) -> Vec<Launch> {
    let now = Utc::now();
    raw.into_iter()
        .filter(|r| !r.mission.to_ascii_lowercase().contains("unknown payload"))
        .map(|r| {
            let (time, net) = parse_launch_time(&r.date_text, &r.time_text, now);
            if time == LaunchTime::Unknown {
                debug!(mission = %r.mission, date = %r.date_text, time = %r.time_text, "unrecognized launch time");
            }
            let date = time
                .start_date()
                .and_then(|ms| chrono::DateTime::<Utc>::from_timestamp(ms / 1000, 0))
                .map(|dt| dt.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "TBD".to_string());
            let affiliations =
                Affiliation::from_description(&format!("{} {}", r.provider, r.description));
            Launch {
                mission: r.mission,
                vehicle: r.vehicle,
                date,
                description: r.description,
                launch_site: r.launch_site,
                affiliations,
                net,
                time,
            }
        })
        .collect()
}

/// Feed records from either an array document or a single object.
pub fn records_from_value<R: DeserializeOwned>(value: Value) -> Result<Vec<R>> {
    match value {
        Value::Array(_) => Ok(serde_json::from_value(value)?),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

/// GETs a JSON feed and maps raw rows `R` into records `T`.
pub struct HttpCollector<R, T> {
    http: Client,
    url: String,
    normalize: fn(Vec<R>) -> Vec<T>,
}

fn identity<T>(records: Vec<T>) -> Vec<T> {
    records
}

impl<R, T> HttpCollector<R, T>
where
    R: DeserializeOwned + Send,
    T: Send,
{
    pub fn new(url: impl Into<String>, normalize: fn(Vec<R>) -> Vec<T>) -> Result<Self> {
        let http = Client::builder()
            .user_agent("starbase-watchbot/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            url: url.into(),
            normalize,
        })
    }

    async fn fetch(&self) -> Result<Vec<T>> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?
            .error_for_status()?;
        let value: Value = resp.json().await.context("decode feed json")?;
        let raw = records_from_value::<R>(value)?;
        Ok((self.normalize)(raw))
    }
}

impl<T: DeserializeOwned + Send> HttpCollector<T, T> {
    pub fn direct(url: impl Into<String>) -> Result<Self> {
        Self::new(url, identity)
    }
}

#[async_trait]
impl<R, T> Collector<T> for HttpCollector<R, T>
where
    R: DeserializeOwned + Send + Sync,
    T: Send + Sync,
{
    #[instrument(skip_all, fields(url = %self.url))]
    async fn collect(&self) -> CollectionReport<T> {
        match self.fetch().await {
            Ok(records) => {
                debug!(records = records.len(), "feed collected");
                CollectionReport::ok(records)
            }
            Err(err) => {
                warn!(?err, "feed collection failed");
                CollectionReport::failed()
            }
        }
    }
}

/// One collector per domain.
#[derive(Clone)]
pub struct Collectors {
    pub boosters: Arc<dyn Collector<Booster>>,
    pub closures: Arc<dyn Collector<RoadClosure>>,
    pub launches: Arc<dyn Collector<Launch>>,
    pub notams: Arc<dyn Collector<Notam>>,
    pub weather: Arc<dyn Collector<WeatherSnapshot>>,
}

impl Collectors {
    pub fn from_sources(sources: &Sources) -> Result<Self> {
        Ok(Self {
            boosters: Arc::new(HttpCollector::<Booster, Booster>::direct(&sources.boosters.url)?),
            closures: Arc::new(HttpCollector::new(&sources.closures.url, normalize_closures)?),
            launches: Arc::new(HttpCollector::new(&sources.launches.url, normalize_launches)?),
            notams: Arc::new(HttpCollector::<Notam, Notam>::direct(&sources.notams.url)?),
            weather: Arc::new(HttpCollector::<WeatherSnapshot, WeatherSnapshot>::direct(
                &sources.weather.url,
            )?),
        })
    }
}
