//! Change consumers: turn reconciled changes into announcements.

use std::fmt::Display;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::db::RecordStore;
use crate::launch_time::{booster_date, format_instant};
use crate::model::{
    Booster, ChangeItem, ChangeReport, ChangeType, ChannelClass, Domain, Launch, Notam,
    OriginalData, RoadClosure, WeatherSnapshot,
};
use crate::outbox::{AnnounceQueue, Announcement};

fn field<T: PartialEq + Display>(name: &str, old: Option<&T>, new: &T) -> String {
    match old {
        Some(old) if old != new => format!("{name}: {new} (was {old})"),
        _ => format!("{name}: {new}"),
    }
}

fn instant_field(name: &str, old: Option<i64>, new: i64) -> String {
    match old {
        Some(old) if old != new => format!(
            "{name}: {} (was {})",
            format_instant(new),
            format_instant(old)
        ),
        _ => format!("{name}: {}", format_instant(new)),
    }
}

fn usable<T>(report: &ChangeReport<T>, domain: Domain) -> Option<&[ChangeItem<T>]> {
    if !report.success {
        return None;
    }
    let changes = report.changes();
    if changes.is_empty() {
        return None;
    }
    info!(%domain, changes = changes.len(), "processing updates");
    Some(changes)
}

fn enqueue(queue: &AnnounceQueue, domain: Domain, item: Announcement) -> bool {
    let queued = queue.enqueue(item);
    if !queued {
        warn!(%domain, "failed to queue announcement");
    }
    queued
}

fn enqueue_all(
    queue: &AnnounceQueue,
    domain: Domain,
    items: impl Iterator<Item = Announcement>,
) -> usize {
    let mut sent = 0;
    for item in items {
        if enqueue(queue, domain, item) {
            sent += 1;
        }
    }
    sent
}

pub fn closure_announcement(change: &ChangeItem<RoadClosure>) -> Option<Announcement> {
    let new = change.data.as_ref()?;
    let old = change.original_data.previous();
    let (title, intro) = match change.change_type {
        ChangeType::New => (
            "Road Closure Posted",
            "A new closure of Highway 4 in Boca Chica has been posted.",
        ),
        ChangeType::Updated => (
            "Road Closure Modification",
            "Details surrounding a closure of Highway 4 in Boca Chica have changed.",
        ),
        ChangeType::Removed => return None,
    };
    let lines = [
        intro.to_string(),
        String::new(),
        field("Type", old.map(|o| o.kind.as_str()).as_ref(), &new.kind.as_str()),
        field("Status", old.map(|o| o.status.as_str()).as_ref(), &new.status.as_str()),
        instant_field("Closure Begins", old.map(|o| o.start_date), new.start_date),
        instant_field("Closure Ends", old.map(|o| o.stop_date), new.stop_date),
    ];
    Some(
        Announcement::new(ChannelClass::ClosureUpdate, lines.join("\n"))
            .with_title(title)
            .with_tags(["CLOSURE"]),
    )
}

pub fn notam_announcement(change: &ChangeItem<Notam>) -> Option<Announcement> {
    let (notam, old, title, intro) = match (&change.change_type, &change.original_data) {
        (ChangeType::Removed, OriginalData::Previous(last)) => (
            last,
            None,
            "NOTAM Removed",
            "An existing Temporary Flight Restriction (TFR) was removed. The previous details are shown below.",
        ),
        (ChangeType::Updated, OriginalData::Repost) => (
            change.data.as_ref()?,
            None,
            "NOTAM Reposted",
            "A previously removed Temporary Flight Restriction (TFR) has been posted again.",
        ),
        (ChangeType::Updated, OriginalData::Previous(old)) => (
            change.data.as_ref()?,
            Some(old),
            "NOTAM Modified",
            "An existing Temporary Flight Restriction (TFR) has been modified.",
        ),
        (ChangeType::New, _) => (
            change.data.as_ref()?,
            None,
            "NOTAM Posted",
            "A new Temporary Flight Restriction (TFR) has been posted.",
        ),
        _ => return None,
    };
    let lines = [
        intro.to_string(),
        String::new(),
        format!("Notam Id: {}", notam.notam_id),
        field(
            "Altitude",
            old.map(|o| o.altitude_label()).as_ref(),
            &notam.altitude_label(),
        ),
        instant_field("Restriction Begins", old.map(|o| o.start_date), notam.start_date),
        instant_field("Restriction Ends", old.map(|o| o.stop_date), notam.stop_date),
        notam.notam_url.clone(),
    ];
    Some(
        Announcement::new(ChannelClass::NotamUpdate, lines.join("\n"))
            .with_title(format!("{title} for {}", format_instant(notam.start_date)))
            .with_tags(["NOTAM"]),
    )
}

/// 16-point compass name for a bearing in degrees.
pub fn compass_point(degrees: f64) -> &'static str {
    const POINTS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW",
        "NW", "NNW",
    ];
    let normalized = degrees.rem_euclid(360.0);
    let index = ((normalized + 11.25) / 22.5) as usize % POINTS.len();
    POINTS[index]
}

pub fn weather_announcement(change: &ChangeItem<WeatherSnapshot>) -> Option<Announcement> {
    let w = change.data.as_ref()?;
    let text = |name: &str| w.text(name).unwrap_or("");
    let num = |name: &str| {
        w.number(name)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "?".to_string())
    };
    let mut lines = vec![
        "Near-site weather collected by on-site station equipment.".to_string(),
        String::new(),
        format!(
            "Temperature: {} °F (feels like {} °F)",
            num("temperature"),
            num("temperatureFeelLike")
        ),
    ];
    if let Some(dir) = w.number("windDirection") {
        lines.push(format!(
            "Wind: {} {} {} ({} degrees)",
            num("wind"),
            text("windUnits"),
            compass_point(dir),
            dir
        ));
    }
    lines.push(format!("Humidity: {}%", num("humidity")));
    lines.push(format!(
        "Barometer: {} {} {}",
        num("barometer"),
        text("barometerUnits"),
        text("barometerTrend")
    ));
    lines.push(format!("Rain: {} {}", num("rain"), text("rainUnits")));
    Some(
        Announcement::new(ChannelClass::WeatherUpdate, lines.join("\n"))
            .with_title("Current near-site weather"),
    )
}

/// Boosters with an assignment on the launch's start day.
pub async fn assigned_boosters(store: &dyn RecordStore, launch: &Launch) -> Result<Vec<Booster>> {
    if !launch.uses_tracked_boosters() {
        return Ok(Vec::new());
    }
    let Some(day) = launch.time.sort_date().and_then(booster_date) else {
        return Ok(Vec::new());
    };
    let mut boosters = Vec::new();
    for stored in store.find_all(Domain::Boosters).await? {
        match serde_json::from_value::<Booster>(stored.body) {
            Ok(b) if b.assignment_on(&day).is_some() => boosters.push(b),
            Ok(_) => {}
            Err(err) => warn!(key = %stored.natural_key, ?err, "stored booster does not decode"),
        }
    }
    Ok(boosters)
}

pub fn booster_lines(launch: &Launch, boosters: &[Booster]) -> Vec<String> {
    let Some(day) = launch.time.sort_date().and_then(booster_date) else {
        return Vec::new();
    };
    boosters
        .iter()
        .filter_map(|b| {
            let (index, assignment) = b.assignment_on(&day)?;
            let landing = if assignment.recovery.attempted {
                format!(
                    "Landing site: {}",
                    assignment.recovery.location.as_deref().unwrap_or("unknown")
                )
            } else {
                "Expendable, no landing attempt".to_string()
            };
            Some(format!(
                "Booster {} ({}): flight no. {}, {}",
                b.booster_sn,
                b.classification.as_str(),
                index + 1,
                landing
            ))
        })
        .collect()
}

/// Tags carried by every launch announcement.
pub fn launch_tags(launch: &Launch) -> Vec<String> {
    std::iter::once("LAUNCH".to_string())
        .chain(launch.affiliations.iter().map(|a| a.tag().to_string()))
        .collect()
}

/// Launch card shared by update announcements and reminders.
pub fn launch_body(
    heading: &str,
    launch: &Launch,
    time: String,
    site: String,
    boosters: &[Booster],
) -> String {
    let mut lines = vec![
        heading.to_string(),
        format!("{} | {}", launch.vehicle, launch.mission),
        String::new(),
        launch.description.clone(),
        String::new(),
        format!("Launch Time: {time}"),
        format!("Launch Site: {site}"),
    ];
    lines.extend(booster_lines(launch, boosters));
    lines.join("\n")
}

/// Announcement for a launch change, or `None` when an update leaves the
/// rendered launch time untouched.
pub fn launch_announcement(
    change: &ChangeItem<Launch>,
    boosters: &[Booster],
) -> Option<Announcement> {
    let new = change.data.as_ref()?;
    let new_time = new.time.render(new.net);
    let body = match (&change.change_type, change.original_data.previous()) {
        (ChangeType::New, _) => launch_body(
            "New Launch Posted!",
            new,
            new_time,
            new.launch_site.clone(),
            boosters,
        ),
        (ChangeType::Updated, Some(old)) => {
            let old_time = old.time.render(old.net);
            if old_time == new_time {
                debug!(mission = %new.mission, "launch time unchanged; not announcing");
                return None;
            }
            let site = if old.launch_site == new.launch_site {
                new.launch_site.clone()
            } else {
                format!("{} (was {})", new.launch_site, old.launch_site)
            };
            launch_body(
                "Launch Update!",
                new,
                format!("{new_time} (was {old_time})"),
                site,
                boosters,
            )
        }
        _ => return None,
    };
    Some(Announcement::new(ChannelClass::LaunchUpdate, body).with_tags(launch_tags(new)))
}

pub fn announce_closures(queue: &AnnounceQueue, report: &ChangeReport<RoadClosure>) -> usize {
    let Some(changes) = usable(report, Domain::Closures) else {
        return 0;
    };
    enqueue_all(queue, Domain::Closures, changes.iter().filter_map(closure_announcement))
}

pub fn announce_notams(queue: &AnnounceQueue, report: &ChangeReport<Notam>) -> usize {
    let Some(changes) = usable(report, Domain::Notams) else {
        return 0;
    };
    enqueue_all(queue, Domain::Notams, changes.iter().filter_map(notam_announcement))
}

pub fn announce_weather(queue: &AnnounceQueue, report: &ChangeReport<WeatherSnapshot>) -> usize {
    let Some(changes) = usable(report, Domain::Weather) else {
        return 0;
    };
    enqueue_all(queue, Domain::Weather, changes.iter().filter_map(weather_announcement))
}

/// Booster changes are tracked for cross-referencing only and not announced.
pub fn announce_boosters(_queue: &AnnounceQueue, report: &ChangeReport<Booster>) -> usize {
    if let Some(changes) = usable(report, Domain::Boosters) {
        for change in changes {
            if let Some(b) = &change.data {
                debug!(booster = %b.booster_sn, kind = ?change.change_type, "booster changed");
            }
        }
    }
    0
}

pub async fn announce_launches(
    queue: &AnnounceQueue,
    store: &dyn RecordStore,
    report: &ChangeReport<Launch>,
) -> usize {
    let Some(changes) = usable(report, Domain::Launches) else {
        return 0;
    };
    let mut sent = 0;
    for change in changes {
        let Some(launch) = &change.data else {
            continue;
        };
        let boosters = match assigned_boosters(store, launch).await {
            Ok(boosters) => boosters,
            Err(err) => {
                warn!(mission = %launch.mission, ?err, "booster lookup failed");
                Vec::new()
            }
        };
        if let Some(item) = launch_announcement(change, &boosters) {
            if enqueue(queue, Domain::Launches, item) {
                sent += 1;
            }
        }
    }
    sent
}
