//! Static "today" page: current weather, today's closures, active NOTAMs.

use anyhow::Result;
use chrono::{DateTime, Datelike, Utc};
use serde::de::DeserializeOwned;
use tracing::{instrument, warn};

use crate::db::RecordStore;
use crate::launch_time::format_instant;
use crate::model::{Domain, Notam, RoadClosure, WeatherSnapshot};

pub const TITLE: &str = "Today's Activities | Starbase";

#[derive(Debug, Clone, Default)]
pub struct TodayView {
    pub weather: Option<WeatherSnapshot>,
    pub closures: Vec<RoadClosure>,
    pub notams: Vec<Notam>,
}

/// Closure code day suffix for `now`, e.g. `6.1.2024`.
pub fn closure_day(now: DateTime<Utc>) -> String {
    format!("{}.{}.{}", now.month(), now.day(), now.year())
}

async fn decoded<T: DeserializeOwned>(store: &dyn RecordStore, domain: Domain) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for stored in store.find_all(domain).await? {
        match serde_json::from_value(stored.body) {
            Ok(record) => out.push(record),
            Err(err) => warn!(%domain, key = %stored.natural_key, ?err, "stored record does not decode"),
        }
    }
    Ok(out)
}

#[instrument(skip_all)]
pub async fn load_today(store: &dyn RecordStore, now: DateTime<Utc>) -> Result<TodayView> {
    let day = closure_day(now);
    let now_ms = now.timestamp_millis();
    let weather = match store.find_one(Domain::Weather, WeatherSnapshot::KEY).await? {
        Some(stored) => serde_json::from_value(stored.body).ok(),
        None => None,
    };
    let closures = decoded::<RoadClosure>(store, Domain::Closures)
        .await?
        .into_iter()
        .filter(|c| c.day_suffix() == day)
        .collect();
    let notams = decoded::<Notam>(store, Domain::Notams)
        .await?
        .into_iter()
        .filter(|n| n.start_date < now_ms && n.stop_date > now_ms)
        .collect();
    Ok(TodayView {
        weather,
        closures,
        notams,
    })
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn html_attr(s: &str) -> String {
    html_escape(s).replace('"', "&quot;")
}

fn weather_section(weather: Option<&WeatherSnapshot>) -> String {
    let num = |field: &str| {
        weather
            .and_then(|w| w.number(field))
            .map(|v| v.to_string())
            .unwrap_or_else(|| "__".to_string())
    };
    let text = |field: &str| {
        weather
            .and_then(|w| w.text(field))
            .map(html_escape)
            .unwrap_or_else(|| "__".to_string())
    };
    format!(
        "<section class=\"weather\"><h2>Weather</h2>\
         <div>Temperature: {} &deg;F</div>\
         <div>Wind: {} {}</div>\
         <div>Humidity: {}%</div>\
         <div>Barometer: {} {}</div></section>",
        num("temperature"),
        num("wind"),
        text("windUnits"),
        num("humidity"),
        num("barometer"),
        text("barometerUnits"),
    )
}

pub fn render_today(view: &TodayView) -> String {
    let mut body = weather_section(view.weather.as_ref());

    body.push_str("<section class=\"closures\"><h2>Road Closures</h2>");
    if view.closures.is_empty() {
        body.push_str("<div class=\"hint\">No closures today.</div>");
    }
    for c in &view.closures {
        body.push_str(&format!(
            "<div class=\"row\"><div>{} ({})</div><div>{} to {}</div></div>",
            c.status.as_str(),
            c.kind.as_str(),
            format_instant(c.start_date),
            format_instant(c.stop_date),
        ));
    }
    body.push_str("</section>");

    body.push_str("<section class=\"notams\"><h2>Active NOTAMs</h2>");
    if view.notams.is_empty() {
        body.push_str("<div class=\"hint\">No active flight restrictions.</div>");
    }
    for n in &view.notams {
        body.push_str(&format!(
            "<div class=\"row\"><a href=\"{}\">{}</a><div>{}</div><div>{} to {}</div></div>",
            html_attr(&n.notam_url),
            html_escape(&n.notam_id),
            n.altitude_label(),
            format_instant(n.start_date),
            format_instant(n.stop_date),
        ));
    }
    body.push_str("</section>");

    format!(
        r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
  </head>
  <body>
    <header>
      <h1>{title}</h1>
    </header>
    <main>
      {body}
    </main>
  </body>
</html>"#,
        title = html_escape(TITLE),
        body = body
    )
}
