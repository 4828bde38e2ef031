//! Launch date/time text parser.
//!
//! Upstream schedules publish a date text (`NET Nov 14`, `November`, `Summer`,
//! `3rd Quarter`, `2026`, `TBD`) and a time text (`14:30`, `1430-1600`,
//! `Approx. 09:00`, `06:10 or 08:45`, `12:00:30`, `TBD`), all UTC. Each
//! recognized shape maps to one [`LaunchTime`] variant; anything else becomes
//! [`LaunchTime::Unknown`].

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// When a launch is expected. Instants are unix milliseconds, UTC.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaunchTime {
    /// No date announced.
    Undecided,
    /// Only a day or a coarser range is known; `sort_date` is the end of it.
    #[serde(rename_all = "camelCase")]
    Estimated { start_date: i64, sort_date: i64 },
    #[serde(rename_all = "camelCase")]
    Exact { start_date: i64 },
    #[serde(rename_all = "camelCase")]
    Window { start_date: i64, stop_date: i64 },
    #[serde(rename_all = "camelCase")]
    Approximate { start_date: i64 },
    /// Two instantaneous opportunities.
    #[serde(rename_all = "camelCase")]
    Flexible { start_date: i64, stop_date: i64 },
    /// Published in a shape the parser does not recognize.
    Unknown,
}

impl LaunchTime {
    /// Start instant precise enough to schedule reminders against.
    pub fn concrete_start(&self) -> Option<i64> {
        match *self {
            LaunchTime::Exact { start_date }
            | LaunchTime::Window { start_date, .. }
            | LaunchTime::Approximate { start_date }
            | LaunchTime::Flexible { start_date, .. } => Some(start_date),
            LaunchTime::Undecided | LaunchTime::Estimated { .. } | LaunchTime::Unknown => None,
        }
    }

    pub fn start_date(&self) -> Option<i64> {
        match *self {
            LaunchTime::Estimated { start_date, .. } => Some(start_date),
            _ => self.concrete_start(),
        }
    }

    /// Instant used to order launches; estimates sort at the end of their range.
    pub fn sort_date(&self) -> Option<i64> {
        match *self {
            LaunchTime::Estimated { sort_date, .. } => Some(sort_date),
            _ => self.concrete_start(),
        }
    }

    /// Human readable form, prefixed with `NET` for "no earlier than" launches.
    pub fn render(&self, net: bool) -> String {
        let prefix = if net { "NET " } else { "" };
        match *self {
            LaunchTime::Undecided | LaunchTime::Unknown => "TBD".to_string(),
            LaunchTime::Estimated { start_date, .. } => {
                format!("{prefix}{} (estimated)", format_day(start_date))
            }
            LaunchTime::Exact { start_date } => format!("{prefix}{}", format_instant(start_date)),
            LaunchTime::Approximate { start_date } => {
                format!("{prefix}Approximately {}", format_instant(start_date))
            }
            LaunchTime::Window {
                start_date,
                stop_date,
            } => format!(
                "{prefix}Window opens: {}\nWindow closes: {}",
                format_instant(start_date),
                format_instant(stop_date)
            ),
            LaunchTime::Flexible {
                start_date,
                stop_date,
            } => format!(
                "{prefix}Opportunity A: {}\nOpportunity B: {}",
                format_instant(start_date),
                format_instant(stop_date)
            ),
        }
    }
}

fn to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// `14 November 2025 14:30 UTC`, with seconds when they are not zero.
pub fn format_instant(ms: i64) -> String {
    match to_utc(ms) {
        Some(dt) if dt.timestamp() % 60 != 0 => dt.format("%-d %B %Y %H:%M:%S UTC").to_string(),
        Some(dt) => dt.format("%-d %B %Y %H:%M UTC").to_string(),
        None => "TBD".to_string(),
    }
}

fn format_day(ms: i64) -> String {
    booster_date(ms).unwrap_or_else(|| "TBD".to_string())
}

/// `14 November 2025`, the date format booster assignments are published in.
pub fn booster_date(ms: i64) -> Option<String> {
    to_utc(ms).map(|dt| dt.format("%-d %B %Y").to_string())
}

const ABBREVIATED_MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const FULL_MONTHS: [&str; 12] = [
    "JANUARY",
    "FEBRUARY",
    "MARCH",
    "APRIL",
    "MAY",
    "JUNE",
    "JULY",
    "AUGUST",
    "SEPTEMBER",
    "OCTOBER",
    "NOVEMBER",
    "DECEMBER",
];

static TBD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bTBD\b").expect("valid tbd regex"));
static NET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bNET\b").expect("valid net regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").expect("valid year regex"));
static FULL_MONTH_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(JANUARY|FEBRUARY|MARCH|APRIL|MAY|JUNE|JULY|AUGUST|SEPTEMBER|OCTOBER|NOVEMBER|DECEMBER)\s+(\d{1,2})\b")
        .expect("valid full month regex")
});
static ABBREVIATED_MONTH_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(JAN|FEB|MAR|APR|MAY|JUN|JUL|AUG|SEPT?|OCT|NOV|DEC)\.?\s+(\d{1,2})\b")
        .expect("valid abbreviated month regex")
});
static MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(JANUARY|FEBRUARY|MARCH|APRIL|MAY|JUNE|JULY|AUGUST|SEPTEMBER|OCTOBER|NOVEMBER|DECEMBER)\b")
        .expect("valid month regex")
});
static SEASON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(SPRING|SUMMER|FALL|AUTUMN|WINTER)\b").expect("valid season regex")
});
static QUARTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:Q([1-4])|([1-4])(?:ST|ND|RD|TH)\s+QUARTER)\b").expect("valid quarter regex")
});

static WINDOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}):?(\d{2})\s*[-–]\s*(\d{1,2}):?(\d{2})\b").expect("valid window regex")
});
static FLEXIBLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d{1,2}):?(\d{2})\s+(?:OR|AND)\s+(\d{1,2}):?(\d{2})\b")
        .expect("valid flexible regex")
});
static APPROXIMATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:APPROX(?:\.|IMATELY)?\s*|~\s*)(\d{1,2}):?(\d{2})(?::(\d{2}))?\b")
        .expect("valid approximate regex")
});
static SECONDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2})\b").expect("valid seconds regex"));
static STANDARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):?(\d{2})\b").expect("valid standard time regex"));
static TIME_ZONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*\b(UTC|GMT|Z)\b\s*$").expect("valid time zone regex"));

/// Day a launch is pinned to, or the first day of a coarser range.
struct DatePart {
    day: NaiveDate,
    /// Last day of the range for month/season/quarter/year dates.
    range_end: Option<NaiveDate>,
}

/// Parse published date and time text into a [`LaunchTime`] and the
/// "no earlier than" flag. `now` supplies the year when the text has none.
pub fn parse_launch_time(raw_date: &str, raw_time: &str, now: DateTime<Utc>) -> (LaunchTime, bool) {
    if raw_date.trim().is_empty() || TBD_RE.is_match(raw_date) {
        return (LaunchTime::Undecided, false);
    }
    let net = NET_RE.is_match(raw_date);
    let parsed = parse_date(raw_date, now).and_then(|date| match date.range_end {
        Some(end) => estimated(date.day, end),
        None => parse_time(date.day, raw_time),
    });
    match parsed {
        Some(time) => (time, net),
        None => (LaunchTime::Unknown, false),
    }
}

fn month_index(table: &[&str; 12], name: &str) -> Option<u32> {
    let upper = name.to_ascii_uppercase();
    let upper = if upper == "SEPT" { "SEP".to_string() } else { upper };
    table.iter().position(|m| *m == upper).map(|i| i as u32 + 1)
}

fn capture_u32(caps: &Captures<'_>, i: usize) -> Option<u32> {
    caps.get(i).and_then(|m| m.as_str().parse().ok())
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (y, m) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(y, m, 1)?.pred_opt()
}

fn parse_date(raw: &str, now: DateTime<Utc>) -> Option<DatePart> {
    let explicit_year = YEAR_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok());
    let year = explicit_year.unwrap_or_else(|| now.year());

    let pinned = FULL_MONTH_DAY_RE
        .captures(raw)
        .and_then(|c| Some((month_index(&FULL_MONTHS, c.get(1)?.as_str())?, capture_u32(&c, 2)?)))
        .or_else(|| {
            ABBREVIATED_MONTH_DAY_RE.captures(raw).and_then(|c| {
                Some((
                    month_index(&ABBREVIATED_MONTHS, c.get(1)?.as_str())?,
                    capture_u32(&c, 2)?,
                ))
            })
        });
    if let Some((month, day)) = pinned {
        return Some(DatePart {
            day: NaiveDate::from_ymd_opt(year, month, day)?,
            range_end: None,
        });
    }

    // Ranges without an explicit year refer to the next occurrence.
    let range = |first_month: u32, months: u32| -> Option<DatePart> {
        let year = match explicit_year {
            Some(y) => y,
            None if first_month < now.month() => year + 1,
            None => year,
        };
        let last_month = first_month + months - 1;
        Some(DatePart {
            day: NaiveDate::from_ymd_opt(year, first_month, 1)?,
            range_end: Some(last_day_of_month(year, last_month)?),
        })
    };

    if let Some(caps) = MONTH_RE.captures(raw) {
        let month = month_index(&FULL_MONTHS, caps.get(1)?.as_str())?;
        return range(month, 1);
    }
    if let Some(caps) = SEASON_RE.captures(raw) {
        let month = match caps.get(1)?.as_str().to_ascii_uppercase().as_str() {
            "SPRING" => 3,
            "SUMMER" => 6,
            "FALL" | "AUTUMN" => 9,
            _ => 12,
        };
        // Winter spills into the next year; keep it within December.
        return range(month, if month == 12 { 1 } else { 3 });
    }
    if let Some(caps) = QUARTER_RE.captures(raw) {
        let quarter = capture_u32(&caps, 1).or_else(|| capture_u32(&caps, 2))?;
        return range((quarter - 1) * 3 + 1, 3);
    }
    if let Some(year) = explicit_year {
        return Some(DatePart {
            day: NaiveDate::from_ymd_opt(year, 1, 1)?,
            range_end: Some(NaiveDate::from_ymd_opt(year, 12, 31)?),
        });
    }
    None
}

fn at(day: NaiveDate, hour: u32, minute: u32, second: u32) -> Option<i64> {
    let naive = day.and_hms_opt(hour, minute, second)?;
    Some(Utc.from_utc_datetime(&naive).timestamp_millis())
}

fn estimated(day: NaiveDate, end: NaiveDate) -> Option<LaunchTime> {
    Some(LaunchTime::Estimated {
        start_date: at(day, 12, 0, 0)?,
        sort_date: at(end, 23, 59, 59)?,
    })
}

/// A later instant on the same day, or on the next day when it wraps.
fn after(day: NaiveDate, start: (u32, u32), stop: (u32, u32)) -> Option<i64> {
    let stop_day = if stop < start { day.succ_opt()? } else { day };
    at(stop_day, stop.0, stop.1, 0)
}

fn parse_time(day: NaiveDate, raw: &str) -> Option<LaunchTime> {
    let time = TIME_ZONE_RE.replace(raw.trim(), "");
    let time = time.trim();
    if time.is_empty() || TBD_RE.is_match(time) {
        let start_date = at(day, 12, 0, 0)?;
        return Some(LaunchTime::Estimated {
            start_date,
            sort_date: start_date,
        });
    }

    if let Some(c) = WINDOW_RE.captures(time) {
        let start = (capture_u32(&c, 1)?, capture_u32(&c, 2)?);
        let stop = (capture_u32(&c, 3)?, capture_u32(&c, 4)?);
        return Some(LaunchTime::Window {
            start_date: at(day, start.0, start.1, 0)?,
            stop_date: after(day, start, stop)?,
        });
    }
    if let Some(c) = FLEXIBLE_RE.captures(time) {
        let first = (capture_u32(&c, 1)?, capture_u32(&c, 2)?);
        let second = (capture_u32(&c, 3)?, capture_u32(&c, 4)?);
        return Some(LaunchTime::Flexible {
            start_date: at(day, first.0, first.1, 0)?,
            stop_date: after(day, first, second)?,
        });
    }
    if let Some(c) = APPROXIMATE_RE.captures(time) {
        let second = capture_u32(&c, 3).unwrap_or(0);
        return Some(LaunchTime::Approximate {
            start_date: at(day, capture_u32(&c, 1)?, capture_u32(&c, 2)?, second)?,
        });
    }
    if let Some(c) = SECONDS_RE.captures(time) {
        return Some(LaunchTime::Exact {
            start_date: at(day, capture_u32(&c, 1)?, capture_u32(&c, 2)?, capture_u32(&c, 3)?)?,
        });
    }
    if let Some(c) = STANDARD_RE.captures(time) {
        return Some(LaunchTime::Exact {
            start_date: at(day, capture_u32(&c, 1)?, capture_u32(&c, 2)?, 0)?,
        });
    }
    None
}
