use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::canonical;
use crate::launch_time::LaunchTime;

/// Data domains, one stored collection each.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Boosters,
    Closures,
    Launches,
    Notams,
    Weather,
}

impl Domain {
    pub const COUNT: usize = 5;

    pub const ALL: [Domain; Domain::COUNT] = [
        Domain::Boosters,
        Domain::Closures,
        Domain::Launches,
        Domain::Notams,
        Domain::Weather,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Boosters => "boosters",
            Domain::Closures => "closures",
            Domain::Launches => "launches",
            Domain::Notams => "notams",
            Domain::Weather => "weather",
        }
    }

    pub fn parse_domain(s: &str) -> Option<Self> {
        match s {
            "boosters" => Some(Domain::Boosters),
            "closures" => Some(Domain::Closures),
            "launches" => Some(Domain::Launches),
            "notams" => Some(Domain::Notams),
            "weather" => Some(Domain::Weather),
            _ => None,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination class for an announcement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelClass {
    General,
    BoosterUpdate,
    WeatherUpdate,
    NotamUpdate,
    ClosureUpdate,
    LaunchUpdate,
    LaunchReminder,
}

/// Identity contract a record type supplies to the generic reconciler.
///
/// `natural_key` must be stable across polls; `content_eq` decides whether a
/// stored body and a fresh body describe the same value. The default compares
/// canonical JSON forms, which ignores key order and integral float noise.
pub trait Tracked: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const DOMAIN: Domain;

    fn natural_key(&self) -> String;

    fn content_eq(stored: &Value, fresh: &Value) -> bool {
        canonical::equivalent(stored, fresh)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClosureStatus {
    Scheduled,
    Canceled,
    Possible,
}

impl ClosureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClosureStatus::Scheduled => "Closure Scheduled",
            ClosureStatus::Canceled => "Closure Canceled",
            ClosureStatus::Possible => "Closure Possible",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClosureKind {
    Primary,
    Alternative,
}

impl ClosureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClosureKind::Primary => "Primary Closure",
            ClosureKind::Alternative => "Alternative Closure",
        }
    }
}

/// Road/beach closure window. Times are unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoadClosure {
    pub closure_code: String,
    pub start_date: i64,
    pub stop_date: i64,
    pub status: ClosureStatus,
    #[serde(rename = "type")]
    pub kind: ClosureKind,
}

impl RoadClosure {
    /// `{index-within-day}_{month}.{day}.{year}`; several closures on one day
    /// stay distinguishable by their index.
    pub fn closure_code(index: usize, date: chrono::NaiveDate) -> String {
        use chrono::Datelike;
        format!("{}_{}.{}.{}", index, date.month(), date.day(), date.year())
    }

    /// Day suffix of the closure code (`6.1.2024`).
    pub fn day_suffix(&self) -> &str {
        self.closure_code
            .split_once('_')
            .map(|(_, day)| day)
            .unwrap_or(&self.closure_code)
    }
}

impl Tracked for RoadClosure {
    const DOMAIN: Domain = Domain::Closures;

    fn natural_key(&self) -> String {
        self.closure_code.clone()
    }
}

/// FAA temporary flight restriction. `altitude` is feet MSL, `-1` when unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notam {
    pub notam_id: String,
    pub altitude: i64,
    pub image_url: String,
    pub issued_date: i64,
    pub notam_url: String,
    pub start_date: i64,
    pub stop_date: i64,
}

impl Notam {
    pub const UNLIMITED_ALTITUDE: i64 = -1;

    pub fn altitude_label(&self) -> String {
        if self.altitude == Self::UNLIMITED_ALTITUDE {
            "Unlimited".to_string()
        } else {
            format!("{} feet MSL", self.altitude)
        }
    }
}

impl Tracked for Notam {
    const DOMAIN: Domain = Domain::Notams;

    fn natural_key(&self) -> String {
        self.notam_id.clone()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Affiliation {
    #[serde(rename = "ROCKET_LAB")]
    RocketLab,
    #[serde(rename = "SPACEX")]
    SpaceX,
    #[serde(rename = "ROSCOSMOS")]
    Roscosmos,
    #[serde(rename = "NORTHROP_GRUMMAN")]
    NorthropGrumman,
    #[serde(rename = "UNITED_LAUNCH_ALLIANCE")]
    UnitedLaunchAlliance,
    #[serde(rename = "INDIA")]
    India,
    #[serde(rename = "ARIANESPACE")]
    Arianespace,
    #[serde(rename = "USAF")]
    UsAirForce,
    #[serde(rename = "USSF")]
    UsSpaceForce,
    #[serde(rename = "ASTRA")]
    Astra,
    #[serde(rename = "JAXA")]
    Japan,
    #[serde(rename = "NASA")]
    Nasa,
    #[serde(rename = "ISS")]
    InternationalSpaceStation,
    #[serde(rename = "SLS")]
    SpaceLaunchSystem,
}

const AFFILIATION_TAGS: &[(&str, Affiliation)] = &[
    ("Rocket Lab", Affiliation::RocketLab),
    ("SpaceX", Affiliation::SpaceX),
    ("Russia", Affiliation::Roscosmos),
    ("Northrop Grumman", Affiliation::NorthropGrumman),
    ("United Launch Alliance", Affiliation::UnitedLaunchAlliance),
    ("India", Affiliation::India),
    ("Arianespace", Affiliation::Arianespace),
    ("U.S. Air Force", Affiliation::UsAirForce),
    ("USAF", Affiliation::UsAirForce),
    ("U.S. Space Force", Affiliation::UsSpaceForce),
    ("USSF", Affiliation::UsSpaceForce),
    ("Astra", Affiliation::Astra),
    ("Japanese", Affiliation::Japan),
    ("Japan", Affiliation::Japan),
    ("JAXA", Affiliation::Japan),
    ("NASA", Affiliation::Nasa),
    ("International Space Station", Affiliation::InternationalSpaceStation),
    ("Space Launch System", Affiliation::SpaceLaunchSystem),
    ("SLS", Affiliation::SpaceLaunchSystem),
];

impl Affiliation {
    /// Distinct affiliations mentioned in free text, in tag-table order.
    pub fn from_description(description: &str) -> Vec<Affiliation> {
        let mut found: Vec<Affiliation> = Vec::new();
        for (tag, group) in AFFILIATION_TAGS {
            if description.contains(tag) && !found.contains(group) {
                found.push(*group);
            }
        }
        found
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Affiliation::RocketLab => "ROCKET_LAB",
            Affiliation::SpaceX => "SPACEX",
            Affiliation::Roscosmos => "ROSCOSMOS",
            Affiliation::NorthropGrumman => "NORTHROP_GRUMMAN",
            Affiliation::UnitedLaunchAlliance => "ULA",
            Affiliation::India => "INDIA",
            Affiliation::Arianespace => "ARIANESPACE",
            Affiliation::UsAirForce => "USAF",
            Affiliation::UsSpaceForce => "USSF",
            Affiliation::Astra => "ASTRA",
            Affiliation::Japan => "JAXA",
            Affiliation::Nasa => "NASA",
            Affiliation::InternationalSpaceStation => "ISS",
            Affiliation::SpaceLaunchSystem => "SLS",
        }
    }
}

/// Scheduled rocket launch keyed by its (free-text) mission name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Launch {
    pub mission: String,
    pub vehicle: String,
    /// Target date as published (`YYYY-MM-DD` when known).
    pub date: String,
    pub description: String,
    pub launch_site: String,
    #[serde(default)]
    pub affiliations: Vec<Affiliation>,
    /// "No earlier than" qualifier.
    #[serde(default)]
    pub net: bool,
    pub time: LaunchTime,
}

impl Launch {
    /// Vehicles whose boosters are tracked in the booster domain.
    pub fn uses_tracked_boosters(&self) -> bool {
        self.vehicle == "Falcon 9" || self.vehicle == "Falcon Heavy"
    }
}

impl Tracked for Launch {
    const DOMAIN: Domain = Domain::Launches;

    fn natural_key(&self) -> String {
        self.mission.clone()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BoosterClass {
    #[serde(rename = "F9")]
    Falcon9,
    #[serde(rename = "FH_SIDE")]
    FalconHeavySide,
    #[serde(rename = "FH_CORE")]
    FalconHeavyCore,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl BoosterClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoosterClass::Falcon9 => "Standard booster",
            BoosterClass::FalconHeavySide => "Falcon Heavy side booster",
            BoosterClass::FalconHeavyCore => "Falcon Heavy core booster",
            BoosterClass::Unknown => "Unknown booster designation",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recovery {
    pub attempted: bool,
    pub location: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BoosterAssignment {
    pub booster_flight_number: u32,
    /// `14 November 2025` style date, matched against launch start dates.
    pub date: String,
    pub flight_designation: String,
    pub turnaround_time: String,
    pub recovery: Recovery,
    pub launch_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Booster {
    #[serde(rename = "boosterSN")]
    pub booster_sn: String,
    pub classification: BoosterClass,
    pub status: String,
    #[serde(default)]
    pub assignments: Vec<BoosterAssignment>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Booster {
    /// Index and assignment flown on `date` (booster date format), if any.
    pub fn assignment_on(&self, date: &str) -> Option<(usize, &BoosterAssignment)> {
        self.assignments
            .iter()
            .enumerate()
            .find(|(_, a)| a.date == date)
    }
}

impl Tracked for Booster {
    const DOMAIN: Domain = Domain::Boosters;

    fn natural_key(&self) -> String {
        self.booster_sn.clone()
    }
}

/// On-site weather telemetry. Field set is owned by the upstream station feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct WeatherSnapshot(pub Map<String, Value>);

impl WeatherSnapshot {
    /// Weather is a single-row domain.
    pub const KEY: &'static str = "current";

    pub fn number(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }
}

impl Tracked for WeatherSnapshot {
    const DOMAIN: Domain = Domain::Weather;

    fn natural_key(&self) -> String {
        Self::KEY.to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    New,
    Updated,
    Removed,
}

pub const REPOST_SENTINEL: &str = "repost";

/// Previous value attached to a change.
#[derive(Debug, Clone, PartialEq)]
pub enum OriginalData<T> {
    /// Nothing stored before (NEW).
    Absent,
    Previous(T),
    /// The record vanished and came back unchanged; serialized as `"repost"`.
    Repost,
}

impl<T> OriginalData<T> {
    pub fn previous(&self) -> Option<&T> {
        match self {
            OriginalData::Previous(t) => Some(t),
            _ => None,
        }
    }
}

impl<T: Serialize> Serialize for OriginalData<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OriginalData::Absent => serializer.serialize_none(),
            OriginalData::Previous(t) => t.serialize(serializer),
            OriginalData::Repost => serializer.serialize_str(REPOST_SENTINEL),
        }
    }
}

fn data_or_empty<T: Serialize, S: Serializer>(
    data: &Option<T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match data {
        Some(t) => t.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

/// One detected change. `data` is `None` only for REMOVED (serialized as `{}`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", bound(serialize = "T: Serialize"))]
pub struct ChangeItem<T> {
    pub change_type: ChangeType,
    #[serde(serialize_with = "data_or_empty")]
    pub data: Option<T>,
    pub original_data: OriginalData<T>,
}

impl<T> ChangeItem<T> {
    pub fn new_record(data: T) -> Self {
        Self {
            change_type: ChangeType::New,
            data: Some(data),
            original_data: OriginalData::Absent,
        }
    }

    pub fn updated(data: T, previous: T) -> Self {
        Self {
            change_type: ChangeType::Updated,
            data: Some(data),
            original_data: OriginalData::Previous(previous),
        }
    }

    pub fn repost(data: T) -> Self {
        Self {
            change_type: ChangeType::Updated,
            data: Some(data),
            original_data: OriginalData::Repost,
        }
    }

    pub fn removed(last_known: T) -> Self {
        Self {
            change_type: ChangeType::Removed,
            data: None,
            original_data: OriginalData::Previous(last_known),
        }
    }

    pub fn is_repost(&self) -> bool {
        matches!(self.original_data, OriginalData::Repost)
    }
}

/// Result of one reconciliation pass. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound(serialize = "T: Serialize"))]
pub struct ChangeReport<T> {
    pub success: bool,
    pub changes: Option<Vec<ChangeItem<T>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ChangeReport<T> {
    pub fn ok(changes: Vec<ChangeItem<T>>) -> Self {
        Self {
            success: true,
            changes: Some(changes),
            message: None,
        }
    }

    pub fn failed(message: Option<String>) -> Self {
        Self {
            success: false,
            changes: None,
            message,
        }
    }

    /// Changes of a successful pass; empty for failed ones.
    pub fn changes(&self) -> &[ChangeItem<T>] {
        self.changes.as_deref().unwrap_or(&[])
    }
}

/// What a collector hands to the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned"))]
pub struct CollectionReport<T> {
    pub success: bool,
    pub data: Option<Vec<T>>,
}

impl<T> CollectionReport<T> {
    pub fn ok(data: Vec<T>) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            data: None,
        }
    }

    /// Records of a usable report; `None` when the collection failed.
    pub fn into_records(self) -> Option<Vec<T>> {
        if self.success {
            self.data
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn closure_code_uses_unpadded_date_parts() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(RoadClosure::closure_code(0, date), "0_6.1.2024");
        assert_eq!(RoadClosure::closure_code(2, date), "2_6.1.2024");
    }

    #[test]
    fn closure_serializes_camel_case_with_type_field() {
        let closure = RoadClosure {
            closure_code: "0_6.1.2024".into(),
            start_date: 10,
            stop_date: 11,
            status: ClosureStatus::Scheduled,
            kind: ClosureKind::Primary,
        };
        let value = serde_json::to_value(&closure).unwrap();
        assert_eq!(
            value,
            json!({
                "closureCode": "0_6.1.2024",
                "startDate": 10,
                "stopDate": 11,
                "status": "SCHEDULED",
                "type": "PRIMARY"
            })
        );
        assert_eq!(closure.day_suffix(), "6.1.2024");
    }

    #[test]
    fn affiliations_are_distinct_and_ordered() {
        let found = Affiliation::from_description(
            "A SpaceX Falcon 9 for the USSF (U.S. Space Force) and SpaceX again",
        );
        assert_eq!(found, vec![Affiliation::SpaceX, Affiliation::UsSpaceForce]);
        assert!(Affiliation::from_description("nothing here").is_empty());
    }

    #[test]
    fn change_items_serialize_with_sentinels() {
        let notam = Notam {
            notam_id: "4/1234".into(),
            altitude: -1,
            image_url: "img".into(),
            issued_date: 1,
            notam_url: "url".into(),
            start_date: 2,
            stop_date: 3,
        };

        let repost = serde_json::to_value(ChangeItem::repost(notam.clone())).unwrap();
        assert_eq!(repost["changeType"], "UPDATED");
        assert_eq!(repost["originalData"], "repost");
        assert_eq!(repost["data"]["notamId"], "4/1234");

        let removed = serde_json::to_value(ChangeItem::removed(notam.clone())).unwrap();
        assert_eq!(removed["changeType"], "REMOVED");
        assert_eq!(removed["data"], json!({}));
        assert_eq!(removed["originalData"]["notamId"], "4/1234");

        let new = serde_json::to_value(ChangeItem::new_record(notam)).unwrap();
        assert_eq!(new["originalData"], Value::Null);
    }

    #[test]
    fn failed_collection_yields_no_records() {
        let report: CollectionReport<Notam> = CollectionReport {
            success: false,
            data: Some(vec![]),
        };
        assert!(report.into_records().is_none());
        assert_eq!(
            CollectionReport::<Notam>::ok(vec![]).into_records(),
            Some(vec![])
        );
    }

    #[test]
    fn booster_key_field_name() {
        let booster: Booster = serde_json::from_value(json!({
            "boosterSN": "B1080",
            "classification": "F9",
            "status": "Active",
            "assignments": []
        }))
        .unwrap();
        assert_eq!(booster.natural_key(), "B1080");
        assert!(booster.notes.is_empty());
    }
}
