use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::Snapshot;

/// Full weekday and date followed by a medium-length time, e.g.
/// `Wednesday, May 1, 2019 at 3:04:05 PM`.
///
/// Month and weekday names are always en-US; the system locale is not
/// consulted. Only the time zone varies (see [`Document::new_in`]).
const CREATION_DATE_FORMAT: &str = "%A, %B %-d, %Y at %-I:%M:%S %p";

/// Millisecond timestamp shared by a blob's file name and its record key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentKey(pub i64);

impl DocumentKey {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Key for the current instant
    pub fn now() -> Self {
        Self::from_datetime(&Utc::now())
    }

    pub fn from_datetime(instant: &DateTime<Utc>) -> Self {
        Self(instant.timestamp_millis())
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl From<i64> for DocumentKey {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DocumentKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Metadata record stored for every uploaded image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub creation_date: String,
    #[serde(default)]
    pub creation_timestamp: i64,
    #[serde(default)]
    pub image_link: String,
}

impl Document {
    /// Build the record for an image uploaded at `created_at`, dated in local time
    pub fn new<S: Into<String>>(created_at: &DateTime<Utc>, image_link: S) -> Self {
        Self::new_in(created_at, &Local, image_link)
    }

    /// Build the record with the creation date rendered in `tz`
    pub fn new_in<Tz, S>(created_at: &DateTime<Utc>, tz: &Tz, image_link: S) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
        S: Into<String>,
    {
        Self {
            creation_date: creation_date_in(created_at, tz),
            creation_timestamp: created_at.timestamp_millis(),
            image_link: image_link.into(),
        }
    }

    pub fn key(&self) -> DocumentKey {
        DocumentKey(self.creation_timestamp)
    }

    /// Map one child of the records folder into a document.
    ///
    /// Fields are read one by one. A field that is missing or of the wrong
    /// type falls back to its default, and a missing timestamp is taken from
    /// the child's key. Only children that are not objects are skipped.
    pub fn from_snapshot(snapshot: &Snapshot) -> Option<Self> {
        let Some(fields) = snapshot.value().as_object() else {
            warn!("Skipping non-object record at key {}", snapshot.key());
            return None;
        };

        let text = |name: &str| match fields.get(name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                warn!("Record {} has a non-text {}: {}", snapshot.key(), name, other);
                String::new()
            }
        };

        let creation_timestamp = match fields.get("creationTimestamp") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let millis = timestamp_of(value);
                if millis.is_none() {
                    warn!("Record {} has an unreadable creationTimestamp: {}", snapshot.key(), value);
                }
                millis
            }
        }
        .filter(|millis| *millis != 0)
        .or_else(|| snapshot.key().parse::<DocumentKey>().ok().map(|k| k.as_millis()))
        .unwrap_or_default();

        Some(Document {
            creation_date: text("creationDate"),
            creation_timestamp,
            image_link: text("imageLink"),
        })
    }
}

fn timestamp_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Render a creation date the way records store it
pub fn creation_date_in<Tz>(instant: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    instant
        .with_timezone(tz)
        .format(CREATION_DATE_FORMAT)
        .to_string()
}
