use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Geographic coordinates of a record
///
/// Coordinates are never inspected by the filter; they are carried through
/// to the rendering client as-is. Numbers keep their original JSON form and
/// keys other than `lat`/`lng` (such as `accuracy`) are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: Number,
    pub lng: Number,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Identifier of the device that produced a record
///
/// Takeout exports store tags as integers, hand-made datasets often use
/// strings. Both are accepted and compared without conversion, so `123` and
/// `"123"` are different tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceTag {
    Number(Number),
    Text(String),
}

impl From<&str> for DeviceTag {
    fn from(tag: &str) -> Self {
        DeviceTag::Text(tag.to_string())
    }
}

impl From<String> for DeviceTag {
    fn from(tag: String) -> Self {
        DeviceTag::Text(tag)
    }
}

impl From<i64> for DeviceTag {
    fn from(tag: i64) -> Self {
        DeviceTag::Number(tag.into())
    }
}

impl fmt::Display for DeviceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceTag::Number(n) => write!(f, "{n}"),
            DeviceTag::Text(s) => f.write_str(s),
        }
    }
}

/// A single timestamped, geo-tagged entry of the location history
///
/// Only `time` and `device_tag` take part in filtering. Every other field,
/// including ones this struct does not name (such as `duration`), is passed
/// through unchanged when the record is serialized back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    /// Timestamp in any representation understood by [`crate::filter::parse_timestamp`]
    #[serde(default)]
    pub time: Value,

    /// Tag of the originating device, absent for older exports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_tag: Option<DeviceTag>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinates>,

    /// Signal type (GPS, WIFI, CELL, UNKNOWN, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Accuracy-derived weight, integer or float as written by the parser
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Number>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LocationRecord {
    /// Create a record with only a timestamp and an optional device tag
    ///
    /// Mostly useful for tests and synthetic datasets.
    pub fn new(time: impl Into<Value>, device_tag: Option<&str>) -> Self {
        LocationRecord {
            time: time.into(),
            device_tag: device_tag.map(DeviceTag::from),
            location: None,
            source: None,
            weight: None,
            extra: Map::new(),
        }
    }

    /// Replace the device tag, e.g. with a numeric one
    pub fn tagged(mut self, tag: impl Into<DeviceTag>) -> Self {
        self.device_tag = Some(tag.into());
        self
    }
}

/// Presentation data about one device listed in the settings export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    #[serde(default)]
    pub device_tag: Option<DeviceTag>,

    #[serde(default)]
    pub device_pretty_name: Option<String>,

    #[serde(default)]
    pub manufacturer: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub platform_type: Option<String>,

    #[serde(default)]
    pub timeline_enabled: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The normalized document produced by the upstream parser
///
/// `locations` keeps file order; decimation depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationDataset {
    pub locations: Vec<LocationRecord>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub devices: Vec<DeviceDescriptor>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<DeviceDescriptor>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<DeviceDescriptor>>::deserialize(deserializer)?.unwrap_or_default())
}
