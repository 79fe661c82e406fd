//! Data models.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::MonitorError;
use serde_helpers::*;

/// Vessel identifier
///
/// The backend sends identifiers either as strings or as integers. Both are
/// kept in their string form so that `7` and `"7"` name the same vessel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VesselId(String);

impl VesselId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VesselId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VesselId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for VesselId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for VesselId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for VesselId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_string_or_number(deserializer).map(VesselId)
    }
}

/// Vessel as listed by `GET /api/vessels`
///
/// Live telemetry fields stay `None` until the backend reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vessel {
    pub id: VesselId,
    #[serde(default, deserialize_with = "deserialize_string_or_empty")]
    pub name: String,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_string_or_empty"
    )]
    pub vessel_type: String,
    /// Free-form status, see [`VesselStatus`]
    #[serde(default, deserialize_with = "deserialize_string_or_empty")]
    pub status: String,
    #[serde(default, deserialize_with = "deserialize_string_or_empty")]
    pub owner: String,
    /// Vessel traffic system active
    #[serde(rename = "vtsActive", default, deserialize_with = "deserialize_bool_or_false")]
    pub vts_active: bool,
    /// Engine monitoring system active
    #[serde(rename = "emsActive", default, deserialize_with = "deserialize_bool_or_false")]
    pub ems_active: bool,
    /// Fuel monitoring system active
    #[serde(rename = "fmsActive", default, deserialize_with = "deserialize_bool_or_false")]
    pub fms_active: bool,
    #[serde(
        rename = "vesselKey",
        default,
        deserialize_with = "deserialize_trimmed_string"
    )]
    pub vessel_key: Option<String>,
    /// Fuel consumption in litres per hour
    #[serde(
        rename = "fuelConsumption",
        default,
        deserialize_with = "deserialize_f64_or_zero"
    )]
    pub fuel_consumption: f64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Speed over ground in knots
    #[serde(default)]
    pub speed: Option<f64>,
    /// Heading in degrees
    #[serde(default)]
    pub heading: Option<f64>,
    /// Portside engine RPM
    #[serde(default)]
    pub rpm_1: Option<f64>,
    /// Starboard engine RPM
    #[serde(default)]
    pub rpm_2: Option<f64>,
    /// Center engine RPM
    #[serde(default)]
    pub rpm_3: Option<f64>,
}

impl Vessel {
    /// Create a vessel with no live telemetry
    pub fn new(id: impl Into<VesselId>, name: &str, vessel_type: &str, status: &str) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            vessel_type: vessel_type.to_string(),
            status: status.to_string(),
            owner: String::new(),
            vts_active: false,
            ems_active: false,
            fms_active: false,
            vessel_key: None,
            fuel_consumption: 0.0,
            latitude: None,
            longitude: None,
            speed: None,
            heading: None,
            rpm_1: None,
            rpm_2: None,
            rpm_3: None,
        }
    }

    pub fn status(&self) -> VesselStatus {
        VesselStatus::parse(&self.status)
    }
}

/// Parsed view of the free-form vessel status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VesselStatus {
    Active,
    Warning,
    Critical,
    Other(String),
}

impl VesselStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            s if s.eq_ignore_ascii_case("active") => VesselStatus::Active,
            s if s.eq_ignore_ascii_case("warning") => VesselStatus::Warning,
            s if s.eq_ignore_ascii_case("critical") => VesselStatus::Critical,
            s => VesselStatus::Other(s.to_string()),
        }
    }
}

/// History record as sent by `GET /api/history`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawHistoryRecord {
    #[serde(default, deserialize_with = "deserialize_string_or_empty")]
    pub id: String,
    pub vessel_id: VesselId,
    #[serde(default, deserialize_with = "deserialize_string_or_empty")]
    pub vessel_name: String,
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    pub vessel_type: Option<String>,
    /// Timestamp as string or epoch milliseconds
    #[serde(default)]
    pub date: Value,
    #[serde(default, deserialize_with = "deserialize_f64_or_zero")]
    pub latitude: f64,
    #[serde(default, deserialize_with = "deserialize_f64_or_zero")]
    pub longitude: f64,
    #[serde(default, deserialize_with = "deserialize_f64_or_zero")]
    pub speed: f64,
    #[serde(default, deserialize_with = "deserialize_f64_or_zero")]
    pub heading: f64,
    #[serde(default, deserialize_with = "deserialize_f64_or_zero")]
    pub rpm_1: f64,
    #[serde(default, deserialize_with = "deserialize_f64_or_zero")]
    pub rpm_2: f64,
    #[serde(default, deserialize_with = "deserialize_f64_or_zero")]
    pub rpm_3: f64,
}

/// Immutable telemetry sample of one vessel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub id: String,
    pub vessel_id: VesselId,
    pub vessel_name: String,
    pub vessel_type: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub rpm_portside: f64,
    pub rpm_starboard: f64,
    pub rpm_center: f64,
}

impl TryFrom<RawHistoryRecord> for HistoryRecord {
    type Error = MonitorError;

    fn try_from(raw: RawHistoryRecord) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&raw.date)
            .ok_or_else(|| MonitorError::InvalidDate(raw.date.to_string()))?;

        Ok(HistoryRecord {
            id: raw.id,
            vessel_id: raw.vessel_id,
            vessel_name: raw.vessel_name,
            vessel_type: raw.vessel_type.unwrap_or_else(|| "Unknown".to_string()),
            timestamp,
            latitude: raw.latitude,
            longitude: raw.longitude,
            speed: raw.speed,
            heading: raw.heading,
            rpm_portside: raw.rpm_1,
            rpm_starboard: raw.rpm_2,
            rpm_center: raw.rpm_3,
        })
    }
}

/// Response envelope `{data, message, success}` of the backend
///
/// Built from any JSON value; a missing or non-object body simply has no data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    pub data: Option<Value>,
    pub message: Option<String>,
    pub success: Option<bool>,
}

impl Envelope {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => Envelope {
                data: map.remove("data"),
                message: map
                    .remove("message")
                    .and_then(|m| m.as_str().map(str::to_string)),
                success: map.get("success").and_then(Value::as_bool),
            },
            _ => Envelope::default(),
        }
    }

    /// Decode the `data` sequence
    ///
    /// Returns an empty list when `data` is absent or not a sequence. Items
    /// that fail to decode are skipped.
    pub fn items<T>(self) -> Vec<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let items = match self.data {
            Some(Value::Array(items)) => items,
            Some(other) => {
                warn!("Envelope data is not a sequence: {}", value_kind(&other));
                return Vec::new();
            }
            None => {
                warn!("Envelope has no data field");
                return Vec::new();
            }
        };

        let total = items.len();
        let decoded: Vec<T> = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Skipping undecodable item: {}", e);
                    None
                }
            })
            .collect();

        if decoded.len() < total {
            warn!("Decoded {} of {} envelope items", decoded.len(), total);
        }
        decoded
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Authenticated dashboard user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub username: String,
    pub role: Option<String>,
}

/// The single active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: AuthUser,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user: AuthUser) -> Self {
        Self {
            user,
            started_at: Utc::now(),
        }
    }
}

/// Parse a backend timestamp
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` (also with `T`, read as UTC)
/// and epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Custom deserializers
mod serde_helpers {
    use serde::{self, Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "expected string or number, found {}",
                other
            ))),
        }
    }

    pub fn deserialize_string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        })
    }

    pub fn deserialize_trimmed_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        Ok(s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
    }

    pub fn deserialize_f64_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        })
    }

    pub fn deserialize_bool_or_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn parse_vessel() {
        let s = r#"{
            "id": 12,
            "name": "KM Bahari",
            "type": "Tugboat",
            "status": "Active",
            "owner": "PT Samudra",
            "vtsActive": true,
            "emsActive": false,
            "fmsActive": true,
            "vesselKey": " abc ",
            "fuelConsumption": 42.5,
            "latitude": -6.1,
            "longitude": 106.8,
            "speed": 11.2,
            "heading": 270,
            "rpm_1": 1200,
            "rpm_2": 1180.5,
            "rpm_3": null
        }"#;
        let vessel: Vessel = serde_json::from_str(s).unwrap();

        assert_eq!(vessel.id, VesselId::from("12"));
        assert_eq!(vessel.vessel_type, "Tugboat");
        assert!(vessel.vts_active);
        assert!(!vessel.ems_active);
        assert_eq!(vessel.vessel_key.as_deref(), Some("abc"));
        assert_eq!(vessel.fuel_consumption, 42.5);
        assert_eq!(vessel.heading, Some(270.0));
        assert_eq!(vessel.rpm_2, Some(1180.5));
        assert_eq!(vessel.rpm_3, None);
        assert_eq!(vessel.status(), VesselStatus::Active);
    }

    #[test]
    fn parse_vessel_without_telemetry() {
        let vessel: Vessel =
            serde_json::from_str(r#"{"id": "V-1", "name": "Tanjung", "fuelConsumption": null}"#)
                .unwrap();

        assert_eq!(vessel.id.as_str(), "V-1");
        assert_eq!(vessel.fuel_consumption, 0.0);
        assert_eq!(vessel.speed, None);
        assert_eq!(vessel.latitude, None);
        assert_eq!(vessel.status(), VesselStatus::Other(String::new()));
    }

    #[test]
    fn vessel_id_compares_by_string() {
        let numeric: VesselId = serde_json::from_value(json!(7)).unwrap();
        let text: VesselId = serde_json::from_value(json!("7")).unwrap();
        assert_eq!(numeric, text);
        assert!(serde_json::from_value::<VesselId>(json!(null)).is_err());
    }

    #[test]
    fn convert_history_record() {
        let raw: RawHistoryRecord = serde_json::from_value(json!({
            "id": 99,
            "vessel_id": 3,
            "vessel_name": "KM Bahari",
            "date": "2024-05-01 09:15:00",
            "latitude": -6.2,
            "longitude": 106.9,
            "speed": 10.0,
            "heading": 90,
            "rpm_1": 1500,
            "rpm_2": 1490,
            "rpm_3": 1480
        }))
        .unwrap();

        let record = HistoryRecord::try_from(raw).unwrap();
        assert_eq!(record.id, "99");
        assert_eq!(record.vessel_id, VesselId::from(3));
        assert_eq!(record.vessel_type, "Unknown");
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 15, 0).unwrap()
        );
        assert_eq!(record.rpm_portside, 1500.0);
        assert_eq!(record.rpm_starboard, 1490.0);
        assert_eq!(record.rpm_center, 1480.0);
    }

    #[test]
    fn convert_history_record_bad_date() {
        let raw: RawHistoryRecord =
            serde_json::from_value(json!({"vessel_id": "3", "date": "yesterday"})).unwrap();
        assert!(matches!(
            HistoryRecord::try_from(raw),
            Err(MonitorError::InvalidDate(_))
        ));
    }

    #[test]
    fn parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 2, 15, 0).unwrap();
        assert_eq!(
            parse_timestamp(&json!("2024-05-01T09:15:00+07:00")),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!("2024-05-01T02:15:00")), Some(expected));
        assert_eq!(
            parse_timestamp(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!(null)), None);
    }

    #[test]
    fn envelope_items() {
        let envelope = Envelope::from_value(json!({
            "data": [{"id": 1}, {"name": "no id"}, {"id": "2"}],
            "message": "ok",
            "success": true
        }));
        assert_eq!(envelope.message.as_deref(), Some("ok"));
        assert_eq!(envelope.success, Some(true));

        let vessels: Vec<Vessel> = envelope.items();
        let ids: Vec<&str> = vessels.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn envelope_malformed_data() {
        let vessels: Vec<Vessel> =
            Envelope::from_value(json!({"data": "oops", "success": true})).items();
        assert!(vessels.is_empty());

        let vessels: Vec<Vessel> = Envelope::from_value(json!([1, 2, 3])).items();
        assert!(vessels.is_empty());
    }
}
