use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const UNKNOWN_DRIVER: &str = "Unknown";

/// One row of the Bustrax route-tracking feed.
///
/// Only the fields the dispatcher reads are kept. Everything is parsed
/// leniently: the feed mixes numbers, strings and nulls for the same key
/// across rows, so string fields accept any scalar and `fin_kpi` stays raw
/// until the alarm rule coerces it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackingRecord {
    pub trip: Option<String>,
    pub driver_name: Option<String>,
    pub cellphone: Option<String>,
    pub fin_kpi: Value,
    pub error: String,
    pub status: String,
    pub car: Option<String>,
    pub route_desc: Option<String>,
    pub start_time: Option<String>,
}

impl TrackingRecord {
    /// Builds a record from one feed item. Returns `None` for non-objects.
    pub fn from_value(v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        Some(Self {
            trip: text(obj, &["trip", "id"]),
            driver_name: text(obj, &["driver_name", "driver name"]),
            cellphone: text(obj, &["cellphone"]),
            fin_kpi: obj.get("fin_kpi").cloned().unwrap_or(Value::Null),
            error: text(obj, &["error"]).unwrap_or_default(),
            status: text(obj, &["status"]).unwrap_or_default(),
            car: text(obj, &["car"]),
            route_desc: text(obj, &["rdes", "route_desc"]),
            start_time: text(obj, &["start_time"]),
        })
    }

    /// Dedup key. `None` when the feed sent neither `trip` nor `id`.
    pub fn alarm_id(&self) -> Option<&str> {
        self.trip.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn driver(&self) -> &str {
        self.driver_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_DRIVER)
    }
}

fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Canonical output of a tracking fetch.
#[derive(Debug, Clone, Default)]
pub struct TrackingBatch {
    pub records: Vec<TrackingRecord>,
    /// Feed items that were not JSON objects, rendered for the run report.
    pub rejected: Vec<String>,
}

impl TrackingBatch {
    /// Accepts either a bare array or an object wrapping the array in `data`.
    /// Any other top-level shape yields `None`.
    pub fn from_json(body: &Value) -> Option<Self> {
        let items = match body {
            Value::Array(items) => items,
            Value::Object(obj) => obj.get("data")?.as_array()?,
            _ => return None,
        };

        let mut batch = TrackingBatch::default();
        for item in items {
            match TrackingRecord::from_value(item) {
                Some(rec) => batch.records.push(rec),
                None => batch.rejected.push(format!(
                    "Unexpected item in Bustrax data list: expected an object, got {}",
                    item
                )),
            }
        }
        Some(batch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRequest {
    pub from_number: String,
    pub to_number: String,
    pub call_type: String,
    pub agent_id: String,
    #[serde(rename = "retell_llm_dynamic_variables")]
    pub dynamic_variables: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallReceipt {
    pub call_id: Option<String>,
    #[serde(default)]
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncallableAlarm {
    pub alarm_id: Option<String>,
    pub reason: String,
    pub driver: String,
    pub car: Option<String>,
    pub route_desc: Option<String>,
    pub start_time: Option<String>,
    pub cellphone: Option<String>,
    pub logged_at: String,
}

impl UncallableAlarm {
    pub fn from_record(rec: &TrackingRecord, reason: impl Into<String>) -> Self {
        Self {
            alarm_id: rec.alarm_id().map(str::to_string),
            reason: reason.into(),
            driver: rec.driver().to_string(),
            car: rec.car.clone(),
            route_desc: rec.route_desc.clone(),
            start_time: rec.start_time.clone(),
            cellphone: rec.cellphone.clone(),
            logged_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub checked: u32,
    pub triggered: u32,
    pub errors: Vec<String>,
}
