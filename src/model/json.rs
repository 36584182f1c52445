//! JSON adapter (spec C4): maps raw JSON bytes to Values lazily.
//!
//! Arrays become Collections eagerly (there is no laziness to gain — the
//! bytes are already DOM-parsed by `serde_json`), but an object's fields are
//! converted to typed `FhirPathValue`s only on first access and cached
//! afterward, matching the teacher's Arc-wrapped zero-copy idiom
//! (`model/json_arc.rs`). Field cache entries are shared across clones via
//! the outer `Arc`, so repeated path navigation over the same node is O(1)
//! after the first visit.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Timelike};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::Value as Json;

use super::datetime::{
    DateTimePrecision, PartialDate, PartialDateTime, PartialTime, TimePrecision,
};
use super::quantity::Quantity;
use super::value::{Collection, FhirPathValue};

struct Inner {
    raw: Json,
    cache: Mutex<HashMap<String, Option<Collection>>>,
}

/// A deferred wrapper around a JSON object's bytes.
#[derive(Clone)]
pub struct JsonObject(Arc<Inner>);

impl std::fmt::Debug for JsonObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JsonObject({})", self.0.raw)
    }
}

impl JsonObject {
    pub fn new(raw: Json) -> Self {
        Self(Arc::new(Inner { raw, cache: Mutex::new(HashMap::new()) }))
    }

    /// Identity of the underlying JSON node — used by `repeat()`/`descendants()`
    /// to break cycles (spec §9, §4.13) without relying on structural equality.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn raw(&self) -> &Json {
        &self.0.raw
    }

    pub fn is_empty(&self) -> bool {
        match &self.0.raw {
            Json::Object(m) => m.is_empty(),
            _ => false,
        }
    }

    /// FHIR type: `resourceType` field when present, else structural
    /// inference over common complex types, else `"Object"` (spec §3).
    pub fn type_name(&self) -> String {
        if let Json::Object(m) = &self.0.raw {
            if let Some(Json::String(rt)) = m.get("resourceType") {
                return rt.clone();
            }
            for (keys, name) in STRUCTURAL_PATTERNS {
                if keys.iter().all(|k| m.contains_key(*k)) {
                    return name.to_string();
                }
            }
        }
        "Object".to_string()
    }

    pub fn display_string(&self) -> String {
        self.0.raw.to_string()
    }

    /// Recursive structural equality (spec §4.3): both sides must be objects
    /// with identical field sets and each field pairwise-equal.
    pub fn structural_eq(&self, other: &JsonObject) -> bool {
        json_structural_eq(&self.0.raw, &other.0.raw)
    }

    pub fn structural_equivalent(&self, other: &JsonObject) -> bool {
        json_structural_equivalent(&self.0.raw, &other.0.raw)
    }

    /// Lazily materializes and caches a field: absent -> `None`, primitive ->
    /// one value, array -> flattened collection of its elements, object ->
    /// a child `Object`. Per spec §4.6, `_member` extension siblings are not
    /// merged into this; callers address them with their own field name.
    pub fn get_field(&self, name: &str) -> Option<Collection> {
        if let Some(cached) = self.0.cache.lock().get(name) {
            return cached.clone();
        }
        let result = match &self.0.raw {
            Json::Object(m) => m.get(name).map(json_to_collection),
            _ => None,
        };
        self.0.cache.lock().insert(name.to_string(), result.clone());
        result
    }

    pub fn field_names(&self) -> Vec<String> {
        match &self.0.raw {
            Json::Object(m) => m.keys().filter(|k| !k.starts_with('_')).cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// All direct child values, flattened (for `children()`).
    pub fn children(&self) -> Collection {
        match &self.0.raw {
            Json::Object(m) => {
                let mut out = Vec::new();
                for key in m.keys() {
                    if let Some(c) = self.get_field(key) {
                        out.extend(c.into_vec());
                    }
                }
                Collection::from_vec(out)
            }
            _ => Collection::empty(),
        }
    }
}

/// Converts a whole JSON sub-tree (array/object/primitive) into a Collection
/// the way a path step or the root resource would.
pub fn json_to_collection(v: &Json) -> Collection {
    match v {
        Json::Null => Collection::empty(),
        Json::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.extend(json_to_collection(item).into_vec());
            }
            Collection::from_vec(out)
        }
        Json::Object(m) => {
            if m.contains_key("value") && m.contains_key("unit")
                && let Some(q) = Quantity::from_json_object(&JsonObject::new(v.clone()))
            {
                return Collection::single(FhirPathValue::Quantity(q));
            }
            Collection::single(FhirPathValue::Object(JsonObject::new(v.clone())))
        }
        Json::Bool(b) => Collection::single(FhirPathValue::Boolean(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Collection::single(FhirPathValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Collection::single(FhirPathValue::Decimal(
                    Decimal::try_from(f).unwrap_or_default(),
                ))
            } else {
                Collection::empty()
            }
        }
        Json::String(s) => Collection::single(parse_string_literal_value(s)),
    }
}

/// FHIR serializes Date/DateTime/Time/Quantity as plain JSON strings/objects;
/// a bare string field is treated as FHIRPath `String` (the model/schema
/// layer, not the bare adapter, is what would know a field is typed `date`).
/// This matches the teacher's json_arc conversion, which defers typed
/// promotion to callers with schema knowledge. `String` values that look
/// like FHIR `date`/`dateTime`/`time` primitives are promoted to System
/// types. `toDate()`/`toDateTime()` remain available for anything missed.
fn parse_string_literal_value(s: &str) -> FhirPathValue {
    if let Some(dt) = try_parse_datetime(s) {
        return FhirPathValue::DateTime(dt);
    }
    if let Some(d) = try_parse_date(s) {
        return FhirPathValue::Date(d);
    }
    if let Some(t) = try_parse_time(s) {
        return FhirPathValue::Time(t);
    }
    FhirPathValue::String(s.to_string())
}

pub fn try_parse_date(s: &str) -> Option<PartialDate> {
    let bytes = s.as_bytes();
    if bytes.len() == 4 && bytes.iter().all(u8::is_ascii_digit) {
        return Some(PartialDate::new_year(s.parse().ok()?));
    }
    if bytes.len() == 7 && &s[4..5] == "-" {
        let year = s[0..4].parse().ok()?;
        let month = s[5..7].parse().ok()?;
        return Some(PartialDate::new_month(year, month));
    }
    if bytes.len() == 10 && &s[4..5] == "-" && &s[7..8] == "-"
        && let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Some(PartialDate::from_naive(d));
        }
    None
}

pub fn try_parse_time(s: &str) -> Option<PartialTime> {
    if !s.contains(':') || s.contains('T') {
        return None;
    }
    let (precision, naive) = if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S%.f") {
        (
            if s.contains('.') { TimePrecision::Millis } else { TimePrecision::Second },
            t,
        )
    } else if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M") {
        (TimePrecision::Minute, t)
    } else {
        return None;
    };
    Some(PartialTime {
        hour: naive.hour(),
        minute: naive.minute(),
        second: naive.second(),
        millis: naive.nanosecond() / 1_000_000,
        precision,
    })
}

pub fn try_parse_datetime(s: &str) -> Option<PartialDateTime> {
    if !s.contains('T') {
        return None;
    }
    let (date_part, time_part) = s.split_once('T')?;
    let date = try_parse_date(date_part)?;
    if time_part.is_empty() {
        return Some(PartialDateTime {
            year: date.year,
            month: date.month,
            day: date.day,
            hour: 0,
            minute: 0,
            second: 0,
            millis: 0,
            offset: None,
            precision: DateTimePrecision::Day,
        });
    }
    let (time_str, offset) = split_offset(time_part);
    let (precision, naive) = if let Ok(t) = NaiveTime::parse_from_str(time_str, "%H:%M:%S%.f") {
        (
            if time_str.contains('.') { DateTimePrecision::Millis } else { DateTimePrecision::Second },
            t,
        )
    } else if let Ok(t) = NaiveTime::parse_from_str(time_str, "%H:%M") {
        (DateTimePrecision::Minute, t)
    } else if let Ok(t) = NaiveTime::parse_from_str(time_str, "%H") {
        (DateTimePrecision::Hour, t)
    } else {
        return None;
    };
    Some(PartialDateTime {
        year: date.year,
        month: date.month,
        day: date.day,
        hour: naive.hour(),
        minute: naive.minute(),
        second: naive.second(),
        millis: naive.nanosecond() / 1_000_000,
        offset,
        precision,
    })
}

fn split_offset(time_part: &str) -> (&str, Option<chrono::FixedOffset>) {
    if let Some(idx) = time_part.rfind('Z')
        && idx == time_part.len() - 1 {
            return (&time_part[..idx], Some(chrono::FixedOffset::east_opt(0).unwrap()));
        }
    // offsets are of the form +hh:mm / -hh:mm and only appear after any '.'
    let search_from = time_part.find('.').map(|i| i + 1).unwrap_or(0);
    if let Some(rel) = time_part[search_from..].find(['+', '-']) {
        let idx = search_from + rel;
        let (t, off) = time_part.split_at(idx);
        if let Ok(parsed) = chrono::FixedOffset::from_str_offset(off) {
            return (t, Some(parsed));
        }
    }
    (time_part, None)
}

/// Small helper trait so we can parse `+05:00`-style offsets without pulling
/// in a second parsing pass through `DateTime::parse_from_rfc3339`.
trait FromStrOffset: Sized {
    fn from_str_offset(s: &str) -> Result<Self, ()>;
}

impl FromStrOffset for chrono::FixedOffset {
    fn from_str_offset(s: &str) -> Result<Self, ()> {
        let neg = s.starts_with('-');
        let digits = &s[1..];
        let parts: Vec<&str> = digits.split(':').collect();
        if parts.len() != 2 {
            return Err(());
        }
        let hours: i32 = parts[0].parse().map_err(|_| ())?;
        let minutes: i32 = parts[1].parse().map_err(|_| ())?;
        let total = (hours * 3600 + minutes * 60) * if neg { -1 } else { 1 };
        chrono::FixedOffset::east_opt(total).ok_or(())
    }
}

fn json_structural_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Object(ma), Json::Object(mb)) => {
            if ma.len() != mb.len() {
                return false;
            }
            ma.iter().all(|(k, v)| mb.get(k).is_some_and(|bv| json_structural_eq(v, bv)))
        }
        (Json::Array(va), Json::Array(vb)) => {
            va.len() == vb.len() && va.iter().zip(vb).all(|(x, y)| json_structural_eq(x, y))
        }
        _ => a == b,
    }
}

fn json_structural_equivalent(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Object(ma), Json::Object(mb)) => {
            if ma.len() != mb.len() {
                return false;
            }
            ma.iter()
                .all(|(k, v)| mb.get(k).is_some_and(|bv| json_structural_equivalent(v, bv)))
        }
        (Json::Array(va), Json::Array(vb)) => {
            va.len() == vb.len() && va.iter().zip(vb).all(|(x, y)| json_structural_equivalent(x, y))
        }
        (Json::String(sa), Json::String(sb)) => {
            sa.trim().to_lowercase() == sb.trim().to_lowercase()
        }
        _ => a == b,
    }
}

/// Field-name sets that identify a common FHIR complex type structurally
/// when no `resourceType` discriminator is present (spec §3).
const STRUCTURAL_PATTERNS: &[(&[&str], &str)] = &[
    (&["system", "code"], "Coding"),
    (&["coding"], "CodeableConcept"),
    (&["reference"], "Reference"),
    (&["start", "end"], "Period"),
    (&["system", "value"], "Identifier"),
    (&["low", "high"], "Range"),
    (&["numerator", "denominator"], "Ratio"),
    (&["contentType", "data"], "Attachment"),
    (&["family", "given"], "HumanName"),
    (&["line", "city"], "Address"),
    (&["use", "value"], "ContactPoint"),
    (&["text", "author"], "Annotation"),
    (&["value", "unit"], "Quantity"),
];

impl Quantity {
    /// Builds a Quantity from a FHIR Quantity-shaped JSON object.
    pub fn from_json_object(obj: &JsonObject) -> Option<Quantity> {
        let raw = obj.raw();
        let value = raw.get("value")?.as_f64()?;
        let unit = raw
            .get("code")
            .or_else(|| raw.get("unit"))
            .and_then(|v| v.as_str())?
            .to_string();
        Some(Quantity::new(Decimal::try_from(value).ok()?, unit))
    }
}
