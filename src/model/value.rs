//! Core value type and the Collection it forms (spec §3, C1).

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

use super::datetime::{PartialDate, PartialDateTime, PartialTime};
use super::json::JsonObject;
use super::quantity::Quantity;

/// The closed variant of every value FHIRPath can produce.
#[derive(Debug, Clone)]
pub enum FhirPathValue {
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    Date(PartialDate),
    DateTime(PartialDateTime),
    Time(PartialTime),
    Quantity(Quantity),
    /// A deferred wrapper around a JSON object's bytes (spec C4).
    Object(JsonObject),
}

impl FhirPathValue {
    /// The FHIRPath type name, or the FHIR-inferred name for objects.
    pub fn type_name(&self) -> String {
        match self {
            FhirPathValue::Boolean(_) => "Boolean".to_string(),
            FhirPathValue::Integer(_) => "Integer".to_string(),
            FhirPathValue::Decimal(_) => "Decimal".to_string(),
            FhirPathValue::String(_) => "String".to_string(),
            FhirPathValue::Date(_) => "Date".to_string(),
            FhirPathValue::DateTime(_) => "DateTime".to_string(),
            FhirPathValue::Time(_) => "Time".to_string(),
            FhirPathValue::Quantity(_) => "Quantity".to_string(),
            FhirPathValue::Object(o) => o.type_name(),
        }
    }

    pub fn display_string(&self) -> String {
        match self {
            FhirPathValue::Boolean(b) => b.to_string(),
            FhirPathValue::Integer(i) => i.to_string(),
            FhirPathValue::Decimal(d) => d.to_string(),
            FhirPathValue::String(s) => s.clone(),
            FhirPathValue::Date(d) => d.to_string(),
            FhirPathValue::DateTime(d) => d.to_string(),
            FhirPathValue::Time(t) => t.to_string(),
            FhirPathValue::Quantity(q) => q.to_string(),
            FhirPathValue::Object(o) => o.display_string(),
        }
    }

    /// Strict equality (`=`, spec §4.3). `None` means "ambiguous/incompatible
    /// => empty", matching the collection-level propagation rule.
    pub fn strict_eq(&self, other: &FhirPathValue) -> Option<bool> {
        use FhirPathValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => Some(a == b),
            (Integer(a), Integer(b)) => Some(a == b),
            (Decimal(a), Decimal(b)) => Some(a == b),
            (Integer(a), Decimal(b)) | (Decimal(b), Integer(a)) => {
                Some(rust_decimal::Decimal::from(*a) == *b)
            }
            (String(a), String(b)) => Some(a == b),
            (Date(a), Date(b)) => PartialDate::compare(*a, *b).map(|o| o == Ordering::Equal),
            (DateTime(a), DateTime(b)) => {
                PartialDateTime::compare(*a, *b).map(|o| o == Ordering::Equal)
            }
            (Time(a), Time(b)) => PartialTime::compare(*a, *b).map(|o| o == Ordering::Equal),
            (Quantity(a), Quantity(b)) => a.compare(b).map(|o| o == Ordering::Equal),
            (Object(a), Object(b)) => Some(a.structural_eq(b)),
            _ => None,
        }
    }

    /// Equivalence (`~`, spec §4.3): case/whitespace-insensitive for strings,
    /// UCUM-normalized for quantities, recursive-structural for objects.
    pub fn equivalent(&self, other: &FhirPathValue) -> bool {
        use FhirPathValue::*;
        match (self, other) {
            (String(a), String(b)) => normalize_string(a) == normalize_string(b),
            (Quantity(a), Quantity(b)) => a.equivalent(b),
            (Object(a), Object(b)) => a.structural_equivalent(b),
            (Decimal(_), _) | (_, Decimal(_)) | (Integer(_), Integer(_)) => {
                match (self.as_decimal(), other.as_decimal()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            _ => self.strict_eq(other).unwrap_or(false),
        }
    }

    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FhirPathValue::Integer(i) => Some(Decimal::from(*i)),
            FhirPathValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Ordering for `<`/`<=`/`>`/`>=` (spec §4.3). `Err` for incompatible
    /// concrete types (a real TypeMismatch), `Ok(None)` for ambiguous
    /// temporal precision (propagates empty, not an error).
    pub fn partial_order(&self, other: &FhirPathValue) -> Result<Option<Ordering>, ()> {
        use FhirPathValue::*;
        match (self, other) {
            (Integer(a), Integer(b)) => Ok(Some(a.cmp(b))),
            (Decimal(_), _) | (_, Decimal(_)) if self.as_decimal().is_some() && other.as_decimal().is_some() => {
                Ok(self.as_decimal().unwrap().partial_cmp(&other.as_decimal().unwrap()))
            }
            (String(a), String(b)) => Ok(Some(a.cmp(b))),
            (Date(a), Date(b)) => Ok(PartialDate::compare(*a, *b)),
            (DateTime(a), DateTime(b)) => Ok(PartialDateTime::compare(*a, *b)),
            (Time(a), Time(b)) => Ok(PartialTime::compare(*a, *b)),
            (Quantity(a), Quantity(b)) => Ok(a.compare(b)),
            _ => Err(()),
        }
    }

    pub fn is_truthy_singleton(&self) -> Option<bool> {
        match self {
            FhirPathValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

fn normalize_string(s: &str) -> String {
    let folded = s.trim().to_lowercase();
    let mut out = String::with_capacity(folded.len());
    let mut last_was_space = false;
    for ch in folded.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

/// An ordered sequence of values — the universal result shape (spec I1).
#[derive(Debug, Clone)]
pub struct Collection(Arc<Vec<FhirPathValue>>);

impl Collection {
    pub fn empty() -> Self {
        Self(Arc::new(Vec::new()))
    }

    pub fn single(v: FhirPathValue) -> Self {
        Self(Arc::new(vec![v]))
    }

    pub fn from_vec(v: Vec<FhirPathValue>) -> Self {
        Self(Arc::new(v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FhirPathValue> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[FhirPathValue] {
        &self.0
    }

    pub fn first(&self) -> Option<&FhirPathValue> {
        self.0.first()
    }

    pub fn into_vec(self) -> Vec<FhirPathValue> {
        match Arc::try_unwrap(self.0) {
            Ok(v) => v,
            Err(arc) => (*arc).clone(),
        }
    }

    /// The lone element if the collection is a singleton, else `None`
    /// (spec §4.5 "singleton-evaluation rule").
    pub fn as_singleton(&self) -> Option<&FhirPathValue> {
        if self.0.len() == 1 { self.0.first() } else { None }
    }

    pub fn singleton_boolean(&self) -> Option<bool> {
        self.as_singleton().and_then(|v| v.is_truthy_singleton())
    }

    pub fn concat(mut self, other: Collection) -> Collection {
        let v = Arc::make_mut(&mut self.0);
        v.extend(other.0.iter().cloned());
        self
    }

    pub fn push(mut self, value: FhirPathValue) -> Collection {
        Arc::make_mut(&mut self.0).push(value);
        self
    }
}

impl Default for Collection {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<FhirPathValue> for Collection {
    fn from_iter<T: IntoIterator<Item = FhirPathValue>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.display_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
