//! Type conversion functions (spec §4.11). `iif()` is lazy and lives in the
//! evaluator; everything else here is pure.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::str::FromStr;

use super::{FunctionRegistry, singleton};
use crate::model::json::{try_parse_date, try_parse_datetime, try_parse_time};
use crate::model::{Collection, FhirPathValue, Quantity};

pub fn register(r: &mut FunctionRegistry) {
    r.register("toBoolean", 0, 0, |fc| Ok(single_or_empty(to_boolean(fc.input.as_singleton()))));
    r.register("convertsToBoolean", 0, 0, |fc| Ok(converts(to_boolean(fc.input.as_singleton()))));
    r.register("toInteger", 0, 0, |fc| Ok(single_or_empty(to_integer(fc.input.as_singleton()))));
    r.register("convertsToInteger", 0, 0, |fc| Ok(converts(to_integer(fc.input.as_singleton()))));
    r.register("toDecimal", 0, 0, |fc| Ok(single_or_empty(to_decimal(fc.input.as_singleton()))));
    r.register("convertsToDecimal", 0, 0, |fc| Ok(converts(to_decimal(fc.input.as_singleton()))));
    r.register("toString", 0, 0, |fc| {
        Ok(match fc.input.as_singleton() {
            Some(v) => Collection::single(FhirPathValue::String(v.display_string())),
            None => Collection::empty(),
        })
    });
    r.register("convertsToString", 0, 0, |fc| {
        Ok(Collection::single(FhirPathValue::Boolean(fc.input.as_singleton().is_some())))
    });
    r.register("toDate", 0, 0, |fc| Ok(single_or_empty(to_date(fc.input.as_singleton()))));
    r.register("convertsToDate", 0, 0, |fc| Ok(converts(to_date(fc.input.as_singleton()))));
    r.register("toDateTime", 0, 0, |fc| Ok(single_or_empty(to_datetime(fc.input.as_singleton()))));
    r.register("convertsToDateTime", 0, 0, |fc| Ok(converts(to_datetime(fc.input.as_singleton()))));
    r.register("toTime", 0, 0, |fc| Ok(single_or_empty(to_time(fc.input.as_singleton()))));
    r.register("convertsToTime", 0, 0, |fc| Ok(converts(to_time(fc.input.as_singleton()))));
    r.register("toQuantity", 0, 1, |fc| Ok(single_or_empty(to_quantity(fc.input.as_singleton()))));
    r.register("convertsToQuantity", 0, 1, |fc| Ok(converts(to_quantity(fc.input.as_singleton()))));

    // Kept for symmetry with the spec's "singleton required" family; not
    // itself a conversion but shares this module's helpers.
    let _ = singleton;
}

fn single_or_empty(v: Option<FhirPathValue>) -> Collection {
    v.map(Collection::single).unwrap_or_default()
}

fn converts(v: Option<FhirPathValue>) -> Collection {
    Collection::single(FhirPathValue::Boolean(v.is_some()))
}

fn to_boolean(v: Option<&FhirPathValue>) -> Option<FhirPathValue> {
    match v? {
        FhirPathValue::Boolean(b) => Some(FhirPathValue::Boolean(*b)),
        FhirPathValue::Integer(1) => Some(FhirPathValue::Boolean(true)),
        FhirPathValue::Integer(0) => Some(FhirPathValue::Boolean(false)),
        FhirPathValue::Decimal(d) if *d == Decimal::from(1) => Some(FhirPathValue::Boolean(true)),
        FhirPathValue::Decimal(d) if *d == Decimal::from(0) => Some(FhirPathValue::Boolean(false)),
        FhirPathValue::String(s) => match s.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "1.0" => Some(FhirPathValue::Boolean(true)),
            "false" | "f" | "no" | "n" | "0" | "0.0" => Some(FhirPathValue::Boolean(false)),
            _ => None,
        },
        _ => None,
    }
}

fn to_integer(v: Option<&FhirPathValue>) -> Option<FhirPathValue> {
    match v? {
        FhirPathValue::Integer(i) => Some(FhirPathValue::Integer(*i)),
        FhirPathValue::Boolean(b) => Some(FhirPathValue::Integer(if *b { 1 } else { 0 })),
        FhirPathValue::String(s) => s.trim().parse::<i64>().ok().map(FhirPathValue::Integer),
        _ => None,
    }
}

fn to_decimal(v: Option<&FhirPathValue>) -> Option<FhirPathValue> {
    match v? {
        FhirPathValue::Decimal(d) => Some(FhirPathValue::Decimal(*d)),
        FhirPathValue::Integer(i) => Some(FhirPathValue::Decimal(Decimal::from(*i))),
        FhirPathValue::Boolean(b) => Some(FhirPathValue::Decimal(Decimal::from(if *b { 1 } else { 0 }))),
        FhirPathValue::String(s) => Decimal::from_str(s.trim()).ok().map(FhirPathValue::Decimal),
        _ => None,
    }
}

fn to_date(v: Option<&FhirPathValue>) -> Option<FhirPathValue> {
    match v? {
        FhirPathValue::Date(d) => Some(FhirPathValue::Date(*d)),
        FhirPathValue::DateTime(dt) => Some(FhirPathValue::Date(crate::model::PartialDate {
            year: dt.year,
            month: dt.month,
            day: dt.day,
            precision: match dt.precision {
                crate::model::DateTimePrecision::Year => crate::model::DatePrecision::Year,
                crate::model::DateTimePrecision::Month => crate::model::DatePrecision::Month,
                _ => crate::model::DatePrecision::Day,
            },
        })),
        FhirPathValue::String(s) => try_parse_date(s).map(FhirPathValue::Date),
        _ => None,
    }
}

fn to_datetime(v: Option<&FhirPathValue>) -> Option<FhirPathValue> {
    match v? {
        FhirPathValue::DateTime(dt) => Some(FhirPathValue::DateTime(*dt)),
        FhirPathValue::Date(d) => Some(FhirPathValue::DateTime(crate::model::PartialDateTime {
            year: d.year,
            month: d.month,
            day: d.day,
            hour: 0,
            minute: 0,
            second: 0,
            millis: 0,
            offset: None,
            precision: match d.precision {
                crate::model::DatePrecision::Year => crate::model::DateTimePrecision::Year,
                crate::model::DatePrecision::Month => crate::model::DateTimePrecision::Month,
                crate::model::DatePrecision::Day => crate::model::DateTimePrecision::Day,
            },
        })),
        FhirPathValue::String(s) => try_parse_datetime(s).map(FhirPathValue::DateTime),
        _ => None,
    }
}

fn to_time(v: Option<&FhirPathValue>) -> Option<FhirPathValue> {
    match v? {
        FhirPathValue::Time(t) => Some(FhirPathValue::Time(*t)),
        FhirPathValue::String(s) => try_parse_time(s).map(FhirPathValue::Time),
        _ => None,
    }
}

fn to_quantity(v: Option<&FhirPathValue>) -> Option<FhirPathValue> {
    match v? {
        FhirPathValue::Quantity(q) => Some(FhirPathValue::Quantity(q.clone())),
        FhirPathValue::Integer(i) => Some(FhirPathValue::Quantity(Quantity::new(Decimal::from(*i), "1"))),
        FhirPathValue::Decimal(d) => Some(FhirPathValue::Quantity(Quantity::new(*d, "1"))),
        FhirPathValue::String(s) => parse_quantity_literal(s),
        _ => None,
    }
}

fn parse_quantity_literal(s: &str) -> Option<FhirPathValue> {
    let s = s.trim();
    let split_at = s.find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))?;
    let (num, rest) = s.split_at(split_at);
    let value = Decimal::from_str(num.trim()).ok().or_else(|| Decimal::from_f64(num.trim().parse().ok()?))?;
    let unit = rest.trim().trim_matches('\'');
    if unit.is_empty() {
        return None;
    }
    Some(FhirPathValue::Quantity(Quantity::new(value, unit)))
}
