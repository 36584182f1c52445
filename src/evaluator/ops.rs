//! Operator semantics: arithmetic, string concatenation, ordering, equality,
//! membership, and three-valued Boolean logic (spec §4.3, §4.4, §4.9).

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::error::{EvalErrorKind, EvalResult};
use crate::model::datetime::TemporalUnit;
use crate::model::{Collection, FhirPathValue, Quantity};

pub fn unary_plus(v: &Collection) -> EvalResult<Collection> {
    match v.as_singleton() {
        None => Ok(Collection::empty()),
        Some(FhirPathValue::Integer(_)) | Some(FhirPathValue::Decimal(_)) | Some(FhirPathValue::Quantity(_)) => {
            Ok(v.clone())
        }
        Some(other) => {
            Err(EvalErrorKind::TypeMismatch(format!("unary '+' requires a numeric operand, got {}", other.type_name())).into())
        }
    }
}

pub fn unary_minus(v: &Collection) -> EvalResult<Collection> {
    match v.as_singleton() {
        None => Ok(Collection::empty()),
        Some(FhirPathValue::Integer(i)) => {
            let n = i.checked_neg().ok_or(EvalErrorKind::ArithmeticOverflow)?;
            Ok(Collection::single(FhirPathValue::Integer(n)))
        }
        Some(FhirPathValue::Decimal(d)) => Ok(Collection::single(FhirPathValue::Decimal(-d))),
        Some(FhirPathValue::Quantity(q)) => {
            Ok(Collection::single(FhirPathValue::Quantity(Quantity::new(-q.value, q.unit.clone()))))
        }
        Some(other) => {
            Err(EvalErrorKind::TypeMismatch(format!("unary '-' requires a numeric operand, got {}", other.type_name())).into())
        }
    }
}

/// `+`/`-`/`*` (I3: Integer stays Integer when both sides are and the result
/// fits; otherwise promotes to Decimal).
pub fn add(l: &FhirPathValue, r: &FhirPathValue) -> EvalResult<FhirPathValue> {
    match (l, r) {
        (FhirPathValue::Integer(a), FhirPathValue::Integer(b)) => match a.checked_add(*b) {
            Some(v) => Ok(FhirPathValue::Integer(v)),
            None => Ok(FhirPathValue::Decimal(Decimal::from(*a) + Decimal::from(*b))),
        },
        (FhirPathValue::String(a), FhirPathValue::String(b)) => {
            Ok(FhirPathValue::String(format!("{a}{b}")))
        }
        (FhirPathValue::Date(d), FhirPathValue::Quantity(q)) => {
            Ok(FhirPathValue::Date(shift_date(*d, q, 1)?))
        }
        (FhirPathValue::DateTime(d), FhirPathValue::Quantity(q)) => {
            Ok(FhirPathValue::DateTime(shift_datetime(*d, q, 1)?))
        }
        (FhirPathValue::Time(t), FhirPathValue::Quantity(q)) => Ok(FhirPathValue::Time(shift_time(*t, q, 1)?)),
        (FhirPathValue::Quantity(a), FhirPathValue::Quantity(b)) => a
            .add(b)
            .map(FhirPathValue::Quantity)
            .ok_or_else(|| EvalErrorKind::UnitMismatch(a.unit.clone(), b.unit.clone()).into()),
        _ => numeric_promote(l, r, |a, b| a + b),
    }
}

pub fn sub(l: &FhirPathValue, r: &FhirPathValue) -> EvalResult<FhirPathValue> {
    match (l, r) {
        (FhirPathValue::Integer(a), FhirPathValue::Integer(b)) => match a.checked_sub(*b) {
            Some(v) => Ok(FhirPathValue::Integer(v)),
            None => Ok(FhirPathValue::Decimal(Decimal::from(*a) - Decimal::from(*b))),
        },
        (FhirPathValue::Date(d), FhirPathValue::Quantity(q)) => Ok(FhirPathValue::Date(shift_date(*d, q, -1)?)),
        (FhirPathValue::DateTime(d), FhirPathValue::Quantity(q)) => {
            Ok(FhirPathValue::DateTime(shift_datetime(*d, q, -1)?))
        }
        (FhirPathValue::Time(t), FhirPathValue::Quantity(q)) => Ok(FhirPathValue::Time(shift_time(*t, q, -1)?)),
        (FhirPathValue::Quantity(a), FhirPathValue::Quantity(b)) => {
            let negated = Quantity::new(-b.value, b.unit.clone());
            a.add(&negated)
                .map(FhirPathValue::Quantity)
                .ok_or_else(|| EvalErrorKind::UnitMismatch(a.unit.clone(), b.unit.clone()).into())
        }
        _ => numeric_promote(l, r, |a, b| a - b),
    }
}

pub fn mul(l: &FhirPathValue, r: &FhirPathValue) -> EvalResult<FhirPathValue> {
    match (l, r) {
        (FhirPathValue::Integer(a), FhirPathValue::Integer(b)) => match a.checked_mul(*b) {
            Some(v) => Ok(FhirPathValue::Integer(v)),
            None => Ok(FhirPathValue::Decimal(Decimal::from(*a) * Decimal::from(*b))),
        },
        (FhirPathValue::Quantity(q), other) | (other, FhirPathValue::Quantity(q)) if as_decimal(other).is_some() => {
            Ok(FhirPathValue::Quantity(q.scale(as_decimal(other).unwrap())))
        }
        _ => numeric_promote(l, r, |a, b| a * b),
    }
}

pub fn div(l: &FhirPathValue, r: &FhirPathValue) -> EvalResult<FhirPathValue> {
    match (l, r) {
        (FhirPathValue::Quantity(q), other) if as_decimal(other).is_some() => {
            let d = as_decimal(other).unwrap();
            q.div_scalar(d).map(FhirPathValue::Quantity).ok_or_else(|| EvalErrorKind::DivisionByZero.into())
        }
        _ => {
            let (a, b) = (as_decimal(l), as_decimal(r));
            let (Some(a), Some(b)) = (a, b) else {
                return Err(EvalErrorKind::TypeMismatch("'/' requires numeric operands".to_string()).into());
            };
            if b.is_zero() {
                return Err(EvalErrorKind::DivisionByZero.into());
            }
            Ok(FhirPathValue::Decimal(a / b))
        }
    }
}

pub fn int_div(l: &FhirPathValue, r: &FhirPathValue) -> EvalResult<FhirPathValue> {
    match (l, r) {
        (FhirPathValue::Integer(a), FhirPathValue::Integer(b)) => {
            if *b == 0 {
                return Err(EvalErrorKind::DivisionByZero.into());
            }
            Ok(FhirPathValue::Integer(a / b))
        }
        _ => Err(EvalErrorKind::TypeMismatch("'div' requires Integer operands".to_string()).into()),
    }
}

pub fn modulo(l: &FhirPathValue, r: &FhirPathValue) -> EvalResult<FhirPathValue> {
    match (l, r) {
        (FhirPathValue::Integer(a), FhirPathValue::Integer(b)) => {
            if *b == 0 {
                return Err(EvalErrorKind::DivisionByZero.into());
            }
            Ok(FhirPathValue::Integer(a % b))
        }
        _ => Err(EvalErrorKind::TypeMismatch("'mod' requires Integer operands".to_string()).into()),
    }
}

/// `&`: concatenates treating empty as the empty string (never propagates empty).
pub fn concat(l: Option<&FhirPathValue>, r: Option<&FhirPathValue>) -> EvalResult<FhirPathValue> {
    let a = l.map(|v| v.display_string()).unwrap_or_default();
    let b = r.map(|v| v.display_string()).unwrap_or_default();
    Ok(FhirPathValue::String(format!("{a}{b}")))
}

fn as_decimal(v: &FhirPathValue) -> Option<Decimal> {
    match v {
        FhirPathValue::Integer(i) => Some(Decimal::from(*i)),
        FhirPathValue::Decimal(d) => Some(*d),
        _ => None,
    }
}

fn numeric_promote(
    l: &FhirPathValue,
    r: &FhirPathValue,
    f: impl Fn(Decimal, Decimal) -> Decimal,
) -> EvalResult<FhirPathValue> {
    let (Some(a), Some(b)) = (as_decimal(l), as_decimal(r)) else {
        return Err(EvalErrorKind::TypeMismatch(format!(
            "arithmetic requires numeric operands, got {} and {}",
            l.type_name(),
            r.type_name()
        ))
        .into());
    };
    Ok(FhirPathValue::Decimal(f(a, b)))
}

fn unit_to_temporal(q: &Quantity) -> EvalResult<(TemporalUnit, i64)> {
    let unit = TemporalUnit::from_ucum_or_name(&q.unit)
        .ok_or_else(|| EvalErrorKind::UnitMismatch(q.unit.clone(), "a temporal unit".to_string()))?;
    let amount = q.value.round().to_i64().unwrap_or(0);
    Ok((unit, amount))
}

fn shift_date(d: crate::model::PartialDate, q: &Quantity, sign: i64) -> EvalResult<crate::model::PartialDate> {
    let (unit, amount) = unit_to_temporal(q)?;
    Ok(d.add_duration(unit, amount * sign))
}

fn shift_datetime(
    d: crate::model::PartialDateTime,
    q: &Quantity,
    sign: i64,
) -> EvalResult<crate::model::PartialDateTime> {
    let (unit, amount) = unit_to_temporal(q)?;
    Ok(d.add_duration(unit, amount * sign))
}

fn shift_time(t: crate::model::PartialTime, q: &Quantity, sign: i64) -> EvalResult<crate::model::PartialTime> {
    let (unit, amount) = unit_to_temporal(q)?;
    Ok(t.add_duration(unit, amount * sign))
}

/// Three-valued Boolean: `None` is the "empty" truth value.
pub fn and(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(false), _) => Some(false),
        (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

pub fn or(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(true), _) => Some(true),
        (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

pub fn xor(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(a), Some(b)) => Some(a != b),
        _ => None,
    }
}

pub fn implies(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match l {
        Some(false) => Some(true),
        Some(true) => r,
        None => {
            if r == Some(true) {
                Some(true)
            } else {
                None
            }
        }
    }
}

pub fn tri_to_collection(v: Option<bool>) -> Collection {
    match v {
        Some(b) => Collection::single(FhirPathValue::Boolean(b)),
        None => Collection::empty(),
    }
}

/// Coerces a Collection into a three-valued Boolean per the singleton rule.
pub fn to_tri(c: &Collection) -> EvalResult<Option<bool>> {
    if c.is_empty() {
        return Ok(None);
    }
    match c.as_singleton() {
        Some(FhirPathValue::Boolean(b)) => Ok(Some(*b)),
        Some(other) => Err(EvalErrorKind::TypeMismatch(format!(
            "Boolean operator requires a Boolean operand, got {}",
            other.type_name()
        ))
        .into()),
        None => Err(EvalErrorKind::SingletonExpected(c.len()).into()),
    }
}
