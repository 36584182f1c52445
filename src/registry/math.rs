//! Arithmetic functions (spec §4.10, §4.4).

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use super::{FunctionContext, FunctionRegistry, singleton};
use crate::evaluator::error::{EvalErrorKind, EvalResult};
use crate::model::{Collection, FhirPathValue};

pub fn register(r: &mut FunctionRegistry) {
    r.register("abs", 0, 0, |fc| numeric_unary(fc, |d| Ok(d.abs()), |i| i.checked_abs()));
    r.register("ceiling", 0, 0, |fc| {
        numeric_unary_to_int(fc, |d| d.ceil().to_i64())
    });
    r.register("floor", 0, 0, |fc| numeric_unary_to_int(fc, |d| d.floor().to_i64()));
    r.register("truncate", 0, 0, |fc| numeric_unary_to_int(fc, |d| d.trunc().to_i64()));
    r.register("round", 0, 1, |fc| {
        let precision = match fc.args.first() {
            Some(_) => int_arg(fc, 0)?,
            None => 0,
        };
        let Some(d) = decimal_input(fc)? else { return Ok(Collection::empty()) };
        Ok(Collection::single(FhirPathValue::Decimal(d.round_dp(precision.max(0) as u32))))
    });
    r.register("sqrt", 0, 0, |fc| {
        let Some(d) = decimal_input(fc)? else { return Ok(Collection::empty()) };
        let f = d.to_f64().ok_or(EvalErrorKind::ArithmeticOverflow)?;
        if f < 0.0 {
            return Ok(Collection::empty());
        }
        decimal_result(f.sqrt())
    });
    r.register("exp", 0, 0, |fc| {
        let Some(d) = decimal_input(fc)? else { return Ok(Collection::empty()) };
        let f = d.to_f64().ok_or(EvalErrorKind::ArithmeticOverflow)?;
        decimal_result(f.exp())
    });
    r.register("ln", 0, 0, |fc| {
        let Some(d) = decimal_input(fc)? else { return Ok(Collection::empty()) };
        let f = d.to_f64().ok_or(EvalErrorKind::ArithmeticOverflow)?;
        if f <= 0.0 {
            return Ok(Collection::empty());
        }
        decimal_result(f.ln())
    });
    r.register("log", 1, 1, |fc| {
        let base = decimal_arg(fc, 0)?.to_f64().ok_or(EvalErrorKind::ArithmeticOverflow)?;
        let Some(d) = decimal_input(fc)? else { return Ok(Collection::empty()) };
        let f = d.to_f64().ok_or(EvalErrorKind::ArithmeticOverflow)?;
        if f <= 0.0 || base <= 0.0 {
            return Ok(Collection::empty());
        }
        decimal_result(f.log(base))
    });
    r.register("power", 1, 1, |fc| {
        let exp = decimal_arg(fc, 0)?.to_f64().ok_or(EvalErrorKind::ArithmeticOverflow)?;
        let Some(d) = decimal_input(fc)? else { return Ok(Collection::empty()) };
        let f = d.to_f64().ok_or(EvalErrorKind::ArithmeticOverflow)?;
        let result = f.powf(exp);
        if result.is_nan() {
            return Ok(Collection::empty());
        }
        decimal_result(result)
    });
}

fn decimal_input(fc: &FunctionContext) -> EvalResult<Option<Decimal>> {
    match singleton(fc.input, fc.name)? {
        None => Ok(None),
        Some(FhirPathValue::Integer(i)) => Ok(Some(Decimal::from(*i))),
        Some(FhirPathValue::Decimal(d)) => Ok(Some(*d)),
        Some(other) => Err(EvalErrorKind::TypeMismatch(format!(
            "'{}' requires a numeric input, got {}",
            fc.name,
            other.type_name()
        ))
        .into()),
    }
}

fn decimal_arg(fc: &FunctionContext, idx: usize) -> EvalResult<Decimal> {
    match fc.args[idx].as_singleton() {
        Some(FhirPathValue::Integer(i)) => Ok(Decimal::from(*i)),
        Some(FhirPathValue::Decimal(d)) => Ok(*d),
        _ => Err(EvalErrorKind::TypeMismatch("expected a numeric argument".to_string()).into()),
    }
}

fn int_arg(fc: &FunctionContext, idx: usize) -> EvalResult<i64> {
    match fc.args[idx].as_singleton() {
        Some(FhirPathValue::Integer(i)) => Ok(*i),
        _ => Err(EvalErrorKind::TypeMismatch("expected an Integer argument".to_string()).into()),
    }
}

fn decimal_result(f: f64) -> EvalResult<Collection> {
    let d = Decimal::from_f64(f).ok_or(EvalErrorKind::ArithmeticOverflow)?;
    Ok(Collection::single(FhirPathValue::Decimal(d)))
}

/// Preserves Integer/Decimal typing per spec I3: `abs()` on an Integer stays
/// an Integer.
fn numeric_unary(
    fc: &FunctionContext,
    on_decimal: impl Fn(Decimal) -> EvalResult<Decimal>,
    on_int: impl Fn(i64) -> Option<i64>,
) -> EvalResult<Collection> {
    match singleton(fc.input, fc.name)? {
        None => Ok(Collection::empty()),
        Some(FhirPathValue::Integer(i)) => {
            let v = on_int(*i).ok_or(EvalErrorKind::ArithmeticOverflow)?;
            Ok(Collection::single(FhirPathValue::Integer(v)))
        }
        Some(FhirPathValue::Decimal(d)) => Ok(Collection::single(FhirPathValue::Decimal(on_decimal(*d)?))),
        Some(other) => Err(EvalErrorKind::TypeMismatch(format!(
            "'{}' requires a numeric input, got {}",
            fc.name,
            other.type_name()
        ))
        .into()),
    }
}

fn numeric_unary_to_int(fc: &FunctionContext, f: impl Fn(Decimal) -> Option<i64>) -> EvalResult<Collection> {
    match singleton(fc.input, fc.name)? {
        None => Ok(Collection::empty()),
        Some(FhirPathValue::Integer(i)) => Ok(Collection::single(FhirPathValue::Integer(*i))),
        Some(FhirPathValue::Decimal(d)) => {
            let v = f(*d).ok_or(EvalErrorKind::ArithmeticOverflow)?;
            Ok(Collection::single(FhirPathValue::Integer(v)))
        }
        Some(other) => Err(EvalErrorKind::TypeMismatch(format!(
            "'{}' requires a numeric input, got {}",
            fc.name,
            other.type_name()
        ))
        .into()),
    }
}
