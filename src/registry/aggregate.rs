//! `sum`/`avg`/`min`/`max` (spec §4.12). `aggregate()` itself carries `$total`
//! across re-entrant evaluation and is special-cased in the evaluator.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::FunctionRegistry;
use crate::evaluator::error::{EvalErrorKind, EvalResult};
use crate::model::{Collection, FhirPathValue};

pub fn register(r: &mut FunctionRegistry) {
    r.register("sum", 0, 0, |fc| {
        if fc.input.is_empty() {
            return Ok(Collection::empty());
        }
        let mut acc = Decimal::ZERO;
        let mut all_integer = true;
        for v in fc.input.iter() {
            match v {
                FhirPathValue::Integer(i) => acc += Decimal::from(*i),
                FhirPathValue::Decimal(d) => {
                    all_integer = false;
                    acc += d;
                }
                other => {
                    return Err(EvalErrorKind::TypeMismatch(format!(
                        "'sum' requires numeric elements, got {}",
                        other.type_name()
                    ))
                    .into());
                }
            }
        }
        Ok(Collection::single(numeric_result(acc, all_integer)))
    });
    r.register("avg", 0, 0, |fc| {
        if fc.input.is_empty() {
            return Ok(Collection::empty());
        }
        let mut acc = Decimal::ZERO;
        for v in fc.input.iter() {
            match v {
                FhirPathValue::Integer(i) => acc += Decimal::from(*i),
                FhirPathValue::Decimal(d) => acc += d,
                other => {
                    return Err(EvalErrorKind::TypeMismatch(format!(
                        "'avg' requires numeric elements, got {}",
                        other.type_name()
                    ))
                    .into());
                }
            }
        }
        let avg = acc / Decimal::from(fc.input.len() as i64);
        Ok(Collection::single(FhirPathValue::Decimal(avg)))
    });
    r.register("min", 0, 0, |fc| extremum(fc, Ordering::Less));
    r.register("max", 0, 0, |fc| extremum(fc, Ordering::Greater));
}

fn numeric_result(acc: Decimal, all_integer: bool) -> FhirPathValue {
    if all_integer {
        acc.to_i64().map(FhirPathValue::Integer).unwrap_or(FhirPathValue::Decimal(acc))
    } else {
        FhirPathValue::Decimal(acc)
    }
}

fn extremum(fc: &super::FunctionContext, want: Ordering) -> EvalResult<Collection> {
    if fc.input.is_empty() {
        return Ok(Collection::empty());
    }
    let mut best: Option<&FhirPathValue> = None;
    for v in fc.input.iter() {
        best = match best {
            None => Some(v),
            Some(b) => match v.partial_order(b) {
                Ok(Some(ord)) if ord == want => Some(v),
                Ok(_) => Some(b),
                Err(()) => {
                    return Err(EvalErrorKind::TypeMismatch(
                        "min/max requires mutually comparable elements".to_string(),
                    )
                    .into());
                }
            },
        };
    }
    Ok(best.cloned().map(Collection::single).unwrap_or_default())
}
