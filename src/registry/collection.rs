//! Existence, filtering (non-lazy parts), subsetting, and combining (spec §4.5, §4.8).

use super::{FunctionContext, FunctionRegistry};
use crate::evaluator::error::{EvalErrorKind, EvalResult};
use crate::model::types::matches_type;
use crate::model::{Collection, FhirPathValue};

pub fn register(r: &mut FunctionRegistry) {
    r.register("empty", 0, 0, |fc| Ok(Collection::single(FhirPathValue::Boolean(fc.input.is_empty()))));
    r.register("exists", 0, 0, |fc| Ok(Collection::single(FhirPathValue::Boolean(!fc.input.is_empty()))));
    r.register("count", 0, 0, |fc| Ok(Collection::single(FhirPathValue::Integer(fc.input.len() as i64))));
    r.register("first", 0, 0, |fc| Ok(fc.input.first().cloned().map(Collection::single).unwrap_or_default()));
    r.register("last", 0, 0, |fc| {
        Ok(fc.input.as_slice().last().cloned().map(Collection::single).unwrap_or_default())
    });
    r.register("tail", 0, 0, |fc| {
        let v = fc.input.as_slice();
        Ok(if v.len() <= 1 { Collection::empty() } else { Collection::from_vec(v[1..].to_vec()) })
    });
    r.register("skip", 1, 1, |fc| {
        let n = int_arg(fc, 0)?;
        let v = fc.input.as_slice();
        if n <= 0 {
            return Ok(fc.input.clone());
        }
        let n = n as usize;
        Ok(if n >= v.len() { Collection::empty() } else { Collection::from_vec(v[n..].to_vec()) })
    });
    r.register("take", 1, 1, |fc| {
        let n = int_arg(fc, 0)?;
        if n <= 0 {
            return Ok(Collection::empty());
        }
        let v = fc.input.as_slice();
        let n = (n as usize).min(v.len());
        Ok(Collection::from_vec(v[..n].to_vec()))
    });
    r.register("single", 0, 0, |fc| match fc.input.len() {
        0 => Ok(Collection::empty()),
        1 => Ok(Collection::single(fc.input.as_singleton().unwrap().clone())),
        n => Err(EvalErrorKind::SingletonExpected(n).into()),
    });
    r.register("distinct", 0, 0, |fc| Ok(distinct(fc.input.as_slice())));
    r.register("isDistinct", 0, 0, |fc| {
        let d = distinct(fc.input.as_slice());
        Ok(Collection::single(FhirPathValue::Boolean(d.len() == fc.input.len())))
    });
    r.register("subsetOf", 1, 1, |fc| {
        let other = &fc.args[0];
        let ok = fc.input.iter().all(|v| other.iter().any(|o| v.strict_eq(o) == Some(true)));
        Ok(Collection::single(FhirPathValue::Boolean(ok)))
    });
    r.register("supersetOf", 1, 1, |fc| {
        let other = &fc.args[0];
        let ok = other.iter().all(|v| fc.input.iter().any(|o| v.strict_eq(o) == Some(true)));
        Ok(Collection::single(FhirPathValue::Boolean(ok)))
    });
    r.register("combine", 1, 1, |fc| Ok(fc.input.clone().concat(fc.args[0].clone())));
    r.register("union", 1, 1, |fc| {
        let mut combined: Vec<FhirPathValue> = fc.input.as_slice().to_vec();
        combined.extend(fc.args[0].iter().cloned());
        Ok(distinct(&combined))
    });
    r.register("intersect", 1, 1, |fc| {
        let other = &fc.args[0];
        let mut seen: Vec<FhirPathValue> = Vec::new();
        for v in fc.input.iter() {
            if other.iter().any(|o| v.strict_eq(o) == Some(true))
                && !seen.iter().any(|s| s.strict_eq(v) == Some(true))
            {
                seen.push(v.clone());
            }
        }
        Ok(Collection::from_vec(seen))
    });
    r.register("exclude", 1, 1, |fc| {
        let other = &fc.args[0];
        let out: Vec<FhirPathValue> = fc
            .input
            .iter()
            .filter(|v| !other.iter().any(|o| v.strict_eq(o) == Some(true)))
            .cloned()
            .collect();
        Ok(Collection::from_vec(out))
    });
    r.register("allTrue", 0, 0, |fc| Ok(all_bool(fc.input.as_slice(), true, true)));
    r.register("anyTrue", 0, 0, |fc| Ok(all_bool(fc.input.as_slice(), true, false)));
    r.register("allFalse", 0, 0, |fc| Ok(all_bool(fc.input.as_slice(), false, true)));
    r.register("anyFalse", 0, 0, |fc| Ok(all_bool(fc.input.as_slice(), false, false)));
    r.register("ofType", 1, 1, |fc| {
        let type_name = type_name_arg(fc)?;
        let out: Vec<FhirPathValue> =
            fc.input.iter().filter(|v| matches_type(v, &type_name)).cloned().collect();
        Ok(Collection::from_vec(out))
    });
}

fn int_arg(fc: &FunctionContext, idx: usize) -> EvalResult<i64> {
    match fc.args[idx].as_singleton() {
        Some(FhirPathValue::Integer(i)) => Ok(*i),
        _ => Err(EvalErrorKind::TypeMismatch("expected an Integer argument".to_string()).into()),
    }
}

fn type_name_arg(fc: &FunctionContext) -> EvalResult<String> {
    match fc.args[0].as_singleton() {
        Some(FhirPathValue::String(s)) => Ok(s.clone()),
        _ => Err(EvalErrorKind::TypeMismatch("expected a type-name argument".to_string()).into()),
    }
}

fn distinct(values: &[FhirPathValue]) -> Collection {
    let mut out: Vec<FhirPathValue> = Vec::new();
    for v in values {
        if !out.iter().any(|o| o.strict_eq(v) == Some(true)) {
            out.push(v.clone());
        }
    }
    Collection::from_vec(out)
}

/// `allTrue`/`anyTrue`/`allFalse`/`anyFalse`: vacuous truth on empty for the
/// "all" variants (spec §4.5).
fn all_bool(values: &[FhirPathValue], target: bool, is_all: bool) -> Collection {
    let result = if is_all {
        values.iter().all(|v| matches!(v, FhirPathValue::Boolean(b) if *b == target))
    } else {
        values.iter().any(|v| matches!(v, FhirPathValue::Boolean(b) if *b == target))
    };
    Collection::single(FhirPathValue::Boolean(result))
}
