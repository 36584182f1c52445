//! Date/time component accessors and `now()`/`today()`/`timeOfDay()` (spec §4.11).

use chrono::{Datelike, Timelike};

use super::{FunctionContext, FunctionRegistry, singleton};
use crate::evaluator::error::{EvalErrorKind, EvalResult};
use crate::model::{Collection, DateTimePrecision, FhirPathValue, PartialDate, PartialDateTime, PartialTime};

pub fn register(r: &mut FunctionRegistry) {
    r.register("now", 0, 0, |_fc| {
        let now = chrono::Local::now();
        let offset = *now.offset();
        let naive = now.naive_local();
        Ok(Collection::single(FhirPathValue::DateTime(PartialDateTime {
            year: naive.year(),
            month: naive.month(),
            day: naive.day(),
            hour: naive.hour(),
            minute: naive.minute(),
            second: naive.second(),
            millis: naive.nanosecond() / 1_000_000,
            offset: Some(offset),
            precision: DateTimePrecision::Millis,
        })))
    });
    r.register("today", 0, 0, |_fc| {
        let today = chrono::Local::now().date_naive();
        Ok(Collection::single(FhirPathValue::Date(PartialDate::from_naive(today))))
    });
    r.register("timeOfDay", 0, 0, |_fc| {
        let now = chrono::Local::now().naive_local();
        Ok(Collection::single(FhirPathValue::Time(PartialTime {
            hour: now.hour(),
            minute: now.minute(),
            second: now.second(),
            millis: now.nanosecond() / 1_000_000,
            precision: crate::model::TimePrecision::Millis,
        })))
    });

    r.register("year", 0, 0, |fc| component(fc, |y, _, _, _, _, _| y));
    r.register("month", 0, 0, |fc| component(fc, |_, m, _, _, _, _| m));
    r.register("day", 0, 0, |fc| component(fc, |_, _, d, _, _, _| d));
    r.register("hour", 0, 0, |fc| component(fc, |_, _, _, h, _, _| h));
    r.register("minute", 0, 0, |fc| component(fc, |_, _, _, _, mi, _| mi));
    r.register("second", 0, 0, |fc| component(fc, |_, _, _, _, _, s| s));
    r.register("millisecond", 0, 0, |fc| {
        match singleton(fc.input, fc.name)? {
            None => Ok(Collection::empty()),
            Some(FhirPathValue::DateTime(dt)) if dt.precision >= DateTimePrecision::Millis => {
                Ok(Collection::single(FhirPathValue::Integer(dt.millis as i64)))
            }
            Some(FhirPathValue::Time(t)) if t.precision >= crate::model::TimePrecision::Millis => {
                Ok(Collection::single(FhirPathValue::Integer(t.millis as i64)))
            }
            Some(FhirPathValue::DateTime(_) | FhirPathValue::Time(_) | FhirPathValue::Date(_)) => {
                Ok(Collection::empty())
            }
            Some(other) => Err(EvalErrorKind::TypeMismatch(format!(
                "'millisecond' requires a Date/DateTime/Time input, got {}",
                other.type_name()
            ))
            .into()),
        }
    });
}

/// Shared accessor for `year`/`month`/.../`second`: each extractor returns
/// `None` when the source precision doesn't carry that component.
#[allow(clippy::type_complexity)]
fn component(
    fc: &FunctionContext,
    extract: impl Fn(
        Option<u32>,
        Option<u32>,
        Option<u32>,
        Option<u32>,
        Option<u32>,
        Option<u32>,
    ) -> Option<u32>,
) -> EvalResult<Collection> {
    let Some(v) = singleton(fc.input, fc.name)? else { return Ok(Collection::empty()) };
    let result = match v {
        FhirPathValue::Date(d) => {
            let year = Some(d.year as u32);
            let month = (d.precision >= crate::model::DatePrecision::Month).then_some(d.month);
            let day = (d.precision >= crate::model::DatePrecision::Day).then_some(d.day);
            extract(year, month, day, None, None, None)
        }
        FhirPathValue::DateTime(dt) => {
            let year = Some(dt.year as u32);
            let month = (dt.precision >= DateTimePrecision::Month).then_some(dt.month);
            let day = (dt.precision >= DateTimePrecision::Day).then_some(dt.day);
            let hour = (dt.precision >= DateTimePrecision::Hour).then_some(dt.hour);
            let minute = (dt.precision >= DateTimePrecision::Minute).then_some(dt.minute);
            let second = (dt.precision >= DateTimePrecision::Second).then_some(dt.second);
            extract(year, month, day, hour, minute, second)
        }
        FhirPathValue::Time(t) => {
            let minute = (t.precision >= crate::model::TimePrecision::Minute).then_some(t.minute);
            let second = (t.precision >= crate::model::TimePrecision::Second).then_some(t.second);
            extract(None, None, None, Some(t.hour), minute, second)
        }
        other => {
            return Err(EvalErrorKind::TypeMismatch(format!(
                "'{}' requires a Date/DateTime/Time input, got {}",
                fc.name,
                other.type_name()
            ))
            .into());
        }
    };
    Ok(result.map(|i| Collection::single(FhirPathValue::Integer(i as i64))).unwrap_or_default())
}
