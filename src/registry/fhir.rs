//! FHIR-specific functions (spec §4.11): `extension`, `hasExtension`,
//! `getExtensionValue`, `resolve`, `getReferenceKey`, `memberOf`,
//! `conformsTo`, `hasValue`, `getValue`.

use super::{FunctionContext, FunctionRegistry, singleton};
use crate::evaluator::error::{EvalErrorKind, EvalResult};
use crate::model::{Collection, FhirPathValue, JsonObject};

pub fn register(r: &mut FunctionRegistry) {
    r.register("extension", 1, 1, |fc| {
        let url = string_arg(fc, 0)?;
        let mut out = Vec::new();
        for v in fc.input.iter() {
            if let FhirPathValue::Object(obj) = v
                && let Some(exts) = obj.get_field("extension") {
                    for e in exts.iter() {
                        if let FhirPathValue::Object(ext) = e
                            && matches_url(ext, &url) {
                                out.push(e.clone());
                            }
                    }
                }
        }
        Ok(Collection::from_vec(out))
    });
    r.register("hasExtension", 1, 1, |fc| {
        let url = string_arg(fc, 0)?;
        let found = fc.input.iter().any(|v| match v {
            FhirPathValue::Object(obj) => obj
                .get_field("extension")
                .map(|exts| {
                    exts.iter().any(|e| matches!(e, FhirPathValue::Object(ext) if matches_url(ext, &url)))
                })
                .unwrap_or(false),
            _ => false,
        });
        Ok(Collection::single(FhirPathValue::Boolean(found)))
    });
    r.register("getExtensionValue", 1, 1, |fc| {
        let url = string_arg(fc, 0)?;
        let mut out = Vec::new();
        for v in fc.input.iter() {
            if let FhirPathValue::Object(obj) = v
                && let Some(exts) = obj.get_field("extension") {
                    for e in exts.iter() {
                        if let FhirPathValue::Object(ext) = e
                            && matches_url(ext, &url) {
                                out.extend(extension_value(ext));
                            }
                    }
                }
        }
        Ok(Collection::from_vec(out))
    });
    r.register("resolve", 0, 0, |fc| {
        let Some(resolver) = fc.ctx.resolver.as_ref() else {
            return Ok(Collection::empty());
        };
        let mut out = Vec::new();
        for v in fc.input.iter() {
            fc.ctx.check_cancelled()?;
            let reference = match v {
                FhirPathValue::String(s) => Some(s.clone()),
                FhirPathValue::Object(obj) => {
                    obj.get_field("reference").and_then(|c| c.as_singleton().and_then(|r| match r {
                        FhirPathValue::String(s) => Some(s.clone()),
                        _ => None,
                    }))
                }
                _ => None,
            };
            let Some(reference) = reference else { continue };
            if let Ok(bytes) = resolver.resolve(&fc.ctx.cancellation, &reference)
                && let Ok(json) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                    out.push(FhirPathValue::Object(JsonObject::new(json)));
                }
        }
        Ok(Collection::from_vec(out))
    });
    r.register("getReferenceKey", 0, 1, |fc| {
        let part = match fc.args.first() {
            Some(_) => Some(string_arg(fc, 0)?),
            None => None,
        };
        let Some(v) = singleton(fc.input, fc.name)? else { return Ok(Collection::empty()) };
        let reference = match v {
            FhirPathValue::String(s) => s.clone(),
            FhirPathValue::Object(obj) => match obj.get_field("reference").and_then(|c| c.as_singleton().cloned()) {
                Some(FhirPathValue::String(s)) => s,
                _ => return Ok(Collection::empty()),
            },
            _ => return Ok(Collection::empty()),
        };
        let Some((ty, id)) = split_reference(&reference) else {
            return Ok(Collection::empty());
        };
        let out = match part.as_deref() {
            Some("type") => ty.to_string(),
            Some("id") => id.to_string(),
            _ => format!("{ty}/{id}"),
        };
        Ok(Collection::single(FhirPathValue::String(out)))
    });
    r.register("memberOf", 1, 1, |fc| {
        let value_set = string_arg(fc, 0)?;
        let Some(ts) = fc.ctx.terminology.as_ref() else {
            return Ok(Collection::empty());
        };
        let Some(v) = singleton(fc.input, fc.name)? else { return Ok(Collection::empty()) };
        let Some(payload) = code_payload(v) else { return Ok(Collection::empty()) };
        match ts.member_of(&fc.ctx.cancellation, &payload, &value_set) {
            Ok(b) => Ok(Collection::single(FhirPathValue::Boolean(b))),
            Err(_) => Ok(Collection::empty()),
        }
    });
    r.register("conformsTo", 1, 1, |fc| {
        let profile = string_arg(fc, 0)?;
        let Some(validator) = fc.ctx.validator.as_ref() else {
            return Ok(Collection::empty());
        };
        match singleton(fc.input, fc.name)? {
            None => Ok(Collection::empty()),
            Some(FhirPathValue::Object(obj)) => {
                match validator.conforms_to(&fc.ctx.cancellation, obj.raw(), &profile) {
                    Ok(b) => Ok(Collection::single(FhirPathValue::Boolean(b))),
                    Err(_) => Ok(Collection::empty()),
                }
            }
            Some(other) => Err(EvalErrorKind::TypeMismatch(format!(
                "'conformsTo' requires an Object input, got {}",
                other.type_name()
            ))
            .into()),
        }
    });
    r.register("hasValue", 0, 0, |fc| {
        let has = match fc.input.as_singleton() {
            Some(FhirPathValue::Object(obj)) => obj.get_field("value").is_some(),
            Some(_) => true,
            None => false,
        };
        Ok(Collection::single(FhirPathValue::Boolean(has)))
    });
    r.register("getValue", 0, 0, |fc| match fc.input.as_singleton() {
        Some(FhirPathValue::Object(obj)) => Ok(obj.get_field("value").unwrap_or_default()),
        Some(v) => Ok(Collection::single(v.clone())),
        None => Ok(Collection::empty()),
    });
}

fn string_arg(fc: &FunctionContext, idx: usize) -> EvalResult<String> {
    match fc.args[idx].as_singleton() {
        Some(FhirPathValue::String(s)) => Ok(s.clone()),
        _ => Err(EvalErrorKind::TypeMismatch("expected a String argument".to_string()).into()),
    }
}

fn matches_url(ext: &JsonObject, url: &str) -> bool {
    matches!(
        ext.get_field("url").and_then(|c| c.as_singleton().cloned()),
        Some(FhirPathValue::String(s)) if s == url
    )
}

/// `value[x]` resolution order (spec §4.11): try each FHIR primitive/complex
/// suffix in this fixed priority before falling back to whatever `value*`
/// field happens to be present.
const VALUE_X_PRIORITY: &[&str] = &[
    "String", "Boolean", "Integer", "Decimal", "Date", "DateTime", "Time", "Code", "Coding",
    "CodeableConcept", "Quantity", "Reference", "Identifier", "Period", "Range", "Ratio",
    "Attachment", "Uri", "Url", "Canonical",
];

fn extension_value(ext: &JsonObject) -> Vec<FhirPathValue> {
    for suffix in VALUE_X_PRIORITY {
        if let Some(c) = ext.get_field(&format!("value{suffix}")) {
            return c.into_vec();
        }
    }
    for name in ext.field_names() {
        if let Some(rest) = name.strip_prefix("value")
            && !rest.is_empty()
            && let Some(c) = ext.get_field(&name)
        {
            return c.into_vec();
        }
    }
    Vec::new()
}

fn split_reference(reference: &str) -> Option<(&str, &str)> {
    let trimmed = reference.rsplit_once('/')?;
    let (before, id) = trimmed;
    let ty = before.rsplit('/').next().unwrap_or(before);
    Some((ty, id))
}

fn code_payload(v: &FhirPathValue) -> Option<serde_json::Value> {
    match v {
        FhirPathValue::String(s) => Some(serde_json::json!({ "code": s })),
        FhirPathValue::Object(obj) => Some(obj.raw().clone()),
        _ => None,
    }
}
