//! String manipulation functions (spec §4.10).

use std::num::NonZeroUsize;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64_STANDARD, URL_SAFE as BASE64_URL_SAFE};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;

use super::{FunctionContext, FunctionRegistry, singleton};
use crate::evaluator::error::{EvalErrorKind, EvalResult};
use crate::model::{Collection, FhirPathValue};

pub fn register(r: &mut FunctionRegistry) {
    r.register("startsWith", 1, 1, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        let prefix = string_arg(fc, 0)?;
        bool_result(s.starts_with(&prefix))
    });
    r.register("endsWith", 1, 1, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        let suffix = string_arg(fc, 0)?;
        bool_result(s.ends_with(&suffix))
    });
    r.register("contains", 1, 1, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        let needle = string_arg(fc, 0)?;
        bool_result(s.contains(&needle))
    });
    r.register("indexOf", 1, 1, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        let needle = string_arg(fc, 0)?;
        let idx = s.find(&needle).map(|byte_idx| s[..byte_idx].chars().count() as i64).unwrap_or(-1);
        Ok(Collection::single(FhirPathValue::Integer(idx)))
    });
    r.register("substring", 1, 2, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        let chars: Vec<char> = s.chars().collect();
        let start = int_arg(fc, 0)?;
        if start < 0 || start as usize >= chars.len() {
            return Ok(Collection::empty());
        }
        let start = start as usize;
        let end = match fc.args.get(1) {
            Some(_) => {
                let len = int_arg(fc, 1)?.max(0) as usize;
                (start + len).min(chars.len())
            }
            None => chars.len(),
        };
        let result: String = chars[start..end].iter().collect();
        Ok(Collection::single(FhirPathValue::String(result)))
    });
    r.register("replace", 2, 2, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        let pattern = string_arg(fc, 0)?;
        let replacement = string_arg(fc, 1)?;
        Ok(Collection::single(FhirPathValue::String(s.replace(&pattern, &replacement))))
    });
    r.register("matches", 1, 1, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        let pattern = string_arg(fc, 0)?;
        let re = anchored_regex(&pattern)?;
        bool_result(re.is_match(&s))
    });
    r.register("replaceMatches", 2, 2, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        let pattern = string_arg(fc, 0)?;
        let replacement = string_arg(fc, 1)?;
        let re = compiled_regex(&pattern)?;
        let expanded = translate_replacement(&replacement);
        Ok(Collection::single(FhirPathValue::String(re.replace_all(&s, expanded.as_str()).into_owned())))
    });
    r.register("split", 1, 1, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        let sep = string_arg(fc, 0)?;
        let parts: Vec<FhirPathValue> = if sep.is_empty() {
            vec![FhirPathValue::String(s)]
        } else {
            s.split(sep.as_str()).map(|p| FhirPathValue::String(p.to_string())).collect()
        };
        Ok(Collection::from_vec(parts))
    });
    r.register("join", 0, 1, |fc| {
        let sep = match fc.args.first() {
            Some(_) => string_arg(fc, 0)?,
            None => String::new(),
        };
        let mut out = String::new();
        for (i, v) in fc.input.iter().enumerate() {
            if i > 0 {
                out.push_str(&sep);
            }
            out.push_str(&v.display_string());
        }
        Ok(Collection::single(FhirPathValue::String(out)))
    });
    r.register("lower", 0, 0, |fc| match string_input(fc)? {
        Some(s) => Ok(Collection::single(FhirPathValue::String(s.to_lowercase()))),
        None => Ok(Collection::empty()),
    });
    r.register("upper", 0, 0, |fc| match string_input(fc)? {
        Some(s) => Ok(Collection::single(FhirPathValue::String(s.to_uppercase()))),
        None => Ok(Collection::empty()),
    });
    r.register("length", 0, 0, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        Ok(Collection::single(FhirPathValue::Integer(s.chars().count() as i64)))
    });
    r.register("toChars", 0, 0, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        Ok(Collection::from_vec(s.chars().map(|c| FhirPathValue::String(c.to_string())).collect()))
    });
    r.register("trim", 0, 0, |fc| match string_input(fc)? {
        Some(s) => Ok(Collection::single(FhirPathValue::String(s.trim().to_string()))),
        None => Ok(Collection::empty()),
    });
    r.register("encode", 1, 1, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        let scheme = string_arg(fc, 0)?;
        match scheme.as_str() {
            "base64" => Ok(Collection::single(FhirPathValue::String(BASE64_STANDARD.encode(s.as_bytes())))),
            "urlbase64" => Ok(Collection::single(FhirPathValue::String(BASE64_URL_SAFE.encode(s.as_bytes())))),
            "hex" => Ok(Collection::single(FhirPathValue::String(
                s.as_bytes().iter().map(|b| format!("{b:02x}")).collect(),
            ))),
            other => Err(EvalErrorKind::TypeMismatch(format!("unsupported encode() scheme '{other}'")).into()),
        }
    });
    r.register("decode", 1, 1, |fc| {
        let Some(s) = string_input(fc)? else { return Ok(Collection::empty()) };
        let scheme = string_arg(fc, 0)?;
        match scheme.as_str() {
            "base64" => {
                let bytes = BASE64_STANDARD
                    .decode(s.as_bytes())
                    .map_err(|_| EvalErrorKind::TypeMismatch("invalid base64 input".to_string()))?;
                Ok(Collection::single(FhirPathValue::String(
                    String::from_utf8(bytes)
                        .map_err(|_| EvalErrorKind::TypeMismatch("decoded bytes are not valid UTF-8".to_string()))?,
                )))
            }
            "urlbase64" => {
                let bytes = BASE64_URL_SAFE
                    .decode(s.as_bytes())
                    .map_err(|_| EvalErrorKind::TypeMismatch("invalid base64 input".to_string()))?;
                Ok(Collection::single(FhirPathValue::String(
                    String::from_utf8(bytes)
                        .map_err(|_| EvalErrorKind::TypeMismatch("decoded bytes are not valid UTF-8".to_string()))?,
                )))
            }
            "hex" => {
                let bytes = decode_hex(&s)
                    .ok_or_else(|| EvalErrorKind::TypeMismatch("invalid hex input".to_string()))?;
                Ok(Collection::single(FhirPathValue::String(
                    String::from_utf8(bytes)
                        .map_err(|_| EvalErrorKind::TypeMismatch("decoded bytes are not valid UTF-8".to_string()))?,
                )))
            }
            other => Err(EvalErrorKind::TypeMismatch(format!("unsupported decode() scheme '{other}'")).into()),
        }
    });
}

fn string_input(fc: &FunctionContext) -> EvalResult<Option<String>> {
    match singleton(fc.input, fc.name)? {
        None => Ok(None),
        Some(FhirPathValue::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(EvalErrorKind::TypeMismatch(format!("'{}' requires a String input, got {}", fc.name, other.type_name())).into()),
    }
}

fn string_arg(fc: &FunctionContext, idx: usize) -> EvalResult<String> {
    match fc.args[idx].as_singleton() {
        Some(FhirPathValue::String(s)) => Ok(s.clone()),
        _ => Err(EvalErrorKind::TypeMismatch("expected a String argument".to_string()).into()),
    }
}

fn int_arg(fc: &FunctionContext, idx: usize) -> EvalResult<i64> {
    match fc.args[idx].as_singleton() {
        Some(FhirPathValue::Integer(i)) => Ok(*i),
        _ => Err(EvalErrorKind::TypeMismatch("expected an Integer argument".to_string()).into()),
    }
}

fn bool_result(b: bool) -> EvalResult<Collection> {
    Ok(Collection::single(FhirPathValue::Boolean(b)))
}

/// Patterns longer than this are rejected outright (spec §4.10): `regex`'s
/// engine is linear-time, not backtracking, but a pathologically long
/// pattern can still blow up compile time and memory.
const MAX_PATTERN_LEN: usize = 1000;

const PATTERN_CACHE_CAPACITY: usize = 256;

static PATTERN_CACHE: Lazy<Mutex<lru::LruCache<String, Arc<Regex>>>> =
    Lazy::new(|| Mutex::new(lru::LruCache::new(NonZeroUsize::new(PATTERN_CACHE_CAPACITY).unwrap())));

/// Rejects patterns nested quantifiers away (`(a+)+`, `(a*)*`, ...) that are
/// the classic catastrophic-backtracking shape in backtracking engines.
/// `regex` itself never backtracks, but flagging the shape keeps behavior
/// predictable for patterns authored against other FHIRPath implementations.
fn has_nested_quantifiers(pattern: &str) -> bool {
    let chars: Vec<char> = pattern.chars().collect();
    let mut depth_quantified = Vec::new();
    let mut depth = 0usize;
    for (i, &c) in chars.iter().enumerate() {
        match c {
            '(' if i == 0 || chars[i - 1] != '\\' => {
                depth += 1;
                depth_quantified.resize(depth + 1, false);
            }
            ')' if i == 0 || chars[i - 1] != '\\' => {
                let inner_quantified = depth_quantified.get(depth).copied().unwrap_or(false);
                depth = depth.saturating_sub(1);
                if inner_quantified && matches!(chars.get(i + 1), Some('+') | Some('*')) {
                    return true;
                }
            }
            '+' | '*' if i == 0 || chars[i - 1] != '\\' => {
                if let Some(slot) = depth_quantified.get_mut(depth) {
                    *slot = true;
                }
            }
            _ => {}
        }
    }
    false
}

fn compile_checked(pattern: &str) -> EvalResult<Arc<Regex>> {
    if pattern.len() > MAX_PATTERN_LEN {
        return Err(EvalErrorKind::RegexUnsafe(format!(
            "pattern exceeds the {MAX_PATTERN_LEN}-byte limit"
        ))
        .into());
    }
    if has_nested_quantifiers(pattern) {
        return Err(EvalErrorKind::RegexUnsafe(
            "pattern has nested quantifiers, a catastrophic-backtracking shape".to_string(),
        )
        .into());
    }
    let mut cache = PATTERN_CACHE.lock();
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }
    let re = Arc::new(Regex::new(pattern).map_err(|e| EvalErrorKind::RegexUnsafe(e.to_string()))?);
    cache.put(pattern.to_string(), re.clone());
    Ok(re)
}

/// FHIRPath `matches()` wants whole-string matching; anchor the pattern
/// rather than checking `Regex::is_match` against a substring.
fn anchored_regex(pattern: &str) -> EvalResult<Arc<Regex>> {
    compile_checked(&format!("^(?:{pattern})$"))
}

fn compiled_regex(pattern: &str) -> EvalResult<Arc<Regex>> {
    compile_checked(pattern)
}

fn translate_replacement(s: &str) -> String {
    // FHIRPath/Java-style `$1` backreferences map directly onto `regex`'s `$1`.
    s.to_string()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if !s.len().is_multiple_of(2) {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_quantifier_shape_is_rejected() {
        assert!(has_nested_quantifiers("(a+)+"));
        assert!(has_nested_quantifiers("(a*)*b"));
        assert!(!has_nested_quantifiers("a+b*"));
        assert!(!has_nested_quantifiers("(ab)+"));
    }

    #[test]
    fn overlong_pattern_is_rejected() {
        let pattern = "a".repeat(MAX_PATTERN_LEN + 1);
        assert!(compile_checked(&pattern).is_err());
    }

    #[test]
    fn repeated_compiles_share_the_cache() {
        let a = compile_checked("[0-9]+").unwrap();
        let b = compile_checked("[0-9]+").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn matches_end_to_end_via_expression_api() {
        let expr = crate::compile("name.given.first().matches('^[A-Z][a-z]+$')").unwrap();
        let resource = br#"{"resourceType":"Patient","name":[{"given":["Karen"]}]}"#;
        assert_eq!(expr.to_boolean(resource).unwrap(), Some(true));
    }
}
