//! Function registry and built-ins (spec C8, §4.7, §4.10-§4.11).
//!
//! A flat name -> descriptor map with a uniform calling convention, per the
//! teacher's `registry/` design and the "do not inherit; use a flat
//! registry" note in spec §9. Lazy functions (`where`, `select`, `repeat`,
//! `all`, `exists` w/ criteria, `iif`, `aggregate`, `trace` w/ projection,
//! `sort`) are special-cased in the evaluator instead of living here,
//! because they need to re-enter the AST walk with a per-element `$this`.

mod aggregate;
mod collection;
mod conversion;
mod datetime;
mod fhir;
mod math;
mod string;
mod utility;

use std::collections::HashMap;
use std::sync::Arc;

use crate::evaluator::context::EvaluationContext;
use crate::evaluator::error::{EvalError, EvalErrorKind, EvalResult};
use crate::model::Collection;

/// Arguments are pre-evaluated Collections for every non-lazy function.
pub struct FunctionContext<'a> {
    pub ctx: &'a EvaluationContext,
    pub input: &'a Collection,
    pub args: &'a [Collection],
    pub name: &'a str,
}

pub type FunctionImpl = Arc<dyn Fn(&FunctionContext) -> EvalResult<Collection> + Send + Sync>;

pub struct FunctionEntry {
    pub min_args: usize,
    pub max_args: usize,
    pub f: FunctionImpl,
}

pub struct FunctionRegistry {
    functions: HashMap<&'static str, FunctionEntry>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self { functions: HashMap::new() };
        collection::register(&mut registry);
        string::register(&mut registry);
        math::register(&mut registry);
        conversion::register(&mut registry);
        datetime::register(&mut registry);
        utility::register(&mut registry);
        aggregate::register(&mut registry);
        fhir::register(&mut registry);
        registry
    }

    pub fn register(
        &mut self,
        name: &'static str,
        min_args: usize,
        max_args: usize,
        f: impl Fn(&FunctionContext) -> EvalResult<Collection> + Send + Sync + 'static,
    ) {
        self.functions.insert(name, FunctionEntry { min_args, max_args, f: Arc::new(f) });
    }

    pub fn get(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn call(
        &self,
        name: &str,
        ctx: &EvaluationContext,
        input: &Collection,
        args: &[Collection],
    ) -> EvalResult<Collection> {
        let entry = self
            .functions
            .get(name)
            .ok_or_else(|| EvalError::from(EvalErrorKind::UnknownFunction(name.to_string())))?;
        if args.len() < entry.min_args || args.len() > entry.max_args {
            return Err(EvalErrorKind::ArityMismatch {
                function: name.to_string(),
                expected: if entry.min_args == entry.max_args {
                    entry.min_args.to_string()
                } else {
                    format!("{}-{}", entry.min_args, entry.max_args)
                },
                actual: args.len(),
            }
            .into());
        }
        let fctx = FunctionContext { ctx, input, args, name };
        (entry.f)(&fctx)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper used throughout the registry families: require the input to be a
/// singleton. An empty input yields `Ok(None)` (spec §4.5/§4.14 — empty
/// propagates silently, it is never an error); two or more elements is
/// `SingletonExpected`.
pub(crate) fn singleton<'a>(
    c: &'a Collection,
    who: &str,
) -> EvalResult<Option<&'a crate::model::FhirPathValue>> {
    match c.len() {
        0 => Ok(None),
        1 => Ok(c.as_singleton()),
        n => Err(EvalError::from(EvalErrorKind::SingletonExpected(n)).in_site(who)),
    }
}
