//! A FHIRPath 2.0 expression language evaluator for FHIR JSON resources.
//!
//! The public surface is deliberately small: [`compile`] parses source into
//! a reusable [`Expression`], which [`Expression::evaluate`] runs against a
//! resource's JSON bytes. An [`ExpressionCache`] is provided for callers that
//! re-evaluate the same small set of expressions across many resources.

pub mod ast;
pub mod cache;
pub mod diagnostics;
pub mod evaluator;
pub mod model;
pub mod parser;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use ast::ExprNode;
use evaluator::{
    Cancellation, EvalError, EvaluationContext, EvaluationOptions, ProfileValidator, ReferenceResolver,
    TerminologyService,
};
use model::{Collection, FhirPathValue, JsonObject};
use parser::ParseError;
use registry::FunctionRegistry;

/// Top-level error: either the expression failed to parse, or it evaluated
/// but raised one of the spec's evaluation errors (spec §7). Path-navigation
/// misses are never errors — they resolve to an empty `Collection` (I1).
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("the resource bytes are not valid JSON: {0}")]
    InvalidJson(String),
}

/// A compiled, immutable expression, safe to share across threads and
/// evaluate concurrently (spec I5).
#[derive(Debug)]
pub struct Expression {
    source: String,
    ast: Arc<ExprNode>,
}

/// Parses `source` into a reusable [`Expression`].
pub fn compile(source: &str) -> Result<Expression, ParseError> {
    let ast = parser::parse_expression(source)?;
    Ok(Expression { source: source.to_string(), ast })
}

impl Expression {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against `resource_json`, a single FHIR resource's serialized
    /// bytes, using default options (5 second timeout, default depth/size
    /// limits, no external-service hooks).
    pub fn evaluate(&self, resource_json: &[u8]) -> Result<Collection, Error> {
        self.evaluate_with(resource_json, &EvaluationOptions::default())
    }

    pub fn evaluate_with(&self, resource_json: &[u8], options: &EvaluationOptions) -> Result<Collection, Error> {
        let json: serde_json::Value =
            serde_json::from_slice(resource_json).map_err(|e| Error::InvalidJson(e.to_string()))?;
        let root = Collection::single(FhirPathValue::Object(JsonObject::new(json)));
        let ctx = EvaluationContext::new(root, options);
        let registry = FunctionRegistry::new();
        Ok(evaluator::evaluate(&self.ast, &ctx, &registry)?)
    }

    /// Convenience: the singleton-evaluation rule applied to a Boolean result
    /// (spec §4.5). Errors if the result isn't a singleton Boolean.
    pub fn to_boolean(&self, resource_json: &[u8]) -> Result<Option<bool>, Error> {
        let c = self.evaluate(resource_json)?;
        Ok(c.singleton_boolean())
    }

    pub fn to_string_value(&self, resource_json: &[u8]) -> Result<Option<String>, Error> {
        let c = self.evaluate(resource_json)?;
        Ok(c.as_singleton().map(|v| v.display_string()))
    }

    pub fn to_strings(&self, resource_json: &[u8]) -> Result<Vec<String>, Error> {
        let c = self.evaluate(resource_json)?;
        Ok(c.iter().map(|v| v.display_string()).collect())
    }

    pub fn exists(&self, resource_json: &[u8]) -> Result<bool, Error> {
        let c = self.evaluate(resource_json)?;
        Ok(!c.is_empty())
    }

    pub fn count(&self, resource_json: &[u8]) -> Result<usize, Error> {
        let c = self.evaluate(resource_json)?;
        Ok(c.len())
    }
}

/// Builds an [`EvaluationOptions`] with a fixed wall-clock timeout, the most
/// common override callers reach for (spec §5).
pub fn options_with_timeout(timeout: Duration) -> EvaluationOptions {
    EvaluationOptions { timeout: Some(timeout), ..Default::default() }
}

pub fn options_with_variable(mut options: EvaluationOptions, name: &str, value: Collection) -> EvaluationOptions {
    options.variables.insert(name.to_string(), value);
    options
}

pub fn options_with_cancellation(mut options: EvaluationOptions, cancellation: Cancellation) -> EvaluationOptions {
    options.cancellation = Some(cancellation);
    options
}

pub fn options_with_resolver(
    mut options: EvaluationOptions,
    resolver: Arc<dyn ReferenceResolver>,
) -> EvaluationOptions {
    options.resolver = Some(resolver);
    options
}

pub fn options_with_terminology(
    mut options: EvaluationOptions,
    terminology: Arc<dyn TerminologyService>,
) -> EvaluationOptions {
    options.terminology = Some(terminology);
    options
}

pub fn options_with_validator(
    mut options: EvaluationOptions,
    validator: Arc<dyn ProfileValidator>,
) -> EvaluationOptions {
    options.validator = Some(validator);
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_evaluates_a_simple_path() {
        let expr = compile("Patient.name.given").unwrap();
        let resource = br#"{"resourceType":"Patient","name":[{"given":["Karen","Anne"]}]}"#;
        let strings = expr.to_strings(resource).unwrap();
        assert_eq!(strings, vec!["Karen", "Anne"]);
    }

    #[test]
    fn missing_path_is_empty_not_an_error() {
        let expr = compile("Patient.contact.name").unwrap();
        let resource = br#"{"resourceType":"Patient"}"#;
        assert!(!expr.exists(resource).unwrap());
    }

    #[test]
    fn where_filters_by_criteria() {
        let expr = compile("Patient.name.where(use = 'official').family").unwrap();
        let resource =
            br#"{"resourceType":"Patient","name":[{"use":"official","family":"Smith"},{"use":"old","family":"Jones"}]}"#;
        assert_eq!(expr.to_strings(resource).unwrap(), vec!["Smith"]);
    }
}
