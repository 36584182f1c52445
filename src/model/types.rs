//! Type names and the `is`/`as`/`ofType` coercion table (spec §4.8).
//!
//! Grounded in the teacher's `registry/types.rs` `FhirPathType` enum: the
//! primitive names plus the FHIR primitive aliases and common complex types
//! that `Object::type_name()` can structurally infer.

use crate::model::value::FhirPathValue;

/// FHIR primitive type aliases that are structurally just `String`/`Integer`/etc
/// at the FHIRPath value level but are named distinctly in `is`/`as` checks.
const STRING_ALIASES: &[&str] = &[
    "code", "uri", "url", "canonical", "oid", "uuid", "id", "markdown", "base64Binary", "instant",
    "string",
];

/// True if `value`'s runtime type matches `type_name`, per spec §4.8
/// (`ofType`/`as`: FHIR type name match via structural inference for
/// Objects, literal primitive name match otherwise).
pub fn matches_type(value: &FhirPathValue, type_name: &str) -> bool {
    let simple = type_name.rsplit('.').next().unwrap_or(type_name);
    match value {
        FhirPathValue::Boolean(_) => simple == "Boolean",
        FhirPathValue::Integer(_) => simple == "Integer" || simple == "Long",
        FhirPathValue::Decimal(_) => simple == "Decimal",
        FhirPathValue::String(_) => simple == "String" || STRING_ALIASES.contains(&simple),
        FhirPathValue::Date(_) => simple == "Date",
        FhirPathValue::DateTime(_) => simple == "DateTime",
        FhirPathValue::Time(_) => simple == "Time",
        FhirPathValue::Quantity(_) => simple == "Quantity",
        FhirPathValue::Object(o) => {
            let actual = o.type_name();
            actual == simple || simple == "Object" || is_resource_supertype(&actual, simple)
        }
    }
}

/// A tiny slice of the FHIR resource hierarchy sufficient for `ofType` /
/// `is Resource` / `is DomainResource` checks; full profile-driven subtype
/// reasoning is out of scope (spec Non-goals: no independent validator).
fn is_resource_supertype(actual_type: &str, candidate: &str) -> bool {
    match candidate {
        "Resource" | "DomainResource" => {
            actual_type.chars().next().is_some_and(|c| c.is_uppercase())
                && !matches!(
                    actual_type,
                    "Coding"
                        | "CodeableConcept"
                        | "Reference"
                        | "Period"
                        | "Identifier"
                        | "Range"
                        | "Ratio"
                        | "Attachment"
                        | "HumanName"
                        | "Address"
                        | "ContactPoint"
                        | "Annotation"
                        | "Quantity"
                        | "Object"
                )
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_alias_matches() {
        assert!(matches_type(&FhirPathValue::String("x".into()), "code"));
    }

    #[test]
    fn integer_does_not_match_decimal() {
        assert!(!matches_type(&FhirPathValue::Integer(1), "Decimal"));
    }
}
