//! End-to-end scenarios (spec §8 S1-S6) and cross-cutting property checks
//! (P1-P11), exercised through the public `compile`/`evaluate` surface.

use fhirpath_eval::evaluator::{EvalError, EvalErrorKind, EvaluationOptions};
use fhirpath_eval::{Error, compile};

fn eval(expr: &str, resource: &str) -> Result<Vec<String>, Error> {
    let compiled = compile(expr).unwrap();
    compiled.to_strings(resource.as_bytes())
}

#[test]
fn s1_simple_path_navigation() {
    let resource = r#"{"resourceType":"Patient","name":[{"family":"Doe","given":["John"]}]}"#;
    assert_eq!(eval("Patient.name.family", resource).unwrap(), vec!["Doe"]);
}

#[test]
fn s2_where_with_no_matches_is_empty() {
    let resource = r#"{"resourceType":"Patient","name":[{"family":"Doe","given":["John"]}]}"#;
    let expr = compile("Patient.name.where(use = 'official').given").unwrap();
    assert!(!expr.exists(resource.as_bytes()).unwrap());
}

#[test]
fn s3_quantity_equivalence_across_ucum_units() {
    let resource = r#"{"resourceType":"Observation","valueQuantity":{"value":1000,"unit":"mg","system":"http://unitsofmeasure.org","code":"mg"}}"#;
    let expr = compile("Observation.valueQuantity ~ 1 'g'").unwrap();
    assert_eq!(expr.to_boolean(resource.as_bytes()).unwrap(), Some(true));
}

#[test]
fn s4_duplicate_full_urls_are_not_distinct() {
    let resource = r#"{"resourceType":"Bundle","entry":[
        {"fullUrl":"urn:uuid:1","resource":{"resourceType":"Patient","id":"1"}},
        {"fullUrl":"urn:uuid:1","resource":{"resourceType":"Patient","id":"2"}}
    ]}"#;
    let expr = compile("%resource.entry.where(fullUrl.exists()).select(fullUrl).isDistinct()").unwrap();
    assert_eq!(expr.to_boolean(resource.as_bytes()).unwrap(), Some(false));
}

#[test]
fn s5_partial_date_compares_against_today() {
    let resource = r#"{"resourceType":"Patient","birthDate":"1990-05-15"}"#;
    let expr = compile("Patient.birthDate < today()").unwrap();
    assert_eq!(expr.to_boolean(resource.as_bytes()).unwrap(), Some(true));
}

#[test]
fn s6_single_on_a_multi_element_collection_errors() {
    let resource = r#"{"resourceType":"Patient","name":[
        {"family":"Smith","given":["John"]},
        {"family":"Smith","given":["Jane"]}
    ]}"#;
    assert_eq!(eval("Patient.name.given", resource).unwrap(), vec!["John", "Jane"]);
    assert_eq!(eval("Patient.name.given.first()", resource).unwrap(), vec!["John"]);

    let expr = compile("Patient.name.single()").unwrap();
    let err = expr.evaluate(resource.as_bytes()).unwrap_err();
    match err {
        Error::Eval(EvalError { kind: EvalErrorKind::SingletonExpected(n), .. }) => assert_eq!(n, 2),
        other => panic!("expected SingletonExpected, got {other:?}"),
    }
}

// --- Property-style checks (P1-P11) ---

#[test]
fn p2_parenthesization_is_a_no_op() {
    let resource = r#"{"resourceType":"Patient","name":[{"family":"Doe"}]}"#;
    assert_eq!(
        eval("Patient.name.family", resource).unwrap(),
        eval("(Patient.name.family)", resource).unwrap()
    );
}

#[test]
fn p3_empty_propagates_through_arithmetic() {
    let resource = r#"{"resourceType":"Patient"}"#;
    let expr = compile("Patient.multipleBirthInteger + 1").unwrap();
    assert!(!expr.exists(resource.as_bytes()).unwrap());
}

#[test]
fn p4_repeated_evaluation_is_deterministic() {
    let resource = r#"{"resourceType":"Patient","name":[{"family":"Doe","given":["John","Jane"]}]}"#;
    let expr = compile("Patient.name.given").unwrap();
    let a = expr.to_strings(resource.as_bytes()).unwrap();
    let b = expr.to_strings(resource.as_bytes()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn p5_expression_evaluates_identically_across_threads() {
    use std::sync::Arc;
    let expr = Arc::new(compile("Patient.name.given").unwrap());
    let resource: &'static str = r#"{"resourceType":"Patient","name":[{"given":["A","B"]}]}"#;
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let expr = expr.clone();
            std::thread::spawn(move || expr.to_strings(resource.as_bytes()).unwrap())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), vec!["A", "B"]);
    }
}

#[test]
fn p6_three_valued_truth_tables() {
    let resource = r#"{"resourceType":"Patient"}"#;
    let cases: &[(&str, Option<bool>)] = &[
        ("true and true", Some(true)),
        ("true and false", Some(false)),
        ("false and {}", Some(false)),
        ("({} and true)", None),
        ("true or false", Some(true)),
        ("false or false", Some(false)),
        ("true or {}", Some(true)),
        ("({} or false)", None),
        ("true xor false", Some(true)),
        ("true xor true", Some(false)),
        ("true implies false", Some(false)),
        ("false implies false", Some(true)),
    ];
    for (expr_src, expected) in cases {
        let expr = compile(expr_src).unwrap();
        assert_eq!(expr.to_boolean(resource.as_bytes()).unwrap(), *expected, "expr: {expr_src}");
    }
}

#[test]
fn p7_arithmetic_identities() {
    let resource = r#"{"resourceType":"Patient"}"#;
    assert_eq!(compile("(-3).abs()").unwrap().to_strings(resource.as_bytes()).unwrap(), vec!["3"]);
    assert_eq!(compile("5 + 0").unwrap().to_strings(resource.as_bytes()).unwrap(), vec!["5"]);
    assert_eq!(compile("5 / 1").unwrap().to_strings(resource.as_bytes()).unwrap(), vec!["5"]);
    assert_eq!(compile("(7 div 2) * 2 + 7 mod 2").unwrap().to_strings(resource.as_bytes()).unwrap(), vec!["7"]);
}

#[test]
fn p8_string_concat_length_is_additive() {
    let resource = r#"{"resourceType":"Patient"}"#;
    let expr = compile("('abc' + 'de').length()").unwrap();
    assert_eq!(expr.to_strings(resource.as_bytes()).unwrap(), vec!["5"]);
}

#[test]
fn p9_distinct_count_never_exceeds_original() {
    let resource = r#"{"resourceType":"Patient","name":[{"family":"A"},{"family":"A"},{"family":"B"}]}"#;
    let total = compile("Patient.name.family.count()").unwrap().to_strings(resource.as_bytes()).unwrap();
    let distinct = compile("Patient.name.family.distinct().count()").unwrap().to_strings(resource.as_bytes()).unwrap();
    assert_eq!(total, vec!["3"]);
    assert_eq!(distinct, vec!["2"]);
    let is_distinct = compile("Patient.name.family.isDistinct()").unwrap().to_boolean(resource.as_bytes()).unwrap();
    assert_eq!(is_distinct, Some(false));
}

#[test]
fn p10_ucum_conversion_factor_holds_for_equality_and_equivalence() {
    let resource = r#"{"resourceType":"Patient"}"#;
    let expr = compile("1 'g' = 1000 'mg'").unwrap();
    assert_eq!(expr.to_boolean(resource.as_bytes()).unwrap(), Some(true));
    let expr = compile("1 'g' ~ 1000 'mg'").unwrap();
    assert_eq!(expr.to_boolean(resource.as_bytes()).unwrap(), Some(true));
}

#[test]
fn p12_int_div_and_mod_truncate_toward_zero() {
    let resource = r#"{"resourceType":"Patient"}"#;
    assert_eq!(eval("(-7) div 2", resource).unwrap(), vec!["-3"]);
    assert_eq!(eval("(-7) mod 2", resource).unwrap(), vec!["-1"]);
    assert_eq!(eval("7 div (-2)", resource).unwrap(), vec!["-3"]);
    assert_eq!(eval("7 mod (-2)", resource).unwrap(), vec!["1"]);
}

#[test]
fn p13_singleton_required_functions_propagate_empty_on_empty_input() {
    let resource = r#"{"resourceType":"Patient"}"#;
    assert_eq!(eval("Patient.nonexistent.length()", resource).unwrap(), Vec::<String>::new());
    assert_eq!(eval("Patient.nonexistent.abs()", resource).unwrap(), Vec::<String>::new());
    assert_eq!(eval("Patient.nonexistent.upper()", resource).unwrap(), Vec::<String>::new());
    assert_eq!(eval("Patient.nonexistent.sqrt()", resource).unwrap(), Vec::<String>::new());
    assert_eq!(eval("Patient.nonexistent.single()", resource).unwrap(), Vec::<String>::new());
}

#[test]
fn p11_depth_cap_terminates_runaway_repeat() {
    let resource = r#"{"resourceType":"Patient"}"#;
    let options = EvaluationOptions { max_depth: Some(5), ..Default::default() };
    let nested = "(1+".repeat(20) + "1" + &")".repeat(20);
    let expr = compile(&nested).unwrap();
    let err = expr.evaluate_with(resource.as_bytes(), &options).unwrap_err();
    match err {
        Error::Eval(EvalError { kind: EvalErrorKind::DepthExceeded, .. }) => {}
        other => panic!("expected DepthExceeded, got {other:?}"),
    }
}
