//! `children()`/`descendants()` (spec §4.9, §9 fixed-point note). `trace()`
//! with a projection argument is lazy and lives in the evaluator.

use std::collections::HashSet;

use super::FunctionRegistry;
use crate::model::{Collection, FhirPathValue};

pub fn register(r: &mut FunctionRegistry) {
    r.register("children", 0, 0, |fc| {
        let mut out = Vec::new();
        for v in fc.input.iter() {
            if let FhirPathValue::Object(obj) = v {
                out.extend(obj.children().into_vec());
            }
        }
        Ok(Collection::from_vec(out))
    });
    r.register("descendants", 0, 0, |fc| {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut worklist: Vec<FhirPathValue> = fc.input.as_slice().to_vec();
        while let Some(v) = worklist.pop() {
            if let FhirPathValue::Object(obj) = &v {
                if !visited.insert(obj.identity()) {
                    continue;
                }
                for child in obj.children().into_vec() {
                    out.push(child.clone());
                    worklist.push(child);
                }
            }
        }
        Ok(Collection::from_vec(out))
    });
}
