//! Quantity: an arbitrary-precision decimal paired with a UCUM unit (spec §3, §4.4).
//!
//! Normalization is delegated to `octofhir-ucum`, treated as a black-box
//! `normalize(value, unit) -> (canonical_value, canonical_unit)` service per
//! spec §1's external-collaborator boundary.

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: Decimal,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: Decimal, unit: impl Into<String>) -> Self {
        Self { value, unit: unit.into() }
    }

    /// Normalizes through UCUM; returns `None` if the unit isn't recognized
    /// or isn't a UCUM unit at all (e.g. FHIR calendar-duration words like
    /// `'year'`, which compare only to like-valued quantities, not via UCUM).
    fn canonical(&self) -> Option<(f64, octofhir_ucum::Dimension)> {
        let v = self.value.to_f64()?;
        let analysis = octofhir_ucum::analyse(&self.unit).ok()?;
        Some((v * analysis.factor, analysis.dimension))
    }

    /// Compares two quantities after UCUM normalization. `None` means
    /// incompatible dimensions (spec: comparison yields empty).
    pub fn compare(&self, other: &Quantity) -> Option<Ordering> {
        if self.unit == other.unit {
            return self.value.partial_cmp(&other.value);
        }
        let (av, adim) = self.canonical()?;
        let (bv, bdim) = other.canonical()?;
        if adim != bdim {
            return None;
        }
        // UCUM factors are floating point; tolerate the rounding noise that
        // conversion introduces rather than reporting quantities that are
        // equal to UCUM as merely close.
        if (av - bv).abs() <= (av.abs().max(bv.abs())) * 1e-9 {
            return Some(Ordering::Equal);
        }
        av.partial_cmp(&bv)
    }

    /// Equivalence (`~`): UCUM-canonicalized numeric equality.
    pub fn equivalent(&self, other: &Quantity) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    pub fn add(&self, other: &Quantity) -> Option<Quantity> {
        if self.unit == other.unit {
            return Some(Quantity::new(self.value + other.value, self.unit.clone()));
        }
        let (_, adim) = self.canonical()?;
        let (_, bdim) = other.canonical()?;
        if adim != bdim {
            return None;
        }
        // Convert other into self's unit via the ratio of canonical factors.
        let a_analysis = octofhir_ucum::analyse(&self.unit).ok()?;
        let b_analysis = octofhir_ucum::analyse(&other.unit).ok()?;
        let factor = b_analysis.factor / a_analysis.factor;
        let converted = other.value.to_f64()? * factor;
        let converted = Decimal::try_from(converted).ok()?;
        Some(Quantity::new(self.value + converted, self.unit.clone()))
    }

    pub fn scale(&self, factor: Decimal) -> Quantity {
        Quantity::new(self.value * factor, self.unit.clone())
    }

    pub fn div_scalar(&self, divisor: Decimal) -> Option<Quantity> {
        if divisor.is_zero() {
            return None;
        }
        Some(Quantity::new(self.value / divisor, self.unit.clone()))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.value, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn same_unit_compares_by_value() {
        let a = Quantity::new(Decimal::from_str("1.0").unwrap(), "mg");
        let b = Quantity::new(Decimal::from_str("2.0").unwrap(), "mg");
        assert_eq!(a.compare(&b), Some(Ordering::Less));
    }

    #[test]
    fn mg_and_g_are_equivalent_when_converted() {
        let mg = Quantity::new(Decimal::from_str("1000").unwrap(), "mg");
        let g = Quantity::new(Decimal::from_str("1").unwrap(), "g");
        assert!(mg.equivalent(&g));
    }

    #[test]
    fn incompatible_dimensions_are_incomparable() {
        let mg = Quantity::new(Decimal::from_str("1").unwrap(), "mg");
        let s = Quantity::new(Decimal::from_str("1").unwrap(), "s");
        assert_eq!(mg.compare(&s), None);
    }
}
