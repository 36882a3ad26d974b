//! Unit standardization for the covered physical variables.
//!
//! Every variable with a registered rule is normalized to one canonical unit
//! before any temporal reduction:
//!
//! | rule family   | variables                          | canonical unit |
//! |---------------|------------------------------------|----------------|
//! | precipitation | `pr`                               | `mm/day`       |
//! | temperature   | `tas`, `tasmax`, `tasmin`, `tos`   | `degC`         |
//! | pressure      | `psl`                              | `pa`           |
//! | radiation     | `rsds`, `rsus`, `rlds`, `rlus`, `rnet` | `W m**-2`  |
//!
//! A unit that is neither canonical nor a convertible alias is a hard
//! [`UnsupportedUnit`](crate::errors::DiagnosticError::UnsupportedUnit)
//! failure: silently passing through a wrong unit corrupts every number
//! downstream. Missing unit metadata and unregistered variables, by
//! contrast, are logged and passed through, since both occur legitimately
//! for derived inputs.

use crate::errors::{DiagResult, DiagnosticError};
use crate::field::Field;

/// Closed set of unit-rule families, keyed by canonical variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRule {
    Precipitation,
    Temperature,
    Pressure,
    Radiation,
}

/// How a recognized source unit maps onto the canonical unit.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Conversion {
    /// Already canonical.
    Identity,
    /// Numerically identical, only the unit string changes.
    Relabel,
    Scale(f64),
    Offset(f64),
}

impl UnitRule {
    /// Look up the rule for a canonical variable name.
    pub fn for_variable(varn: &str) -> Option<Self> {
        match varn {
            "pr" => Some(UnitRule::Precipitation),
            "tas" | "tasmax" | "tasmin" | "tos" => Some(UnitRule::Temperature),
            "psl" => Some(UnitRule::Pressure),
            "rsds" | "rsus" | "rlds" | "rlus" | "rnet" => Some(UnitRule::Radiation),
            _ => None,
        }
    }

    /// The unit every covered variable is normalized to.
    pub fn canonical_unit(&self) -> &'static str {
        match self {
            UnitRule::Precipitation => "mm/day",
            UnitRule::Temperature => "degC",
            UnitRule::Pressure => "pa",
            UnitRule::Radiation => "W m**-2",
        }
    }

    /// The conversion for a declared source unit, or `None` if the unit is
    /// not covered by this rule.
    fn conversion_for(&self, unit: &str) -> Option<Conversion> {
        match self {
            UnitRule::Precipitation => match unit {
                "mm/day" => Some(Conversion::Identity),
                // flux mass rate to depth per day
                "kg m-2 s-1" => Some(Conversion::Scale(24.0 * 60.0 * 60.0)),
                // E-OBS ships daily sums labelled as bare millimetres
                "mm" => Some(Conversion::Relabel),
                _ => None,
            },
            UnitRule::Temperature => match unit {
                "degC" => Some(Conversion::Identity),
                "K" => Some(Conversion::Offset(-273.15)),
                _ => {
                    // spelling variants from the udunits database
                    const ALIASES: [&str; 6] = [
                        "degc",
                        "deg_c",
                        "celsius",
                        "degreec",
                        "degree_c",
                        "degree_celsius",
                    ];
                    ALIASES
                        .contains(&unit.to_lowercase().as_str())
                        .then_some(Conversion::Relabel)
                }
            },
            UnitRule::Pressure => match unit.to_lowercase().as_str() {
                "pa" => Some(if unit == "pa" {
                    Conversion::Identity
                } else {
                    Conversion::Relabel
                }),
                "hpa" => Some(Conversion::Scale(100.0)),
                _ => None,
            },
            UnitRule::Radiation => match unit {
                "W m**-2" => Some(Conversion::Identity),
                "W m-2" => Some(Conversion::Relabel),
                _ => None,
            },
        }
    }
}

/// Outcome of [`standardize_units`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    /// Unit already canonical; nothing changed.
    Canonical,
    /// Values converted and unit string replaced.
    Converted { from: String },
    /// Unit string replaced, values untouched.
    Relabelled { from: String },
    /// No declared unit; field passed through unchanged (non-fatal).
    MissingUnits,
    /// No rule registered for this variable; passed through unchanged.
    Unregistered,
}

/// Convert a field's values to the variable's canonical unit in place.
///
/// Fails with [`DiagnosticError::UnsupportedUnit`] when the declared unit is
/// neither canonical nor a known alias. A field without unit metadata, or a
/// variable without a registered rule, is logged and passed through; callers
/// must treat those statuses as a degraded pass, not an error.
pub fn standardize_units(field: &mut Field, varn: &str) -> DiagResult<UnitStatus> {
    let unit = match field.meta.units.clone() {
        Some(unit) => unit,
        None => {
            log::warn!("units attribute not found for {}", varn);
            return Ok(UnitStatus::MissingUnits);
        }
    };

    let rule = match UnitRule::for_variable(varn) {
        Some(rule) => rule,
        None => {
            log::warn!("Variable {} not covered in standardize_units", varn);
            return Ok(UnitStatus::Unregistered);
        }
    };

    let conversion = rule
        .conversion_for(&unit)
        .ok_or_else(|| DiagnosticError::UnsupportedUnit {
            unit: unit.clone(),
            variable: varn.to_string(),
        })?;

    let canonical = rule.canonical_unit().to_string();
    let status = match conversion {
        Conversion::Identity => UnitStatus::Canonical,
        Conversion::Relabel => {
            field.meta.units = Some(canonical);
            UnitStatus::Relabelled { from: unit }
        }
        Conversion::Scale(factor) => {
            field.values.mapv_inplace(|v| v * factor);
            field.meta.units = Some(canonical);
            UnitStatus::Converted { from: unit }
        }
        Conversion::Offset(offset) => {
            field.values.mapv_inplace(|v| v + offset);
            field.meta.units = Some(canonical);
            UnitStatus::Converted { from: unit }
        }
    };
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata;
    use is_close::is_close;

    fn field_with_unit(value: f64, unit: Option<&str>) -> Field {
        let mut field = testdata::uniform_field(value, testdata::monthly_time_axis(2000, 1));
        field.meta.units = unit.map(str::to_string);
        field
    }

    #[test]
    fn precipitation_flux_to_mm_per_day() {
        let mut field = field_with_unit(1.0 / 86400.0, Some("kg m-2 s-1"));
        let status = standardize_units(&mut field, "pr").unwrap();
        assert!(matches!(status, UnitStatus::Converted { .. }));
        assert_eq!(field.meta.units.as_deref(), Some("mm/day"));
        assert!(is_close!(field.values[[0, 0, 0]], 1.0));
    }

    #[test]
    fn eobs_millimetres_are_relabelled_only() {
        let mut field = field_with_unit(3.5, Some("mm"));
        let status = standardize_units(&mut field, "pr").unwrap();
        assert!(matches!(status, UnitStatus::Relabelled { .. }));
        assert_eq!(field.meta.units.as_deref(), Some("mm/day"));
        assert_eq!(field.values[[0, 0, 0]], 3.5);
    }

    #[test]
    fn kelvin_to_celsius() {
        let mut field = field_with_unit(300.0, Some("K"));
        standardize_units(&mut field, "tas").unwrap();
        assert_eq!(field.meta.units.as_deref(), Some("degC"));
        assert!(is_close!(field.values[[0, 5, 5]], 26.85));
    }

    #[test]
    fn celsius_spellings_accepted() {
        for alias in ["degC", "Celsius", "degree_C", "deg_c"] {
            let mut field = field_with_unit(10.0, Some(alias));
            standardize_units(&mut field, "tas").unwrap();
            assert_eq!(field.meta.units.as_deref(), Some("degC"), "alias {}", alias);
            assert_eq!(field.values[[0, 0, 0]], 10.0);
        }
    }

    #[test]
    fn hectopascal_to_pascal() {
        let mut field = field_with_unit(1013.25, Some("hPa"));
        let status = standardize_units(&mut field, "psl").unwrap();
        assert!(matches!(status, UnitStatus::Converted { .. }));
        assert_eq!(field.meta.units.as_deref(), Some("pa"));
        assert!(is_close!(field.values[[0, 0, 0]], 101325.0));
    }

    #[test]
    fn pascal_spelling_normalized() {
        let mut field = field_with_unit(101325.0, Some("Pa"));
        let status = standardize_units(&mut field, "psl").unwrap();
        assert!(matches!(status, UnitStatus::Relabelled { .. }));
        assert_eq!(field.meta.units.as_deref(), Some("pa"));
    }

    #[test]
    fn radiation_alias_relabelled() {
        let mut field = field_with_unit(240.0, Some("W m-2"));
        standardize_units(&mut field, "rsds").unwrap();
        assert_eq!(field.meta.units.as_deref(), Some("W m**-2"));
        assert_eq!(field.values[[0, 0, 0]], 240.0);
    }

    #[test]
    fn unknown_unit_is_a_hard_failure() {
        let mut field = field_with_unit(1.0, Some("furlong"));
        let err = standardize_units(&mut field, "tas").unwrap_err();
        match err {
            DiagnosticError::UnsupportedUnit { unit, variable } => {
                assert_eq!(unit, "furlong");
                assert_eq!(variable, "tas");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn missing_units_pass_through() {
        let mut field = field_with_unit(1.0, None);
        let status = standardize_units(&mut field, "tas").unwrap();
        assert_eq!(status, UnitStatus::MissingUnits);
        assert_eq!(field.values[[0, 0, 0]], 1.0);
        assert!(field.meta.units.is_none());
    }

    #[test]
    fn unregistered_variable_passes_through() {
        let mut field = field_with_unit(5.0, Some("kg"));
        let status = standardize_units(&mut field, "mrso").unwrap();
        assert_eq!(status, UnitStatus::Unregistered);
        assert_eq!(field.meta.units.as_deref(), Some("kg"));
    }

    #[test]
    fn alias_and_canonical_inputs_agree() {
        // Round-trip property: converting from an alias must land on the
        // same numbers as canonical-unit input.
        let mut kelvin = field_with_unit(288.15, Some("K"));
        let mut celsius = field_with_unit(15.0, Some("degC"));
        standardize_units(&mut kelvin, "tas").unwrap();
        standardize_units(&mut celsius, "tas").unwrap();
        for (a, b) in kelvin.values.iter().zip(celsius.values.iter()) {
            assert!(is_close!(*a, *b));
        }
    }

    #[test]
    fn nan_cells_stay_nan_through_conversion() {
        let mut field = field_with_unit(300.0, Some("K"));
        field.values[[0, 0, 0]] = f64::NAN;
        standardize_units(&mut field, "tas").unwrap();
        assert!(field.values[[0, 0, 0]].is_nan());
        assert!(is_close!(field.values[[0, 0, 1]], 26.85));
    }
}
