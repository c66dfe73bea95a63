//! # Field Extractor
//!
//! Matches closed SML list entries against a table of OBIS registers and
//! turns the matching entry into a scaled `f64`.
//!
//! An SML list entry is the 7-element record
//! `[objName, status, valTime, unit, scaler, value, valueSignature]`; the
//! value is `value × 10^scaler` in the given DLMS unit.
//!
//! ```rust
//! use sml_node::sml::extractor::FieldTable;
//!
//! let table = FieldTable::default_table();
//! assert_eq!(table.len(), 1);
//! assert_eq!(table.specs()[0].label, "Power T1");
//! ```

use crate::constants::{
    MAX_SLOTS, OBIS_ENERGY_IMPORT_T1, SML_ENTRY_OBJ_NAME, SML_ENTRY_SCALER, SML_ENTRY_UNIT,
    SML_ENTRY_VALUE, SML_UNIT_WATT, SML_UNIT_WATT_HOUR,
};
use crate::error::NodeError;
use crate::sml::decoder::{Element, Record};
use crate::sml::obis::ObisCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons an extraction routine rejects a matching record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("list entry has no value")]
    MissingValue,

    #[error("list entry value is not a number")]
    NotNumeric,

    #[error("unit mismatch: expected {expected}, found {found}")]
    UnitMismatch { expected: u8, found: u64 },
}

/// Extraction routine attached to a register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extraction {
    /// Energy register, unit Wh when present
    WattHours,
    /// Power register, unit W when present
    Watts,
    /// Any unit
    Scaled,
}

impl Extraction {
    fn expected_unit(self) -> Option<u8> {
        match self {
            Extraction::WattHours => Some(SML_UNIT_WATT_HOUR),
            Extraction::Watts => Some(SML_UNIT_WATT),
            Extraction::Scaled => None,
        }
    }

    /// Reads the scaled value of a list entry
    pub fn apply(self, record: &Record<'_>) -> Result<f64, ExtractError> {
        if let (Some(expected), Some(Element::Unsigned(found))) =
            (self.expected_unit(), record.element(SML_ENTRY_UNIT))
        {
            if found != expected as u64 {
                return Err(ExtractError::UnitMismatch { expected, found });
            }
        }

        let scaler = record
            .element(SML_ENTRY_SCALER)
            .and_then(|e| e.as_i128())
            .unwrap_or(0)
            .clamp(-128, 127) as i32;

        let raw = match record.element(SML_ENTRY_VALUE) {
            None => return Err(ExtractError::MissingValue),
            Some(e) if e.is_absent() => return Err(ExtractError::MissingValue),
            Some(e) => e.as_i128().ok_or(ExtractError::NotNumeric)?,
        };

        Ok(scale(raw, scaler))
    }
}

/// `raw × 10^scaler`; negative scalers divide so decimal readings stay exact
/// (`12345 × 10^-3 == 12.345`)
pub fn scale(raw: i128, scaler: i32) -> f64 {
    let raw = raw as f64;
    if scaler < 0 {
        raw / 10f64.powi(-scaler)
    } else {
        raw * 10f64.powi(scaler)
    }
}

/// One registered register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub obis: ObisCode,
    pub slot: usize,
    pub label: String,
    pub extraction: Extraction,
}

impl FieldSpec {
    pub fn new(obis: ObisCode, slot: usize, label: impl Into<String>, extraction: Extraction) -> Self {
        Self {
            obis,
            slot,
            label: label.into(),
            extraction,
        }
    }
}

/// Ordered register table; the first matching entry wins
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    specs: Vec<FieldSpec>,
}

impl FieldTable {
    pub fn new(specs: Vec<FieldSpec>) -> Result<Self, NodeError> {
        let mut table = Self::default();
        for spec in specs {
            table.register(spec)?;
        }
        Ok(table)
    }

    /// Tariff 1 import energy into slot 0
    pub fn default_table() -> Self {
        Self {
            specs: vec![FieldSpec::new(
                ObisCode::new(OBIS_ENERGY_IMPORT_T1),
                0,
                "Power T1",
                Extraction::WattHours,
            )],
        }
    }

    pub fn register(&mut self, spec: FieldSpec) -> Result<(), NodeError> {
        if spec.slot >= MAX_SLOTS {
            return Err(NodeError::ConfigError(format!(
                "slot {} of {} out of range (max {})",
                spec.slot,
                spec.obis,
                MAX_SLOTS - 1
            )));
        }
        self.specs.push(spec);
        Ok(())
    }

    pub fn specs(&self) -> &[FieldSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// First entry registered for `obj_name`
    pub fn lookup(&self, obj_name: &[u8]) -> Option<&FieldSpec> {
        self.specs.iter().find(|spec| spec.obis.matches(obj_name))
    }

    /// Runs the matching routine on a closed record.
    ///
    /// Returns the target slot and value; records without a registered
    /// `objName` and failing routines yield `None`, the latter with a warning.
    pub fn extract(&self, record: &Record<'_>) -> Option<(usize, f64)> {
        let Some(Element::OctetString(obj_name)) = record.element(SML_ENTRY_OBJ_NAME) else {
            return None;
        };
        let spec = self.lookup(obj_name)?;
        match spec.extraction.apply(record) {
            Ok(value) => {
                log::debug!("{} ({}) = {}", spec.label, spec.obis, value);
                Some((spec.slot, value))
            }
            Err(e) => {
                log::warn!("{} ({}): {}", spec.label, spec.obis, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_exact_decimals() {
        assert_eq!(scale(12345, -3), 12.345);
        assert_eq!(scale(-200, -1), -20.0);
        assert_eq!(scale(7, 2), 700.0);
        assert_eq!(scale(42, 0), 42.0);
    }

    #[test]
    fn test_register_rejects_out_of_range_slot() {
        let mut table = FieldTable::default();
        let spec = FieldSpec::new(
            ObisCode::new(OBIS_ENERGY_IMPORT_T1),
            MAX_SLOTS,
            "bad",
            Extraction::Scaled,
        );
        assert!(matches!(table.register(spec), Err(NodeError::ConfigError(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn test_lookup_first_registered_wins() {
        let obis = ObisCode::new(OBIS_ENERGY_IMPORT_T1);
        let table = FieldTable::new(vec![
            FieldSpec::new(obis, 1, "first", Extraction::Scaled),
            FieldSpec::new(obis, 2, "second", Extraction::Scaled),
        ])
        .unwrap();
        assert_eq!(table.lookup(obis.as_bytes()).unwrap().label, "first");
        assert!(table.lookup(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_extraction_serde_names() {
        let json = serde_json::to_string(&Extraction::WattHours).unwrap();
        assert_eq!(json, "\"watt_hours\"");
    }
}
