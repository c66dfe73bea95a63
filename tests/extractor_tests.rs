//! Tests for the field extractor against decoded list entries.

use sml_node::constants::{
    OBIS_ENERGY_IMPORT_T1, OBIS_ENERGY_IMPORT_TOTAL, SML_ENTRY_LEN, SML_ENTRY_SIGNATURE,
    SML_ENTRY_STATUS, SML_ENTRY_VAL_TIME,
};
use sml_node::sml::builder::{ListEntry, SmlFileBuilder, SmlValue};
use sml_node::sml::decoder::{Element, SmlDecoder};
use sml_node::sml::extractor::{ExtractError, Extraction, FieldSpec, FieldTable};
use sml_node::sml::obis::ObisCode;
use sml_node::{decode_messages, DecoderState};

/// Runs `extraction` on the first decoded record carrying `entry.obis`
fn apply(entry: ListEntry, extraction: Extraction) -> Option<Result<f64, ExtractError>> {
    let obis = entry.obis;
    let file = SmlFileBuilder::new()
        .get_list_response(b"X", None, &[entry])
        .build();
    let mut decoder = SmlDecoder::new();
    let mut result = None;
    for byte in file {
        decoder.feed(byte, |record| {
            if record.leading_octets().is_some_and(|name| obis.matches(name)) {
                result = Some(extraction.apply(&record));
            }
        });
    }
    result
}

fn t1() -> ObisCode {
    ObisCode::new(OBIS_ENERGY_IMPORT_T1)
}

#[test]
fn test_list_entry_layout() {
    let entry = ListEntry::watt_hours(t1(), 12345, -3).with_status(0x0182);
    let file = SmlFileBuilder::new()
        .get_list_response(b"X", None, &[entry])
        .build();
    let mut decoder = SmlDecoder::new();
    let mut layout = None;
    for byte in file {
        decoder.feed(byte, |record| {
            if record.leading_octets().is_some_and(|name| t1().matches(name)) {
                let absent = |index| record.element(index) == Some(Element::OctetString(&[]));
                let status = match record.element(SML_ENTRY_STATUS) {
                    Some(Element::Unsigned(status)) => Some(status),
                    _ => None,
                };
                layout = Some((
                    record.len(),
                    status,
                    absent(SML_ENTRY_VAL_TIME),
                    absent(SML_ENTRY_SIGNATURE),
                ));
            }
        });
    }
    let (len, status, no_val_time, no_signature) = layout.unwrap();
    assert_eq!(len, SML_ENTRY_LEN);
    assert_eq!(status, Some(0x0182));
    assert!(no_val_time);
    assert!(no_signature);
}

#[test]
fn test_watt_hours_exact_decimal() {
    let result = apply(ListEntry::watt_hours(t1(), 12345, -3), Extraction::WattHours);
    assert_eq!(result, Some(Ok(12.345)));
}

#[test]
fn test_unit_mismatch() {
    let result = apply(ListEntry::watt_hours(t1(), 100, 0), Extraction::Watts);
    assert_eq!(
        result,
        Some(Err(ExtractError::UnitMismatch {
            expected: 27,
            found: 30
        }))
    );
}

#[test]
fn test_scaled_ignores_unit() {
    let entry = ListEntry::new(t1(), SmlValue::Unsigned(250))
        .with_unit(33)
        .with_scaler(-2);
    assert_eq!(apply(entry, Extraction::Scaled), Some(Ok(2.5)));
}

#[test]
fn test_missing_unit_and_scaler_defaults() {
    let entry = ListEntry::new(t1(), SmlValue::Integer(-42));
    assert_eq!(apply(entry, Extraction::WattHours), Some(Ok(-42.0)));
}

#[test]
fn test_non_numeric_value() {
    let entry = ListEntry::new(t1(), SmlValue::Bytes(b"1234".to_vec()));
    assert_eq!(apply(entry, Extraction::Scaled), Some(Err(ExtractError::NotNumeric)));
}

#[test]
fn test_absent_value() {
    let entry = ListEntry::new(t1(), SmlValue::Bytes(Vec::new()));
    assert_eq!(apply(entry, Extraction::Scaled), Some(Err(ExtractError::MissingValue)));
}

#[test]
fn test_failed_extraction_leaves_slot_untouched() {
    let table = FieldTable::new(vec![FieldSpec::new(t1(), 0, "Power T1", Extraction::Watts)]).unwrap();
    let file = SmlFileBuilder::meter_reading(b"X", None, &[ListEntry::watt_hours(t1(), 100, 0)]);
    let messages = decode_messages(&file, table);
    assert_eq!(messages[0].state, DecoderState::Complete);
    assert_eq!(messages[0].values[0], -3.0);
}

#[test]
fn test_several_registers_into_slots() {
    let total = ObisCode::new(OBIS_ENERGY_IMPORT_TOTAL);
    let power: ObisCode = "1-0:16.7.0*255".parse().unwrap();
    let table = FieldTable::new(vec![
        FieldSpec::new(t1(), 0, "Power T1", Extraction::WattHours),
        FieldSpec::new(total, 1, "Power Sum", Extraction::WattHours),
        FieldSpec::new(power, 2, "Power", Extraction::Watts),
    ])
    .unwrap();
    let file = SmlFileBuilder::meter_reading(
        b"X",
        Some(1),
        &[
            ListEntry::watt_hours(total, 50_000, -1),
            ListEntry::watt_hours(t1(), 30_000, -1),
            ListEntry::watts(power, 230, 0),
        ],
    );
    let messages = decode_messages(&file, table);
    assert_eq!(messages[0].values, [3000.0, 5000.0, 230.0, -3.0]);
}

#[test]
fn test_two_identifiers_share_a_slot() {
    let total = ObisCode::new(OBIS_ENERGY_IMPORT_TOTAL);
    let table = FieldTable::new(vec![
        FieldSpec::new(t1(), 0, "Power T1", Extraction::WattHours),
        FieldSpec::new(total, 0, "Power Sum", Extraction::WattHours),
    ])
    .unwrap();
    // later list entries overwrite the staged value
    let file = SmlFileBuilder::meter_reading(
        b"X",
        None,
        &[
            ListEntry::watt_hours(t1(), 1, 0),
            ListEntry::watt_hours(total, 2, 0),
        ],
    );
    let messages = decode_messages(&file, table);
    assert_eq!(messages[0].values[0], 2.0);
}

#[test]
fn test_unregistered_register_is_ignored() {
    let other: ObisCode = "1-0:2.8.0*255".parse().unwrap();
    let file = SmlFileBuilder::meter_reading(b"X", None, &[ListEntry::watt_hours(other, 9, 0)]);
    let messages = decode_messages(&file, FieldTable::default_table());
    assert_eq!(messages[0].values[0], -3.0);
}
