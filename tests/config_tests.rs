use sml_node::node::radio::SpreadingFactor;
use sml_node::{Extraction, NodeConfig, NodeError};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config_file() {
    let file = write_config(
        r#"{
            "serial_port": "/dev/ttyUSB0",
            "sleep_interval_ms": 60000,
            "payload_slot": 1,
            "fields": [
                { "obis": "1-0:1.8.1*255", "slot": 0, "label": "Power T1", "extraction": "watt_hours" },
                { "obis": "1-0:1.8.0*255", "slot": 1, "label": "Power Sum", "extraction": "watt_hours" },
                { "obis": "1-0:16.7.0*255", "slot": 2, "label": "Power", "extraction": "watts" }
            ],
            "radio": { "uplink_spreading_factor": "SF10", "confirmed": true, "port": 2 }
        }"#,
    );
    let config = NodeConfig::from_json_file(file.path()).unwrap();

    assert_eq!(config.serial_port.as_deref(), Some("/dev/ttyUSB0"));
    assert_eq!(config.sleep_interval(), Duration::from_secs(60));
    assert_eq!(config.payload_slot, 1);
    assert_eq!(config.radio.uplink_spreading_factor, SpreadingFactor::SF10);
    assert!(config.radio.confirmed);
    assert_eq!(config.radio.port, 2);
    // untouched radio fields keep their defaults
    assert_eq!(config.radio.rx2_spreading_factor, SpreadingFactor::SF9);

    let table = config.field_table().unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.specs()[2].extraction, Extraction::Watts);
    assert_eq!(table.lookup(&[1, 0, 1, 8, 0, 255]).unwrap().slot, 1);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = NodeConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, NodeError::Io(_)));
}

#[test]
fn test_malformed_json() {
    let file = write_config("{ \"sleep_interval_ms\": ");
    let err = NodeConfig::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, NodeError::Json(_)));
}

#[test]
fn test_invalid_obis_rejected() {
    let file = write_config(
        r#"{ "fields": [ { "obis": "1-0:1.8", "slot": 0, "label": "x", "extraction": "scaled" } ] }"#,
    );
    assert!(NodeConfig::from_json_file(file.path()).is_err());
}

#[test]
fn test_slot_out_of_range_rejected() {
    let file = write_config(
        r#"{ "fields": [ { "obis": "1-0:1.8.1*255", "slot": 4, "label": "x", "extraction": "scaled" } ] }"#,
    );
    let err = NodeConfig::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, NodeError::ConfigError(_)));
}

#[test]
fn test_payload_slot_out_of_range_rejected() {
    let err = NodeConfig::from_json_str(r#"{ "payload_slot": 7 }"#).unwrap_err();
    assert!(matches!(err, NodeError::ConfigError(_)));
}

#[test]
fn test_radio_port_zero_rejected() {
    let err = NodeConfig::from_json_str(r#"{ "radio": { "port": 0 } }"#).unwrap_err();
    assert!(matches!(err, NodeError::ConfigError(_)));
}

#[test]
fn test_serialized_config_loads_back() {
    let mut config = NodeConfig::default();
    config.sleep_interval_ms = 1234;
    config.drain_idle_gap_ms = 50;
    let file = write_config(&serde_json::to_string_pretty(&config).unwrap());
    assert_eq!(NodeConfig::from_json_file(file.path()).unwrap(), config);
}
