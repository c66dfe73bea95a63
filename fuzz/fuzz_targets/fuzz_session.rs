#![no_main]

use libfuzzer_sys::fuzz_target;
use sml_node::{decode_messages, FieldTable};

fuzz_target!(|data: &[u8]| {
    // Slots only ever hold sentinels or finite extracted values
    for message in decode_messages(data, FieldTable::default_table()) {
        assert!(message.values.iter().all(|v| !v.is_nan()));
    }
});
