#![no_main]

use libfuzzer_sys::fuzz_target;
use sml_node::sml::decoder::SmlDecoder;

fuzz_target!(|data: &[u8]| {
    let mut decoder = SmlDecoder::new();
    for &byte in data {
        let state = decoder.feed(byte, |record| {
            for element in record.elements() {
                let _ = element.as_i128();
            }
        });
        if state.is_terminal() {
            assert!(!decoder.in_message());
        }
    }
});
