use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sml_node::sml::builder::{ListEntry, SmlFileBuilder, SmlValue};
use sml_node::sml::decoder::SmlDecoder;
use sml_node::{decode_messages, FieldTable, ObisCode};

fn meter_file() -> Vec<u8> {
    let obis = |s: &str| s.parse::<ObisCode>().unwrap();
    SmlFileBuilder::meter_reading(
        b"\x06EMH\x01\x02",
        Some(2_394_845),
        &[
            ListEntry::new(obis("129-129:199.130.3*255"), SmlValue::Bytes(b"EMH".to_vec())),
            ListEntry::watt_hours(obis("1-0:1.8.0*255"), 123_456_789, -1).with_status(0x0182),
            ListEntry::watt_hours(obis("1-0:1.8.1*255"), 123_456_789, -1),
            ListEntry::watt_hours(obis("1-0:1.8.2*255"), 0, -1),
            ListEntry::watts(obis("1-0:16.7.0*255"), 512, 0),
        ],
    )
}

fn benchmark_decoder(c: &mut Criterion) {
    let data = meter_file();
    let mut group = c.benchmark_group("decoder");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("feed_records", |b| {
        b.iter(|| {
            let mut decoder = SmlDecoder::new();
            let mut records = 0usize;
            for &byte in black_box(&data) {
                decoder.feed(byte, |_| records += 1);
            }
            black_box(records)
        })
    });

    group.bench_function("decode_messages", |b| {
        b.iter(|| black_box(decode_messages(black_box(&data), FieldTable::default_table())))
    });

    group.finish();
}

fn benchmark_builder(c: &mut Criterion) {
    c.bench_function("build_meter_file", |b| b.iter(|| black_box(meter_file())));
}

criterion_group!(benches, benchmark_decoder, benchmark_builder);
criterion_main!(benches);
