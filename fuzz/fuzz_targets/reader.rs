#![no_main]

use libfuzzer_sys::fuzz_target;

use simd_delimited::{ByteRecord, ReaderBuilder};

fuzz_target!(|data: &[u8]| {
    let mut expected = Vec::new();
    let mut record = ByteRecord::new();

    let mut reader = ReaderBuilder::new().from_reader(data).unwrap();

    while reader.read_byte_record(&mut record).unwrap() {
        expected.push(record.clone());
    }

    // Tiny buffers must not change anything
    let mut reader = ReaderBuilder::with_capacity(3).from_reader(data).unwrap();
    let mut records = Vec::new();

    while reader.read_byte_record(&mut record).unwrap() {
        records.push(record.clone());
    }

    assert_eq!(records, expected);
});
