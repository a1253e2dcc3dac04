#![no_main]

use libfuzzer_sys::fuzz_target;

use simd_delimited::{BinaryReaderBuilder, ByteRecord};

fuzz_target!(|data: &[u8]| {
    let mut reader = BinaryReaderBuilder::with_capacity(7).from_reader(data).unwrap();
    let mut record = ByteRecord::new();

    // Arbitrary bytes may be malformed, but must never panic
    while let Ok(true) = reader.read_byte_record(&mut record) {}
});
