#![no_main]

use libfuzzer_sys::fuzz_target;

use simd_delimited::{encode_record, BinaryReader, ByteRecord, ReaderBuilder, WriterBuilder};

fuzz_target!(|data: &[u8]| {
    let fields = data.split(|byte| *byte == 0).collect::<Vec<_>>();
    let record = fields.iter().collect::<ByteRecord>();

    let mut writer = WriterBuilder::new().from_writer(Vec::new()).unwrap();
    writer.write_byte_record(&record).unwrap();
    let csv = writer.into_inner().unwrap();

    let mut reader = ReaderBuilder::new().trim_bom(false).from_reader(&csv[..]).unwrap();
    let mut read = ByteRecord::new();

    assert!(reader.read_byte_record(&mut read).unwrap());
    assert_eq!(read, record);

    let mut binary = Vec::new();
    encode_record(&fields, &mut binary);

    let mut reader = BinaryReader::from_reader(&binary[..]);

    assert!(reader.read_byte_record(&mut read).unwrap());
    assert_eq!(read, record);
});
