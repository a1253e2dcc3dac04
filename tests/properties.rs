use std::io::{self, Cursor, Read};

use quickcheck::{QuickCheck, TestResult};
use quickcheck_macros::quickcheck;
use simd_delimited::{
    BinaryReaderBuilder, BinaryWriter, ByteRecord, ErrorKind, ReaderBuilder, Result, Searcher,
    SimdLevel, Writer,
};

const CAPACITIES: [usize; 6] = [8192, 32, 4, 3, 2, 1];

/// A source never returning more than `chunk_size` bytes per read.
struct Chunked<'a> {
    data: &'a [u8],
    chunk_size: usize,
}

impl Read for Chunked<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let amount = self.chunk_size.min(buf.len()).min(self.data.len());

        buf[..amount].copy_from_slice(&self.data[..amount]);
        self.data = &self.data[amount..];

        Ok(amount)
    }
}

fn to_records(fields: &[Vec<Vec<u8>>]) -> Vec<ByteRecord> {
    fields.iter().map(ByteRecord::from).collect()
}

fn read_csv<R: Read>(reader: R, capacity: usize) -> Result<Vec<ByteRecord>> {
    ReaderBuilder::with_capacity(capacity)
        .trim_bom(false)
        .from_reader(reader)?
        .into_byte_records()
        .collect()
}

fn read_binary<R: Read>(reader: R, capacity: usize) -> Result<Vec<ByteRecord>> {
    let mut reader = BinaryReaderBuilder::with_capacity(capacity).from_reader(reader)?;
    let mut records = Vec::new();
    let mut record = ByteRecord::new();

    while reader.read_byte_record(&mut record)? {
        records.push(record.clone());
    }

    Ok(records)
}

#[quickcheck]
fn binary_roundtrip(fields: Vec<Vec<Vec<u8>>>, chunk_size: u8) -> bool {
    let records = to_records(&fields);

    let mut writer = BinaryWriter::from_writer(Vec::new());

    for record in records.iter() {
        writer.write_byte_record(record).unwrap();
    }

    let data = writer.into_inner().unwrap();
    let chunk_size = chunk_size as usize + 1;

    [8192, 3, 1].into_iter().all(|capacity| {
        let source = Chunked {
            data: &data,
            chunk_size,
        };

        read_binary(source, capacity).unwrap() == records
    })
}

#[quickcheck]
fn csv_roundtrip(fields: Vec<Vec<Vec<u8>>>, chunk_size: u8) -> bool {
    let records = to_records(&fields);

    let mut writer = Writer::from_writer(Vec::new());

    for record in records.iter() {
        writer.write_byte_record(record).unwrap();
    }

    let data = writer.into_inner().unwrap();
    let chunk_size = chunk_size as usize + 1;

    [8192, 3, 1].into_iter().all(|capacity| {
        let source = Chunked {
            data: &data,
            chunk_size,
        };

        read_csv(source, capacity).unwrap() == records
    })
}

#[test]
fn csv_capacity_invariance() {
    fn prop(data: Vec<u8>) -> bool {
        let expected = read_csv(Cursor::new(&data), 8192).unwrap();

        CAPACITIES
            .into_iter()
            .all(|capacity| read_csv(Cursor::new(&data), capacity).unwrap() == expected)
    }

    QuickCheck::new()
        .tests(500)
        .quickcheck(prop as fn(Vec<u8>) -> bool);
}

#[test]
fn async_matches_sync() {
    fn prop(data: Vec<u8>, capacity: u8) -> bool {
        let capacity = capacity as usize + 1;
        let expected = read_csv(Cursor::new(&data), capacity).unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let records = runtime.block_on(async {
            let mut reader = ReaderBuilder::with_capacity(capacity)
                .trim_bom(false)
                .from_async_reader(&data[..])
                .unwrap();

            let mut records = Vec::new();
            let mut record = ByteRecord::new();

            while reader.read_byte_record(&mut record).await.unwrap() {
                records.push(record.clone());
            }

            records
        });

        records == expected
    }

    QuickCheck::new().quickcheck(prop as fn(Vec<u8>, u8) -> bool);
}

#[quickcheck]
fn search_matches_count(haystack: Vec<u8>, needles: Vec<u8>) -> TestResult {
    if needles.is_empty() || needles.len() > 4 {
        return TestResult::discard();
    }

    let expected = haystack
        .iter()
        .enumerate()
        .filter(|(_, byte)| needles.contains(*byte))
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    for level in SimdLevel::ALL {
        let searcher = Searcher::with_level(&needles[..], level);

        if searcher.search(&haystack).collect::<Vec<_>>() != expected {
            return TestResult::failed();
        }

        if searcher.count(&haystack) != expected.len() {
            return TestResult::failed();
        }
    }

    TestResult::passed()
}

#[quickcheck]
fn search_u16_matches_count(haystack: Vec<u16>, needle: u16) -> bool {
    let expected = haystack.iter().filter(|unit| **unit == needle).count();

    SimdLevel::ALL.into_iter().all(|level| {
        let searcher = Searcher::with_level(&[needle, 0x2028], level);
        let naive = haystack
            .iter()
            .filter(|unit| **unit == needle || **unit == 0x2028)
            .count();

        searcher.search(&haystack).count() == naive
            && searcher.count(&haystack) == naive
            && naive >= expected
    })
}

#[test]
fn embedded_delimiters_and_trailing_fields() -> Result<()> {
    let cases: Vec<(&str, Vec<ByteRecord>)> = vec![
        (
            "A,B\nC,D\n",
            vec![ByteRecord::from(["A", "B"]), ByteRecord::from(["C", "D"])],
        ),
        ("\"A,B\",C", vec![ByteRecord::from(["A,B", "C"])]),
        ("A\"\"B,C", vec![ByteRecord::from(["A\"B", "C"])]),
        ("", vec![]),
        (",", vec![ByteRecord::from(["", ""])]),
        ("a,", vec![ByteRecord::from(["a", ""])]),
    ];

    for (data, expected) in cases {
        for capacity in CAPACITIES {
            assert_eq!(read_csv(Cursor::new(data), capacity)?, expected);
        }
    }

    Ok(())
}

#[test]
fn quote_parity() -> Result<()> {
    for k in 0..8 {
        let data = format!("\"{}\"", "\"\"".repeat(k));
        let records = read_csv(Cursor::new(data), 2)?;

        assert_eq!(records, vec![ByteRecord::from(["\"".repeat(k)])]);
    }

    // Unterminated quote
    let records = read_csv(Cursor::new("a,\"b\"\"c"), 3)?;
    assert_eq!(records, vec![ByteRecord::from(["a", "b\"c"])]);

    Ok(())
}

#[test]
fn binary_escaped_field() -> Result<()> {
    let mut writer = BinaryWriter::from_writer(Vec::new());
    writer.write_record(["x\x1fy"])?;

    let data = writer.into_inner().map_err(|err| err.into_error())?;

    assert_eq!(data[0], 27);
    assert_eq!(data[data.len() - 2], 27);
    assert_eq!(data.iter().filter(|byte| **byte == 27).count(), 2);

    assert_eq!(read_binary(Cursor::new(data), 1)?, vec![ByteRecord::from(["x\x1fy"])]);

    Ok(())
}

#[test]
fn record_too_long() -> Result<()> {
    for capacity in CAPACITIES {
        let mut reader = ReaderBuilder::with_capacity(capacity)
            .max_record_len(8)
            .from_reader(Cursor::new("0123456789abcdef\nok\n"))?;

        let err = reader.read_record().unwrap_err();

        assert!(matches!(
            err.kind(),
            ErrorKind::RecordTooLong { max_len: 8, pos: 0 }
        ));
        assert!(reader.read_record()?.is_none());
    }

    Ok(())
}
