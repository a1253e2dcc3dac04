//! Binary delimited records.
//!
//! Records are separated by a record separator (RS) byte and fields by a
//! field separator (FS) byte. A field containing any of the control bytes is
//! byte-stuffed against the escape (ESC) byte and wrapped between two ESC
//! bytes:
//!
//! ```txt
//! stream := record*
//! record := field (FS field)* RS | RS
//! field  := raw-bytes | ESC stuffed-bytes ESC
//! ```
//!
//! A bare RS is a record with no fields, which is why a record made of a
//! single empty field must be written `ESC ESC RS`.
use std::io::{self, BufWriter, IntoInnerError, Read, Write};

use memchr::{memchr, memchr3};
use tokio::io::AsyncRead;

use crate::core::{ReadResult, Split};
use crate::error::{Error, Result};
use crate::records::{ByteRecord, Escape, FieldSpan, RecordView};
use crate::searcher::Searcher;
use crate::stream::{CancelToken, RecordStream, StreamConfig};
use crate::stuffing;

pub const DEFAULT_ESCAPE: u8 = 27;
pub const DEFAULT_FIELD_SEPARATOR: u8 = 31;
pub const DEFAULT_RECORD_SEPARATOR: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ControlBytes {
    escape: u8,
    field_separator: u8,
    record_separator: u8,
}

impl Default for ControlBytes {
    fn default() -> Self {
        Self {
            escape: DEFAULT_ESCAPE,
            field_separator: DEFAULT_FIELD_SEPARATOR,
            record_separator: DEFAULT_RECORD_SEPARATOR,
        }
    }
}

impl ControlBytes {
    fn validate(&self) -> Result<()> {
        if self.escape == self.field_separator
            || self.escape == self.record_separator
            || self.field_separator == self.record_separator
        {
            return Err(Error::invalid_config(
                "escape, field separator and record separator must all differ",
            ));
        }

        Ok(())
    }

    #[inline(always)]
    fn must_escape(&self, field: &[u8]) -> bool {
        memchr3(
            self.escape,
            self.field_separator,
            self.record_separator,
            field,
        )
        .is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Raw,
    Escaped,
    // Right after the closing ESC of a field
    Closed,
}

pub(crate) struct BinarySplitter {
    control: ControlBytes,
    state: ReadState,
    field_start: usize,
    record_was_read: bool,
    searcher: Searcher,
    // Unstuffed escaped fields of the current record
    decoded: Vec<u8>,
}

impl BinarySplitter {
    fn new(control: ControlBytes) -> Self {
        Self {
            control,
            state: ReadState::Raw,
            field_start: 0,
            record_was_read: true,
            searcher: Searcher::new(&[
                control.escape,
                control.field_separator,
                control.record_separator,
            ]),
            decoded: Vec::new(),
        }
    }

    #[inline]
    fn end_record(&mut self) {
        self.state = ReadState::Raw;
        self.field_start = 0;
        self.record_was_read = true;
    }
}

impl Split for BinarySplitter {
    fn split(
        &mut self,
        input: &[u8],
        offset: usize,
        spans: &mut Vec<FieldSpan>,
    ) -> (ReadResult, usize) {
        use ReadState::*;

        let ControlBytes {
            escape,
            field_separator,
            record_separator,
        } = self.control;

        if input.is_empty() {
            if self.record_was_read {
                return (ReadResult::End, 0);
            }

            match self.state {
                Raw => spans.push(FieldSpan::new(self.field_start, offset, Escape::None)),
                Escaped => {
                    return (
                        ReadResult::Malformed("stream ended inside an escaped field"),
                        0,
                    )
                }
                Closed => (),
            }

            // The last record was not followed by a record separator
            self.end_record();

            return (ReadResult::Record, 0);
        }

        self.record_was_read = false;

        let mut pos: usize = 0;

        while pos < input.len() {
            match self.state {
                Raw => {
                    if offset + pos == self.field_start && input[pos] == escape {
                        self.state = Escaped;
                        pos += 1;
                        continue;
                    }

                    let mut next_pos = input.len();

                    for index in self.searcher.search(&input[pos..]) {
                        let at = pos + index;
                        let byte = input[at];

                        if byte == field_separator {
                            spans.push(FieldSpan::new(self.field_start, offset + at, Escape::None));
                            self.field_start = offset + at + 1;

                            // Next field might be escaped
                            if input.get(at + 1) == Some(&escape) {
                                next_pos = at + 1;
                                break;
                            }

                            continue;
                        }

                        if byte == record_separator {
                            // A bare record separator is a record without fields
                            if offset + at > 0 {
                                spans.push(FieldSpan::new(
                                    self.field_start,
                                    offset + at,
                                    Escape::None,
                                ));
                            }

                            self.end_record();

                            return (ReadResult::Record, at + 1);
                        }

                        return (
                            ReadResult::Malformed("escape byte in the middle of a raw field"),
                            at,
                        );
                    }

                    pos = next_pos;
                }
                Escaped => match memchr(escape, &input[pos..]) {
                    Some(index) => {
                        let at = offset + pos + index;

                        spans.push(FieldSpan::new(self.field_start + 1, at, Escape::Decoded));

                        self.state = Closed;
                        pos += index + 1;
                    }
                    None => break,
                },
                Closed => {
                    let byte = input[pos];

                    if byte == field_separator {
                        self.field_start = offset + pos + 1;
                        self.state = Raw;
                        pos += 1;
                    } else if byte == record_separator {
                        self.end_record();

                        return (ReadResult::Record, pos + 1);
                    } else {
                        return (
                            ReadResult::Malformed("unexpected byte after an escaped field"),
                            pos,
                        );
                    }
                }
            }
        }

        (ReadResult::InputEmpty, input.len())
    }

    fn finish_record(&mut self, record: &[u8], spans: &mut Vec<FieldSpan>, pos: u64) -> Result<()> {
        self.decoded.clear();

        for span in spans.iter_mut() {
            if span.escape != Escape::Decoded {
                continue;
            }

            let start = self.decoded.len();

            stuffing::decode_at(
                &record[span.start..span.end],
                self.control.escape,
                &mut self.decoded,
                pos + span.start as u64,
            )?;

            span.start = start;
            span.end = self.decoded.len();
        }

        Ok(())
    }

    #[inline]
    fn decoded(&self) -> &[u8] {
        &self.decoded
    }
}

/// Builds a [`BinaryReader`] or an [`AsyncBinaryReader`] with given
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct BinaryReaderBuilder {
    control: ControlBytes,
    config: StreamConfig,
    cancel: Option<CancelToken>,
}

impl BinaryReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut reader = Self::default();
        reader.buffer_capacity(capacity);
        reader
    }

    /// Will default to `27` (ESC).
    pub fn escape(&mut self, escape: u8) -> &mut Self {
        self.control.escape = escape;
        self
    }

    /// Will default to `31` (US).
    pub fn field_separator(&mut self, separator: u8) -> &mut Self {
        self.control.field_separator = separator;
        self
    }

    /// Will default to `30` (RS).
    pub fn record_separator(&mut self, separator: u8) -> &mut Self {
        self.control.record_separator = separator;
        self
    }

    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut Self {
        self.config.buffer_capacity = capacity;
        self
    }

    pub fn max_record_len(&mut self, max_len: usize) -> &mut Self {
        self.config.max_record_len = max_len;
        self
    }

    pub fn cancel_token(&mut self, token: CancelToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    fn stream(&self) -> Result<RecordStream<BinarySplitter>> {
        self.control.validate()?;

        Ok(RecordStream::new(
            BinarySplitter::new(self.control),
            &self.config,
        ))
    }

    pub fn from_reader<R: Read>(&self, reader: R) -> Result<BinaryReader<R>> {
        Ok(BinaryReader {
            stream: self.stream()?,
            inner: reader,
        })
    }

    pub fn from_async_reader<R: AsyncRead + Unpin>(
        &self,
        reader: R,
    ) -> Result<AsyncBinaryReader<R>> {
        Ok(AsyncBinaryReader {
            stream: self.stream()?,
            inner: reader,
            cancel: self.cancel.clone(),
        })
    }
}

/// A streaming reader of binary delimited records.
///
/// Raw fields are borrowed from the reader's buffer while escaped ones are
/// unstuffed into a scratch buffer owned by the reader, so every field of a
/// [`RecordView`] is returned as [`Cow::Borrowed`](std::borrow::Cow).
pub struct BinaryReader<R> {
    stream: RecordStream<BinarySplitter>,
    inner: R,
}

impl<R: Read> BinaryReader<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            stream: RecordStream::new(
                BinarySplitter::new(ControlBytes::default()),
                &StreamConfig::default(),
            ),
            inner: reader,
        }
    }

    pub fn read_record(&mut self) -> Result<Option<RecordView<'_>>> {
        if !self.stream.next(&mut self.inner)? {
            return Ok(None);
        }

        Ok(Some(self.stream.record()))
    }

    pub fn read_byte_record(&mut self, record: &mut ByteRecord) -> Result<bool> {
        if !self.stream.next(&mut self.inner)? {
            record.clear();
            return Ok(false);
        }

        self.stream.record().read_into(record);

        Ok(true)
    }

    pub fn count_records(&mut self) -> Result<u64> {
        let mut count: u64 = 0;

        while self.stream.next(&mut self.inner)? {
            count += 1;
        }

        Ok(count)
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.stream.position()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// The non-blocking counterpart of [`BinaryReader`].
pub struct AsyncBinaryReader<R> {
    stream: RecordStream<BinarySplitter>,
    inner: R,
    cancel: Option<CancelToken>,
}

impl<R: AsyncRead + Unpin> AsyncBinaryReader<R> {
    pub async fn read_record(&mut self) -> Result<Option<RecordView<'_>>> {
        if !self
            .stream
            .next_async(&mut self.inner, self.cancel.as_ref())
            .await?
        {
            return Ok(None);
        }

        Ok(Some(self.stream.record()))
    }

    pub async fn read_byte_record(&mut self, record: &mut ByteRecord) -> Result<bool> {
        if !self
            .stream
            .next_async(&mut self.inner, self.cancel.as_ref())
            .await?
        {
            record.clear();
            return Ok(false);
        }

        self.stream.record().read_into(record);

        Ok(true)
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.stream.position()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Append the encoded version of a record to `out`, terminator included.
fn encode_fields<I, T>(control: &ControlBytes, fields: I, out: &mut Vec<u8>)
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let record_start = out.len();
    let mut count: usize = 0;

    for field in fields {
        let field = field.as_ref();

        if count > 0 {
            out.push(control.field_separator);
        }

        if control.must_escape(field) {
            out.push(control.escape);
            stuffing::encode(field, control.escape, out);
            out.push(control.escape);
        } else {
            out.extend_from_slice(field);
        }

        count += 1;
    }

    // A single empty field must not be mistaken for an empty record
    if count == 1 && out.len() == record_start {
        out.push(control.escape);
        out.push(control.escape);
    }

    out.push(control.record_separator);
}

/// Append the binary encoding of a record, using default control bytes, to
/// `out`.
pub fn encode_record<I, T>(fields: I, out: &mut Vec<u8>)
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    encode_fields(&ControlBytes::default(), fields, out)
}

/// Builds a [`BinaryWriter`] with given configuration.
#[derive(Debug, Clone)]
pub struct BinaryWriterBuilder {
    control: ControlBytes,
    buffer_capacity: usize,
}

impl Default for BinaryWriterBuilder {
    fn default() -> Self {
        Self {
            control: ControlBytes::default(),
            buffer_capacity: 8192,
        }
    }
}

impl BinaryWriterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut writer = Self::default();
        writer.buffer_capacity(capacity);
        writer
    }

    pub fn escape(&mut self, escape: u8) -> &mut Self {
        self.control.escape = escape;
        self
    }

    pub fn field_separator(&mut self, separator: u8) -> &mut Self {
        self.control.field_separator = separator;
        self
    }

    pub fn record_separator(&mut self, separator: u8) -> &mut Self {
        self.control.record_separator = separator;
        self
    }

    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn from_writer<W: Write>(&self, writer: W) -> Result<BinaryWriter<W>> {
        self.control.validate()?;

        Ok(BinaryWriter {
            control: self.control,
            buffer: BufWriter::with_capacity(self.buffer_capacity, writer),
            scratch: Vec::new(),
        })
    }
}

/// A writer of binary delimited records.
pub struct BinaryWriter<W: Write> {
    control: ControlBytes,
    buffer: BufWriter<W>,
    scratch: Vec<u8>,
}

impl<W: Write> BinaryWriter<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            control: ControlBytes::default(),
            buffer: BufWriter::new(writer),
            scratch: Vec::new(),
        }
    }

    pub fn write_record<I, T>(&mut self, fields: I) -> io::Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.scratch.clear();
        encode_fields(&self.control, fields, &mut self.scratch);
        self.buffer.write_all(&self.scratch)
    }

    #[inline]
    pub fn write_byte_record(&mut self, record: &ByteRecord) -> io::Result<()> {
        self.write_record(record.iter())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.buffer.flush()
    }

    pub fn into_inner(self) -> std::result::Result<W, IntoInnerError<BufWriter<W>>> {
        self.buffer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    use crate::error::ErrorKind;

    const CAPACITIES: [usize; 6] = [8192, 32, 4, 3, 2, 1];

    fn encode(records: &[ByteRecord]) -> Vec<u8> {
        let mut out = Vec::new();

        for record in records {
            encode_record(record.iter(), &mut out);
        }

        out
    }

    fn read_all(data: &[u8], capacity: usize) -> Result<Vec<ByteRecord>> {
        let mut reader = BinaryReaderBuilder::with_capacity(capacity).from_reader(Cursor::new(data))?;
        let mut records = Vec::new();
        let mut record = ByteRecord::new();

        while reader.read_byte_record(&mut record)? {
            records.push(record.clone());
        }

        Ok(records)
    }

    fn malformed_pos(result: Result<Vec<ByteRecord>>) -> Option<u64> {
        match result.map_err(Error::into_kind) {
            Err(ErrorKind::Malformed { pos, .. }) => Some(pos),
            _ => None,
        }
    }

    #[test]
    fn test_encode_record() {
        let mut out = Vec::new();

        encode_record(["a", "b"], &mut out);
        assert_eq!(out, b"a\x1fb\x1e");

        out.clear();
        encode_record(["a\x1fb"], &mut out);
        assert_eq!(out, [27, 4 ^ 27, b'a', 0x1f, b'b', 27, 0x1e]);

        out.clear();
        encode_record(Vec::<&[u8]>::new(), &mut out);
        assert_eq!(out, b"\x1e");

        out.clear();
        encode_record([""], &mut out);
        assert_eq!(out, b"\x1b\x1b\x1e");

        out.clear();
        encode_record(["", ""], &mut out);
        assert_eq!(out, b"\x1f\x1e");
    }

    #[test]
    fn test_escaped_field_roundtrip() -> Result<()> {
        let mut out = Vec::new();
        encode_record(["a\x1fb"], &mut out);

        // Two ESC bytes bounding the stuffed body
        assert_eq!(out[0], 27);
        assert_eq!(out[out.len() - 2], 27);
        assert_eq!(memchr(27, &out[1..out.len() - 2]), None);

        for capacity in CAPACITIES {
            assert_eq!(read_all(&out, capacity)?, vec![brec!["a\x1fb"]]);
        }

        Ok(())
    }

    #[test]
    fn test_reader() -> Result<()> {
        let records = vec![
            brec!["name", "bio"],
            brec!["john", "likes\x1ecats\x1f"],
            brec![],
            brec![""],
            brec!["", "\x1b", ""],
            brec!["x".repeat(600), "\x1b".repeat(300)],
        ];

        let data = encode(&records);

        for capacity in CAPACITIES {
            assert_eq!(read_all(&data, capacity)?, records, "capacity={}", capacity);
        }

        Ok(())
    }

    #[test]
    fn test_missing_last_separator() -> Result<()> {
        for capacity in CAPACITIES {
            assert_eq!(
                read_all(b"a\x1fb\x1ec\x1f\x1b\x18ab\x1b", capacity)?,
                vec![brec!["a", "b"], brec!["c", "ab"]]
            );
            assert_eq!(read_all(b"a\x1f", capacity)?, vec![brec!["a", ""]]);
            assert_eq!(read_all(b"", capacity)?, Vec::<ByteRecord>::new());
        }

        Ok(())
    }

    #[test]
    fn test_malformed() {
        for capacity in CAPACITIES {
            // Escape byte in the middle of a raw field
            assert_eq!(malformed_pos(read_all(b"a\x1eb\x1bc\x1e", capacity)), Some(3));

            // Garbage after a closing escape byte
            assert_eq!(
                malformed_pos(read_all(b"\x1b\x19a\x1bz\x1e", capacity)),
                Some(4)
            );

            // Unterminated escaped field
            assert_eq!(malformed_pos(read_all(b"a\x1e\x1b\x19a", capacity)), Some(5));

            // Truncated stuffing: code announces 4 bytes, only 1 follows
            assert_eq!(
                malformed_pos(read_all(b"a\x1e\x1b\x1ea\x1b\x1e", capacity)),
                Some(3)
            );
        }
    }

    #[test]
    fn test_terminal_after_malformed() -> Result<()> {
        let mut reader = BinaryReader::from_reader(Cursor::new(b"a\x1eb\x1bc\x1ed\x1e"));
        let mut record = ByteRecord::new();

        assert!(reader.read_byte_record(&mut record)?);
        assert!(reader.read_byte_record(&mut record).is_err());
        assert!(!reader.read_byte_record(&mut record)?);

        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        let result = BinaryReaderBuilder::new()
            .field_separator(b'\n')
            .record_separator(b'\n')
            .from_reader(Cursor::new(""));

        assert!(matches!(
            result.map_err(Error::into_kind),
            Err(ErrorKind::InvalidConfig { .. })
        ));

        assert!(BinaryWriterBuilder::new()
            .escape(b'\n')
            .record_separator(b'\n')
            .from_writer(Vec::new())
            .is_err());
    }

    #[test]
    fn test_writer() -> Result<()> {
        let mut writer = BinaryWriterBuilder::with_capacity(4)
            .field_separator(b',')
            .record_separator(b'\n')
            .escape(b'\\')
            .from_writer(Vec::new())?;

        writer.write_record(["a", "b"])?;
        writer.write_byte_record(&brec!["c,d", ""])?;
        writer.write_record([""])?;

        let data = writer.into_inner().map_err(|err| err.into_error())?;

        let mut stuffed = Vec::new();
        stuffing::encode(b"c,d", b'\\', &mut stuffed);

        let mut expected = b"a,b\n\\".to_vec();
        expected.extend_from_slice(&stuffed);
        expected.extend_from_slice(b"\\,\n\\\\\n");

        assert_eq!(data, expected);

        let records = BinaryReaderBuilder::new()
            .field_separator(b',')
            .record_separator(b'\n')
            .escape(b'\\')
            .from_reader(Cursor::new(data))?
            .count_records()?;

        assert_eq!(records, 3);

        Ok(())
    }

    #[tokio::test]
    async fn test_async_reader() -> Result<()> {
        let records = vec![brec!["a", "b\x1fc"], brec![""], brec!["d"]];
        let data = encode(&records);

        for capacity in CAPACITIES {
            let mut reader = BinaryReaderBuilder::with_capacity(capacity).from_async_reader(&data[..])?;

            let mut read = Vec::new();
            let mut record = ByteRecord::new();

            while reader.read_byte_record(&mut record).await? {
                read.push(record.clone());
            }

            assert_eq!(read, records);
            assert_eq!(reader.position(), data.len() as u64);
        }

        Ok(())
    }
}
