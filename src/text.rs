use std::io::Read;
use std::str;

use tokio::io::AsyncRead;

use crate::core::{ReadResult, Split};
use crate::error::{Error, Result};
use crate::records::{Escape, FieldSpan, TextRecord};
use crate::searcher::Searcher;
use crate::stream::{CancelToken, RecordStream, StreamConfig};

/// Splitter of delimited text without any quoting: every field delimiter
/// separates fields and every record delimiter ends a record.
pub(crate) struct TextSplitter {
    field_delimiter: u8,
    record_delimiter: u8,
    field_start: usize,
    record_was_read: bool,
    searcher: Searcher,
}

impl TextSplitter {
    pub(crate) fn new(field_delimiter: u8, record_delimiter: u8) -> Self {
        Self {
            field_delimiter,
            record_delimiter,
            field_start: 0,
            record_was_read: true,
            searcher: Searcher::new(&[field_delimiter, record_delimiter]),
        }
    }
}

impl Split for TextSplitter {
    fn split(
        &mut self,
        input: &[u8],
        offset: usize,
        spans: &mut Vec<FieldSpan>,
    ) -> (ReadResult, usize) {
        if input.is_empty() {
            if !self.record_was_read {
                spans.push(FieldSpan::new(self.field_start, offset, Escape::None));

                self.field_start = 0;
                self.record_was_read = true;

                return (ReadResult::Record, 0);
            }

            return (ReadResult::End, 0);
        }

        self.record_was_read = false;

        for index in self.searcher.search(input) {
            let at = offset + index;

            if input[index] == self.field_delimiter {
                spans.push(FieldSpan::new(self.field_start, at, Escape::None));
                self.field_start = at + 1;
                continue;
            }

            // An empty line has no fields
            if at > 0 {
                spans.push(FieldSpan::new(self.field_start, at, Escape::None));
            }

            self.field_start = 0;
            self.record_was_read = true;

            return (ReadResult::Record, index + 1);
        }

        (ReadResult::InputEmpty, input.len())
    }

    fn finish_record(&mut self, record: &[u8], spans: &mut Vec<FieldSpan>, _pos: u64) -> Result<()> {
        if self.record_delimiter != b'\n' {
            return Ok(());
        }

        let count = spans.len();

        if let Some(last) = spans.last_mut() {
            if last.end > last.start && record[last.end - 1] == b'\r' {
                last.end -= 1;

                // A CRLF line is as empty as a LF one
                if count == 1 && last.end == 0 {
                    spans.clear();
                }
            }
        }

        Ok(())
    }
}

/// Builds a [`TextReader`] or an [`AsyncTextReader`] with given
/// configuration.
#[derive(Debug, Clone)]
pub struct TextReaderBuilder {
    field_delimiter: u8,
    record_delimiter: u8,
    config: StreamConfig,
    cancel: Option<CancelToken>,
}

impl Default for TextReaderBuilder {
    fn default() -> Self {
        Self {
            field_delimiter: b'\t',
            record_delimiter: b'\n',
            config: StreamConfig {
                utf8: true,
                trim_bom: true,
                ..StreamConfig::default()
            },
            cancel: None,
        }
    }
}

impl TextReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut reader = Self::default();
        reader.buffer_capacity(capacity);
        reader
    }

    /// Set the field delimiter, an ASCII byte that cannot be `\r` nor `\n`.
    ///
    /// Will default to a tab.
    pub fn field_delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.field_delimiter = delimiter;
        self
    }

    /// Set the record delimiter, an ASCII byte. When it is `\n`, a `\r`
    /// right before it is trimmed from the record.
    ///
    /// Will default to `\n`.
    pub fn record_delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.record_delimiter = delimiter;
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

    /// Will default to `true`.
    pub fn trim_bom(&mut self, yes: bool) -> &mut Self {
        self.config.trim_bom = yes;
        self
    }

    pub fn cancel_token(&mut self, token: CancelToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    fn stream(&self) -> Result<RecordStream<TextSplitter>> {
        if !self.field_delimiter.is_ascii() || !self.record_delimiter.is_ascii() {
            return Err(Error::invalid_config("text delimiters must be ASCII"));
        }

        if self.field_delimiter == self.record_delimiter {
            return Err(Error::invalid_config(
                "field and record delimiters must differ",
            ));
        }

        if matches!(self.field_delimiter, b'\n' | b'\r') {
            return Err(Error::invalid_config(
                "field delimiter cannot be a line terminator",
            ));
        }

        Ok(RecordStream::new(
            TextSplitter::new(self.field_delimiter, self.record_delimiter),
            &self.config,
        ))
    }

    pub fn from_reader<R: Read>(&self, reader: R) -> Result<TextReader<R>> {
        Ok(TextReader {
            stream: self.stream()?,
            inner: reader,
        })
    }

    pub fn from_async_reader<R: AsyncRead + Unpin>(
        &self,
        reader: R,
    ) -> Result<AsyncTextReader<R>> {
        Ok(AsyncTextReader {
            stream: self.stream()?,
            inner: reader,
            cancel: self.cancel.clone(),
        })
    }
}

#[inline]
fn text_record(stream: &RecordStream<TextSplitter>) -> TextRecord<'_> {
    // SAFETY: the stream is always UTF-8 validated before being split, and
    // records are delimited by ASCII bytes, so they start and end on char
    // boundaries.
    let data = unsafe { str::from_utf8_unchecked(stream.record_bytes()) };

    TextRecord::new(data, stream.spans())
}

/// A streaming reader of delimited UTF-8 text, with no quoting whatsoever.
pub struct TextReader<R> {
    stream: RecordStream<TextSplitter>,
    inner: R,
}

impl<R: Read> TextReader<R> {
    pub fn from_reader(reader: R) -> Self {
        let builder = TextReaderBuilder::default();

        Self {
            stream: RecordStream::new(
                TextSplitter::new(builder.field_delimiter, builder.record_delimiter),
                &builder.config,
            ),
            inner: reader,
        }
    }

    pub fn read_record(&mut self) -> Result<Option<TextRecord<'_>>> {
        if !self.stream.next(&mut self.inner)? {
            return Ok(None);
        }

        Ok(Some(text_record(&self.stream)))
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

/// The non-blocking counterpart of [`TextReader`].
pub struct AsyncTextReader<R> {
    stream: RecordStream<TextSplitter>,
    inner: R,
    cancel: Option<CancelToken>,
}

impl<R: AsyncRead + Unpin> AsyncTextReader<R> {
    pub async fn read_record(&mut self) -> Result<Option<TextRecord<'_>>> {
        if !self
            .stream
            .next_async(&mut self.inner, self.cancel.as_ref())
            .await?
        {
            return Ok(None);
        }

        Ok(Some(text_record(&self.stream)))
    }

    pub async fn count_records(&mut self) -> Result<u64> {
        let mut count: u64 = 0;

        while self
            .stream
            .next_async(&mut self.inner, self.cancel.as_ref())
            .await?
        {
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

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    use crate::error::ErrorKind;

    fn read_all(builder: &TextReaderBuilder, data: &[u8]) -> Result<Vec<Vec<String>>> {
        let mut reader = builder.from_reader(Cursor::new(data))?;
        let mut records = Vec::new();

        while let Some(record) = reader.read_record()? {
            records.push(record.to_vec());
        }

        Ok(records)
    }

    fn assert_read(data: &str, expected: Vec<Vec<&str>>) -> Result<()> {
        for capacity in [8192, 32, 4, 3, 2, 1] {
            let records = read_all(&TextReaderBuilder::with_capacity(capacity), data.as_bytes())?;

            assert_eq!(records, expected, "capacity={} data={:?}", capacity, data);
        }

        Ok(())
    }

    #[test]
    fn test_text_reader() -> Result<()> {
        assert_read("", vec![])?;
        assert_read("a\tb\nc\td\n", vec![vec!["a", "b"], vec!["c", "d"]])?;
        assert_read("a\tb\r\nc\td", vec![vec!["a", "b"], vec!["c", "d"]])?;
        assert_read("\"a\t\"b\"\n", vec![vec!["\"a", "\"b\""]])?;
        assert_read("\t\n", vec![vec!["", ""]])?;
        assert_read("a\n\r\n\nb", vec![vec!["a"], vec![], vec![], vec!["b"]])?;
        assert_read("héllo\tçà\n", vec![vec!["héllo", "çà"]])?;

        Ok(())
    }

    #[test]
    fn test_custom_delimiters() -> Result<()> {
        let mut builder = TextReaderBuilder::new();
        builder.field_delimiter(b'|').record_delimiter(b';');

        assert_eq!(
            read_all(&builder, b"a|b;c\r\n|d;")?,
            vec![vec!["a", "b"], vec!["c\r\n", "d"]]
        );

        Ok(())
    }

    #[test]
    fn test_invalid_utf8() {
        for capacity in [8192, 3, 1] {
            let result = read_all(&TextReaderBuilder::with_capacity(capacity), b"ab\tc\nd\xc3");

            assert!(matches!(
                result.map_err(Error::into_kind),
                Err(ErrorKind::Decode { pos: 6 })
            ));
        }
    }

    #[test]
    fn test_records_before_invalid_utf8() -> Result<()> {
        let cases: [(&[u8], Vec<&str>, u64); 2] = [
            (b"a\nb\n\xff\n", vec!["a", "b"], 4),
            (b"ab\n\xe2\x82x\n", vec!["ab"], 3),
        ];

        for (data, expected, error_pos) in cases {
            for capacity in [8192, 32, 4, 3, 2, 1] {
                let mut reader = TextReaderBuilder::with_capacity(capacity).from_reader(data)?;
                let mut records = Vec::new();

                let err = loop {
                    match reader.read_record() {
                        Ok(Some(record)) => records.push(record.to_vec()),
                        Ok(None) => panic!("reader ended without error"),
                        Err(err) => break err,
                    }
                };

                assert_eq!(
                    records,
                    expected.iter().map(|field| vec![field.to_string()]).collect::<Vec<_>>(),
                    "capacity={}",
                    capacity
                );
                assert!(matches!(err.kind(), ErrorKind::Decode { pos } if *pos == error_pos));
                assert!(reader.read_record()?.is_none());
            }
        }

        Ok(())
    }

    #[test]
    fn test_invalid_config() {
        let invalid = [(b'\t', b'\t'), (b'\n', b';'), (0xe9, b'\n')];

        for (field_delimiter, record_delimiter) in invalid {
            let result = TextReaderBuilder::new()
                .field_delimiter(field_delimiter)
                .record_delimiter(record_delimiter)
                .from_reader(Cursor::new(""));

            assert!(matches!(
                result.map_err(Error::into_kind),
                Err(ErrorKind::InvalidConfig { .. })
            ));
        }
    }

    #[tokio::test]
    async fn test_async_text_reader() -> Result<()> {
        let mut reader = TextReaderBuilder::with_capacity(2).from_async_reader(&b"a\tb\r\nc"[..])?;

        let mut records = Vec::new();

        while let Some(record) = reader.read_record().await? {
            records.push(record.to_vec());
        }

        assert_eq!(records, vec![vec!["a", "b"], vec!["c"]]);
        assert_eq!(reader.position(), 6);

        Ok(())
    }
}
