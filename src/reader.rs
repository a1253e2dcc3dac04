use std::io::Read;

use tokio::io::AsyncRead;

use crate::core::CoreReader;
use crate::error::{Error, Result};
use crate::records::{ByteRecord, RecordView};
use crate::stream::{CancelToken, RecordStream, StreamConfig};

/// Builds a [`Reader`] or an [`AsyncReader`] with given configuration.
#[derive(Debug, Clone)]
pub struct ReaderBuilder {
    delimiter: u8,
    quote: u8,
    config: StreamConfig,
    cancel: Option<CancelToken>,
}

impl Default for ReaderBuilder {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            config: StreamConfig {
                trim_bom: true,
                ..StreamConfig::default()
            },
            cancel: None,
        }
    }
}

impl ReaderBuilder {
    /// Create a new [`ReaderBuilder`] with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new [`ReaderBuilder`] with provided `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut reader = Self::default();
        reader.buffer_capacity(capacity);
        reader
    }

    /// Set the delimiter to be used by the created reader.
    ///
    /// This delimiter must be a single byte, and cannot be `\r` nor `\n`.
    ///
    /// Will default to a comma.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the quote char to be used by the created reader.
    ///
    /// This char must be a single byte, different from the delimiter.
    ///
    /// Will default to a double quote.
    pub fn quote(&mut self, quote: u8) -> &mut Self {
        self.quote = quote;
        self
    }

    /// Set the initial capacity of the created reader's buffer. The buffer
    /// will grow if a record does not fit.
    ///
    /// Will default to `8192`, `0` being clamped to `1`.
    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut Self {
        self.config.buffer_capacity = capacity;
        self
    }

    /// Set the maximum length in bytes of a single record, terminator
    /// included. Longer records are a fatal error.
    ///
    /// Will default to 16 MiB.
    pub fn max_record_len(&mut self, max_len: usize) -> &mut Self {
        self.config.max_record_len = max_len;
        self
    }

    /// Indicate whether the stream must be validated as UTF-8 while being
    /// read.
    ///
    /// Will default to `false`.
    pub fn utf8(&mut self, yes: bool) -> &mut Self {
        self.config.utf8 = yes;
        self
    }

    /// Indicate whether a leading UTF-8 BOM must be dropped.
    ///
    /// Will default to `true`.
    pub fn trim_bom(&mut self, yes: bool) -> &mut Self {
        self.config.trim_bom = yes;
        self
    }

    /// Attach a [`CancelToken`] to the created [`AsyncReader`].
    pub fn cancel_token(&mut self, token: CancelToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    fn stream(&self) -> Result<RecordStream<CoreReader>> {
        if matches!(self.delimiter, b'\n' | b'\r') {
            return Err(Error::invalid_config("delimiter cannot be a line terminator"));
        }

        if matches!(self.quote, b'\n' | b'\r') {
            return Err(Error::invalid_config("quote cannot be a line terminator"));
        }

        if self.delimiter == self.quote {
            return Err(Error::invalid_config("delimiter and quote must differ"));
        }

        Ok(RecordStream::new(
            CoreReader::new(self.delimiter, self.quote),
            &self.config,
        ))
    }

    /// Create a new [`Reader`] using the provided reader implementing
    /// [`std::io::Read`].
    pub fn from_reader<R: Read>(&self, reader: R) -> Result<Reader<R>> {
        Ok(Reader {
            stream: self.stream()?,
            inner: reader,
        })
    }

    /// Create a new [`AsyncReader`] using the provided reader implementing
    /// [`tokio::io::AsyncRead`].
    pub fn from_async_reader<R: AsyncRead + Unpin>(&self, reader: R) -> Result<AsyncReader<R>> {
        Ok(AsyncReader {
            stream: self.stream()?,
            inner: reader,
            cancel: self.cancel.clone(),
        })
    }
}

/// An already configured streaming CSV reader.
///
/// # Configuration
///
/// To configure a [`Reader`], if you need a custom delimiter for instance or
/// if you want to tweak the size of the inner buffer, check out the
/// [`ReaderBuilder`].
pub struct Reader<R> {
    stream: RecordStream<CoreReader>,
    inner: R,
}

impl<R: Read> Reader<R> {
    /// Create a new reader with default configuration using the provided
    /// reader implementing [`std::io::Read`].
    pub fn from_reader(reader: R) -> Self {
        Self {
            stream: RecordStream::new(
                CoreReader::new(b',', b'"'),
                &ReaderBuilder::default().config,
            ),
            inner: reader,
        }
    }

    /// Read the next record, as a view borrowing the reader's buffer.
    ///
    /// Returns `None` when the stream is over, or after an error.
    pub fn read_record(&mut self) -> Result<Option<RecordView<'_>>> {
        if !self.stream.next(&mut self.inner)? {
            return Ok(None);
        }

        Ok(Some(self.stream.record()))
    }

    /// Read the next record into the given [`ByteRecord`], amortizing its
    /// allocations. Returns `false` when the stream is over.
    pub fn read_byte_record(&mut self, record: &mut ByteRecord) -> Result<bool> {
        if !self.stream.next(&mut self.inner)? {
            record.clear();
            return Ok(false);
        }

        self.stream.record().read_into(record);

        Ok(true)
    }

    /// Consume the rest of the stream and return the number of records it
    /// contained.
    pub fn count_records(&mut self) -> Result<u64> {
        let mut count: u64 = 0;

        while self.stream.next(&mut self.inner)? {
            count += 1;
        }

        Ok(count)
    }

    /// Byte offset, in the stream, of the start of the next record.
    #[inline]
    pub fn position(&self) -> u64 {
        self.stream.position()
    }

    pub fn byte_records(&mut self) -> ByteRecordsIter<'_, R> {
        ByteRecordsIter {
            reader: self,
            record: ByteRecord::new(),
        }
    }

    pub fn into_byte_records(self) -> ByteRecordsIntoIter<R> {
        ByteRecordsIntoIter {
            reader: self,
            record: ByteRecord::new(),
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Unwrap the underlying source. Bytes already buffered are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

pub struct ByteRecordsIter<'r, R> {
    reader: &'r mut Reader<R>,
    record: ByteRecord,
}

impl<R: Read> Iterator for ByteRecordsIter<'_, R> {
    type Item = Result<ByteRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        // NOTE: cloning the record will not carry over excess capacity
        // because the record only contains `Vec` currently.
        match self.reader.read_byte_record(&mut self.record) {
            Err(err) => Some(Err(err)),
            Ok(true) => Some(Ok(self.record.clone())),
            Ok(false) => None,
        }
    }
}

pub struct ByteRecordsIntoIter<R> {
    reader: Reader<R>,
    record: ByteRecord,
}

impl<R: Read> Iterator for ByteRecordsIntoIter<R> {
    type Item = Result<ByteRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_byte_record(&mut self.record) {
            Err(err) => Some(Err(err)),
            Ok(true) => Some(Ok(self.record.clone())),
            Ok(false) => None,
        }
    }
}

/// The non-blocking counterpart of [`Reader`], reading from a
/// [`tokio::io::AsyncRead`] source.
///
/// Parsing never awaits: the reader only yields to the runtime when its
/// buffer needs refilling, which is also when its [`CancelToken`], if any, is
/// checked.
pub struct AsyncReader<R> {
    stream: RecordStream<CoreReader>,
    inner: R,
    cancel: Option<CancelToken>,
}

impl<R: AsyncRead + Unpin> AsyncReader<R> {
    /// Create a new reader with default configuration using the provided
    /// reader implementing [`tokio::io::AsyncRead`].
    pub fn from_async_reader(reader: R) -> Self {
        Self {
            stream: RecordStream::new(
                CoreReader::new(b',', b'"'),
                &ReaderBuilder::default().config,
            ),
            inner: reader,
            cancel: None,
        }
    }

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
