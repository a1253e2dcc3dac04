use std::io::{self, BufWriter, IntoInnerError, Write};

use crate::collector::IndexCollector;
use crate::error::{Error, Result};
use crate::records::ByteRecord;
use crate::searcher::Searcher;
use crate::utils::UTF8_BOM;

/// Builds a [`Writer`] with given configuration.
#[derive(Debug, Clone)]
pub struct WriterBuilder {
    delimiter: u8,
    quote: u8,
    buffer_capacity: usize,
}

impl Default for WriterBuilder {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            buffer_capacity: 8192,
        }
    }
}

impl WriterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut writer = Self::default();
        writer.buffer_capacity(capacity);
        writer
    }

    /// Will default to a comma.
    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = delimiter;
        self
    }

    /// Will default to a double quote.
    pub fn quote(&mut self, quote: u8) -> &mut Self {
        self.quote = quote;
        self
    }

    pub fn buffer_capacity(&mut self, capacity: usize) -> &mut Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn from_writer<W: Write>(&self, writer: W) -> Result<Writer<W>> {
        if matches!(self.delimiter, b'\n' | b'\r') || matches!(self.quote, b'\n' | b'\r') {
            return Err(Error::invalid_config(
                "delimiter and quote cannot be line terminators",
            ));
        }

        if self.delimiter == self.quote {
            return Err(Error::invalid_config("delimiter and quote must differ"));
        }

        Ok(Writer::new(
            BufWriter::with_capacity(self.buffer_capacity, writer),
            self.delimiter,
            self.quote,
        ))
    }
}

/// A CSV writer, quoting fields only when needed.
pub struct Writer<W: Write> {
    delimiter: u8,
    quote: u8,
    buffer: BufWriter<W>,
    quote_bounds: IndexCollector<'static>,
    scratch: Vec<u8>,
    searcher: Searcher,
    // Nothing written yet
    at_start: bool,
}

impl<W: Write> Writer<W> {
    fn new(buffer: BufWriter<W>, delimiter: u8, quote: u8) -> Self {
        Self {
            buffer,
            quote,
            delimiter,
            quote_bounds: IndexCollector::new(),
            scratch: Vec::new(),
            searcher: Searcher::new(&[delimiter, quote, b'\n', b'\r']),
            at_start: true,
        }
    }

    /// Create a new writer with default configuration.
    pub fn from_writer(writer: W) -> Self {
        Self::new(BufWriter::new(writer), b',', b'"')
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.buffer.flush()
    }

    fn assess_quoting(&mut self, cell: &[u8]) -> bool {
        let mut must_quote = false;

        self.quote_bounds.reset();

        for offset in self.searcher.search(cell) {
            let byte = cell[offset];

            if byte == self.quote {
                if self.quote_bounds.is_empty() {
                    self.quote_bounds.push(0);
                }

                self.quote_bounds.push(offset);
            }

            must_quote = true;
        }

        if !self.quote_bounds.is_empty() {
            self.quote_bounds.push(cell.len());
        }

        must_quote
    }

    fn quote(&mut self, cell: &[u8]) {
        self.scratch.clear();
        self.scratch.push(self.quote);

        if self.quote_bounds.is_empty() {
            self.scratch.extend_from_slice(cell);
        } else {
            // Every quote starts a chunk, so writing one more before each
            // chunk but the first doubles them
            let windows = self.quote_bounds.windows(2);

            for (i, w) in windows.enumerate() {
                if i > 0 {
                    self.scratch.push(self.quote);
                }

                self.scratch.extend_from_slice(&cell[w[0]..w[1]]);
            }
        }

        self.scratch.push(self.quote);
    }

    /// Write a record made of the given fields, terminated by `\n`.
    pub fn write_record<I, T>(&mut self, fields: I) -> io::Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut count: usize = 0;
        let mut last_was_empty = false;

        for cell in fields {
            let cell = cell.as_ref();

            if count > 0 {
                self.buffer.write_all(&[self.delimiter])?;
            }

            let must_quote = self.assess_quoting(cell);

            // Readers trim a leading BOM
            if must_quote || (self.at_start && count == 0 && cell.starts_with(UTF8_BOM)) {
                self.quote(cell);
                self.buffer.write_all(&self.scratch)?;
            } else {
                self.buffer.write_all(cell)?;
            }

            count += 1;
            last_was_empty = cell.is_empty();
        }

        // A single empty field would otherwise read back as an empty record
        if count == 1 && last_was_empty {
            self.buffer.write_all(&[self.quote, self.quote])?;
        }

        self.at_start = false;
        self.buffer.write_all(b"\n")
    }

    #[inline]
    pub fn write_byte_record(&mut self, record: &ByteRecord) -> io::Result<()> {
        self.write_record(record.iter())
    }

    pub fn into_inner(self) -> std::result::Result<W, IntoInnerError<BufWriter<W>>> {
        self.buffer.into_inner()
    }
}
