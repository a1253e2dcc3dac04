use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::buffer::RefillBuffer;
use crate::core::{ReadResult, Split};
use crate::error::{Error, ErrorKind, Result};
use crate::records::{FieldSpan, RecordView};
use crate::utf8::Utf8Decoder;
use crate::utils::UTF8_BOM;

/// Cooperative cancellation flag for asynchronous readers.
///
/// Cloning the token shares the flag. Readers only check it before
/// refilling their buffer, so records already buffered may still be yielded
/// after [`CancelToken::cancel`] is called.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    NeedInput,
    Record,
    End,
}

/// Settings shared by every reader builder.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamConfig {
    pub(crate) buffer_capacity: usize,
    pub(crate) max_record_len: usize,
    pub(crate) utf8: bool,
    pub(crate) trim_bom: bool,
}

pub(crate) const DEFAULT_BUFFER_CAPACITY: usize = 8192;
pub(crate) const DEFAULT_MAX_RECORD_LEN: usize = 16 * (1 << 20);

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
            utf8: false,
            trim_bom: false,
        }
    }
}

/// The refill engine behind every reader, independent of how the bytes are
/// actually read from the source.
///
/// Drivers repeatedly call [`RecordStream::advance`], and read from their
/// source into [`RecordStream::spare`] then [`RecordStream::commit`] what was
/// read every time it returns [`Step::NeedInput`].
pub(crate) struct RecordStream<S> {
    buffer: RefillBuffer,
    splitter: S,
    spans: Vec<FieldSpan>,
    decoder: Option<Utf8Decoder>,
    max_record_len: usize,
    must_check_bom: bool,
    // Bytes of the current record already scanned by the splitter
    scanned: usize,
    // Length of the record yielded by the last `advance`, not consumed yet
    pending_record: Option<usize>,
    // Decoding error raised once the bytes before it have been split
    deferred: Option<Error>,
    eof: bool,
    terminal: bool,
}

impl<S: Split> RecordStream<S> {
    pub(crate) fn new(splitter: S, config: &StreamConfig) -> Self {
        Self {
            buffer: RefillBuffer::with_capacity(config.buffer_capacity),
            splitter,
            spans: Vec::new(),
            decoder: config.utf8.then(Utf8Decoder::new),
            max_record_len: config.max_record_len,
            must_check_bom: config.trim_bom,
            scanned: 0,
            pending_record: None,
            deferred: None,
            eof: false,
            terminal: false,
        }
    }

    /// Stream offset of the first byte not yielded yet.
    pub(crate) fn position(&self) -> u64 {
        self.buffer.position() + self.pending_record.unwrap_or(0) as u64
    }

    #[inline]
    fn fail(&mut self, err: Error) -> Error {
        log::debug!("reader stopped on error: {}", err);
        self.terminal = true;
        err
    }

    #[inline]
    fn need_input(&mut self) -> Result<Step> {
        match self.deferred.take() {
            Some(err) => Err(self.fail(err)),
            None => Ok(Step::NeedInput),
        }
    }

    fn record_too_long(&mut self) -> Error {
        let err = Error::new(ErrorKind::RecordTooLong {
            max_len: self.max_record_len,
            pos: self.buffer.position(),
        });

        self.fail(err)
    }

    /// Run the splitter on what is buffered.
    pub(crate) fn advance(&mut self) -> Result<Step> {
        if self.terminal {
            return Ok(Step::End);
        }

        if let Some(len) = self.pending_record.take() {
            self.buffer.consume(len);
        }

        // Not knowing yet whether the stream starts with a BOM
        if self.must_check_bom && !self.eof {
            return self.need_input();
        }

        loop {
            let data = self.buffer.data();

            if self.scanned == data.len() && !self.eof {
                return self.need_input();
            }

            if self.scanned == 0 {
                self.spans.clear();
            }

            let (result, consumed) =
                self.splitter
                    .split(&data[self.scanned..], self.scanned, &mut self.spans);

            match result {
                ReadResult::InputEmpty => {
                    self.scanned += consumed;

                    if self.scanned > self.max_record_len {
                        return Err(self.record_too_long());
                    }

                    // Letting the splitter know the stream is over
                    if self.eof {
                        continue;
                    }

                    return self.need_input();
                }
                ReadResult::Skip => {
                    self.buffer.consume(consumed);
                }
                ReadResult::Record => {
                    let len = self.scanned + consumed;

                    self.scanned = 0;

                    if len > self.max_record_len {
                        return Err(self.record_too_long());
                    }

                    let pos = self.buffer.position();

                    if let Err(err) =
                        self.splitter
                            .finish_record(&data[..len], &mut self.spans, pos)
                    {
                        return Err(self.fail(err));
                    }

                    self.pending_record = Some(len);

                    return Ok(Step::Record);
                }
                ReadResult::End => {
                    self.terminal = true;
                    return Ok(Step::End);
                }
                ReadResult::Malformed(reason) => {
                    let pos = self.buffer.position() + (self.scanned + consumed) as u64;
                    return Err(self.fail(Error::malformed(pos, reason)));
                }
            }
        }
    }

    /// The record yielded by the last call to [`RecordStream::advance`].
    #[inline]
    pub(crate) fn record(&self) -> RecordView<'_> {
        let len = self.pending_record.unwrap_or(0);

        RecordView::new(
            &self.buffer.data()[..len],
            self.splitter.decoded(),
            &self.spans,
            self.splitter.quote(),
        )
    }

    #[inline]
    pub(crate) fn spans(&self) -> &[FieldSpan] {
        &self.spans
    }

    /// Bytes of the record yielded by the last call to
    /// [`RecordStream::advance`].
    #[inline]
    pub(crate) fn record_bytes(&self) -> &[u8] {
        &self.buffer.data()[..self.pending_record.unwrap_or(0)]
    }

    #[inline]
    pub(crate) fn spare(&mut self) -> &mut [u8] {
        self.buffer.spare()
    }

    /// Account for `amount` bytes freshly written into the spare space, `0`
    /// meaning the source is exhausted.
    ///
    /// When the bytes are not valid UTF-8, only the valid prefix is
    /// committed, and the error is kept until the records it holds have
    /// been yielded.
    pub(crate) fn commit(&mut self, amount: usize) -> Result<()> {
        if amount == 0 {
            self.eof = true;
            self.must_check_bom = false;

            if let Some(decoder) = self.decoder.as_mut() {
                if let Err(err) = decoder.finish() {
                    return Err(self.fail(err));
                }
            }

            return Ok(());
        }

        let mut valid = amount;

        if let Some(decoder) = self.decoder.as_mut() {
            if let Err(err) = decoder.decode(self.buffer.uncommitted(amount)) {
                let end = self.buffer.position() + self.buffer.data().len() as u64;

                // The invalid sequence may have started in a previous chunk
                valid = match err.kind() {
                    ErrorKind::Decode { pos } => (pos.saturating_sub(end) as usize).min(amount),
                    _ => 0,
                };

                self.deferred = Some(err);
            }
        }

        self.buffer.commit(valid);

        if self.must_check_bom {
            let data = self.buffer.data();

            if data.len() >= UTF8_BOM.len() {
                if data.starts_with(UTF8_BOM) {
                    self.buffer.consume(UTF8_BOM.len());
                }

                self.must_check_bom = false;
            } else if !UTF8_BOM.starts_with(data) {
                self.must_check_bom = false;
            }
        }

        Ok(())
    }

    fn read_error(&mut self, err: io::Error) -> Error {
        self.fail(Error::from(err))
    }

    /// Refill from a blocking source.
    pub(crate) fn fill<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        loop {
            match reader.read(self.spare()) {
                Ok(amount) => return self.commit(amount),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(self.read_error(err)),
            }
        }
    }

    /// Refill from a non-blocking source, checking for cancellation first.
    pub(crate) async fn fill_async<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
        cancel: Option<&CancelToken>,
    ) -> Result<()> {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            log::debug!("reader was cancelled at byte {}", self.position());
            return Err(self.fail(Error::new(ErrorKind::Cancelled)));
        }

        loop {
            match reader.read(self.spare()).await {
                Ok(amount) => return self.commit(amount),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(self.read_error(err)),
            }
        }
    }

    /// Move to the next record, refilling from a blocking source as needed.
    /// Returns `false` when the stream is over.
    pub(crate) fn next<R: Read>(&mut self, reader: &mut R) -> Result<bool> {
        loop {
            match self.advance()? {
                Step::NeedInput => self.fill(reader)?,
                Step::Record => return Ok(true),
                Step::End => return Ok(false),
            }
        }
    }

    pub(crate) async fn next_async<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut R,
        cancel: Option<&CancelToken>,
    ) -> Result<bool> {
        loop {
            match self.advance()? {
                Step::NeedInput => self.fill_async(reader, cancel).await?,
                Step::Record => return Ok(true),
                Step::End => return Ok(false),
            }
        }
    }
}
