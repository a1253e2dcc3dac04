use memchr::memchr;

use crate::error::Result;
use crate::records::{Escape, FieldSpan};
use crate::searcher::Searcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadResult {
    /// Everything given was scanned without completing the record.
    InputEmpty,
    /// Bytes to drop before the next record, e.g. the LF of a CRLF.
    Skip,
    Record,
    End,
    /// The data does not follow the dialect's framing rules.
    Malformed(&'static str),
}

/// A dialect splitter, fed with the unscanned bytes of the current record.
///
/// `offset` is the number of bytes of the record already scanned by previous
/// calls, and spans are pushed relative to the record's start. An empty
/// `input` means the stream is over.
pub(crate) trait Split {
    fn split(
        &mut self,
        input: &[u8],
        offset: usize,
        spans: &mut Vec<FieldSpan>,
    ) -> (ReadResult, usize);

    /// Called with the whole record once it is complete, `pos` being its
    /// offset in the stream.
    fn finish_record(
        &mut self,
        _record: &[u8],
        _spans: &mut Vec<FieldSpan>,
        _pos: u64,
    ) -> Result<()> {
        Ok(())
    }

    /// Scratch buffer holding fields whose span escape is [`Escape::Decoded`].
    fn decoded(&self) -> &[u8] {
        &[]
    }

    fn quote(&self) -> u8 {
        b'"'
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Unquoted,
    Quoted,
    Quote,
}

/// The field currently being scanned.
#[derive(Debug)]
struct FieldState {
    start: usize,
    is_quoted: bool,
    escape: Escape,
}

impl FieldState {
    fn new() -> Self {
        Self {
            start: 0,
            is_quoted: false,
            escape: Escape::None,
        }
    }

    #[inline(always)]
    fn close(&mut self, end: usize, next_start: usize, spans: &mut Vec<FieldSpan>) {
        let start = self.start + self.is_quoted as usize;

        spans.push(FieldSpan::new(start, end, self.escape));

        self.start = next_start;
        self.is_quoted = false;
        self.escape = Escape::None;
    }
}

/// Quoted CSV state machine.
pub(crate) struct CoreReader {
    pub(crate) delimiter: u8,
    pub(crate) quote: u8,
    state: ReadState,
    field: FieldState,
    record_was_read: bool,
    skip_lf: bool,
    searcher: Searcher,
}

impl CoreReader {
    pub(crate) fn new(delimiter: u8, quote: u8) -> Self {
        Self {
            delimiter,
            quote,
            state: ReadState::Unquoted,
            field: FieldState::new(),
            // Must be true at the beginning to avoid emitting one record for empty input
            record_was_read: true,
            skip_lf: false,
            searcher: Searcher::new(&[delimiter, quote, b'\n', b'\r']),
        }
    }

    /// `at` is the position of the terminator relative to the record start
    /// and `field_end` the end of the last field.
    #[inline]
    fn close_record(
        &mut self,
        at: usize,
        field_end: usize,
        terminator: u8,
        spans: &mut Vec<FieldSpan>,
    ) {
        // An empty line is a record without any field
        if at > 0 {
            self.field.close(field_end, 0, spans);
        }

        self.field = FieldState::new();
        self.state = ReadState::Unquoted;
        self.record_was_read = true;
        self.skip_lf = terminator == b'\r';
    }

    fn close_last_record(&mut self, offset: usize, spans: &mut Vec<FieldSpan>) {
        let field_end = match self.state {
            // Unquoted data ends with the stream
            ReadState::Unquoted => offset,
            ReadState::Quoted => {
                log::debug!("stream ended inside a quoted field, keeping what was read");
                offset
            }
            // The last byte was a closing quote
            ReadState::Quote => offset - 1,
        };

        self.field.close(field_end, 0, spans);
        self.field = FieldState::new();
        self.state = ReadState::Unquoted;
        self.record_was_read = true;
    }

    pub(crate) fn split_record(
        &mut self,
        input: &[u8],
        offset: usize,
        spans: &mut Vec<FieldSpan>,
    ) -> (ReadResult, usize) {
        use ReadState::*;

        let input_len = input.len();

        if input_len == 0 {
            if !self.record_was_read {
                self.close_last_record(offset, spans);
                return (ReadResult::Record, 0);
            }

            return (ReadResult::End, 0);
        }

        if self.record_was_read {
            if self.skip_lf {
                self.skip_lf = false;

                if input[0] == b'\n' {
                    return (ReadResult::Skip, 1);
                }
            }

            self.record_was_read = false;
        }

        let mut pos: usize = 0;

        while pos < input_len {
            match self.state {
                Unquoted => {
                    // Fast path for quoted field start
                    if offset + pos == self.field.start && input[pos] == self.quote {
                        self.state = Quoted;
                        self.field.is_quoted = true;
                        pos += 1;
                        continue;
                    }

                    // Here we are moving to next structural character
                    let mut next_pos = input_len;
                    let mut terminator = None;

                    for index in self.searcher.search(&input[pos..]) {
                        let at = pos + index;
                        let byte = input[at];

                        if byte == self.delimiter {
                            self.field.close(offset + at, offset + at + 1, spans);

                            // Next field might be quoted, so we need to go back to
                            // the fast path
                            if input.get(at + 1) == Some(&self.quote) {
                                next_pos = at + 1;
                                break;
                            }

                            continue;
                        }

                        if byte == b'\n' || byte == b'\r' {
                            terminator = Some((at, byte));
                            break;
                        }

                        // Here, `byte` is guaranteed to be a quote in the middle
                        // of an unquoted field, which we keep. Doubled ones will
                        // be folded though.
                        self.field.escape = Escape::Doubled;
                    }

                    if let Some((at, byte)) = terminator {
                        self.close_record(offset + at, offset + at, byte, spans);
                        return (ReadResult::Record, at + 1);
                    }

                    pos = next_pos;
                }
                Quoted => {
                    // Here we moving to next quote
                    if let Some(index) = memchr(self.quote, &input[pos..]) {
                        pos += index + 1;
                        self.state = Quote;
                    } else {
                        break;
                    }
                }
                Quote => {
                    let byte = input[pos];
                    let at = offset + pos;

                    if byte == self.quote {
                        self.field.escape = Escape::Doubled;
                        self.state = Quoted;
                        pos += 1;
                    } else if byte == self.delimiter {
                        self.field.close(at - 1, at + 1, spans);
                        self.state = Unquoted;
                        pos += 1;
                    } else if byte == b'\n' || byte == b'\r' {
                        self.close_record(at, at - 1, byte, spans);
                        return (ReadResult::Record, pos + 1);
                    } else {
                        // Data after a closing quote: the quote was a literal
                        // after all and we keep going unquoted
                        self.field.escape = Escape::Doubled;
                        self.state = Unquoted;
                    }
                }
            }
        }

        (ReadResult::InputEmpty, input_len)
    }
}

impl Split for CoreReader {
    #[inline(always)]
    fn split(
        &mut self,
        input: &[u8],
        offset: usize,
        spans: &mut Vec<FieldSpan>,
    ) -> (ReadResult, usize) {
        self.split_record(input, offset, spans)
    }

    #[inline(always)]
    fn quote(&self) -> u8 {
        self.quote
    }
}
