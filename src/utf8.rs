use std::str;

use crate::error::{Error, ErrorKind, Result};

/// Outcome of feeding a chunk to a [`Utf8Decoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The chunk ended in the middle of a multi-byte sequence.
    NeedMoreInput,
    /// Everything fed so far was valid and complete.
    Complete,
}

/// Incremental UTF-8 validator, able to deal with multi-byte sequences
/// straddling chunk boundaries.
#[derive(Debug, Default, Clone)]
pub struct Utf8Decoder {
    pending: [u8; 4],
    pending_len: usize,
    // Number of bytes fed so far
    offset: u64,
}

#[inline(always)]
fn sequence_len(lead: u8) -> usize {
    match lead {
        0xf0.. => 4,
        0xe0.. => 3,
        _ => 2,
    }
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes fed so far.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn error(pos: u64) -> Error {
        Error::new(ErrorKind::Decode { pos })
    }

    /// Validate the next chunk of the stream.
    pub fn decode(&mut self, mut chunk: &[u8]) -> Result<DecodeStatus> {
        if self.pending_len > 0 {
            let sequence_start = self.offset - self.pending_len as u64;
            let needed = sequence_len(self.pending[0]) - self.pending_len;
            let taken = needed.min(chunk.len());

            self.pending[self.pending_len..self.pending_len + taken]
                .copy_from_slice(&chunk[..taken]);

            match str::from_utf8(&self.pending[..self.pending_len + taken]) {
                Ok(_) => {
                    self.pending_len = 0;
                }
                Err(err) if err.error_len().is_none() => {
                    self.pending_len += taken;
                    self.offset += taken as u64;

                    return Ok(DecodeStatus::NeedMoreInput);
                }
                Err(_) => return Err(Self::error(sequence_start)),
            }

            self.offset += taken as u64;
            chunk = &chunk[taken..];
        }

        match str::from_utf8(chunk) {
            Ok(_) => {
                self.offset += chunk.len() as u64;

                Ok(DecodeStatus::Complete)
            }
            Err(err) => {
                let valid_up_to = err.valid_up_to();

                if err.error_len().is_some() {
                    return Err(Self::error(self.offset + valid_up_to as u64));
                }

                let tail = &chunk[valid_up_to..];

                self.pending[..tail.len()].copy_from_slice(tail);
                self.pending_len = tail.len();
                self.offset += chunk.len() as u64;

                Ok(DecodeStatus::NeedMoreInput)
            }
        }
    }

    /// Signal the end of the stream, failing if it stopped in the middle of a
    /// multi-byte sequence.
    pub fn finish(&mut self) -> Result<()> {
        if self.pending_len > 0 {
            let pos = self.offset - self.pending_len as u64;
            self.pending_len = 0;

            return Err(Self::error(pos));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_in_chunks(bytes: &[u8], chunk_size: usize) -> Result<()> {
        let mut decoder = Utf8Decoder::new();

        for chunk in bytes.chunks(chunk_size) {
            decoder.decode(chunk)?;
        }

        decoder.finish()
    }

    fn error_pos(result: Result<()>) -> Option<u64> {
        match result.map_err(Error::into_kind) {
            Err(ErrorKind::Decode { pos }) => Some(pos),
            _ => None,
        }
    }

    #[test]
    fn test_split_sequences() -> Result<()> {
        let text = "aé€😀b".as_bytes();

        for chunk_size in 1..=text.len() {
            decode_in_chunks(text, chunk_size)?;
        }

        let mut decoder = Utf8Decoder::new();

        // "€" is e2 82 ac
        assert_eq!(decoder.decode(b"a\xe2")?, DecodeStatus::NeedMoreInput);
        assert_eq!(decoder.decode(b"\x82")?, DecodeStatus::NeedMoreInput);
        assert_eq!(decoder.decode(b"\xacb")?, DecodeStatus::Complete);
        assert_eq!(decoder.offset(), 5);

        Ok(())
    }

    #[test]
    fn test_invalid() {
        for chunk_size in [1, 2, 3, 100] {
            assert_eq!(
                error_pos(decode_in_chunks(b"abc\xffdef", chunk_size)),
                Some(3)
            );

            // Lead byte followed by ASCII
            assert_eq!(
                error_pos(decode_in_chunks(b"abcd\xe2\x82zz", chunk_size)),
                Some(4)
            );

            // Truncated at the end of the stream
            assert_eq!(
                error_pos(decode_in_chunks(b"abcde\xf0\x9f", chunk_size)),
                Some(5)
            );
        }
    }
}
