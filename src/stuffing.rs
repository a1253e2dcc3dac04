//! Consistent-overhead byte stuffing against an arbitrary sentinel byte.
//!
//! A stuffed field never contains its sentinel, so that the sentinel can
//! frame it. The field is cut into runs of at most 254 bytes around each
//! sentinel occurrence, and every run is prefixed by a code byte equal to
//! `run length + 1`, XOR-ed with the sentinel. A code of 255 means the run
//! was cut because of its length and is not followed by a sentinel. With a
//! `0` sentinel this is exactly COBS, minus the trailing code COBS emits for
//! empty input.
use memchr::memchr;

use crate::error::{Error, Result};

const MAX_RUN: usize = 254;
const FULL_RUN_CODE: u8 = 0xff;

/// Worst-case length of the stuffed version of a field of `len` bytes.
pub fn max_encoded_len(len: usize) -> usize {
    if len == 0 {
        0
    } else {
        len + len / MAX_RUN + 1
    }
}

/// Append the stuffed version of `field` to `out`.
pub fn encode(field: &[u8], sentinel: u8, out: &mut Vec<u8>) {
    if field.is_empty() {
        return;
    }

    out.reserve(max_encoded_len(field.len()));

    let mut rest = field;

    loop {
        let run_len = memchr(sentinel, rest).unwrap_or(rest.len());
        let mut run = &rest[..run_len];

        while run.len() >= MAX_RUN {
            out.push(FULL_RUN_CODE ^ sentinel);
            out.extend_from_slice(&run[..MAX_RUN]);
            run = &run[MAX_RUN..];
        }

        out.push((run.len() as u8 + 1) ^ sentinel);
        out.extend_from_slice(run);

        if run_len == rest.len() {
            break;
        }

        // Skipping the sentinel, which is implied by the next code byte
        rest = &rest[run_len + 1..];
    }
}

/// Append the decoded version of `stuffed` to `out`.
///
/// Fails with [`ErrorKind::Malformed`](crate::ErrorKind::Malformed) if
/// `stuffed` is truncated or contains its own sentinel.
pub fn decode(stuffed: &[u8], sentinel: u8, out: &mut Vec<u8>) -> Result<()> {
    decode_at(stuffed, sentinel, out, 0)
}

/// Same as [`decode`], reporting errors relative to `pos`, the stream offset
/// of `stuffed`.
pub(crate) fn decode_at(stuffed: &[u8], sentinel: u8, out: &mut Vec<u8>, pos: u64) -> Result<()> {
    if let Some(offset) = memchr(sentinel, stuffed) {
        return Err(Error::malformed(
            pos + offset as u64,
            "stuffed field contains its sentinel",
        ));
    }

    out.reserve(stuffed.len());

    let mut i = 0;

    while i < stuffed.len() {
        let code = stuffed[i] ^ sentinel;
        let run_len = code as usize - 1;

        i += 1;

        if i + run_len > stuffed.len() {
            return Err(Error::malformed(pos + i as u64 - 1, "truncated stuffed field"));
        }

        out.extend_from_slice(&stuffed[i..i + run_len]);
        i += run_len;

        if code != FULL_RUN_CODE && i < stuffed.len() {
            out.push(sentinel);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use quickcheck_macros::quickcheck;

    use crate::error::ErrorKind;

    fn stuff(field: &[u8], sentinel: u8) -> Vec<u8> {
        let mut out = Vec::new();
        encode(field, sentinel, &mut out);
        out
    }

    fn unstuff(stuffed: &[u8], sentinel: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        decode(stuffed, sentinel, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_classic_cobs() -> Result<()> {
        // Examples from the COBS paper, minus the trailing zero
        assert_eq!(stuff(b"", 0), b"");
        assert_eq!(stuff(&[0], 0), &[1, 1]);
        assert_eq!(stuff(&[0, 0], 0), &[1, 1, 1]);
        assert_eq!(stuff(&[0x11, 0x22, 0x00, 0x33], 0), &[3, 0x11, 0x22, 2, 0x33]);
        assert_eq!(stuff(&[0x11, 0x00, 0x00, 0x00], 0), &[2, 0x11, 1, 1, 1]);

        assert_eq!(unstuff(&[2, 0x11, 1, 1, 1], 0)?, &[0x11, 0, 0, 0]);

        Ok(())
    }

    #[test]
    fn test_sentinel_is_xored() -> Result<()> {
        let esc = 27;
        let stuffed = stuff(&[esc], esc);

        assert_eq!(stuffed, &[1 ^ esc, 1 ^ esc]);
        assert!(!stuffed.contains(&esc));
        assert_eq!(unstuff(&stuffed, esc)?, &[esc]);

        Ok(())
    }

    #[test]
    fn test_long_runs() -> Result<()> {
        for len in [253, 254, 255, 508, 509, 1000] {
            let field = vec![b'a'; len];
            let stuffed = stuff(&field, 0);

            assert!(stuffed.len() <= max_encoded_len(len));
            assert_eq!(unstuff(&stuffed, 0)?, field);

            let mut field = field;
            field.push(0);
            field.push(b'b');

            assert_eq!(unstuff(&stuff(&field, 0), 0)?, field);
        }

        assert_eq!(stuff(&[b'a'; 254], 0).len(), 256);

        Ok(())
    }

    #[test]
    fn test_malformed() {
        let err = unstuff(&[5, b'a'], 0).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Malformed { pos: 0, .. }));

        let err = unstuff(&[2, b'a', 0], 0).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Malformed { pos: 2, .. }));

        let mut out = Vec::new();
        let err = decode_at(&[3, b'a'], 0, &mut out, 100).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Malformed { pos: 100, .. }));
    }

    #[quickcheck]
    fn roundtrip(field: Vec<u8>, sentinel: u8) -> bool {
        let stuffed = stuff(&field, sentinel);

        !stuffed.contains(&sentinel)
            && stuffed.len() <= max_encoded_len(field.len())
            && unstuff(&stuffed, sentinel).ok() == Some(field)
    }

    #[quickcheck]
    fn roundtrip_sentinel_heavy(runs: Vec<(u8, bool)>) -> bool {
        // Biasing toward the sentinel and very long runs
        let mut field = Vec::new();

        for (len, sentinel_follows) in runs {
            field.extend(std::iter::repeat(b'x').take(len as usize * 3));

            if sentinel_follows {
                field.push(27);
            }
        }

        unstuff(&stuff(&field, 27), 27).ok() == Some(field)
    }
}
