use std::borrow::Cow;

use memchr::{memchr, memmem};

pub(crate) const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Drop a leading UTF-8 BOM, if any.
#[inline]
pub fn trim_bom(slice: &[u8]) -> &[u8] {
    slice.strip_prefix(UTF8_BOM).unwrap_or(slice)
}

/// Append `cell` to `output`, folding every doubled `quote` into a single
/// one. Lone quotes are kept as-is.
pub fn unescape_to(cell: &[u8], quote: u8, output: &mut Vec<u8>) {
    let mut pos = 0;

    while let Some(offset) = memchr(quote, &cell[pos..]) {
        let end = pos + offset + 1;

        output.extend_from_slice(&cell[pos..end]);
        pos = end;

        if cell.get(pos) == Some(&quote) {
            pos += 1;
        }
    }

    output.extend_from_slice(&cell[pos..]);
}

/// Fold every doubled `quote` of `cell` into a single one, only allocating if
/// there is actually something to fold.
pub fn unescape(cell: &[u8], quote: u8) -> Cow<'_, [u8]> {
    if memmem::find(cell, &[quote, quote]).is_none() {
        return Cow::Borrowed(cell);
    }

    let mut output = Vec::with_capacity(cell.len());
    unescape_to(cell, quote, &mut output);

    Cow::Owned(output)
}
