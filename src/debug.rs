use std::fmt;

/// Formats bytes as a string literal, escaping what is not valid UTF-8.
pub(crate) struct Bytes<'a>(pub(crate) &'a [u8]);

impl fmt::Debug for Bytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("b\"")?;

        for chunk in self.0.utf8_chunks() {
            for c in chunk.valid().chars() {
                write!(f, "{}", c.escape_debug())?;
            }

            for byte in chunk.invalid() {
                write!(f, "\\x{:02X}", byte)?;
            }
        }

        f.write_str("\"")
    }
}
