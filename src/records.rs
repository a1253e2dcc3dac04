use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Index;

use crate::debug;
use crate::utils::{unescape, unescape_to};

/// How the bytes of a field must be read out of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Escape {
    /// Field can be sliced from the record as-is.
    None,
    /// Field contains quotes that may be doubled and must be folded.
    Doubled,
    /// Field lives in the dialect's decoding scratch buffer, not the record.
    Decoded,
}

/// Boundaries of a field, relative to the start of its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldSpan {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) escape: Escape,
}

impl FieldSpan {
    #[inline(always)]
    pub(crate) fn new(start: usize, end: usize, escape: Escape) -> Self {
        Self { start, end, escape }
    }
}

/// A view of a record into a reader's buffer.
///
/// Fields that can be read as-is are borrowed from the buffer. Only fields
/// whose doubled quotes need folding are copied. Since a view borrows its
/// reader, it cannot survive the next read: use [`RecordView::to_byte_record`]
/// to keep it around.
#[derive(Clone, Copy)]
pub struct RecordView<'r> {
    data: &'r [u8],
    decoded: &'r [u8],
    spans: &'r [FieldSpan],
    quote: u8,
}

impl<'r> RecordView<'r> {
    #[inline]
    pub(crate) fn new(data: &'r [u8], decoded: &'r [u8], spans: &'r [FieldSpan], quote: u8) -> Self {
        Self {
            data,
            decoded,
            spans,
            quote,
        }
    }

    /// Number of fields of the record. An empty line is a record with no
    /// fields.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Returns the underlying byte slice, delimiters, quotes, and record
    /// terminator included.
    #[inline(always)]
    pub fn as_slice(&self) -> &'r [u8] {
        self.data
    }

    /// Returns the nth field, as it is found in the reader's buffer: without
    /// surrounding quotes but with its doubled quotes still doubled.
    #[inline]
    pub fn raw(&self, index: usize) -> Option<&'r [u8]> {
        self.spans.get(index).map(|span| match span.escape {
            Escape::Decoded => &self.decoded[span.start..span.end],
            _ => &self.data[span.start..span.end],
        })
    }

    /// Returns the nth field, if it is not out-of-bounds.
    ///
    /// A [`Cow::Owned`] will be returned if the field actually needed
    /// unescaping, else a [`Cow::Borrowed`] will be returned.
    #[inline]
    pub fn get(&self, index: usize) -> Option<Cow<'r, [u8]>> {
        self.spans.get(index).map(|span| self.field(span))
    }

    #[inline(always)]
    fn field(&self, span: &FieldSpan) -> Cow<'r, [u8]> {
        match span.escape {
            Escape::None => Cow::Borrowed(&self.data[span.start..span.end]),
            Escape::Doubled => unescape(&self.data[span.start..span.end], self.quote),
            Escape::Decoded => Cow::Borrowed(&self.decoded[span.start..span.end]),
        }
    }

    #[inline]
    pub fn iter(&self) -> RecordViewIter<'r> {
        RecordViewIter {
            record: *self,
            current_forward: 0,
            current_backward: self.len(),
        }
    }

    /// Overwrite the given [`ByteRecord`] with this record's fields.
    pub fn read_into(&self, record: &mut ByteRecord) {
        record.clear();

        for span in self.spans {
            match span.escape {
                Escape::None => record.push_field(&self.data[span.start..span.end]),
                Escape::Doubled => {
                    record.push_field_with(|data| {
                        unescape_to(&self.data[span.start..span.end], self.quote, data)
                    });
                }
                Escape::Decoded => record.push_field(&self.decoded[span.start..span.end]),
            }
        }
    }

    /// Converts the view into a proper, owned [`ByteRecord`].
    #[inline]
    pub fn to_byte_record(&self) -> ByteRecord {
        let mut record = ByteRecord::new();
        self.read_into(&mut record);
        record
    }
}

impl fmt::Debug for RecordView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RecordView(")?;

        let mut list = f.debug_list();

        for cell in self.iter() {
            list.entry(&debug::Bytes(&cell));
        }

        list.finish()?;
        write!(f, ")")?;
        Ok(())
    }
}

impl<'r> IntoIterator for RecordView<'r> {
    type IntoIter = RecordViewIter<'r>;
    type Item = Cow<'r, [u8]>;

    #[inline]
    fn into_iter(self) -> RecordViewIter<'r> {
        self.iter()
    }
}

pub struct RecordViewIter<'r> {
    record: RecordView<'r>,
    current_forward: usize,
    current_backward: usize,
}

impl ExactSizeIterator for RecordViewIter<'_> {}

impl<'r> Iterator for RecordViewIter<'r> {
    type Item = Cow<'r, [u8]>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.current_forward == self.current_backward {
            None
        } else {
            let cell = self.record.field(&self.record.spans[self.current_forward]);

            self.current_forward += 1;

            Some(cell)
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let size = self.current_backward - self.current_forward;

        (size, Some(size))
    }

    #[inline]
    fn count(self) -> usize
    where
        Self: Sized,
    {
        self.len()
    }
}

impl DoubleEndedIterator for RecordViewIter<'_> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.current_forward == self.current_backward {
            None
        } else {
            self.current_backward -= 1;

            Some(self.record.field(&self.record.spans[self.current_backward]))
        }
    }
}

/// A view of a record of the text dialect, whose fields are always valid
/// UTF-8.
#[derive(Clone, Copy)]
pub struct TextRecord<'r> {
    data: &'r str,
    spans: &'r [FieldSpan],
}

impl<'r> TextRecord<'r> {
    /// `spans` must fall on char boundaries of `data`, which holds as long as
    /// they were delimited by ASCII bytes.
    #[inline]
    pub(crate) fn new(data: &'r str, spans: &'r [FieldSpan]) -> Self {
        Self { data, spans }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    #[inline(always)]
    pub fn as_str(&self) -> &'r str {
        self.data
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&'r str> {
        self.spans
            .get(index)
            .map(|span| &self.data[span.start..span.end])
    }

    #[inline]
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'r str> + ExactSizeIterator + 'r {
        let data = self.data;
        let spans = self.spans;

        spans.iter().map(move |span| &data[span.start..span.end])
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(String::from).collect()
    }

    pub fn to_byte_record(&self) -> ByteRecord {
        self.iter().collect()
    }
}

impl fmt::Debug for TextRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TextRecord(")?;
        f.debug_list().entries(self.iter()).finish()?;
        write!(f, ")")?;
        Ok(())
    }
}

/// An owned, unescaped representation of a record.
#[derive(Default, Clone, Eq)]
pub struct ByteRecord {
    data: Vec<u8>,
    bounds: Vec<(usize, usize)>,
}

impl ByteRecord {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.bounds.clear();
    }

    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.bounds.truncate(len);

        if let Some((_, end)) = self.bounds.last() {
            self.data.truncate(*end);
        } else {
            self.data.clear();
        }
    }

    /// All fields, concatenated.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn iter(&self) -> ByteRecordIter<'_> {
        ByteRecordIter {
            record: self,
            current_forward: 0,
            current_backward: self.len(),
        }
    }

    #[inline(always)]
    pub fn push_field(&mut self, bytes: &[u8]) {
        self.push_field_with(|data| data.extend_from_slice(bytes));
    }

    /// Push a field whose bytes are written by the given callback.
    #[inline(always)]
    pub(crate) fn push_field_with<F: FnOnce(&mut Vec<u8>)>(&mut self, write: F) {
        let start = self.data.len();
        write(&mut self.data);
        self.bounds.push((start, self.data.len()));
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.bounds
            .get(index)
            .copied()
            .map(|(start, end)| &self.data[start..end])
    }
}

impl PartialEq for ByteRecord {
    fn eq(&self, other: &Self) -> bool {
        if self.bounds.len() != other.bounds.len() {
            return false;
        }

        self.iter()
            .zip(other.iter())
            .all(|(self_cell, other_cell)| self_cell == other_cell)
    }
}

impl Hash for ByteRecord {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());

        for cell in self.iter() {
            state.write(cell);
        }
    }
}

impl Index<usize> for ByteRecord {
    type Output = [u8];

    #[inline]
    fn index(&self, i: usize) -> &[u8] {
        match self.get(i) {
            Some(cell) => cell,
            None => panic!("field index {} is out of bounds ({} fields)", i, self.len()),
        }
    }
}

impl<T: AsRef<[u8]>> Extend<T> for ByteRecord {
    #[inline]
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for x in iter {
            self.push_field(x.as_ref());
        }
    }
}

impl<T: AsRef<[u8]>> FromIterator<T> for ByteRecord {
    #[inline]
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut record = Self::new();
        record.extend(iter);
        record
    }
}

impl<I, T> From<I> for ByteRecord
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    fn from(value: I) -> Self {
        value.into_iter().collect()
    }
}

impl<'r> IntoIterator for &'r ByteRecord {
    type IntoIter = ByteRecordIter<'r>;
    type Item = &'r [u8];

    #[inline]
    fn into_iter(self) -> ByteRecordIter<'r> {
        self.iter()
    }
}

impl fmt::Debug for ByteRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ByteRecord(")?;
        f.debug_list()
            .entries(self.iter().map(debug::Bytes))
            .finish()?;
        write!(f, ")")?;
        Ok(())
    }
}

pub struct ByteRecordIter<'a> {
    record: &'a ByteRecord,
    current_forward: usize,
    current_backward: usize,
}

impl ExactSizeIterator for ByteRecordIter<'_> {}

impl<'a> Iterator for ByteRecordIter<'a> {
    type Item = &'a [u8];

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.current_forward == self.current_backward {
            None
        } else {
            let (start, end) = self.record.bounds[self.current_forward];

            self.current_forward += 1;

            Some(&self.record.data[start..end])
        }
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let size = self.current_backward - self.current_forward;

        (size, Some(size))
    }

    #[inline]
    fn count(self) -> usize
    where
        Self: Sized,
    {
        self.len()
    }
}

impl DoubleEndedIterator for ByteRecordIter<'_> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.current_forward == self.current_backward {
            None
        } else {
            self.current_backward -= 1;

            let (start, end) = self.record.bounds[self.current_backward];

            Some(&self.record.data[start..end])
        }
    }
}
