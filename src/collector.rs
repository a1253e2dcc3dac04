use std::fmt;
use std::ops::Deref;

use crate::pool::{self, Pool, Pooled};

const INLINE_CAPACITY: usize = 16;

/// An ordered, appendable list of positions.
///
/// The first 16 positions are stored inline. Past that, positions spill into
/// a vector taken from a [`Pool`] (the process-wide
/// [`pool::indices`] one by default), which grows by doubling. Calling
/// [`reset`](Self::reset) or dropping the collector gives the spill vector
/// back.
///
/// This is the sink used by [`Searcher::collect_into`](crate::Searcher::collect_into)
/// when every match offset of a chunk must be available at once.
pub struct IndexCollector<'p> {
    inline: [usize; INLINE_CAPACITY],
    len: usize,
    spill: Option<Pooled<'p, usize>>,
    pool: &'p Pool<usize>,
}

impl IndexCollector<'static> {
    pub fn new() -> Self {
        Self::with_pool(pool::indices())
    }
}

impl Default for IndexCollector<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p> IndexCollector<'p> {
    pub fn with_pool(pool: &'p Pool<usize>) -> Self {
        Self {
            inline: [0; INLINE_CAPACITY],
            len: 0,
            spill: None,
            pool,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match &self.spill {
            Some(spill) => spill.len(),
            None => self.len,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether positions have outgrown the inline storage.
    #[inline]
    pub fn has_spilled(&self) -> bool {
        self.spill.is_some()
    }

    #[inline]
    pub fn push(&mut self, index: usize) {
        if let Some(spill) = &mut self.spill {
            if spill.len() == spill.capacity() {
                let additional = spill.len();
                spill.reserve_exact(additional);
            }

            spill.push(index);
            return;
        }

        if self.len < INLINE_CAPACITY {
            self.inline[self.len] = index;
            self.len += 1;
            return;
        }

        let mut spill = self.pool.get(INLINE_CAPACITY * 2);
        spill.extend_from_slice(&self.inline);
        spill.push(index);

        self.spill = Some(spill);
    }

    /// The positions written so far, in insertion order.
    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        match &self.spill {
            Some(spill) => spill,
            None => &self.inline[..self.len],
        }
    }

    #[inline]
    pub fn last(&self) -> Option<usize> {
        self.as_slice().last().copied()
    }

    /// Empty the collector, returning any spill storage to its pool.
    #[inline]
    pub fn reset(&mut self) {
        self.len = 0;
        self.spill = None;
    }
}

impl Deref for IndexCollector<'_> {
    type Target = [usize];

    #[inline]
    fn deref(&self) -> &[usize] {
        self.as_slice()
    }
}

impl Extend<usize> for IndexCollector<'_> {
    fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        for index in iter {
            self.push(index);
        }
    }
}

impl fmt::Debug for IndexCollector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}
