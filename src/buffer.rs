use std::mem;

use crate::pool::{self, Pooled};

/// Double-buffered storage a reader refills from its source.
///
/// Bytes between the read cursor (`start`) and the write cursor (`filled`)
/// have been read from the source but not consumed yet. When the front
/// region is full, this unconsumed remainder is moved to the front of the
/// back region and the regions are swapped, so that a record can straddle
/// any number of refills.
pub(crate) struct RefillBuffer {
    front: Pooled<'static, u8>,
    back: Pooled<'static, u8>,
    start: usize,
    filled: usize,
    // Stream offset of `front[0]`
    base: u64,
}

impl RefillBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        let mut front = pool::bytes().get(capacity);
        front.resize(capacity, 0);

        Self {
            front,
            back: pool::bytes().get(capacity),
            start: 0,
            filled: 0,
            base: 0,
        }
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.front.len()
    }

    /// Unconsumed bytes.
    #[inline(always)]
    pub(crate) fn data(&self) -> &[u8] {
        &self.front[self.start..self.filled]
    }

    /// Stream offset of the first unconsumed byte.
    #[inline(always)]
    pub(crate) fn position(&self) -> u64 {
        self.base + self.start as u64
    }

    #[inline(always)]
    pub(crate) fn consume(&mut self, amount: usize) {
        debug_assert!(self.start + amount <= self.filled);

        self.start += amount;
    }

    /// Writable space right after the unconsumed bytes. Never empty.
    pub(crate) fn spare(&mut self) -> &mut [u8] {
        if self.filled == self.front.len() {
            self.make_room();
        }

        &mut self.front[self.filled..]
    }

    fn make_room(&mut self) {
        let remainder = self.filled - self.start;
        let mut capacity = self.capacity();

        if remainder > capacity / 2 {
            capacity *= 2;

            log::debug!(
                "growing buffer to {} bytes to fit a record of at least {} bytes",
                capacity,
                remainder
            );
        }

        self.back.clear();
        self.back.resize(capacity, 0);
        self.back[..remainder].copy_from_slice(&self.front[self.start..self.filled]);

        mem::swap(&mut self.front, &mut self.back);

        self.base += self.start as u64;
        self.start = 0;
        self.filled = remainder;
    }

    /// Bytes freshly written into the spare space, before they are committed.
    #[inline(always)]
    pub(crate) fn uncommitted(&self, amount: usize) -> &[u8] {
        &self.front[self.filled..self.filled + amount]
    }

    #[inline(always)]
    pub(crate) fn commit(&mut self, amount: usize) {
        debug_assert!(self.filled + amount <= self.front.len());

        self.filled += amount;
    }
}
