//! Shared pools of reusable vectors.
//!
//! Readers check their buffers out of a [`Pool`] and give them back when they
//! are dropped, so that opening many short-lived readers (one per file in a
//! large directory, say) does not hit the allocator for every one of them.
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

/// A thread-safe free-list of `Vec<T>`.
///
/// Retention is bounded: at most `max_retained` vectors are kept, and vectors
/// whose capacity exceeds `max_capacity` are freed instead of being returned.
pub struct Pool<T> {
    free: Mutex<Vec<Vec<T>>>,
    max_retained: usize,
    max_capacity: usize,
}

impl<T> Pool<T> {
    /// Create a new empty pool.
    pub const fn new(max_retained: usize, max_capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_retained,
            max_capacity,
        }
    }

    /// Check out an empty vector with at least `min_capacity` capacity.
    ///
    /// The vector goes back to the pool when the returned guard is dropped.
    pub fn get(&self, min_capacity: usize) -> Pooled<'_, T> {
        let recycled = {
            let mut free = self.free.lock().unwrap_or_else(|err| err.into_inner());

            // Most recently returned vectors come first since they are the
            // most likely to still be warm in cache.
            free.iter()
                .rposition(|vec| vec.capacity() >= min_capacity)
                .map(|i| free.swap_remove(i))
                .or_else(|| free.pop())
        };

        let mut vec = recycled.unwrap_or_default();
        vec.reserve(min_capacity);

        Pooled { vec, pool: self }
    }

    /// Number of vectors currently waiting in the pool.
    pub fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(|err| err.into_inner()).len()
    }

    fn put(&self, mut vec: Vec<T>) {
        if vec.capacity() == 0 {
            return;
        }

        if vec.capacity() > self.max_capacity {
            log::trace!(
                "dropping pooled vector of capacity {} (max retained capacity is {})",
                vec.capacity(),
                self.max_capacity
            );
            return;
        }

        vec.clear();

        let mut free = self.free.lock().unwrap_or_else(|err| err.into_inner());

        if free.len() < self.max_retained {
            free.push(vec);
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Pool")
            .field("available", &self.available())
            .field("max_retained", &self.max_retained)
            .field("max_capacity", &self.max_capacity)
            .finish()
    }
}

/// A vector checked out of a [`Pool`], returned to it on drop.
pub struct Pooled<'p, T> {
    vec: Vec<T>,
    pool: &'p Pool<T>,
}

impl<'p, T> Pooled<'p, T> {
    /// Detach the vector from its pool. It will be freed normally.
    pub fn into_inner(mut self) -> Vec<T> {
        mem::take(&mut self.vec)
    }

    /// The pool this vector will be returned to.
    pub fn pool(&self) -> &'p Pool<T> {
        self.pool
    }
}

impl<T> Deref for Pooled<'_, T> {
    type Target = Vec<T>;

    #[inline(always)]
    fn deref(&self) -> &Vec<T> {
        &self.vec
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.vec
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        self.pool.put(mem::take(&mut self.vec));
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.vec.fmt(f)
    }
}

static BYTES: Pool<u8> = Pool::new(64, 64 * (1 << 20));
static INDICES: Pool<usize> = Pool::new(64, 1 << 20);

/// The process-wide pool reader buffers are taken from.
pub fn bytes() -> &'static Pool<u8> {
    &BYTES
}

/// The process-wide pool [`IndexCollector`](crate::IndexCollector) spill
/// storage is taken from.
pub fn indices() -> &'static Pool<usize> {
    &INDICES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse() {
        let pool: Pool<u8> = Pool::new(4, 1024);

        {
            let mut vec = pool.get(16);
            assert!(vec.capacity() >= 16);
            vec.extend_from_slice(b"hello");
        }

        assert_eq!(pool.available(), 1);

        let vec = pool.get(8);
        assert!(vec.is_empty());
        assert!(vec.capacity() >= 16);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_bounded_retention() {
        let pool: Pool<u8> = Pool::new(2, 64);

        let a = pool.get(8);
        let b = pool.get(8);
        let c = pool.get(8);
        let huge = pool.get(128);

        drop(a);
        drop(b);
        drop(c);
        drop(huge);

        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_into_inner_detaches() {
        let pool: Pool<usize> = Pool::new(4, 64);
        let mut vec = pool.get(4);
        vec.push(3);

        let owned = vec.into_inner();
        assert_eq!(owned, vec![3]);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_shared_across_threads() {
        let pool: &'static Pool<u8> = bytes();

        let handles = (0..4)
            .map(|_| {
                std::thread::spawn(move || {
                    let mut vec = pool.get(32);
                    vec.push(1);
                    vec.len()
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
    }
}
