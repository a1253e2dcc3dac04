use std::fmt;
use std::iter::FusedIterator;
use std::sync::OnceLock;

use crate::collector::IndexCollector;

#[cfg(target_arch = "x86_64")]
mod x86_64 {
    use core::arch::x86_64::{
        __m128i, __m256i, _mm256_cmpeq_epi16, _mm256_cmpeq_epi8, _mm256_loadu_si256,
        _mm256_movemask_epi8, _mm256_or_si256, _mm256_sad_epu8, _mm256_set1_epi16,
        _mm256_set1_epi8, _mm256_setzero_si256, _mm256_storeu_si256, _mm256_sub_epi8,
        _mm_cmpeq_epi16, _mm_cmpeq_epi8, _mm_loadu_si128, _mm_movemask_epi8, _mm_or_si128,
        _mm_sad_epu8, _mm_set1_epi16, _mm_set1_epi8, _mm_setzero_si128, _mm_storeu_si128,
        _mm_sub_epi8,
    };

    // Every u16 lane sets two bits in a byte movemask: we keep the low one.
    const U16_KEEP: u64 = 0x5555_5555;

    // Lanes compared before the per-byte counters of `count_*` could overflow.
    const MAX_ACCUMULATED: usize = 255;

    #[inline(always)]
    unsafe fn compare_u8_sse2(chunk: __m128i, v: &[__m128i; 4]) -> __m128i {
        _mm_or_si128(
            _mm_or_si128(_mm_cmpeq_epi8(chunk, v[0]), _mm_cmpeq_epi8(chunk, v[1])),
            _mm_or_si128(_mm_cmpeq_epi8(chunk, v[2]), _mm_cmpeq_epi8(chunk, v[3])),
        )
    }

    #[inline(always)]
    unsafe fn splat_u8_sse2(needles: &[u8; 4]) -> [__m128i; 4] {
        [
            _mm_set1_epi8(needles[0] as i8),
            _mm_set1_epi8(needles[1] as i8),
            _mm_set1_epi8(needles[2] as i8),
            _mm_set1_epi8(needles[3] as i8),
        ]
    }

    pub unsafe fn next_mask_u8_sse2(needles: &[u8; 4], haystack: &[u8], pos: &mut usize) -> u64 {
        const STEP: usize = 16;

        let v = splat_u8_sse2(needles);
        let ptr = haystack.as_ptr();

        while *pos + STEP <= haystack.len() {
            let chunk = _mm_loadu_si128(ptr.add(*pos) as *const __m128i);
            let mask = _mm_movemask_epi8(compare_u8_sse2(chunk, &v)) as u32 as u64;

            *pos += STEP;

            if mask != 0 {
                return mask;
            }
        }

        0
    }

    pub unsafe fn count_u8_sse2(needles: &[u8; 4], haystack: &[u8]) -> (usize, usize) {
        const STEP: usize = 16;

        let v = splat_u8_sse2(needles);
        let ptr = haystack.as_ptr();
        let zero = _mm_setzero_si128();

        let mut count = 0;
        let mut pos = 0;

        while pos + STEP <= haystack.len() {
            let mut acc = _mm_setzero_si128();
            let mut accumulated = 0;

            while accumulated < MAX_ACCUMULATED && pos + STEP <= haystack.len() {
                let chunk = _mm_loadu_si128(ptr.add(pos) as *const __m128i);

                // Matching lanes are 0xff, i.e. -1
                acc = _mm_sub_epi8(acc, compare_u8_sse2(chunk, &v));

                pos += STEP;
                accumulated += 1;
            }

            let mut sums = [0u64; 2];
            _mm_storeu_si128(sums.as_mut_ptr() as *mut __m128i, _mm_sad_epu8(acc, zero));

            count += (sums[0] + sums[1]) as usize;
        }

        (count, pos)
    }

    pub unsafe fn next_mask_u16_sse2(needles: &[u16; 4], haystack: &[u16], pos: &mut usize) -> u64 {
        const STEP: usize = 8;

        let v = [
            _mm_set1_epi16(needles[0] as i16),
            _mm_set1_epi16(needles[1] as i16),
            _mm_set1_epi16(needles[2] as i16),
            _mm_set1_epi16(needles[3] as i16),
        ];
        let ptr = haystack.as_ptr();

        while *pos + STEP <= haystack.len() {
            let chunk = _mm_loadu_si128(ptr.add(*pos) as *const __m128i);
            let cmp = _mm_or_si128(
                _mm_or_si128(_mm_cmpeq_epi16(chunk, v[0]), _mm_cmpeq_epi16(chunk, v[1])),
                _mm_or_si128(_mm_cmpeq_epi16(chunk, v[2]), _mm_cmpeq_epi16(chunk, v[3])),
            );
            let mask = _mm_movemask_epi8(cmp) as u32 as u64 & U16_KEEP;

            *pos += STEP;

            if mask != 0 {
                return mask;
            }
        }

        0
    }

    #[inline(always)]
    unsafe fn compare_u8_avx2(chunk: __m256i, v: &[__m256i; 4]) -> __m256i {
        _mm256_or_si256(
            _mm256_or_si256(_mm256_cmpeq_epi8(chunk, v[0]), _mm256_cmpeq_epi8(chunk, v[1])),
            _mm256_or_si256(_mm256_cmpeq_epi8(chunk, v[2]), _mm256_cmpeq_epi8(chunk, v[3])),
        )
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn next_mask_u8_avx2(needles: &[u8; 4], haystack: &[u8], pos: &mut usize) -> u64 {
        const STEP: usize = 32;

        let v = [
            _mm256_set1_epi8(needles[0] as i8),
            _mm256_set1_epi8(needles[1] as i8),
            _mm256_set1_epi8(needles[2] as i8),
            _mm256_set1_epi8(needles[3] as i8),
        ];
        let ptr = haystack.as_ptr();

        while *pos + STEP <= haystack.len() {
            let chunk = _mm256_loadu_si256(ptr.add(*pos) as *const __m256i);
            let mask = _mm256_movemask_epi8(compare_u8_avx2(chunk, &v)) as u32 as u64;

            *pos += STEP;

            if mask != 0 {
                return mask;
            }
        }

        0
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn count_u8_avx2(needles: &[u8; 4], haystack: &[u8]) -> (usize, usize) {
        const STEP: usize = 32;

        let v = [
            _mm256_set1_epi8(needles[0] as i8),
            _mm256_set1_epi8(needles[1] as i8),
            _mm256_set1_epi8(needles[2] as i8),
            _mm256_set1_epi8(needles[3] as i8),
        ];
        let ptr = haystack.as_ptr();
        let zero = _mm256_setzero_si256();

        let mut count = 0;
        let mut pos = 0;

        while pos + STEP <= haystack.len() {
            let mut acc = _mm256_setzero_si256();
            let mut accumulated = 0;

            while accumulated < MAX_ACCUMULATED && pos + STEP <= haystack.len() {
                let chunk = _mm256_loadu_si256(ptr.add(pos) as *const __m256i);
                acc = _mm256_sub_epi8(acc, compare_u8_avx2(chunk, &v));

                pos += STEP;
                accumulated += 1;
            }

            let mut sums = [0u64; 4];
            _mm256_storeu_si256(sums.as_mut_ptr() as *mut __m256i, _mm256_sad_epu8(acc, zero));

            count += sums.iter().sum::<u64>() as usize;
        }

        (count, pos)
    }

    #[target_feature(enable = "avx2")]
    pub unsafe fn next_mask_u16_avx2(needles: &[u16; 4], haystack: &[u16], pos: &mut usize) -> u64 {
        const STEP: usize = 16;

        let v = [
            _mm256_set1_epi16(needles[0] as i16),
            _mm256_set1_epi16(needles[1] as i16),
            _mm256_set1_epi16(needles[2] as i16),
            _mm256_set1_epi16(needles[3] as i16),
        ];
        let ptr = haystack.as_ptr();

        while *pos + STEP <= haystack.len() {
            let chunk = _mm256_loadu_si256(ptr.add(*pos) as *const __m256i);
            let cmp = _mm256_or_si256(
                _mm256_or_si256(
                    _mm256_cmpeq_epi16(chunk, v[0]),
                    _mm256_cmpeq_epi16(chunk, v[1]),
                ),
                _mm256_or_si256(
                    _mm256_cmpeq_epi16(chunk, v[2]),
                    _mm256_cmpeq_epi16(chunk, v[3]),
                ),
            );
            let mask = _mm256_movemask_epi8(cmp) as u32 as u64 & U16_KEEP;

            *pos += STEP;

            if mask != 0 {
                return mask;
            }
        }

        0
    }
}

#[cfg(target_arch = "aarch64")]
mod aarch64 {
    use core::arch::aarch64::{
        uint16x8_t, uint8x16_t, vceqq_u16, vceqq_u8, vdupq_n_u16, vdupq_n_u8, vget_lane_u64,
        vld1q_u16, vld1q_u8, vorrq_u16, vorrq_u8, vreinterpret_u64_u8, vreinterpretq_u16_u8,
        vshrn_n_u16,
    };

    const STEP_U8: usize = 16;
    const STEP_U16: usize = 8;

    // Four bits per byte, we keep the high one
    #[inline(always)]
    unsafe fn movemask_u8(v: uint8x16_t) -> u64 {
        let narrowed = vshrn_n_u16(vreinterpretq_u16_u8(v), 4);

        vget_lane_u64(vreinterpret_u64_u8(narrowed), 0) & 0x8888_8888_8888_8888
    }

    // Eight bits per u16, we keep the low one
    #[inline(always)]
    unsafe fn movemask_u16(v: uint16x8_t) -> u64 {
        let narrowed = vshrn_n_u16(v, 4);

        vget_lane_u64(vreinterpret_u64_u8(narrowed), 0) & 0x0101_0101_0101_0101
    }

    pub unsafe fn next_mask_u8(needles: &[u8; 4], haystack: &[u8], pos: &mut usize) -> u64 {
        let v = [
            vdupq_n_u8(needles[0]),
            vdupq_n_u8(needles[1]),
            vdupq_n_u8(needles[2]),
            vdupq_n_u8(needles[3]),
        ];
        let ptr = haystack.as_ptr();

        while *pos + STEP_U8 <= haystack.len() {
            let chunk = vld1q_u8(ptr.add(*pos));
            let cmp = vorrq_u8(
                vorrq_u8(vceqq_u8(chunk, v[0]), vceqq_u8(chunk, v[1])),
                vorrq_u8(vceqq_u8(chunk, v[2]), vceqq_u8(chunk, v[3])),
            );
            let mask = movemask_u8(cmp);

            *pos += STEP_U8;

            if mask != 0 {
                return mask;
            }
        }

        0
    }

    pub unsafe fn next_mask_u16(needles: &[u16; 4], haystack: &[u16], pos: &mut usize) -> u64 {
        let v = [
            vdupq_n_u16(needles[0]),
            vdupq_n_u16(needles[1]),
            vdupq_n_u16(needles[2]),
            vdupq_n_u16(needles[3]),
        ];
        let ptr = haystack.as_ptr();

        while *pos + STEP_U16 <= haystack.len() {
            let chunk = vld1q_u16(ptr.add(*pos));
            let cmp = vorrq_u16(
                vorrq_u16(vceqq_u16(chunk, v[0]), vceqq_u16(chunk, v[1])),
                vorrq_u16(vceqq_u16(chunk, v[2]), vceqq_u16(chunk, v[3])),
            );
            let mask = movemask_u16(cmp);

            *pos += STEP_U16;

            if mask != 0 {
                return mask;
            }
        }

        0
    }
}

/// Instruction set used by a [`Searcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimdLevel {
    Scalar,
    Sse2,
    Avx2,
    Neon,
}

impl SimdLevel {
    pub const ALL: [SimdLevel; 4] = [Self::Scalar, Self::Sse2, Self::Avx2, Self::Neon];

    /// Best level supported by the running CPU. Detection only happens once.
    pub fn detect() -> Self {
        static DETECTED: OnceLock<SimdLevel> = OnceLock::new();

        *DETECTED.get_or_init(|| {
            let level = Self::probe();
            log::debug!("searcher will use {} instructions", level.name());
            level
        })
    }

    fn probe() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") {
                Self::Avx2
            } else {
                Self::Sse2
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            Self::Neon
        }

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            Self::Scalar
        }
    }

    pub fn is_supported(self) -> bool {
        match self {
            Self::Scalar => true,
            Self::Sse2 => cfg!(target_arch = "x86_64"),
            Self::Avx2 => {
                #[cfg(target_arch = "x86_64")]
                {
                    is_x86_feature_detected!("avx2")
                }

                #[cfg(not(target_arch = "x86_64"))]
                {
                    false
                }
            }
            Self::Neon => cfg!(target_arch = "aarch64"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Scalar => "none",
            Self::Sse2 => "sse2",
            Self::Avx2 => "avx2",
            Self::Neon => "neon",
        }
    }
}

impl fmt::Display for SimdLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the SIMD instructions set used by this crate's amortized
/// `memchr`-like searcher.
///
/// Note that `memchr` routines, also used by this crate might use
/// different instruction sets.
pub fn searcher_simd_instructions() -> &'static str {
    SimdLevel::detect().name()
}

mod sealed {
    use super::SimdLevel;

    pub trait Sealed: Copy + Eq + Sized {
        /// Elements compared per vector at this level.
        fn lanes(level: SimdLevel) -> usize;

        /// Mask bits per element, as a power of two.
        fn shift(level: SimdLevel) -> u32;

        /// Advance `pos` by whole vectors until one of them matches and
        /// return its (non-zero) mask, `pos` then pointing right after it.
        /// Return 0 when less than a vector remains, `pos` then pointing to
        /// the first element left for a scalar tail.
        fn next_mask(level: SimdLevel, needles: &[Self; 4], haystack: &[Self], pos: &mut usize)
            -> u64;

        /// Count matches over a prefix of whole vectors and return the count
        /// and the length of said prefix.
        fn count_vectorized(
            level: SimdLevel,
            needles: &[Self; 4],
            haystack: &[Self],
        ) -> (usize, usize) {
            super::count_by_masks(level, needles, haystack)
        }
    }
}

use sealed::Sealed;

/// Element type a [`Searcher`] can scan: `u8` or `u16`.
pub trait Element: Sealed + fmt::Debug + Send + Sync + 'static {}

impl Element for u8 {}
impl Element for u16 {}

fn count_by_masks<T: Sealed>(level: SimdLevel, needles: &[T; 4], haystack: &[T]) -> (usize, usize) {
    let mut pos = 0;
    let mut count = 0;

    loop {
        let mask = T::next_mask(level, needles, haystack, &mut pos);

        if mask == 0 {
            return (count, pos);
        }

        count += mask.count_ones() as usize;
    }
}

// NOTE: kernels are only ever called with a level the searcher checked was
// supported by the running CPU.
impl Sealed for u8 {
    #[inline(always)]
    fn lanes(level: SimdLevel) -> usize {
        match level {
            SimdLevel::Avx2 => 32,
            SimdLevel::Sse2 | SimdLevel::Neon => 16,
            SimdLevel::Scalar => 1,
        }
    }

    #[inline(always)]
    fn shift(level: SimdLevel) -> u32 {
        match level {
            SimdLevel::Neon => 2,
            _ => 0,
        }
    }

    #[inline(always)]
    fn next_mask(level: SimdLevel, needles: &[u8; 4], haystack: &[u8], pos: &mut usize) -> u64 {
        match level {
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Sse2 => unsafe { x86_64::next_mask_u8_sse2(needles, haystack, pos) },
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => unsafe { x86_64::next_mask_u8_avx2(needles, haystack, pos) },
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => unsafe { aarch64::next_mask_u8(needles, haystack, pos) },
            _ => 0,
        }
    }

    fn count_vectorized(level: SimdLevel, needles: &[u8; 4], haystack: &[u8]) -> (usize, usize) {
        match level {
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Sse2 => unsafe { x86_64::count_u8_sse2(needles, haystack) },
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => unsafe { x86_64::count_u8_avx2(needles, haystack) },
            _ => count_by_masks(level, needles, haystack),
        }
    }
}

impl Sealed for u16 {
    #[inline(always)]
    fn lanes(level: SimdLevel) -> usize {
        match level {
            SimdLevel::Avx2 => 16,
            SimdLevel::Sse2 | SimdLevel::Neon => 8,
            SimdLevel::Scalar => 1,
        }
    }

    #[inline(always)]
    fn shift(level: SimdLevel) -> u32 {
        match level {
            SimdLevel::Neon => 3,
            SimdLevel::Sse2 | SimdLevel::Avx2 => 1,
            SimdLevel::Scalar => 0,
        }
    }

    #[inline(always)]
    fn next_mask(level: SimdLevel, needles: &[u16; 4], haystack: &[u16], pos: &mut usize) -> u64 {
        match level {
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Sse2 => unsafe { x86_64::next_mask_u16_sse2(needles, haystack, pos) },
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => unsafe { x86_64::next_mask_u16_avx2(needles, haystack, pos) },
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => unsafe { aarch64::next_mask_u16(needles, haystack, pos) },
            _ => 0,
        }
    }
}

/// Finds every position of up to four needles in a haystack of `u8` or
/// `u16` elements.
#[derive(Debug, Clone)]
pub struct Searcher<T: Element = u8> {
    needles: [T; 4],
    level: SimdLevel,
}

impl<T: Element> Searcher<T> {
    /// Build a searcher for the given needles, using the best instructions
    /// available.
    ///
    /// # Panics
    ///
    /// If not given between 1 and 4 needles.
    #[inline]
    pub fn new(needles: &[T]) -> Self {
        Self::with_level(needles, SimdLevel::detect())
    }

    /// Same as [`Searcher::new`] but pinning the instruction set. Levels not
    /// supported by the running CPU fall back to [`SimdLevel::Scalar`].
    pub fn with_level(needles: &[T], level: SimdLevel) -> Self {
        assert!(
            !needles.is_empty() && needles.len() <= 4,
            "a searcher needs between 1 and 4 needles"
        );

        let mut padded = [needles[0]; 4];
        padded[..needles.len()].copy_from_slice(needles);

        Self {
            needles: padded,
            level: if level.is_supported() {
                level
            } else {
                SimdLevel::Scalar
            },
        }
    }

    #[inline(always)]
    pub fn level(&self) -> SimdLevel {
        self.level
    }

    #[inline(always)]
    fn matches(&self, element: T) -> bool {
        element == self.needles[0]
            || element == self.needles[1]
            || element == self.needles[2]
            || element == self.needles[3]
    }

    /// Iterate over the positions of the needles, in ascending order.
    #[inline(always)]
    pub fn search<'s, 'h>(&'s self, haystack: &'h [T]) -> Indices<'s, 'h, T> {
        Indices {
            searcher: self,
            haystack,
            pos: 0,
            base: 0,
            mask: 0,
            vectorized: self.level != SimdLevel::Scalar,
        }
    }

    /// Count the needles in the haystack, without materializing their
    /// positions.
    pub fn count(&self, haystack: &[T]) -> usize {
        let (count, scanned) = T::count_vectorized(self.level, &self.needles, haystack);

        count
            + haystack[scanned..]
                .iter()
                .filter(|element| self.matches(**element))
                .count()
    }

    /// Append the positions of the needles to the given collector.
    pub fn collect_into(&self, haystack: &[T], collector: &mut IndexCollector<'_>) {
        for index in self.search(haystack) {
            collector.push(index);
        }
    }
}

/// Iterator over the positions found by [`Searcher::search`].
#[derive(Debug)]
pub struct Indices<'s, 'h, T: Element = u8> {
    searcher: &'s Searcher<T>,
    haystack: &'h [T],
    pos: usize,
    base: usize,
    mask: u64,
    vectorized: bool,
}

impl<T: Element> FusedIterator for Indices<'_, '_, T> {}

impl<T: Element> Iterator for Indices<'_, '_, T> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let level = self.searcher.level;

        loop {
            // Processing current move mask
            if self.mask != 0 {
                let offset = self.mask.trailing_zeros() >> T::shift(level);
                self.mask &= self.mask - 1;

                return Some(self.base + offset as usize);
            }

            if self.vectorized {
                let mask = T::next_mask(level, &self.searcher.needles, self.haystack, &mut self.pos);

                if mask != 0 {
                    self.base = self.pos - T::lanes(level);
                    self.mask = mask;
                    continue;
                }

                self.vectorized = false;
            }

            // Processing remaining elements linearly
            while self.pos < self.haystack.len() {
                let index = self.pos;
                self.pos += 1;

                if self.searcher.matches(self.haystack[index]) {
                    return Some(index);
                }
            }

            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use memchr::arch::all::memchr::Three;

    static TEST_STRING: &[u8] = b"name,\"surname\",age,color,oper\n,\n,\nation,punctuation\nname,surname,age,color,operation,punctuation";
    static TEST_STRING_OFFSETS: &[usize; 18] = &[
        4, 5, 13, 14, 18, 24, 29, 30, 31, 32, 33, 39, 51, 56, 64, 68, 74, 84,
    ];

    fn supported_levels() -> impl Iterator<Item = SimdLevel> {
        SimdLevel::ALL.into_iter().filter(|level| level.is_supported())
    }

    // Deterministic haystack drawing from a small alphabet so needles are
    // frequent, sometimes adjacent, and sometimes absent for a while.
    fn haystack<T: From<u8>>(len: usize, seed: u32) -> Vec<T> {
        let alphabet = b"ab,\"\n\rxyzw";
        let mut state = seed.wrapping_mul(2654435761).wrapping_add(1);

        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                T::from(alphabet[((state >> 16) % alphabet.len() as u32) as usize])
            })
            .collect()
    }

    fn naive<T: Element>(haystack: &[T], needles: &[T]) -> Vec<usize> {
        haystack
            .iter()
            .enumerate()
            .filter_map(|(i, e)| needles.contains(e).then_some(i))
            .collect()
    }

    #[test]
    fn test_searcher() {
        fn split(haystack: &[u8]) -> Vec<usize> {
            let searcher = Searcher::new(&[b',', b'"', b'\n']);
            searcher.search(haystack).collect()
        }

        let offsets = split(TEST_STRING);
        assert_eq!(offsets, TEST_STRING_OFFSETS);

        // Not found at all
        assert!(split("b".repeat(75).as_bytes()).is_empty());

        // Regular
        assert_eq!(split("b,".repeat(75).as_bytes()).len(), 75);

        // Exactly 64
        assert_eq!(split("b,".repeat(64).as_bytes()).len(), 64);

        // Less than 32
        assert_eq!(split("b,".repeat(25).as_bytes()).len(), 25);

        // Less than 16
        assert_eq!(split("b,".repeat(13).as_bytes()).len(), 13);

        // Complex input
        let complex = b"name,surname,age\n\"john\",\"landy, the \"\"everlasting\"\" bastard\",45\nlucy,rose,\"67\"\njermaine,jackson,\"89\"\n\nkarine,loucan,\"52\"\nrose,\"glib\",12\n\"guillaume\",\"plique\",\"42\"\r\n";
        let complex_indices = split(complex);

        assert!(complex_indices
            .iter()
            .copied()
            .all(|c| complex[c] == b',' || complex[c] == b'\n' || complex[c] == b'"'));

        assert_eq!(
            complex_indices,
            Three::new(b',', b'\n', b'"')
                .iter(complex)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_every_level_and_length_u8() {
        let needle_sets: [&[u8]; 4] = [b",", b",\"", b",\"\n", b",\"\n\r"];

        for level in supported_levels() {
            for needles in needle_sets {
                let searcher = Searcher::with_level(needles, level);

                for len in 0..300 {
                    let haystack = haystack::<u8>(len, len as u32);
                    let expected = naive(&haystack, needles);

                    assert_eq!(
                        searcher.search(&haystack).collect::<Vec<_>>(),
                        expected,
                        "level={} len={}",
                        level,
                        len
                    );
                    assert_eq!(searcher.count(&haystack), expected.len());
                }
            }
        }
    }

    #[test]
    fn test_every_level_and_length_u16() {
        let needles: [u16; 3] = [b',' as u16, b'\n' as u16, 0x2028];

        for level in supported_levels() {
            let searcher = Searcher::with_level(&needles, level);

            for len in 0..200 {
                let mut haystack = haystack::<u16>(len, len as u32 + 7);

                // Make sure the high byte participates in comparisons
                for (i, element) in haystack.iter_mut().enumerate() {
                    if i % 7 == 3 {
                        *element = 0x2028;
                    } else if i % 11 == 5 {
                        *element = 0x2c00;
                    }
                }

                let expected = naive(&haystack, &needles);

                assert_eq!(
                    searcher.search(&haystack).collect::<Vec<_>>(),
                    expected,
                    "level={} len={}",
                    level,
                    len
                );
                assert_eq!(searcher.count(&haystack), expected.len());
            }
        }
    }

    #[test]
    fn test_count_large() {
        // Large enough to force several accumulator flushes
        let haystack = b",,,,".repeat(10_000);

        for level in supported_levels() {
            let searcher = Searcher::with_level(b",", level);
            assert_eq!(searcher.count(&haystack), haystack.len());
            assert_eq!(searcher.search(&haystack).count(), haystack.len());
        }
    }

    #[test]
    fn test_collect_into() {
        let searcher = Searcher::new(b",\n");
        let mut collector = IndexCollector::new();

        searcher.collect_into(TEST_STRING, &mut collector);

        assert_eq!(collector.as_slice(), naive(TEST_STRING, b",\n"));

        let repeated = TEST_STRING.repeat(3);
        collector.reset();
        searcher.collect_into(&repeated, &mut collector);

        assert!(collector.has_spilled());
        assert_eq!(collector.len(), searcher.count(&repeated));
    }

    #[test]
    fn test_level_fallback() {
        for level in SimdLevel::ALL {
            let searcher = Searcher::with_level(b",", level);

            if level.is_supported() {
                assert_eq!(searcher.level(), level);
            } else {
                assert_eq!(searcher.level(), SimdLevel::Scalar);
            }
        }

        assert!(SimdLevel::detect().is_supported());
        assert_eq!(searcher_simd_instructions(), SimdLevel::detect().name());
    }

    #[test]
    #[should_panic]
    fn test_too_many_needles() {
        Searcher::new(b"abcde");
    }
}
