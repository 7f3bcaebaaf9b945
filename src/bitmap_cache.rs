use crate::{arena::MemoryBudget, LmError};
use ::core::mem::size_of;
use debug_unsafe::slice::SliceGetter;

/// One bit per bucket. A clear bit proves the m-gram is absent,
/// a set bit only means it may be present.
///
/// An unallocated cache answers "maybe" for every hash.
#[derive(Clone, Debug, Default)]
pub struct BitmapHashCache {
    words: Vec<u64>,
    mask: u64,
}

impl BitmapHashCache {
    /// Sizes the cache to the next power of two of `factor * expected` buckets.
    pub fn pre_allocate(
        &mut self,
        expected: usize,
        factor: f32,
        budget: &mut MemoryBudget,
    ) -> Result<(), LmError> {
        assert!(factor >= 1.0, "bitmap bucket factor {factor} is below 1");
        if expected == 0 {
            budget.release(self.allocated_bytes());
            *self = Self::default();
            return Ok(());
        }

        let buckets = ((expected as f64 * factor as f64).ceil() as usize)
            .max(64)
            .checked_next_power_of_two()
            .ok_or_else(|| budget.exceeded(usize::MAX))?;
        let len = buckets / 64;
        budget.release(self.allocated_bytes());
        *self = Self::default();

        let mut words = Vec::new();
        budget.reserve(&mut words, len)?;
        words.resize(len, 0);
        self.words = words;
        self.mask = buckets as u64 - 1;
        Ok(())
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        !self.words.is_empty()
    }

    #[inline]
    pub fn num_buckets(&self) -> usize {
        self.words.len() * 64
    }

    #[inline]
    pub fn mark_present(&mut self, hash: u64) {
        if self.is_allocated() {
            let bucket = hash & self.mask;
            *self.words.get_safe_unchecked_mut((bucket >> 6) as usize) |= 1 << (bucket & 63);
        }
    }

    #[inline]
    pub fn may_be_present(&self, hash: u64) -> bool {
        if !self.is_allocated() {
            return true;
        }
        let bucket = hash & self.mask;
        self.words.get_safe_unchecked((bucket >> 6) as usize) & (1 << (bucket & 63)) != 0
    }

    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.words.capacity() * size_of::<u64>()
    }
}
