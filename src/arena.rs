use crate::LmError;
use ::core::mem::size_of;
use debug_unsafe::slice::SliceGetter;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::debug;

/// How much an [`Arena`] grows when its chunks are full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum GrowthKind {
    /// Fixed increments of `min_increment`
    Constant,
    Linear,
    #[default]
    Log2,
    Log10,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrowthStrategy {
    pub kind: GrowthKind,
    pub factor: f32,
    pub min_increment: usize,
}

impl Default for GrowthStrategy {
    #[inline]
    fn default() -> Self {
        Self::new(GrowthKind::default())
    }
}

impl GrowthStrategy {
    #[inline]
    pub const fn new(kind: GrowthKind) -> Self {
        Self {
            kind,
            factor: 1.0,
            min_increment: 1024,
        }
    }

    /// Number of elements to add to an arena holding `capacity` elements.
    pub fn increment(&self, capacity: usize) -> usize {
        let c = capacity.max(16) as f64;
        let f = match self.kind {
            GrowthKind::Constant => 0.0,
            GrowthKind::Linear => c,
            GrowthKind::Log2 => c / c.ln(),
            GrowthKind::Log10 => c / c.log10(),
        };
        self.min_increment.max((self.factor as f64 * f) as usize)
    }
}

/// Tracks bytes allocated by the model against an optional ceiling.
#[derive(Clone, Debug, Default)]
pub struct MemoryBudget {
    limit: Option<usize>,
    used: usize,
}

impl MemoryBudget {
    #[inline]
    pub const fn new(limit: Option<usize>) -> Self {
        Self { limit, used: 0 }
    }

    pub fn charge(&mut self, bytes: usize) -> Result<(), LmError> {
        let used = self.used.saturating_add(bytes);
        if let Some(limit) = self.limit {
            if used > limit {
                return Err(LmError::Capacity {
                    requested: bytes,
                    used: self.used,
                    limit,
                });
            }
        }
        self.used = used;
        Ok(())
    }

    /// Returns bytes of a buffer that was freed.
    #[inline]
    pub fn release(&mut self, bytes: usize) {
        self.used = self.used.saturating_sub(bytes);
    }

    /// Moves the charge of a buffer owned elsewhere from `*charged` to
    /// its current size `bytes`.
    pub fn recharge(&mut self, charged: &mut usize, bytes: usize) -> Result<(), LmError> {
        if bytes > *charged {
            self.charge(bytes - *charged)?;
        } else {
            self.release(*charged - bytes);
        }
        *charged = bytes;
        Ok(())
    }

    pub(crate) fn exceeded(&self, requested: usize) -> LmError {
        LmError::Capacity {
            requested,
            used: self.used,
            limit: self.limit.unwrap_or(usize::MAX),
        }
    }

    /// Charges, then allocates room for `additional` more elements.
    /// A failed allocation is reported as a capacity error.
    pub fn reserve<T>(&mut self, buffer: &mut Vec<T>, additional: usize) -> Result<(), LmError> {
        let old = buffer.capacity();
        let wanted = buffer
            .len()
            .checked_add(additional)
            .ok_or_else(|| self.exceeded(usize::MAX))?;
        if wanted <= old {
            return Ok(());
        }
        let bytes = (wanted - old)
            .checked_mul(size_of::<T>())
            .ok_or_else(|| self.exceeded(usize::MAX))?;
        self.charge(bytes)?;
        if buffer.try_reserve_exact(additional).is_err() {
            self.release(bytes);
            return Err(self.exceeded(bytes));
        }
        self.charge((buffer.capacity() - wanted) * size_of::<T>())
    }

    /// Push onto a build-time buffer, charging its growth.
    #[inline]
    pub fn push<T>(&mut self, buffer: &mut Vec<T>, value: T) -> Result<(), LmError> {
        if buffer.len() == buffer.capacity() {
            self.reserve(buffer, buffer.capacity().max(64))?;
        }
        buffer.push(value);
        Ok(())
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

/// Handle to a contiguous run of elements inside an [`Arena`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArenaSpan {
    chunk: u32,
    offset: u32,
    len: u32,
}

impl ArenaSpan {
    pub const EMPTY: Self = Self {
        chunk: 0,
        offset: 0,
        len: 0,
    };

    #[inline(always)]
    pub fn len(self) -> usize {
        self.len as usize
    }

    #[inline(always)]
    pub fn is_empty(self) -> bool {
        self.len == 0
    }
}

/// Chunked bump allocator. Chunks are never reallocated once created,
/// so spans stay valid for the arena's lifetime.
#[derive(Debug)]
pub struct Arena<T> {
    chunks: Vec<Vec<T>>,
    growth: GrowthStrategy,
    capacity: usize,
    len: usize,
}

impl<T: Copy + Default> Default for Arena<T> {
    #[inline]
    fn default() -> Self {
        Self::new(GrowthStrategy::default())
    }
}

impl<T: Copy + Default> Arena<T> {
    #[inline]
    pub const fn new(growth: GrowthStrategy) -> Self {
        Self {
            chunks: Vec::new(),
            growth,
            capacity: 0,
            len: 0,
        }
    }

    /// Pre-sizes the arena so the next `n` elements fit in one chunk.
    pub fn with_capacity(
        growth: GrowthStrategy,
        n: usize,
        budget: &mut MemoryBudget,
    ) -> Result<Self, LmError> {
        let mut arena = Self::new(growth);
        if n > 0 {
            arena.push_chunk(n, budget)?;
        }
        Ok(arena)
    }

    fn push_chunk(&mut self, min_len: usize, budget: &mut MemoryBudget) -> Result<(), LmError> {
        let chunk_len = if self.chunks.is_empty() {
            min_len
        } else {
            min_len.max(self.growth.increment(self.capacity))
        };
        // spans address chunks and offsets with u32
        if chunk_len > u32::MAX as usize || self.chunks.len() >= u32::MAX as usize {
            return Err(budget.exceeded(chunk_len.saturating_mul(size_of::<T>())));
        }
        let mut chunk = Vec::new();
        budget.reserve(&mut chunk, chunk_len)?;
        debug!(
            "arena chunk #{}: {chunk_len} x {} bytes",
            self.chunks.len(),
            size_of::<T>()
        );

        self.capacity += chunk.capacity();
        self.chunks.push(chunk);
        Ok(())
    }

    /// Returns a span of `n` default-initialised elements.
    pub fn allocate(&mut self, n: usize, budget: &mut MemoryBudget) -> Result<ArenaSpan, LmError> {
        if n == 0 {
            return Ok(ArenaSpan::EMPTY);
        }
        let fits = self
            .chunks
            .last()
            .is_some_and(|chunk| chunk.capacity() - chunk.len() >= n);
        if !fits {
            self.push_chunk(n, budget)?;
        }

        let chunk_idx = self.chunks.len() - 1;
        let chunk = self.chunks.get_safe_unchecked_mut(chunk_idx);
        let offset = chunk.len();
        chunk.resize(offset + n, T::default());
        self.len += n;

        Ok(ArenaSpan {
            chunk: chunk_idx as u32,
            offset: offset as u32,
            len: n as u32,
        })
    }

    pub fn alloc_slice(&mut self, values: &[T], budget: &mut MemoryBudget) -> Result<ArenaSpan, LmError> {
        let span = self.allocate(values.len(), budget)?;
        self.get_mut(span).copy_from_slice(values);
        Ok(span)
    }

    #[inline]
    pub fn get(&self, span: ArenaSpan) -> &[T] {
        if span.is_empty() {
            return &[];
        }
        let offset = span.offset as usize;
        &self.chunks[span.chunk as usize][offset..offset + span.len()]
    }

    #[inline]
    pub fn get_mut(&mut self, span: ArenaSpan) -> &mut [T] {
        if span.is_empty() {
            return &mut [];
        }
        let offset = span.offset as usize;
        &mut self.chunks[span.chunk as usize][offset..offset + span.len()]
    }

    /// Spans are reclaimed only when the whole arena is dropped.
    #[inline(always)]
    pub fn release(&mut self, _span: ArenaSpan) {}

    /// Number of allocated elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        self.capacity * size_of::<T>()
    }
}
