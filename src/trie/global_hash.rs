use super::{CtxId, LayerStorage, Staged, StorageParams};
use crate::{
    arena::{Arena, ArenaSpan, GrowthStrategy, MemoryBudget},
    m_gram::{mix64, Payload},
    word_index::WordId,
    LmError,
};
use debug_unsafe::slice::SliceGetter;
use tracing::debug;

/// Slots per entry.
const TABLE_FACTOR: f64 = 2.0;

/// Slot of the flat table. Level 0 marks an empty slot.
#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    ctx: CtxId,
    word: WordId,
    level: u32,
    payload: Payload,
}

/// Context id of `ctx + word`, a hash chain over the whole m-gram.
#[inline(always)]
fn chain(ctx: CtxId, word: WordId) -> CtxId {
    mix64(ctx.wrapping_mul(0x9e3779b97f4a7c15) ^ word as u64)
}

/// A single open-addressed table holding every level, keyed by the hash
/// chain of the m-gram. Contexts are derived without any lookup, so an
/// entry is stored even if its context is not.
#[derive(Debug)]
pub struct GlobalHashLayers {
    growth: GrowthStrategy,
    slots: Arena<Slot>,
    table: ArenaSpan,
    len: usize,
}

impl GlobalHashLayers {
    /// Moves every slot into a fresh table sized for `needed` entries and
    /// frees the old one.
    fn grow(&mut self, needed: usize, budget: &mut MemoryBudget) -> Result<(), LmError> {
        let capacity = ((needed as f64 * TABLE_FACTOR).ceil() as usize)
            .max(2)
            .checked_next_power_of_two()
            .ok_or_else(|| budget.exceeded(usize::MAX))?;
        let mut slots = Arena::with_capacity(self.growth, capacity, budget)?;
        let table = slots.allocate(capacity, budget)?;
        debug!("global hash table: {capacity} slots");

        let mut old_slots = ::core::mem::replace(&mut self.slots, slots);
        let old_table = ::core::mem::replace(&mut self.table, table);
        for &slot in old_slots.get(old_table) {
            if slot.level != 0 {
                self.insert(slot);
            }
        }
        old_slots.release(old_table);
        budget.release(old_slots.allocated_bytes());
        Ok(())
    }

    fn insert(&mut self, slot: Slot) {
        let table = self.slots.get_mut(self.table);
        let mask = table.len() - 1;
        let mut i = chain(slot.ctx, slot.word) as usize & mask;
        loop {
            let current = &mut table[i];
            if current.level == 0 {
                *current = slot;
                return;
            }
            i = (i + 1) & mask;
        }
    }
}

impl LayerStorage for GlobalHashLayers {
    fn new(_max_level: usize, params: StorageParams) -> Self {
        Self {
            growth: params.growth,
            slots: Arena::new(params.growth),
            table: ArenaSpan::EMPTY,
            len: 0,
        }
    }

    fn seal(
        &mut self,
        level: usize,
        staged: &[Staged],
        budget: &mut MemoryBudget,
    ) -> Result<(), LmError> {
        let needed = self.len + staged.len();
        if (needed as f64 * TABLE_FACTOR) > self.table.len() as f64 {
            self.grow(needed, budget)?;
        }

        for s in staged {
            self.insert(Slot {
                ctx: s.ctx,
                word: s.word,
                level: level as u32,
                payload: s.payload,
            });
        }
        self.len = needed;
        Ok(())
    }

    #[inline]
    fn find(&self, level: usize, ctx: CtxId, word: WordId) -> Option<(CtxId, Payload)> {
        let table = self.slots.get(self.table);
        if table.is_empty() {
            return None;
        }
        let mask = table.len() - 1;
        let hash = chain(ctx, word);
        let mut i = hash as usize & mask;
        loop {
            let slot = table.get_safe_unchecked(i);
            if slot.level == 0 {
                return None;
            }
            if slot.ctx == ctx && slot.word == word && slot.level == level as u32 {
                return Some((hash, slot.payload));
            }
            i = (i + 1) & mask;
        }
    }

    #[inline(always)]
    fn extend_context(&self, _level: usize, ctx: CtxId, word: WordId) -> Option<CtxId> {
        Some(chain(ctx, word))
    }

    fn allocated_bytes(&self) -> usize {
        self.slots.allocated_bytes()
    }
}
