use super::{open_table::OpenTable, CtxId, LayerStorage, Staged, StorageParams};
use crate::{
    arena::{Arena, ArenaSpan, GrowthStrategy, MemoryBudget},
    m_gram::{mix64, szudzik, Payload},
    word_index::WordId,
    LmError,
};
use debug_unsafe::slice::SliceGetter;
use tracing::debug;

#[derive(Clone, Copy, Debug, Default)]
struct Entry {
    ctx: u32,
    word: WordId,
    payload: Payload,
}

#[derive(Debug)]
struct HashLevel {
    entries: Arena<Entry>,
    span: ArenaSpan,
    slots: Arena<u32>,
    table: OpenTable,
}

impl HashLevel {
    fn new(growth: GrowthStrategy) -> Self {
        Self {
            entries: Arena::new(growth),
            span: ArenaSpan::EMPTY,
            slots: Arena::new(growth),
            table: OpenTable::default(),
        }
    }
}

#[inline(always)]
fn key_hash(ctx: u32, word: WordId) -> u64 {
    mix64(szudzik(word as u64, ctx as u64))
}

/// One open-addressed table per level, keyed by the pair of the word
/// and the id of its context. Context ids are entry positions.
#[derive(Debug)]
pub struct ContextHashLayers {
    levels: Vec<HashLevel>,
}

impl LayerStorage for ContextHashLayers {
    fn new(max_level: usize, params: StorageParams) -> Self {
        Self {
            levels: (2..=max_level).map(|_| HashLevel::new(params.growth)).collect(),
        }
    }

    fn seal(
        &mut self,
        level: usize,
        staged: &[Staged],
        budget: &mut MemoryBudget,
    ) -> Result<(), LmError> {
        let hash_level = &mut self.levels[level - 2];

        hash_level.span = hash_level.entries.allocate(staged.len(), budget)?;
        hash_level.table = OpenTable::allocate(&mut hash_level.slots, staged.len(), budget)?;
        let entries = hash_level.entries.get_mut(hash_level.span);
        for (i, (entry, s)) in entries.iter_mut().zip(staged).enumerate() {
            let ctx = s.ctx as u32;
            *entry = Entry {
                ctx,
                word: s.word,
                payload: s.payload,
            };
            hash_level
                .table
                .insert(&mut hash_level.slots, key_hash(ctx, s.word), i as u32);
        }
        debug!(
            "context hash level {level}: {} entries, {} slots",
            staged.len(),
            hash_level.slots.len()
        );
        Ok(())
    }

    #[inline]
    fn find(&self, level: usize, ctx: CtxId, word: WordId) -> Option<(CtxId, Payload)> {
        let hash_level = self.levels.get_safe_unchecked(level - 2);
        let ctx = u32::try_from(ctx).ok()?;
        let entries = hash_level.entries.get(hash_level.span);
        let i = hash_level
            .table
            .find(&hash_level.slots, key_hash(ctx, word), |i| {
                let entry = entries.get_safe_unchecked(i as usize);
                entry.ctx == ctx && entry.word == word
            })?;
        Some((i as CtxId, entries.get_safe_unchecked(i as usize).payload))
    }

    fn allocated_bytes(&self) -> usize {
        self.levels
            .iter()
            .map(|l| l.entries.allocated_bytes() + l.slots.allocated_bytes())
            .sum()
    }
}
