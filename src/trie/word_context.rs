use super::{
    open_table::OpenTable, run_index::RunIndex, CtxId, LayerStorage, Staged, StorageParams,
};
use crate::{
    arena::{Arena, ArenaSpan, GrowthStrategy, MemoryBudget},
    m_gram::{mix64, Payload},
    word_index::WordId,
    LmError,
};
use ::core::{fmt, marker::PhantomData};
use debug_unsafe::slice::SliceGetter;
use tracing::debug;

/// Decides how the contexts of one word are searched.
pub trait ContextPolicy: fmt::Debug + Send + Sync + 'static {
    fn use_hash(num_contexts: usize, threshold: usize) -> bool;
}

/// Sorted contexts, bisection.
#[derive(Debug)]
pub struct ArrayPolicy;

impl ContextPolicy for ArrayPolicy {
    #[inline(always)]
    fn use_hash(_num_contexts: usize, _threshold: usize) -> bool {
        false
    }
}

#[derive(Debug)]
pub struct HashPolicy;

impl ContextPolicy for HashPolicy {
    #[inline(always)]
    fn use_hash(_num_contexts: usize, _threshold: usize) -> bool {
        true
    }
}

/// Hash tables only for words seen in many contexts.
#[derive(Debug)]
pub struct HybridPolicy;

impl ContextPolicy for HybridPolicy {
    #[inline(always)]
    fn use_hash(num_contexts: usize, threshold: usize) -> bool {
        num_contexts >= threshold
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct CtxPayload {
    ctx: u32,
    payload: Payload,
}

#[derive(Clone, Copy, Debug, Default)]
struct Run {
    span: ArenaSpan,
    /// Unallocated for array runs
    table: OpenTable,
    first: u32,
}

#[derive(Debug)]
struct WordLevel {
    entries: Arena<CtxPayload>,
    slots: Arena<u32>,
    runs: RunIndex<Run>,
}

/// Per final word, the contexts it follows, searched as decided by `P`.
pub struct WordContextLayers<P> {
    levels: Vec<WordLevel>,
    growth: GrowthStrategy,
    hybrid_threshold: usize,
    policy: PhantomData<P>,
}

impl<P> fmt::Debug for WordContextLayers<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WordContextLayers")
            .field("policy", &::core::any::type_name::<P>())
            .field("levels", &self.levels)
            .finish_non_exhaustive()
    }
}

impl<P: ContextPolicy> LayerStorage for WordContextLayers<P> {
    const WORD_MAJOR: bool = true;

    fn new(max_level: usize, params: StorageParams) -> Self {
        Self {
            levels: (2..=max_level)
                .map(|_| WordLevel {
                    entries: Arena::new(params.growth),
                    slots: Arena::new(params.growth),
                    runs: RunIndex::default(),
                })
                .collect(),
            growth: params.growth,
            hybrid_threshold: params.hybrid_threshold,
            policy: PhantomData,
        }
    }

    fn seal(
        &mut self,
        level: usize,
        staged: &[Staged],
        budget: &mut MemoryBudget,
    ) -> Result<(), LmError> {
        let (growth, threshold) = (self.growth, self.hybrid_threshold);
        let word_level = &mut self.levels[level - 2];

        let groups: Vec<_> = staged.chunk_by(|a, b| a.word == b.word).collect();
        let num_slots: usize = groups
            .iter()
            .filter(|g| P::use_hash(g.len(), threshold))
            .map(|g| OpenTable::slots_for(g.len()))
            .sum();
        word_level.entries = Arena::with_capacity(growth, staged.len(), budget)?;
        word_level.slots = Arena::with_capacity(growth, num_slots, budget)?;

        let mut runs = Vec::with_capacity(groups.len());
        let mut first = 0;
        let mut hashed = 0;
        for group in groups {
            let span = word_level.entries.allocate(group.len(), budget)?;
            for (entry, s) in word_level.entries.get_mut(span).iter_mut().zip(group) {
                *entry = CtxPayload {
                    ctx: s.ctx as u32,
                    payload: s.payload,
                };
            }

            let mut table = OpenTable::default();
            if P::use_hash(group.len(), threshold) {
                table = OpenTable::allocate(&mut word_level.slots, group.len(), budget)?;
                for (i, s) in group.iter().enumerate() {
                    table.insert(&mut word_level.slots, mix64(s.ctx), i as u32);
                }
                hashed += 1;
            }
            runs.push((group[0].word, Run { span, table, first }));
            first += group.len() as u32;
        }
        debug!(
            "word context level {level}: {} words, {hashed} hashed",
            runs.len()
        );

        word_level.runs = RunIndex::build(runs, budget)?;
        Ok(())
    }

    #[inline]
    fn find(&self, level: usize, ctx: CtxId, word: WordId) -> Option<(CtxId, Payload)> {
        let word_level = self.levels.get_safe_unchecked(level - 2);
        let ctx = u32::try_from(ctx).ok()?;
        let run = word_level.runs.get(word)?;
        let entries = word_level.entries.get(run.span);
        let i = if run.table.is_allocated() {
            run.table.find(&word_level.slots, mix64(ctx as u64), |i| {
                entries.get_safe_unchecked(i as usize).ctx == ctx
            })? as usize
        } else {
            entries.binary_search_by_key(&ctx, |e| e.ctx).ok()?
        };
        Some((
            (run.first + i as u32) as CtxId,
            entries.get_safe_unchecked(i).payload,
        ))
    }

    fn allocated_bytes(&self) -> usize {
        self.levels
            .iter()
            .map(|l| {
                l.entries.allocated_bytes() + l.slots.allocated_bytes() + l.runs.allocated_bytes()
            })
            .sum()
    }
}
