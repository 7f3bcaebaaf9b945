use super::{CtxId, LayerStorage, Staged, StorageParams};
use crate::{
    arena::{Arena, ArenaSpan, GrowthStrategy, MemoryBudget},
    m_gram::Payload,
    word_index::WordId,
    LmError,
};
use ::core::mem::size_of;
use debug_unsafe::slice::SliceGetter;
use rustc_hash::FxHashMap;

#[derive(Clone, Copy, Debug, Default)]
struct WordPayload {
    word: WordId,
    payload: Payload,
}

#[derive(Clone, Copy, Debug, Default)]
struct Run {
    span: ArenaSpan,
    /// Entry id of the run's first word
    first: u32,
}

#[derive(Debug)]
struct ArrayLevel {
    pairs: Arena<WordPayload>,
    runs: FxHashMap<u32, Run>,
}

/// Per context, a run of `(word, payload)` pairs sorted by word and
/// searched by bisection. Contexts are found through a hash map.
#[derive(Debug)]
pub struct ContextArrayLayers {
    levels: Vec<ArrayLevel>,
    growth: GrowthStrategy,
}

impl LayerStorage for ContextArrayLayers {
    fn new(max_level: usize, params: StorageParams) -> Self {
        Self {
            levels: (2..=max_level)
                .map(|_| ArrayLevel {
                    pairs: Arena::new(params.growth),
                    runs: FxHashMap::default(),
                })
                .collect(),
            growth: params.growth,
        }
    }

    fn seal(
        &mut self,
        level: usize,
        staged: &[Staged],
        budget: &mut MemoryBudget,
    ) -> Result<(), LmError> {
        let growth = self.growth;
        let array_level = &mut self.levels[level - 2];

        array_level.pairs = Arena::with_capacity(growth, staged.len(), budget)?;
        let mut runs = Vec::new();
        let mut first = 0;
        for group in staged.chunk_by(|a, b| a.ctx == b.ctx) {
            let span = array_level.pairs.allocate(group.len(), budget)?;
            for (pair, s) in array_level.pairs.get_mut(span).iter_mut().zip(group) {
                *pair = WordPayload {
                    word: s.word,
                    payload: s.payload,
                };
            }
            runs.push((group[0].ctx as u32, Run { span, first }));
            first += group.len() as u32;
        }

        budget.charge(runs.len() * (size_of::<u32>() + size_of::<Run>()) * 2)?;
        array_level.runs = FxHashMap::with_capacity_and_hasher(runs.len(), Default::default());
        array_level.runs.extend(runs);
        Ok(())
    }

    #[inline]
    fn find(&self, level: usize, ctx: CtxId, word: WordId) -> Option<(CtxId, Payload)> {
        let array_level = self.levels.get_safe_unchecked(level - 2);
        let run = array_level.runs.get(&u32::try_from(ctx).ok()?)?;
        let pairs = array_level.pairs.get(run.span);
        let i = pairs.binary_search_by_key(&word, |p| p.word).ok()?;
        Some((
            (run.first + i as u32) as CtxId,
            pairs.get_safe_unchecked(i).payload,
        ))
    }

    fn allocated_bytes(&self) -> usize {
        self.levels
            .iter()
            .map(|l| {
                l.pairs.allocated_bytes() + l.runs.capacity() * (size_of::<u32>() + size_of::<Run>())
            })
            .sum()
    }
}
