use super::{run_index::RunIndex, CtxId, LayerStorage, Staged, StorageParams};
use crate::{
    arena::{Arena, ArenaSpan, GrowthStrategy, MemoryBudget},
    m_gram::Payload,
    word_index::WordId,
    LmError,
};
use debug_unsafe::slice::SliceGetter;

#[derive(Clone, Copy, Debug, Default)]
struct Run {
    words: ArenaSpan,
    payloads: ArenaSpan,
    first: u32,
}

#[derive(Debug)]
struct WordArrayLevel {
    words: Arena<WordId>,
    payloads: Arena<Payload>,
    runs: RunIndex<Run>,
}

/// Per context, a sorted run of word ids with a parallel run of payloads,
/// so bisection only touches the word ids. Runs are indexed directly by
/// context id.
#[derive(Debug)]
pub struct ContextWordArrayLayers {
    levels: Vec<WordArrayLevel>,
    growth: GrowthStrategy,
}

impl LayerStorage for ContextWordArrayLayers {
    fn new(max_level: usize, params: StorageParams) -> Self {
        Self {
            levels: (2..=max_level)
                .map(|_| WordArrayLevel {
                    words: Arena::new(params.growth),
                    payloads: Arena::new(params.growth),
                    runs: RunIndex::default(),
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

        array_level.words = Arena::with_capacity(growth, staged.len(), budget)?;
        array_level.payloads = Arena::with_capacity(growth, staged.len(), budget)?;
        let mut runs = Vec::new();
        let mut first = 0;
        for group in staged.chunk_by(|a, b| a.ctx == b.ctx) {
            let words = array_level.words.allocate(group.len(), budget)?;
            let payloads = array_level.payloads.allocate(group.len(), budget)?;
            for (word, s) in array_level.words.get_mut(words).iter_mut().zip(group) {
                *word = s.word;
            }
            for (payload, s) in array_level.payloads.get_mut(payloads).iter_mut().zip(group) {
                *payload = s.payload;
            }
            runs.push((
                group[0].ctx as u32,
                Run {
                    words,
                    payloads,
                    first,
                },
            ));
            first += group.len() as u32;
        }

        array_level.runs = RunIndex::build(runs, budget)?;
        Ok(())
    }

    #[inline]
    fn find(&self, level: usize, ctx: CtxId, word: WordId) -> Option<(CtxId, Payload)> {
        let array_level = self.levels.get_safe_unchecked(level - 2);
        let run = array_level.runs.get(u32::try_from(ctx).ok()?)?;
        let i = array_level.words.get(run.words).binary_search(&word).ok()?;
        Some((
            (run.first + i as u32) as CtxId,
            *array_level.payloads.get(run.payloads).get_safe_unchecked(i),
        ))
    }

    fn allocated_bytes(&self) -> usize {
        self.levels
            .iter()
            .map(|l| {
                l.words.allocated_bytes() + l.payloads.allocated_bytes() + l.runs.allocated_bytes()
            })
            .sum()
    }
}
