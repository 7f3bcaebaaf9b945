use crate::{arena::MemoryBudget, LmError};
use ::core::mem::size_of;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Maps a key (context id or word id) to its run of entries. Dense when
/// the keys are compact enough to index a vector directly.
#[derive(Debug)]
pub(crate) enum RunIndex<R> {
    Dense(Vec<R>),
    Sparse(FxHashMap<u32, R>),
}

impl<R> Default for RunIndex<R> {
    #[inline]
    fn default() -> Self {
        Self::Dense(Vec::new())
    }
}

impl<R: Copy + Default> RunIndex<R> {
    /// `runs` must be sorted by key.
    pub(crate) fn build(runs: Vec<(u32, R)>, budget: &mut MemoryBudget) -> Result<Self, LmError> {
        let bound = runs.last().map_or(0, |&(key, _)| key as usize + 1);
        if bound <= runs.len() * 2 + 1024 {
            budget.charge(bound * size_of::<R>())?;
            let mut dense = vec![R::default(); bound];
            for (key, run) in runs {
                dense[key as usize] = run;
            }
            Ok(Self::Dense(dense))
        } else {
            debug!("sparse run index: {} runs, key bound {bound}", runs.len());
            budget.charge(runs.len() * (size_of::<u32>() + size_of::<R>()) * 2)?;
            let mut sparse = FxHashMap::with_capacity_and_hasher(runs.len(), Default::default());
            sparse.extend(runs);
            Ok(Self::Sparse(sparse))
        }
    }

    #[inline]
    pub(crate) fn get(&self, key: u32) -> Option<R> {
        match self {
            Self::Dense(runs) => runs.get(key as usize).copied(),
            Self::Sparse(runs) => runs.get(&key).copied(),
        }
    }

    pub(crate) fn allocated_bytes(&self) -> usize {
        match self {
            Self::Dense(runs) => runs.capacity() * size_of::<R>(),
            Self::Sparse(runs) => runs.capacity() * (size_of::<u32>() + size_of::<R>()),
        }
    }
}
