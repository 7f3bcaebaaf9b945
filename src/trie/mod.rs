mod context_array;
mod context_hash;
mod context_word_array;
mod global_hash;
mod open_table;
mod query;
mod run_index;
mod word_context;

#[cfg(test)]
mod tests;

pub use context_array::ContextArrayLayers;
pub use context_hash::ContextHashLayers;
pub use context_word_array::ContextWordArrayLayers;
pub use global_hash::GlobalHashLayers;
pub use word_context::{ArrayPolicy, ContextPolicy, HashPolicy, HybridPolicy, WordContextLayers};

use crate::{
    arena::{GrowthStrategy, MemoryBudget},
    bitmap_cache::BitmapHashCache,
    level::{LevelStates, LevelStatesTrait, MAX_LEVEL},
    m_gram::{hash_words, MGramId, Payload},
    word_index::{WordId, UNKNOWN_WORD_ID},
    LmConfig, LmError,
};
use ::core::{fmt, mem::size_of};
use arrayvec::ArrayVec;
use rustc_hash::FxHashMap;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::{info, warn};

/// Identifies an m-gram as the context of the next level.
/// For unigrams it is the word id.
pub type CtxId = u64;

#[derive(Clone, Copy, Debug)]
pub struct StorageParams {
    pub growth: GrowthStrategy,
    pub hybrid_threshold: usize,
}

/// Build-time entries of one level are at most pre-sized to this many,
/// header counts above it only grow the buffer as lines arrive.
pub(crate) const MAX_PRE_SIZE: usize = 1 << 20;

/// Storage of levels 2 and above. Entries of a level are handed over
/// at once by [`seal`](LayerStorage::seal) and become visible to
/// [`find`](LayerStorage::find).
pub trait LayerStorage: fmt::Debug + Send + Sync {
    /// Entries come sorted by word then context instead of context then word.
    const WORD_MAJOR: bool = false;

    fn new(max_level: usize, params: StorageParams) -> Self
    where
        Self: Sized;

    /// `entries` are sorted and hold no duplicate m-grams.
    fn seal(&mut self, level: usize, entries: &[Staged], budget: &mut MemoryBudget)
        -> Result<(), LmError>;

    /// The entry's own context id and payload.
    fn find(&self, level: usize, ctx: CtxId, word: WordId) -> Option<(CtxId, Payload)>;

    /// Context id of the m-gram `ctx + word`, `None` if it is not stored.
    #[inline]
    fn extend_context(&self, level: usize, ctx: CtxId, word: WordId) -> Option<CtxId> {
        self.find(level, ctx, word).map(|(ctx, _)| ctx)
    }

    fn allocated_bytes(&self) -> usize;
}

/// An m-gram waiting for its level to be sealed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Staged {
    pub ctx: CtxId,
    pub word: WordId,
    pub payload: Payload,
    /// [`hash_words`] of the whole m-gram
    pub hash: u64,
}

/// Build-time buffer of one level, charged to the budget as it grows.
#[derive(Debug, Default)]
pub(crate) struct StagedLevel {
    entries: Vec<Staged>,
}

impl StagedLevel {
    #[inline]
    pub(crate) fn reserve(&mut self, n: usize, budget: &mut MemoryBudget) -> Result<(), LmError> {
        budget.reserve(&mut self.entries, n.min(MAX_PRE_SIZE))
    }

    #[inline]
    pub(crate) fn push(&mut self, entry: Staged, budget: &mut MemoryBudget) -> Result<(), LmError> {
        budget.push(&mut self.entries, entry)
    }

    /// Sorts the staged entries in place by context then word, or by word
    /// then context if `word_major`. Of duplicate m-grams the last added one
    /// is kept.
    pub(crate) fn sort_dedup(&mut self, word_major: bool) -> &[Staged] {
        let key = move |e: &Staged| {
            if word_major {
                (e.word as CtxId, e.ctx)
            } else {
                (e.ctx, e.word as CtxId)
            }
        };
        sort_staged(&mut self.entries, key);
        self.entries.dedup_by(|later, kept| {
            let duplicate = key(&*later) == key(&*kept);
            if duplicate {
                *kept = *later;
            }
            duplicate
        });
        &self.entries
    }

    /// Frees the buffer and returns its bytes to the budget.
    pub(crate) fn release(&mut self, budget: &mut MemoryBudget) {
        budget.release(self.entries.capacity() * size_of::<Staged>());
        self.entries = Vec::new();
    }
}

#[cfg(not(target_family = "wasm"))]
fn sort_staged(entries: &mut [Staged], key: impl Fn(&Staged) -> (CtxId, CtxId) + Sync) {
    use rayon::slice::ParallelSliceMut;
    entries.par_sort_by_key(key);
}

#[cfg(target_family = "wasm")]
fn sort_staged(entries: &mut [Staged], key: impl Fn(&Staged) -> (CtxId, CtxId)) {
    entries.sort_by_key(key);
}

#[derive(Debug)]
enum Unigrams {
    /// Indexed by word id
    Dense(Vec<Option<Payload>>),
    Sparse(FxHashMap<WordId, Payload>),
}

impl Unigrams {
    #[inline]
    fn get(&self, word: WordId) -> Option<Payload> {
        match self {
            Self::Dense(payloads) => payloads.get(word as usize).copied().flatten(),
            Self::Sparse(payloads) => payloads.get(&word).copied(),
        }
    }

    fn insert(&mut self, word: WordId, payload: Payload) {
        match self {
            Self::Dense(payloads) => {
                let i = word as usize;
                if i >= payloads.len() {
                    payloads.resize(i + 1, None);
                }
                payloads[i] = Some(payload);
            }
            Self::Sparse(payloads) => {
                payloads.insert(word, payload);
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Dense(payloads) => payloads.iter().filter(|p| p.is_some()).count(),
            Self::Sparse(payloads) => payloads.len(),
        }
    }

    fn allocated_bytes(&self) -> usize {
        match self {
            Self::Dense(payloads) => payloads.capacity() * size_of::<Option<Payload>>(),
            Self::Sparse(payloads) => {
                payloads.capacity() * (size_of::<WordId>() + size_of::<Payload>())
            }
        }
    }
}

/// Level bookkeeping shared by all trie variants: unigrams, the unknown
/// word payload, staged entries, bitmap caches and level states. Sealed
/// levels 2 and above are stored by `S`.
#[derive(Debug)]
pub struct LayeredTrie<S> {
    unigrams: Unigrams,
    unk: Payload,
    unk_word_prob: f32,
    staged: ArrayVec<StagedLevel, MAX_LEVEL>,
    caches: ArrayVec<BitmapHashCache, MAX_LEVEL>,
    bitmap_bucket_factor: f32,
    states: LevelStates,
    counts: ArrayVec<usize, MAX_LEVEL>,
    layers: S,
    budget: MemoryBudget,
}

impl<S: LayerStorage> LayeredTrie<S> {
    pub fn new(max_level: usize, config: &LmConfig) -> Self {
        let params = StorageParams {
            growth: config.arena_growth,
            hybrid_threshold: config.hybrid_threshold,
        };
        let states = LevelStates::new_building(max_level);
        Self {
            unigrams: Unigrams::Dense(Vec::new()),
            unk: Payload::prob_only(config.unk_word_prob),
            unk_word_prob: config.unk_word_prob,
            staged: (0..max_level).map(|_| StagedLevel::default()).collect(),
            caches: (0..max_level).map(|_| BitmapHashCache::default()).collect(),
            bitmap_bucket_factor: config.bitmap_bucket_factor,
            states,
            counts: (0..max_level).map(|_| 0).collect(),
            layers: S::new(max_level, params),
            budget: MemoryBudget::new(config.memory_limit),
        }
    }

    #[inline(always)]
    pub fn max_level(&self) -> usize {
        self.states.len()
    }

    /// Pre-sizes unigram storage and staging buffers from expected counts.
    /// Unigrams are stored densely when word ids are contiguous.
    ///
    /// Counts are hints: every buffer is charged to the budget first, and
    /// staging buffers are capped so an inflated count can't reserve memory
    /// the model will never use.
    pub fn pre_allocate(&mut self, counts: &[usize], continuous_ids: bool) -> Result<(), LmError> {
        assert_eq!(counts.len(), self.max_level(), "one count per level expected");
        let unigrams = counts[0];
        if continuous_ids {
            let mut payloads = Vec::new();
            self.budget.reserve(
                &mut payloads,
                unigrams.saturating_add(UNKNOWN_WORD_ID as usize + 1),
            )?;
            self.unigrams = Unigrams::Dense(payloads);
        } else {
            let bytes = unigrams.saturating_mul(size_of::<WordId>() + size_of::<Payload>());
            self.budget.charge(bytes)?;
            let mut payloads = FxHashMap::default();
            if payloads.try_reserve(unigrams).is_err() {
                self.budget.release(bytes);
                return Err(self.budget.exceeded(bytes));
            }
            self.unigrams = Unigrams::Sparse(payloads);
        }

        for (staged, &count) in self.staged.iter_mut().zip(counts).skip(1) {
            staged.reserve(count, &mut self.budget)?;
        }
        Ok(())
    }

    /// Build-time insert. Duplicates overwrite the earlier payload.
    ///
    /// Panics if the level is sealed or the previous level is not.
    pub fn add(&mut self, m_gram: &MGramId, payload: Payload) -> Result<(), LmError> {
        let level = m_gram.level();
        assert!(
            level <= self.max_level(),
            "m-gram level {level} exceeds max level {}",
            self.max_level()
        );
        assert!(!self.states.is_sealed(level), "level {level} is sealed");
        if level == 1 {
            self.unigrams.insert(m_gram.last_word(), payload);
            return Ok(());
        }
        assert!(
            self.states.is_sealed(level - 1),
            "level {} must be sealed before adding level {level}",
            level - 1
        );

        let ctx = self
            .context_id(m_gram.context())
            .ok_or(LmError::MissingContext { level, line: 0 })?;
        let payload = if level == self.max_level() {
            Payload::prob_only(payload.prob)
        } else {
            payload
        };
        let entry = Staged {
            ctx,
            word: m_gram.last_word(),
            payload,
            hash: m_gram.hash_value(),
        };
        self.staged[level - 1].push(entry, &mut self.budget)
    }

    /// Hands the staged entries of `level` to the storage and sizes its
    /// bitmap cache from the number of distinct entries.
    ///
    /// Panics if levels are sealed out of order.
    pub fn seal_level(&mut self, level: usize) -> Result<(), LmError> {
        self.states.seal(level);
        let count = if level == 1 {
            self.unk = match self.unigrams.get(UNKNOWN_WORD_ID) {
                Some(payload) => payload,
                None => {
                    warn!(
                        "model has no <unk> unigram, using log10 prob {}",
                        self.unk_word_prob
                    );
                    Payload::prob_only(self.unk_word_prob)
                }
            };
            self.unigrams.len()
        } else {
            let staged = &mut self.staged[level - 1];
            let entries = staged.sort_dedup(S::WORD_MAJOR);
            let cache = &mut self.caches[level - 1];
            cache.pre_allocate(entries.len(), self.bitmap_bucket_factor, &mut self.budget)?;
            for entry in entries {
                cache.mark_present(entry.hash);
            }
            self.layers.seal(level, entries, &mut self.budget)?;
            let count = entries.len();
            staged.release(&mut self.budget);
            count
        };
        self.counts[level - 1] = count;
        info!("level {level} sealed: {count} m-grams");
        Ok(())
    }

    #[inline]
    pub fn is_level_sealed(&self, level: usize) -> bool {
        self.states.is_sealed(level)
    }

    /// Distinct m-grams of a sealed level.
    #[inline]
    pub fn level_len(&self, level: usize) -> usize {
        self.counts[level - 1]
    }

    #[inline]
    pub fn unk_payload(&self) -> Payload {
        self.unk
    }

    #[inline]
    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    /// For memory owned outside the trie, e.g. the word index.
    #[inline]
    pub(crate) fn budget_mut(&mut self) -> &mut MemoryBudget {
        &mut self.budget
    }

    #[inline]
    pub fn get_payload(&self, m_gram: &MGramId) -> Option<Payload> {
        self.payload_of(m_gram.words())
    }

    /// Exact lookup of an m-gram given as word ids.
    pub fn payload_of(&self, words: &[WordId]) -> Option<Payload> {
        assert!(!words.is_empty(), "no m-gram to look up");
        let level = words.len();
        if level == 1 {
            return self.unigrams.get(words[0]);
        }
        debug_assert!(self.states.is_sealed(level), "level {level} is not sealed");
        if !self.caches[level - 1].may_be_present(hash_words(words)) {
            return None;
        }
        let ctx = self.context_id(&words[..level - 1])?;
        self.layers
            .find(level, ctx, words[level - 1])
            .map(|(_, payload)| payload)
    }

    /// Whether the bitmap cache lets a lookup of `words` through.
    #[inline]
    pub fn may_be_present(&self, words: &[WordId]) -> bool {
        match words.len() {
            1 => true,
            level => self.caches[level - 1].may_be_present(hash_words(words)),
        }
    }

    #[inline]
    pub(crate) fn unigram_or_unk(&self, word: WordId) -> Payload {
        self.unigrams.get(word).unwrap_or(self.unk)
    }

    fn context_id(&self, words: &[WordId]) -> Option<CtxId> {
        let (&first, rest) = words.split_first()?;
        let mut ctx = first as CtxId;
        for (i, &word) in rest.iter().enumerate() {
            ctx = self.layers.extend_context(i + 2, ctx, word)?;
        }
        Some(ctx)
    }

    pub fn allocated_bytes(&self) -> usize {
        self.unigrams.allocated_bytes()
            + self.caches.iter().map(BitmapHashCache::allocated_bytes).sum::<usize>()
            + self.layers.allocated_bytes()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum TrieKind {
    ContextArray,
    #[default]
    ContextHash,
    ContextWordArray,
    WordContextArray,
    WordContextHash,
    WordContextHybrid,
    GlobalHash,
}

#[derive(Debug)]
pub enum TrieStore {
    ContextArray(LayeredTrie<ContextArrayLayers>),
    ContextHash(LayeredTrie<ContextHashLayers>),
    ContextWordArray(LayeredTrie<ContextWordArrayLayers>),
    WordContextArray(LayeredTrie<WordContextLayers<ArrayPolicy>>),
    WordContextHash(LayeredTrie<WordContextLayers<HashPolicy>>),
    WordContextHybrid(LayeredTrie<WordContextLayers<HybridPolicy>>),
    GlobalHash(LayeredTrie<GlobalHashLayers>),
}

macro_rules! dispatch {
    ($self:ident, $trie:ident => $body:expr) => {
        match $self {
            TrieStore::ContextArray($trie) => $body,
            TrieStore::ContextHash($trie) => $body,
            TrieStore::ContextWordArray($trie) => $body,
            TrieStore::WordContextArray($trie) => $body,
            TrieStore::WordContextHash($trie) => $body,
            TrieStore::WordContextHybrid($trie) => $body,
            TrieStore::GlobalHash($trie) => $body,
        }
    };
}

impl TrieStore {
    pub fn new(kind: TrieKind, max_level: usize, config: &LmConfig) -> Self {
        match kind {
            TrieKind::ContextArray => Self::ContextArray(LayeredTrie::new(max_level, config)),
            TrieKind::ContextHash => Self::ContextHash(LayeredTrie::new(max_level, config)),
            TrieKind::ContextWordArray => {
                Self::ContextWordArray(LayeredTrie::new(max_level, config))
            }
            TrieKind::WordContextArray => {
                Self::WordContextArray(LayeredTrie::new(max_level, config))
            }
            TrieKind::WordContextHash => Self::WordContextHash(LayeredTrie::new(max_level, config)),
            TrieKind::WordContextHybrid => {
                Self::WordContextHybrid(LayeredTrie::new(max_level, config))
            }
            TrieKind::GlobalHash => Self::GlobalHash(LayeredTrie::new(max_level, config)),
        }
    }

    pub fn kind(&self) -> TrieKind {
        match self {
            Self::ContextArray(_) => TrieKind::ContextArray,
            Self::ContextHash(_) => TrieKind::ContextHash,
            Self::ContextWordArray(_) => TrieKind::ContextWordArray,
            Self::WordContextArray(_) => TrieKind::WordContextArray,
            Self::WordContextHash(_) => TrieKind::WordContextHash,
            Self::WordContextHybrid(_) => TrieKind::WordContextHybrid,
            Self::GlobalHash(_) => TrieKind::GlobalHash,
        }
    }

    #[inline]
    pub fn max_level(&self) -> usize {
        dispatch!(self, trie => trie.max_level())
    }

    #[inline]
    pub fn pre_allocate(&mut self, counts: &[usize], continuous_ids: bool) -> Result<(), LmError> {
        dispatch!(self, trie => trie.pre_allocate(counts, continuous_ids))
    }

    #[inline]
    pub fn add(&mut self, m_gram: &MGramId, payload: Payload) -> Result<(), LmError> {
        dispatch!(self, trie => trie.add(m_gram, payload))
    }

    #[inline]
    pub fn seal_level(&mut self, level: usize) -> Result<(), LmError> {
        dispatch!(self, trie => trie.seal_level(level))
    }

    #[inline]
    pub fn is_level_sealed(&self, level: usize) -> bool {
        dispatch!(self, trie => trie.is_level_sealed(level))
    }

    #[inline]
    pub fn level_len(&self, level: usize) -> usize {
        dispatch!(self, trie => trie.level_len(level))
    }

    #[inline]
    pub fn unk_payload(&self) -> Payload {
        dispatch!(self, trie => trie.unk_payload())
    }

    #[inline]
    pub fn budget(&self) -> &MemoryBudget {
        dispatch!(self, trie => trie.budget())
    }

    #[inline]
    pub(crate) fn budget_mut(&mut self) -> &mut MemoryBudget {
        dispatch!(self, trie => trie.budget_mut())
    }

    #[inline]
    pub fn get_payload(&self, m_gram: &MGramId) -> Option<Payload> {
        dispatch!(self, trie => trie.get_payload(m_gram))
    }

    #[inline]
    pub fn payload_of(&self, words: &[WordId]) -> Option<Payload> {
        dispatch!(self, trie => trie.payload_of(words))
    }

    #[inline]
    pub fn may_be_present(&self, words: &[WordId]) -> bool {
        dispatch!(self, trie => trie.may_be_present(words))
    }

    /// Back-off log10 probability of the last word given the preceding ones.
    #[inline]
    pub fn log_prob(&self, words: &[WordId]) -> f32 {
        dispatch!(self, trie => trie.log_prob(words))
    }

    #[inline]
    pub fn allocated_bytes(&self) -> usize {
        dispatch!(self, trie => trie.allocated_bytes())
    }
}
