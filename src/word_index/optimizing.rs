use super::{
    BasicWordIndex, CountingWordIndex, WordId, WordIndex, UNDEFINED_WORD_ID, UNKNOWN_WORD_ID,
};
use crate::m_gram::mix64;
use ::core::{hash::Hasher, mem::size_of};
use compact_str::CompactString;
use debug_unsafe::slice::SliceGetter;
use rustc_hash::FxHasher;
use tracing::info;

const BUCKETS_FACTOR: f64 = 2.0;

/// A [`CountingWordIndex`] that is laid out into a flat open-addressed
/// table on [`finalize`](WordIndex::finalize). Lookups then scan the
/// table linearly instead of going through a hash map.
#[derive(Debug)]
pub struct OptimizingWordIndex {
    building: Option<CountingWordIndex>,
    /// Word ids, [`UNDEFINED_WORD_ID`] marks an empty bucket
    buckets: Vec<WordId>,
    words: Vec<CompactString>,
}

impl Default for OptimizingWordIndex {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizingWordIndex {
    #[inline]
    pub fn new() -> Self {
        Self {
            building: Some(CountingWordIndex::new()),
            buckets: Vec::new(),
            words: Vec::new(),
        }
    }

    #[inline]
    fn bucket_of(word: &str, mask: usize) -> usize {
        let mut hasher = FxHasher::default();
        hasher.write(word.as_bytes());
        mix64(hasher.finish()) as usize & mask
    }

    #[inline]
    fn building(&self) -> &CountingWordIndex {
        match &self.building {
            Some(index) => index,
            None => panic!("optimizing word index is finalized"),
        }
    }

    #[inline]
    fn building_mut(&mut self) -> &mut CountingWordIndex {
        match &mut self.building {
            Some(index) => index,
            None => panic!("optimizing word index is finalized"),
        }
    }

    fn lay_out(&mut self, index: BasicWordIndex) {
        let words = index.into_words();
        let num_buckets = ((words.len() as f64 * BUCKETS_FACTOR).ceil() as usize)
            .max(2)
            .next_power_of_two();
        let mask = num_buckets - 1;
        let mut buckets = vec![UNDEFINED_WORD_ID; num_buckets];

        for (id, word) in words.iter().enumerate().skip(UNKNOWN_WORD_ID as usize) {
            let mut bucket = Self::bucket_of(word, mask);
            while buckets[bucket] != UNDEFINED_WORD_ID {
                bucket = (bucket + 1) & mask;
            }
            buckets[bucket] = id as WordId;
        }
        info!(
            "optimizing word index: {} words in {num_buckets} buckets",
            words.len() - 1
        );

        self.buckets = buckets;
        self.words = words;
    }

    #[inline]
    fn is_finalized(&self) -> bool {
        self.building.is_none()
    }
}

impl WordIndex for OptimizingWordIndex {
    #[inline]
    fn reserve(&mut self, num_words: usize) {
        self.building_mut().reserve(num_words);
    }

    #[inline]
    fn needs_counts(&self) -> bool {
        self.building.as_ref().is_some_and(|index| index.needs_counts())
    }

    #[inline]
    fn count_word(&mut self, word: &str, prob: f32) {
        self.building_mut().count_word(word, prob);
    }

    /// Panics once the index is finalized.
    #[inline]
    fn get_or_add(&mut self, word: &str) -> WordId {
        self.building_mut().get_or_add(word)
    }

    fn finalize(&mut self) {
        if let Some(index) = self.building.take() {
            self.lay_out(index.into_basic());
        }
    }

    fn get_id(&self, word: &str) -> WordId {
        if !self.is_finalized() {
            return self.building().get_id(word);
        }
        let mask = self.buckets.len() - 1;
        let mut bucket = Self::bucket_of(word, mask);
        loop {
            let id = *self.buckets.get_safe_unchecked(bucket);
            if id == UNDEFINED_WORD_ID {
                return UNKNOWN_WORD_ID;
            }
            if self.words.get_safe_unchecked(id as usize) == word {
                return id;
            }
            bucket = (bucket + 1) & mask;
        }
    }

    fn get_word(&self, id: WordId) -> &str {
        if !self.is_finalized() {
            return self.building().get_word(id);
        }
        assert!(self.contains_id(id), "word id {id} was never issued");
        &self.words[id as usize]
    }

    #[inline]
    fn contains_id(&self, id: WordId) -> bool {
        match &self.building {
            Some(index) => index.contains_id(id),
            None => id != UNDEFINED_WORD_ID && (id as usize) < self.words.len(),
        }
    }

    #[inline]
    fn id_bound(&self) -> usize {
        match &self.building {
            Some(index) => index.id_bound(),
            None => self.words.len(),
        }
    }

    #[inline]
    fn len(&self) -> usize {
        match &self.building {
            Some(index) => index.len(),
            None => self.words.len() - 1,
        }
    }

    fn allocated_bytes(&self) -> usize {
        match &self.building {
            Some(index) => index.allocated_bytes(),
            None => {
                self.buckets.capacity() * size_of::<WordId>()
                    + self.words.capacity() * size_of::<CompactString>()
            }
        }
    }
}
