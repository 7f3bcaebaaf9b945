use super::{WordId, WordIndex, UNDEFINED_WORD_ID, UNKNOWN_WORD_ID, UNKNOWN_WORD_STR};
use crate::m_gram::mix64;
use ::core::{hash::Hasher, mem::size_of};
use compact_str::CompactString;
use rustc_hash::{FxHashMap, FxHasher};
use tracing::warn;

/// Word id is the 32-bit word hash with bit 1 set, so it never
/// collides with the reserved ids.
///
/// Lossy: words with equal hashes share one id, and only the first
/// of them can be reconstructed by [`get_word`](WordIndex::get_word).
#[derive(Debug, Default)]
pub struct HashingWordIndex {
    words: FxHashMap<WordId, CompactString>,
    merged: usize,
}

impl HashingWordIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn hash_id(word: &str) -> WordId {
        if word == UNKNOWN_WORD_STR {
            return UNKNOWN_WORD_ID;
        }
        let mut hasher = FxHasher::default();
        hasher.write(word.as_bytes());
        (mix64(hasher.finish()) as WordId) | 2
    }

    /// Number of words that collided with an earlier word.
    #[inline]
    pub fn merged_words(&self) -> usize {
        self.merged
    }
}

impl WordIndex for HashingWordIndex {
    #[inline]
    fn reserve(&mut self, num_words: usize) {
        self.words.reserve(num_words);
    }

    fn get_or_add(&mut self, word: &str) -> WordId {
        let id = Self::hash_id(word);
        match self.words.get(&id) {
            Some(known) if known != word => {
                self.merged += 1;
                warn!("hashing word index: {word:?} merged into {known:?} (id {id})");
            }
            Some(_) => {}
            None => {
                self.words.insert(id, CompactString::from(word));
            }
        }
        id
    }

    fn get_id(&self, word: &str) -> WordId {
        let id = Self::hash_id(word);
        if self.words.contains_key(&id) {
            id
        } else {
            UNKNOWN_WORD_ID
        }
    }

    fn get_word(&self, id: WordId) -> &str {
        if id == UNKNOWN_WORD_ID {
            return UNKNOWN_WORD_STR;
        }
        match self.words.get(&id) {
            Some(word) => word,
            None => panic!("word id {id} was never issued"),
        }
    }

    #[inline]
    fn contains_id(&self, id: WordId) -> bool {
        id == UNKNOWN_WORD_ID || (id != UNDEFINED_WORD_ID && self.words.contains_key(&id))
    }

    #[inline]
    fn is_continuous(&self) -> bool {
        false
    }

    fn id_bound(&self) -> usize {
        self.words.keys().max().map_or(2, |&id| id as usize + 1)
    }

    fn len(&self) -> usize {
        self.words.len() + usize::from(!self.words.contains_key(&UNKNOWN_WORD_ID))
    }

    fn allocated_bytes(&self) -> usize {
        self.words.capacity() * (size_of::<WordId>() + size_of::<CompactString>())
    }
}
