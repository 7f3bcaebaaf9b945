use super::{WordId, WordIndex, UNDEFINED_WORD_ID, UNKNOWN_WORD_ID, UNKNOWN_WORD_STR};
use ::core::mem::size_of;
use ahash::AHashMap;
use compact_str::CompactString;

/// Ids in first-seen order.
#[derive(Debug)]
pub struct BasicWordIndex {
    ids: AHashMap<CompactString, WordId>,
    words: Vec<CompactString>,
}

impl Default for BasicWordIndex {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl BasicWordIndex {
    pub fn new() -> Self {
        let mut ids = AHashMap::new();
        ids.insert(CompactString::const_new(UNKNOWN_WORD_STR), UNKNOWN_WORD_ID);
        Self {
            ids,
            words: vec![
                CompactString::const_new(""),
                CompactString::const_new(UNKNOWN_WORD_STR),
            ],
        }
    }

    #[inline]
    pub(super) fn into_words(self) -> Vec<CompactString> {
        self.words
    }
}

impl WordIndex for BasicWordIndex {
    #[inline]
    fn reserve(&mut self, num_words: usize) {
        self.ids.reserve(num_words);
        self.words.reserve(num_words);
    }

    fn get_or_add(&mut self, word: &str) -> WordId {
        if let Some(&id) = self.ids.get(word) {
            return id;
        }
        let id = WordId::try_from(self.words.len()).unwrap_or_else(|_| {
            panic!("word index overflow at {} words", self.words.len())
        });
        let word = CompactString::from(word);
        self.ids.insert(word.clone(), id);
        self.words.push(word);
        id
    }

    #[inline]
    fn get_id(&self, word: &str) -> WordId {
        self.ids.get(word).copied().unwrap_or(UNKNOWN_WORD_ID)
    }

    #[inline]
    fn get_word(&self, id: WordId) -> &str {
        assert!(self.contains_id(id), "word id {id} was never issued");
        &self.words[id as usize]
    }

    #[inline]
    fn contains_id(&self, id: WordId) -> bool {
        id != UNDEFINED_WORD_ID && (id as usize) < self.words.len()
    }

    #[inline]
    fn id_bound(&self) -> usize {
        self.words.len()
    }

    #[inline]
    fn len(&self) -> usize {
        self.words.len() - 1
    }

    fn allocated_bytes(&self) -> usize {
        self.ids.capacity() * (size_of::<CompactString>() + size_of::<WordId>())
            + self.words.capacity() * size_of::<CompactString>()
    }
}
