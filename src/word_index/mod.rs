mod basic;
mod counting;
mod hashing;
mod optimizing;

pub use basic::BasicWordIndex;
pub use counting::CountingWordIndex;
pub use hashing::HashingWordIndex;
pub use optimizing::OptimizingWordIndex;

use ::core::fmt;
use strum_macros::{Display, EnumIter, EnumString};

pub type WordId = u32;

pub const UNDEFINED_WORD_ID: WordId = 0;
pub const UNKNOWN_WORD_ID: WordId = 1;
pub const MIN_KNOWN_WORD_ID: WordId = 2;
pub const UNKNOWN_WORD_STR: &str = "<unk>";

/// Maps surface words to ids and back.
///
/// Words are registered with [`get_or_add`](WordIndex::get_or_add) while the
/// unigram section is read, then [`finalize`](WordIndex::finalize) freezes the index.
pub trait WordIndex: fmt::Debug + Send + Sync {
    fn reserve(&mut self, _num_words: usize) {}

    /// Whether ids are assigned from unigram statistics, which then
    /// have to be fed through [`count_word`](WordIndex::count_word) first.
    #[inline]
    fn needs_counts(&self) -> bool {
        false
    }

    fn count_word(&mut self, _word: &str, _prob: f32) {}

    fn get_or_add(&mut self, word: &str) -> WordId;

    /// Called once after the last word is registered.
    fn finalize(&mut self) {}

    /// [`UNKNOWN_WORD_ID`] for unseen words.
    fn get_id(&self, word: &str) -> WordId;

    /// Panics if `id` was never issued.
    fn get_word(&self, id: WordId) -> &str;

    fn contains_id(&self, id: WordId) -> bool;

    /// Ids form the range `UNKNOWN_WORD_ID..id_bound()`.
    #[inline]
    fn is_continuous(&self) -> bool {
        true
    }

    /// One past the largest issued id.
    fn id_bound(&self) -> usize;

    /// Distinct words including `<unk>`.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn allocated_bytes(&self) -> usize;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum WordIndexKind {
    #[default]
    Basic,
    Counting,
    Hashing,
    Optimizing,
}

#[derive(Debug)]
pub enum WordIndexStore {
    Basic(BasicWordIndex),
    Counting(CountingWordIndex),
    Hashing(HashingWordIndex),
    Optimizing(OptimizingWordIndex),
}

impl WordIndexStore {
    pub fn new(kind: WordIndexKind) -> Self {
        match kind {
            WordIndexKind::Basic => Self::Basic(BasicWordIndex::new()),
            WordIndexKind::Counting => Self::Counting(CountingWordIndex::new()),
            WordIndexKind::Hashing => Self::Hashing(HashingWordIndex::new()),
            WordIndexKind::Optimizing => Self::Optimizing(OptimizingWordIndex::new()),
        }
    }

    pub fn kind(&self) -> WordIndexKind {
        match self {
            Self::Basic(_) => WordIndexKind::Basic,
            Self::Counting(_) => WordIndexKind::Counting,
            Self::Hashing(_) => WordIndexKind::Hashing,
            Self::Optimizing(_) => WordIndexKind::Optimizing,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $index:ident => $body:expr) => {
        match $self {
            WordIndexStore::Basic($index) => $body,
            WordIndexStore::Counting($index) => $body,
            WordIndexStore::Hashing($index) => $body,
            WordIndexStore::Optimizing($index) => $body,
        }
    };
}

impl WordIndex for WordIndexStore {
    #[inline]
    fn reserve(&mut self, num_words: usize) {
        dispatch!(self, index => index.reserve(num_words))
    }
    #[inline]
    fn needs_counts(&self) -> bool {
        dispatch!(self, index => index.needs_counts())
    }
    #[inline]
    fn count_word(&mut self, word: &str, prob: f32) {
        dispatch!(self, index => index.count_word(word, prob))
    }
    #[inline]
    fn get_or_add(&mut self, word: &str) -> WordId {
        dispatch!(self, index => index.get_or_add(word))
    }
    #[inline]
    fn finalize(&mut self) {
        dispatch!(self, index => index.finalize())
    }
    #[inline]
    fn get_id(&self, word: &str) -> WordId {
        dispatch!(self, index => index.get_id(word))
    }
    #[inline]
    fn get_word(&self, id: WordId) -> &str {
        dispatch!(self, index => index.get_word(id))
    }
    #[inline]
    fn contains_id(&self, id: WordId) -> bool {
        dispatch!(self, index => index.contains_id(id))
    }
    #[inline]
    fn is_continuous(&self) -> bool {
        dispatch!(self, index => index.is_continuous())
    }
    #[inline]
    fn id_bound(&self) -> usize {
        dispatch!(self, index => index.id_bound())
    }
    #[inline]
    fn len(&self) -> usize {
        dispatch!(self, index => index.len())
    }
    #[inline]
    fn allocated_bytes(&self) -> usize {
        dispatch!(self, index => index.allocated_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use strum::IntoEnumIterator;

    const WORDS: [&str; 6] = ["the", "cat", "sat", "on", "a", "mat"];

    fn build(kind: WordIndexKind) -> WordIndexStore {
        let mut index = WordIndexStore::new(kind);
        index.reserve(WORDS.len());
        if index.needs_counts() {
            for (i, word) in WORDS.iter().enumerate() {
                index.count_word(word, -(i as f32));
            }
        }
        for word in WORDS {
            index.get_or_add(word);
        }
        index.finalize();
        index
    }

    #[rstest]
    #[case(WordIndexKind::Basic)]
    #[case(WordIndexKind::Counting)]
    #[case(WordIndexKind::Hashing)]
    #[case(WordIndexKind::Optimizing)]
    fn test_round_trip(#[case] kind: WordIndexKind) {
        let index = build(kind);

        for word in WORDS {
            let id = index.get_id(word);
            assert!(id >= MIN_KNOWN_WORD_ID, "{kind}: {word} got id {id}");
            assert!(index.contains_id(id));
            assert_eq!(index.get_word(id), word);
        }
        assert_eq!(index.get_id("dog"), UNKNOWN_WORD_ID);
        assert_eq!(index.get_id(UNKNOWN_WORD_STR), UNKNOWN_WORD_ID);
        assert_eq!(index.get_word(UNKNOWN_WORD_ID), UNKNOWN_WORD_STR);
        assert!(!index.contains_id(UNDEFINED_WORD_ID));
        assert_eq!(index.len(), WORDS.len() + 1);
    }

    #[test]
    fn test_continuous_ids() {
        for kind in WordIndexKind::iter().filter(|k| *k != WordIndexKind::Hashing) {
            let index = build(kind);
            let mut ids: Vec<WordId> = WORDS.iter().map(|w| index.get_id(w)).collect();
            ids.sort_unstable();

            assert!(index.is_continuous());
            assert_eq!(index.id_bound(), WORDS.len() + MIN_KNOWN_WORD_ID as usize);
            assert_eq!(
                ids,
                (MIN_KNOWN_WORD_ID..MIN_KNOWN_WORD_ID + WORDS.len() as WordId).collect::<Vec<_>>()
            );
        }
        assert!(!build(WordIndexKind::Hashing).is_continuous());
    }

    #[rstest]
    #[case(WordIndexKind::Basic)]
    #[case(WordIndexKind::Optimizing)]
    #[should_panic(expected = "never issued")]
    fn test_get_word_never_issued(#[case] kind: WordIndexKind) {
        build(kind).get_word(1000);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(
            "optimizing".parse::<WordIndexKind>().unwrap(),
            WordIndexKind::Optimizing
        );
        assert_eq!(build(WordIndexKind::Counting).kind(), WordIndexKind::Counting);
    }
}
