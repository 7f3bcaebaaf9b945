use super::{BasicWordIndex, WordId, WordIndex, UNKNOWN_WORD_STR};
use ::core::mem::size_of;
use compact_str::CompactString;
use tracing::debug;

/// Gives the most probable unigrams the lowest ids, so the hot part of
/// every id-indexed structure stays small.
#[derive(Debug, Default)]
pub struct CountingWordIndex {
    counts: Vec<(CompactString, f32)>,
    counted: bool,
    index: BasicWordIndex,
}

impl CountingWordIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns ids to counted words, most probable first.
    fn assign_counted(&mut self) {
        let mut counts = ::core::mem::take(&mut self.counts);
        counts.sort_by(|(w1, p1), (w2, p2)| p2.total_cmp(p1).then_with(|| w1.cmp(w2)));
        for (word, _) in counts.iter().filter(|(w, _)| w.as_str() != UNKNOWN_WORD_STR) {
            self.index.get_or_add(word);
        }
        debug!("counting word index: {} words ordered", counts.len());
        self.counted = true;
    }

    #[inline]
    pub(super) fn into_basic(mut self) -> BasicWordIndex {
        if !self.counted {
            self.assign_counted();
        }
        self.index
    }
}

impl WordIndex for CountingWordIndex {
    #[inline]
    fn reserve(&mut self, num_words: usize) {
        self.counts.reserve(num_words);
        self.index.reserve(num_words);
    }

    #[inline]
    fn needs_counts(&self) -> bool {
        !self.counted
    }

    #[inline]
    fn count_word(&mut self, word: &str, prob: f32) {
        assert!(!self.counted, "word counts are already applied");
        self.counts.push((CompactString::from(word), prob));
    }

    /// Words that were not counted get the next free id.
    fn get_or_add(&mut self, word: &str) -> WordId {
        if !self.counted {
            self.assign_counted();
        }
        self.index.get_or_add(word)
    }

    fn finalize(&mut self) {
        if !self.counted {
            self.assign_counted();
        }
    }

    #[inline]
    fn get_id(&self, word: &str) -> WordId {
        self.index.get_id(word)
    }

    #[inline]
    fn get_word(&self, id: WordId) -> &str {
        self.index.get_word(id)
    }

    #[inline]
    fn contains_id(&self, id: WordId) -> bool {
        self.index.contains_id(id)
    }

    #[inline]
    fn id_bound(&self) -> usize {
        self.index.id_bound()
    }

    #[inline]
    fn len(&self) -> usize {
        self.index.len()
    }

    fn allocated_bytes(&self) -> usize {
        self.counts.capacity() * size_of::<(CompactString, f32)>() + self.index.allocated_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probable_words_first() {
        let mut index = CountingWordIndex::new();
        index.count_word("rare", -5.0);
        index.count_word("<unk>", -1.0);
        index.count_word("the", -1.0);
        index.count_word("cat", -2.5);

        assert_eq!(index.get_or_add("rare"), 4);
        assert_eq!(index.get_or_add("the"), 2);
        assert_eq!(index.get_or_add("cat"), 3);
        assert_eq!(index.get_or_add("<unk>"), 1);
        assert_eq!(index.get_or_add("late"), 5);
        assert!(!index.needs_counts());
    }
}
