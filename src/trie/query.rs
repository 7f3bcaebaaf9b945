use super::{LayerStorage, LayeredTrie};
use crate::word_index::WordId;

impl<S: LayerStorage> LayeredTrie<S> {
    /// Log10 probability of the last of `words` given the others.
    ///
    /// Starting from the longest stored suffix: an exact hit returns its
    /// probability, a miss adds the back-off weight of its context (zero if
    /// the context is not stored) and drops the oldest word. Unigrams always
    /// answer, unknown words with the `<unk>` payload.
    pub fn log_prob(&self, words: &[WordId]) -> f32 {
        assert!(!words.is_empty(), "no word to score");
        let words = &words[words.len().saturating_sub(self.max_level())..];

        let mut back_off = 0.0;
        for begin in 0..words.len() - 1 {
            let m_gram = &words[begin..];
            if let Some(payload) = self.payload_of(m_gram) {
                return back_off + payload.prob;
            }
            if let Some(context) = self.payload_of(&m_gram[..m_gram.len() - 1]) {
                back_off += context.back_off;
            }
        }
        back_off + self.unigram_or_unk(words[words.len() - 1]).prob
    }
}
