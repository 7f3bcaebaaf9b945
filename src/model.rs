use crate::{
    builder::ArpaBuilder,
    level::ZERO_LOG_PROB,
    m_gram::{MGramId, MGramWords, Payload},
    trie::TrieStore,
    word_index::{WordId, WordIndex, WordIndexStore},
    LmConfig, LmError,
};
use ::std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::info;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelStats {
    /// Distinct m-grams per level, unigrams first
    pub level_counts: Vec<usize>,
    pub words: usize,
    pub word_index_bytes: usize,
    pub trie_bytes: usize,
}

/// Per-word log10 probabilities of a sequence and their sum.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SequenceScore {
    pub log_probs: Vec<f32>,
    /// Sum of the log-probabilities above [`ZERO_LOG_PROB`]
    pub total: f32,
}

/// A built, immutable back-off language model. Cheap to share between
/// threads by reference.
#[derive(Debug)]
pub struct LanguageModel {
    config: LmConfig,
    word_index: WordIndexStore,
    trie: TrieStore,
    stats: ModelStats,
}

impl LanguageModel {
    pub(crate) fn from_parts(config: LmConfig, word_index: WordIndexStore, trie: TrieStore) -> Self {
        let stats = ModelStats {
            level_counts: (1..=trie.max_level()).map(|l| trie.level_len(l)).collect(),
            words: word_index.len(),
            word_index_bytes: word_index.allocated_bytes(),
            trie_bytes: trie.allocated_bytes(),
        };
        info!(
            "model built: {} trie, {} word index, m-grams {:?}, {} bytes",
            trie.kind(),
            word_index.kind(),
            stats.level_counts,
            stats.word_index_bytes + stats.trie_bytes
        );

        Self {
            config,
            word_index,
            trie,
            stats,
        }
    }

    pub fn from_arpa_file(path: impl AsRef<Path>, config: LmConfig) -> Result<Self, LmError> {
        let file = File::open(path.as_ref())?;
        info!("reading ARPA model {:?}", path.as_ref());
        Self::from_arpa_reader(BufReader::with_capacity(1 << 20, file), config)
    }

    #[inline]
    pub fn from_arpa_reader(reader: impl BufRead, config: LmConfig) -> Result<Self, LmError> {
        ArpaBuilder::new(reader, config).build()
    }

    #[inline]
    pub fn from_arpa_str(text: &str, config: LmConfig) -> Result<Self, LmError> {
        Self::from_arpa_reader(text.as_bytes(), config)
    }

    /// Order of the loaded model.
    #[inline]
    pub fn max_order(&self) -> usize {
        self.trie.max_level()
    }

    #[inline]
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    #[inline]
    pub fn word_index(&self) -> &WordIndexStore {
        &self.word_index
    }

    #[inline]
    pub fn trie(&self) -> &TrieStore {
        &self.trie
    }

    #[inline]
    pub fn stats(&self) -> &ModelStats {
        &self.stats
    }

    /// Log10 probability of words the model has never seen.
    #[inline]
    pub fn unk_word_prob(&self) -> f32 {
        self.trie.unk_payload().prob
    }

    /// Exact lookup, no back-off.
    #[inline]
    pub fn get_payload(&self, m_gram: &MGramId) -> Option<Payload> {
        if m_gram.level() > self.max_order() {
            return None;
        }
        self.trie.get_payload(m_gram)
    }

    #[inline]
    pub fn m_gram(&self, tokens: &[&str]) -> MGramId {
        MGramId::from_tokens(&self.word_index, tokens.iter().copied())
    }

    /// Log10 probability of `word` given the preceding `context`, oldest word
    /// first. Only the last `max_order - 1` context words are used.
    ///
    /// Panics on ids the word index never issued.
    pub fn score(&self, context: &[WordId], word: WordId) -> f32 {
        let context = &context[context.len().saturating_sub(self.max_order() - 1)..];
        let mut words = MGramWords::new_const();
        for &id in context.iter().chain([&word]) {
            assert!(
                self.word_index.contains_id(id),
                "word id {id} was never issued"
            );
            words.push(id);
        }
        self.trie.log_prob(&words)
    }

    /// Log10 probability of the last word given the preceding ones.
    pub fn score_words(&self, words: &[&str]) -> f32 {
        let Some((word, context)) = words.split_last() else {
            panic!("no word to score");
        };
        let context = &context[context.len().saturating_sub(self.max_order() - 1)..];
        let context: MGramWords = context
            .iter()
            .map(|w| self.word_index.get_id(w))
            .collect();
        self.score(&context, self.word_index.get_id(word))
    }

    /// Scores every word given up to `max_order - 1` words before it.
    pub fn score_sequence(&self, words: &[&str]) -> SequenceScore {
        let ids: Vec<WordId> = words.iter().map(|w| self.word_index.get_id(w)).collect();
        let mut score = SequenceScore {
            log_probs: Vec::with_capacity(ids.len()),
            total: 0.0,
        };
        for (i, &word) in ids.iter().enumerate() {
            let begin = (i + 1).saturating_sub(self.max_order());
            let log_prob = self.score(&ids[begin..i], word);
            if log_prob > ZERO_LOG_PROB {
                score.total += log_prob;
            }
            score.log_probs.push(log_prob);
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{level::DEFAULT_UNK_WORD_PROB, TrieKind, WordIndexKind};
    use ahash::AHashMap;
    use float_cmp::approx_eq;

    const MODEL: &str = "\\data\\
ngram 1=4
ngram 2=3
ngram 3=1

\\1-grams:
-1.0\t<s>\t-0.5
-1.2\tthe\t-0.3
-2.0\tcat\t-0.2
-1.7\tsat

\\2-grams:
-0.4\t<s> the\t-0.1
-0.6\tthe cat\t-0.05
-0.9\tcat sat

\\3-grams:
-0.2\t<s> the cat

\\end\\
";

    #[test]
    fn test_sequence_score() {
        let model = LanguageModel::from_arpa_str(MODEL, LmConfig::new()).unwrap();
        let score = model.score_sequence(&["<s>", "the", "cat", "sat"]);
        let expected: AHashMap<usize, f32> = ahashmap!(
            0 => -1.0,
            1 => -0.4,
            2 => -0.2,
            // bo(the cat) + p(cat sat)
            3 => -0.05 - 0.9,
        );

        assert_eq!(score.log_probs.len(), 4);
        for (i, log_prob) in score.log_probs.iter().enumerate() {
            assert!(
                approx_eq!(f32, *log_prob, expected[&i], ulps = 4),
                "{i}: {log_prob}"
            );
        }
        assert!(approx_eq!(
            f32,
            score.total,
            score.log_probs.iter().sum::<f32>(),
            ulps = 4
        ));
    }

    #[test]
    fn test_unk_default_and_zero_prob_skipped() {
        let model = LanguageModel::from_arpa_str(MODEL, LmConfig::new().unk_word_prob(-120.0))
            .unwrap();
        let score = model.score_sequence(&["the", "dog"]);

        assert_eq!(model.unk_word_prob(), -120.0);
        assert!(approx_eq!(f32, score.log_probs[1], -0.3 - 120.0, ulps = 4));
        assert!(approx_eq!(f32, score.total, -1.2, ulps = 4));
        assert_eq!(
            LanguageModel::from_arpa_str(MODEL, LmConfig::new())
                .unwrap()
                .unk_word_prob(),
            DEFAULT_UNK_WORD_PROB
        );
    }

    #[test]
    fn test_lm_weight() {
        let model = LanguageModel::from_arpa_str(MODEL, LmConfig::new().lm_weight(0.5)).unwrap();

        assert!(approx_eq!(
            f32,
            model.score_words(&["the", "cat", "sat"]),
            (-0.05 - 0.9) * 0.5,
            ulps = 4
        ));
        assert_eq!(
            model.get_payload(&model.m_gram(&["the"])),
            Some(Payload::new(-0.6, -0.15))
        );
    }

    #[test]
    fn test_stats() {
        let model = LanguageModel::from_arpa_str(
            MODEL,
            LmConfig::new()
                .trie_kind(TrieKind::WordContextHybrid)
                .word_index_kind(WordIndexKind::Counting),
        )
        .unwrap();
        let stats = model.stats();

        assert_eq!(stats.level_counts, vec![4, 3, 1]);
        assert_eq!(stats.words, 5);
        assert!(stats.trie_bytes > 0);
        assert!(stats.word_index_bytes > 0);
        assert_eq!(model.max_order(), 3);
        assert_eq!(model.trie().kind(), TrieKind::WordContextHybrid);
    }

    #[test]
    #[should_panic(expected = "never issued")]
    fn test_score_never_issued_id() {
        let model = LanguageModel::from_arpa_str(MODEL, LmConfig::new()).unwrap();
        model.score(&[2], 1000);
    }

    #[test]
    fn test_m_gram_above_order() {
        let model = LanguageModel::from_arpa_str(MODEL, LmConfig::new()).unwrap();
        let m_gram = model.m_gram(&["<s>", "the", "cat", "sat"]);

        assert_eq!(model.get_payload(&m_gram), None);
    }
}
