use crate::{
    arena::{GrowthKind, GrowthStrategy},
    level::{DEFAULT_UNK_WORD_PROB, MAX_LEVEL},
    trie::TrieKind,
    word_index::WordIndexKind,
    LmError,
};
use ::core::str::FromStr;

#[derive(Clone, Debug, PartialEq)]
pub struct LmConfig {
    pub(crate) trie_kind: TrieKind,
    pub(crate) word_index_kind: WordIndexKind,
    pub(crate) bitmap_bucket_factor: f32,
    pub(crate) max_order: usize,
    pub(crate) memory_limit: Option<usize>,
    pub(crate) lm_weight: f32,
    pub(crate) unk_word_prob: f32,
    pub(crate) hybrid_threshold: usize,
    pub(crate) arena_growth: GrowthStrategy,
}

impl Default for LmConfig {
    #[inline]
    fn default() -> Self {
        Self {
            trie_kind: TrieKind::default(),
            word_index_kind: WordIndexKind::default(),
            bitmap_bucket_factor: 2.0,
            max_order: MAX_LEVEL,
            memory_limit: None,
            lm_weight: 1.0,
            unk_word_prob: DEFAULT_UNK_WORD_PROB,
            hybrid_threshold: 16,
            arena_growth: GrowthStrategy::default(),
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, LmError> {
    value
        .parse()
        .map_err(|_| LmError::Config(format!("invalid value {value:?} for {key}")))
}

/// Bytes with an optional `K`, `M` or `G` suffix.
fn parse_bytes(key: &str, value: &str) -> Result<usize, LmError> {
    let (digits, shift) = match value.as_bytes().last() {
        Some(b'K' | b'k') => (&value[..value.len() - 1], 10),
        Some(b'M' | b'm') => (&value[..value.len() - 1], 20),
        Some(b'G' | b'g') => (&value[..value.len() - 1], 30),
        _ => (value, 0),
    };
    let n: usize = atoi_simd::parse(digits.as_bytes())
        .map_err(|_| LmError::Config(format!("invalid value {value:?} for {key}")))?;
    n.checked_mul(1 << shift)
        .ok_or_else(|| LmError::Config(format!("{key} {value:?} is too large")))
}

impl LmConfig {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `key=value` options, e.g. `trie-variant=context-array`.
    pub fn from_options<'o>(options: impl IntoIterator<Item = &'o str>) -> Result<Self, LmError> {
        let mut config = Self::default();
        for option in options {
            let (key, value) = option
                .split_once('=')
                .ok_or_else(|| LmError::Config(format!("option {option:?} is not key=value")))?;
            config = config.option(key.trim(), value.trim())?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn option(self, key: &str, value: &str) -> Result<Self, LmError> {
        Ok(match key {
            "trie-variant" => self.trie_kind(parse_value(key, value)?),
            "word-index-strategy" => self.word_index_kind(parse_value(key, value)?),
            "bitmap-bucket-factor" => self.bitmap_bucket_factor(parse_value(key, value)?),
            "max-order" => self.max_order(parse_value(key, value)?),
            "memory-limit" => self.memory_limit(Some(parse_bytes(key, value)?)),
            "lm-weight" => self.lm_weight(parse_value(key, value)?),
            "unk-word-prob" => self.unk_word_prob(parse_value(key, value)?),
            "hybrid-threshold" => self.hybrid_threshold(parse_value(key, value)?),
            "arena-growth" => self.arena_growth(GrowthStrategy::new(parse_value::<GrowthKind>(key, value)?)),
            _ => return Err(LmError::Config(format!("unknown option {key:?}"))),
        })
    }

    pub fn validate(&self) -> Result<(), LmError> {
        if !(1..=MAX_LEVEL).contains(&self.max_order) {
            return Err(LmError::Config(format!(
                "max-order {} is not in range 1..={MAX_LEVEL}",
                self.max_order
            )));
        }
        if !(self.bitmap_bucket_factor >= 1.0 && self.bitmap_bucket_factor.is_finite()) {
            return Err(LmError::Config(format!(
                "bitmap-bucket-factor {} is below 1",
                self.bitmap_bucket_factor
            )));
        }
        if !self.lm_weight.is_finite() || !self.unk_word_prob.is_finite() {
            return Err(LmError::Config("lm-weight and unk-word-prob must be finite".into()));
        }
        if self.hybrid_threshold == 0 {
            return Err(LmError::Config("hybrid-threshold must be positive".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn trie_kind(mut self, trie_kind: TrieKind) -> Self {
        self.trie_kind = trie_kind;
        self
    }

    #[inline]
    pub fn word_index_kind(mut self, word_index_kind: WordIndexKind) -> Self {
        self.word_index_kind = word_index_kind;
        self
    }

    /// Bitmap cache buckets per m-gram, at least 1.
    #[inline]
    pub fn bitmap_bucket_factor(mut self, factor: f32) -> Self {
        self.bitmap_bucket_factor = factor;
        self
    }

    /// Highest m-gram order accepted from a model file.
    #[inline]
    pub fn max_order(mut self, max_order: usize) -> Self {
        self.max_order = max_order;
        self
    }

    #[inline]
    pub fn memory_limit(mut self, bytes: Option<usize>) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Multiplies every probability and back-off weight at load time.
    #[inline]
    pub fn lm_weight(mut self, lm_weight: f32) -> Self {
        self.lm_weight = lm_weight;
        self
    }

    #[inline]
    pub fn unk_word_prob(mut self, prob: f32) -> Self {
        self.unk_word_prob = prob;
        self
    }

    /// Word runs with at least this many contexts get a hash table
    /// in the hybrid trie.
    #[inline]
    pub fn hybrid_threshold(mut self, threshold: usize) -> Self {
        self.hybrid_threshold = threshold;
        self
    }

    #[inline]
    pub fn arena_growth(mut self, growth: GrowthStrategy) -> Self {
        self.arena_growth = growth;
        self
    }

    #[inline]
    pub fn get_trie_kind(&self) -> TrieKind {
        self.trie_kind
    }

    #[inline]
    pub fn get_word_index_kind(&self) -> WordIndexKind {
        self.word_index_kind
    }

    #[inline]
    pub fn get_max_order(&self) -> usize {
        self.max_order
    }

    #[inline]
    pub fn get_lm_weight(&self) -> f32 {
        self.lm_weight
    }
}
