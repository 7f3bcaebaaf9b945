//! # Back-off n-gram language models
//!
//! Loads an ARPA model into memory and answers conditional log10
//! probability queries with back-off, from any number of threads.
//!
//! Seven interchangeable trie layouts ([`TrieKind`](enum.TrieKind.html)) and four
//! word index strategies ([`WordIndexKind`](enum.WordIndexKind.html)) trade
//! memory for lookup speed; all of them give the same scores.
//!
//! # Example
//! ```rust
//! use backoff_lm::{LanguageModel, LmConfig, TrieKind};
//!
//! let arpa = "\\data\\\nngram 1=3\nngram 2=1\n\n\\1-grams:\n-1.0\t<unk>\n-1.0\tthe\t-0.3\n\
//!             -1.5\tcat\n\n\\2-grams:\n-0.5\tthe cat\n\n\\end\\\n";
//! let config = LmConfig::new().trie_kind(TrieKind::ContextWordArray);
//! let model = LanguageModel::from_arpa_str(arpa, config).unwrap();
//!
//! // single thread
//! let log_prob = model.score_words(&["the", "cat"]);
//! assert_eq!(log_prob, -0.5);
//!
//! // or multithreaded (rayon for example)
//! use rayon::iter::IntoParallelRefIterator;
//! use rayon::iter::ParallelIterator;
//!
//! let queries = [vec!["the", "cat"], vec!["the", "dog"]];
//! let results: Vec<f32> = queries
//!     .par_iter()
//!     .map(|words| model.score_words(words))
//!     .collect();
//! ```
//! `model` also has [other methods](struct.LanguageModel.html#implementations)

#[allow(unused_macros)]
macro_rules! ahashmap {
    (@single $($x:tt)*) => (());
    (@count $($rest:expr),*) => (<[()]>::len(&[$(ahashmap!(@single $rest)),*]));

    ($($key:expr => $value:expr,)+) => { ahashmap!($($key => $value),+) };
    ($($key:expr => $value:expr),*) => {
        {
            let _cap = ahashmap!(@count $($key),*);
            let mut _map = ::ahash::AHashMap::with_capacity(_cap);
            $(
                let _ = _map.insert($key, $value);
            )*
            _map.into()
        }
    };
}

pub mod arena;
mod bitmap_cache;
mod builder;
mod config;
mod error;
mod level;
mod m_gram;
mod model;
pub mod trie;
pub mod word_index;

pub use arena::{GrowthKind, GrowthStrategy, MemoryBudget};
pub use bitmap_cache::BitmapHashCache;
pub use builder::ArpaBuilder;
pub use config::LmConfig;
pub use error::LmError;
pub use level::{LevelState, DEFAULT_UNK_WORD_PROB, MAX_LEVEL, ZERO_LOG_PROB};
pub use m_gram::{hash_words, MGramId, Payload};
pub use model::{LanguageModel, ModelStats, SequenceScore};
pub use trie::{TrieKind, TrieStore};
pub use word_index::{
    WordId, WordIndex, WordIndexKind, WordIndexStore, MIN_KNOWN_WORD_ID, UNDEFINED_WORD_ID,
    UNKNOWN_WORD_ID, UNKNOWN_WORD_STR,
};
