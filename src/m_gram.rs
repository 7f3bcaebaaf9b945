use crate::{
    level::MAX_LEVEL,
    word_index::{WordId, WordIndex},
};
use ::core::hash::Hasher;
use arrayvec::ArrayVec;
use rustc_hash::FxHasher;

pub type MGramWords = ArrayVec<WordId, MAX_LEVEL>;

/// Log10 probability and back-off weight of one m-gram.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Payload {
    pub prob: f32,
    pub back_off: f32,
}

impl Payload {
    #[inline(always)]
    pub const fn new(prob: f32, back_off: f32) -> Self {
        Self { prob, back_off }
    }

    #[inline(always)]
    pub const fn prob_only(prob: f32) -> Self {
        Self::new(prob, 0.0)
    }

    #[inline]
    pub(crate) fn weighted(self, lm_weight: f32) -> Self {
        Self::new(self.prob * lm_weight, self.back_off * lm_weight)
    }
}

/// splitmix64 finalizer, spreads entropy into the low bits used as bucket indexes.
#[inline(always)]
pub fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

/// Szudzik's elegant pairing, injective while both arguments fit in 32 bits.
#[inline(always)]
pub fn szudzik(a: u64, b: u64) -> u64 {
    if a >= b {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    } else {
        b.wrapping_mul(b).wrapping_add(a)
    }
}

#[inline]
pub fn hash_words(words: &[WordId]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_usize(words.len());
    for &word in words {
        hasher.write_u32(word);
    }
    mix64(hasher.finish())
}

/// An m-gram as its word ids, oldest word first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MGramId {
    words: MGramWords,
}

impl MGramId {
    pub fn new(words: &[WordId]) -> Self {
        assert!(
            (1..=MAX_LEVEL).contains(&words.len()),
            "m-gram level {} is not in range 1..={MAX_LEVEL}",
            words.len()
        );
        let mut ids = MGramWords::new_const();
        ids.extend(words.iter().copied());
        Self { words: ids }
    }

    /// Resolves tokens through the word index; unseen tokens become the unknown word.
    pub fn from_tokens<'t>(
        word_index: &(impl WordIndex + ?Sized),
        tokens: impl IntoIterator<Item = &'t str>,
    ) -> Self {
        let words: MGramWords = tokens
            .into_iter()
            .map(|token| word_index.get_id(token))
            .collect();
        Self::new(&words)
    }

    #[inline(always)]
    pub fn words(&self) -> &[WordId] {
        &self.words
    }

    #[inline(always)]
    pub fn level(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn last_word(&self) -> WordId {
        self.words[self.words.len() - 1]
    }

    /// All words but the last one.
    #[inline]
    pub fn context(&self) -> &[WordId] {
        &self.words[..self.words.len() - 1]
    }

    #[inline]
    pub fn hash_value(&self) -> u64 {
        hash_words(&self.words)
    }
}

impl From<&[WordId]> for MGramId {
    #[inline]
    fn from(words: &[WordId]) -> Self {
        Self::new(words)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_m_gram_parts() {
        let m_gram = MGramId::new(&[5, 6, 7]);

        assert_eq!(m_gram.level(), 3);
        assert_eq!(m_gram.context(), &[5, 6]);
        assert_eq!(m_gram.last_word(), 7);
        assert_eq!(m_gram, MGramId::from(&[5, 6, 7][..]));
        assert_eq!(m_gram.hash_value(), hash_words(&[5, 6, 7]));
        assert_ne!(m_gram.hash_value(), hash_words(&[5, 6]));
        assert_ne!(hash_words(&[5, 6]), hash_words(&[6, 5]));
    }

    #[test]
    #[should_panic(expected = "not in range")]
    fn test_m_gram_too_long() {
        MGramId::new(&[2; MAX_LEVEL + 1]);
    }

    #[test]
    fn test_szudzik_pairs_are_distinct() {
        assert_eq!(szudzik(0, 0), 0);
        assert_eq!(szudzik(0, 1), 1);
        assert_eq!(szudzik(1, 0), 2);
        assert_eq!(szudzik(1, 1), 3);
        assert_ne!(szudzik(3, 7), szudzik(7, 3));
        assert_ne!(
            szudzik(u32::MAX as u64, 2),
            szudzik(2, u32::MAX as u64)
        );
    }

    #[test]
    fn test_weighted_payload() {
        let payload = Payload::new(-1.0, -0.5).weighted(0.5);

        assert_eq!(payload, Payload::new(-0.5, -0.25));
        assert_eq!(Payload::prob_only(-2.0).back_off, 0.0);
    }
}
