use arrayvec::ArrayVec;

/// Highest m-gram order a model can hold.
pub const MAX_LEVEL: usize = 6;

/// Log-probabilities at or below this value count as zero probability
/// and are skipped by cumulative scoring.
pub const ZERO_LOG_PROB: f32 = -100.0;

/// Used for unknown words when the model has no `<unk>` unigram.
pub const DEFAULT_UNK_WORD_PROB: f32 = -10.0;

/// Build state of a single trie level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LevelState {
    #[default]
    Building,
    Sealed,
}

pub(crate) type LevelStates = ArrayVec<LevelState, MAX_LEVEL>;

pub(crate) trait LevelStatesTrait: Sized {
    fn new_building(max_level: usize) -> Self;
    /// Marks `level` (1-based) as sealed; levels must be sealed in order.
    fn seal(&mut self, level: usize);
    fn is_sealed(&self, level: usize) -> bool;
}

impl LevelStatesTrait for LevelStates {
    #[inline]
    fn new_building(max_level: usize) -> Self {
        assert!(
            (1..=MAX_LEVEL).contains(&max_level),
            "level count {max_level} is not in range 1..={MAX_LEVEL}"
        );
        (0..max_level).map(|_| LevelState::Building).collect()
    }

    fn seal(&mut self, level: usize) {
        assert!(
            (1..=self.len()).contains(&level),
            "level {level} is not in range 1..={}",
            self.len()
        );
        assert!(
            level == 1 || self[level - 2] == LevelState::Sealed,
            "level {level} sealed before level {}",
            level - 1
        );
        assert_eq!(
            self[level - 1],
            LevelState::Building,
            "level {level} is already sealed"
        );
        self[level - 1] = LevelState::Sealed;
    }

    #[inline]
    fn is_sealed(&self, level: usize) -> bool {
        self.get(level.wrapping_sub(1)) == Some(&LevelState::Sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::{LevelState, LevelStates, LevelStatesTrait};

    #[test]
    fn test_levels_seal_in_order() {
        let mut states = LevelStates::new_building(3);
        states.seal(1);
        states.seal(2);

        assert_eq!(
            states.as_slice(),
            &[
                LevelState::Sealed,
                LevelState::Sealed,
                LevelState::Building
            ]
        );
        assert!(states.is_sealed(2));
        assert!(!states.is_sealed(3));
        assert!(!states.is_sealed(0));
        assert!(!states.is_sealed(4));
    }

    #[test]
    #[should_panic(expected = "sealed before")]
    fn test_levels_seal_out_of_order() {
        let mut states = LevelStates::new_building(3);
        states.seal(2);
    }

    #[test]
    #[should_panic(expected = "already sealed")]
    fn test_levels_seal_twice() {
        let mut states = LevelStates::new_building(2);
        states.seal(1);
        states.seal(1);
    }
}
