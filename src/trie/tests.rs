use super::*;
use crate::word_index::UNKNOWN_WORD_ID;
use float_cmp::approx_eq;
use rstest::*;
use strum::IntoEnumIterator;

type Entries = Vec<(Vec<WordId>, Payload)>;

fn payload_for(words: &[WordId], top: bool) -> Payload {
    let sum: WordId = words.iter().sum();
    let prob = -(words.len() as f32) - (sum % 97) as f32 / 100.0;
    if top {
        Payload::prob_only(prob)
    } else {
        Payload::new(prob, -0.01 * words[0] as f32)
    }
}

/// Three levels over a small vocabulary. Word `w` becomes `map(w)`.
fn model_entries(map: impl Fn(WordId) -> WordId) -> [Entries; 3] {
    let mut unigrams = Entries::new();
    let mut bigrams = Entries::new();
    let mut trigrams = Entries::new();
    for a in 2..32 {
        unigrams.push((vec![map(a)], payload_for(&[a], false)));
    }
    for a in 2..12 {
        for b in 2..32 {
            if (a * 7 + b * 3) % 4 == 0 {
                continue;
            }
            bigrams.push((vec![map(a), map(b)], payload_for(&[a, b], false)));
            for c in 2..8 {
                if (a + b + c) % 3 == 0 {
                    trigrams.push((vec![map(a), map(b), map(c)], payload_for(&[a, b, c], true)));
                }
            }
        }
    }
    [unigrams, bigrams, trigrams]
}

fn build_trie(kind: TrieKind, levels: &[Entries], continuous_ids: bool) -> TrieStore {
    let config = LmConfig::new().hybrid_threshold(4);
    let mut trie = TrieStore::new(kind, levels.len(), &config);
    let counts: Vec<usize> = levels.iter().map(Vec::len).collect();
    trie.pre_allocate(&counts, continuous_ids).unwrap();
    for (level, entries) in levels.iter().enumerate() {
        for (words, payload) in entries {
            trie.add(&MGramId::new(words), *payload).unwrap();
        }
        trie.seal_level(level + 1).unwrap();
    }
    trie
}

#[rstest]
fn test_exact_payload_round_trip(
    #[values(
        TrieKind::ContextArray,
        TrieKind::ContextHash,
        TrieKind::ContextWordArray,
        TrieKind::WordContextArray,
        TrieKind::WordContextHash,
        TrieKind::WordContextHybrid,
        TrieKind::GlobalHash
    )]
    kind: TrieKind,
    #[values(true, false)] continuous_ids: bool,
) {
    let map = |w: WordId| if continuous_ids { w } else { w * 100_003 + 2 };
    let levels = model_entries(map);
    let trie = build_trie(kind, &levels, continuous_ids);

    for (level, entries) in levels.iter().enumerate() {
        assert!(trie.is_level_sealed(level + 1));
        assert_eq!(trie.level_len(level + 1), entries.len());
        for (words, payload) in entries {
            assert!(trie.may_be_present(words), "{kind}: cache miss for {words:?}");
            assert_eq!(
                trie.get_payload(&MGramId::new(words)),
                Some(*payload),
                "{kind}: {words:?}"
            );
        }
    }

    // (2, 2) is skipped by the bigram filter, (3, 3, 2) by the trigram one
    assert_eq!(trie.payload_of(&[map(2), map(2)]), None);
    assert_eq!(trie.payload_of(&[map(3), map(3), map(2)]), None);
    assert_eq!(trie.payload_of(&[map(40)]), None);
    assert_eq!(trie.payload_of(&[map(12), map(2)]), None);
    assert_eq!(trie.payload_of(&[map(2), map(3), map(2)]), None);
}

#[rstest]
#[case(TrieKind::ContextArray)]
#[case(TrieKind::ContextHash)]
#[case(TrieKind::ContextWordArray)]
#[case(TrieKind::WordContextArray)]
#[case(TrieKind::WordContextHash)]
#[case(TrieKind::WordContextHybrid)]
#[case(TrieKind::GlobalHash)]
fn test_duplicates_overwrite(#[case] kind: TrieKind) {
    let levels = [
        vec![
            (vec![2], Payload::new(-1.0, -0.1)),
            (vec![3], Payload::new(-2.0, -0.2)),
            (vec![2], Payload::new(-1.5, -0.15)),
        ],
        vec![
            (vec![2, 3], Payload::prob_only(-0.5)),
            (vec![2, 3], Payload::prob_only(-0.7)),
        ],
    ];
    let trie = build_trie(kind, &levels, true);

    assert_eq!(trie.payload_of(&[2]), Some(Payload::new(-1.5, -0.15)));
    assert_eq!(trie.payload_of(&[2, 3]), Some(Payload::prob_only(-0.7)));
    assert_eq!(trie.level_len(1), 2);
    assert_eq!(trie.level_len(2), 1);
}

#[rstest]
#[case(TrieKind::ContextArray)]
#[case(TrieKind::WordContextHybrid)]
#[case(TrieKind::GlobalHash)]
#[should_panic(expected = "is sealed")]
fn test_insert_into_sealed_level(#[case] kind: TrieKind) {
    let levels = [vec![(vec![2], Payload::prob_only(-1.0))]];
    let mut trie = build_trie(kind, &levels, true);
    let _ = trie.add(&MGramId::new(&[3]), Payload::prob_only(-1.0));
}

#[rstest]
#[case(TrieKind::ContextHash)]
#[case(TrieKind::WordContextArray)]
#[should_panic(expected = "must be sealed")]
fn test_insert_before_lower_level_sealed(#[case] kind: TrieKind) {
    let mut trie = TrieStore::new(kind, 2, &LmConfig::new());
    trie.add(&MGramId::new(&[2]), Payload::prob_only(-1.0)).unwrap();
    let _ = trie.add(&MGramId::new(&[2, 2]), Payload::prob_only(-1.0));
}

#[test]
fn test_missing_context() {
    for kind in TrieKind::iter().filter(|k| *k != TrieKind::GlobalHash) {
        let levels = [
            vec![(vec![2], Payload::prob_only(-1.0))],
            vec![(vec![2, 2], Payload::prob_only(-1.0))],
        ];
        let mut trie = TrieStore::new(kind, 3, &LmConfig::new());
        for (level, entries) in levels.iter().enumerate() {
            for (words, payload) in entries {
                trie.add(&MGramId::new(words), *payload).unwrap();
            }
            trie.seal_level(level + 1).unwrap();
        }

        let result = trie.add(&MGramId::new(&[3, 2, 2]), Payload::prob_only(-1.0));
        assert!(
            matches!(result, Err(LmError::MissingContext { level: 3, .. })),
            "{kind}: {result:?}"
        );
    }
}

#[rstest]
#[case(TrieKind::ContextArray)]
#[case(TrieKind::ContextHash)]
#[case(TrieKind::ContextWordArray)]
#[case(TrieKind::WordContextArray)]
#[case(TrieKind::WordContextHash)]
#[case(TrieKind::WordContextHybrid)]
#[case(TrieKind::GlobalHash)]
fn test_back_off(#[case] kind: TrieKind) {
    let levels = [
        vec![
            (vec![UNKNOWN_WORD_ID], Payload::prob_only(-3.0)),
            (vec![2], Payload::new(-1.0, -0.25)),
            (vec![3], Payload::new(-2.0, -0.5)),
            (vec![4], Payload::new(-1.5, -0.75)),
        ],
        vec![
            (vec![2, 3], Payload::new(-0.5, -0.125)),
            (vec![3, 4], Payload::new(-0.25, -0.0625)),
        ],
        vec![(vec![2, 3, 4], Payload::prob_only(-0.1))],
    ];
    let trie = build_trie(kind, &levels, true);

    let cases: [(&[WordId], f32); 7] = [
        (&[2, 3, 4], -0.1),
        // (3, 2, 3) misses, bo(3, 2) is absent, (2, 3) hits
        (&[3, 2, 3], -0.5),
        // bo(4, 3) absent, (3, 4) hits
        (&[4, 3, 4], -0.25),
        // bo(2, 3) + bo(3) + p(2)
        (&[2, 3, 2], -0.125 - 0.5 - 1.0),
        // bo(2) + p(<unk>)
        (&[2, 9], -0.25 - 3.0),
        (&[9], -3.0),
        // only the last two words count in a trigram model
        (&[9, 9, 2, 3, 4], -0.1),
    ];
    for (words, expected) in cases {
        let log_prob = trie.log_prob(words);
        assert!(
            approx_eq!(f32, log_prob, expected, ulps = 2),
            "{kind}: {words:?} = {log_prob}, expected {expected}"
        );
    }
}

#[test]
fn test_default_unk_payload() {
    let config = LmConfig::new().unk_word_prob(-7.0);
    let mut trie = TrieStore::new(TrieKind::ContextHash, 1, &config);
    trie.add(&MGramId::new(&[2]), Payload::prob_only(-1.0)).unwrap();
    trie.seal_level(1).unwrap();

    assert_eq!(trie.unk_payload(), Payload::prob_only(-7.0));
    assert!(approx_eq!(f32, trie.log_prob(&[5]), -7.0, ulps = 1));
}

#[test]
fn test_memory_limit() {
    let config = LmConfig::new().memory_limit(Some(64));
    let mut trie = TrieStore::new(TrieKind::ContextHash, 2, &config);
    let result = trie.pre_allocate(&[100, 1000], true);

    assert!(matches!(result, Err(LmError::Capacity { limit: 64, .. })));
}

#[rstest]
fn test_inflated_count_is_only_a_hint(
    #[values(TrieKind::ContextArray, TrieKind::WordContextHybrid, TrieKind::GlobalHash)]
    kind: TrieKind,
) {
    let config = LmConfig::new().memory_limit(Some(1 << 26));
    let mut trie = TrieStore::new(kind, 2, &config);
    trie.pre_allocate(&[3, 4_000_000_000_000], true).unwrap();
    for w in 2..5 {
        trie.add(&MGramId::new(&[w]), Payload::new(-1.0, -0.1)).unwrap();
    }
    trie.seal_level(1).unwrap();
    trie.add(&MGramId::new(&[2, 3]), Payload::prob_only(-0.5)).unwrap();
    trie.seal_level(2).unwrap();

    assert_eq!(trie.level_len(2), 1);
    assert_eq!(trie.payload_of(&[2, 3]), Some(Payload::prob_only(-0.5)));
    assert!(trie.budget().used() < 1 << 26);
}

#[test]
fn test_staging_is_charged() {
    let config = LmConfig::new().memory_limit(Some(4096));
    let mut trie = TrieStore::new(TrieKind::ContextHash, 2, &config);
    trie.pre_allocate(&[2, 0], true).unwrap();
    trie.add(&MGramId::new(&[2]), Payload::new(-1.0, -0.1)).unwrap();
    trie.add(&MGramId::new(&[3]), Payload::new(-1.0, -0.1)).unwrap();
    trie.seal_level(1).unwrap();

    let result = (0..1000).try_for_each(|_| {
        trie.add(&MGramId::new(&[2, 3]), Payload::prob_only(-0.5))
    });
    assert!(matches!(result, Err(LmError::Capacity { limit: 4096, .. })));
}

#[test]
#[should_panic(expected = "no m-gram to look up")]
fn test_empty_lookup_panics() {
    let trie = build_trie(TrieKind::ContextHash, &model_entries(|w| w), true);
    trie.payload_of(&[]);
}
