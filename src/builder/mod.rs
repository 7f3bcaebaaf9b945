mod arpa;

use crate::{
    arena::MemoryBudget,
    level::MAX_LEVEL,
    m_gram::{MGramId, MGramWords, Payload},
    trie::{TrieStore, MAX_PRE_SIZE},
    word_index::{WordId, WordIndex, WordIndexStore, UNKNOWN_WORD_ID, UNKNOWN_WORD_STR},
    LanguageModel, LmConfig, LmError,
};
use ::core::mem::size_of;
use ::std::io::BufRead;
use arpa::{parse_count, parse_gram, ArpaLine, DATA_MARKER};
use arrayvec::ArrayVec;
use compact_str::CompactString;
use itertools::Itertools;
use tracing::{debug, info};

pub(crate) type LevelCounts = ArrayVec<usize, MAX_LEVEL>;

type Unigram = (CompactString, Payload);

#[inline]
fn heap_bytes(word: &CompactString) -> usize {
    if word.is_heap_allocated() {
        word.capacity()
    } else {
        0
    }
}

/// Reads an ARPA model into a [`LanguageModel`].
///
/// Levels are built one after another and sealed as soon as the next
/// section starts, so a failed build never yields a partial model.
#[derive(Debug)]
pub struct ArpaBuilder<R> {
    reader: R,
    line: String,
    line_no: usize,
    config: LmConfig,
}

impl<R: BufRead> ArpaBuilder<R> {
    #[inline]
    pub fn new(reader: R, config: LmConfig) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
            config,
        }
    }

    /// Reads the next non-empty line into `self.line`, trimmed.
    /// `false` at the end of input.
    fn next_line(&mut self) -> Result<bool, LmError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(false);
            }
            self.line_no += 1;

            let end = self.line.trim_end().len();
            self.line.truncate(end);
            let start = self.line.len() - self.line.trim_start().len();
            if start < self.line.len() {
                self.line.drain(..start);
                return Ok(true);
            }
        }
    }

    fn next_line_or_eof_error(&mut self, reading: &str) -> Result<(), LmError> {
        if self.next_line()? {
            Ok(())
        } else {
            Err(LmError::format(
                self.line_no,
                format!("unexpected end of file while reading {reading}"),
            ))
        }
    }

    /// Skips free text up to `\data\` and reads the m-gram counts.
    /// Leaves the first section header in `self.line`.
    fn read_header(&mut self) -> Result<LevelCounts, LmError> {
        loop {
            self.next_line_or_eof_error("the ARPA header")?;
            if self.line == DATA_MARKER {
                break;
            }
        }

        let mut counts = LevelCounts::new_const();
        loop {
            self.next_line_or_eof_error("the m-gram counts")?;
            if self.line.starts_with('\\') {
                break;
            }
            let (level, count) = parse_count(&self.line, self.line_no)?;
            if level != counts.len() + 1 {
                return Err(LmError::format(
                    self.line_no,
                    format!("expected the count of level {}, got level {level}", counts.len() + 1),
                ));
            }
            if level > MAX_LEVEL || level > self.config.max_order {
                return Err(LmError::OrderMismatch {
                    declared: level,
                    configured: self.config.max_order,
                });
            }
            counts.push(count);
        }

        if counts.is_empty() {
            return Err(LmError::format(self.line_no, "no m-gram counts in the header"));
        }
        Ok(counts)
    }

    /// Reads unigram lines until the next section header. The buffer
    /// and long words are charged to `budget`; the declared count only
    /// pre-sizes the buffer up to [`MAX_PRE_SIZE`].
    fn read_unigrams(
        &mut self,
        expected: usize,
        budget: &mut MemoryBudget,
    ) -> Result<Vec<Unigram>, LmError> {
        let mut unigrams = Vec::new();
        budget.reserve(&mut unigrams, expected.min(MAX_PRE_SIZE))?;
        loop {
            self.next_line_or_eof_error("the 1-grams")?;
            if self.line.starts_with('\\') {
                return Ok(unigrams);
            }
            let gram = parse_gram(&self.line, 1, self.line_no)?;
            let word = CompactString::from(gram.words[0]);
            budget.charge(heap_bytes(&word))?;
            budget.push(&mut unigrams, (word, Payload::new(gram.prob, gram.back_off)))?;
        }
    }

    /// Frees the unigram buffer and returns its bytes to `budget`.
    fn release_unigrams(unigrams: Vec<Unigram>, budget: &mut MemoryBudget) {
        let bytes = unigrams.capacity() * size_of::<Unigram>()
            + unigrams.iter().map(|(word, _)| heap_bytes(word)).sum::<usize>();
        drop(unigrams);
        budget.release(bytes);
    }

    /// Adds the m-grams of `level` until the next section header,
    /// returns their number. `<unk>` is accepted only if the 1-grams
    /// list it.
    fn read_level(
        &mut self,
        level: usize,
        word_index: &WordIndexStore,
        has_unk: bool,
        trie: &mut TrieStore,
    ) -> Result<usize, LmError> {
        let lm_weight = self.config.lm_weight;
        let mut added = 0;
        loop {
            self.next_line_or_eof_error(&format!("the {level}-grams"))?;
            if self.line.starts_with('\\') {
                return Ok(added);
            }
            let gram = parse_gram(&self.line, level, self.line_no)?;

            let mut ids = MGramWords::new_const();
            for word in &gram.words {
                let id = word_index.get_id(word);
                if id == UNKNOWN_WORD_ID && (*word != UNKNOWN_WORD_STR || !has_unk) {
                    return Err(LmError::format(
                        self.line_no,
                        format!("word {word:?} is not in the 1-grams"),
                    ));
                }
                ids.push(id);
            }
            let payload = Payload::new(gram.prob, gram.back_off).weighted(lm_weight);
            trie.add(&MGramId::new(&ids), payload)
                .map_err(|e| e.at_line(self.line_no))?;
            added += 1;
        }
    }

    /// Registers the unigram words, ranking them first if the
    /// strategy asks for it. The index is charged to `budget` as it grows
    /// and stays charged; the returned ids are charged too.
    fn index_words(
        word_index: &mut WordIndexStore,
        unigrams: &[Unigram],
        budget: &mut MemoryBudget,
    ) -> Result<Vec<WordId>, LmError> {
        let mut charged = 0;
        word_index.reserve(unigrams.len());
        budget.recharge(&mut charged, word_index.allocated_bytes())?;
        if word_index.needs_counts() {
            for (word, payload) in unigrams {
                word_index.count_word(word, payload.prob);
                budget.recharge(&mut charged, word_index.allocated_bytes())?;
            }
        }

        let mut ids = Vec::new();
        budget.reserve(&mut ids, unigrams.len())?;
        for (word, _) in unigrams {
            ids.push(word_index.get_or_add(word));
            budget.recharge(&mut charged, word_index.allocated_bytes())?;
        }
        word_index.finalize();
        budget.recharge(&mut charged, word_index.allocated_bytes())?;
        info!(
            "word index ({}): {} words, {charged} bytes",
            word_index.kind(),
            word_index.len()
        );
        Ok(ids)
    }

    pub fn build(mut self) -> Result<LanguageModel, LmError> {
        self.config.validate()?;
        let counts = self.read_header()?;
        let max_level = counts.len();
        info!(
            "ARPA header: {max_level}-gram model, m-gram counts {}",
            counts.iter().join(" ")
        );

        match ArpaLine::classify(&self.line, self.line_no)? {
            ArpaLine::Section(1) => {}
            ArpaLine::Section(found) => {
                return Err(LmError::SectionOrder {
                    expected: 1,
                    found,
                    line: self.line_no,
                })
            }
            _ => {
                return Err(LmError::format(
                    self.line_no,
                    format!("expected \\1-grams:, got {:?}", self.line),
                ))
            }
        }

        let mut trie = TrieStore::new(self.config.trie_kind, max_level, &self.config);
        let unigrams = self.read_unigrams(counts[0], trie.budget_mut())?;
        if unigrams.len() != counts[0] {
            return Err(LmError::CountMismatch {
                level: 1,
                declared: counts[0],
                actual: unigrams.len(),
            });
        }
        let has_unk = unigrams.iter().any(|(word, _)| word.as_str() == UNKNOWN_WORD_STR);

        let mut word_index = WordIndexStore::new(self.config.word_index_kind);
        let ids = Self::index_words(&mut word_index, &unigrams, trie.budget_mut())?;

        trie.pre_allocate(&counts, word_index.is_continuous())?;
        for (&id, (_, payload)) in ids.iter().zip(&unigrams) {
            trie.add(&MGramId::new(&[id]), payload.weighted(self.config.lm_weight))?;
        }
        trie.budget_mut().release(ids.capacity() * size_of::<WordId>());
        drop(ids);
        Self::release_unigrams(unigrams, trie.budget_mut());
        trie.seal_level(1)?;

        for level in 2..=max_level {
            let actual = match ArpaLine::classify(&self.line, self.line_no)? {
                ArpaLine::Section(found) if found == level => {
                    self.read_level(level, &word_index, has_unk, &mut trie)?
                }
                ArpaLine::Section(found) => {
                    return Err(LmError::SectionOrder {
                        expected: level,
                        found,
                        line: self.line_no,
                    })
                }
                ArpaLine::End => 0,
                ArpaLine::Data | ArpaLine::Other => {
                    return Err(LmError::format(
                        self.line_no,
                        format!("unexpected {:?}", self.line),
                    ))
                }
            };
            if actual != counts[level - 1] {
                return Err(LmError::CountMismatch {
                    level,
                    declared: counts[level - 1],
                    actual,
                });
            }
            trie.seal_level(level)?;
            debug!("{level}-grams: {} bytes used so far", trie.budget().used());
        }

        match ArpaLine::classify(&self.line, self.line_no)? {
            ArpaLine::End => {}
            _ => {
                return Err(LmError::format(
                    self.line_no,
                    format!(
                        "expected \\end\\ after the {max_level}-grams, got {:?}",
                        self.line
                    ),
                ))
            }
        }

        Ok(LanguageModel::from_parts(self.config, word_index, trie))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trie::TrieKind;
    use rstest::*;

    const MODEL: &str = "some free text\n\n\\data\\\nngram 1=3\nngram 2=2\n\n\\1-grams:\n-1.0\t<unk>\n-0.8\tthe\t-0.3\n-1.2\tcat\t-0.2\n\n\\2-grams:\n-0.5\tthe cat\n-0.7\tcat the\n\n\\end\\\n";

    fn build(text: &str) -> Result<LanguageModel, LmError> {
        ArpaBuilder::new(text.as_bytes(), LmConfig::new()).build()
    }

    #[test]
    fn test_build() {
        let model = build(MODEL).unwrap();

        assert_eq!(model.max_order(), 2);
        assert_eq!(model.stats().level_counts, vec![3, 2]);
    }

    #[rstest]
    #[case::no_data("\\1-grams:\n-1.0 a\n\\end\\\n")]
    #[case::unknown_word("\\data\\\nngram 1=1\nngram 2=1\n\\1-grams:\n-1 a\n\\2-grams:\n-1 a b\n\\end\\\n")]
    #[case::unk_without_unigram("\\data\\\nngram 1=1\nngram 2=1\n\\1-grams:\n-1 a\n\\2-grams:\n-1 a <unk>\n\\end\\\n")]
    #[case::no_end("\\data\\\nngram 1=1\n\\1-grams:\n-1 a\n")]
    #[case::trailing_section("\\data\\\nngram 1=1\n\\1-grams:\n-1 a\n\\2-grams:\n-1 a a\n\\end\\\n")]
    #[case::gap_in_counts("\\data\\\nngram 1=1\nngram 3=1\n\\1-grams:\n-1 a\n\\end\\\n")]
    fn test_format_errors(#[case] text: &str) {
        assert!(matches!(build(text), Err(LmError::Format { .. })), "{text:?}");
    }

    #[test]
    fn test_count_shortfall() {
        let text = MODEL.replace("ngram 2=2", "ngram 2=3");
        assert!(matches!(
            build(&text),
            Err(LmError::CountMismatch {
                level: 2,
                declared: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_section_order() {
        let text = "\\data\\\nngram 1=1\nngram 2=1\nngram 3=1\n\\1-grams:\n-1 a\n\\3-grams:\n-1 a a a\n\\end\\\n";
        assert!(matches!(
            build(text),
            Err(LmError::SectionOrder {
                expected: 2,
                found: 3,
                line: 7
            })
        ));
    }

    #[test]
    fn test_order_above_config() {
        let result = ArpaBuilder::new(MODEL.as_bytes(), LmConfig::new().max_order(1)).build();
        assert!(matches!(
            result,
            Err(LmError::OrderMismatch {
                declared: 2,
                configured: 1
            })
        ));
    }

    #[test]
    fn test_missing_context_line() {
        let text = "\\data\\\nngram 1=2\nngram 2=1\nngram 3=1\n\\1-grams:\n-1 a\n-1 b\n\\2-grams:\n-1 a b\n\\3-grams:\n-1 b a b\n\\end\\\n";
        let result = ArpaBuilder::new(
            text.as_bytes(),
            LmConfig::new().trie_kind(TrieKind::ContextArray),
        )
        .build();
        assert!(matches!(
            result,
            Err(LmError::MissingContext { level: 3, line: 11 })
        ));
    }
}
