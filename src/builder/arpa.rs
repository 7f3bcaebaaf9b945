use crate::{
    level::{MAX_LEVEL, ZERO_LOG_PROB},
    LmError,
};
use arrayvec::ArrayVec;

pub(crate) const DATA_MARKER: &str = "\\data\\";
pub(crate) const END_MARKER: &str = "\\end\\";

/// Classification of a trimmed, non-empty ARPA line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArpaLine {
    Data,
    /// `\k-grams:`
    Section(usize),
    End,
    Other,
}

impl ArpaLine {
    pub(crate) fn classify(line: &str, line_no: usize) -> Result<Self, LmError> {
        if !line.starts_with('\\') {
            return Ok(Self::Other);
        }
        match line {
            DATA_MARKER => Ok(Self::Data),
            END_MARKER => Ok(Self::End),
            _ => {
                let level = line
                    .strip_prefix('\\')
                    .and_then(|l| l.strip_suffix("-grams:"))
                    .and_then(|l| atoi_simd::parse(l.as_bytes()).ok())
                    .ok_or_else(|| LmError::format(line_no, format!("unknown section {line:?}")))?;
                Ok(Self::Section(level))
            }
        }
    }
}

/// Parses `ngram k=count`.
pub(crate) fn parse_count(line: &str, line_no: usize) -> Result<(usize, usize), LmError> {
    let invalid = || LmError::format(line_no, format!("invalid m-gram count line {line:?}"));
    let (level, count) = line
        .strip_prefix("ngram")
        .and_then(|rest| rest.trim().split_once('='))
        .ok_or_else(invalid)?;
    let level: usize = atoi_simd::parse(level.trim().as_bytes()).map_err(|_| invalid())?;
    let count: usize = atoi_simd::parse(count.trim().as_bytes()).map_err(|_| invalid())?;
    Ok((level, count))
}

#[derive(Debug, PartialEq)]
pub(crate) struct ArpaGram<'l> {
    pub(crate) prob: f32,
    pub(crate) words: ArrayVec<&'l str, MAX_LEVEL>,
    pub(crate) back_off: f32,
}

fn parse_log10(token: &str, line_no: usize) -> Result<f32, LmError> {
    let value: f32 = token
        .parse()
        .map_err(|_| LmError::format(line_no, format!("invalid log10 value {token:?}")))?;
    if value.is_nan() || value == f32::INFINITY {
        return Err(LmError::format(line_no, format!("invalid log10 value {token:?}")));
    }
    // some toolkits write -inf for zero probability
    Ok(value.max(ZERO_LOG_PROB))
}

/// Parses `prob w1 .. wk [back-off]`, fields separated by any whitespace.
pub(crate) fn parse_gram(line: &str, level: usize, line_no: usize) -> Result<ArpaGram<'_>, LmError> {
    let mut tokens = line.split_whitespace();
    let prob = match tokens.next() {
        Some(token) => parse_log10(token, line_no)?,
        None => return Err(LmError::format(line_no, "empty m-gram line")),
    };

    let mut words = ArrayVec::new_const();
    for _ in 0..level {
        let word = tokens.next().ok_or_else(|| {
            LmError::format(line_no, format!("expected {level} words in {line:?}"))
        })?;
        words.push(word);
    }

    let back_off = match tokens.next() {
        Some(token) => parse_log10(token, line_no)?,
        None => 0.0,
    };
    if tokens.next().is_some() {
        return Err(LmError::format(
            line_no,
            format!("too many fields for a {level}-gram in {line:?}"),
        ));
    }

    Ok(ArpaGram {
        prob,
        words,
        back_off,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("\\data\\", ArpaLine::Data)]
    #[case("\\end\\", ArpaLine::End)]
    #[case("\\3-grams:", ArpaLine::Section(3))]
    #[case("ngram 1=5", ArpaLine::Other)]
    fn test_classify(#[case] line: &str, #[case] expected: ArpaLine) {
        assert_eq!(ArpaLine::classify(line, 1).unwrap(), expected);
    }

    #[test]
    fn test_classify_unknown_section() {
        assert!(matches!(
            ArpaLine::classify("\\x-grams:", 7),
            Err(LmError::Format { line: 7, .. })
        ));
    }

    #[rstest]
    #[case("ngram 1=3", (1, 3))]
    #[case("ngram 2 = 1200", (2, 1200))]
    fn test_parse_count(#[case] line: &str, #[case] expected: (usize, usize)) {
        assert_eq!(parse_count(line, 1).unwrap(), expected);
    }

    #[rstest]
    #[case("ngram 1=x")]
    #[case("ngram =3")]
    #[case("unigrams 3")]
    fn test_parse_count_invalid(#[case] line: &str) {
        assert!(matches!(parse_count(line, 2), Err(LmError::Format { line: 2, .. })));
    }

    #[test]
    fn test_parse_gram() {
        let gram = parse_gram("-0.5\tthe cat\t-0.25", 2, 1).unwrap();
        assert_eq!(gram.prob, -0.5);
        assert_eq!(gram.words.as_slice(), &["the", "cat"]);
        assert_eq!(gram.back_off, -0.25);

        let gram = parse_gram("-1.5 <s>", 1, 1).unwrap();
        assert_eq!(gram.words.as_slice(), &["<s>"]);
        assert_eq!(gram.back_off, 0.0);

        let gram = parse_gram("-inf <s> -1", 1, 1).unwrap();
        assert_eq!(gram.prob, ZERO_LOG_PROB);
    }

    #[rstest]
    #[case("abc the", 1)]
    #[case("-0.5 the", 2)]
    #[case("-0.5 the cat -0.1 extra", 2)]
    #[case("-0.5 the cat nan", 2)]
    fn test_parse_gram_invalid(#[case] line: &str, #[case] level: usize) {
        assert!(matches!(
            parse_gram(line, level, 9),
            Err(LmError::Format { line: 9, .. })
        ));
    }
}
