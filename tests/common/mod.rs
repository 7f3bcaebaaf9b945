#![allow(dead_code)]

use ::std::fmt::Write;

pub const SCENARIO: &str = "\\data\\
ngram 1=3
ngram 2=1

\\1-grams:
-1.0\tthe\t-0.1
-2.0\tcat
-3.0\t<unk>

\\2-grams:
-0.5\tthe cat

\\end\\
";

pub fn word(i: usize) -> String {
    format!("w{i}")
}

/// A consistent trigram model over `vocab` words: every m-gram's
/// prefix is in the model.
pub fn synthetic_arpa(vocab: usize) -> String {
    let mut unigrams = Vec::new();
    let mut bigrams = Vec::new();
    let mut trigrams = Vec::new();

    unigrams.push(format!("-2.5\t<unk>\t-0.3"));
    for a in 0..vocab {
        unigrams.push(format!(
            "{:.4}\t{}\t{:.4}",
            -1.0 - (a % 13) as f32 / 10.0,
            word(a),
            -0.1 - (a % 5) as f32 / 20.0
        ));
        for b in (0..vocab).filter(|b| (a * 31 + b * 17) % 5 == 0) {
            bigrams.push(format!(
                "{:.4}\t{} {}\t{:.4}",
                -0.5 - ((a + b) % 7) as f32 / 10.0,
                word(a),
                word(b),
                -0.05 - ((a * b) % 3) as f32 / 20.0
            ));
            for c in (0..vocab).filter(|c| (a + b * 3 + c * 7) % 11 == 0) {
                trigrams.push(format!(
                    "{:.4}\t{} {} {}",
                    -0.2 - ((a + b + c) % 9) as f32 / 10.0,
                    word(a),
                    word(b),
                    word(c)
                ));
            }
        }
    }

    let mut arpa = String::from("produced for tests\n\n\\data\\\n");
    for (level, lines) in [&unigrams, &bigrams, &trigrams].iter().enumerate() {
        writeln!(arpa, "ngram {}={}", level + 1, lines.len()).unwrap();
    }
    for (level, lines) in [&unigrams, &bigrams, &trigrams].iter().enumerate() {
        writeln!(arpa, "\n\\{}-grams:", level + 1).unwrap();
        for line in lines.iter() {
            writeln!(arpa, "{line}").unwrap();
        }
    }
    arpa.push_str("\n\\end\\\n");
    arpa
}

/// Every word triple over a few known words and one unknown word.
pub fn queries(vocab: usize) -> Vec<Vec<String>> {
    let words: Vec<String> = (0..vocab)
        .step_by((vocab / 6).max(1))
        .map(word)
        .chain(["unseen".to_owned()])
        .collect();
    let mut queries = Vec::new();
    for a in &words {
        for b in &words {
            queries.push(vec![b.clone()]);
            queries.push(vec![a.clone(), b.clone()]);
            for c in &words {
                queries.push(vec![a.clone(), b.clone(), c.clone()]);
            }
        }
    }
    queries
}
