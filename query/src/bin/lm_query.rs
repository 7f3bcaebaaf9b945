use ::std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    time::Instant,
};
use backoff_lm::{LanguageModel, LmConfig, LmError};
use clap::Parser;
use rayon::prelude::*;

/// Builds a model from an ARPA file and scores one query per line.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// ARPA model file
    #[arg(short = 'm', required = true)]
    model: PathBuf,

    /// Queries, one whitespace-separated sequence per line; stdin if omitted
    #[arg(short = 'q')]
    queries: Option<PathBuf>,

    /// Score every word of a query instead of only the last one
    #[arg(short = 'c', long)]
    cumulative: bool,

    /// Model options as key=value, e.g. `-o trie-variant=context-array`
    #[arg(short = 'o', long = "option")]
    options: Vec<String>,
}

fn read_queries(path: Option<&PathBuf>) -> Result<Vec<String>, LmError> {
    let lines: io::Result<Vec<String>> = match path {
        Some(path) => BufReader::new(File::open(path)?).lines().collect(),
        None => io::stdin().lock().lines().collect(),
    };
    Ok(lines?)
}

fn score_line(model: &LanguageModel, line: &str, cumulative: bool) -> String {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }
    if !cumulative {
        return format!("log10( p( {line} ) ) = {}", model.score_words(&words));
    }

    let score = model.score_sequence(&words);
    let mut out = String::new();
    for (i, log_prob) in score.log_probs.iter().enumerate() {
        let begin = (i + 1).saturating_sub(model.max_order());
        out.push_str(&format!(
            "log10( p( {} ) ) = {log_prob}\n",
            words[begin..=i].join(" ")
        ));
    }
    out.push_str(&format!("log10( p( {line} ) ) = {}", score.total));
    out
}

fn main() -> Result<(), LmError> {
    let args = Args::parse();
    let config = LmConfig::from_options(args.options.iter().map(String::as_str))?;

    let start = Instant::now();
    let model = LanguageModel::from_arpa_file(&args.model, config)?;
    let stats = model.stats();
    println!(
        "Loaded {}-gram model in {:?}: m-grams {:?}, {} words, {}MB",
        model.max_order(),
        start.elapsed(),
        stats.level_counts,
        stats.words,
        (stats.word_index_bytes + stats.trie_bytes) / (1024 * 1024)
    );

    let queries = read_queries(args.queries.as_ref())?;
    let start = Instant::now();
    let results: Vec<String> = queries
        .par_iter()
        .map(|line| score_line(&model, line.trim(), args.cumulative))
        .collect();
    for result in results.iter().filter(|r| !r.is_empty()) {
        println!("{result}");
    }
    println!("Scored {} queries in {:?}", results.len(), start.elapsed());

    Ok(())
}
