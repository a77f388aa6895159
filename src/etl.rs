//! In-place rewrites of a corpus directory.

use anyhow::{bail, Result};
use indicatif::ProgressBar;
use std::path::Path;

use crate::data::{self, Corpus};
use crate::mining::IDENTIFIER_COUNTER_FILE;
use crate::preprocessing::CTokenizer;
use crate::split::rng_from_seed;
use crate::vocab::Counter;

/// Keeps the first `n` samples of the corpus in `root`, optionally after a shuffle.
pub fn cut_dataset(root: &Path, n: usize, shuffle: bool, seed: Option<u64>) -> Result<usize> {
    let mut corpus = Corpus::read_dir(root)?;
    if shuffle {
        corpus.shuffle(&mut rng_from_seed(seed));
    }
    corpus.truncate(n);
    corpus.write_dir(root)?;
    tracing::info!(samples = corpus.len(), shuffle, "cut dataset");
    Ok(corpus.len())
}

/// Re-tokenizes `prev.txt` and `updated.txt` into `filtered_*.txt` and saves
/// the identifier frequencies next to them.
pub fn retokenize(root: &Path) -> Result<Counter> {
    if !root.is_dir() {
        bail!("No such directory: {}", root.display());
    }
    let tokenizer = CTokenizer::new()?;
    let mut identifiers = Counter::new();

    for name in ["prev.txt", "updated.txt"] {
        let lines = data::read_lines(&root.join(name))?;
        let bar = ProgressBar::new(lines.len() as u64);
        let mut tokenized = Vec::with_capacity(lines.len());
        for line in &lines {
            let (tokens, line_identifiers) = tokenizer.tokenize(line);
            tokenized.push(tokens.join(" "));
            identifiers.merge(&line_identifiers);
            bar.inc(1);
        }
        bar.finish_and_clear();

        let target = root.join(format!("filtered_{name}"));
        data::write_lines(&target, tokenized.iter().map(String::as_str))?;
        tracing::info!(file = %target.display(), lines = tokenized.len(), "re-tokenized");
    }

    identifiers.save(&root.join(IDENTIFIER_COUNTER_FILE))?;
    Ok(identifiers)
}
