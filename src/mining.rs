use anyhow::{bail, Context, Result};
use git2::{DiffOptions, Oid, Patch, Repository};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::data::{self, Corpus, DataSample, TIMESTAMPS_FILE};
use crate::preprocessing::CTokenizer;
use crate::vocab::Counter;

pub const IDENTIFIER_COUNTER_FILE: &str = "identifier_names_counter.json";

/// One entry of a commit list: the hash and, when present, its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub hash: String,
    pub label: Option<String>,
}

/// Text after the last `": "`, e.g. `commit: abc123` -> `abc123`.
fn field_value(line: &str) -> &str {
    line.rsplit(": ").next().unwrap_or(line).trim()
}

/// Parses a commit list where each commit takes two lines,
/// `commit: <hash>` followed by `label: <label>`.
pub fn parse_commit_list(content: &str) -> Vec<CommitEntry> {
    let lines: Vec<&str> = content.lines().collect();
    lines
        .chunks(2)
        .map(|pair| CommitEntry {
            hash: field_value(pair[0]).to_string(),
            label: pair.get(1).map(|l| field_value(l).to_string()),
        })
        .collect()
}

pub fn read_commit_list(path: &Path) -> Result<Vec<CommitEntry>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    Ok(parse_commit_list(&content))
}

/// Rewrites a two-line commit list as one `<hash>: <label>` line per commit.
pub fn convert_commit_list(root: &Path, commits_file: &str, new_file: &str) -> Result<usize> {
    let entries = read_commit_list(&root.join(commits_file))?;
    let lines: Vec<String> = entries
        .iter()
        .filter_map(|e| match &e.label {
            Some(label) => Some(format!("{}: {}", e.hash, label)),
            None => {
                tracing::warn!(hash = %e.hash, "commit without label dropped");
                None
            }
        })
        .collect();
    data::write_lines(&root.join(new_file), lines.iter().map(String::as_str))?;
    Ok(lines.len())
}

fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar
}

/// Author time (UTC seconds) of each commit.
pub fn commit_timestamps(repo: &Repository, hashes: &[String]) -> Result<Vec<i64>> {
    let bar = progress_bar(hashes.len(), "Reading commit dates");
    let mut timestamps = Vec::with_capacity(hashes.len());
    for hash in hashes {
        let oid = Oid::from_str(hash).with_context(|| format!("bad commit hash {hash:?}"))?;
        let commit = repo
            .find_commit(oid)
            .with_context(|| format!("commit {hash} not found"))?;
        timestamps.push(commit.author().when().seconds());
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(timestamps)
}

/// Writes `root/timestamps.txt` for the commits listed in `commits_file`.
pub fn extract_timestamps(root: &Path, commits_file: &Path, repo_path: &Path) -> Result<Vec<i64>> {
    let hashes: Vec<String> = read_commit_list(commits_file)?
        .into_iter()
        .map(|e| e.hash)
        .collect();
    let repo = Repository::open(repo_path)?;
    let timestamps = commit_timestamps(&repo, &hashes)?;

    fs::create_dir_all(root)?;
    data::write_timestamps(&root.join(TIMESTAMPS_FILE), &timestamps)?;
    tracing::info!(commits = timestamps.len(), "wrote timestamps");
    Ok(timestamps)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Only files with one of these extensions are mined.
    pub extensions: Vec<String>,
    pub context_lines: u32,
    /// Hunks with more tokens on either side are skipped.
    pub max_tokens: usize,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["c".to_string(), "h".to_string()],
            context_lines: 0,
            max_tokens: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiningStats {
    pub commits: usize,
    pub missing_commits: usize,
    pub hunks: usize,
    pub skipped_hunks: usize,
    pub samples: usize,
}

impl MiningStats {
    pub fn print(&self, identifiers: &Counter) {
        println!("Commits processed: {}", self.commits);
        println!("Commits not found: {}", self.missing_commits);
        println!("Hunks seen: {}", self.hunks);
        println!("Hunks skipped: {}", self.skipped_hunks);
        println!("Samples: {}", self.samples);
        println!("Distinct identifiers: {}", identifiers.len());
    }
}

/// Result of mining: the corpus, identifier frequencies and statistics.
#[derive(Debug)]
pub struct MinedDataset {
    pub corpus: Corpus,
    pub identifiers: Counter,
    pub stats: MiningStats,
}

impl MinedDataset {
    pub fn write(&self, root: &Path) -> Result<()> {
        self.corpus.write_dir(root)?;
        self.identifiers.save(&root.join(IDENTIFIER_COUNTER_FILE))?;
        Ok(())
    }

    pub fn load(root: &Path) -> Result<Self> {
        let corpus = Corpus::read_dir(root)?;
        let identifiers = Counter::load(&root.join(IDENTIFIER_COUNTER_FILE))?;
        let stats = MiningStats {
            samples: corpus.len(),
            ..MiningStats::default()
        };
        Ok(Self {
            corpus,
            identifiers,
            stats,
        })
    }
}

/// Turns every hunk of every listed commit into a sample.
///
/// The sample id is the commit's position in `commits`, so it indexes the
/// timestamp table produced by [`extract_timestamps`] for the same list.
pub fn mine_commits(
    repo: &Repository,
    commits: &[CommitEntry],
    config: &MiningConfig,
) -> Result<MinedDataset> {
    let tokenizer = CTokenizer::new()?;
    let mut corpus = Corpus::default();
    let mut identifiers = Counter::new();
    let mut stats = MiningStats::default();

    let bar = progress_bar(commits.len(), "Mining commits");
    for (id, entry) in commits.iter().enumerate() {
        bar.inc(1);
        let commit = match Oid::from_str(&entry.hash).and_then(|oid| repo.find_commit(oid)) {
            Ok(commit) => commit,
            Err(e) => {
                tracing::warn!(hash = %entry.hash, error = %e, "skipping commit");
                stats.missing_commits += 1;
                continue;
            }
        };
        stats.commits += 1;

        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };
        let tree = commit.tree()?;
        let mut opts = DiffOptions::new();
        opts.context_lines(config.context_lines);
        opts.ignore_filemode(true);
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;

        for delta_idx in 0..diff.deltas().len() {
            let Some(patch) = Patch::from_diff(&diff, delta_idx)? else {
                continue;
            };
            let delta = patch.delta();
            let new_file = delta.new_file();
            let old_file = delta.old_file();
            let wanted = new_file
                .path()
                .or(old_file.path())
                .and_then(Path::extension)
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| config.extensions.iter().any(|e| e == ext));
            if !wanted {
                continue;
            }

            for hunk_idx in 0..patch.num_hunks() {
                stats.hunks += 1;
                let (prev, updated) = hunk_sides(&patch, hunk_idx)?;
                let (prev_tokens, prev_ids) = tokenizer.tokenize(&prev);
                let (updated_tokens, updated_ids) = tokenizer.tokenize(&updated);

                if prev_tokens == updated_tokens
                    || prev_tokens.len() > config.max_tokens
                    || updated_tokens.len() > config.max_tokens
                    || has_line_break(&prev_tokens)
                    || has_line_break(&updated_tokens)
                {
                    stats.skipped_hunks += 1;
                    continue;
                }

                identifiers.merge(&prev_ids);
                identifiers.merge(&updated_ids);
                corpus.push(DataSample::new(
                    prev_tokens.join(" "),
                    updated_tokens.join(" "),
                    entry.label.clone().unwrap_or_default(),
                    id.to_string(),
                ));
                stats.samples += 1;
            }
        }
    }
    bar.finish_with_message("Mining complete");

    Ok(MinedDataset {
        corpus,
        identifiers,
        stats,
    })
}

/// Sample fields are single lines of the parallel files.
fn has_line_break(tokens: &[String]) -> bool {
    tokens.iter().any(|t| t.contains(['\n', '\r']))
}

/// Removed and added text of one hunk. Context lines go to both sides.
fn hunk_sides(patch: &Patch, hunk_idx: usize) -> Result<(String, String)> {
    let mut prev = String::new();
    let mut updated = String::new();
    for line_idx in 0..patch.num_lines_in_hunk(hunk_idx)? {
        let line = patch.line_in_hunk(hunk_idx, line_idx)?;
        let content = String::from_utf8_lossy(line.content());
        match line.origin() {
            '-' => prev.push_str(&content),
            '+' => updated.push_str(&content),
            ' ' => {
                prev.push_str(&content);
                updated.push_str(&content);
            }
            _ => {}
        }
    }
    Ok((prev, updated))
}

/// Mines the commits described in `description_file` into `root`.
pub fn mine_dataset(
    root: &Path,
    description_file: &Path,
    repo_path: &Path,
    config: &MiningConfig,
) -> Result<MinedDataset> {
    if !description_file.is_file() {
        bail!("No such file: {}", description_file.display());
    }
    if !repo_path.is_dir() {
        bail!("No such directory: {}", repo_path.display());
    }
    if !root.is_dir() {
        tracing::info!(root = %root.display(), "creating output directory");
        fs::create_dir_all(root)?;
    }

    let commits = read_commit_list(description_file)?;
    let repo = Repository::open(repo_path)
        .with_context(|| format!("cannot open repository {}", repo_path.display()))?;
    let mined = mine_commits(&repo, &commits, config)?;
    mined.stats.print(&mined.identifiers);
    mined.write(root)?;
    Ok(mined)
}

/// Prints what a previous [`mine_dataset`] run left in `root`.
pub fn inspect(root: &Path) -> Result<MinedDataset> {
    if !root.is_dir() {
        bail!("No such directory: {}", root.display());
    }
    let mined = MinedDataset::load(root)?;
    println!("Samples: {}", mined.corpus.len());
    println!("Distinct identifiers: {}", mined.identifiers.len());
    println!("Most common identifiers:");
    for (name, count) in mined.identifiers.most_common(10) {
        println!("{:>20} {:>10}", name, count);
    }
    if let Some(first) = mined.corpus.samples().first() {
        println!("First sample (id {}, label {}):", first.id, first.trg);
        println!("prev: {}", first.prev);
        println!("updated: {}", first.updated);
    }
    Ok(mined)
}
