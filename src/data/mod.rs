mod error;

pub use error::DataError;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Files of a parallel corpus, in field order.
pub const CORPUS_FILES: [&str; 4] = ["prev.txt", "updated.txt", "trg.txt", "ids.txt"];

pub const TIMESTAMPS_FILE: &str = "timestamps.txt";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub dataset_root: PathBuf,
    pub batch_size: usize,
    /// Examples whose src or trg is longer than this are dropped.
    pub max_sequence_length: usize,
    pub token_min_freq: usize,
    pub lower: bool,
    pub leave_only_changed: bool,
    pub shuffle: bool,
    pub tokens: TokensConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("data"),
            batch_size: 32,
            max_sequence_length: 100,
            token_min_freq: 1,
            lower: false,
            leave_only_changed: true,
            shuffle: true,
            tokens: TokensConfig::default(),
        }
    }
}

/// Special tokens for the vocabulary and the diff markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokensConfig {
    pub unk: String,
    pub pad: String,
    pub sos: String,
    pub eos: String,
    pub replacement: String,
    pub deletion: String,
    pub addition: String,
    pub unchanged: String,
    pub padding: String,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            unk: "<unk>".to_string(),
            pad: "<pad>".to_string(),
            sos: "<s>".to_string(),
            eos: "</s>".to_string(),
            replacement: "<replacement>".to_string(),
            deletion: "<deletion>".to_string(),
            addition: "<addition>".to_string(),
            unchanged: "<unchanged>".to_string(),
            padding: "<padding>".to_string(),
        }
    }
}

impl TokensConfig {
    pub fn all(&self) -> [&str; 9] {
        [
            &self.unk,
            &self.pad,
            &self.sos,
            &self.eos,
            &self.replacement,
            &self.deletion,
            &self.addition,
            &self.unchanged,
            &self.padding,
        ]
    }
}

/// One mined code change. Fields are single lines of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSample {
    pub prev: String,
    pub updated: String,
    pub trg: String,
    pub id: String,
}

impl DataSample {
    pub fn new(
        prev: impl Into<String>,
        updated: impl Into<String>,
        trg: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            prev: prev.into(),
            updated: updated.into(),
            trg: trg.into(),
            id: id.into(),
        }
    }

    pub fn fields(&self) -> [&str; 4] {
        [&self.prev, &self.updated, &self.trg, &self.id]
    }

    /// Index of the commit this sample came from.
    pub fn corpus_index(&self) -> Result<usize, DataError> {
        self.id
            .trim()
            .parse()
            .map_err(|_| DataError::InvalidId {
                value: self.id.clone(),
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    samples: Vec<DataSample>,
}

impl Corpus {
    pub fn new(samples: Vec<DataSample>) -> Self {
        Self { samples }
    }

    /// Reads the parallel files in `root` and zips them into samples.
    pub fn read_dir(root: &Path) -> Result<Self, DataError> {
        let [prev, updated, trg, ids] = CORPUS_FILES.map(|name| read_lines(&root.join(name)));
        let (prev, updated, trg, ids) = (prev?, updated?, trg?, ids?);

        let expected = prev.len();
        for (name, found) in CORPUS_FILES[1..]
            .iter()
            .zip([updated.len(), trg.len(), ids.len()])
        {
            if found != expected {
                return Err(DataError::LineCountMismatch {
                    path: root.join(name),
                    expected,
                    found,
                });
            }
        }

        let samples = prev
            .into_iter()
            .zip(updated)
            .zip(trg)
            .zip(ids)
            .map(|(((prev, updated), trg), id)| DataSample {
                prev,
                updated,
                trg,
                id,
            })
            .collect();

        tracing::debug!(root = %root.display(), samples = expected, "read corpus");
        Ok(Self { samples })
    }

    /// Writes one file per field into `root`, creating the directory if needed.
    pub fn write_dir(&self, root: &Path) -> Result<(), DataError> {
        fs::create_dir_all(root).map_err(|e| DataError::io(root, e))?;
        for (field, name) in CORPUS_FILES.iter().enumerate() {
            let lines = self.samples.iter().map(|s| s.fields()[field]);
            write_lines(&root.join(name), lines)?;
        }
        tracing::debug!(root = %root.display(), samples = self.samples.len(), "wrote corpus");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataSample> {
        self.samples.iter()
    }

    pub fn samples(&self) -> &[DataSample] {
        &self.samples
    }

    pub fn push(&mut self, sample: DataSample) {
        self.samples.push(sample);
    }

    /// Copies the samples at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> Corpus {
        Corpus {
            samples: indices.iter().map(|&i| self.samples[i].clone()).collect(),
        }
    }

    pub fn truncate(&mut self, n: usize) {
        self.samples.truncate(n);
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.samples.shuffle(rng);
    }
}

/// Reads a text file as lines, without line terminators.
pub fn read_lines(path: &Path) -> Result<Vec<String>, DataError> {
    let content = fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
    Ok(content.lines().map(String::from).collect())
}

/// Writes every line followed by `\n`.
pub fn write_lines<'a, I>(path: &Path, lines: I) -> Result<(), DataError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut content = String::new();
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    fs::write(path, content).map_err(|e| DataError::io(path, e))
}

/// Reads a timestamp table: one number of seconds per line.
pub fn read_timestamps(path: &Path) -> Result<Vec<f64>, DataError> {
    read_lines(path)?
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            line.trim()
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite())
                .ok_or_else(|| DataError::InvalidTimestamp {
                    path: path.to_path_buf(),
                    line: i + 1,
                    value: line,
                })
        })
        .collect()
}

pub fn write_timestamps(path: &Path, timestamps: &[i64]) -> Result<(), DataError> {
    let lines: Vec<String> = timestamps.iter().map(|t| t.to_string()).collect();
    write_lines(path, lines.iter().map(String::as_str))
}

/// Looks up each sample's timestamp through its id.
pub fn timestamps_for(corpus: &Corpus, table: &[f64]) -> Result<Vec<f64>, DataError> {
    corpus
        .iter()
        .map(|sample| {
            let id = sample.corpus_index()?;
            table.get(id).copied().ok_or(DataError::IdOutOfRange {
                id,
                len: table.len(),
            })
        })
        .collect()
}
