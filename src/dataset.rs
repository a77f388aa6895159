use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;

use crate::data::{self, DataConfig};
use crate::differ::{DiffMarkers, Differ};
use crate::vocab::{Counter, Vocab};

/// One (prev, updated) pair with its diff, as token sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChangeExample {
    pub src: Vec<String>,
    pub trg: Vec<String>,
    pub diff_alignment: Vec<String>,
    pub diff_prev: Vec<String>,
    pub diff_updated: Vec<String>,
    /// Line number in the source files.
    pub id: usize,
}

impl CodeChangeExample {
    pub fn fields(&self) -> [&[String]; 5] {
        [
            self.src.as_slice(),
            self.trg.as_slice(),
            self.diff_alignment.as_slice(),
            self.diff_prev.as_slice(),
            self.diff_updated.as_slice(),
        ]
    }

    /// Lowercases the token fields. Markers are left as they are.
    fn lowercase(&mut self) {
        for field in [
            &mut self.src,
            &mut self.trg,
            &mut self.diff_prev,
            &mut self.diff_updated,
        ] {
            for token in field.iter_mut() {
                *token = token.to_lowercase();
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CodeChangesDataset {
    examples: Vec<CodeChangeExample>,
}

impl CodeChangesDataset {
    pub fn new(examples: Vec<CodeChangeExample>) -> Self {
        Self { examples }
    }

    /// Reads `prev.txt` and `updated.txt` from `path` and diffs every line pair.
    ///
    /// Pairs whose src or trg exceeds `max_sequence_length` tokens are skipped.
    pub fn from_dir(path: &Path, config: &DataConfig) -> Result<Self> {
        let prev = data::read_lines(&path.join("prev.txt"))?;
        let updated = data::read_lines(&path.join("updated.txt"))?;
        let differ = Differ::new(DiffMarkers::from(&config.tokens));

        let mut examples = Vec::with_capacity(prev.len());
        for (id, (prev_line, updated_line)) in prev.iter().zip(&updated).enumerate() {
            let src = split_tokens(prev_line);
            let trg = split_tokens(updated_line);
            if src.len() > config.max_sequence_length || trg.len() > config.max_sequence_length {
                continue;
            }
            // case-only edits stay in the diff even when the fields are lowercased
            let diff = differ.diff_tokens(&src, &trg, config.leave_only_changed);
            let mut example = CodeChangeExample {
                src,
                trg,
                diff_alignment: diff.alignment,
                diff_prev: diff.prev,
                diff_updated: diff.updated,
                id,
            };
            if config.lower {
                example.lowercase();
            }
            examples.push(example);
        }

        tracing::debug!(
            path = %path.display(),
            lines = prev.len(),
            kept = examples.len(),
            "loaded code changes"
        );
        Ok(Self { examples })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodeChangeExample> {
        self.examples.iter()
    }

    pub fn get(&self, index: usize) -> Option<&CodeChangeExample> {
        self.examples.get(index)
    }

    /// Frequencies over all five token fields.
    pub fn token_counts(&self) -> Counter {
        let mut counter = Counter::new();
        for example in &self.examples {
            for field in example.fields() {
                counter.update(field.iter().map(String::as_str));
            }
        }
        counter
    }

    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.examples.len().div_ceil(batch_size.max(1))
    }

    /// Numericalizes and pads the examples, `batch_size` at a time, in
    /// dataset order.
    pub fn batches(
        &self,
        vocab: &Vocab,
        specials: &BatchSpecials,
        batch_size: usize,
        device: &Device,
    ) -> Result<Vec<Batch>> {
        let order: Vec<usize> = (0..self.examples.len()).collect();
        self.batches_in_order(&order, vocab, specials, batch_size, device)
    }

    pub fn shuffled_batches<R: Rng + ?Sized>(
        &self,
        vocab: &Vocab,
        specials: &BatchSpecials,
        batch_size: usize,
        device: &Device,
        rng: &mut R,
    ) -> Result<Vec<Batch>> {
        let mut order: Vec<usize> = (0..self.examples.len()).collect();
        order.shuffle(rng);
        self.batches_in_order(&order, vocab, specials, batch_size, device)
    }

    fn batches_in_order(
        &self,
        order: &[usize],
        vocab: &Vocab,
        specials: &BatchSpecials,
        batch_size: usize,
        device: &Device,
    ) -> Result<Vec<Batch>> {
        order
            .chunks(batch_size.max(1))
            .map(|chunk| {
                let examples: Vec<&CodeChangeExample> =
                    chunk.iter().map(|&i| &self.examples[i]).collect();
                Batch::new(&examples, vocab, specials, device)
            })
            .collect()
    }
}

fn split_tokens(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// Ids wrapped around every sequence and used for padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSpecials {
    pub pad: u32,
    pub sos: u32,
    pub eos: u32,
}

impl BatchSpecials {
    pub fn from_vocab(vocab: &Vocab, config: &DataConfig) -> Self {
        Self {
            pad: vocab.token_to_id(&config.tokens.pad),
            sos: vocab.token_to_id(&config.tokens.sos),
            eos: vocab.token_to_id(&config.tokens.eos),
        }
    }
}

/// A padded `[batch, max_len]` tensor of ids and the unpadded lengths.
#[derive(Debug, Clone)]
pub struct PaddedField {
    pub ids: Tensor,
    pub lengths: Vec<usize>,
}

impl PaddedField {
    fn new(
        sequences: &[&[String]],
        vocab: &Vocab,
        specials: &BatchSpecials,
        device: &Device,
    ) -> Result<Self> {
        let lengths: Vec<usize> = sequences.iter().map(|s| s.len() + 2).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(2);

        let mut ids = Vec::with_capacity(sequences.len() * max_len);
        for sequence in sequences {
            ids.push(specials.sos);
            ids.extend(sequence.iter().map(|t| vocab.token_to_id(t)));
            ids.push(specials.eos);
            ids.extend(std::iter::repeat(specials.pad).take(max_len - sequence.len() - 2));
        }

        let ids = Tensor::from_vec(ids, (sequences.len(), max_len), device)
            .context("cannot build id tensor")?;
        Ok(Self { ids, lengths })
    }
}

#[derive(Debug, Clone)]
pub struct Batch {
    pub src: PaddedField,
    pub trg: PaddedField,
    pub diff_alignment: PaddedField,
    pub diff_prev: PaddedField,
    pub diff_updated: PaddedField,
    pub ids: Vec<usize>,
}

impl Batch {
    pub fn new(
        examples: &[&CodeChangeExample],
        vocab: &Vocab,
        specials: &BatchSpecials,
        device: &Device,
    ) -> Result<Self> {
        let field = |pick: fn(&CodeChangeExample) -> &[String]| {
            let sequences: Vec<&[String]> = examples.iter().map(|e| pick(e)).collect();
            PaddedField::new(&sequences, vocab, specials, device)
        };
        Ok(Self {
            src: field(|e| e.src.as_slice())?,
            trg: field(|e| e.trg.as_slice())?,
            diff_alignment: field(|e| e.diff_alignment.as_slice())?,
            diff_prev: field(|e| e.diff_prev.as_slice())?,
            diff_updated: field(|e| e.diff_updated.as_slice())?,
            ids: examples.iter().map(|e| e.id).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Train/val/test datasets and the vocabulary built from the train split.
pub struct DataBundle {
    pub train: CodeChangesDataset,
    pub val: CodeChangesDataset,
    pub test: CodeChangesDataset,
    pub vocab: Vocab,
}

pub fn load_datasets(
    root: &Path,
    config: &DataConfig,
) -> Result<(CodeChangesDataset, CodeChangesDataset, CodeChangesDataset)> {
    let load = |name: &str| {
        let path = root.join(name);
        CodeChangesDataset::from_dir(&path, config)
            .with_context(|| format!("cannot load {} split from {}", name, path.display()))
    };
    Ok((load("train")?, load("val")?, load("test")?))
}

pub fn load_data(config: &DataConfig, verbose: bool) -> Result<DataBundle> {
    let (train, val, test) = load_datasets(&config.dataset_root, config)?;
    let tokens = &config.tokens;
    let vocab = Vocab::build(
        [&train.token_counts()],
        &[
            tokens.unk.as_str(),
            tokens.pad.as_str(),
            tokens.sos.as_str(),
            tokens.eos.as_str(),
        ],
        config.token_min_freq,
    );
    let bundle = DataBundle {
        train,
        val,
        test,
        vocab,
    };
    if verbose {
        print_data_info(&bundle, config);
    }
    Ok(bundle)
}

pub fn print_data_info(bundle: &DataBundle, config: &DataConfig) {
    println!("Data set sizes (number of sentence pairs):");
    println!("train {}", bundle.train.len());
    println!("valid {}", bundle.val.len());
    println!("test {}\n", bundle.test.len());

    let max_seq_len = [&bundle.train, &bundle.val, &bundle.test]
        .iter()
        .flat_map(|d| d.iter())
        .map(|e| e.src.len().max(e.trg.len()).max(e.diff_alignment.len()))
        .max()
        .unwrap_or(0);
    println!("Max sequence length in tokens: {}\n", max_seq_len);

    if let Some(first) = bundle.train.get(0) {
        println!("First training example:");
        println!("src: {}", first.src.join(" "));
        println!("trg: {}", first.trg.join(" "));
        println!("diff_alignment: {}", first.diff_alignment.join(" "));
        println!("diff_prev: {}", first.diff_prev.join(" "));
        println!("diff_updated: {}\n", first.diff_updated.join(" "));
    }

    println!("Most common words:");
    for (token, count) in bundle.vocab.freqs().most_common(10) {
        println!("{:>10} {:>10}", token, count);
    }

    println!("\nFirst 10 words:");
    for (i, token) in bundle.vocab.itos().iter().take(10).enumerate() {
        println!("{:02} {}", i, token);
    }

    println!("\nSpecial words frequency and ids:");
    for token in config.tokens.all() {
        println!(
            "{} {} {}",
            token,
            bundle.vocab.freqs().get(token),
            bundle.vocab.token_to_id(token)
        );
    }

    println!("Number of words (types): {}", bundle.vocab.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::fs;

    fn write_split(dir: &Path, prev: &[&str], updated: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        data::write_lines(&dir.join("prev.txt"), prev.iter().copied()).unwrap();
        data::write_lines(&dir.join("updated.txt"), updated.iter().copied()).unwrap();
    }

    fn config(root: &Path) -> DataConfig {
        DataConfig {
            dataset_root: root.to_path_buf(),
            max_sequence_length: 6,
            ..DataConfig::default()
        }
    }

    #[test]
    fn long_pairs_are_filtered_but_ids_keep_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        write_split(
            dir.path(),
            &["a = 1 ;", "a b c d e f g h", "x ++ ;"],
            &["a = 2 ;", "a", "x -- ;"],
        );
        let dataset = CodeChangesDataset::from_dir(dir.path(), &config(dir.path())).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(1).unwrap().id, 2);
        assert_eq!(dataset.get(0).unwrap().diff_alignment, ["<replacement>"]);
    }

    #[test]
    fn lower_is_applied_after_diffing() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), &["x = Foo ;", "Foo BAR"], &["x = foo ;", "Foo BAR"]);
        let config = DataConfig {
            lower: true,
            ..config(dir.path())
        };
        let dataset = CodeChangesDataset::from_dir(dir.path(), &config).unwrap();

        let changed = dataset.get(0).unwrap();
        assert_eq!(changed.src, ["x", "=", "foo", ";"]);
        assert_eq!(changed.diff_alignment, ["<replacement>"]);
        assert_eq!(changed.diff_prev, ["foo"]);
        assert_eq!(changed.diff_updated, ["foo"]);

        let unchanged = dataset.get(1).unwrap();
        assert_eq!(unchanged.trg, ["foo", "bar"]);
        assert!(unchanged.diff_alignment.is_empty());
    }

    #[test]
    fn lower_keeps_marker_tokens() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), &["A B"], &["A C D"]);
        let config = DataConfig {
            lower: true,
            leave_only_changed: false,
            ..config(dir.path())
        };
        let dataset = CodeChangesDataset::from_dir(dir.path(), &config).unwrap();
        let example = dataset.get(0).unwrap();
        assert_eq!(
            example.diff_alignment,
            ["<unchanged>", "<addition>", "<replacement>"]
        );
        assert_eq!(example.diff_prev, ["a", "<padding>", "b"]);
        assert_eq!(example.diff_updated, ["a", "c", "d"]);
    }

    #[test]
    fn vocab_is_built_from_train_only() {
        let dir = tempfile::tempdir().unwrap();
        write_split(&dir.path().join("train"), &["a = b ;"], &["a = c ;"]);
        write_split(&dir.path().join("val"), &["only_in_val"], &["only_in_val"]);
        write_split(&dir.path().join("test"), &["t"], &["u"]);

        let bundle = load_data(&config(dir.path()), false).unwrap();
        assert_eq!(&bundle.vocab.itos()[..4], ["<unk>", "<pad>", "<s>", "</s>"]);
        assert!(bundle.vocab.get("a").is_some());
        assert!(bundle.vocab.get("<replacement>").is_some());
        assert!(bundle.vocab.get("only_in_val").is_none());
    }

    #[test]
    fn batches_are_padded_with_sos_and_eos() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), &["a", "a b c"], &["b", "a b"]);
        let config = config(dir.path());
        let dataset = CodeChangesDataset::from_dir(dir.path(), &config).unwrap();
        let vocab = Vocab::build([&dataset.token_counts()], &["<unk>", "<pad>", "<s>", "</s>"], 1);
        let specials = BatchSpecials::from_vocab(&vocab, &config);

        let batches = dataset.batches(&vocab, &specials, 8, &Device::Cpu).unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.ids, vec![0, 1]);
        assert_eq!(batch.src.lengths, vec![3, 5]);
        assert_eq!(batch.src.ids.dims(), &[2, 5]);

        let rows = batch.src.ids.to_vec2::<u32>().unwrap();
        let a = vocab.token_to_id("a");
        assert_eq!(rows[0], vec![specials.sos, a, specials.eos, specials.pad, specials.pad]);
        assert_eq!(rows[1][0], specials.sos);
        assert_eq!(rows[1][4], specials.eos);
    }

    #[test]
    fn batch_count_rounds_up() {
        let examples = (0..5)
            .map(|id| CodeChangeExample {
                src: vec!["a".into()],
                trg: vec!["b".into()],
                diff_alignment: vec![],
                diff_prev: vec![],
                diff_updated: vec![],
                id,
            })
            .collect();
        let dataset = CodeChangesDataset::new(examples);
        assert_eq!(dataset.num_batches(2), 3);

        let vocab = Vocab::build([&dataset.token_counts()], &["<unk>", "<pad>", "<s>", "</s>"], 1);
        let specials = BatchSpecials::from_vocab(&vocab, &DataConfig::default());
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let batches = dataset
            .shuffled_batches(&vocab, &specials, 2, &Device::Cpu, &mut rng)
            .unwrap();
        let mut ids: Vec<usize> = batches.iter().flat_map(|b| b.ids.clone()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(batches[2].len(), 1);
    }
}
