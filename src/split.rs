use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::Path;
use thiserror::Error;

use crate::data::Corpus;

#[derive(Debug, Error, PartialEq)]
#[error("invalid split ratios: val={val}, test={test} (each in [0, 1], sum at most 1)")]
pub struct RatioError {
    pub val: f64,
    pub test: f64,
}

/// Fractions of the corpus that go to validation and test; train gets the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    val: f64,
    test: f64,
}

impl SplitRatios {
    pub fn new(val: f64, test: f64) -> Result<Self, RatioError> {
        let valid = |r: f64| r.is_finite() && (0.0..=1.0).contains(&r);
        if !valid(val) || !valid(test) || val + test > 1.0 {
            return Err(RatioError { val, test });
        }
        Ok(Self { val, test })
    }

    pub fn val(&self) -> f64 {
        self.val
    }

    pub fn test(&self) -> f64 {
        self.test
    }
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            val: 0.1,
            test: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

/// Randomly partitions `0..n`. Each returned set is sorted.
pub fn indices_for_train_val_test<R: Rng + ?Sized>(
    n: usize,
    ratios: SplitRatios,
    rng: &mut R,
) -> SplitIndices {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);

    let test_size = (n as f64 * ratios.test).floor() as usize;
    let val_size = ((n as f64 * ratios.val).floor() as usize).min(n - test_size);

    let mut train = indices.split_off(test_size + val_size);
    let mut val = indices.split_off(test_size);
    let mut test = indices;
    train.sort_unstable();
    val.sort_unstable();
    test.sort_unstable();

    SplitIndices { train, val, test }
}

pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Writes `root/train`, `root/val` and `root/test`.
pub fn split_on_train_val_test(root: &Path, ratios: SplitRatios, seed: Option<u64>) -> Result<SplitIndices> {
    let corpus = Corpus::read_dir(root)?;
    let split = indices_for_train_val_test(corpus.len(), ratios, &mut rng_from_seed(seed));

    println!(
        "Train: {}, val: {}, test: {}",
        split.train.len(),
        split.val.len(),
        split.test.len()
    );
    write_parts(
        root,
        &corpus,
        &[("train", &split.train), ("val", &split.val), ("test", &split.test)],
    )?;
    Ok(split)
}

/// Splits the corpus between the editor model and the downstream predictor.
///
/// `root/neural_editor` gets the train part and `root/predictor` the
/// `predictor_ratio` part.
pub fn partition_data(root: &Path, predictor_ratio: f64, seed: Option<u64>) -> Result<SplitIndices> {
    let corpus = Corpus::read_dir(root)?;
    let ratios = SplitRatios::new(predictor_ratio, 0.0)?;
    let split = indices_for_train_val_test(corpus.len(), ratios, &mut rng_from_seed(seed));

    println!(
        "Neural editor: {}, predictor: {}",
        split.train.len(),
        split.val.len()
    );
    write_parts(
        root,
        &corpus,
        &[("neural_editor", &split.train), ("predictor", &split.val)],
    )?;
    Ok(split)
}

fn write_parts(root: &Path, corpus: &Corpus, parts: &[(&str, &Vec<usize>)]) -> Result<()> {
    for (name, indices) in parts {
        let dir = root.join(name);
        corpus.select(indices).write_dir(&dir)?;
        tracing::info!(part = *name, samples = indices.len(), dir = %dir.display(), "wrote split");
    }
    Ok(())
}
