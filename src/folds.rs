//! Time-ordered k-fold partitioning.
//!
//! Samples are sorted by timestamp and cut into `k` contiguous folds. Round
//! `i` tests on fold `(k - 1 + i) mod k`, validates on the fold before it and
//! trains on the `train_window` folds before that, wrapping around the fold
//! list.

use anyhow::{Context, Result};
use chrono::DateTime;
use std::fs;
use std::ops::Range;
use std::path::Path;
use thiserror::Error;

use crate::data::{self, Corpus};

/// Smallest fold count for which the default train window fits in one cycle.
pub const MIN_FOLDS: usize = 5;

pub const DEFAULT_TRAIN_WINDOW: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FoldError {
    #[error("at least {min} folds are required, got {k}", min = MIN_FOLDS)]
    TooFewFolds { k: usize },

    #[error("train window of {window} folds leaves no room for val and test in {k} folds")]
    InvalidTrainWindow { window: usize, k: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldPlan {
    k: usize,
    train_window: usize,
}

impl FoldPlan {
    pub fn new(k: usize) -> Result<Self, FoldError> {
        if k < MIN_FOLDS {
            return Err(FoldError::TooFewFolds { k });
        }
        Ok(Self {
            k,
            train_window: DEFAULT_TRAIN_WINDOW,
        })
    }

    /// Plan whose rounds use every fold: train takes all `k - 2` remaining folds.
    pub fn covering(k: usize) -> Result<Self, FoldError> {
        Self::new(k)?.with_train_window(k - 2)
    }

    pub fn with_train_window(self, window: usize) -> Result<Self, FoldError> {
        if window == 0 || window > self.k - 2 {
            return Err(FoldError::InvalidTrainWindow { window, k: self.k });
        }
        Ok(Self {
            train_window: window,
            ..self
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn train_window(&self) -> usize {
        self.train_window
    }

    /// Positions (in chronological order) covered by each fold.
    ///
    /// Every fold but the last holds `round(n / k)` samples, ties to even.
    /// The last fold takes the remainder; folds past the end are empty.
    pub fn fold_ranges(&self, n: usize) -> Vec<Range<usize>> {
        let fold_size = (n as f64 / self.k as f64).round_ties_even() as usize;
        let mut ranges = Vec::with_capacity(self.k);
        let mut start = 0;
        for i in 0..self.k {
            let end = if i + 1 == self.k {
                n
            } else {
                (start + fold_size).min(n)
            };
            ranges.push(start..end);
            start = end;
        }
        ranges
    }

    /// Assigns sample indices to train/val/test for each of the `k` rounds.
    pub fn rounds(&self, timestamps: &[f64]) -> Vec<FoldRound> {
        let order = chronological_order(timestamps);
        let folds: Vec<&[usize]> = self
            .fold_ranges(order.len())
            .into_iter()
            .map(|range| &order[range])
            .collect();
        let fold = |position: usize| folds[position % self.k];

        (0..self.k)
            .map(|i| {
                let test_pos = self.k - 1 + i;
                let val_pos = test_pos - 1;
                let train = (val_pos - self.train_window..val_pos)
                    .flat_map(|p| fold(p).iter().copied())
                    .collect();
                FoldRound {
                    number: i + 1,
                    train,
                    val: fold(val_pos).to_vec(),
                    test: fold(test_pos).to_vec(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldRound {
    /// 1-based, matches the `fold_<n>` directory name.
    pub number: usize,
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl FoldRound {
    pub fn parts(&self) -> [(&'static str, &[usize]); 3] {
        [
            ("train", self.train.as_slice()),
            ("val", self.val.as_slice()),
            ("test", self.test.as_slice()),
        ]
    }
}

/// Sample indices sorted by timestamp; equal timestamps keep input order.
pub fn chronological_order(timestamps: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..timestamps.len()).collect();
    order.sort_by(|&a, &b| timestamps[a].total_cmp(&timestamps[b]));
    order
}

/// Writes `root/fold_<n>/{train,val,test}` for every round of `plan`.
pub fn create_k_folds(root: &Path, timestamps_file: &Path, plan: FoldPlan) -> Result<Vec<FoldRound>> {
    let corpus = Corpus::read_dir(root)?;
    let table = data::read_timestamps(timestamps_file)?;
    let timestamps = data::timestamps_for(&corpus, &table)?;

    let rounds = plan.rounds(&timestamps);
    for round in &rounds {
        let fold_dir = root.join(format!("fold_{}", round.number));
        fs::create_dir(&fold_dir)
            .with_context(|| format!("cannot create fold directory {}", fold_dir.display()))?;
        for (name, indices) in round.parts() {
            corpus.select(indices).write_dir(&fold_dir.join(name))?;
        }

        tracing::info!(
            fold = round.number,
            train = round.train.len(),
            val = round.val.len(),
            test = round.test.len(),
            test_period = %describe_period(&round.test, &timestamps),
            "wrote fold"
        );
    }

    Ok(rounds)
}

fn describe_period(indices: &[usize], timestamps: &[f64]) -> String {
    let bounds = indices
        .iter()
        .map(|&i| timestamps[i])
        .fold(None, |acc: Option<(f64, f64)>, t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        });
    let day = |t: f64| {
        DateTime::from_timestamp(t as i64, 0)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| t.to_string())
    };
    match bounds {
        Some((lo, hi)) => format!("{}..{}", day(lo), day(hi)),
        None => "empty".to_string(),
    }
}
