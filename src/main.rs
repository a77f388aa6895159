use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use codechanges::{
    dataset, differ::{DiffMarkers, Differ}, etl, folds::{self, FoldPlan}, mining,
    split::{self, SplitRatios}, Config,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mine code changes for the commits of a dataset description
    Mine {
        /// Root where to save processed data
        root: PathBuf,

        /// File with the description of the dataset (commit/label lines)
        description: PathBuf,

        /// Local copy of the git repository
        repo: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Write the author timestamp of every listed commit to timestamps.txt
    ExtractTimestamps {
        root: PathBuf,

        /// File with the commit hashes
        commits_file: PathBuf,

        repo: PathBuf,
    },

    /// Build time-ordered k-fold splits under fold_<n>/
    KFolds {
        root: PathBuf,

        timestamps_file: PathBuf,

        /// Number of folds (at least 5)
        k: usize,

        /// Number of folds used for training in each round
        #[arg(long)]
        train_window: Option<usize>,
    },

    /// Randomly split the corpus into train/, val/ and test/
    Split {
        root: PathBuf,

        #[arg(long, default_value_t = 0.1)]
        val: f64,

        #[arg(long, default_value_t = 0.1)]
        test: f64,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Split the corpus into neural_editor/ and predictor/
    Partition {
        root: PathBuf,

        /// Share of samples that go to the predictor
        #[arg(long, default_value_t = 0.5)]
        ratio: f64,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Keep only the first N samples
    Cut {
        root: PathBuf,

        n: usize,

        #[arg(long)]
        shuffle: bool,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Re-tokenize prev.txt and updated.txt into filtered_*.txt
    Retokenize { root: PathBuf },

    /// Print statistics of a mined dataset
    Inspect { root: PathBuf },

    /// Convert a two-line commit list to "<hash>: <label>" lines
    ConvertCommits {
        root: PathBuf,

        commits_file: String,

        new_file: String,
    },

    /// Load train/val/test, build the vocabulary and save it
    BuildVocab {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        #[arg(short, long)]
        quiet: bool,
    },

    /// Show the token alignment between two lines
    Diff {
        prev: String,

        updated: String,

        /// Keep unchanged positions
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };

    match cli.command {
        Commands::Mine { root, description, repo, config } => {
            let config = Config::load(config.as_deref())?;
            mining::mine_dataset(&root, &description, &repo, &config.mining)?;
            Ok(())
        }

        Commands::ExtractTimestamps { root, commits_file, repo } => {
            let timestamps = mining::extract_timestamps(&root, &commits_file, &repo)?;
            println!("Wrote {} timestamps", timestamps.len());
            Ok(())
        }

        Commands::KFolds { root, timestamps_file, k, train_window } => {
            let mut plan = FoldPlan::new(k)?;
            if let Some(window) = train_window {
                plan = plan.with_train_window(window)?;
            }
            let rounds = folds::create_k_folds(&root, &timestamps_file, plan)?;
            for round in &rounds {
                println!(
                    "fold_{}: train {}, val {}, test {}",
                    round.number,
                    round.train.len(),
                    round.val.len(),
                    round.test.len()
                );
            }
            Ok(())
        }

        Commands::Split { root, val, test, seed } => {
            split::split_on_train_val_test(&root, SplitRatios::new(val, test)?, seed)?;
            Ok(())
        }

        Commands::Partition { root, ratio, seed } => {
            split::partition_data(&root, ratio, seed)?;
            Ok(())
        }

        Commands::Cut { root, n, shuffle, seed } => {
            let kept = etl::cut_dataset(&root, n, shuffle, seed)?;
            println!("Kept {} samples", kept);
            Ok(())
        }

        Commands::Retokenize { root } => {
            let identifiers = etl::retokenize(&root)?;
            println!("Distinct identifiers: {}", identifiers.len());
            Ok(())
        }

        Commands::Inspect { root } => {
            mining::inspect(&root)?;
            Ok(())
        }

        Commands::ConvertCommits { root, commits_file, new_file } => {
            let written = mining::convert_commit_list(&root, &commits_file, &new_file)?;
            println!("Wrote {} commits", written);
            Ok(())
        }

        Commands::BuildVocab { config, output, quiet } => {
            let config = Config::load(config.as_deref())?;
            let bundle = dataset::load_data(&config.data, !quiet)?;

            let output_dir = output.unwrap_or_else(|| config.data.dataset_root.clone());
            std::fs::create_dir_all(&output_dir)?;
            bundle.vocab.save(&output_dir.join("vocab.json"))?;
            bundle
                .vocab
                .to_tokenizer()?
                .save(output_dir.join("tokenizer.json"), false)
                .map_err(|e| anyhow!("cannot save tokenizer: {}", e))?;
            println!("Vocabulary saved to {:?}", output_dir);
            Ok(())
        }

        Commands::Diff { prev, updated, all } => {
            let config = Config::default();
            let differ = Differ::new(DiffMarkers::from(&config.data.tokens));
            let prev: Vec<&str> = prev.split_whitespace().collect();
            let updated: Vec<&str> = updated.split_whitespace().collect();
            let diff = differ.diff_tokens(&prev, &updated, !all);
            println!("{}", diff.alignment.join(" "));
            println!("{}", diff.prev.join(" "));
            println!("{}", diff.updated.join(" "));
            Ok(())
        }
    }
}
