use assert_cmd::Command;
use codechanges::data::{Corpus, DataSample};
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn write_corpus(root: &Path, n: usize) -> Corpus {
    let corpus = Corpus::new(
        (0..n)
            .map(|i| {
                DataSample::new(
                    format!("x = {i} ;"),
                    format!("x = {} ;", i + 1),
                    (i % 2).to_string(),
                    i.to_string(),
                )
            })
            .collect(),
    );
    corpus.write_dir(root).unwrap();
    corpus
}

fn cli() -> Command {
    Command::cargo_bin("codechanges").unwrap()
}

#[test]
fn missing_arguments_exit_with_status_one() {
    cli()
        .args(["k-folds", "some-root"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn k_folds_rejects_fewer_than_five_folds() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), 10);
    fs::write(dir.path().join("timestamps.txt"), "0\n".repeat(10)).unwrap();

    cli()
        .arg("k-folds")
        .arg(dir.path())
        .arg(dir.path().join("timestamps.txt"))
        .arg("4")
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 5 folds"));
}

#[test]
fn k_folds_writes_every_round() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), 10);
    // newest commits first, so chronological order is the reverse of ids
    let timestamps: String = (0..10).map(|i| format!("{}\n", 1_000 - i)).collect();
    fs::write(dir.path().join("timestamps.txt"), timestamps).unwrap();

    cli()
        .arg("k-folds")
        .arg(dir.path())
        .arg(dir.path().join("timestamps.txt"))
        .arg("5")
        .assert()
        .success()
        .stdout(predicate::str::contains("fold_5: train 6, val 2, test 2"));

    let mut test_ids = Vec::new();
    for n in 1..=5 {
        let fold = dir.path().join(format!("fold_{n}"));
        let train = Corpus::read_dir(&fold.join("train")).unwrap();
        let val = Corpus::read_dir(&fold.join("val")).unwrap();
        let test = Corpus::read_dir(&fold.join("test")).unwrap();
        assert_eq!(train.len() + val.len() + test.len(), corpus.len());
        test_ids.extend(test.iter().map(|s| s.id.clone()));
    }
    test_ids.sort();
    let mut all_ids: Vec<String> = corpus.iter().map(|s| s.id.clone()).collect();
    all_ids.sort();
    assert_eq!(test_ids, all_ids);

    // the first round tests on the two newest samples
    let first_test = Corpus::read_dir(&dir.path().join("fold_1/test")).unwrap();
    let ids: Vec<&str> = first_test.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["1", "0"]);
}

#[test]
fn k_folds_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), 10);
    fs::write(dir.path().join("timestamps.txt"), "0\n".repeat(10)).unwrap();
    fs::create_dir(dir.path().join("fold_1")).unwrap();

    cli()
        .arg("k-folds")
        .arg(dir.path())
        .arg(dir.path().join("timestamps.txt"))
        .arg("5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("fold_1"));
}

#[test]
fn split_writes_three_disjoint_parts() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), 50);

    cli()
        .arg("split")
        .arg(dir.path())
        .args(["--seed", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Train: 40, val: 5, test: 5"));

    let mut ids = Vec::new();
    for part in ["train", "val", "test"] {
        let corpus = Corpus::read_dir(&dir.path().join(part)).unwrap();
        ids.extend(corpus.iter().map(|s| s.id.parse::<usize>().unwrap()));
    }
    ids.sort_unstable();
    assert_eq!(ids, (0..50).collect::<Vec<_>>());
}

#[test]
fn partition_splits_in_half() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), 20);

    cli()
        .arg("partition")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Neural editor: 10, predictor: 10"));
    assert_eq!(Corpus::read_dir(&dir.path().join("predictor")).unwrap().len(), 10);
}

#[test]
fn cut_truncates_in_place() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), 20);

    cli().arg("cut").arg(dir.path()).arg("7").assert().success();
    assert_eq!(Corpus::read_dir(dir.path()).unwrap().len(), 7);
}

#[test]
fn diff_prints_aligned_lines() {
    cli()
        .args(["diff", "a = b ;", "a = c ;"])
        .assert()
        .success()
        .stdout("<replacement>\nb\nc\n");
}

#[test]
fn build_vocab_saves_vocab_and_tokenizer() {
    let dir = tempfile::tempdir().unwrap();
    for part in ["train", "val", "test"] {
        write_corpus(&dir.path().join(part), 4);
    }
    let config = serde_json::json!({ "data": { "dataset_root": dir.path() } });
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, config.to_string()).unwrap();

    cli()
        .arg("build-vocab")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Data set sizes"));

    assert!(dir.path().join("vocab.json").is_file());
    assert!(dir.path().join("tokenizer.json").is_file());
}
