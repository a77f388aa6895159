use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::pre_tokenizers::whitespace::WhitespaceSplit;
use tokenizers::pre_tokenizers::PreTokenizerWrapper;
use tokenizers::Tokenizer;

/// Token frequencies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counter {
    counts: HashMap<String, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, token: &str) {
        self.add_n(token, 1);
    }

    pub fn add_n(&mut self, token: &str, n: usize) {
        match self.counts.get_mut(token) {
            Some(count) => *count += n,
            None => {
                self.counts.insert(token.to_string(), n);
            }
        }
    }

    pub fn update<'a, I>(&mut self, tokens: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for token in tokens {
            self.add(token);
        }
    }

    pub fn merge(&mut self, other: &Counter) {
        for (token, &n) in &other.counts {
            self.add_n(token, n);
        }
    }

    pub fn get(&self, token: &str) -> usize {
        self.counts.get(token).copied().unwrap_or(0)
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// All entries, most frequent first, ties broken alphabetically.
    pub fn sorted(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self
            .counts
            .iter()
            .map(|(token, &n)| (token.as_str(), n))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    pub fn most_common(&self, n: usize) -> Vec<(&str, usize)> {
        let mut entries = self.sorted();
        entries.truncate(n);
        entries
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Token <-> id mapping built from frequency counts.
///
/// Ids are assigned to the special tokens first, in the order given, then to
/// regular tokens by descending frequency with alphabetical tie-breaking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocab {
    itos: Vec<String>,
    #[serde(skip)]
    stoi: HashMap<String, u32>,
    freqs: Counter,
    unk: String,
}

impl Vocab {
    /// `specials[0]` is the unknown token.
    pub fn build<'a, I>(counters: I, specials: &[&str], min_freq: usize) -> Self
    where
        I: IntoIterator<Item = &'a Counter>,
    {
        let mut freqs = Counter::new();
        for counter in counters {
            freqs.merge(counter);
        }

        let mut itos: Vec<String> = Vec::new();
        for special in specials {
            if !itos.iter().any(|t| t == special) {
                itos.push(special.to_string());
            }
        }

        let min_freq = min_freq.max(1);
        let regular: Vec<String> = freqs
            .sorted()
            .into_iter()
            .filter(|&(token, n)| n >= min_freq && !specials.contains(&token))
            .map(|(token, _)| token.to_string())
            .collect();
        itos.extend(regular);

        let unk = specials.first().map(|s| s.to_string()).unwrap_or_default();
        let mut vocab = Self {
            itos,
            stoi: HashMap::new(),
            freqs,
            unk,
        };
        vocab.index();
        vocab
    }

    fn index(&mut self) {
        self.stoi = self
            .itos
            .iter()
            .enumerate()
            .map(|(i, token)| (token.clone(), i as u32))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    pub fn itos(&self) -> &[String] {
        &self.itos
    }

    pub fn freqs(&self) -> &Counter {
        &self.freqs
    }

    pub fn get(&self, token: &str) -> Option<u32> {
        self.stoi.get(token).copied()
    }

    /// Id of `token`, or of the unknown token.
    pub fn token_to_id(&self, token: &str) -> u32 {
        self.get(token)
            .or_else(|| self.get(&self.unk))
            .unwrap_or(0)
    }

    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.itos.get(id as usize).map(String::as_str)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let mut vocab: Vocab = serde_json::from_str(&json)?;
        vocab.index();
        Ok(vocab)
    }

    /// Word-level tokenizer over this vocabulary, splitting on whitespace.
    pub fn to_tokenizer(&self) -> Result<Tokenizer> {
        let model = WordLevel::builder()
            .vocab(self.stoi.clone())
            .unk_token(self.unk.clone())
            .build()
            .map_err(|e| anyhow!("cannot build word-level model: {}", e))?;

        let mut tokenizer = Tokenizer::new(model);
        tokenizer.with_pre_tokenizer(PreTokenizerWrapper::from(WhitespaceSplit));
        Ok(tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(tokens: &str) -> Counter {
        let mut counter = Counter::new();
        counter.update(tokens.split(' '));
        counter
    }

    #[test]
    fn most_common_breaks_ties_alphabetically() {
        let counter = counter("b a c a b d");
        assert_eq!(counter.most_common(3), vec![("a", 2), ("b", 2), ("c", 1)]);
        assert_eq!(counter.total(), 6);
    }

    #[test]
    fn specials_come_first() {
        let vocab = Vocab::build(
            [&counter("x y y <pad>")],
            &["<unk>", "<pad>", "<s>", "</s>"],
            1,
        );
        assert_eq!(vocab.itos(), ["<unk>", "<pad>", "<s>", "</s>", "y", "x"]);
        assert_eq!(vocab.freqs().get("<pad>"), 1);
    }

    #[test]
    fn min_freq_drops_rare_tokens() {
        let vocab = Vocab::build([&counter("a a b"), &counter("a c c")], &["<unk>"], 2);
        assert_eq!(vocab.itos(), ["<unk>", "a", "c"]);
        assert_eq!(vocab.token_to_id("b"), 0);
        assert_eq!(vocab.token_to_id("c"), 2);
    }

    #[test]
    fn duplicate_specials_are_kept_once() {
        let vocab = Vocab::build([&counter("a")], &["<unk>", "<unk>", "<pad>"], 1);
        assert_eq!(vocab.itos(), ["<unk>", "<pad>", "a"]);
    }

    #[test]
    fn save_and_load_restore_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        let vocab = Vocab::build([&counter("if ( x ) return")], &["<unk>", "<pad>"], 1);
        vocab.save(&path).unwrap();

        let loaded = Vocab::load(&path).unwrap();
        assert_eq!(loaded.itos(), vocab.itos());
        assert_eq!(loaded.token_to_id("return"), vocab.token_to_id("return"));
        let id = loaded.token_to_id("x");
        assert_eq!(loaded.id_to_token(id), Some("x"));
        assert_eq!(loaded.id_to_token(loaded.len() as u32), None);
    }

    #[test]
    fn counter_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        let counter = counter("foo bar foo");
        counter.save(&path).unwrap();
        assert_eq!(Counter::load(&path).unwrap(), counter);
    }

    #[test]
    fn tokenizer_matches_vocab_ids() {
        let vocab = Vocab::build([&counter("int x = y ;")], &["<unk>", "<pad>"], 1);
        let tokenizer = vocab.to_tokenizer().unwrap();

        let encoding = tokenizer.encode("x = z", false).unwrap();
        let expected = vec![
            vocab.token_to_id("x"),
            vocab.token_to_id("="),
            vocab.token_to_id("<unk>"),
        ];
        assert_eq!(encoding.get_ids(), expected.as_slice());
    }
}
