//! Token-level diff alignment between a previous and an updated code chunk.
//!
//! The diff is a minimum-cost Levenshtein edit script rendered as three
//! equal-length sequences: an alignment of edit markers, the previous tokens
//! and the updated tokens, each padded where the other side has no token.

use serde::{Deserialize, Serialize};

use crate::data::TokensConfig;

/// Marker tokens written into the aligned sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffMarkers {
    pub replacement: String,
    pub deletion: String,
    pub addition: String,
    pub unchanged: String,
    pub padding: String,
}

impl From<&TokensConfig> for DiffMarkers {
    fn from(tokens: &TokensConfig) -> Self {
        Self {
            replacement: tokens.replacement.clone(),
            deletion: tokens.deletion.clone(),
            addition: tokens.addition.clone(),
            unchanged: tokens.unchanged.clone(),
            padding: tokens.padding.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Unchanged,
    Replacement,
    Deletion,
    Addition,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenDiff {
    pub alignment: Vec<String>,
    pub prev: Vec<String>,
    pub updated: Vec<String>,
}

impl TokenDiff {
    pub fn len(&self) -> usize {
        self.alignment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alignment.is_empty()
    }
}

pub struct Differ {
    markers: DiffMarkers,
}

impl Differ {
    pub fn new(markers: DiffMarkers) -> Self {
        Self { markers }
    }

    /// Aligns `prev` with `updated`. With `leave_only_changed`, positions
    /// whose tokens are equal are dropped from all three sequences.
    pub fn diff_tokens<S: AsRef<str>>(
        &self,
        prev: &[S],
        updated: &[S],
        leave_only_changed: bool,
    ) -> TokenDiff {
        let prev: Vec<&str> = prev.iter().map(AsRef::as_ref).collect();
        let updated: Vec<&str> = updated.iter().map(AsRef::as_ref).collect();

        let mut diff = TokenDiff::default();
        let (mut i, mut j) = (0, 0);
        for op in edit_script(&prev, &updated) {
            let (marker, p, u) = match op {
                EditOp::Unchanged => {
                    i += 1;
                    j += 1;
                    if leave_only_changed {
                        continue;
                    }
                    (&self.markers.unchanged, prev[i - 1], updated[j - 1])
                }
                EditOp::Replacement => {
                    i += 1;
                    j += 1;
                    (&self.markers.replacement, prev[i - 1], updated[j - 1])
                }
                EditOp::Deletion => {
                    i += 1;
                    (&self.markers.deletion, prev[i - 1], self.markers.padding.as_str())
                }
                EditOp::Addition => {
                    j += 1;
                    (&self.markers.addition, self.markers.padding.as_str(), updated[j - 1])
                }
            };
            diff.alignment.push(marker.clone());
            diff.prev.push(p.to_string());
            diff.updated.push(u.to_string());
        }
        diff
    }
}

/// Minimum edit script turning `prev` into `updated`.
///
/// The common prefix and suffix are matched directly; the DP table only
/// covers the differing middle.
pub fn edit_script<T: PartialEq>(prev: &[T], updated: &[T]) -> Vec<EditOp> {
    let prefix = prev
        .iter()
        .zip(updated)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = prev[prefix..]
        .iter()
        .rev()
        .zip(updated[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &prev[prefix..prev.len() - suffix];
    let b = &updated[prefix..updated.len() - suffix];

    let mut ops = vec![EditOp::Unchanged; prefix];
    ops.extend(levenshtein_ops(a, b));
    ops.extend(std::iter::repeat(EditOp::Unchanged).take(suffix));
    ops
}

fn levenshtein_ops<T: PartialEq>(a: &[T], b: &[T]) -> Vec<EditOp> {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    // cost[i * width + j]: distance between a[..i] and b[..j]
    let mut cost = vec![0u32; (n + 1) * width];
    for i in 0..=n {
        cost[i * width] = i as u32;
    }
    for j in 0..=m {
        cost[j] = j as u32;
    }
    for i in 1..=n {
        for j in 1..=m {
            let substitute = cost[(i - 1) * width + j - 1] + u32::from(a[i - 1] != b[j - 1]);
            let delete = cost[(i - 1) * width + j] + 1;
            let insert = cost[i * width + j - 1] + 1;
            cost[i * width + j] = substitute.min(delete).min(insert);
        }
    }

    let mut ops = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        let here = cost[i * width + j];
        if i > 0 && j > 0 {
            let diagonal = cost[(i - 1) * width + j - 1];
            if a[i - 1] == b[j - 1] && here == diagonal {
                ops.push(EditOp::Unchanged);
                i -= 1;
                j -= 1;
                continue;
            }
            if here == diagonal + 1 {
                ops.push(EditOp::Replacement);
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if i > 0 && here == cost[(i - 1) * width + j] + 1 {
            ops.push(EditOp::Deletion);
            i -= 1;
        } else {
            ops.push(EditOp::Addition);
            j -= 1;
        }
    }
    ops.reverse();
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn differ() -> Differ {
        Differ::new(DiffMarkers::from(&TokensConfig::default()))
    }

    fn tokens(line: &str) -> Vec<&str> {
        line.split(' ').filter(|t| !t.is_empty()).collect()
    }

    #[test]
    fn identical_sequences_are_unchanged() {
        let diff = differ().diff_tokens(&tokens("a b c"), &tokens("a b c"), false);
        assert_eq!(diff.alignment, ["<unchanged>"; 3]);
        assert_eq!(diff.prev, ["a", "b", "c"]);

        let only_changed = differ().diff_tokens(&tokens("a b c"), &tokens("a b c"), true);
        assert!(only_changed.is_empty());
    }

    #[test]
    fn replacement_keeps_both_tokens() {
        let diff = differ().diff_tokens(&tokens("x = a ;"), &tokens("x = b ;"), false);
        assert_eq!(
            diff.alignment,
            ["<unchanged>", "<unchanged>", "<replacement>", "<unchanged>"]
        );
        assert_eq!(diff.prev[2], "a");
        assert_eq!(diff.updated[2], "b");
    }

    #[test]
    fn additions_and_deletions_are_padded() {
        let diff = differ().diff_tokens(&tokens("f ( a , b )"), &tokens("f ( a )"), true);
        assert_eq!(diff.alignment, ["<deletion>", "<deletion>"]);
        assert_eq!(diff.prev, [",", "b"]);
        assert_eq!(diff.updated, ["<padding>", "<padding>"]);

        let diff = differ().diff_tokens(&tokens("return"), &tokens("return 0 ;"), true);
        assert_eq!(diff.alignment, ["<addition>", "<addition>"]);
        assert_eq!(diff.prev, ["<padding>", "<padding>"]);
        assert_eq!(diff.updated, ["0", ";"]);
    }

    #[test]
    fn empty_sides() {
        let empty: Vec<&str> = Vec::new();
        let diff = differ().diff_tokens(&empty, &tokens("a b"), false);
        assert_eq!(diff.alignment, ["<addition>", "<addition>"]);

        let diff = differ().diff_tokens(&tokens("a"), &empty, false);
        assert_eq!(diff.alignment, ["<deletion>"]);

        assert!(differ().diff_tokens(&empty, &empty, false).is_empty());
    }

    #[test]
    fn script_is_minimal() {
        let prev = tokens("a b c d e f");
        let updated = tokens("a x c d f g");
        let ops = edit_script(&prev, &updated);
        let edits = ops.iter().filter(|op| **op != EditOp::Unchanged).count();
        // b->x, delete e, add g
        assert_eq!(edits, 3);
    }

    #[test]
    fn sequences_stay_aligned() {
        let prev = tokens("int i = 0 ; i < n ; i ++");
        let updated = tokens("size_t i = 0 ; i != n ; ++ i");
        let diff = differ().diff_tokens(&prev, &updated, false);
        assert_eq!(diff.prev.len(), diff.alignment.len());
        assert_eq!(diff.updated.len(), diff.alignment.len());

        let rebuilt_prev: Vec<&str> = diff
            .prev
            .iter()
            .map(String::as_str)
            .filter(|t| *t != "<padding>")
            .collect();
        assert_eq!(rebuilt_prev, prev);
        let rebuilt_updated: Vec<&str> = diff
            .updated
            .iter()
            .map(String::as_str)
            .filter(|t| *t != "<padding>")
            .collect();
        assert_eq!(rebuilt_updated, updated);
    }
}
