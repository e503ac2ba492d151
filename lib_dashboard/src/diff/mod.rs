//! # Line Diff Engine
//!
//! Computes a minimal line-level edit script between two texts, used to show
//! the file changes of an AI fix plan.
//!
//! The algorithm is the classic longest-common-subsequence table over lines:
//!
//! 1. Split both texts on `'\n'` (no trimming, no whitespace normalization;
//!    an empty text is a single empty line).
//! 2. Fill an `(m+1) x (n+1)` table where `table[i][j]` is the LCS length of
//!    the first `i` old lines and the first `j` new lines.
//! 3. Walk back from `(m, n)`: equal lines are `Unchanged`; otherwise take the
//!    new-side step (`Added`) when it scores at least as well as the old-side
//!    step, else `Removed`. Preferring `Added` on ties fixes which of several
//!    minimal scripts is produced, so the output is stable for callers.
//! 4. Reverse and number the lines: old-side numbers advance on
//!    `Unchanged`/`Removed`, new-side numbers on `Unchanged`/`Added`.
//!
//! ## Scaling bound
//! Time and memory are both O(m·n) in the line counts. Two 10 000-line files
//! need a 100-million-cell table (~800 MB with `usize` cells), so callers
//! must not feed whole large files through this engine.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Unchanged,
}

impl DiffKind {
    pub fn marker(self) -> char {
        match self {
            DiffKind::Added => '+',
            DiffKind::Removed => '-',
            DiffKind::Unchanged => ' ',
        }
    }
}

/// One line of an edit script with its 1-based position on each side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLine {
    #[serde(rename = "type")]
    pub kind: DiffKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_line_num: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_line_num: Option<usize>,
}

impl fmt::Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.marker(), self.content)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
}

impl DiffSummary {
    pub fn of(lines: &[DiffLine]) -> Self {
        lines.iter().fold(Self::default(), |mut acc, line| {
            match line.kind {
                DiffKind::Added => acc.added += 1,
                DiffKind::Removed => acc.removed += 1,
                DiffKind::Unchanged => {}
            }
            acc
        })
    }
}

/// Computes the edit script turning `old_text` into `new_text`.
///
/// Pure and deterministic. See the module docs for the O(m·n) bound.
pub fn compute_diff(old_text: &str, new_text: &str) -> Vec<DiffLine> {
    let old_lines: Vec<&str> = old_text.split('\n').collect();
    let new_lines: Vec<&str> = new_text.split('\n').collect();
    let (m, n) = (old_lines.len(), new_lines.len());

    // Flat row-major table, width n + 1.
    let width = n + 1;
    let mut table = vec![0usize; (m + 1) * width];
    for i in 1..=m {
        for j in 1..=n {
            table[i * width + j] = if old_lines[i - 1] == new_lines[j - 1] {
                table[(i - 1) * width + (j - 1)] + 1
            } else {
                table[(i - 1) * width + j].max(table[i * width + (j - 1)])
            };
        }
    }

    let mut steps: Vec<(DiffKind, &str)> = Vec::with_capacity(m + n);
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old_lines[i - 1] == new_lines[j - 1] {
            steps.push((DiffKind::Unchanged, old_lines[i - 1]));
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table[i * width + (j - 1)] >= table[(i - 1) * width + j]) {
            steps.push((DiffKind::Added, new_lines[j - 1]));
            j -= 1;
        } else {
            steps.push((DiffKind::Removed, old_lines[i - 1]));
            i -= 1;
        }
    }

    let (mut old_num, mut new_num) = (0usize, 0usize);
    steps
        .into_iter()
        .rev()
        .map(|(kind, content)| {
            let (old_line_num, new_line_num) = match kind {
                DiffKind::Unchanged => {
                    old_num += 1;
                    new_num += 1;
                    (Some(old_num), Some(new_num))
                }
                DiffKind::Removed => {
                    old_num += 1;
                    (Some(old_num), None)
                }
                DiffKind::Added => {
                    new_num += 1;
                    (None, Some(new_num))
                }
            };
            DiffLine {
                kind,
                content: content.to_string(),
                old_line_num,
                new_line_num,
            }
        })
        .collect()
}

/// Renders a script as unified-diff body lines (`+`, `-` or space prefix).
pub fn render_unified(lines: &[DiffLine]) -> String {
    lines.iter().map(DiffLine::to_string).collect::<Vec<_>>().join("\n")
}

/// Rebuilds the new-side text from a script.
pub fn apply_script(lines: &[DiffLine]) -> String {
    lines
        .iter()
        .filter(|l| l.kind != DiffKind::Removed)
        .map(|l| l.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}


#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;

    // A tiny alphabet so that generated texts share plenty of lines.
    fn text_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec("[ab]{0,2}", 0..8).prop_map(|lines| lines.join("\n"))
    }

    fn old_side(lines: &[DiffLine]) -> String {
        lines
            .iter()
            .filter(|l| l.kind != DiffKind::Added)
            .map(|l| l.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    proptest! {
        #[test]
        fn prop_script_rebuilds_both_sides(old in text_strategy(), new in text_strategy()) {
            let script = compute_diff(&old, &new);
            prop_assert_eq!(apply_script(&script), new);
            prop_assert_eq!(old_side(&script), old);
        }

        #[test]
        fn prop_identical_texts_are_unchanged(text in text_strategy()) {
            let script = compute_diff(&text, &text);
            prop_assert_eq!(script.len(), text.split('\n').count());
            for l in &script {
                prop_assert_eq!(l.kind, DiffKind::Unchanged);
                prop_assert_eq!(l.old_line_num, l.new_line_num);
            }
            prop_assert_eq!(DiffSummary::of(&script), DiffSummary::default());
        }

        #[test]
        fn prop_line_numbers_increase_on_each_side(old in text_strategy(), new in text_strategy()) {
            let script = compute_diff(&old, &new);
            let old_nums: Vec<usize> = script.iter().filter_map(|l| l.old_line_num).collect();
            let new_nums: Vec<usize> = script.iter().filter_map(|l| l.new_line_num).collect();

            prop_assert!(old_nums.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(new_nums.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(old_nums, (1..=old.split('\n').count()).collect::<Vec<_>>());
            prop_assert_eq!(new_nums, (1..=new.split('\n').count()).collect::<Vec<_>>());

            for l in &script {
                match l.kind {
                    DiffKind::Added => prop_assert!(l.old_line_num.is_none() && l.new_line_num.is_some()),
                    DiffKind::Removed => prop_assert!(l.old_line_num.is_some() && l.new_line_num.is_none()),
                    DiffKind::Unchanged => prop_assert!(l.old_line_num.is_some() && l.new_line_num.is_some()),
                }
            }
        }
    }
}
