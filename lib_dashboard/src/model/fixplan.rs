use serde::{Deserialize, Serialize};

use super::null_as_default;
use crate::diff::{compute_diff, DiffLine};

/// What a file change does to the repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileAction {
    #[default]
    Modify,
    Create,
    Delete,
    #[serde(other)]
    Unknown,
}

impl FileAction {
    /// Three-letter badge shown next to the file name.
    pub fn badge(self) -> &'static str {
        match self {
            FileAction::Modify => "MOD",
            FileAction::Create => "ADD",
            FileAction::Delete => "DEL",
            FileAction::Unknown => "???",
        }
    }
}

/// One file touched by a proposed fix.
///
/// The healing engine names the action `changeType` while the fix-plan
/// endpoint names it `action`; both are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    #[serde(default)]
    pub file_path: String,
    #[serde(default, alias = "changeType", deserialize_with = "null_as_default")]
    pub action: FileAction,
    #[serde(default)]
    pub old_content: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub new_content: String,
}

impl FileChange {
    /// Line diff of this change. A missing `oldContent` (file creation) is
    /// diffed as empty text.
    pub fn diff(&self) -> Vec<DiffLine> {
        compute_diff(self.old_content.as_deref().unwrap_or(""), &self.new_content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

/// AI-generated fix proposal for a healing session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixPlan {
    #[serde(default)]
    pub failure_summary: Option<String>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub fix_explanation: Option<String>,
    #[serde(default)]
    pub fix_type: Option<String>,
    /// In `0.0..=1.0`; absent is treated as no confidence.
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence_score: f64,
    #[serde(default, alias = "filesToModify", deserialize_with = "null_as_default")]
    pub file_changes: Vec<FileChange>,
}

impl FixPlan {
    pub fn confidence_band(&self) -> ConfidenceBand {
        if self.confidence_score >= 0.75 {
            ConfidenceBand::High
        } else if self.confidence_score >= 0.5 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    /// Confidence as a whole percentage, clamped to `0..=100`.
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence_score.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffKind;

    #[test]
    fn decodes_engine_spelling_and_defaults() {
        let body = r#"{
            "failureSummary": "missing import",
            "filesToModify": [
                {"filePath": "src/a.rs", "changeType": "CREATE", "newContent": "fn a() {}"}
            ]
        }"#;
        let plan: FixPlan = serde_json::from_str(body).unwrap();
        assert_eq!(plan.confidence_score, 0.0);
        assert_eq!(plan.confidence_band(), ConfidenceBand::Low);
        assert_eq!(plan.file_changes.len(), 1);
        assert_eq!(plan.file_changes[0].action, FileAction::Create);
        assert!(plan.file_changes[0].old_content.is_none());
    }

    #[test]
    fn null_file_list_is_empty() {
        let plan: FixPlan = serde_json::from_str(r#"{"fileChanges": null, "confidenceScore": 0.8}"#).unwrap();
        assert!(plan.file_changes.is_empty());
        assert_eq!(plan.confidence_band(), ConfidenceBand::High);
        assert_eq!(plan.confidence_percent(), 80);
    }

    #[test]
    fn created_file_diffs_against_empty_text() {
        let change = FileChange {
            file_path: "new.txt".into(),
            action: FileAction::Create,
            old_content: None,
            new_content: "one\ntwo".into(),
        };
        let lines = change.diff();
        // "" splits into a single empty line, which is removed.
        assert_eq!(lines.iter().filter(|l| l.kind == DiffKind::Added).count(), 2);
        assert_eq!(lines.iter().filter(|l| l.kind == DiffKind::Removed).count(), 1);
    }
}
