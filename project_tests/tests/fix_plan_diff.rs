use lib_dashboard::diff::{apply_script, render_unified};
use lib_dashboard::model::{FileAction, FixPlan};
use lib_dashboard::{compute_diff, DiffKind, DiffSummary};

const PLAN: &str = r#"{
    "failureSummary": "unused import breaks -D warnings",
    "rootCause": "leftover import after refactor",
    "confidenceScore": 0.82,
    "fileChanges": [
        {
            "filePath": "src/lib.rs",
            "action": "MODIFY",
            "oldContent": "use std::fmt;\nuse std::io;\n\npub fn run() {}",
            "newContent": "use std::io;\n\npub fn run() {}"
        },
        {
            "filePath": "src/new.rs",
            "action": "CREATE",
            "newContent": "pub fn added() {}\n"
        }
    ]
}"#;

#[test]
fn plan_changes_diff_to_their_new_content() {
    let plan: FixPlan = serde_json::from_str(PLAN).unwrap();
    assert_eq!(plan.file_changes.len(), 2);

    for change in &plan.file_changes {
        let script = change.diff();
        assert_eq!(apply_script(&script), change.new_content, "{}", change.file_path);
    }
}

#[test]
fn modify_change_removes_exactly_one_line() {
    let plan: FixPlan = serde_json::from_str(PLAN).unwrap();
    let change = &plan.file_changes[0];
    assert_eq!(change.action, FileAction::Modify);

    let script = change.diff();
    assert_eq!(DiffSummary::of(&script), DiffSummary { added: 0, removed: 1 });
    assert_eq!(
        render_unified(&script),
        "-use std::fmt;\n use std::io;\n \n pub fn run() {}"
    );
}

#[test]
fn create_change_is_diffed_against_empty_text() {
    let plan: FixPlan = serde_json::from_str(PLAN).unwrap();
    let change = &plan.file_changes[1];
    assert_eq!(change.action.badge(), "ADD");

    let script = change.diff();
    // "" is one empty line, which matches the trailing empty line of the new text.
    let summary = DiffSummary::of(&script);
    assert_eq!(summary, DiffSummary { added: 1, removed: 0 });
    assert_eq!(script.last().map(|l| l.kind), Some(DiffKind::Unchanged));
}

#[test]
fn line_numbers_are_contiguous_on_each_side() {
    let old = "a\nb\nc\nd\ne";
    let new = "a\nc\nx\nd\ne\nf";
    let script = compute_diff(old, new);

    let old_nums: Vec<usize> = script.iter().filter_map(|l| l.old_line_num).collect();
    let new_nums: Vec<usize> = script.iter().filter_map(|l| l.new_line_num).collect();
    assert_eq!(old_nums, (1..=5).collect::<Vec<_>>());
    assert_eq!(new_nums, (1..=6).collect::<Vec<_>>());

    let unchanged = script.iter().filter(|l| l.kind == DiffKind::Unchanged).count();
    // LCS of the two line lists is a, c, d, e.
    assert_eq!(unchanged, 4);
}
