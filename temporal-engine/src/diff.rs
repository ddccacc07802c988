//! Per-file diff extraction and [`DiffType`] classification for one commit
//! (spec.md §4.7 point 2).

use engine_model::{DiffType, FileDiff};
use git2::{Commit, Delta, DiffFlags, Repository};

use crate::error::TemporalError;

pub fn diffs_for_commit(repo: &Repository, commit: &Commit<'_>) -> Result<Vec<FileDiff>, TemporalError> {
    let tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 { Some(commit.parent(0)?.tree()?) } else { None };
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;

    let mut diffs = Vec::with_capacity(diff.deltas().len());
    for idx in 0..diff.deltas().len() {
        let delta = diff.get_delta(idx).expect("index within diff.deltas().len()");
        let is_binary = delta.flags().contains(DiffFlags::BINARY);

        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();

        let mut diff_type = classify(delta.status());
        let old_path = if diff_type == DiffType::Renamed {
            delta.old_file().path().map(|p| p.to_string_lossy().replace('\\', "/"))
        } else {
            None
        };
        if is_binary {
            diff_type = DiffType::Binary;
        }

        // Binary and rename-only diffs are metadata-only (spec.md §4.7
        // point 2): no diff text is extracted for them.
        let diff_text = if matches!(diff_type, DiffType::Binary | DiffType::Renamed) {
            None
        } else {
            git2::Patch::from_diff(&diff, idx)?
                .and_then(|mut patch| patch.to_buf().ok())
                .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        };

        diffs.push(FileDiff { path, old_path, diff_type, diff_text });
    }
    Ok(diffs)
}

fn classify(status: Delta) -> DiffType {
    match status {
        Delta::Added => DiffType::Added,
        Delta::Deleted => DiffType::Deleted,
        Delta::Renamed => DiffType::Renamed,
        _ => DiffType::Modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn run(dir: &std::path::Path, args: &[&str]) {
        let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
        assert!(status.success());
    }

    #[test]
    fn classifies_added_and_modified_files() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init", "-q"]);
        run(dir.path(), &["config", "user.email", "a@example.com"]);
        run(dir.path(), &["config", "user.name", "Alice"]);
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        run(dir.path(), &["add", "."]);
        run(dir.path(), &["commit", "-q", "-m", "add a.txt"]);

        let repo = Repository::open(dir.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        let diffs = diffs_for_commit(&repo, &head).unwrap();

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "a.txt");
        assert_eq!(diffs[0].diff_type, DiffType::Added);
        assert!(diffs[0].diff_text.as_ref().unwrap().contains("hello"));
    }
}
