//! Git history walk (spec.md §4.7): enumerate commits newest-first,
//! newer than `last_indexed_commit`, and hand each to [`crate::diff`] and
//! [`crate::chunking`] for conversion into temporal chunks.

use chrono::{DateTime, Utc};
use engine_model::CommitRecord;
use git2::{Repository, Sort};

use crate::diff::diffs_for_commit;
use crate::error::TemporalError;

/// Which refs to seed the walk from (spec.md §4.7 "optional branch
/// selector").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchSelector {
    /// Only the currently checked-out branch (`HEAD`).
    Current,
    /// Every local branch.
    All,
    /// A caller-supplied list of branch names.
    Explicit(Vec<String>),
}

impl Default for BranchSelector {
    fn default() -> Self {
        BranchSelector::Current
    }
}

#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    pub branch_selector: BranchSelector,
    pub max_commits: Option<usize>,
    pub since_date: Option<DateTime<Utc>>,
    /// Hash of the most recently indexed commit from a prior run. Walking
    /// stops the instant this hash is reached (spec.md §4.7 invariant:
    /// "once indexed, a commit is never re-ingested").
    pub last_indexed_commit: Option<String>,
}

pub struct TemporalWalker {
    repo: Repository,
}

impl TemporalWalker {
    pub fn open(project_root: &std::path::Path) -> Result<Self, TemporalError> {
        let repo = Repository::open(project_root)
            .map_err(|source| TemporalError::Open { path: project_root.display().to_string(), source })?;
        Ok(Self { repo })
    }

    /// Walks commits newest-first according to `options`, stopping at
    /// `last_indexed_commit`, `since_date`, or `max_commits`, whichever
    /// comes first.
    pub fn walk(&self, options: &WalkOptions) -> Result<Vec<CommitRecord>, TemporalError> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME)?;
        self.seed(&mut revwalk, &options.branch_selector)?;

        let mut records = Vec::new();
        for oid_result in revwalk {
            let oid = oid_result?;
            let commit = self.repo.find_commit(oid)?;

            if let Some(stop_at) = &options.last_indexed_commit {
                if commit.id().to_string() == *stop_at {
                    break;
                }
            }

            if let Some(since) = options.since_date {
                let commit_time = DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_default();
                if commit_time < since {
                    break;
                }
            }

            let parents: Vec<String> = commit.parent_ids().map(|id| id.to_string()).collect();
            let author = commit.author();
            let diffs = diffs_for_commit(&self.repo, &commit)?;

            records.push(CommitRecord {
                hash: commit.id().to_string(),
                author_name: author.name().unwrap_or("unknown").to_string(),
                author_email: author.email().unwrap_or("").to_string(),
                timestamp: commit.time().seconds(),
                message: commit.message().unwrap_or("").to_string(),
                parents,
                diffs,
            });

            if let Some(max) = options.max_commits {
                if records.len() >= max {
                    break;
                }
            }
        }

        Ok(records)
    }

    fn seed(&self, revwalk: &mut git2::Revwalk<'_>, selector: &BranchSelector) -> Result<(), TemporalError> {
        match selector {
            BranchSelector::Current => {
                revwalk.push_head()?;
            }
            BranchSelector::All => {
                for branch in self.repo.branches(Some(git2::BranchType::Local))? {
                    let (branch, _) = branch?;
                    if let Some(target) = branch.get().target() {
                        revwalk.push(target)?;
                    }
                }
            }
            BranchSelector::Explicit(names) => {
                for name in names {
                    let branch = self
                        .repo
                        .find_branch(name, git2::BranchType::Local)
                        .map_err(|_| TemporalError::BranchNotFound(name.clone()))?;
                    let target = branch.get().target().ok_or_else(|| TemporalError::BranchNotFound(name.clone()))?;
                    revwalk.push(target)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn init_repo_with_commits(dir: &std::path::Path) {
        let run = |args: &[&str]| {
            let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
            assert!(status.success());
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "a@example.com"]);
        run(&["config", "user.name", "Alice"]);
        std::fs::write(dir.join("a.txt"), "one").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "first commit"]);
        std::fs::write(dir.join("a.txt"), "two").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "second commit"]);
    }

    #[test]
    fn walks_current_branch_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commits(dir.path());

        let walker = TemporalWalker::open(dir.path()).unwrap();
        let records = walker.walk(&WalkOptions::default()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message.trim(), "second commit");
        assert_eq!(records[1].message.trim(), "first commit");
    }

    #[test]
    fn stops_at_last_indexed_commit() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commits(dir.path());

        let walker = TemporalWalker::open(dir.path()).unwrap();
        let all = walker.walk(&WalkOptions::default()).unwrap();
        let first_hash = all[1].hash.clone();

        let incremental = walker
            .walk(&WalkOptions { last_indexed_commit: Some(first_hash), ..Default::default() })
            .unwrap();
        assert_eq!(incremental.len(), 1);
        assert_eq!(incremental[0].message.trim(), "second commit");
    }

    #[test]
    fn respects_max_commits_cap() {
        let dir = tempfile::tempdir().unwrap();
        init_repo_with_commits(dir.path());

        let walker = TemporalWalker::open(dir.path()).unwrap();
        let records = walker.walk(&WalkOptions { max_commits: Some(1), ..Default::default() }).unwrap();
        assert_eq!(records.len(), 1);
    }
}
