//! Watch-mode file system monitor (spec.md §4.8 "Watch operation"):
//! notify-backed change detection with debounce, feeding the same per-file
//! re-index machinery [`crate::orchestrator`] uses for incremental runs.
//! Modelled on a `notify` + `dashmap` debounced watcher, with the dirty set
//! drained in last-modification order so the newest change to a path always
//! wins a race against an older, still-queued one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::OrchestratorError;

/// A live `notify` watch over one project root, with a debounced dirty set.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    dirty: Arc<DashMap<PathBuf, Instant>>,
    project_root: PathBuf,
}

impl FileWatcher {
    pub fn start(project_root: &Path) -> Result<Self, OrchestratorError> {
        let project_root = project_root
            .canonicalize()
            .map_err(|source| OrchestratorError::Io { path: project_root.display().to_string(), source })?;

        let dirty: Arc<DashMap<PathBuf, Instant>> = Arc::new(DashMap::new());
        let dirty_for_handler = Arc::clone(&dirty);
        let root_for_handler = project_root.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let Ok(event) = res else { return };
                if !is_relevant(&event.kind) {
                    return;
                }
                for path in &event.paths {
                    if should_ignore(&root_for_handler, path) {
                        continue;
                    }
                    if let Ok(rel) = path.strip_prefix(&root_for_handler) {
                        dirty_for_handler.insert(rel.to_path_buf(), Instant::now());
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_millis(100)),
        )
        .map_err(|source| OrchestratorError::Watch(source.to_string()))?;

        watcher
            .watch(&project_root, RecursiveMode::Recursive)
            .map_err(|source| OrchestratorError::Watch(source.to_string()))?;

        Ok(Self { _watcher: watcher, dirty, project_root })
    }

    /// Drains every path whose debounce window has elapsed, oldest change
    /// first, leaving paths still inside their window for the next call
    /// (spec.md §4.8: "per-file changes are coalesced, and a file is
    /// re-indexed at most once per debounce window").
    pub fn drain_settled(&self, debounce: Duration) -> Vec<PathBuf> {
        drain_settled_paths(&self.dirty, debounce)
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}

fn drain_settled_paths(dirty: &DashMap<PathBuf, Instant>, debounce: Duration) -> Vec<PathBuf> {
    let now = Instant::now();
    let mut settled: Vec<(PathBuf, Instant)> = dirty
        .iter()
        .filter(|entry| now.duration_since(*entry.value()) >= debounce)
        .map(|entry| (entry.key().clone(), *entry.value()))
        .collect();
    settled.sort_by_key(|(_, instant)| *instant);
    for (path, _) in &settled {
        dirty.remove(path);
    }
    settled.into_iter().map(|(path, _)| path).collect()
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(DataChange::Any | DataChange::Content))
            | EventKind::Modify(ModifyKind::Name(RenameMode::Any | RenameMode::Both | RenameMode::To | RenameMode::From))
            | EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Remove(RemoveKind::File | RemoveKind::Any)
    )
}

/// Mirrors the built-in ignore patterns the File Finder applies (spec.md
/// §4.1), plus the engine's own on-disk state, so a write to the index
/// itself never triggers a self-reindex loop.
fn should_ignore(root: &Path, path: &Path) -> bool {
    if path.starts_with(root.join(".git"))
        || path.starts_with(root.join(".index"))
        || path.starts_with(root.join("fts_index"))
        || path.starts_with(root.join("fingerprints.json"))
    {
        return true;
    }
    let path_str = path.to_string_lossy();
    path_str.contains("/target/")
        || path_str.contains("/node_modules/")
        || path_str.contains("/.venv/")
        || path_str.contains("/__pycache__/")
        || path_str.ends_with(".swp")
        || path_str.ends_with('~')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_only_settled_paths_in_modification_order() {
        let dirty: Arc<DashMap<PathBuf, Instant>> = Arc::new(DashMap::new());
        dirty.insert(PathBuf::from("b.rs"), Instant::now());
        std::thread::sleep(Duration::from_millis(5));
        dirty.insert(PathBuf::from("a.rs"), Instant::now());

        let settled = drain_settled_paths(&dirty, Duration::from_millis(0));
        assert_eq!(settled, vec![PathBuf::from("b.rs"), PathBuf::from("a.rs")]);
        assert!(dirty.is_empty());
    }

    #[test]
    fn leaves_paths_still_inside_debounce_window() {
        let dirty: Arc<DashMap<PathBuf, Instant>> = Arc::new(DashMap::new());
        dirty.insert(PathBuf::from("a.rs"), Instant::now());

        let settled = drain_settled_paths(&dirty, Duration::from_secs(60));
        assert!(settled.is_empty());
        assert_eq!(dirty.len(), 1);
    }

    #[test]
    fn ignores_git_and_engine_internal_paths() {
        let root = Path::new("/repo");
        assert!(should_ignore(root, &root.join(".git/HEAD")));
        assert!(should_ignore(root, &root.join(".index/code/collection_meta.json")));
        assert!(should_ignore(root, &root.join("fts_index/meta.json")));
        assert!(!should_ignore(root, &root.join("src/main.rs")));
    }
}
