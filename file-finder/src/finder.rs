//! L0: enumerate candidate files for the chunker (spec.md §4.1).

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ignore::IgnoreRuleset;

#[derive(Debug, Error)]
pub enum FinderError {
    #[error("project root `{path}` is unreadable: {source}")]
    UnreadableRoot { path: PathBuf, source: std::io::Error },
}

/// A file the finder decided to skip, with the reason — surfaced as a
/// warning, never fatal (spec.md §4.1 "unreadable files are skipped with
/// a warning").
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Ignored,
    TooLarge { size: u64, cap: u64 },
    Binary,
    Unreadable,
    NotIncluded,
}

#[derive(Debug, Clone)]
pub struct FinderOptions {
    pub max_file_size_bytes: u64,
    /// Only files matching at least one include glob are considered, when
    /// non-empty.
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub ignore_overrides: Vec<String>,
}

impl Default for FinderOptions {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 5 * 1024 * 1024,
            include_globs: Vec::new(),
            exclude_globs: Vec::new(),
            ignore_overrides: Vec::new(),
        }
    }
}

pub struct FileFinder {
    project_root: PathBuf,
    options: FinderOptions,
    ignore: IgnoreRuleset,
}

/// Result of a full walk: the deterministic work list plus everything that
/// got skipped along the way.
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

impl FileFinder {
    pub fn new(project_root: impl Into<PathBuf>, options: FinderOptions) -> Self {
        let project_root = project_root.into();
        let ignore = IgnoreRuleset::load_with_overrides(&project_root, &options.ignore_overrides);
        Self { project_root, options, ignore }
    }

    /// Enumerate candidate files rooted at `project_root`. Ordering is
    /// sorted by relative path so callers get reproducible progress and
    /// cancellation behaviour (spec.md §4.1).
    pub fn discover(&self) -> Result<DiscoveryResult, FinderError> {
        if !self.project_root.is_dir() {
            return Err(FinderError::UnreadableRoot {
                path: self.project_root.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let mut result = DiscoveryResult::default();
        let mut stack = vec![self.project_root.clone()];

        while let Some(dir) = stack.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(source) => {
                    if dir == self.project_root {
                        return Err(FinderError::UnreadableRoot { path: dir, source });
                    }
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let rel = match path.strip_prefix(&self.project_root) {
                    Ok(r) => r.to_path_buf(),
                    Err(_) => continue,
                };

                if self.ignore.should_ignore(&rel) {
                    result.skipped.push(SkippedFile { path: rel, reason: SkipReason::Ignored });
                    continue;
                }

                let file_type = match entry.file_type() {
                    Ok(ft) => ft,
                    Err(_) => {
                        result.skipped.push(SkippedFile { path: rel, reason: SkipReason::Unreadable });
                        continue;
                    }
                };

                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }

                if !self.is_included(&rel) {
                    result.skipped.push(SkippedFile { path: rel, reason: SkipReason::NotIncluded });
                    continue;
                }

                match self.classify(&path) {
                    Ok(()) => result.files.push(path),
                    Err(reason) => result.skipped.push(SkippedFile { path: rel, reason }),
                }
            }
        }

        result.files.sort();
        Ok(result)
    }

    fn is_included(&self, rel: &Path) -> bool {
        let path_str = rel.to_string_lossy();
        if self.options.exclude_globs.iter().any(|g| simple_glob(g, &path_str)) {
            return false;
        }
        if self.options.include_globs.is_empty() {
            return true;
        }
        self.options.include_globs.iter().any(|g| simple_glob(g, &path_str))
    }

    fn classify(&self, path: &Path) -> Result<(), SkipReason> {
        let metadata = fs::metadata(path).map_err(|_| SkipReason::Unreadable)?;
        if metadata.len() > self.options.max_file_size_bytes {
            return Err(SkipReason::TooLarge { size: metadata.len(), cap: self.options.max_file_size_bytes });
        }
        if is_binary(path) {
            return Err(SkipReason::Binary);
        }
        Ok(())
    }
}

/// Sniff the leading bytes of a file for null bytes or invalid UTF-8 —
/// the spec's binary-detection heuristic (spec.md §4.1).
fn is_binary(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else { return true };
    let mut sample = [0u8; 8192];
    let n = match file.read(&mut sample) {
        Ok(n) => n,
        Err(_) => return true,
    };
    let sample = &sample[..n];
    if sample.contains(&0) {
        return true;
    }
    std::str::from_utf8(sample).is_err()
}

/// Matches `**` as "any number of path components" and `*` within a
/// component, which covers the glob syntax real ignore/include lists use
/// without pulling in a whole globbing crate.
fn simple_glob(pattern: &str, text: &str) -> bool {
    let pattern = pattern.replace("**", "\u{0}");
    fn helper(p: &[char], t: &[char]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some('\u{0}'), _) => helper(&p[1..], t) || (!t.is_empty() && helper(p, &t[1..])),
            (Some('*'), _) => helper(&p[1..], t) || (!t.is_empty() && helper(p, &t[1..])),
            (Some('?'), Some(_)) => helper(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => helper(&p[1..], &t[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    helper(&p, &t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovers_files_sorted_and_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.py"), "b = 1").unwrap();
        fs::write(dir.path().join("a.py"), "a = 1").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/c.py"), "c = 1").unwrap();

        let finder = FileFinder::new(dir.path(), FinderOptions::default());
        let result = finder.discover().unwrap();
        let names: Vec<String> = result.files.iter().map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string()).collect();
        assert_eq!(names, vec!["a.py", "b.py", "sub/c.py"]);
    }

    #[test]
    fn skips_binary_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("data.bin"), [0u8, 1, 2, 3, 0, 0]).unwrap();
        let finder = FileFinder::new(dir.path(), FinderOptions::default());
        let result = finder.discover().unwrap();
        assert!(result.files.is_empty());
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].reason, SkipReason::Binary);
    }

    #[test]
    fn skips_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.py"), vec![b'a'; 100]).unwrap();
        let mut options = FinderOptions::default();
        options.max_file_size_bytes = 10;
        let finder = FileFinder::new(dir.path(), options);
        let result = finder.discover().unwrap();
        assert!(result.files.is_empty());
        assert!(matches!(result.skipped[0].reason, SkipReason::TooLarge { .. }));
    }

    #[test]
    fn unreadable_root_is_fatal() {
        let finder = FileFinder::new("/nonexistent/path/for/sure", FinderOptions::default());
        assert!(finder.discover().is_err());
    }

    #[test]
    fn respects_exclude_globs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("tests/test_x.py"), "x = 1").unwrap();
        fs::write(dir.path().join("main.py"), "pass").unwrap();

        let mut options = FinderOptions::default();
        options.exclude_globs = vec!["tests/*".to_string()];
        let finder = FileFinder::new(dir.path(), options);
        let result = finder.discover().unwrap();
        assert_eq!(result.files.len(), 1);
        assert!(result.files[0].ends_with("main.py"));
    }
}
