//! Ignore rules: gitignore-compatible patterns plus an optional override
//! ruleset with higher precedence (spec.md §4.1).
//!
//! Precedence, highest to lowest:
//! 1. the caller-supplied override ruleset
//! 2. `.gitignore` (repo-level)
//! 3. built-in patterns that always apply
//!
//! This is deliberately not a full gitignore implementation (no
//! re-inclusion via `!pattern`, no `**` double-star semantics beyond
//! simple substring matching) — the engine's accuracy requirement is
//! "skip build output and VCS internals", not bit-for-bit git parity.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone)]
pub enum IgnorePattern {
    /// Trailing-slash directory pattern: `"target/"`.
    Directory(String),
    /// Leading-star extension pattern: `"*.log"`.
    Extension(String),
    /// Exact substring match anywhere in the path.
    Substring(String),
    /// Single-level glob with `*`/`?` wildcards (no path separators).
    Glob(String),
}

impl IgnorePattern {
    pub fn parse(raw: &str) -> Self {
        if let Some(dir) = raw.strip_suffix('/') {
            return IgnorePattern::Directory(format!("{dir}/"));
        }
        if let Some(ext) = raw.strip_prefix('*') {
            if !ext.contains('/') && (raw.contains('*') == (raw.matches('*').count() == 1)) {
                return IgnorePattern::Extension(ext.to_string());
            }
        }
        if raw.contains('*') || raw.contains('?') {
            return IgnorePattern::Glob(raw.to_string());
        }
        IgnorePattern::Substring(raw.to_string())
    }

    fn matches(&self, path_str: &str, file_name: &str) -> bool {
        match self {
            IgnorePattern::Directory(dir) => path_str.contains(dir.as_str()),
            IgnorePattern::Extension(ext) => file_name.ends_with(ext.as_str()),
            IgnorePattern::Substring(s) => path_str.contains(s.as_str()),
            IgnorePattern::Glob(pattern) => glob_match(pattern, file_name),
        }
    }
}

/// A minimal `*`/`?` glob matcher over a single path component.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn helper(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => helper(&p[1..], t) || (!t.is_empty() && helper(p, &t[1..])),
            (Some(b'?'), Some(_)) => helper(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => helper(&p[1..], &t[1..]),
            _ => false,
        }
    }
    helper(pattern.as_bytes(), text.as_bytes())
}

/// Built-in patterns, repo `.gitignore`, and an optional higher-precedence
/// override ruleset, merged into one matcher.
pub struct IgnoreRuleset {
    base_patterns: Vec<IgnorePattern>,
    override_patterns: Vec<IgnorePattern>,
}

impl IgnoreRuleset {
    /// Load built-ins plus the project's `.gitignore`, with no override
    /// ruleset.
    pub fn load(project_root: &Path) -> Self {
        Self::load_with_overrides(project_root, &[])
    }

    pub fn load_with_overrides(project_root: &Path, overrides: &[String]) -> Self {
        let mut base_patterns = Self::built_in_patterns();
        base_patterns.extend(Self::load_gitignore(project_root));
        let override_patterns = overrides.iter().map(|p| IgnorePattern::parse(p)).collect();
        Self { base_patterns, override_patterns }
    }

    pub fn built_in_patterns() -> Vec<IgnorePattern> {
        vec![
            IgnorePattern::Directory(".git/".into()),
            IgnorePattern::Directory(".index/".into()),
            IgnorePattern::Directory("fts_index/".into()),
            IgnorePattern::Directory("target/".into()),
            IgnorePattern::Directory("node_modules/".into()),
            IgnorePattern::Directory("__pycache__/".into()),
            IgnorePattern::Directory(".venv/".into()),
            IgnorePattern::Directory("dist/".into()),
            IgnorePattern::Directory("build/".into()),
            IgnorePattern::Substring(".DS_Store".into()),
        ]
    }

    fn load_gitignore(project_root: &Path) -> Vec<IgnorePattern> {
        let path = project_root.join(".gitignore");
        let Ok(file) = File::open(path) else { return Vec::new() };
        let reader = BufReader::new(file);
        reader
            .lines()
            .map_while(Result::ok)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| IgnorePattern::parse(&l))
            .collect()
    }

    /// `path` is project-root-relative, forward-slash normalised.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy().replace('\\', "/");
        let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

        for p in &self.override_patterns {
            if p.matches(&path_str, &file_name) {
                return true;
            }
        }
        for p in &self.base_patterns {
            if p.matches(&path_str, &file_name) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_ins_ignore_git_and_target() {
        let rules = IgnoreRuleset { base_patterns: IgnoreRuleset::built_in_patterns(), override_patterns: vec![] };
        assert!(rules.should_ignore(Path::new(".git/HEAD")));
        assert!(rules.should_ignore(Path::new("target/debug/main")));
        assert!(!rules.should_ignore(Path::new("src/main.rs")));
    }

    #[test]
    fn glob_pattern_matches_extension() {
        assert!(glob_match("*.log", "app.log"));
        assert!(!glob_match("*.log", "app.logx"));
        assert!(glob_match("test_?.py", "test_1.py"));
    }

    #[test]
    fn override_ruleset_takes_precedence() {
        // Override explicitly un-ignoring something the base rules would
        // have caught isn't supported (no negation), but an override can
        // add stricter coverage than the base set.
        let rules = IgnoreRuleset::load_with_overrides(Path::new("."), &["*.secret".to_string()]);
        assert!(rules.should_ignore(Path::new("keys/api.secret")));
    }
}
