//! L0 — File Finder: deterministic, ignore-aware file discovery.

pub mod finder;
pub mod ignore;

pub use finder::{DiscoveryResult, FileFinder, FinderError, FinderOptions, SkipReason, SkippedFile};
pub use ignore::{IgnorePattern, IgnoreRuleset};
