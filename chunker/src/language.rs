//! Extension-to-language tagging (spec.md §3 "language tag (from extension)").

/// Returns a stable language tag for a file path, or `"plaintext"` when the
/// extension isn't recognised. Unknown extensions still get chunked and
/// embedded — the tag is metadata for filtering, not a gate.
pub fn language_for_path(path: &str) -> String {
    let ext = path.rsplit('.').next().filter(|e| *e != path).unwrap_or("");
    language_for_extension(&ext.to_ascii_lowercase()).to_string()
}

fn language_for_extension(ext: &str) -> &'static str {
    match ext {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "scala" => "scala",
        "sh" | "bash" | "zsh" => "shell",
        "sql" => "sql",
        "md" | "mdx" => "markdown",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "html" | "htm" => "html",
        "css" | "scss" | "sass" => "css",
        "proto" => "protobuf",
        "lua" => "lua",
        "hs" => "haskell",
        "ex" | "exs" => "elixir",
        "erl" => "erlang",
        "zig" => "zig",
        "" => "plaintext",
        _ => "plaintext",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_common_extensions() {
        assert_eq!(language_for_path("src/main.rs"), "rust");
        assert_eq!(language_for_path("lib/util.py"), "python");
        assert_eq!(language_for_path("README"), "plaintext");
        assert_eq!(language_for_path("Dockerfile"), "plaintext");
    }
}
