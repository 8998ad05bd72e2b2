// mailbackup/src/backup/exclude.rs
use std::path::Path;

/// One token of a task's comma-separated exclusion list.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    /// `*.tmp`: file name ends with the rest.
    Suffix(String),
    /// `cache*`: file name starts with the rest.
    Prefix(String),
    /// Anything else: full path contains it.
    Contains(String),
}

/// Parsed exclusion patterns. Matching is case-sensitive.
#[derive(Debug, Clone, Default)]
pub struct ExcludePatterns {
    patterns: Vec<Pattern>,
}

impl ExcludePatterns {
    pub fn parse(raw: Option<&str>) -> Self {
        let patterns = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| {
                if let Some(rest) = token.strip_prefix('*') {
                    Pattern::Suffix(rest.to_string())
                } else if let Some(rest) = token.strip_suffix('*') {
                    Pattern::Prefix(rest.to_string())
                } else {
                    Pattern::Contains(token.to_string())
                }
            })
            .collect();
        ExcludePatterns { patterns }
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        let full_path = path.to_string_lossy();

        self.patterns.iter().any(|pattern| match pattern {
            Pattern::Suffix(suffix) => file_name.ends_with(suffix.as_str()),
            Pattern::Prefix(prefix) => file_name.starts_with(prefix.as_str()),
            Pattern::Contains(needle) => full_path.contains(needle.as_str()),
        })
    }
}
