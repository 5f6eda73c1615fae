use crate::constants::collection as defaults;
use crate::error::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use once_cell::sync::Lazy;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub max_file_size: u64,
    pub max_total_size: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            max_file_size: defaults::DEFAULT_MAX_FILE_SIZE,
            max_total_size: defaults::DEFAULT_MAX_TOTAL_SIZE,
        }
    }
}

/// Concatenated source of one local target, ready for prompt embedding.
#[derive(Debug, Clone)]
pub struct CollectionResult {
    pub content: String,
    pub summary: String,
    pub file_count: usize,
    pub total_bytes: u64,
}

static SENSITIVE: Lazy<GlobSet> = Lazy::new(|| {
    let patterns = parse_patterns(include_str!("sensitive.txt"));
    // A resource that fails to yield patterns falls back to the built-in
    // superset; filtering can only tighten on load failure, never loosen.
    let effective: Vec<&str> = if patterns.is_empty() {
        defaults::SENSITIVE_FALLBACK.to_vec()
    } else {
        patterns
    };
    build_globset(&effective).unwrap_or_else(|| {
        build_globset(defaults::SENSITIVE_FALLBACK).expect("fallback sensitive globs")
    })
});

fn parse_patterns(resource: &str) -> Vec<&str> {
    resource
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect()
}

fn build_globset(patterns: &[&str]) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).ok()?);
    }
    builder.build().ok()
}

fn is_sensitive(file_name: &str) -> bool {
    SENSITIVE.is_match(file_name)
}

fn is_allowed(file_name: &str) -> bool {
    if defaults::ALLOWED_FILENAMES.contains(&file_name) {
        return true;
    }
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| defaults::ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Walk `root` once, lexicographically, concatenating eligible files under
/// `=== <relative-path> ===` headers. Sensitive names are rejected even when
/// their extension is allow-listed; per-file and cumulative byte caps bound
/// the result, and the walk stops at the cumulative cap.
pub fn collect(root: &Path, config: &CollectionConfig) -> Result<CollectionResult> {
    let mut content = String::new();
    let mut file_count = 0usize;
    let mut total_bytes = 0u64;
    let mut skipped_large = 0usize;
    let mut capped = false;

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().map(|t| t.is_dir()).unwrap_or(false)
                && defaults::IGNORED_DIRS.contains(&name.as_ref()))
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if is_sensitive(&name) || !is_allowed(&name) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
        if size > config.max_file_size {
            skipped_large += 1;
            continue;
        }
        if total_bytes + size > config.max_total_size {
            capped = true;
            break;
        }

        let Ok(text) = std::fs::read_to_string(entry.path()) else {
            // Binary or non-UTF8 content has no place in a prompt.
            continue;
        };

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        content.push_str(&format!("=== {relative} ===\n"));
        content.push_str(&text);
        if !text.ends_with('\n') {
            content.push('\n');
        }
        content.push('\n');

        file_count += 1;
        total_bytes += size;
    }

    let mut summary = format!(
        "{file_count} files, {total_bytes} bytes collected from {}",
        root.display()
    );
    if skipped_large > 0 {
        summary.push_str(&format!("; {skipped_large} files over the per-file cap"));
    }
    if capped {
        summary.push_str("; walk stopped at the total-size cap");
    }

    tracing::info!("{summary}");
    Ok(CollectionResult {
        content,
        summary,
        file_count,
        total_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_list_overrides_allowed_extension() {
        assert!(is_sensitive("application-prod.yml"));
        assert!(is_sensitive(".env"));
        assert!(is_sensitive("server.key"));
        assert!(!is_sensitive("Main.java"));
    }

    #[test]
    fn allow_list_covers_names_and_extensions() {
        assert!(is_allowed("Main.java"));
        assert!(is_allowed("lib.rs"));
        assert!(is_allowed("Makefile"));
        assert!(!is_allowed("binary.bin"));
        assert!(!is_allowed("archive.tar.gz"));
    }

    #[test]
    fn fallback_is_superset_of_common_names() {
        for name in [".env", "id_rsa", "credentials.json", "secrets.yaml"] {
            assert!(
                defaults::SENSITIVE_FALLBACK
                    .iter()
                    .any(|p| Glob::new(p).unwrap().compile_matcher().is_match(name)),
                "fallback must cover {name}"
            );
        }
    }
}
