//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the engine and demo sources:
//! - No thread sleeps (all timing goes through tokio timers)
//! - No blocking file I/O inside async functions
//! - No `unwrap()`/`expect()` in library code
//!
//! The helpers here scan production source: everything before a file's
//! `#[cfg(test)]` module, with `//` comments stripped.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["chazy/core/src", "chazy/demo/src"];

/// Library source directory
pub const LIBRARY_DIR: &str = "chazy/core/src";

/// Workspace root
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// One production source line
#[derive(Clone, Debug)]
pub struct SourceLine {
    /// File the line is in
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// Code with any trailing `//` comment removed
    pub code: String,
    /// Whether the line is inside an `async fn` body
    pub in_async_fn: bool,
}

/// A policy violation
#[derive(Clone, Debug)]
pub struct Violation {
    /// Offending line
    pub line: SourceLine,
    /// What rule it breaks
    pub rule: &'static str,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.line.path.display(),
            self.line.number,
            self.rule,
            self.line.code.trim()
        )
    }
}

fn strip_comment(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Production lines of one file's content
#[must_use]
pub fn production_lines(path: &Path, content: &str) -> Vec<SourceLine> {
    let mut lines = Vec::new();
    let mut async_depth: Option<i64> = None;
    let mut depth: i64 = 0;

    for (idx, raw) in content.lines().enumerate() {
        if raw.trim_start().starts_with("#[cfg(test)]") {
            break;
        }
        let code = strip_comment(raw);
        if async_depth.is_none() && code.contains("async fn ") {
            async_depth = Some(depth);
        }
        lines.push(SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code: code.to_string(),
            in_async_fn: async_depth.is_some(),
        });

        let opens = code.matches('{').count() as i64;
        let closes = code.matches('}').count() as i64;
        depth += opens - closes;
        if let Some(start) = async_depth {
            if depth <= start && (opens > 0 || closes > 0) {
                async_depth = None;
            }
        }
    }
    lines
}

/// Production lines of every `.rs` file under `dirs`
#[must_use]
pub fn scan(dirs: &[&str]) -> Vec<SourceLine> {
    let root = workspace_root();
    let mut lines = Vec::new();
    for dir in dirs {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(Result::ok)
        {
            let file = entry.path();
            if file.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            if let Ok(content) = fs::read_to_string(file) {
                lines.extend(production_lines(file, &content));
            }
        }
    }
    lines
}

/// Lines matching `predicate`, as violations of `rule`
pub fn violations<F>(lines: Vec<SourceLine>, rule: &'static str, predicate: F) -> Vec<Violation>
where
    F: Fn(&SourceLine) -> bool,
{
    lines
        .into_iter()
        .filter(|line| predicate(line))
        .map(|line| Violation { line, rule })
        .collect()
}

/// Panic with a report if there are violations
pub fn assert_none(violations: &[Violation], policy: &str) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n{policy}\n");
    for violation in violations {
        eprintln!("  {violation}");
    }
    panic!("Found {} violation(s) of: {policy}", violations.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_module_is_skipped() {
        let content = "fn a() {}\n#[cfg(test)]\nmod tests { fn b() { x.unwrap(); } }\n";
        let lines = production_lines(Path::new("x.rs"), content);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_async_fn_body_tracked() {
        let content = "async fn a() {\n    read();\n}\nfn b() {\n    read();\n}\n";
        let lines = production_lines(Path::new("x.rs"), content);
        let flags: Vec<bool> = lines.iter().map(|l| l.in_async_fn).collect();
        assert_eq!(flags, vec![true, true, true, false, false, false]);
    }

    #[test]
    fn test_comments_stripped() {
        let lines = production_lines(Path::new("x.rs"), "let a = 1; // a.unwrap()\n");
        assert!(!lines[0].code.contains("unwrap"));
    }

    #[test]
    fn test_workspace_root_has_sources() {
        assert!(workspace_root().join(LIBRARY_DIR).join("lib.rs").exists());
    }
}
