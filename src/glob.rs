//! Include/exclude glob matching and base-directory extraction.
//!
//! Patterns are normalized to POSIX form before compilation: backslash
//! separators become slashes, a drive-letter prefix becomes a leading
//! slash, and relative patterns resolve against the configured working
//! directory. Top-level brace alternation expands into multiple patterns
//! before base-directory extraction so `{src,test}/**` narrows the watch
//! footprint to two roots instead of one shared ancestor.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::{Result, WatcherError};

/// Compiled include/exclude predicates plus the derived watch roots.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    includes: Vec<Pattern>,
    excludes: Vec<ExcludePattern>,
    bases: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
struct ExcludePattern {
    full: Pattern,

    /// The pattern with a trailing `/**` removed, so a directory whose
    /// entire subtree is excluded can be pruned.
    prefix: Option<Pattern>,
}

impl GlobFilter {
    /// Compile include and exclude pattern lists against a working
    /// directory. Invalid patterns fail here; the predicates never fail
    /// at runtime.
    pub fn new(includes: &[String], excludes: &[String], cwd: &Path) -> Result<Self> {
        let cwd = std::path::absolute(cwd)?;
        let cwd = to_posix(&cwd.to_string_lossy());

        let mut compiled_includes = Vec::new();
        let mut bases = Vec::new();
        for pattern in includes {
            for expanded in expand_braces(&normalize_pattern(pattern, &cwd)) {
                bases.push(posix_to_native(&base_directory(&expanded)));
                compiled_includes.push(compile(&expanded)?);
            }
        }

        let mut compiled_excludes = Vec::new();
        for pattern in excludes {
            for expanded in expand_braces(&normalize_pattern(pattern, &cwd)) {
                let prefix = match expanded.strip_suffix("/**") {
                    Some(stripped) if !stripped.is_empty() => Some(compile(stripped)?),
                    _ => None,
                };
                compiled_excludes.push(ExcludePattern {
                    full: compile(&expanded)?,
                    prefix,
                });
            }
        }

        Ok(Self {
            includes: compiled_includes,
            excludes: compiled_excludes,
            bases: dedup_bases(bases),
        })
    }

    /// Whether a file at `path` should be emitted: some include matches
    /// and no exclude does. With no excludes this reduces to the include
    /// check alone.
    pub fn is_match(&self, path: &Path) -> bool {
        let posix = to_posix(&path.to_string_lossy());
        if !self
            .includes
            .iter()
            .any(|pattern| pattern.matches_with(&posix, match_options()))
        {
            return false;
        }
        !self
            .excludes
            .iter()
            .any(|exclude| exclude.full.matches_with(&posix, match_options()))
    }

    /// Whether a directory's entire subtree can be pruned from watching.
    pub fn should_skip(&self, dir: &Path) -> bool {
        let posix = to_posix(&dir.to_string_lossy());
        self.excludes.iter().any(|exclude| {
            exclude.full.matches_with(&posix, match_options())
                || exclude
                    .prefix
                    .as_ref()
                    .is_some_and(|prefix| prefix.matches_with(&posix, match_options()))
        })
    }

    /// Watch roots derived from the include patterns, with bases covered
    /// by a broader base removed.
    pub fn base_directories(&self) -> &[PathBuf] {
        &self.bases
    }
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

fn compile(pattern: &str) -> Result<Pattern> {
    Pattern::new(&rewrite_escapes(pattern)).map_err(|err| WatcherError::InvalidPattern {
        pattern: pattern.to_string(),
        message: err.msg.to_string(),
    })
}

/// The `glob` crate has no escape character; rewrite `\*`-style escapes to
/// single-character classes so they survive compilation.
fn rewrite_escapes(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some(meta @ ('*' | '?' | '[')) => {
                out.push('[');
                out.push(meta);
                out.push(']');
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Normalize one pattern to absolute POSIX form against a POSIX cwd.
fn normalize_pattern(pattern: &str, cwd: &str) -> String {
    let posix = to_posix(pattern);
    if posix.starts_with('/') {
        posix
    } else if cwd == "/" {
        format!("/{posix}")
    } else {
        format!("{cwd}/{posix}")
    }
}

/// Rewrite a path string to the uniform POSIX matching form. On hosts with
/// backslash separators, separators and drive-letter prefixes are
/// rewritten; a trailing slash is stripped except for the root, and an
/// empty result becomes `.`.
fn to_posix(input: &str) -> String {
    let mut out = if std::path::MAIN_SEPARATOR == '\\' {
        let replaced = input.replace('\\', "/");
        let bytes = replaced.as_bytes();
        if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
            format!("/{replaced}")
        } else {
            replaced
        }
    } else {
        input.to_string()
    };

    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    if out.is_empty() {
        out.push('.');
    }
    out
}

/// Map a POSIX matching path back to a native filesystem path.
fn posix_to_native(posix: &str) -> PathBuf {
    if std::path::MAIN_SEPARATOR == '\\' {
        let stripped = match posix.strip_prefix('/') {
            Some(rest) if rest.as_bytes().get(1) == Some(&b':') => rest,
            _ => posix,
        };
        PathBuf::from(stripped.replace('/', "\\"))
    } else {
        PathBuf::from(posix)
    }
}

/// Expand top-level `{a,b}` alternation, recursing into nested braces.
/// Escaped braces stay literal; an unbalanced brace is treated literally.
fn expand_braces(pattern: &str) -> Vec<String> {
    let chars: Vec<char> = pattern.chars().collect();

    let mut start = None;
    let mut escaped = false;
    for (index, &ch) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '{' {
            start = Some(index);
            break;
        }
    }
    let Some(start) = start else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0usize;
    let mut escaped = false;
    let mut alternatives = Vec::new();
    let mut current = String::new();
    let mut close = None;
    for (index, &ch) in chars.iter().enumerate().skip(start) {
        if escaped {
            current.push('\\');
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '{' {
            depth += 1;
            if depth > 1 {
                current.push(ch);
            }
        } else if ch == '}' {
            depth -= 1;
            if depth == 0 {
                alternatives.push(std::mem::take(&mut current));
                close = Some(index);
                break;
            }
            current.push(ch);
        } else if ch == ',' && depth == 1 {
            alternatives.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix: String = chars[..start].iter().collect();
    let suffix: String = chars[close + 1..].iter().collect();

    let mut out = Vec::new();
    for alternative in alternatives {
        out.extend(expand_braces(&format!("{prefix}{alternative}{suffix}")));
    }
    out
}

/// The longest prefix of a POSIX pattern with no glob metacharacters. A
/// fully literal pattern names a single file, so its parent is the base.
fn base_directory(pattern: &str) -> String {
    let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty()).collect();

    let mut literal = Vec::new();
    let mut truncated = false;
    for component in &components {
        if has_glob_meta(component) {
            truncated = true;
            break;
        }
        literal.push(*component);
    }
    if !truncated {
        literal.pop();
    }

    format!("/{}", literal.join("/"))
}

fn has_glob_meta(component: &str) -> bool {
    let mut escaped = false;
    for ch in component.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '*' | '?' | '[' | '{' => return true,
            _ => {}
        }
    }
    false
}

/// Drop bases already covered by a broader base.
fn dedup_bases(mut bases: Vec<PathBuf>) -> Vec<PathBuf> {
    bases.sort();
    bases.dedup();

    let mut out: Vec<PathBuf> = Vec::new();
    for base in bases {
        if !out.iter().any(|kept| base.starts_with(kept)) {
            out.push(base);
        }
    }
    out
}
