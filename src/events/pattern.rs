//! # Glob matching for event tags.
//!
//! Shell-glob semantics (the same rules `fnmatch` uses), compiled through
//! [`globset`]:
//! - `*` any run of characters, `/` included, possibly empty;
//! - `?` exactly one character;
//! - `[abc]`, `[a-z]`, `[!abc]` character classes;
//! - everything else is literal (braces and backslashes included);
//! - the whole tag must match, not a substring.
//!
//! ```rust
//! use stagevisor::matches;
//!
//! assert!(matches("salt/job/20231001120000123456/ret/*",
//!                 "salt/job/20231001120000123456/ret/worker-07"));
//! assert!(matches("a/*/c", "a/b/b/c"));
//! assert!(!matches("a/?/c", "a/bb/c"));
//! ```

use std::fmt;

use globset::{GlobBuilder, GlobMatcher};

use crate::error::PatternError;

/// A compiled tag pattern.
#[derive(Clone)]
pub struct TagPattern {
    raw: String,
    kind: Kind,
}

#[derive(Clone)]
enum Kind {
    Any,
    Literal,
    Glob(GlobMatcher),
}

impl TagPattern {
    /// Compiles `pattern`.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let kind = if pattern.chars().all(|c| c == '*') && !pattern.is_empty() {
            Kind::Any
        } else if !pattern.contains(['*', '?', '[']) {
            Kind::Literal
        } else {
            let glob = GlobBuilder::new(&translate(pattern))
                .literal_separator(false)
                .backslash_escape(true)
                .build()
                .map_err(|e| PatternError {
                    pattern: pattern.to_string(),
                    reason: e.kind().to_string(),
                })?;
            Kind::Glob(glob.compile_matcher())
        };

        Ok(Self {
            raw: pattern.to_string(),
            kind,
        })
    }

    /// Pattern matching every tag.
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            kind: Kind::Any,
        }
    }

    /// Source text of the pattern.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if `tag` matches the whole pattern.
    pub fn is_match(&self, tag: &str) -> bool {
        match &self.kind {
            Kind::Any => true,
            Kind::Literal => self.raw == tag,
            Kind::Glob(m) => m.is_match(tag),
        }
    }
}

impl fmt::Debug for TagPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TagPattern").field(&self.raw).finish()
    }
}

impl fmt::Display for TagPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Matches `tag` against the glob `pattern`.
///
/// A pattern that cannot be compiled matches nothing.
pub fn matches(pattern: &str, tag: &str) -> bool {
    match TagPattern::new(pattern) {
        Ok(p) => p.is_match(tag),
        Err(e) => {
            tracing::warn!(pattern, error = %e.reason, "unusable tag pattern");
            false
        }
    }
}

/// Escapes glob metacharacters so `literal` only matches itself.
pub fn escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Rewrites an fnmatch pattern into globset syntax.
///
/// - runs of `*` collapse to one (`**` has directory semantics in globset);
/// - `{`, `}`, `\` and unclosed `[` are escaped so they stay literal;
/// - classes are copied verbatim, except that a leading `^` (a literal member
///   in fnmatch, a negation in globset) is moved to the end of the class.
fn translate(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' => {
                out.push('*');
                while i + 1 < chars.len() && chars[i + 1] == '*' {
                    i += 1;
                }
            }
            '?' => out.push('?'),
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push('[');
                    let mut j = i + 1;
                    let negated = chars[j] == '!';
                    if negated {
                        out.push('!');
                        j += 1;
                    }
                    let members = &chars[j..end];
                    match members.split_first() {
                        Some((&'^', [])) if !negated => {
                            out.pop();
                            out.push_str("\\^");
                            i = end + 1;
                            continue;
                        }
                        Some((&'^', rest)) => {
                            out.extend(rest.iter());
                            out.push('^');
                        }
                        _ => out.extend(members.iter()),
                    }
                    out.push(']');
                    i = end;
                }
                None => out.push_str("\\["),
            },
            '{' | '}' | '\\' | ']' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

/// Index of the `]` closing the class opened at `start`, fnmatch rules:
/// a `]` right after `[` or `[!` is a member, not the terminator.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if j < chars.len() && chars[j] == '!' {
        j += 1;
    }
    if j < chars.len() && chars[j] == ']' {
        j += 1;
    }
    while j < chars.len() {
        if chars[j] == ']' {
            return Some(j);
        }
        j += 1;
    }
    None
}
