//! Ant-style path patterns.
//!
//! Patterns are matched segment by segment against the request path:
//!
//! - `?` matches exactly one character within a segment
//! - `*` matches zero or more characters within a segment
//! - `**` as a whole segment matches zero or more segments
//!
//! So `/api/health/**` matches `/api/health`, `/api/health/live` and
//! `/api/health/db/replica`, while `/api/*/status` matches
//! `/api/orders/status` but not `/api/orders/eu/status`. Empty segments
//! are ignored on both sides, which makes trailing slashes insignificant.

use std::{fmt, str::FromStr};

use crate::error::{PolicyError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `**`: any number of whole segments.
    AnyDepth,
    /// Literal text, possibly containing `*` and `?` wildcards.
    Glob(Vec<char>),
}

/// A compiled Ant-style path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compiles a pattern. Patterns must be absolute.
    pub fn parse(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(PolicyError::invalid_pattern(pattern, "pattern is empty"));
        }
        if !trimmed.starts_with('/') {
            return Err(PolicyError::invalid_pattern(pattern, "pattern must start with '/'"));
        }

        let mut segments: Vec<Segment> = Vec::new();
        for part in trimmed.split('/').filter(|part| !part.is_empty()) {
            if part == "**" {
                // Adjacent `**` segments are equivalent to one.
                if segments.last() != Some(&Segment::AnyDepth) {
                    segments.push(Segment::AnyDepth);
                }
            } else {
                segments.push(Segment::Glob(part.chars().collect()));
            }
        }

        Ok(Self { raw: trimmed.to_string(), segments })
    }

    /// Returns the pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Tests whether a request path matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        },
        Some((Segment::Glob(glob), rest)) => match path.split_first() {
            Some((head, tail)) => glob_matches(glob, head) && match_segments(rest, tail),
            None => false,
        },
    }
}

/// Single-segment wildcard match with backtracking on the last `*`.
fn glob_matches(glob: &[char], text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let (mut g, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match glob.get(g) {
            Some('*') => {
                star = Some((g, t));
                g += 1;
            },
            Some(&c) if c == '?' || c == text[t] => {
                g += 1;
                t += 1;
            },
            _ => match star {
                Some((star_g, star_t)) => {
                    g = star_g + 1;
                    t = star_t + 1;
                    star = Some((star_g, star_t + 1));
                },
                None => return false,
            },
        }
    }

    glob[g..].iter().all(|&c| c == '*')
}

impl FromStr for PathPattern {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// An ordered set of patterns; a path matches the set if any member matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathSet {
    patterns: Vec<PathPattern>,
}

impl PathSet {
    /// Compiles every pattern, failing on the first invalid one.
    pub fn parse<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| PathPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Tests whether any pattern matches the path.
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(path))
    }

    /// Returns the compiled patterns.
    pub fn patterns(&self) -> &[PathPattern] {
        &self.patterns
    }

    /// Returns true when the set holds no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
