//! Path predicates for the no-compress and page-align rules.
//!
//! Predicates are plain values: a small enum covers the common shapes
//! (suffix lists and globs) and [`PathMatcher::Custom`] accepts any closure.

use std::fmt;
use std::sync::Arc;

/// Predicate over archive entry names.
///
/// # Examples
///
/// ```
/// use apkpack_core::PathMatcher;
///
/// let native = PathMatcher::suffixes([".so"]);
/// assert!(native.matches("lib/arm64-v8a/libfoo.so"));
/// assert!(!native.matches("classes.dex"));
///
/// let media = PathMatcher::globs(["res/raw/*.ogg", "*.png"]);
/// assert!(media.matches("res/raw/theme.ogg"));
/// assert!(media.matches("res/drawable/icon.png"));
///
/// let custom = PathMatcher::custom(|name| name.starts_with("assets/"));
/// assert!(custom.matches("assets/font.ttf"));
/// ```
#[derive(Clone, Default)]
pub enum PathMatcher {
    /// Matches nothing.
    #[default]
    Never,
    /// Matches every name.
    Always,
    /// Matches names ending with any of the suffixes.
    Suffixes(Vec<String>),
    /// Matches names against glob patterns.
    ///
    /// `*` matches any run of characters including `/`, `?` matches exactly
    /// one character. Everything else matches literally.
    Globs(Vec<String>),
    /// Arbitrary predicate.
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl PathMatcher {
    /// Builds a suffix matcher.
    #[must_use]
    pub fn suffixes<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Suffixes(suffixes.into_iter().map(Into::into).collect())
    }

    /// Builds a glob matcher.
    #[must_use]
    pub fn globs<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Globs(patterns.into_iter().map(Into::into).collect())
    }

    /// Wraps a closure.
    #[must_use]
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Native libraries (`.so`), the usual page-align rule.
    #[must_use]
    pub fn native_libraries() -> Self {
        Self::suffixes([".so"])
    }

    /// Tests a name against the predicate.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::Suffixes(suffixes) => suffixes.iter().any(|s| name.ends_with(s.as_str())),
            Self::Globs(patterns) => patterns.iter().any(|p| glob_matches(p, name)),
            Self::Custom(predicate) => predicate(name),
        }
    }
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("Never"),
            Self::Always => f.write_str("Always"),
            Self::Suffixes(s) => f.debug_tuple("Suffixes").field(s).finish(),
            Self::Globs(g) => f.debug_tuple("Globs").field(g).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Matches `name` against a glob with `*` and `?` wildcards.
///
/// Linear-time greedy matcher that backtracks only to the most recent `*`.
#[must_use]
pub fn glob_matches(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_n = 0;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_n = n;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_n += 1;
            n = star_n;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
