//! Dotted numeric version comparison
//!
//! Release directories and tarballs are versioned as plain dotted numbers
//! (`2.58`, `3.14.2`). Two orderings are needed and they intentionally
//! disagree when one version is a prefix of the other:
//!
//! - [`pick_larger`]: `2.14` < `2.14.0`
//! - [`is_at_or_beyond_ceiling`]: `2.14.0` is *at* the ceiling `2.14`
//!
//! The second lets a ceiling of `3.14` exclude the whole `3.14.x` directory
//! subtree while descending.

use std::cmp::Ordering;

/// Which ceiling test excludes a candidate in [`latest_version`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeilingRule {
    /// Exclude candidates at or beyond the ceiling (used for directories)
    AtOrBeyond,
    /// Exclude candidates strictly greater than the ceiling (used for files)
    Exceeds,
}

/// Split a version into numeric fields.
///
/// Fields are separated by `.` (and `-`, which shows up in archive versions
/// like `1.0-2`). A non-numeric field counts as 0.
fn fields(version: &str) -> Vec<u64> {
    version
        .trim_end_matches('/')
        .split(['.', '-'])
        .map(|f| f.parse().unwrap_or(0))
        .collect()
}

/// Total order used by [`pick_larger`]: common fields first, then length.
pub fn compare(a: &str, b: &str) -> Ordering {
    let a = fields(a);
    let b = fields(b);
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// Return the larger of two versions.
///
/// With an equal common prefix the longer version wins, so `2.14.0` beats
/// `2.14`. Numerically equal spellings (`1.01`, `1.1`) fall back to the
/// longer, then the lexically larger string, so argument order never matters.
pub fn pick_larger<'a>(a: &'a str, b: &'a str) -> &'a str {
    let order = compare(a, b)
        .then_with(|| a.len().cmp(&b.len()))
        .then_with(|| a.cmp(b));
    if order == Ordering::Less { b } else { a }
}

/// Whether `version` is at or beyond `ceiling`, comparing only common fields.
pub fn is_at_or_beyond_ceiling(version: &str, ceiling: &str) -> bool {
    let v = fields(version);
    let c = fields(ceiling);
    v.iter()
        .zip(c.iter())
        .map(|(x, y)| x.cmp(y))
        .find(|o| o.is_ne())
        .is_none_or(|o| o == Ordering::Greater)
}

/// Whether `version` is strictly greater than `ceiling` under [`compare`].
pub fn exceeds_ceiling(version: &str, ceiling: &str) -> bool {
    compare(version, ceiling) == Ordering::Greater
}

/// Pick the largest candidate not excluded by `ceiling` under `rule`.
///
/// Trailing slashes (directory listings) are stripped from the result.
pub fn latest_version<'a, I>(candidates: I, ceiling: Option<&str>, rule: CeilingRule) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let excluded = |v: &str| match (ceiling, rule) {
        (None, _) => false,
        (Some(c), CeilingRule::AtOrBeyond) => is_at_or_beyond_ceiling(v, c),
        (Some(c), CeilingRule::Exceeds) => exceeds_ceiling(v, c),
    };

    candidates
        .into_iter()
        .map(|v| v.trim_end_matches('/'))
        .filter(|v| !excluded(v))
        .fold(None, |biggest: Option<&str>, v| match biggest {
            Some(b) => Some(pick_larger(b, v)),
            None => Some(v),
        })
        .map(str::to_string)
}
