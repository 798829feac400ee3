//! Tarball selection over a final directory listing

use std::collections::HashSet;

use regex::Regex;

use crate::config::{DEBIAN_EXTENSIONS, DEBIAN_HOST, DEFAULT_EXTENSIONS};
use crate::locator::compare::{CeilingRule, latest_version};

/// A tarball chosen from a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedTarball {
    pub file: String,
    pub version: String,
}

/// Extension preference for archives found at `location`
pub fn extensions_for(location: &str) -> &'static [&'static str] {
    if location.contains(DEBIAN_HOST) {
        DEBIAN_EXTENSIONS
    } else {
        DEFAULT_EXTENSIONS
    }
}

/// One file per stem, preferring earlier extensions.
///
/// `foo-1.0.tar.xz` and `foo-1.0.tar.gz` share the stem `foo-1.0`, so only
/// the `.tar.xz` survives.
pub fn dedup_by_extension<'a>(files: &'a [String], extensions: &[&str]) -> Vec<&'a str> {
    let mut stems = HashSet::new();
    let mut tarballs = Vec::new();
    for ext in extensions {
        for file in files {
            if let Some(stem) = file.strip_suffix(ext) {
                if stems.insert(stem) {
                    tarballs.push(file.as_str());
                }
            }
        }
    }
    tarballs
}

/// `<module>[_-]<version>[.orig].tar*`, capturing the version
fn tarball_pattern(module: &str) -> Regex {
    Regex::new(&format!(
        r"^{}[_-](([0-9]+[.\-])*[0-9]+)(\.orig)?\.tar.*$",
        regex::escape(module)
    ))
    .unwrap()
}

/// Select the newest release tarball of `module` among `files`.
///
/// Files with suffixed names (`-beta`, `-installer`) or belonging to a module
/// whose name merely starts with `module` never match. A ceiling excludes
/// versions strictly greater than it.
pub fn select_tarball(
    files: &[String],
    module: &str,
    ceiling: Option<&str>,
    location: &str,
) -> Option<SelectedTarball> {
    let pattern = tarball_pattern(module);

    let candidates: Vec<(&str, &str)> = dedup_by_extension(files, extensions_for(location))
        .into_iter()
        .filter(|file| file.contains(module))
        .filter_map(|file| {
            pattern
                .captures(file)
                .and_then(|caps| caps.get(1))
                .map(|version| (file, version.as_str()))
        })
        .collect();

    let version = latest_version(
        candidates.iter().map(|(_, v)| *v),
        ceiling,
        CeilingRule::Exceeds,
    )?;

    candidates
        .iter()
        .find(|(_, v)| *v == version)
        .map(|(file, _)| SelectedTarball {
            file: file.to_string(),
            version,
        })
}
