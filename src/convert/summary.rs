//! Run summary and the `versions` file
//!
//! Format, one block per release set:
//!
//! ```text
//! ## CORE
//! core:glib:2.58.3:
//! core:pango:1.42.4:
//!
//! # Gtk3
//! core:gtk+:3.24.5:gtk3
//!
//! ```

use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;

use crate::config::{ConversionConfig, DEFAULT_RELEASE_SET};
use crate::convert::error::ConvertError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Translated module name → resolved version, in resolution order
    versions: IndexMap<String, String>,
    ignored: Vec<String>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resolved module; the first resolution of a name wins
    pub fn record(&mut self, module: &str, version: &str) {
        self.versions
            .entry(module.to_string())
            .or_insert_with(|| version.to_string());
    }

    pub fn ignore(&mut self, module: &str) {
        self.ignored.push(module.to_string());
    }

    pub fn version(&self, module: &str) -> Option<&str> {
        self.versions.get(module).map(String::as_str)
    }

    pub fn resolved(&self) -> impl Iterator<Item = (&str, &str)> {
        self.versions.iter().map(|(m, v)| (m.as_str(), v.as_str()))
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    /// Render the `versions` file for every whitelisted release set.
    ///
    /// Fails if a whitelisted module was never resolved.
    pub fn render_versions(&self, config: &ConversionConfig) -> Result<String, ConvertError> {
        let mut out = String::new();
        let mut done = HashSet::new();

        for release_set in config.release_sets() {
            if release_set.name == DEFAULT_RELEASE_SET {
                continue;
            }
            let set = &release_set.name;
            out.push_str(&format!("## {}\n", set.to_uppercase()));

            let mut modules = release_set.modules.clone();
            modules.sort();

            let mut subdirs: BTreeMap<&str, Vec<String>> = BTreeMap::new();
            for module in &modules {
                let version = self
                    .version(module)
                    .ok_or_else(|| ConvertError::MissingFromProject(module.clone()))?;
                let real_name = config.real_name(module);

                match config.subdir(module).unwrap_or_default() {
                    "" => {
                        let line = format!("{}:{}:{}:\n", set, real_name, version);
                        if done.insert(line.clone()) {
                            out.push_str(&line);
                        }
                    }
                    subdir => subdirs.entry(subdir).or_default().push(format!(
                        "{}:{}:{}:{}\n",
                        set, real_name, version, subdir
                    )),
                }
            }

            for (subdir, mut lines) in subdirs {
                out.push_str(&format!("\n# {}\n", title_case(subdir)));
                lines.sort();
                for line in lines {
                    out.push_str(&line);
                }
            }
            out.push('\n');
        }

        Ok(out)
    }
}

/// Capitalize the first letter of every word, lowercase the rest
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
