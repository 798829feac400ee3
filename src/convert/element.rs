//! BuildStream element files
//!
//! Elements are queried through a parsed YAML value and rewritten by editing
//! their source text, so comments and quoting of untouched lines survive.

use std::path::{Path, PathBuf};

use serde_yaml::Value;

use crate::convert::error::ConvertError;
use crate::convert::yaml_edit::{EditError, YamlDocument};

const SOURCES: &str = "sources";

/// Source kinds that already point at a release archive
const ARCHIVE_KINDS: &[&str] = &["tar", "zip"];

/// Keys that mean nothing for a tarball source
const VCS_ONLY_KEYS: &[&str] = &["submodules", "track"];

/// Dependency-vendoring sources; tarballs are expected to vendor themselves
const VENDORING_KIND: &str = "cargo";

pub fn is_archive_kind(kind: &str) -> bool {
    ARCHIVE_KINDS.contains(&kind)
}

#[derive(Debug, Clone)]
pub struct Element {
    path: PathBuf,
    doc: Value,
    text: YamlDocument,
}

impl Element {
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let content = std::fs::read_to_string(path).map_err(ConvertError::io(path))?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self, ConvertError> {
        let doc: Value = serde_yaml::from_str(content).map_err(ConvertError::yaml(path))?;
        if !doc.is_mapping() {
            return Err(ConvertError::UnexpectedLayout(path.to_path_buf(), "element"));
        }
        Ok(Self {
            path: path.to_path_buf(),
            doc,
            text: YamlDocument::new(content),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Element kind (`autotools`, `meson`, `stack`, ...)
    pub fn kind(&self) -> Option<&str> {
        self.doc.get("kind").and_then(Value::as_str)
    }

    pub fn sources(&self) -> &[Value] {
        self.doc
            .get(SOURCES)
            .and_then(Value::as_sequence)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn first_source_kind(&self) -> Option<&str> {
        self.sources()
            .first()
            .and_then(|source| source.get("kind"))
            .and_then(Value::as_str)
    }

    /// Point the first source at `url` as a tarball.
    ///
    /// VCS-only keys are removed from it and vendoring sources are dropped.
    pub fn convert_to_tarball(&mut self, url: &str) -> Result<(), ConvertError> {
        if self.sources().is_empty() {
            return Ok(());
        }
        self.rewrite_sources(url)
            .map_err(ConvertError::edit(&self.path))?;
        self.doc = serde_yaml::from_str(self.text.as_str()).map_err(ConvertError::yaml(&self.path))?;
        Ok(())
    }

    fn rewrite_sources(&mut self, url: &str) -> Result<(), EditError> {
        self.text.set_in_item(SOURCES, 0, "kind", "tar")?;
        self.text.set_in_item(SOURCES, 0, "url", url)?;
        for key in VCS_ONLY_KEYS {
            self.text.remove_from_item(SOURCES, 0, key)?;
        }
        self.text.remove_items_where(SOURCES, "kind", VENDORING_KIND)?;
        Ok(())
    }

    pub fn to_yaml(&self) -> &str {
        self.text.as_str()
    }

    pub fn save(&self) -> Result<(), ConvertError> {
        std::fs::write(&self.path, self.to_yaml()).map_err(ConvertError::io(&self.path))
    }
}
