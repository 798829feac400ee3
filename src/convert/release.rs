//! Release version handling and branch bookkeeping
//!
//! Stable releases (even minor) and late betas (micro >= 90) get their own
//! Flatpak branch. For those, the project's CI variables and `project.conf`
//! are pointed at the branch, and refs kept in `junction.refs` are moved
//! into the element files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_yaml::Value;
use tracing::{debug, info};

use crate::convert::error::ConvertError;
use crate::convert::yaml_edit::YamlDocument;

const CI_FILE: &str = ".gitlab-ci.yml";
const PROJECT_CONF: &str = "project.conf";
const JUNCTION_REFS: &str = "junction.refs";

/// First micro version of a development release that counts as a beta
const BETA_MICRO: u32 = 90;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Version number is not valid: {0}")]
pub struct InvalidReleaseVersion(String);

/// `major.minor.micro` release being prepared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl FromStr for ReleaseVersion {
    type Err = InvalidReleaseVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        let [major, minor, micro] = parts.as_slice() else {
            return Err(InvalidReleaseVersion(s.to_string()));
        };
        let parse = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| InvalidReleaseVersion(s.to_string()))
        };
        Ok(Self {
            major: parse(*major)?,
            minor: parse(*minor)?,
            micro: parse(*micro)?,
        })
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

impl ReleaseVersion {
    pub fn is_stable(&self) -> bool {
        self.minor % 2 == 0
    }

    /// Conversion config used when none is given on the command line
    pub fn default_config_name(&self) -> String {
        if self.is_stable() {
            format!("tarball-conversion-{}-{}.config", self.major, self.minor)
        } else {
            "tarball-conversion.config".to_string()
        }
    }

    /// Flatpak branch for this release, if it gets one
    pub fn flatpak_branch(&self) -> Option<String> {
        if self.is_stable() {
            Some(format!("{}.{}", self.major, self.minor))
        } else if self.micro >= BETA_MICRO {
            Some(format!("{}.{}beta", self.major, self.minor + 1))
        } else {
            None
        }
    }
}

fn load_yaml(path: &Path) -> Result<(Value, YamlDocument), ConvertError> {
    let content = std::fs::read_to_string(path).map_err(ConvertError::io(path))?;
    let value = serde_yaml::from_str(&content).map_err(ConvertError::yaml(path))?;
    Ok((value, YamlDocument::new(content)))
}

fn save_yaml(path: &Path, doc: &YamlDocument) -> Result<(), ConvertError> {
    std::fs::write(path, doc.as_str()).map_err(ConvertError::io(path))
}

/// Point the CI configuration and `project.conf` at `branch` and move
/// junction refs into their elements.
pub fn update_release_branch(project_dir: &Path, branch: &str) -> Result<(), ConvertError> {
    info!("Updating release branch to {}", branch);

    let ci_path = project_dir.join(CI_FILE);
    let (ci, mut ci_doc) = load_yaml(&ci_path)?;
    let variables = ci
        .get("variables")
        .and_then(Value::as_mapping)
        .ok_or_else(|| ConvertError::UnexpectedLayout(ci_path.clone(), "CI"))?;
    let has_strict = variables.contains_key("BST_STRICT");
    ci_doc
        .set(&["variables"], "FLATPAK_BRANCH", branch)
        .map_err(ConvertError::edit(&ci_path))?;
    if has_strict {
        ci_doc
            .set(&["variables"], "BST_STRICT", "--strict")
            .map_err(ConvertError::edit(&ci_path))?;
    }
    save_yaml(&ci_path, &ci_doc)?;

    let conf_path = project_dir.join(PROJECT_CONF);
    let (conf, mut conf_doc) = load_yaml(&conf_path)?;
    if conf.get("variables").and_then(Value::as_mapping).is_none() {
        return Err(ConvertError::UnexpectedLayout(conf_path, "project"));
    }
    conf_doc
        .set(&["variables"], "branch", branch)
        .map_err(ConvertError::edit(&conf_path))?;
    conf_doc
        .set(&[], "ref-storage", "inline")
        .map_err(ConvertError::edit(&conf_path))?;
    save_yaml(&conf_path, &conf_doc)?;

    let element_path = conf
        .get("element-path")
        .and_then(Value::as_str)
        .unwrap_or("elements");
    move_junction_refs(project_dir, &project_dir.join(element_path))
}

/// Junction refs are strings; anything else is written in its YAML form
fn ref_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => serde_yaml::to_string(other)
            .ok()
            .map(|s| s.trim_end().to_string()),
    }
}

/// Copy refs from `junction.refs` into the sources of each element and
/// delete the refs file. Missing refs file is not an error.
pub fn move_junction_refs(project_dir: &Path, element_dir: &Path) -> Result<(), ConvertError> {
    let refs_path = project_dir.join(JUNCTION_REFS);
    if !refs_path.exists() {
        debug!("No {} to move", JUNCTION_REFS);
        return Ok(());
    }

    let (refs, _) = load_yaml(&refs_path)?;
    let elements = refs
        .get("projects")
        .and_then(|p| p.get("gnome"))
        .and_then(Value::as_mapping)
        .ok_or_else(|| ConvertError::UnexpectedLayout(refs_path.clone(), "junction refs"))?;

    for (element, source_refs) in elements {
        let Some(element) = element.as_str() else {
            continue;
        };
        let element_file: PathBuf = element_dir.join(element);
        let (element_value, mut element_doc) = load_yaml(&element_file)?;
        let source_count = element_value
            .get("sources")
            .and_then(Value::as_sequence)
            .map_or(0, Vec::len);

        let source_refs = source_refs.as_sequence().map(Vec::as_slice).unwrap_or_default();
        for (index, source_ref) in source_refs.iter().enumerate().take(source_count) {
            let Some(r) = source_ref.get("ref").and_then(ref_text) else {
                continue;
            };
            element_doc
                .set_in_item("sources", index, "ref", &r)
                .map_err(ConvertError::edit(&element_file))?;
        }

        save_yaml(&element_file, &element_doc)?;
    }

    std::fs::remove_file(&refs_path).map_err(ConvertError::io(&refs_path))
}
