//! Conversion configuration
//!
//! The configuration is an XML document:
//!
//! ```xml
//! <tarball-conversion>
//!   <locations>
//!     <site module="gtk-doc" location="https://download.gnome.org/sources/" subdir="$module"/>
//!     <site cvs="gnome.org" location="https://download.gnome.org/sources/" subdir="$module"/>
//!   </locations>
//!   <mirrors>
//!     <mirror location="https://download.gnome.org/" alternate="sftp://master.gnome.org/ftp/pub/GNOME/"/>
//!   </mirrors>
//!   <rename>
//!     <name old="gtk3" new="gtk+"/>
//!   </rename>
//!   <whitelist>
//!     <package name="glib" set="core" limit="2.59"/>
//!   </whitelist>
//! </tarball-conversion>
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use tracing::{debug, warn};

use crate::locator::error::LocateError;
use crate::locator::mirror::Mirrors;

// =============================================================================
// Constants
// =============================================================================

pub const USER_AGENT: &str = concat!("convert-to-tarballs/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Archive extensions, most compressed first
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".tar.xz",
    "orig.tar.bz2",
    ".tar.bz2",
    "orig.tar.gz",
    ".tar.gz",
];

/// Debian already offers one archive per format, no `orig` special cases
pub const DEBIAN_HOST: &str = "ftp.debian.org";
pub const DEBIAN_EXTENSIONS: &[&str] = &[".tar.xz", ".tar.bz2", ".tar.gz"];

/// Site identifier matched against `<site cvs="...">` rules
pub const DEFAULT_SITE: &str = "gnome.org";

/// Element trees converted, in order, relative to the project directory
pub const ELEMENT_TREES: &[&str] = &["elements/core-deps", "elements/core", "elements/sdk"];

/// Release set of whitelisted packages without `set`; left out of the summary
pub const DEFAULT_RELEASE_SET: &str = "Other";

pub const VERSIONS_FILE: &str = "versions";

const SECTIONS: &[&str] = &["locations", "mirrors", "rename", "whitelist"];

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file could not be loaded from file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Unexpected conversion type: {0}")]
    UnexpectedSection(String),

    #[error("Bad {section} node: {node}")]
    BadNode { section: String, node: String },

    #[error("<{element}> is missing attribute '{attribute}'")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    #[error("Invalid site pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

// =============================================================================
// Model
// =============================================================================

/// What a location rule applies to
#[derive(Debug, Clone)]
pub enum RuleMatch {
    /// Exact module name
    Module(String),
    /// Pattern matched at the end of a site identifier
    Site(Regex),
}

#[derive(Debug, Clone)]
pub struct SiteRule {
    pub matcher: RuleMatch,
    pub location: String,
    /// May contain `$module`
    pub subdir: Option<String>,
}

impl SiteRule {
    fn base_location(&self, module: &str) -> String {
        let subdir = self
            .subdir
            .as_deref()
            .map(|s| s.replace("$module", module))
            .unwrap_or_default();
        posix_join(&self.location, &subdir)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSet {
    pub name: String,
    pub modules: Vec<String>,
}

/// How a module is known across the config and the download sites
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Element name (`.bst` file stem)
    pub name: String,
    /// Name after the rename table
    pub translated_name: String,
    /// Name tarballs are published under
    pub real_name: String,
    pub subdir: Option<String>,
    pub version_ceiling: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConversionConfig {
    module_rules: Vec<SiteRule>,
    site_rules: Vec<SiteRule>,
    pub mirrors: Mirrors,
    renames: HashMap<String, String>,
    release_sets: Vec<ReleaseSet>,
    subdirs: HashMap<String, String>,
    version_limits: HashMap<String, String>,
    real_names: HashMap<String, String>,
}

impl ConversionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading conversion config {:?}", path);
        let xml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&xml)
    }

    pub fn parse(xml: &str) -> Result<Self, ConfigError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut config = Self::default();
        let mut section = String::new();
        let mut depth = 0usize;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    config.handle_element(depth, &mut section, &e)?;
                    depth += 1;
                }
                Event::Empty(e) => config.handle_element(depth, &mut section, &e)?,
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(config)
    }

    /// `depth` 0 is the document element, 1 a section, 2 a section entry
    fn handle_element(
        &mut self,
        depth: usize,
        section: &mut String,
        e: &BytesStart<'_>,
    ) -> Result<(), ConfigError> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        match depth {
            1 if SECTIONS.contains(&name.as_str()) => *section = name,
            1 => return Err(ConfigError::UnexpectedSection(name)),
            2 => match (section.as_str(), name.as_str()) {
                ("locations", "site") => self.add_location(e)?,
                ("mirrors", "mirror") => {
                    let original = required(e, "mirror", "location")?;
                    let alternate = required(e, "mirror", "alternate")?;
                    self.mirrors.insert(&original, &alternate);
                }
                ("rename", "name") => {
                    let old = required(e, "name", "old")?;
                    let new = required(e, "name", "new")?;
                    self.renames.insert(old, new);
                }
                ("whitelist", "package") => self.add_package(e)?,
                _ => {
                    return Err(ConfigError::BadNode {
                        section: section.clone(),
                        node: name.clone(),
                    });
                }
            },
            _ => {}
        }
        Ok(())
    }

    fn add_location(&mut self, e: &BytesStart<'_>) -> Result<(), ConfigError> {
        let location = required(e, "site", "location")?;

        if let Some(cvs) = optional(e, "cvs")? {
            let subdir = required(e, "site", "subdir")?;
            let pattern = format!("{}$", cvs);
            let regex = Regex::new(&pattern)
                .map_err(|source| ConfigError::Pattern { pattern, source })?;
            self.site_rules.push(SiteRule {
                matcher: RuleMatch::Site(regex),
                location,
                subdir: Some(subdir),
            });
        } else if let Some(module) = optional(e, "module")? {
            self.module_rules.push(SiteRule {
                matcher: RuleMatch::Module(module),
                location,
                subdir: optional(e, "subdir")?.filter(|s| !s.is_empty()),
            });
        } else {
            warn!("Ignoring site {} without cvs or module attribute", location);
        }
        Ok(())
    }

    fn add_package(&mut self, e: &BytesStart<'_>) -> Result<(), ConfigError> {
        let name = required(e, "package", "name")?;

        if let Some(limit) = optional(e, "limit")?.filter(|s| !s.is_empty()) {
            self.version_limits.insert(name.clone(), limit);
        }
        if let Some(module) = optional(e, "module")?.filter(|s| !s.is_empty()) {
            self.real_names.insert(name.clone(), module);
        }
        self.subdirs
            .insert(name.clone(), optional(e, "subdir")?.unwrap_or_default());

        let set = optional(e, "set")?
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_RELEASE_SET.to_string());
        match self.release_sets.iter_mut().find(|s| s.name == set) {
            Some(release_set) => release_set.modules.push(name),
            None => self.release_sets.push(ReleaseSet {
                name: set,
                modules: vec![name],
            }),
        }
        Ok(())
    }

    pub fn translate_name<'a>(&'a self, module: &'a str) -> &'a str {
        self.renames.get(module).map_or(module, String::as_str)
    }

    pub fn real_name<'a>(&'a self, module: &'a str) -> &'a str {
        self.real_names.get(module).map_or(module, String::as_str)
    }

    pub fn version_limit(&self, module: &str) -> Option<&str> {
        self.version_limits.get(module).map(String::as_str)
    }

    /// `None` for modules outside the whitelist, `Some("")` for no subdir
    pub fn subdir(&self, module: &str) -> Option<&str> {
        self.subdirs.get(module).map(String::as_str)
    }

    pub fn release_sets(&self) -> &[ReleaseSet] {
        &self.release_sets
    }

    /// Every configured base location, for up-front scheme validation
    pub fn site_locations(&self) -> impl Iterator<Item = &str> {
        self.module_rules
            .iter()
            .chain(self.site_rules.iter())
            .map(|rule| rule.location.as_str())
    }

    pub fn describe(&self, name: &str) -> ModuleDescriptor {
        let translated = self.translate_name(name);
        ModuleDescriptor {
            name: name.to_string(),
            translated_name: translated.to_string(),
            real_name: self.real_name(translated).to_string(),
            subdir: self.subdir(translated).map(str::to_string),
            version_ceiling: self.version_limit(translated).map(str::to_string),
        }
    }

    /// Base location of `module`: module rules first, then site rules
    pub fn download_site(&self, site: &str, module: &str) -> Result<String, LocateError> {
        let by_module = self
            .module_rules
            .iter()
            .find(|rule| matches!(&rule.matcher, RuleMatch::Module(m) if m == module));
        let by_site = || {
            self.site_rules
                .iter()
                .find(|rule| matches!(&rule.matcher, RuleMatch::Site(re) if re.is_match(site)))
        };

        by_module
            .or_else(by_site)
            .map(|rule| rule.base_location(module))
            .ok_or_else(|| LocateError::NoDownloadSite(module.to_string()))
    }
}

fn optional(e: &BytesStart<'_>, attribute: &str) -> Result<Option<String>, ConfigError> {
    match e.try_get_attribute(attribute)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn required(
    e: &BytesStart<'_>,
    element: &str,
    attribute: &'static str,
) -> Result<String, ConfigError> {
    optional(e, attribute)?.ok_or_else(|| ConfigError::MissingAttribute {
        element: element.to_string(),
        attribute,
    })
}

/// Join like POSIX paths: an absolute `b` replaces `a`, an empty `b` adds `/`
pub fn posix_join(a: &str, b: &str) -> String {
    if b.starts_with('/') || a.is_empty() {
        b.to_string()
    } else if a.ends_with('/') {
        format!("{}{}", a, b)
    } else {
        format!("{}/{}", a, b)
    }
}
