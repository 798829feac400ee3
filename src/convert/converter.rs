//! Conversion of BuildStream elements to release tarballs
//!
//! Each element is handled on its own: resolve the tarball, then rewrite
//! the file. Lookup failures for elements that already used a tarball are
//! demoted to "ignored"; for any other element they end the run.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{ConversionConfig, DEFAULT_SITE, ELEMENT_TREES};
use crate::convert::element::{Element, is_archive_kind};
use crate::convert::error::ConvertError;
use crate::convert::summary::RunSummary;
use crate::locator::error::LocateError;
use crate::locator::tarball::{ResolvedArtifact, TarballLocator};

const ELEMENT_EXTENSION: &str = "bst";
const PROJECT_CONF: &str = "project.conf";

#[derive(Debug, Default, Deserialize)]
struct ProjectConf {
    #[serde(default)]
    aliases: IndexMap<String, String>,
}

/// Why an element was left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Stack,
    NoSources,
    LocalSource,
    /// VCS source while running without conversion
    NotConverting,
}

/// What happened to one element file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    Converted(ResolvedArtifact),
    Ignored,
}

pub struct Converter<'a> {
    config: &'a ConversionConfig,
    locator: &'a TarballLocator,
    /// `project.conf` URL aliases, alias name → URL prefix
    aliases: IndexMap<String, String>,
    convert: bool,
    summary: RunSummary,
}

impl<'a> Converter<'a> {
    /// Create a converter for the BuildStream project in `project_dir`
    ///
    /// With `convert` false, VCS elements are left alone and only elements
    /// already using tarballs are updated.
    pub fn new(
        config: &'a ConversionConfig,
        locator: &'a TarballLocator,
        project_dir: &Path,
        convert: bool,
    ) -> Result<Self, ConvertError> {
        let aliases = load_aliases(&project_dir.join(PROJECT_CONF))?;
        debug!("Loaded {} URL aliases", aliases.len());
        Ok(Self {
            config,
            locator,
            aliases,
            convert,
            summary: RunSummary::new(),
        })
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn into_summary(self) -> RunSummary {
        self.summary
    }

    /// Every configured site must have a transport before anything is resolved
    pub fn check_locations(&self) -> Result<(), LocateError> {
        for location in self.config.site_locations() {
            let mirrored = match self.locator.mirrors().lookup(location) {
                Some(mirror) => mirror.apply(location),
                None => location.to_string(),
            };
            let url = url::Url::parse(&mirrored).map_err(|source| {
                LocateError::InvalidLocation {
                    location: mirrored.clone(),
                    source,
                }
            })?;
            if !self.locator.supports_scheme(url.scheme()) {
                return Err(LocateError::UnsupportedScheme {
                    module: "site".to_string(),
                    location: mirrored,
                });
            }
        }
        Ok(())
    }

    /// Convert the element trees of the project, in dependency order
    pub async fn process_project(&mut self, project_dir: &Path) -> Result<(), ConvertError> {
        for tree in ELEMENT_TREES {
            self.process_directory(&project_dir.join(tree)).await?;
        }
        Ok(())
    }

    /// Convert every `.bst` file below `dir`, in path order
    pub async fn process_directory(&mut self, dir: &Path) -> Result<(), ConvertError> {
        if !dir.is_dir() {
            debug!("Skipping missing element directory {:?}", dir);
            return Ok(());
        }

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type().is_file()
                && path.extension().is_some_and(|ext| ext == ELEMENT_EXTENSION)
            {
                files.push(path.to_path_buf());
            }
        }

        for path in files {
            self.process_file(&path).await?;
        }
        Ok(())
    }

    pub async fn process_file(&mut self, path: &Path) -> Result<Outcome, ConvertError> {
        let mut element = Element::load(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(reason) = self.skip_reason(&element) {
            info!("IGNORE {:?} element {}", reason, name);
            return Ok(Outcome::Skipped(reason));
        }
        let source_kind = element.first_source_kind().unwrap_or_default().to_string();

        info!("REWRITE {}", name);
        match self.find_tarball(&name).await {
            Ok(artifact) => {
                let location = self.apply_alias(&artifact.location);
                element.convert_to_tarball(&location)?;
                element.save()?;
                Ok(Outcome::Converted(artifact))
            }
            Err(e) if e.is_recoverable() && is_archive_kind(&source_kind) => {
                warn!("IGNORE: Could not find site for {}: {}", name, e);
                self.summary.ignore(&name);
                Ok(Outcome::Ignored)
            }
            Err(e) if e.is_recoverable() => {
                error!("FATAL: Could not find site for {}: {}", name, e);
                Err(ConvertError::Unresolvable {
                    module: name,
                    source: e,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn skip_reason(&self, element: &Element) -> Option<SkipReason> {
        if element.kind() == Some("stack") {
            return Some(SkipReason::Stack);
        }
        if element.sources().is_empty() {
            return Some(SkipReason::NoSources);
        }
        match element.first_source_kind() {
            Some("local") => Some(SkipReason::LocalSource),
            Some(kind) if !self.convert && kind.starts_with("git") => {
                Some(SkipReason::NotConverting)
            }
            _ => None,
        }
    }

    async fn find_tarball(&mut self, name: &str) -> Result<ResolvedArtifact, LocateError> {
        let module = self.config.describe(name);
        let base_location = self.config.download_site(DEFAULT_SITE, &module.real_name)?;

        let artifact = self
            .locator
            .find_tarball(
                &base_location,
                &module.real_name,
                module.version_ceiling.as_deref(),
            )
            .await?;

        self.summary
            .record(&module.translated_name, &artifact.version);
        Ok(artifact)
    }

    /// `https://download.gnome.org/sources/x` → `gnome_downloads:x`
    fn apply_alias(&self, location: &str) -> String {
        self.aliases
            .iter()
            .find_map(|(alias, url)| {
                location
                    .strip_prefix(url.as_str())
                    .map(|rest| format!("{}:{}", alias, rest))
            })
            .unwrap_or_else(|| location.to_string())
    }
}

fn load_aliases(path: &Path) -> Result<IndexMap<String, String>, ConvertError> {
    if !path.exists() {
        debug!("No {:?}, using no aliases", path);
        return Ok(IndexMap::new());
    }
    let content = std::fs::read_to_string(path).map_err(ConvertError::io(path))?;
    let conf: ProjectConf = serde_yaml::from_str(&content).map_err(ConvertError::yaml(path))?;
    Ok(conf.aliases)
}
