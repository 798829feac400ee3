//! BuildStream project test utilities

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use convert_to_tarballs::config::ConversionConfig;

/// Conversion config pointing every module at download.gnome.org
pub fn gnome_config(whitelist: &str) -> ConversionConfig {
    let xml = format!(
        r#"<tarball-conversion>
  <locations>
    <site cvs="gnome.org" location="https://download.gnome.org/sources/" subdir="$module"/>
  </locations>
  <whitelist>
{}
  </whitelist>
</tarball-conversion>"#,
        whitelist
    );
    ConversionConfig::parse(&xml).unwrap()
}

/// Temporary BuildStream project
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let project = Self {
            dir: TempDir::new().unwrap(),
        };
        project.write(
            "project.conf",
            "name: gnome\nelement-path: elements\naliases:\n  gnome_downloads: https://download.gnome.org/sources/\n",
        );
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn element_path(&self, element: &str) -> PathBuf {
        self.dir.path().join("elements").join(element)
    }

    pub fn write(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn write_element(&self, element: &str, content: &str) {
        self.write(&format!("elements/{}", element), content);
    }

    pub fn read_element(&self, element: &str) -> serde_yaml::Value {
        let content = std::fs::read_to_string(self.element_path(element)).unwrap();
        serde_yaml::from_str(&content).unwrap()
    }
}
