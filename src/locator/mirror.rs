//! Mirror substitution for download locations

use indexmap::IndexMap;
use tracing::warn;
use url::Url;

/// Original prefix and its replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub original: String,
    pub alternate: String,
}

impl MirrorEntry {
    /// Replace the original prefix by the mirror's
    pub fn apply(&self, location: &str) -> String {
        swap_prefix(location, &self.original, &self.alternate)
    }

    /// Undo [`MirrorEntry::apply`]
    pub fn restore(&self, location: &str) -> String {
        swap_prefix(location, &self.alternate, &self.original)
    }

    pub fn alternate_scheme(&self) -> Option<String> {
        Url::parse(&self.alternate).ok().map(|u| u.scheme().to_string())
    }

    pub fn alternate_host(&self) -> Option<String> {
        Url::parse(&self.alternate)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

/// Serialized form of a parsed URL; lowercases hosts and drops default ports
pub fn normalize(location: &str) -> String {
    Url::parse(location).map_or_else(|_| location.to_string(), String::from)
}

/// Both sides are compared in normalized form
fn swap_prefix(location: &str, from: &str, to: &str) -> String {
    let location = normalize(location);
    match location.strip_prefix(from) {
        Some(rest) => format!("{}{}", to, rest),
        None => location,
    }
}

/// (scheme, hostname) of the original location
pub type MirrorKey = (String, String);

/// At most one mirror per (scheme, hostname), in configuration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mirrors {
    entries: IndexMap<MirrorKey, MirrorEntry>,
}

impl Mirrors {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_of(location: &str) -> Option<MirrorKey> {
        let url = Url::parse(location).ok()?;
        Some((url.scheme().to_string(), url.host_str()?.to_string()))
    }

    /// Add a mirror unless one is already configured for the same key.
    ///
    /// Returns false when the mirror was dropped.
    pub fn insert(&mut self, original: &str, alternate: &str) -> bool {
        let Some(key) = Self::key_of(original) else {
            warn!("Ignoring mirror for unparsable location {}", original);
            return false;
        };
        if self.entries.contains_key(&key) {
            warn!(
                "Ignoring duplicate mirror {} for {}://{}",
                alternate, key.0, key.1
            );
            return false;
        }
        self.entries.insert(
            key,
            MirrorEntry {
                original: normalize(original),
                alternate: normalize(alternate),
            },
        );
        true
    }

    /// Mirror configured for the scheme and host of `location`
    pub fn lookup(&self, location: &str) -> Option<&MirrorEntry> {
        self.entries.get(&Self::key_of(location)?)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&MirrorEntry) -> bool) {
        self.entries.retain(|_, entry| keep(entry));
    }

    pub fn iter(&self) -> impl Iterator<Item = &MirrorEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn mirrors() -> Mirrors {
        let mut mirrors = Mirrors::new();
        mirrors.insert(
            "https://download.gnome.org/",
            "sftp://master.gnome.org/ftp/pub/GNOME/",
        );
        mirrors.insert("https://www.x.org/releases/", "http://xorg.freedesktop.org/releases/");
        mirrors
    }

    #[test]
    fn insert_keeps_first_mirror_per_scheme_and_host() {
        let mut mirrors = mirrors();
        assert!(!mirrors.insert("https://download.gnome.org/sources/", "https://other.example/"));
        assert_eq!(mirrors.len(), 2);
        assert_eq!(
            mirrors
                .lookup("https://download.gnome.org/sources/glib/")
                .map(|m| m.alternate.as_str()),
            Some("sftp://master.gnome.org/ftp/pub/GNOME/")
        );
    }

    #[test]
    fn lookup_distinguishes_schemes() {
        assert!(mirrors().lookup("http://download.gnome.org/sources/").is_none());
    }

    #[rstest]
    #[case("https://download.gnome.org/sources/glib/2.58/glib-2.58.3.tar.xz")]
    #[case("https://www.x.org/releases/individual/lib/libX11-1.6.7.tar.bz2")]
    fn apply_then_restore_yields_original_location(#[case] location: &str) {
        let mirrors = mirrors();
        let mirror = mirrors.lookup(location).unwrap();
        let mirrored = mirror.apply(location);
        assert!(mirrored.starts_with(&mirror.alternate));
        assert_eq!(mirror.restore(&mirrored), location);
    }

    #[rstest]
    #[case("https://Mirror.Example.net/gnome/")]
    #[case("https://mirror.example.net:443/gnome/")]
    #[case("HTTPS://mirror.example.net/gnome/")]
    fn restore_matches_alternate_in_normalized_form(#[case] alternate: &str) {
        let mut mirrors = Mirrors::new();
        mirrors.insert("https://download.gnome.org/", alternate);
        let mirror = mirrors.lookup("https://download.gnome.org/").unwrap();

        assert_eq!(
            mirror.apply("https://download.gnome.org/sources/atk"),
            "https://mirror.example.net/gnome/sources/atk"
        );
        assert_eq!(
            mirror.restore("https://mirror.example.net/gnome/sources/atk/atk-2.30.0.tar.xz"),
            "https://download.gnome.org/sources/atk/atk-2.30.0.tar.xz"
        );
    }

    #[test]
    fn restore_leaves_unrelated_locations_alone() {
        let mirrors = mirrors();
        let mirror = mirrors.lookup("https://download.gnome.org/").unwrap();
        assert_eq!(
            mirror.restore("https://elsewhere.example/master.gnome.org/ftp/pub/GNOME/x"),
            "https://elsewhere.example/master.gnome.org/ftp/pub/GNOME/x"
        );
    }

    #[test]
    fn alternate_scheme_and_host_come_from_replacement() {
        let mirrors = mirrors();
        let mirror = mirrors.lookup("https://download.gnome.org/").unwrap();
        assert_eq!(mirror.alternate_scheme().as_deref(), Some("sftp"));
        assert_eq!(mirror.alternate_host().as_deref(), Some("master.gnome.org"));
    }
}
