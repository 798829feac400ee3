//! Tarball locator: directory descent plus tarball selection
//!
//! ```text
//! base location ──mirror──▶ fetcher.list() ──▶ versioned subdirs?
//!                                 ▲                 │ yes: descend into newest
//!                                 └─────────────────┘
//!                                                   │ no
//!                                                   ▼
//!                                   select_tarball() ──unmirror──▶ ResolvedArtifact
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::locator::compare::{CeilingRule, latest_version};
use crate::locator::error::LocateError;
use crate::locator::fetcher::Fetcher;
use crate::locator::fetchers::{HttpFetcher, SftpFetcher};
use crate::locator::mirror::Mirrors;
use crate::locator::selection::select_tarball;

/// Pure dotted-numeric directory names, optionally with a trailing slash
static VERSION_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+\.)*[0-9]+/?$").unwrap());

/// Location and version of the tarball chosen for a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub location: String,
    pub version: String,
}

pub struct TarballLocator {
    fetchers: HashMap<String, Arc<dyn Fetcher>>,
    mirrors: Mirrors,
}

impl TarballLocator {
    /// Create a locator from a scheme → fetcher table.
    ///
    /// Mirrors on a known scheme whose host the fetcher cannot reach are
    /// dropped. Mirrors on an unknown scheme stay, so that using them fails.
    pub fn new(fetchers: HashMap<String, Arc<dyn Fetcher>>, mut mirrors: Mirrors) -> Self {
        mirrors.retain(|mirror| {
            let Some(fetcher) = mirror
                .alternate_scheme()
                .and_then(|scheme| fetchers.get(&scheme))
            else {
                return true;
            };
            let usable = mirror
                .alternate_host()
                .is_some_and(|host| fetcher.supports_host(&host));
            if !usable {
                warn!(
                    "Removing mirror {} due to non-working transport setup",
                    mirror.alternate
                );
            }
            usable
        });

        Self { fetchers, mirrors }
    }

    /// Locator with the HTTP(S) and SFTP transports of this machine
    pub fn with_default_fetchers(mirrors: Mirrors) -> Result<Self, LocateError> {
        let http: Arc<dyn Fetcher> =
            Arc::new(HttpFetcher::new().map_err(|source| LocateError::Fetch {
                location: "http client".to_string(),
                source,
            })?);
        let sftp: Arc<dyn Fetcher> = Arc::new(SftpFetcher::from_environment());

        let fetchers = HashMap::from([
            ("http".to_string(), Arc::clone(&http)),
            ("https".to_string(), http),
            ("sftp".to_string(), sftp),
        ]);
        Ok(Self::new(fetchers, mirrors))
    }

    pub fn mirrors(&self) -> &Mirrors {
        &self.mirrors
    }

    /// Whether a location's scheme has a fetcher
    pub fn supports_scheme(&self, scheme: &str) -> bool {
        self.fetchers.contains_key(scheme)
    }

    /// Find the newest tarball of `module` below `base_location`
    ///
    /// # Arguments
    /// * `base_location` - Canonical (non-mirror) directory URL
    /// * `module` - Name the tarballs are published under
    /// * `ceiling` - Optional version limit
    ///
    /// # Returns
    /// * `Ok(ResolvedArtifact)` - Canonical tarball URL and its version
    /// * `Err(LocateError)` - If no tarball was found or the location is invalid
    pub async fn find_tarball(
        &self,
        base_location: &str,
        module: &str,
        ceiling: Option<&str>,
    ) -> Result<ResolvedArtifact, LocateError> {
        info!("LOOKING for {} tarball at {}", module, base_location);

        let mirror = self.mirrors.lookup(base_location);
        let base_location = match mirror {
            Some(mirror) => mirror.apply(base_location),
            None => base_location.to_string(),
        };

        let url = Url::parse(&base_location).map_err(|source| LocateError::InvalidLocation {
            location: base_location.clone(),
            source,
        })?;
        let fetcher =
            self.fetchers
                .get(url.scheme())
                .ok_or_else(|| LocateError::UnsupportedScheme {
                    module: module.to_string(),
                    location: base_location.clone(),
                })?;

        let (location, files) = descend(fetcher.as_ref(), url, ceiling).await?;

        let selected = select_tarball(&files, module, ceiling, location.as_str()).ok_or_else(
            || LocateError::NoVersionsFound {
                module: module.to_string(),
                location: location.to_string(),
            },
        )?;

        let found = join_file(&location, &selected.file);
        let found = match mirror {
            Some(mirror) => mirror.restore(&found),
            None => found,
        };
        debug!("Resolved {} {} at {}", module, selected.version, found);

        Ok(ResolvedArtifact {
            location: found,
            version: selected.version,
        })
    }

    /// Release every transport's cached connections
    pub fn close(&self) {
        for fetcher in self.fetchers.values() {
            fetcher.close();
        }
    }
}

/// Walk into the newest versioned subdirectory until there is none left.
///
/// Returns the requested-form location of the last directory and its
/// entries. The next listing is fetched relative to where the previous one
/// was served from, so redirects are only followed once.
async fn descend(
    fetcher: &dyn Fetcher,
    start: Url,
    ceiling: Option<&str>,
) -> Result<(Url, Vec<String>), LocateError> {
    let mut location = start.clone();
    let mut fetch_at = start;
    let mut visited = HashSet::new();

    loop {
        let listing = fetcher
            .list(&fetch_at)
            .await
            .map_err(|source| LocateError::Fetch {
                location: fetch_at.to_string(),
                source,
            })?;
        visited.insert(fetch_at.to_string());
        visited.insert(listing.location.to_string());

        let dirs = listing
            .entries
            .iter()
            .map(String::as_str)
            .filter(|entry| VERSION_DIR_RE.is_match(entry));
        let Some(newest) = latest_version(dirs, ceiling, CeilingRule::AtOrBeyond) else {
            return Ok((location, listing.entries));
        };

        let next = join_dir(&listing.location, &newest);
        if visited.contains(next.as_str()) {
            warn!("Directory {} already visited, stopping descent", next);
            return Ok((location, listing.entries));
        }

        debug!("Descending into {}", newest);
        location = join_dir(&location, &newest);
        fetch_at = next;
    }
}

fn join_dir(base: &Url, dir: &str) -> Url {
    let mut joined = base.clone();
    let path = format!("{}/{}/", base.path().trim_end_matches('/'), dir);
    joined.set_path(&path);
    joined
}

fn join_file(base: &Url, file: &str) -> String {
    let mut joined = base.clone();
    let path = format!("{}/{}", base.path().trim_end_matches('/'), file);
    joined.set_path(&path);
    joined.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::error::FetchError;
    use crate::locator::fetcher::{DirectoryListing, MockFetcher};
    use mockall::predicate::*;
    use rstest::rstest;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn entries(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn expect_listing(fetcher: &mut MockFetcher, at: &str, names: &'static [&'static str]) {
        let at = url(at);
        fetcher
            .expect_list()
            .with(eq(at.clone()))
            .times(1)
            .returning(move |_| Ok(DirectoryListing::new(at.clone(), entries(names))));
    }

    fn locator(fetcher: MockFetcher, mirrors: Mirrors) -> TarballLocator {
        let fetcher: Arc<dyn Fetcher> = Arc::new(fetcher);
        TarballLocator::new(HashMap::from([("https".to_string(), fetcher)]), mirrors)
    }

    #[tokio::test]
    async fn find_tarball_descends_into_newest_directory() {
        let mut fetcher = MockFetcher::new();
        expect_listing(
            &mut fetcher,
            "https://example.org/sources/zlib/",
            &["../", "1.2/", "1.3/", "zlib.doap"],
        );
        expect_listing(
            &mut fetcher,
            "https://example.org/sources/zlib/1.3/",
            &["zlib-1.3.1.tar.xz", "zlib-1.3.1.sha256sum"],
        );

        let result = locator(fetcher, Mirrors::new())
            .find_tarball("https://example.org/sources/zlib/", "zlib", None)
            .await
            .unwrap();

        assert_eq!(
            result,
            ResolvedArtifact {
                location: "https://example.org/sources/zlib/1.3/zlib-1.3.1.tar.xz".to_string(),
                version: "1.3.1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn find_tarball_skips_directories_at_ceiling() {
        let mut fetcher = MockFetcher::new();
        expect_listing(
            &mut fetcher,
            "https://example.org/glib/",
            &["3.12/", "3.14/", "3.14.2/", "3.16/"],
        );
        expect_listing(
            &mut fetcher,
            "https://example.org/glib/3.12/",
            &["glib-3.12.0.tar.xz", "glib-3.12.4.tar.xz"],
        );

        let result = locator(fetcher, Mirrors::new())
            .find_tarball("https://example.org/glib/", "glib", Some("3.14"))
            .await
            .unwrap();

        assert_eq!(result.version, "3.12.4");
    }

    #[tokio::test]
    async fn find_tarball_selects_file_equal_to_ceiling_in_flat_listing() {
        let mut fetcher = MockFetcher::new();
        expect_listing(
            &mut fetcher,
            "https://example.org/foo/",
            &["foo-3.12.tar.gz", "foo-3.14.tar.gz", "foo-3.16.tar.gz"],
        );

        let result = locator(fetcher, Mirrors::new())
            .find_tarball("https://example.org/foo/", "foo", Some("3.14"))
            .await
            .unwrap();

        assert_eq!(result.location, "https://example.org/foo/foo-3.14.tar.gz");
    }

    #[tokio::test]
    async fn find_tarball_stops_when_every_directory_is_excluded() {
        let mut fetcher = MockFetcher::new();
        expect_listing(
            &mut fetcher,
            "https://example.org/foo/",
            &["4.0/", "foo-3.0.tar.xz"],
        );

        let result = locator(fetcher, Mirrors::new())
            .find_tarball("https://example.org/foo/", "foo", Some("4"))
            .await
            .unwrap();

        assert_eq!(result.version, "3.0");
    }

    #[tokio::test]
    async fn find_tarball_continues_from_redirected_location() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_list()
            .with(eq(url("https://example.org/foo")))
            .times(1)
            .returning(|_| {
                Ok(DirectoryListing::new(
                    url("https://cdn.example.org/foo/"),
                    entries(&["1.0/"]),
                ))
            });
        expect_listing(
            &mut fetcher,
            "https://cdn.example.org/foo/1.0/",
            &["foo-1.0.1.tar.xz"],
        );

        let result = locator(fetcher, Mirrors::new())
            .find_tarball("https://example.org/foo", "foo", None)
            .await
            .unwrap();

        assert_eq!(result.location, "https://example.org/foo/1.0/foo-1.0.1.tar.xz");
    }

    #[tokio::test]
    async fn find_tarball_does_not_revisit_directories() {
        let mut fetcher = MockFetcher::new();
        // a redirect loop: 1.0/ is served from the parent again
        fetcher
            .expect_list()
            .times(2)
            .returning(|_| {
                Ok(DirectoryListing::new(
                    url("https://example.org/foo/"),
                    entries(&["1.0/", "foo-1.0.tar.xz"]),
                ))
            });

        let result = locator(fetcher, Mirrors::new())
            .find_tarball("https://example.org/foo/", "foo", None)
            .await
            .unwrap();

        assert_eq!(result.version, "1.0");
    }

    #[tokio::test]
    async fn find_tarball_reverses_mirror_substitution() {
        let mut mirrors = Mirrors::new();
        mirrors.insert("https://download.gnome.org/", "https://mirror.example.net/gnome/");

        let mut fetcher = MockFetcher::new();
        fetcher.expect_supports_host().return_const(true);
        expect_listing(
            &mut fetcher,
            "https://mirror.example.net/gnome/sources/atk/",
            &["atk-2.30.0.tar.xz"],
        );

        let locator = locator(fetcher, mirrors);
        assert_eq!(locator.mirrors().len(), 1);

        let result = locator
            .find_tarball("https://download.gnome.org/sources/atk/", "atk", None)
            .await
            .unwrap();

        assert_eq!(
            result.location,
            "https://download.gnome.org/sources/atk/atk-2.30.0.tar.xz"
        );
    }

    #[test]
    fn new_drops_mirrors_without_usable_transport() {
        let mut mirrors = Mirrors::new();
        mirrors.insert("https://download.gnome.org/", "sftp://master.gnome.org/ftp/");
        mirrors.insert("https://www.x.org/", "https://mirror.example.net/xorg/");

        let mut fetcher = MockFetcher::new();
        fetcher.expect_supports_host().return_const(false);
        let fetcher: Arc<dyn Fetcher> = Arc::new(fetcher);

        let locator = TarballLocator::new(
            HashMap::from([
                ("https".to_string(), Arc::clone(&fetcher)),
                ("sftp".to_string(), fetcher),
            ]),
            mirrors,
        );
        assert!(locator.mirrors().is_empty());
    }

    #[rstest]
    #[case("https://Mirror.Example.net/gnome/")]
    #[case("https://mirror.example.net:443/gnome/")]
    #[tokio::test]
    async fn find_tarball_reverses_mirror_spelled_differently(#[case] alternate: &str) {
        let mut mirrors = Mirrors::new();
        mirrors.insert("https://download.gnome.org/", alternate);

        let mut fetcher = MockFetcher::new();
        fetcher.expect_supports_host().return_const(true);
        expect_listing(
            &mut fetcher,
            "https://mirror.example.net/gnome/sources/atk/",
            &["atk-2.30.0.tar.xz"],
        );

        let result = locator(fetcher, mirrors)
            .find_tarball("https://download.gnome.org/sources/atk/", "atk", None)
            .await
            .unwrap();

        assert_eq!(
            result.location,
            "https://download.gnome.org/sources/atk/atk-2.30.0.tar.xz"
        );
    }

    #[tokio::test]
    async fn new_keeps_mirror_with_unknown_scheme_so_lookup_fails() {
        let mut mirrors = Mirrors::new();
        mirrors.insert("https://download.gnome.org/", "gopher://mirror.example.net/gnome/");

        let locator = locator(MockFetcher::new(), mirrors);
        assert_eq!(locator.mirrors().len(), 1);

        let result = locator
            .find_tarball("https://download.gnome.org/sources/atk/", "atk", None)
            .await;
        assert!(matches!(result, Err(LocateError::UnsupportedScheme { .. })));
    }

    #[tokio::test]
    async fn find_tarball_returns_no_versions_found() {
        let mut fetcher = MockFetcher::new();
        expect_listing(&mut fetcher, "https://example.org/foo/", &["README"]);

        let result = locator(fetcher, Mirrors::new())
            .find_tarball("https://example.org/foo/", "foo", None)
            .await;

        assert!(matches!(result, Err(LocateError::NoVersionsFound { .. })));
    }

    #[tokio::test]
    async fn find_tarball_rejects_unknown_scheme() {
        let result = locator(MockFetcher::new(), Mirrors::new())
            .find_tarball("gopher://example.org/foo/", "foo", None)
            .await;

        assert!(matches!(result, Err(LocateError::UnsupportedScheme { .. })));
    }

    #[tokio::test]
    async fn find_tarball_wraps_fetch_errors() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_list()
            .returning(|_| Err(FetchError::Unavailable("offline".to_string())));

        let result = locator(fetcher, Mirrors::new())
            .find_tarball("https://example.org/foo/", "foo", None)
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, LocateError::Fetch { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn join_dir_adds_trailing_slash() {
        assert_eq!(
            join_dir(&url("sftp://host/ftp/glib"), "2.58").as_str(),
            "sftp://host/ftp/glib/2.58/"
        );
        assert_eq!(
            join_dir(&url("https://host/glib/"), "2.58").as_str(),
            "https://host/glib/2.58/"
        );
    }
}
