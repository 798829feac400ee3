//! Minimal OpenSSH client configuration reader
//!
//! Only the keywords needed to open an SFTP session are understood:
//! `Host`, `HostName`, `User` and `Port`. As in `ssh(1)`, the first value
//! obtained for a keyword wins, and `Host` patterns support `*`, `?` and
//! `!` negation.

use std::path::Path;

use crate::locator::error::FetchError;

/// Settings that apply to one host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostConfig {
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct HostBlock {
    patterns: Vec<String>,
    config: HostConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshConfig {
    blocks: Vec<HostBlock>,
}

impl SshConfig {
    pub fn load(path: &Path) -> Result<Self, FetchError> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn parse(content: &str) -> Self {
        // Settings before the first Host line apply to every host
        let mut blocks = vec![HostBlock {
            patterns: vec!["*".to_string()],
            config: HostConfig::default(),
        }];

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let is_separator = |c: char| c.is_whitespace() || c == '=';
            let Some((keyword, value)) = line.split_once(is_separator) else {
                continue;
            };
            let value = value.trim_start_matches(is_separator).trim();

            let keyword = keyword.to_ascii_lowercase();
            if keyword == "host" {
                blocks.push(HostBlock {
                    patterns: value.split_whitespace().map(str::to_string).collect(),
                    config: HostConfig::default(),
                });
                continue;
            }

            let Some(current) = blocks.last_mut() else {
                continue;
            };

            match keyword.as_str() {
                "hostname" => {
                    current.config.hostname.get_or_insert_with(|| value.to_string());
                }
                "user" => {
                    current.config.user.get_or_insert_with(|| value.to_string());
                }
                "port" => {
                    if let Ok(port) = value.parse() {
                        current.config.port.get_or_insert(port);
                    }
                }
                _ => {}
            }
        }

        Self { blocks }
    }

    /// Merge every block matching `host`, first value wins.
    ///
    /// `%h` in `HostName` is replaced by `host`.
    pub fn lookup(&self, host: &str) -> HostConfig {
        let mut merged = HostConfig::default();
        for block in self.blocks.iter().filter(|b| host_matches(&b.patterns, host)) {
            if merged.hostname.is_none() {
                merged.hostname = block.config.hostname.clone();
            }
            if merged.user.is_none() {
                merged.user = block.config.user.clone();
            }
            if merged.port.is_none() {
                merged.port = block.config.port;
            }
        }
        merged.hostname = merged.hostname.map(|h| h.replace("%h", host));
        merged
    }
}

fn host_matches(patterns: &[String], host: &str) -> bool {
    let mut matched = false;
    for pattern in patterns {
        if let Some(negated) = pattern.strip_prefix('!') {
            if wildcard_match(negated, host) {
                return false;
            }
        } else if wildcard_match(pattern, host) {
            matched = true;
        }
    }
    matched
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi].eq_ignore_ascii_case(&t[ti])) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CONFIG: &str = "\
# release team
Host master.gnome.org
    User releaser
    Port 2222

Host *.gnome.org !git.gnome.org
    User fallback
    HostName %h.internal

Host *
    Port 22
";

    #[test]
    fn lookup_merges_blocks_with_first_value_winning() {
        let config = SshConfig::parse(CONFIG);
        assert_eq!(
            config.lookup("master.gnome.org"),
            HostConfig {
                hostname: Some("master.gnome.org.internal".to_string()),
                user: Some("releaser".to_string()),
                port: Some(2222),
            }
        );
    }

    #[test]
    fn lookup_honours_negated_patterns() {
        let config = SshConfig::parse(CONFIG);
        let git = config.lookup("git.gnome.org");
        assert_eq!(git.user, None);
        assert_eq!(git.port, Some(22));
    }

    #[test]
    fn lookup_returns_empty_config_for_unknown_host() {
        let config = SshConfig::parse("Host example.com\n  User me\n");
        assert_eq!(config.lookup("other.org"), HostConfig::default());
    }

    #[test]
    fn parse_accepts_equals_separator() {
        let config = SshConfig::parse("Host=build\nUser=ci\n");
        assert_eq!(config.lookup("build").user, Some("ci".to_string()));
    }

    #[rstest]
    #[case("*", "anything", true)]
    #[case("*.gnome.org", "master.gnome.org", true)]
    #[case("*.gnome.org", "gnome.org", false)]
    #[case("host?", "host1", true)]
    #[case("host?", "host12", false)]
    #[case("MASTER.gnome.org", "master.gnome.org", true)]
    fn wildcard_match_returns_expected(
        #[case] pattern: &str,
        #[case] text: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(wildcard_match(pattern, text), expected);
    }
}
