//! GitHub lookups
//!
//! Latest `cloudflared` release for tunnel-versions and the published
//! GitHub IP ranges for sync-list. A token is optional and only raises the
//! rate limit.

use anyhow::{Context, Result};
use octocrab::Octocrab;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

/// Address groups of `GET /meta`, in the order they are merged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubMeta {
    #[serde(default)]
    pub git: Vec<String>,
    #[serde(default)]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub pages: Vec<String>,
    #[serde(default)]
    pub importer: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub dependabot: Vec<String>,
    #[serde(default)]
    pub actions_macos: Vec<String>,
    #[serde(default)]
    pub api: Vec<String>,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub web: Vec<String>,
}

impl GitHubMeta {
    /// Ranges of every group not named in `exclude`, first occurrence wins.
    ///
    /// Group names follow the CLI spelling (`actions-macos`).
    pub fn ranges(&self, exclude: &HashSet<String>) -> Vec<String> {
        let groups: [(&str, &Vec<String>); 10] = [
            ("git", &self.git),
            ("hooks", &self.hooks),
            ("pages", &self.pages),
            ("importer", &self.importer),
            ("actions", &self.actions),
            ("dependabot", &self.dependabot),
            ("actions-macos", &self.actions_macos),
            ("api", &self.api),
            ("packages", &self.packages),
            ("web", &self.web),
        ];

        let mut seen = HashSet::new();
        groups
            .into_iter()
            .filter(|(name, _)| !exclude.contains(*name))
            .flat_map(|(_, ranges)| ranges.iter())
            .filter(|range| seen.insert(*range))
            .cloned()
            .collect()
    }
}

pub struct GitHubClient {
    client: Octocrab,
}

impl GitHubClient {
    pub fn new(token: Option<&str>) -> Result<Self> {
        let mut builder = Octocrab::builder();
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            builder = builder.personal_token(token.to_string());
        }
        let client = builder.build().context("Failed to create GitHub client")?;
        Ok(Self { client })
    }

    /// Tag of the latest release of `owner/repo`.
    pub async fn latest_release(&self, owner: &str, repo: &str) -> Result<String> {
        let release = self
            .client
            .repos(owner, repo)
            .releases()
            .get_latest()
            .await
            .with_context(|| format!("Failed to fetch latest release of {}/{}", owner, repo))?;
        debug!(owner, repo, tag = %release.tag_name, "Latest release");
        Ok(release.tag_name)
    }

    pub async fn meta(&self) -> Result<GitHubMeta> {
        self.client
            .get("/meta", None::<&()>)
            .await
            .context("Failed to fetch GitHub meta")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> GitHubMeta {
        serde_json::from_value(serde_json::json!({
            "verifiable_password_authentication": false,
            "hooks": ["192.30.252.0/22", "185.199.108.0/22"],
            "web": ["192.30.252.0/22", "140.82.112.0/20"],
            "api": ["140.82.112.0/20", "2a0a:a440::/29"],
            "actions_macos": ["13.105.49.0/24"],
            "domains": {"website": ["*.github.com"]}
        }))
        .unwrap()
    }

    #[test]
    fn test_ranges_are_deduplicated_in_order() {
        let ranges = meta().ranges(&HashSet::new());
        assert_eq!(
            ranges,
            vec![
                "192.30.252.0/22",
                "185.199.108.0/22",
                "13.105.49.0/24",
                "140.82.112.0/20",
                "2a0a:a440::/29",
            ]
        );
    }

    #[test]
    fn test_excluded_groups_are_skipped() {
        let exclude: HashSet<String> = ["hooks", "actions-macos"].iter().map(|s| s.to_string()).collect();
        let ranges = meta().ranges(&exclude);
        assert_eq!(ranges, vec!["140.82.112.0/20", "2a0a:a440::/29", "192.30.252.0/22"]);
    }
}
