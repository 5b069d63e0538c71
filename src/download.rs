use crate::config::AppSettings;
use crate::events::EventSink;
use crate::http::{api_client, download_client, download_to_file, endpoint, send_json};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub(crate) struct PaperProject {
    #[serde(default)]
    pub versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaperVersion {
    #[serde(default)]
    pub builds: Vec<u64>,
}

impl PaperProject {
    /// The API lists oldest first; callers display newest first.
    pub(crate) fn newest_first(self) -> Vec<String> {
        let mut versions = self.versions;
        versions.reverse();
        versions
    }
}

impl PaperVersion {
    pub(crate) fn latest_build(&self) -> Option<u64> {
        self.builds.last().copied()
    }
}

pub fn jar_file_name(version: &str, build: u64) -> String {
    format!("paper-{}-{}.jar", version, build)
}

/// A version ends up both in URL paths and in a file name, so it must be a single
/// plain path segment.
pub fn validate_version(version: &str) -> Result<&str> {
    let version = version.trim();
    if version.is_empty()
        || version == "."
        || version == ".."
        || version.contains(['/', '\\'])
    {
        anyhow::bail!("Invalid Paper version '{}'", version);
    }
    Ok(version)
}

/// PaperMC v2 API client: version listing and server JAR downloads.
pub struct PaperClient {
    base_url: String,
    client: reqwest::Client,
    downloads: reqwest::Client,
    events: EventSink,
}

impl PaperClient {
    pub fn new(settings: &AppSettings, events: EventSink) -> Result<Self> {
        Ok(Self {
            base_url: settings.endpoints.paper.trim_end_matches('/').to_string(),
            client: api_client(settings)?,
            downloads: download_client(settings)?,
            events,
        })
    }

    pub fn download_url(&self, version: &str, build: u64) -> Result<reqwest::Url> {
        let version = validate_version(version)?;
        let file_name = jar_file_name(version, build);
        let build = build.to_string();
        endpoint(
            &self.base_url,
            &["projects", "paper", "versions", version, "builds", &build, "downloads", &file_name],
        )
    }

    pub async fn fetch_versions(&self) -> Result<Vec<String>> {
        let url = endpoint(&self.base_url, &["projects", "paper"])?;
        let project: PaperProject = send_json(self.client.get(url), "Paper").await?;
        Ok(project.newest_first())
    }

    pub async fn latest_build(&self, version: &str) -> Result<u64> {
        let version = validate_version(version)?;
        let url = endpoint(&self.base_url, &["projects", "paper", "versions", version])?;
        let info: PaperVersion = send_json(self.client.get(url), "Paper").await?;
        info.latest_build()
            .with_context(|| format!("No builds published for Paper {}", version))
    }

    /// Downloads the newest build of `version` into `target_dir` and returns
    /// the JAR's file name.
    pub async fn download_jar(&self, version: &str, target_dir: &Path) -> Result<String> {
        let version = validate_version(version)?;
        self.events
            .log(format!("Fetching build information for Paper {}...\n", version));
        let build = self.latest_build(version).await?;

        let jar_filename = jar_file_name(version, build);
        let target_path: PathBuf = target_dir.join(&jar_filename);

        self.events.log(format!("Downloading {}...\n", jar_filename));
        download_to_file(
            &self.downloads,
            self.download_url(version, build)?.as_str(),
            &target_path,
            &self.events,
        )
        .await
        .context("Error downloading PaperMC JAR")?;

        self.events
            .log(format!("Successfully downloaded {}.\n", jar_filename));
        Ok(jar_filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_reversed_for_display() {
        let project: PaperProject = serde_json::from_str(
            r#"{"project_id":"paper","project_name":"Paper","version_groups":["1.20"],"versions":["1.20.4","1.20.5","1.21"]}"#,
        )
        .unwrap();
        assert_eq!(project.newest_first(), vec!["1.21", "1.20.5", "1.20.4"]);
    }

    #[test]
    fn picks_last_build() {
        let info: PaperVersion =
            serde_json::from_str(r#"{"project_id":"paper","version":"1.21","builds":[1,2,130]}"#).unwrap();
        assert_eq!(info.latest_build(), Some(130));

        let empty: PaperVersion = serde_json::from_str(r#"{"builds":[]}"#).unwrap();
        assert_eq!(empty.latest_build(), None);
    }

    #[test]
    fn builds_download_url() {
        let client = PaperClient::new(&AppSettings::default(), EventSink::silent()).unwrap();
        assert_eq!(
            client.download_url("1.21", 130).unwrap().as_str(),
            "https://api.papermc.io/v2/projects/paper/versions/1.21/builds/130/downloads/paper-1.21-130.jar"
        );
    }

    #[test]
    fn rejects_versions_that_leave_the_path() {
        assert_eq!(validate_version(" 1.21.1 ").unwrap(), "1.21.1");
        assert!(validate_version("../x").is_err());
        assert!(validate_version("1.21/../../etc").is_err());
        assert!(validate_version("..").is_err());
        assert!(validate_version("").is_err());

        let client = PaperClient::new(&AppSettings::default(), EventSink::silent()).unwrap();
        assert!(client.download_url("../x", 1).is_err());
    }

    #[tokio::test]
    async fn download_refuses_bad_version_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let client = PaperClient::new(&AppSettings::default(), EventSink::silent()).unwrap();
        let err = client.download_jar("../escape", dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("Invalid Paper version"));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
