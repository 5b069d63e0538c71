use super::models::{PluginKind, PluginSearchResult, PluginSource, RemoteFile};
use super::sanitize_file_stem;
use crate::http::{endpoint, send_json};
use anyhow::{Context, Result};
use serde::Deserialize;

const PAGE_SIZE: &str = "20";

#[derive(Debug, Deserialize)]
pub(crate) struct Resource {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub file: Option<ResourceFile>,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default, rename = "testedVersions")]
    pub tested_versions: Vec<String>,
    #[serde(default)]
    pub author: Option<AuthorRef>,
    #[serde(default)]
    pub icon: Option<Icon>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourceFile {
    #[serde(default, rename = "type")]
    pub file_type: String,
    #[serde(default, rename = "externalUrl")]
    pub external_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthorRef {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Icon {
    #[serde(default)]
    pub url: String,
}

impl Resource {
    pub(crate) fn into_result(self) -> PluginSearchResult {
        let icon_url = self
            .icon
            .map(|icon| icon.url)
            .filter(|url| !url.is_empty())
            .map(|url| format!("https://www.spigotmc.org/{}", url));

        PluginSearchResult {
            external_url: format!("https://www.spigotmc.org/resources/{}", self.id),
            id: self.id.to_string(),
            name: self.name,
            description: self.tag,
            // Author names need another request per resource.
            author: self
                .author
                .map(|a| format!("User {}", a.id))
                .unwrap_or_default(),
            source: PluginSource::Spigot,
            kind: PluginKind::Plugin,
            game_version: self.tested_versions.last().cloned(),
            downloads: self.downloads,
            icon_url,
        }
    }

    /// Download target for this resource. Externally hosted resources are refused.
    pub(crate) fn remote_file(&self, base: &str) -> Result<RemoteFile> {
        if self.external {
            let location = self
                .file
                .as_ref()
                .and_then(|f| f.external_url.clone())
                .unwrap_or_default();
            anyhow::bail!(
                "Resource '{}' is hosted externally ({}) and cannot be downloaded",
                self.name,
                location
            );
        }
        if let Some(file) = &self.file {
            if !file.file_type.is_empty() && file.file_type != ".jar" {
                anyhow::bail!(
                    "Resource '{}' is distributed as {} and cannot be installed directly",
                    self.name,
                    file.file_type
                );
            }
        }

        let url = endpoint(base, &["resources", &self.id.to_string(), "download"])?;
        let stem = sanitize_file_stem(&self.name);
        let stem = if stem.is_empty() {
            format!("spigot-{}", self.id)
        } else {
            stem
        };
        Ok(RemoteFile {
            url: url.to_string(),
            file_name: format!("{}.jar", stem),
            version: None,
        })
    }
}

pub async fn search(client: &reqwest::Client, base: &str, query: &str) -> Result<Vec<PluginSearchResult>> {
    let url = if query.trim().is_empty() {
        endpoint(base, &["resources"])?
    } else {
        endpoint(base, &["search", "resources", query.trim()])?
    };

    let resp = client
        .get(url)
        .query(&[("size", PAGE_SIZE), ("sort", "-downloads")])
        .send()
        .await
        .context("Request for Spigot failed")?;

    // Spiget answers an empty search with 404.
    if resp.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(Vec::new());
    }
    if !resp.status().is_success() {
        anyhow::bail!("Spigot API failed with status {}", resp.status());
    }

    let resources: Vec<Resource> = resp.json().await.context("Failed to parse Spigot JSON")?;
    Ok(resources.into_iter().map(Resource::into_result).collect())
}

pub(crate) async fn resource(client: &reqwest::Client, base: &str, id: &str) -> Result<Resource> {
    let url = endpoint(base, &["resources", id])?;
    send_json(client.get(url), "Spigot").await
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://api.spiget.org/v2";

    fn resource(json: &str) -> Resource {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_search_result() {
        let r = resource(
            r#"{"id":9089,"name":"EssentialsX","tag":"The essential plugin","external":false,
                "file":{"type":".jar","size":1.2,"sizeUnit":"MB","url":"resources/essentialsx.9089/download"},
                "downloads":1000,"testedVersions":["1.8","1.21"],"author":{"id":42},
                "icon":{"url":"data/resource_icons/9/9089.jpg","data":"abc"}}"#,
        );
        let result = r.into_result();
        assert_eq!(result.id, "9089");
        assert_eq!(result.kind, PluginKind::Plugin);
        assert_eq!(result.author, "User 42");
        assert_eq!(result.game_version.as_deref(), Some("1.21"));
        assert_eq!(
            result.icon_url.as_deref(),
            Some("https://www.spigotmc.org/data/resource_icons/9/9089.jpg")
        );
    }

    #[test]
    fn download_target_uses_sanitized_name() {
        let r = resource(r#"{"id":28140,"name":"LuckPerms [1.8+]","external":false,"file":{"type":".jar"}}"#);
        let file = r.remote_file(BASE).unwrap();
        assert_eq!(file.url, "https://api.spiget.org/v2/resources/28140/download");
        assert_eq!(file.file_name, "LuckPerms 18.jar");
    }

    #[test]
    fn external_resources_are_refused() {
        let r = resource(
            r#"{"id":1,"name":"Big","external":true,"file":{"type":"external","externalUrl":"https://example.org/big"}}"#,
        );
        let err = r.remote_file(BASE).unwrap_err();
        assert!(err.to_string().contains("hosted externally"));
    }
}
