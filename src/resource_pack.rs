use crate::checksum::compute_sha1;
use crate::config::AppSettings;
use crate::events::EventSink;
use crate::http::{download_client, download_to_file};
use crate::properties;
use crate::server_manager::ServerManager;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const RESOURCE_PACK_DIR: &str = "resourcepacks";
pub const METADATA_FILE: &str = ".resource_pack_metadata.json";
const DEFAULT_PACK_NAME: &str = "resource_pack.zip";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackMetadata {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub sha1: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourcePack {
    pub file_name: String,
    /// Empty when the pack was not downloaded through the manager.
    pub sha1: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivePack {
    pub url: String,
    pub sha1: String,
}

/// Pack file name taken from the URL path, or `resource_pack.zip`.
pub fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| DEFAULT_PACK_NAME.to_string())
}

async fn load_metadata(server_path: &Path) -> BTreeMap<String, PackMetadata> {
    let path = server_path.join(METADATA_FILE);
    match fs::read_to_string(&path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring corrupt {}: {}", path.display(), e);
            BTreeMap::new()
        }),
        Err(_) => BTreeMap::new(),
    }
}

async fn save_metadata(server_path: &Path, metadata: &BTreeMap<String, PackMetadata>) -> Result<()> {
    let path = server_path.join(METADATA_FILE);
    fs::write(&path, serde_json::to_string_pretty(metadata)?)
        .await
        .context("Error saving resource pack metadata")?;
    Ok(())
}

async fn resource_dir(server_path: &Path) -> Result<PathBuf> {
    let dir = server_path.join(RESOURCE_PACK_DIR);
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir)
}

pub struct ResourcePackManager {
    downloads: reqwest::Client,
    events: EventSink,
}

impl ResourcePackManager {
    pub fn new(settings: &AppSettings, events: EventSink) -> Result<Self> {
        Ok(Self {
            downloads: download_client(settings)?,
            events,
        })
    }

    /// Zip files in `resourcepacks/` with their recorded SHA-1.
    pub async fn list(&self, server_path: &Path) -> Result<Vec<ResourcePack>> {
        let dir = resource_dir(server_path).await?;
        let metadata = load_metadata(server_path).await;

        let mut packs = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.ends_with(".zip") {
                let sha1 = metadata
                    .get(&file_name)
                    .map(|m| m.sha1.clone())
                    .unwrap_or_default();
                packs.push(ResourcePack { file_name, sha1 });
            }
        }
        packs.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(packs)
    }

    /// The pack currently advertised by `server.properties`.
    pub async fn active(&self, server_path: &Path) -> Result<ActivePack> {
        let props = properties::read(server_path).await?;
        Ok(ActivePack {
            url: props.get("resource-pack").unwrap_or_default().to_string(),
            sha1: props.get("resource-pack-sha1").unwrap_or_default().to_string(),
        })
    }

    /// Downloads a pack into `resourcepacks/`, hashes it and records it.
    /// Returns the stored file name.
    pub async fn download(&self, server_path: &Path, url: &str) -> Result<ResourcePack> {
        let dir = resource_dir(server_path).await?;
        let file_name = file_name_from_url(url);
        let target = dir.join(&file_name);

        self.events
            .log(format!("Downloading resource pack from {}...\n", url));
        download_to_file(&self.downloads, url, &target, &self.events)
            .await
            .context("Error downloading resource pack")?;
        let sha1 = compute_sha1(&target).await?;

        let mut metadata = load_metadata(server_path).await;
        metadata.insert(
            file_name.clone(),
            PackMetadata {
                url: url.to_string(),
                sha1: sha1.clone(),
            },
        );
        save_metadata(server_path, &metadata).await?;

        self.events
            .log(format!("Downloaded resource pack '{}'.\n", file_name));
        Ok(ResourcePack { file_name, sha1 })
    }

    /// Points `server.properties` and the server record at a downloaded pack.
    pub async fn activate(&self, servers: &ServerManager, server_name: &str, file_name: &str) -> Result<ActivePack> {
        let record = servers.get(server_name).await?;
        let metadata = load_metadata(&record.path).await;
        let pack = metadata
            .get(file_name)
            .with_context(|| format!("Metadata for resource pack '{}' not found", file_name))?;

        properties::update(
            &record.path,
            &[("resource-pack", &pack.url), ("resource-pack-sha1", &pack.sha1)],
        )
        .await?;
        servers
            .set_resource_pack(server_name, &pack.url, &pack.sha1)
            .await?;

        self.events
            .log(format!("Activated resource pack '{}'.\n", file_name));
        Ok(ActivePack {
            url: pack.url.clone(),
            sha1: pack.sha1.clone(),
        })
    }

    pub async fn deactivate(&self, servers: &ServerManager, server_name: &str) -> Result<()> {
        let record = servers.get(server_name).await?;
        properties::update(&record.path, &[("resource-pack", ""), ("resource-pack-sha1", "")]).await?;
        servers.set_resource_pack(server_name, "", "").await?;
        self.events.log("Resource pack deactivated.\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_from_url_path() {
        assert_eq!(file_name_from_url("https://cdn.example.com/packs/faithful.zip?v=2"), "faithful.zip");
        assert_eq!(file_name_from_url("https://cdn.example.com/"), "resource_pack.zip");
        assert_eq!(file_name_from_url("not a url"), "resource_pack.zip");
    }
}
