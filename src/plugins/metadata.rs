use super::models::{InstallMethod, PluginKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const METADATA_FILE: &str = ".plugin_metadata.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginMetadataEntry {
    #[serde(default)]
    pub install_method: InstallMethod,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub installed_at: String,
    #[serde(rename = "type", default)]
    pub kind: PluginKind,
}

/// Provenance of installed JARs, keyed by file stem.
pub type PluginMetadata = BTreeMap<String, PluginMetadataEntry>;

pub fn metadata_path(server_path: &Path) -> PathBuf {
    server_path.join(METADATA_FILE)
}

/// A missing or unreadable sidecar reads as empty.
pub async fn load(server_path: &Path) -> PluginMetadata {
    let path = metadata_path(server_path);
    let content = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(_) => return PluginMetadata::new(),
    };
    match serde_json::from_str(&content) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::warn!("Ignoring corrupt {}: {}", path.display(), e);
            PluginMetadata::new()
        }
    }
}

pub async fn save(server_path: &Path, metadata: &PluginMetadata) -> Result<()> {
    let path = metadata_path(server_path);
    let content = serde_json::to_string_pretty(metadata)?;
    fs::write(&path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Records (or replaces) the entry for `stem`. `install_method` is normalised
/// to its capitalised form.
pub async fn add_entry(
    server_path: &Path,
    stem: &str,
    install_method: &str,
    project_id: Option<&str>,
    kind: PluginKind,
) -> Result<PluginMetadataEntry> {
    let entry = PluginMetadataEntry {
        install_method: InstallMethod::from_label(install_method),
        project_id: project_id.map(str::to_string),
        installed_at: chrono::Local::now().to_rfc3339(),
        kind,
    };

    let mut metadata = load(server_path).await;
    metadata.insert(stem.to_string(), entry.clone());
    save(server_path, &metadata).await?;
    Ok(entry)
}

/// Returns whether an entry existed.
pub async fn remove_entry(server_path: &Path, stem: &str) -> Result<bool> {
    let mut metadata = load(server_path).await;
    if metadata.remove(stem).is_none() {
        return Ok(false);
    }
    save(server_path, &metadata).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entry_fields_use_sidecar_names() {
        let dir = tempfile::tempdir().unwrap();
        add_entry(dir.path(), "Sodium", "modrinth", Some("AANobbMI"), PluginKind::Mod)
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(metadata_path(dir.path())).unwrap())
                .unwrap();
        let entry = &raw["Sodium"];
        assert_eq!(entry["install_method"], "Modrinth");
        assert_eq!(entry["project_id"], "AANobbMI");
        assert_eq!(entry["type"], "mod");
        assert!(chrono::DateTime::parse_from_rfc3339(entry["installed_at"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn corrupt_sidecar_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(metadata_path(dir.path()), "{not json").unwrap();
        assert!(load(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        add_entry(dir.path(), "EssentialsX", "Spigot", Some("9089"), PluginKind::Plugin)
            .await
            .unwrap();

        assert!(remove_entry(dir.path(), "EssentialsX").await.unwrap());
        assert!(!remove_entry(dir.path(), "EssentialsX").await.unwrap());
        assert!(load(dir.path()).await.is_empty());
    }
}
