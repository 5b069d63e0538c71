pub mod classify;
pub mod curseforge;
pub mod jar;
pub mod metadata;
pub mod models;
pub mod modrinth;
pub mod spigot;

pub use models::{
    InstallFilter, InstallMethod, Plugin, PluginKind, PluginSearchResult, PluginSource, RemoteFile,
};

use crate::config::AppSettings;
use crate::events::EventSink;
use crate::http::{api_client, download_client, download_to_file};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Keeps letters, digits, `-`, `_` and spaces so registry titles become safe file names.
pub fn sanitize_file_stem(name: &str) -> String {
    let safe_name: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_' || *c == ' ')
        .collect();
    safe_name.trim().to_string()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn is_jar(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("jar"))
        .unwrap_or(false)
}

/// Local plugin/mod inventory and remote installs from Modrinth, Spigot and CurseForge.
pub struct PluginManager {
    settings: AppSettings,
    client: reqwest::Client,
    downloads: reqwest::Client,
    events: EventSink,
}

impl PluginManager {
    pub fn new(settings: &AppSettings, events: EventSink) -> Result<Self> {
        Ok(Self {
            settings: settings.clone(),
            client: api_client(settings)?,
            downloads: download_client(settings)?,
            events,
        })
    }

    /// JARs under `plugins/` and `mods/`, with versions read from their
    /// descriptors and provenance from the metadata sidecar.
    pub async fn local_plugins(&self, server_path: &Path) -> Result<Vec<Plugin>> {
        let sidecar = metadata::load(server_path).await;
        let mut found: Vec<(PathBuf, PluginKind)> = Vec::new();

        for kind in [PluginKind::Plugin, PluginKind::Mod] {
            let dir = server_path.join(kind.dir_name());
            if !dir.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to list {}", dir.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if is_jar(&path) && entry.file_type().await?.is_file() {
                    found.push((path, kind));
                }
            }
        }

        let mut plugins = Vec::with_capacity(found.len());
        for (path, kind) in found {
            let jar_path = path.clone();
            let version = tokio::task::spawn_blocking(move || jar::extract_version(&jar_path))
                .await
                .unwrap_or_else(|_| jar::UNKNOWN_VERSION.to_string());

            let name = file_stem(&path);
            let entry = sidecar.get(&name);
            plugins.push(Plugin {
                install_method: entry.map(|e| e.install_method).unwrap_or_default(),
                project_id: entry.and_then(|e| e.project_id.clone()),
                installed_at: entry.map(|e| e.installed_at.clone()).filter(|t| !t.is_empty()),
                name,
                file_path: path,
                kind,
                version,
            });
        }

        plugins.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(plugins)
    }

    pub async fn search(&self, source: PluginSource, query: &str) -> Result<Vec<PluginSearchResult>> {
        self.events
            .log(format!("Searching {} for '{}'...\n", source, query));
        let endpoints = &self.settings.endpoints;

        let results = match source {
            PluginSource::Modrinth => modrinth::search(&self.client, &endpoints.modrinth, query).await,
            PluginSource::Spigot => spigot::search(&self.client, &endpoints.spiget, query).await,
            PluginSource::CurseForge => {
                curseforge::search(
                    &self.client,
                    &endpoints.curseforge,
                    self.settings.curseforge_api_key.as_deref(),
                    query,
                )
                .await
            }
        }
        .with_context(|| format!("Error searching {}", source))?;

        if results.is_empty() {
            self.events
                .log(format!("No results found from {}.\n", source));
        } else {
            self.events.log(format!(
                "Found {} results from {}.\n",
                results.len(),
                source
            ));
        }
        Ok(results)
    }

    /// Looks up the project, downloads its newest matching file into
    /// `plugins/` or `mods/` and records provenance.
    pub async fn install(
        &self,
        server_path: &Path,
        source: PluginSource,
        project_id: &str,
        filter: &InstallFilter,
    ) -> Result<Plugin> {
        let endpoints = &self.settings.endpoints;
        let key = self.settings.curseforge_api_key.as_deref();

        let (title, kind, remote) = match source {
            PluginSource::Modrinth => {
                let project = modrinth::project(&self.client, &endpoints.modrinth, project_id).await?;
                let remote =
                    modrinth::resolve_download(&self.client, &endpoints.modrinth, &project.id, filter)
                        .await?;
                (project.title.clone(), project.kind(), remote)
            }
            PluginSource::Spigot => {
                let resource = spigot::resource(&self.client, &endpoints.spiget, project_id).await?;
                let remote = resource.remote_file(&endpoints.spiget)?;
                (resource.name.clone(), PluginKind::Plugin, remote)
            }
            PluginSource::CurseForge => {
                let project =
                    curseforge::project(&self.client, &endpoints.curseforge, key, project_id).await?;
                let remote = curseforge::resolve_download(
                    &self.client,
                    &endpoints.curseforge,
                    key,
                    project_id,
                    filter,
                )
                .await?;
                (project.name.clone(), project.kind(), remote)
            }
        };

        let file_name = Path::new(&remote.file_name)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("{}.jar", sanitize_file_stem(&title)));
        let target = server_path.join(kind.dir_name()).join(&file_name);

        self.events.log(format!(
            "Installing {} {} from {} into {}/...\n",
            kind,
            title,
            source,
            kind.dir_name()
        ));
        download_to_file(&self.downloads, &remote.url, &target, &self.events)
            .await
            .with_context(|| format!("Error installing {}", title))?;

        let stem = file_stem(&target);
        let entry = metadata::add_entry(
            server_path,
            &stem,
            source.install_method().as_str(),
            Some(project_id),
            kind,
        )
        .await?;

        let jar_path = target.clone();
        let version = tokio::task::spawn_blocking(move || jar::extract_version(&jar_path))
            .await
            .unwrap_or_else(|_| jar::UNKNOWN_VERSION.to_string());

        self.events.log(format!("Installed {} ({})\n", file_name, version));
        Ok(Plugin {
            name: stem,
            file_path: target,
            kind,
            version,
            install_method: entry.install_method,
            project_id: entry.project_id,
            installed_at: Some(entry.installed_at),
        })
    }

    /// Copies a JAR into the server. The target directory comes from `kind`,
    /// or from the JAR's own descriptor when not given (plugins by default).
    pub async fn add_local_plugin(
        &self,
        source_path: &Path,
        server_path: &Path,
        kind: Option<PluginKind>,
    ) -> Result<PathBuf> {
        if !source_path.is_file() {
            anyhow::bail!("Plugin file not found: {}", source_path.display());
        }
        let file_name = source_path
            .file_name()
            .context("Plugin path has no file name")?;

        let kind = match kind {
            Some(kind) => kind,
            None => {
                let probe = source_path.to_path_buf();
                tokio::task::spawn_blocking(move || jar::detect_kind(&probe))
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_default()
            }
        };

        let target_dir = server_path.join(kind.dir_name());
        fs::create_dir_all(&target_dir).await?;
        let target = target_dir.join(file_name);
        fs::copy(source_path, &target)
            .await
            .with_context(|| format!("Error adding plugin {}", source_path.display()))?;

        metadata::add_entry(
            server_path,
            &file_stem(&target),
            InstallMethod::Manual.as_str(),
            None,
            kind,
        )
        .await?;

        self.events.log(format!(
            "Added {}: {}\n",
            kind,
            file_name.to_string_lossy()
        ));
        Ok(target)
    }

    /// Deletes a local JAR (matched by name or file name) and its sidecar entry.
    pub async fn remove_local_plugin(&self, server_path: &Path, name: &str) -> Result<Plugin> {
        let plugin = self
            .local_plugins(server_path)
            .await?
            .into_iter()
            .find(|p| p.name == name || p.file_name() == name)
            .with_context(|| format!("Plugin not found: {}", name))?;

        fs::remove_file(&plugin.file_path)
            .await
            .with_context(|| format!("Error removing plugin {}", plugin.file_path.display()))?;
        metadata::remove_entry(server_path, &plugin.name).await?;

        self.events
            .log(format!("Removed plugin: {}\n", plugin.name));
        Ok(plugin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_titles() {
        assert_eq!(sanitize_file_stem("  World/Edit: 7.3 "), "WorldEdit 73");
        assert_eq!(sanitize_file_stem("Geyser-Spigot_v2"), "Geyser-Spigot_v2");
        assert_eq!(sanitize_file_stem("../.."), "");
    }
}
