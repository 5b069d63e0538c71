use super::classify::classify;
use super::models::{InstallFilter, PluginKind, PluginSearchResult, PluginSource, RemoteFile};
use crate::http::{endpoint, send_json};
use anyhow::{Context, Result};
use serde::Deserialize;

pub const MINECRAFT_GAME_ID: &str = "432";
const CLASS_BUKKIT_PLUGINS: u64 = 5;
const CLASS_MODS: u64 = 6;
const PAGE_SIZE: &str = "20";

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Mod {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub class_id: Option<u64>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub download_count: f64,
    #[serde(default)]
    pub logo: Option<Logo>,
    #[serde(default)]
    pub links: Option<Links>,
    #[serde(default)]
    pub latest_files_indexes: Vec<FileIndex>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Author {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Logo {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Links {
    #[serde(default)]
    pub website_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileIndex {
    #[serde(default)]
    pub game_version: String,
    #[serde(default)]
    pub mod_loader: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ModFile {
    pub id: u64,
    #[serde(default)]
    pub display_name: String,
    pub file_name: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub file_date: String,
    #[serde(default)]
    pub game_versions: Vec<String>,
}

fn loader_name(id: u64) -> Option<&'static str> {
    match id {
        1 => Some("forge"),
        4 => Some("fabric"),
        5 => Some("quilt"),
        6 => Some("neoforge"),
        _ => None,
    }
}

impl Mod {
    pub(crate) fn kind(&self) -> PluginKind {
        let project_type = match self.class_id {
            Some(CLASS_BUKKIT_PLUGINS) => Some("plugin"),
            Some(CLASS_MODS) => Some("mod"),
            _ => None,
        };
        let loaders: Vec<&str> = self
            .latest_files_indexes
            .iter()
            .filter_map(|idx| idx.mod_loader.and_then(loader_name))
            .collect();
        classify(&loaders, project_type)
    }

    pub(crate) fn into_result(self) -> PluginSearchResult {
        let kind = self.kind();
        let game_version = self
            .latest_files_indexes
            .first()
            .map(|idx| idx.game_version.clone())
            .filter(|v| !v.is_empty());
        PluginSearchResult {
            external_url: self
                .links
                .and_then(|l| l.website_url)
                .unwrap_or_else(|| format!("https://www.curseforge.com/projects/{}", self.id)),
            id: self.id.to_string(),
            name: self.name,
            description: self.summary,
            author: self
                .authors
                .into_iter()
                .map(|a| a.name)
                .collect::<Vec<_>>()
                .join(", "),
            source: PluginSource::CurseForge,
            kind,
            game_version,
            downloads: self.download_count.max(0.0) as u64,
            icon_url: self.logo.map(|l| l.url).filter(|u| !u.is_empty()),
        }
    }
}

/// Newest file matching the filter's game version. Files whose author
/// disabled third-party distribution carry no download URL.
pub(crate) fn pick_file(files: Vec<ModFile>, filter: &InstallFilter) -> Result<RemoteFile> {
    let mut candidates: Vec<ModFile> = files
        .into_iter()
        .filter(|f| match &filter.game_version {
            Some(game) => f.game_versions.iter().any(|g| g == game),
            None => true,
        })
        .filter(|f| match &filter.loader {
            Some(loader) => f.game_versions.iter().any(|g| g.eq_ignore_ascii_case(loader)),
            None => true,
        })
        .collect();
    candidates.sort_by(|a, b| b.file_date.cmp(&a.file_date));

    let newest = candidates
        .into_iter()
        .next()
        .with_context(|| format!("No compatible CurseForge file found ({:?})", filter))?;

    let url = newest.download_url.filter(|u| !u.is_empty()).with_context(|| {
        format!(
            "CurseForge file {} ({}) does not allow third-party downloads",
            newest.id, newest.file_name
        )
    })?;

    Ok(RemoteFile {
        url,
        file_name: newest.file_name,
        version: Some(newest.display_name).filter(|v| !v.is_empty()),
    })
}

fn api_key(key: Option<&str>) -> Result<&str> {
    key.filter(|k| !k.is_empty()).context(
        "CurseForge requires an API key; set the CURSEFORGE_API_KEY environment variable",
    )
}

pub async fn search(
    client: &reqwest::Client,
    base: &str,
    key: Option<&str>,
    query: &str,
) -> Result<Vec<PluginSearchResult>> {
    let key = api_key(key)?;
    let url = endpoint(base, &["v1", "mods", "search"])?;
    let request = client.get(url).header("x-api-key", key).query(&[
        ("gameId", MINECRAFT_GAME_ID),
        ("searchFilter", query.trim()),
        ("pageSize", PAGE_SIZE),
        ("sortField", "2"),
        ("sortOrder", "desc"),
    ]);
    let response: Envelope<Vec<Mod>> = send_json(request, "CurseForge").await?;
    Ok(response.data.into_iter().map(Mod::into_result).collect())
}

pub(crate) async fn project(client: &reqwest::Client, base: &str, key: Option<&str>, id: &str) -> Result<Mod> {
    let key = api_key(key)?;
    let url = endpoint(base, &["v1", "mods", id])?;
    let response: Envelope<Mod> = send_json(client.get(url).header("x-api-key", key), "CurseForge").await?;
    Ok(response.data)
}

pub(crate) async fn resolve_download(
    client: &reqwest::Client,
    base: &str,
    key: Option<&str>,
    id: &str,
    filter: &InstallFilter,
) -> Result<RemoteFile> {
    let key = api_key(key)?;
    let url = endpoint(base, &["v1", "mods", id, "files"])?;
    let response: Envelope<Vec<ModFile>> =
        send_json(client.get(url).header("x-api-key", key), "CurseForge").await?;
    pick_file(response.data, filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_envelope() {
        let response: Envelope<Vec<Mod>> = serde_json::from_str(
            r#"{"data":[
                {"id":238222,"name":"Just Enough Items","summary":"View items","classId":6,
                 "authors":[{"name":"mezz"}],"downloadCount":3.5E8,
                 "logo":{"url":"https://media.forgecdn.net/jei.png"},
                 "links":{"websiteUrl":"https://www.curseforge.com/minecraft/mc-mods/jei"},
                 "latestFilesIndexes":[{"gameVersion":"1.21.1","modLoader":6}]},
                {"id":31043,"name":"WorldEdit","summary":"","classId":5,"authors":[],
                 "downloadCount":10,"latestFilesIndexes":[]}
            ],"pagination":{"index":0,"pageSize":20,"resultCount":2,"totalCount":2}}"#,
        )
        .unwrap();

        let results: Vec<PluginSearchResult> = response.data.into_iter().map(Mod::into_result).collect();
        assert_eq!(results[0].kind, PluginKind::Mod);
        assert_eq!(results[0].downloads, 350_000_000);
        assert_eq!(results[0].game_version.as_deref(), Some("1.21.1"));
        assert_eq!(results[1].kind, PluginKind::Plugin);
        assert_eq!(results[1].external_url, "https://www.curseforge.com/projects/31043");
    }

    fn files() -> Vec<ModFile> {
        serde_json::from_str(
            r#"[
                {"id":1,"displayName":"jei 19.0","fileName":"jei-19.0.jar","downloadUrl":"https://edge/jei-19.0.jar",
                 "fileDate":"2024-06-01T00:00:00Z","gameVersions":["1.21","NeoForge"]},
                {"id":2,"displayName":"jei 19.1","fileName":"jei-19.1.jar","downloadUrl":null,
                 "fileDate":"2024-08-01T00:00:00Z","gameVersions":["1.21.1","NeoForge"]}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn newest_file_without_url_is_an_error() {
        let err = pick_file(files(), &InstallFilter::default()).unwrap_err();
        assert!(err.to_string().contains("third-party"));
    }

    #[test]
    fn game_version_filter_selects_older_file() {
        let filter = InstallFilter {
            loader: Some("neoforge".to_string()),
            game_version: Some("1.21".to_string()),
        };
        let file = pick_file(files(), &filter).unwrap();
        assert_eq!(file.file_name, "jei-19.0.jar");
        assert_eq!(file.version.as_deref(), Some("jei 19.0"));
    }

    #[test]
    fn missing_key_is_reported() {
        assert!(api_key(None).is_err());
        assert!(api_key(Some("")).is_err());
        assert_eq!(api_key(Some("k")).unwrap(), "k");
    }
}
