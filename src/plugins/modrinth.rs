use super::classify::classify;
use super::models::{InstallFilter, PluginKind, PluginSearchResult, PluginSource, RemoteFile};
use crate::http::{endpoint, send_json};
use anyhow::{Context, Result};
use serde::Deserialize;

const SEARCH_FACETS: &str = r#"[["project_type:mod","project_type:plugin"]]"#;
const SEARCH_LIMIT: &str = "20";

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    pub project_id: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, alias = "game_versions")]
    pub versions: Vec<String>,
    #[serde(default)]
    pub latest_version: Option<String>,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl SearchHit {
    pub(crate) fn into_result(self) -> PluginSearchResult {
        let kind = classify(&self.categories, self.project_type.as_deref());
        let path = match kind {
            PluginKind::Mod => "mod",
            PluginKind::Plugin => "plugin",
        };
        PluginSearchResult {
            external_url: format!("https://modrinth.com/{}/{}", path, self.slug),
            game_version: self.latest_version.or_else(|| self.versions.last().cloned()),
            id: self.project_id,
            name: self.title,
            description: self.description,
            author: self.author,
            source: PluginSource::Modrinth,
            kind,
            downloads: self.downloads,
            icon_url: self.icon_url.filter(|u| !u.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Project {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub loaders: Vec<String>,
}

impl Project {
    pub(crate) fn kind(&self) -> PluginKind {
        let tags: Vec<&str> = self
            .loaders
            .iter()
            .chain(&self.categories)
            .map(String::as_str)
            .collect();
        classify(&tags, self.project_type.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectVersion {
    #[serde(default)]
    pub version_number: String,
    #[serde(default)]
    pub game_versions: Vec<String>,
    #[serde(default)]
    pub loaders: Vec<String>,
    #[serde(default)]
    pub date_published: String,
    #[serde(default)]
    pub files: Vec<VersionFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionFile {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub primary: bool,
}

/// Newest version matching `filter`, then its primary file (or first JAR).
pub(crate) fn pick_file(versions: Vec<ProjectVersion>, filter: &InstallFilter) -> Option<RemoteFile> {
    let mut candidates: Vec<ProjectVersion> = versions
        .into_iter()
        .filter(|v| match &filter.loader {
            Some(loader) => v.loaders.iter().any(|l| l.eq_ignore_ascii_case(loader)),
            None => true,
        })
        .filter(|v| match &filter.game_version {
            Some(game) => v.game_versions.iter().any(|g| g == game),
            None => true,
        })
        .collect();

    candidates.sort_by(|a, b| b.date_published.cmp(&a.date_published));
    let newest = candidates.into_iter().next()?;

    let file = newest
        .files
        .iter()
        .find(|f| f.primary)
        .or_else(|| newest.files.iter().find(|f| f.filename.ends_with(".jar")))
        .or_else(|| newest.files.first())?;

    Some(RemoteFile {
        url: file.url.clone(),
        file_name: file.filename.clone(),
        version: Some(newest.version_number.clone()).filter(|v| !v.is_empty()),
    })
}

pub async fn search(client: &reqwest::Client, base: &str, query: &str) -> Result<Vec<PluginSearchResult>> {
    let url = endpoint(base, &["search"])?;
    let request = client
        .get(url)
        .query(&[("query", query), ("facets", SEARCH_FACETS), ("limit", SEARCH_LIMIT)]);
    let response: SearchResponse = send_json(request, "Modrinth").await?;
    Ok(response.hits.into_iter().map(SearchHit::into_result).collect())
}

pub(crate) async fn project(client: &reqwest::Client, base: &str, id: &str) -> Result<Project> {
    let url = endpoint(base, &["project", id])?;
    send_json(client.get(url), "Modrinth").await
}

pub(crate) async fn resolve_download(
    client: &reqwest::Client,
    base: &str,
    id: &str,
    filter: &InstallFilter,
) -> Result<RemoteFile> {
    let url = endpoint(base, &["project", id, "version"])?;
    let versions: Vec<ProjectVersion> = send_json(client.get(url), "Modrinth").await?;
    pick_file(versions, filter).with_context(|| {
        format!(
            "No compatible version found for Modrinth project {} ({:?})",
            id, filter
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_JSON: &str = r#"{
        "hits": [
            {"project_id":"AANobbMI","slug":"sodium","title":"Sodium","description":"Fast renderer",
             "author":"jellysquid3","project_type":"mod","categories":["fabric","optimization"],
             "versions":["1.20.1","1.21"],"downloads":5000,"icon_url":""},
            {"project_id":"P1OZGk5p","slug":"viaversion","title":"ViaVersion","description":"",
             "author":"ViaVersion","project_type":"plugin","categories":["paper","velocity"],
             "versions":["1.8.9","1.21"],"latest_version":"1.21.1","downloads":9000,
             "icon_url":"https://cdn.modrinth.com/x.png"}
        ],
        "offset": 0, "limit": 20, "total_hits": 2
    }"#;

    #[test]
    fn parses_search_hits() {
        let response: SearchResponse = serde_json::from_str(SEARCH_JSON).unwrap();
        let results: Vec<PluginSearchResult> =
            response.hits.into_iter().map(SearchHit::into_result).collect();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].kind, PluginKind::Mod);
        assert_eq!(results[0].game_version.as_deref(), Some("1.21"));
        assert_eq!(results[0].icon_url, None);
        assert_eq!(results[0].external_url, "https://modrinth.com/mod/sodium");
        assert_eq!(results[1].kind, PluginKind::Plugin);
        assert_eq!(results[1].game_version.as_deref(), Some("1.21.1"));
    }

    fn versions() -> Vec<ProjectVersion> {
        serde_json::from_str(
            r#"[
            {"version_number":"2.0","game_versions":["1.21"],"loaders":["paper"],
             "date_published":"2024-07-01T00:00:00Z",
             "files":[{"url":"https://cdn/x-2.0-sources.jar","filename":"x-2.0-sources.jar","primary":false},
                      {"url":"https://cdn/x-2.0.jar","filename":"x-2.0.jar","primary":true}]},
            {"version_number":"1.5","game_versions":["1.20.4"],"loaders":["fabric"],
             "date_published":"2024-02-01T00:00:00Z",
             "files":[{"url":"https://cdn/x-1.5.jar","filename":"x-1.5.jar"}]}
        ]"#,
        )
        .unwrap()
    }

    #[test]
    fn picks_newest_primary_file() {
        let file = pick_file(versions(), &InstallFilter::default()).unwrap();
        assert_eq!(file.file_name, "x-2.0.jar");
        assert_eq!(file.version.as_deref(), Some("2.0"));
    }

    #[test]
    fn filter_narrows_versions() {
        let filter = InstallFilter {
            loader: Some("Fabric".to_string()),
            game_version: None,
        };
        assert_eq!(pick_file(versions(), &filter).unwrap().file_name, "x-1.5.jar");

        let filter = InstallFilter {
            loader: None,
            game_version: Some("1.19".to_string()),
        };
        assert!(pick_file(versions(), &filter).is_none());
    }

    #[test]
    fn project_kind_uses_loaders() {
        let project: Project = serde_json::from_str(
            r#"{"id":"abc","title":"X","project_type":"mod","categories":["utility"],"loaders":["bukkit","paper"]}"#,
        )
        .unwrap();
        assert_eq!(project.kind(), PluginKind::Plugin);
    }
}
