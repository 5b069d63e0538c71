use crate::properties::{Properties, SERVER_PROPERTIES};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STANDARD_FILES: &[&str] = &[
    SERVER_PROPERTIES,
    "bukkit.yml",
    "spigot.yml",
    "paper.yml",
    "config/paper-global.yml",
    "config/paper-world-defaults.yml",
];
const PLUGIN_CONFIG_SUBDIRS: &[&str] = &["config", "configurations", "settings"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigFile {
    pub category: String,
    pub display_name: String,
    pub path: PathBuf,
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

async fn yaml_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return files;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.is_file() && is_yaml(&path) {
            files.push(path);
        }
    }
    files.sort();
    files
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Editable configuration files of a server, grouped by category.
pub async fn list_config_files(server_path: &Path) -> Result<Vec<ConfigFile>> {
    let mut files = Vec::new();

    for relative in STANDARD_FILES {
        let path = server_path.join(relative);
        if !path.exists() {
            continue;
        }
        let (category, display_name) = if relative.starts_with("config/") {
            ("Paper Config", file_name_of(&path))
        } else if relative.ends_with(".yml") {
            ("Server Config", relative.to_string())
        } else {
            ("Properties", relative.to_string())
        };
        files.push(ConfigFile {
            category: category.to_string(),
            display_name,
            path,
        });
    }

    let plugins_dir = server_path.join("plugins");
    if !plugins_dir.is_dir() {
        return Ok(files);
    }

    for path in yaml_files_in(&plugins_dir).await {
        files.push(ConfigFile {
            category: "Plugin Configs".to_string(),
            display_name: file_name_of(&path),
            path,
        });
    }

    let mut plugin_dirs = Vec::new();
    let mut entries = fs::read_dir(&plugins_dir)
        .await
        .with_context(|| format!("Error loading plugin configs from {}", plugins_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            plugin_dirs.push(entry.path());
        }
    }
    plugin_dirs.sort();

    for plugin_dir in plugin_dirs {
        let plugin_name = file_name_of(&plugin_dir);
        let category = format!("{} Config", plugin_name);

        for path in yaml_files_in(&plugin_dir).await {
            files.push(ConfigFile {
                category: category.clone(),
                display_name: file_name_of(&path),
                path,
            });
        }
        for subdir in PLUGIN_CONFIG_SUBDIRS {
            for path in yaml_files_in(&plugin_dir.join(subdir)).await {
                files.push(ConfigFile {
                    category: category.clone(),
                    display_name: format!("{}/{}", subdir, file_name_of(&path)),
                    path,
                });
            }
        }
    }

    Ok(files)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Properties,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => Ok(ConfigFormat::Yaml),
            Some("properties") => Ok(ConfigFormat::Properties),
            _ => anyhow::bail!("Unsupported configuration file: {}", path.display()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigEntry {
    /// Dotted path into nested sections, e.g. `settings.timeout`.
    pub key: String,
    pub value: Value,
    pub help: String,
}

impl ConfigEntry {
    pub fn display_value(&self) -> String {
        display_value(&self.value)
    }
}

pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n"),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn key_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => display_value(other),
    }
}

/// Help text for YAML keys: the comment block preceding the first line that
/// declares each bare key name.
fn extract_yaml_comments(content: &str) -> HashMap<String, String> {
    let mut comments = HashMap::new();
    let mut block: Vec<String> = Vec::new();

    for line in content.lines() {
        let stripped = line.trim();
        if let Some(text) = stripped.strip_prefix('#') {
            let text = text.trim();
            if !text.is_empty() {
                block.push(text.to_string());
            }
        } else if stripped.is_empty() {
            if block.last().map(|l| !l.is_empty()).unwrap_or(false) {
                block.push(String::new());
            }
        } else if let Some((key, _)) = stripped.split_once(':') {
            if !block.is_empty() {
                let key = key.trim().trim_start_matches("- ").trim_matches(['"', '\'']);
                comments.insert(key.to_string(), block.join("\n").trim().to_string());
                block.clear();
            }
        }
    }
    comments
}

fn flatten(value: &Value, prefix: &str, out: &mut Vec<(String, String, Value)>) {
    match value {
        Value::Mapping(map) => {
            for (k, v) in map {
                let name = key_string(k);
                let full_key = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", prefix, name)
                };
                if v.is_mapping() {
                    flatten(v, &full_key, out);
                } else {
                    out.push((full_key, name, v.clone()));
                }
            }
        }
        other => out.push((prefix.to_string(), prefix.to_string(), other.clone())),
    }
}

fn lookup_key(map: &Mapping, part: &str) -> Value {
    map.keys()
        .find(|k| key_string(k) == part)
        .cloned()
        .unwrap_or_else(|| Value::String(part.to_string()))
}

fn get_nested<'a>(value: &'a Value, parts: &[&str]) -> Option<&'a Value> {
    let Some((first, rest)) = parts.split_first() else {
        return Some(value);
    };
    let map = value.as_mapping()?;
    let child = map.get(lookup_key(map, first))?;
    get_nested(child, rest)
}

fn set_nested(current: &mut Value, parts: &[&str], value: Value) {
    let Some((first, rest)) = parts.split_first() else {
        *current = value;
        return;
    };
    if !current.is_mapping() {
        *current = Value::Mapping(Mapping::new());
    }
    if let Value::Mapping(map) = current {
        let key = lookup_key(map, first);
        let child = map.entry(key).or_insert(Value::Null);
        set_nested(child, rest, value);
    }
}

fn parse_bool(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn line_items(text: &str) -> Vec<Value> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| Value::String(line.strip_prefix("- ").unwrap_or(line).to_string()))
        .collect()
}

fn parse_list(text: &str) -> Value {
    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Sequence(items)) => Value::Sequence(items),
        Ok(Value::String(_)) | Err(_) => Value::Sequence(line_items(text)),
        Ok(Value::Null) => Value::Sequence(Vec::new()),
        Ok(_) => Value::Sequence(vec![Value::String(text.to_string())]),
    }
}

/// Converts edited text back to the type the key held before. Text that
/// does not parse as the original numeric type is stored as a string.
pub fn convert_text(text: &str, original: Option<&Value>) -> Value {
    match original {
        Some(Value::Bool(_)) => Value::Bool(parse_bool(text)),
        Some(Value::Number(n)) if n.is_f64() => text
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        Some(Value::Number(_)) => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        Some(Value::Sequence(_)) => parse_list(text),
        _ => Value::String(text.to_string()),
    }
}

/// A configuration file opened for editing.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    path: PathBuf,
    format: ConfigFormat,
    data: Value,
    comments: HashMap<String, String>,
    properties: Properties,
}

impl ConfigDocument {
    pub async fn load(path: &Path) -> Result<Self> {
        let format = ConfigFormat::from_path(path)?;
        let bytes = fs::read(path)
            .await
            .with_context(|| format!("Error loading config file {}", path.display()))?;
        let content = String::from_utf8_lossy(&bytes);
        Self::parse(path, format, &content)
    }

    pub fn parse(path: &Path, format: ConfigFormat, content: &str) -> Result<Self> {
        match format {
            ConfigFormat::Yaml => {
                let data: Value = serde_yaml::from_str(content)
                    .with_context(|| format!("Invalid YAML format in {}", path.display()))?;
                let data = if data.is_null() {
                    Value::Mapping(Mapping::new())
                } else {
                    data
                };
                Ok(Self {
                    path: path.to_path_buf(),
                    format,
                    data,
                    comments: extract_yaml_comments(content),
                    properties: Properties::default(),
                })
            }
            ConfigFormat::Properties => {
                let properties = Properties::parse(content);
                let mut data = Mapping::new();
                let mut comments = HashMap::new();
                for (key, value, help) in properties.entries_with_comments() {
                    if !help.is_empty() {
                        comments.insert(key.clone(), help);
                    }
                    data.insert(Value::String(key), Value::String(value));
                }
                Ok(Self {
                    path: path.to_path_buf(),
                    format,
                    data: Value::Mapping(data),
                    comments,
                    properties,
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    /// Leaf values in document order. Properties keys are never split on dots.
    pub fn entries(&self) -> Vec<ConfigEntry> {
        match self.format {
            ConfigFormat::Properties => self
                .properties_pairs()
                .into_iter()
                .map(|(key, value)| ConfigEntry {
                    help: self.comments.get(&key).cloned().unwrap_or_default(),
                    key,
                    value,
                })
                .collect(),
            ConfigFormat::Yaml => {
                let mut flat = Vec::new();
                flatten(&self.data, "", &mut flat);
                flat.into_iter()
                    .map(|(key, name, value)| ConfigEntry {
                        help: self.comments.get(&name).cloned().unwrap_or_default(),
                        key,
                        value,
                    })
                    .collect()
            }
        }
    }

    fn properties_pairs(&self) -> Vec<(String, Value)> {
        self.data
            .as_mapping()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (key_string(k), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self.format {
            ConfigFormat::Properties => self.data.as_mapping()?.get(key),
            ConfigFormat::Yaml => {
                let parts: Vec<&str> = key.split('.').collect();
                get_nested(&self.data, &parts)
            }
        }
    }

    /// Sets `key` from user text, converted to the key's current type.
    /// Missing intermediate sections are created.
    pub fn set_from_text(&mut self, key: &str, text: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Configuration key cannot be empty");
        }

        match self.format {
            ConfigFormat::Properties => {
                if let Value::Mapping(map) = &mut self.data {
                    map.insert(Value::String(key.to_string()), Value::String(text.trim().to_string()));
                }
            }
            ConfigFormat::Yaml => {
                let value = convert_text(text, self.get(key));
                let parts: Vec<&str> = key.split('.').collect();
                set_nested(&mut self.data, &parts, value);
            }
        }
        Ok(())
    }

    pub fn render(&self) -> Result<String> {
        match self.format {
            ConfigFormat::Yaml => serde_yaml::to_string(&self.data).context("Failed to serialize YAML"),
            ConfigFormat::Properties => {
                let mut props = self.properties.clone();
                for (key, value) in self.properties_pairs() {
                    let text = display_value(&value);
                    if props.get(&key) != Some(text.as_str()) {
                        props.set(&key, &text);
                    }
                }
                Ok(props.render())
            }
        }
    }

    /// Writes the document back. YAML comments are not preserved.
    pub async fn save(&self) -> Result<()> {
        let content = self.render()?;
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("Error saving configuration {}", self.path.display()))?;
        tracing::info!("Configuration file {} saved", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAPER_YAML: &str = "\
# Paper settings
settings:
  # Seconds before a player is kicked
  timeout: 30
  ratio: 0.5
  enabled: true
  name: lobby
  worlds:
    - world
    - world_nether
";

    fn yaml_doc() -> ConfigDocument {
        ConfigDocument::parse(Path::new("paper.yml"), ConfigFormat::Yaml, PAPER_YAML).unwrap()
    }

    #[test]
    fn flattens_nested_keys_with_help() {
        let entries = yaml_doc().entries();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "settings.timeout",
                "settings.ratio",
                "settings.enabled",
                "settings.name",
                "settings.worlds"
            ]
        );
        assert_eq!(entries[0].help, "Seconds before a player is kicked");
        assert_eq!(entries[4].display_value(), "- world\n- world_nether");
    }

    #[test]
    fn set_converts_to_original_type() {
        let mut doc = yaml_doc();
        doc.set_from_text("settings.timeout", "45").unwrap();
        doc.set_from_text("settings.ratio", "0.75").unwrap();
        doc.set_from_text("settings.enabled", "off").unwrap();
        doc.set_from_text("settings.worlds", "- a\n- b\n- c").unwrap();

        assert_eq!(doc.get("settings.timeout"), Some(&Value::from(45)));
        assert_eq!(doc.get("settings.ratio"), Some(&Value::from(0.75)));
        assert_eq!(doc.get("settings.enabled"), Some(&Value::Bool(false)));
        assert_eq!(
            doc.get("settings.worlds").and_then(Value::as_sequence).map(|s| s.len()),
            Some(3)
        );
    }

    #[test]
    fn unparsable_number_is_kept_as_text() {
        let mut doc = yaml_doc();
        doc.set_from_text("settings.timeout", "soon").unwrap();
        assert_eq!(doc.get("settings.timeout"), Some(&Value::String("soon".into())));
    }

    #[test]
    fn set_creates_missing_sections() {
        let mut doc = yaml_doc();
        doc.set_from_text("messages.welcome.text", "hi").unwrap();
        assert_eq!(doc.get("messages.welcome.text"), Some(&Value::String("hi".into())));
        let rendered = doc.render().unwrap();
        assert!(rendered.contains("welcome:"));
    }

    #[test]
    fn list_text_falls_back_to_lines() {
        assert_eq!(
            parse_list("alpha\nbeta\n# skipped"),
            Value::Sequence(vec![Value::from("alpha"), Value::from("beta")])
        );
    }

    #[test]
    fn properties_keep_dotted_keys_and_comments() {
        let content = "#Minecraft server properties\nlevel-name=world\nquery.port=25565\nmotd=Hello\n";
        let mut doc =
            ConfigDocument::parse(Path::new("server.properties"), ConfigFormat::Properties, content).unwrap();

        let entries = doc.entries();
        assert_eq!(entries[1].key, "query.port");
        assert_eq!(entries[0].help, "Minecraft server properties");

        doc.set_from_text("query.port", "25570").unwrap();
        let rendered = doc.render().unwrap();
        assert_eq!(
            rendered,
            "#Minecraft server properties\nlevel-name=world\nquery.port=25570\nmotd=Hello\n"
        );
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        assert!(ConfigFormat::from_path(Path::new("ops.json")).is_err());
    }

    #[tokio::test]
    async fn lists_files_by_category() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("server.properties"), "motd=x\n").unwrap();
        std::fs::write(root.join("spigot.yml"), "a: 1\n").unwrap();
        std::fs::create_dir_all(root.join("config")).unwrap();
        std::fs::write(root.join("config/paper-global.yml"), "a: 1\n").unwrap();
        std::fs::create_dir_all(root.join("plugins/Essentials/settings")).unwrap();
        std::fs::write(root.join("plugins/loose.yml"), "a: 1\n").unwrap();
        std::fs::write(root.join("plugins/Essentials/config.yml"), "a: 1\n").unwrap();
        std::fs::write(root.join("plugins/Essentials/settings/kits.yml"), "a: 1\n").unwrap();
        std::fs::write(root.join("plugins/Essentials/readme.txt"), "x").unwrap();

        let files = list_config_files(root).await.unwrap();
        let summary: Vec<(String, String)> = files
            .iter()
            .map(|f| (f.category.clone(), f.display_name.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Properties".to_string(), "server.properties".to_string()),
                ("Server Config".to_string(), "spigot.yml".to_string()),
                ("Paper Config".to_string(), "paper-global.yml".to_string()),
                ("Plugin Configs".to_string(), "loose.yml".to_string()),
                ("Essentials Config".to_string(), "config.yml".to_string()),
                ("Essentials Config".to_string(), "settings/kits.yml".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn save_writes_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bukkit.yml");
        std::fs::write(&path, "settings:\n  allow-end: true\n").unwrap();

        let mut doc = ConfigDocument::load(&path).await.unwrap();
        doc.set_from_text("settings.allow-end", "no").unwrap();
        doc.save().await.unwrap();

        let reloaded: Value = serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reloaded["settings"]["allow-end"], Value::Bool(false));
    }
}
