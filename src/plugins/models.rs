use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where an installed JAR came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstallMethod {
    #[default]
    Manual,
    Modrinth,
    Spigot,
    CurseForge,
}

impl InstallMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallMethod::Manual => "Manual",
            InstallMethod::Modrinth => "Modrinth",
            InstallMethod::Spigot => "Spigot",
            InstallMethod::CurseForge => "CurseForge",
        }
    }

    /// Case-insensitive; anything unrecognised counts as a manual install.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "modrinth" => InstallMethod::Modrinth,
            "spigot" | "spiget" | "spigotmc" => InstallMethod::Spigot,
            "curseforge" | "curse" => InstallMethod::CurseForge,
            _ => InstallMethod::Manual,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            InstallMethod::Modrinth => "🌐 Modrinth",
            InstallMethod::Spigot => "🔌 Spigot",
            InstallMethod::CurseForge => "🔥 CurseForge",
            InstallMethod::Manual => "📁 Manual",
        }
    }
}

impl From<String> for InstallMethod {
    fn from(value: String) -> Self {
        InstallMethod::from_label(&value)
    }
}

impl From<InstallMethod> for String {
    fn from(value: InstallMethod) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    #[default]
    Plugin,
    Mod,
}

impl PluginKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            PluginKind::Plugin => "plugins",
            PluginKind::Mod => "mods",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginKind::Plugin => write!(f, "plugin"),
            PluginKind::Mod => write!(f, "mod"),
        }
    }
}

/// Remote registries plugins can be searched and installed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PluginSource {
    Modrinth,
    Spigot,
    CurseForge,
}

impl PluginSource {
    pub fn install_method(&self) -> InstallMethod {
        match self {
            PluginSource::Modrinth => InstallMethod::Modrinth,
            PluginSource::Spigot => InstallMethod::Spigot,
            PluginSource::CurseForge => InstallMethod::CurseForge,
        }
    }
}

impl FromStr for PluginSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modrinth" | "mr" => Ok(PluginSource::Modrinth),
            "spigot" | "spiget" => Ok(PluginSource::Spigot),
            "curseforge" | "cf" => Ok(PluginSource::CurseForge),
            other => Err(anyhow::anyhow!("Unknown source: {}", other)),
        }
    }
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.install_method().as_str())
    }
}

/// A JAR found in a server's `plugins/` or `mods/` directory.
#[derive(Debug, Clone, Serialize)]
pub struct Plugin {
    pub name: String,
    pub file_path: PathBuf,
    pub kind: PluginKind,
    pub version: String,
    pub install_method: InstallMethod,
    pub project_id: Option<String>,
    pub installed_at: Option<String>,
}

impl Plugin {
    pub fn install_method_display(&self) -> &'static str {
        self.install_method.display()
    }

    pub fn file_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}.jar", self.name))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginSearchResult {
    pub id: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub source: PluginSource,
    pub kind: PluginKind,
    /// Newest supported game version, when the registry reports one.
    pub game_version: Option<String>,
    pub downloads: u64,
    pub icon_url: Option<String>,
    pub external_url: String,
}

/// Narrows which remote version gets installed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallFilter {
    pub loader: Option<String>,
    pub game_version: Option<String>,
}

/// The file picked for installation from a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub url: String,
    pub file_name: String,
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_method_serializes_capitalized() {
        for (input, expected) in [
            ("modrinth", "\"Modrinth\""),
            ("curseforge", "\"CurseForge\""),
            ("SPIGOT", "\"Spigot\""),
            ("manual", "\"Manual\""),
        ] {
            let method = InstallMethod::from_label(input);
            assert_eq!(serde_json::to_string(&method).unwrap(), expected);
        }
    }

    #[test]
    fn unknown_install_method_reads_as_manual() {
        let method: InstallMethod = serde_json::from_str("\"Local\"").unwrap();
        assert_eq!(method, InstallMethod::Manual);
    }

    #[test]
    fn display_strings() {
        let plugin = Plugin {
            name: "TestPlugin".to_string(),
            file_path: PathBuf::from("plugins/TestPlugin.jar"),
            kind: PluginKind::Plugin,
            version: "Unknown".to_string(),
            install_method: InstallMethod::Modrinth,
            project_id: None,
            installed_at: None,
        };
        assert_eq!(plugin.install_method_display(), "🌐 Modrinth");
        assert_eq!(InstallMethod::Spigot.display(), "🔌 Spigot");
        assert_eq!(InstallMethod::CurseForge.display(), "🔥 CurseForge");
        assert_eq!(InstallMethod::Manual.display(), "📁 Manual");
    }

    #[test]
    fn parses_source_names() {
        assert_eq!("Modrinth".parse::<PluginSource>().unwrap(), PluginSource::Modrinth);
        assert_eq!("spiget".parse::<PluginSource>().unwrap(), PluginSource::Spigot);
        assert_eq!("cf".parse::<PluginSource>().unwrap(), PluginSource::CurseForge);
        assert!("hangar".parse::<PluginSource>().is_err());
    }
}
