use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const APP_DIR_NAME: &str = "MinecraftServerManager";
pub const SERVERS_FILE: &str = "servers.json";
pub const SETTINGS_FILE: &str = "settings.json";

/// Overrides the directory holding `servers.json` and `settings.json`.
pub const CONFIG_DIR_ENV: &str = "MSM_CONFIG_DIR";
pub const CURSEFORGE_API_KEY_ENV: &str = "CURSEFORGE_API_KEY";

pub const DEFAULT_JAVA_MEMORY: &str = "1024M";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiEndpoints {
    pub paper: String,
    pub modrinth: String,
    pub spiget: String,
    pub curseforge: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            paper: "https://api.papermc.io/v2".to_string(),
            modrinth: "https://api.modrinth.com/v2".to_string(),
            spiget: "https://api.spiget.org/v2".to_string(),
            curseforge: "https://api.curseforge.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Explicit java executable. Falls back to `JAVA_HOME`, then `java` on PATH.
    pub java_path: Option<PathBuf>,
    pub default_memory: String,
    pub http_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub restart_timeout_secs: u64,
    pub user_agent: String,
    pub endpoints: ApiEndpoints,
    #[serde(skip)]
    pub curseforge_api_key: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            java_path: None,
            default_memory: DEFAULT_JAVA_MEMORY.to_string(),
            http_timeout_secs: 15,
            download_timeout_secs: 600,
            restart_timeout_secs: 60,
            user_agent: format!("MinecraftServerManager/{}", env!("CARGO_PKG_VERSION")),
            endpoints: ApiEndpoints::default(),
            curseforge_api_key: None,
        }
    }
}

impl AppSettings {
    pub fn config_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    pub fn servers_path(config_dir: &Path) -> PathBuf {
        config_dir.join(SERVERS_FILE)
    }

    pub fn settings_path(config_dir: &Path) -> PathBuf {
        config_dir.join(SETTINGS_FILE)
    }

    /// Missing file yields defaults. Environment overrides are applied either way.
    pub async fn load(settings_path: &Path) -> Result<Self> {
        let mut settings = if settings_path.exists() {
            let content = fs::read_to_string(settings_path)
                .await
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str::<AppSettings>(&content)
                .with_context(|| format!("Invalid settings file {}", settings_path.display()))?
        } else {
            Self::default()
        };
        settings.apply_env();
        Ok(settings)
    }

    pub async fn save(&self, settings_path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = settings_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(settings_path, content).await?;
        Ok(())
    }

    fn apply_env(&mut self) {
        self.curseforge_api_key = std::env::var(CURSEFORGE_API_KEY_ENV)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
    }

    pub fn java_command(&self) -> PathBuf {
        if let Some(path) = &self.java_path {
            return path.clone();
        }

        std::env::var("JAVA_HOME")
            .ok()
            .map(|java_home| {
                let exe = if cfg!(target_os = "windows") {
                    "java.exe"
                } else {
                    "java"
                };
                PathBuf::from(java_home).join("bin").join(exe)
            })
            .filter(|path| path.exists())
            .unwrap_or_else(|| PathBuf::from("java"))
    }
}
