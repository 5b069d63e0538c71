use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_OP_LEVEL: i64 = 4;
pub const DEFAULT_BAN_REASON: &str = "Banned";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerList {
    Whitelist,
    Operators,
    Banned,
}

impl PlayerList {
    pub fn file_name(&self) -> &'static str {
        match self {
            PlayerList::Whitelist => "whitelist.json",
            PlayerList::Operators => "ops.json",
            PlayerList::Banned => "banned-players.json",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlayerList::Whitelist => "whitelist",
            PlayerList::Operators => "operators",
            PlayerList::Banned => "banned players",
        }
    }
}

/// One entry of a player list file. Fields the server writes itself
/// (uuid, created, source, expires, ...) ride along in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerListEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PlayerListEntry {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            level: None,
            reason: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Whitelist, operator and ban files of one server directory.
#[derive(Debug, Clone)]
pub struct PlayerRegistry {
    server_path: PathBuf,
}

impl PlayerRegistry {
    pub fn new(server_path: impl Into<PathBuf>) -> Self {
        Self {
            server_path: server_path.into(),
        }
    }

    fn file_path(&self, list: PlayerList) -> PathBuf {
        self.server_path.join(list.file_name())
    }

    pub async fn entries(&self, list: PlayerList) -> Result<Vec<PlayerListEntry>> {
        let path = self.file_path(list);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).with_context(|| format!("Invalid player list {}", path.display()))
    }

    pub async fn names(&self, list: PlayerList) -> Result<Vec<String>> {
        Ok(self
            .entries(list)
            .await?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    async fn write(&self, list: PlayerList, entries: &[PlayerListEntry]) -> Result<()> {
        let path = self.file_path(list);
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Adds with the list's defaults (operator level 4, ban reason "Banned").
    pub async fn add(&self, list: PlayerList, name: &str) -> Result<bool> {
        let mut entry = PlayerListEntry::named(name);
        match list {
            PlayerList::Operators => entry.level = Some(DEFAULT_OP_LEVEL),
            PlayerList::Banned => entry.reason = Some(DEFAULT_BAN_REASON.to_string()),
            PlayerList::Whitelist => {}
        }
        self.add_entry(list, entry).await
    }

    pub async fn add_operator(&self, name: &str, level: i64) -> Result<bool> {
        let mut entry = PlayerListEntry::named(name);
        entry.level = Some(level);
        self.add_entry(PlayerList::Operators, entry).await
    }

    pub async fn ban(&self, name: &str, reason: &str) -> Result<bool> {
        let mut entry = PlayerListEntry::named(name);
        entry.reason = Some(reason.to_string());
        self.add_entry(PlayerList::Banned, entry).await
    }

    /// Returns false when the name is already listed.
    async fn add_entry(&self, list: PlayerList, mut entry: PlayerListEntry) -> Result<bool> {
        let name = entry.name.trim().to_string();
        if name.is_empty() {
            anyhow::bail!("Player name cannot be empty");
        }
        entry.name = name.clone();

        let mut entries = self.entries(list).await?;
        if entries.iter().any(|e| e.name.eq_ignore_ascii_case(&name)) {
            return Ok(false);
        }
        entries.push(entry);
        self.write(list, &entries).await?;
        tracing::info!("Added {} to {}", name, list.label());
        Ok(true)
    }

    /// Returns false when the name was not listed.
    pub async fn remove(&self, list: PlayerList, name: &str) -> Result<bool> {
        let mut entries = self.entries(list).await?;
        let before = entries.len();
        entries.retain(|e| !e.name.eq_ignore_ascii_case(name.trim()));
        if entries.len() == before {
            return Ok(false);
        }
        self.write(list, &entries).await?;
        tracing::info!("Removed {} from {}", name, list.label());
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Joined(String),
    Left(String),
}

fn is_player_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 16
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Recognises `<name> joined the game` / `<name> left the game` console lines.
pub fn parse_player_event(line: &str) -> Option<PlayerEvent> {
    let message = line
        .split_once("]: ")
        .map(|(_, message)| message)
        .unwrap_or(line)
        .trim();

    if let Some(name) = message.strip_suffix(" joined the game") {
        return is_player_name(name).then(|| PlayerEvent::Joined(name.to_string()));
    }
    if let Some(name) = message.strip_suffix(" left the game") {
        return is_player_name(name).then(|| PlayerEvent::Left(name.to_string()));
    }
    None
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnlinePlayers {
    names: Vec<String>,
}

impl OnlinePlayers {
    /// Returns true when the list changed.
    pub fn apply(&mut self, event: &PlayerEvent) -> bool {
        match event {
            PlayerEvent::Joined(name) => {
                if self.names.iter().any(|n| n == name) {
                    return false;
                }
                self.names.push(name.clone());
                true
            }
            PlayerEvent::Left(name) => {
                let before = self.names.len();
                self.names.retain(|n| n != name);
                self.names.len() != before
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.names.clone()
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }
}

/// Online players reconstructed from a server's `logs/latest.log`.
pub async fn online_from_log(server_path: &Path) -> Result<Vec<String>> {
    let log_path = server_path.join("logs").join("latest.log");
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let bytes = fs::read(&log_path).await?;
    let content = String::from_utf8_lossy(&bytes);
    let mut online = OnlinePlayers::default();
    for line in content.lines() {
        if let Some(event) = parse_player_event(line) {
            online.apply(&event);
        }
    }
    Ok(online.names())
}
