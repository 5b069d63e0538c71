use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

pub const SERVER_PROPERTIES: &str = "server.properties";

/// A `key=value` file kept as its original lines so rewrites leave comments,
/// blank lines and ordering untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    lines: Vec<String>,
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

impl Properties {
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.lines().map(str::to_string).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines
            .iter()
            .filter_map(|line| split_entry(line))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.lines
            .iter()
            .filter_map(|line| split_entry(line))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Entries paired with the comment block directly above them.
    pub fn entries_with_comments(&self) -> Vec<(String, String, String)> {
        let mut out = Vec::new();
        let mut comment: Vec<String> = Vec::new();

        for line in &self.lines {
            let trimmed = line.trim();
            if let Some(text) = trimmed.strip_prefix('#') {
                comment.push(text.trim().to_string());
            } else if let Some((k, v)) = split_entry(line) {
                out.push((k.to_string(), v.to_string(), comment.join("\n")));
                comment.clear();
            } else {
                comment.clear();
            }
        }
        out
    }

    /// Replaces every line holding `key`, or appends one if none does.
    pub fn set(&mut self, key: &str, value: &str) {
        let mut found = false;
        for line in self.lines.iter_mut() {
            if matches!(split_entry(line), Some((k, _)) if k == key) {
                *line = format!("{}={}", key, value);
                found = true;
            }
        }
        if !found {
            self.lines.push(format!("{}={}", key, value));
        }
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Missing file reads as empty.
pub async fn read(server_path: &Path) -> Result<Properties> {
    let props_path = server_path.join(SERVER_PROPERTIES);
    if !props_path.exists() {
        return Ok(Properties::default());
    }
    let content = fs::read_to_string(&props_path)
        .await
        .with_context(|| format!("Failed to read {}", props_path.display()))?;
    Ok(Properties::parse(&content))
}

pub async fn update(server_path: &Path, updates: &[(&str, &str)]) -> Result<()> {
    let mut props = read(server_path).await?;
    for (key, value) in updates {
        props.set(key, value);
    }
    let props_path = server_path.join(SERVER_PROPERTIES);
    fs::write(&props_path, props.render())
        .await
        .with_context(|| format!("Failed to write {}", props_path.display()))?;
    Ok(())
}
