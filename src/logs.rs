use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const LOGS_DIR: &str = "logs";
pub const LATEST_LOG: &str = "latest.log";

pub fn logs_dir(server_path: &Path) -> PathBuf {
    server_path.join(LOGS_DIR)
}

fn is_log_file(name: &str) -> bool {
    name.ends_with(".log") || name.ends_with(".log.gz")
}

/// `.log` and `.log.gz` files under `logs/`, sorted by name.
pub async fn log_files(server_path: &Path) -> Result<Vec<PathBuf>> {
    let dir = logs_dir(server_path);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut entries = fs::read_dir(&dir)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if is_log_file(&name) && entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Whole log as text. Gzipped rotations are inflated; invalid UTF-8 is replaced.
pub async fn read_log(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_gz = path
        .file_name()
        .map(|n| n.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false);

    if !is_gz {
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }

    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut decoder = GzDecoder::new(bytes.as_slice());
        let mut inflated = Vec::new();
        decoder
            .read_to_end(&mut inflated)
            .with_context(|| format!("Failed to decompress {}", display))?;
        Ok(String::from_utf8_lossy(&inflated).into_owned())
    })
    .await?
}

/// Last `lines` lines of `logs/latest.log`; empty when the server never ran.
pub async fn tail(server_path: &Path, lines: usize) -> Result<Vec<String>> {
    let log_path = logs_dir(server_path).join(LATEST_LOG);
    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = read_log(&log_path).await?;
    let all_lines: Vec<&str> = content.lines().collect();
    let start = all_lines.len().saturating_sub(lines);
    Ok(all_lines[start..].iter().map(|s| s.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[tokio::test]
    async fn lists_only_log_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::write(logs.join("latest.log"), "x").unwrap();
        std::fs::write(logs.join("2024-01-02-1.log.gz"), "x").unwrap();
        std::fs::write(logs.join("debug.txt"), "x").unwrap();

        let files = log_files(dir.path()).await.unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["2024-01-02-1.log.gz", "latest.log"]);
    }

    #[tokio::test]
    async fn no_logs_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(log_files(dir.path()).await.unwrap().is_empty());
        assert!(tail(dir.path(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_gzipped_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.log.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"[10:00:00] Starting minecraft server\n").unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let text = read_log(&path).await.unwrap();
        assert_eq!(text, "[10:00:00] Starting minecraft server\n");
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.log");
        std::fs::write(&path, b"ok \xff line\n").unwrap();
        assert_eq!(read_log(&path).await.unwrap(), "ok \u{FFFD} line\n");
    }

    #[tokio::test]
    async fn tail_returns_last_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        std::fs::write(dir.path().join("logs").join("latest.log"), "a\nb\nc\nd\n").unwrap();

        assert_eq!(tail(dir.path(), 2).await.unwrap(), vec!["c", "d"]);
        assert_eq!(tail(dir.path(), 10).await.unwrap().len(), 4);
    }
}
