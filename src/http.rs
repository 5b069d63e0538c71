use crate::config::AppSettings;
use crate::events::{AppEvent, EventSink};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Client for short JSON API calls.
pub fn api_client(settings: &AppSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(Duration::from_secs(settings.http_timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

/// Client for file transfers; only the connect phase uses the API timeout.
pub fn download_client(settings: &AppSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .connect_timeout(Duration::from_secs(settings.http_timeout_secs))
        .timeout(Duration::from_secs(settings.download_timeout_secs))
        .build()
        .context("Failed to build download client")
}

/// `base` with each segment appended, percent-encoded.
pub fn endpoint(base: &str, segments: &[&str]) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base).with_context(|| format!("Invalid API base URL {}", base))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("API base URL {} cannot take a path", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder, what: &str) -> Result<T> {
    let resp = request
        .send()
        .await
        .with_context(|| format!("Request for {} failed", what))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        tracing::warn!("{} API error: {} - body: {}", what, status, text);
        anyhow::bail!("{} API failed with status {}", what, status);
    }

    let text = resp.text().await?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {} JSON", what))
}

/// Streams `url` into `target`, emitting progress as chunks arrive.
/// Data lands in a `.part` file first and is renamed once complete.
pub async fn download_to_file(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
    events: &EventSink,
) -> Result<u64> {
    let label = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| url.to_string());

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !resp.status().is_success() {
        anyhow::bail!("Download of {} failed with status {}", label, resp.status());
    }

    let total = resp.content_length();
    let part_path = target.with_extension(match target.extension() {
        Some(ext) => format!("{}.part", ext.to_string_lossy()),
        None => "part".to_string(),
    });

    let mut file = fs::File::create(&part_path)
        .await
        .with_context(|| format!("Failed to create {}", part_path.display()))?;
    let mut downloaded = 0u64;

    let result: Result<()> = async {
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            events.emit(AppEvent::DownloadProgress {
                file: label.clone(),
                downloaded,
                total,
            });
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    drop(file);
    if let Err(e) = result {
        let _ = fs::remove_file(&part_path).await;
        return Err(e.context(format!("Download of {} interrupted", label)));
    }

    fs::rename(&part_path, target)
        .await
        .with_context(|| format!("Failed to move download into {}", target.display()))?;

    tracing::info!("Downloaded {} ({} bytes)", label, downloaded);
    Ok(downloaded)
}
