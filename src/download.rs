use anyhow::{Context, Result, anyhow};
use directories::UserDirs;
use futures::{Stream, StreamExt};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::api::Format;

/// The configured directory, else the platform download folder, else the working directory.
pub fn resolve_download_dir(configured: Option<&Path>) -> PathBuf {
  if let Some(dir) = configured {
    return dir.to_path_buf();
  }
  UserDirs::new().and_then(|dirs| dirs.download_dir().map(Path::to_path_buf)).unwrap_or_else(|| PathBuf::from("."))
}

/// File name for a saved rendition: the title with path-hostile characters replaced.
pub fn file_name_for(title: &str, format: Format) -> String {
  let cleaned: String = title
    .chars()
    .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() { '_' } else { c })
    .collect();
  let cleaned = cleaned.trim().trim_matches('.');
  let stem = if cleaned.is_empty() { "download" } else { cleaned };
  let stem: String = stem.chars().take(120).collect();
  format!("{}.{}", stem, format.extension())
}

/// Pick a path in `dir` that does not exist yet, appending ` (n)` when needed.
fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
  let candidate = dir.join(file_name);
  if !candidate.exists() {
    return candidate;
  }
  let (stem, ext) = file_name.rsplit_once('.').unwrap_or((file_name, ""));
  (1..)
    .map(|n| if ext.is_empty() { dir.join(format!("{} ({})", stem, n)) } else { dir.join(format!("{} ({}).{}", stem, n, ext)) })
    .find(|p| !p.exists())
    .unwrap_or(candidate)
}

/// Stream `url` into `dir`, returning the written path.
pub async fn save_to(client: &Client, url: &str, dir: &Path, file_name: &str) -> Result<PathBuf> {
  tokio::fs::create_dir_all(dir).await.with_context(|| format!("Failed to create {}", dir.display()))?;
  let response = client.get(url).send().await.context("Download request failed")?;
  if !response.status().is_success() {
    return Err(anyhow!("Download failed: HTTP {}", response.status()));
  }

  let path = unique_path(dir, file_name);
  let written = write_to(response.bytes_stream(), &path).await?;
  info!(path = %path.display(), bytes = written, "download: saved");
  Ok(path)
}

fn partial_path(path: &Path) -> PathBuf {
  let mut partial = path.to_path_buf().into_os_string();
  partial.push(".part");
  PathBuf::from(partial)
}

/// Write `stream` to `<path>.part` and move it into place. The partial file never outlives an error.
async fn write_to<S, B, E>(stream: S, path: &Path) -> Result<u64>
where
  S: Stream<Item = std::result::Result<B, E>>,
  B: AsRef<[u8]>,
  E: std::error::Error + Send + Sync + 'static,
{
  let partial = partial_path(path);
  let result = write_partial(stream, &partial, path).await;
  if result.is_err() {
    let _ = tokio::fs::remove_file(&partial).await;
  }
  result
}

async fn write_partial<S, B, E>(stream: S, partial: &Path, path: &Path) -> Result<u64>
where
  S: Stream<Item = std::result::Result<B, E>>,
  B: AsRef<[u8]>,
  E: std::error::Error + Send + Sync + 'static,
{
  let mut file =
    tokio::fs::File::create(partial).await.with_context(|| format!("Failed to create {}", partial.display()))?;
  let mut stream = std::pin::pin!(stream);
  let mut written: u64 = 0;
  while let Some(chunk) = stream.next().await {
    let chunk = chunk.context("Download interrupted")?;
    file.write_all(chunk.as_ref()).await.context("Failed to write download")?;
    written += chunk.as_ref().len() as u64;
  }
  file.flush().await.context("Failed to flush download")?;
  drop(file);
  tokio::fs::rename(partial, path).await.with_context(|| format!("Failed to move file into {}", path.display()))?;
  Ok(written)
}
