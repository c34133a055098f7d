use anyhow::{Context, Result, anyhow};
use std::process::Stdio;
use tokio::{
  io::AsyncBufReadExt,
  io::BufReader as TokioBufReader,
  process::{Child as TokioChild, Command},
  sync::mpsc,
  task::JoinHandle,
};
use tracing::info;

use crate::api::JobResult;

/// What the player overlay is showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
  pub title: String,
  pub url: String,
  pub channel: Option<String>,
  pub duration: Option<String>,
}

impl NowPlaying {
  pub fn from_result(result: &JobResult, fallback_title: &str) -> Self {
    Self {
      title: result.title.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| fallback_title.to_string()),
      url: result.download_url.clone(),
      channel: result.channel.clone(),
      duration: result.duration.clone(),
    }
  }
}

/// Drives an external mpv process for the player overlay.
pub struct Player {
  binary: String,
  current_process: Option<TokioChild>,
  pub now_playing: Option<NowPlaying>,
  monitor_handle: Option<JoinHandle<()>>,
  status_rx: Option<mpsc::Receiver<String>>,
  last_status: Option<String>,
  ipc_socket_path: Option<String>,
  pub paused: bool,
}

impl Player {
  pub fn new(binary: impl Into<String>) -> Self {
    Self {
      binary: binary.into(),
      current_process: None,
      now_playing: None,
      monitor_handle: None,
      status_rx: None,
      last_status: None,
      ipc_socket_path: None,
      paused: false,
    }
  }

  pub fn is_open(&self) -> bool {
    self.now_playing.is_some()
  }

  pub fn is_playing(&self) -> bool {
    self.current_process.is_some()
  }

  pub fn check_status(&mut self) {
    if let Some(rx) = &mut self.status_rx {
      while let Ok(status) = rx.try_recv() {
        self.last_status = Some(status);
      }
    }
  }

  pub fn last_status(&self) -> Option<&str> {
    self.last_status.as_deref()
  }

  pub async fn play(&mut self, item: NowPlaying) -> Result<()> {
    self.stop().await.context("Failed to stop previous playback")?;
    info!(title = %item.title, "player: starting");
    let url = item.url.clone();
    self.now_playing = Some(item);
    self.paused = false;

    let socket_path = std::env::temp_dir().join(format!("uyatube-mpv-{}.sock", std::process::id()));
    let socket_path_str = socket_path.to_str().context("Temp dir path is not valid UTF-8")?.to_string();
    // Remove stale socket if it exists from a previous crash.
    let _ = std::fs::remove_file(&socket_path);

    let mut cmd = Command::new(&self.binary);
    cmd.args([
      "--force-window=yes",
      "--term-status-msg=Time: ${time-pos/full} / ${duration/full} | ${pause} ${percent-pos}%",
      &format!("--input-ipc-server={}", socket_path_str),
      &url,
    ]);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    // Send stderr to null; a piped but undrained stderr blocks mpv.
    cmd.stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| {
      if e.kind() == std::io::ErrorKind::NotFound {
        anyhow!("{} not found. Install mpv (brew install mpv / apt install mpv) or set `player` in the config", self.binary)
      } else {
        anyhow!(e).context("Failed to spawn player process")
      }
    })?;

    let stdout = child.stdout.take().context("Failed to get player stdout")?;
    let (tx, rx) = mpsc::channel::<String>(10);
    self.status_rx = Some(rx);

    let monitor_handle = tokio::spawn(async move {
      let reader = TokioBufReader::new(stdout);
      let mut lines = reader.lines();
      while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
          break;
        }
      }
    });

    self.current_process = Some(child);
    self.monitor_handle = Some(monitor_handle);
    self.ipc_socket_path = Some(socket_path_str);
    Ok(())
  }

  pub async fn toggle_pause(&mut self) -> Result<()> {
    let Some(ref socket_path) = self.ipc_socket_path else {
      return Ok(());
    };
    let stream = tokio::net::UnixStream::connect(socket_path).await.context("Failed to connect to mpv IPC socket")?;
    stream.writable().await.context("mpv IPC socket not writable")?;
    let cmd = b"{\"command\":[\"cycle\",\"pause\"]}\n";
    let written = stream.try_write(cmd).context("Failed to send pause command to mpv")?;
    if written < cmd.len() {
      return Err(anyhow!("Partial write to mpv IPC socket: wrote {} of {} bytes", written, cmd.len()));
    }
    self.paused = !self.paused;
    Ok(())
  }

  /// Stop playback and close the overlay.
  pub async fn stop(&mut self) -> Result<()> {
    if let Some(handle) = self.monitor_handle.take() {
      handle.abort();
      let _ = handle.await;
    }
    self.status_rx = None;
    self.last_status = None;

    if let Some(mut child) = self.current_process.take() {
      // mpv may already have exited on its own (window closed, end of file).
      let _ = child.kill().await;
      let _ = child.wait().await;
    }

    self.now_playing = None;
    self.paused = false;

    if let Some(path) = self.ipc_socket_path.take() {
      let _ = std::fs::remove_file(&path);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn now_playing_prefers_provider_title() {
    let result = JobResult { download_url: "u".into(), title: Some("Provider".into()), ..Default::default() };
    assert_eq!(NowPlaying::from_result(&result, "Listing").title, "Provider");

    let untitled = JobResult { download_url: "u".into(), title: Some(String::new()), ..Default::default() };
    assert_eq!(NowPlaying::from_result(&untitled, "Listing").title, "Listing");
  }

  #[tokio::test]
  async fn missing_binary_reports_install_hint() {
    let mut player = Player::new("uyatube-definitely-not-a-player");
    let item = NowPlaying { title: "t".into(), url: "u".into(), channel: None, duration: None };
    let err = player.play(item).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
    assert!(!player.is_playing());
  }
}
