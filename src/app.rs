use anyhow::Result;
use ratatui::widgets::ListState;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::api::{Format, VideoApi};
use crate::constants::constants;
use crate::download::{file_name_for, save_to};
use crate::history::{History, HistoryEntry};
use crate::job::{CardEffect, Effect, JobBoard, JobController, JobState};
use crate::player::{NowPlaying, Player};
use crate::search::{SearchProgress, SearchSession};
use crate::storage::{Persisted, Store};
use crate::theme::{Theme, ThemeMode};

pub const THEME_KEY: &str = "theme";

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
  Input,
  Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modal {
  History,
  Settings,
}

/// Paths and binaries the presentation layer needs, resolved at startup.
pub struct AppSettings {
  pub player: String,
  pub download_dir: PathBuf,
  pub config_path: Option<PathBuf>,
  pub log_dir: Option<PathBuf>,
}

pub struct App {
  pub input: String,
  pub cursor_position: usize,
  pub input_scroll: usize,
  pub mode: AppMode,
  pub theme: Persisted<ThemeMode>,
  pub history: History,
  pub search: SearchSession,
  pub board: JobBoard,
  pub list_state: ListState,
  /// Card whose MP4/MP3 picker is open.
  pub expanded: Option<usize>,
  pub player: Player,
  pub modal: Option<Modal>,
  pub history_state: ListState,
  pub last_error: Option<String>,
  pub status_message: Option<String>,
  /// Informational message, lower priority than status/error.
  pub info_message: Option<String>,
  pub should_quit: bool,
  pub settings: AppSettings,
  pub started_at: Instant,
  api: Arc<dyn VideoApi>,
  http: Client,
  save_rx: Option<oneshot::Receiver<Result<PathBuf>>>,
  /// When the last error was set, used for auto-dismiss.
  error_time: Option<Instant>,
}

impl App {
  pub fn new(api: Arc<dyn VideoApi>, http: Client, store: Store, settings: AppSettings) -> Self {
    let theme = Persisted::load(store.clone(), THEME_KEY, ThemeMode::default());
    let history = History::load(store);
    let board = JobBoard::new(api.clone(), constants().poll_interval());

    Self {
      input: String::new(),
      cursor_position: 0,
      input_scroll: 0,
      mode: AppMode::Input,
      theme,
      history,
      search: SearchSession::default(),
      board,
      list_state: ListState::default(),
      expanded: None,
      player: Player::new(settings.player.clone()),
      modal: None,
      history_state: ListState::default(),
      last_error: None,
      status_message: None,
      info_message: None,
      should_quit: false,
      settings,
      started_at: Instant::now(),
      api,
      http,
      save_rx: None,
      error_time: None,
    }
  }

  pub fn theme(&self) -> &'static Theme {
    self.theme.get().palette()
  }

  pub fn toggle_theme(&mut self) {
    let next = self.theme.get().toggled();
    info!(theme = next.palette().name, "theme changed");
    self.theme.set(next);
  }

  /// Set an error message with auto-dismiss tracking.
  pub fn set_error(&mut self, msg: String) {
    self.last_error = Some(msg);
    self.error_time = Some(Instant::now());
  }

  pub fn clear_error(&mut self) {
    self.last_error = None;
    self.error_time = None;
  }

  /// Clear stale error messages after a few seconds.
  pub fn expire_error(&mut self) {
    if let Some(t) = self.error_time
      && t.elapsed() >= Duration::from_secs(constants().error_dismiss_secs)
    {
      self.last_error = None;
      self.error_time = None;
    }
  }

  pub fn spinner(&self) -> &'static str {
    let tick = (self.started_at.elapsed().as_millis() / 100) as usize;
    SPINNER[tick % SPINNER.len()]
  }

  pub fn selected_card(&self) -> Option<&JobController> {
    self.list_state.selected().and_then(|i| self.board.cards().get(i))
  }

  // --- Search ---

  pub fn trigger_search(&mut self) {
    self.info_message = None;
    if !self.search.begin(&self.input, self.api.clone()) {
      return;
    }
    self.board.clear();
    self.expanded = None;
    self.list_state.select(None);
  }

  /// Replace the query with pasted text, newlines folded to spaces.
  pub fn paste(&mut self, text: &str) {
    self.input = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect::<Vec<_>>().join(" ");
    self.cursor_position = self.input.chars().count();
    self.mode = AppMode::Input;
  }

  // --- Card actions ---

  pub fn watch(&mut self, index: usize) {
    self.expanded = None;
    self.board.submit(index, Format::Watch);
  }

  /// Open or close the MP4/MP3 picker on a card that can take a new job.
  pub fn toggle_formats(&mut self, index: usize) {
    let Some(card) = self.board.cards().get(index) else { return };
    if matches!(card.state(), JobState::Pending { .. } | JobState::Completed { .. }) {
      return;
    }
    self.expanded = if self.expanded == Some(index) { None } else { Some(index) };
  }

  pub fn convert(&mut self, index: usize, format: Format) {
    if self.expanded != Some(index) {
      return;
    }
    self.expanded = None;
    self.board.submit(index, format);
  }

  pub async fn play_completed(&mut self, index: usize) {
    let Some(card) = self.board.cards().get(index) else { return };
    let Some(result) = card.state().result() else { return };
    let item = NowPlaying::from_result(result, &card.video.title);
    self.open_player(item).await;
  }

  pub fn save_completed(&mut self, index: usize) {
    let Some(card) = self.board.cards().get(index) else { return };
    let JobState::Completed { format, result } = card.state() else { return };
    if self.save_rx.is_some() {
      self.info_message = Some("A save is already running.".to_string());
      return;
    }
    let title = result.title.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| card.video.title.clone());
    let file_name = file_name_for(&title, *format);
    let url = result.download_url.clone();
    let dir = self.settings.download_dir.clone();
    let client = self.http.clone();
    info!(video_id = %card.video.id, file = %file_name, "save triggered");

    self.clear_error();
    self.status_message = Some(format!("Saving '{}'…", file_name));
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(save_to(&client, &url, &dir, &file_name).await);
    });
    self.save_rx = Some(rx);
  }

  // --- Overlays ---

  pub async fn open_player(&mut self, item: NowPlaying) {
    if let Err(e) = self.player.play(item).await {
      error!(err = %e, "player failed to start");
      self.set_error(format!("Playback error: {:#}", e));
      let _ = self.player.stop().await;
    }
  }

  pub async fn close_player(&mut self) {
    if let Err(e) = self.player.stop().await {
      self.set_error(format!("Failed to stop playback: {:#}", e));
    }
  }

  pub fn open_modal(&mut self, modal: Modal) {
    self.modal = Some(modal);
    if modal == Modal::History {
      self.history_state.select(if self.history.is_empty() { None } else { Some(0) });
    }
  }

  pub fn close_modal(&mut self) {
    self.modal = None;
  }

  pub fn clear_history(&mut self) {
    self.history.clear();
    self.history_state.select(None);
  }

  // --- Background work ---

  pub async fn check_pending(&mut self) -> Result<()> {
    if self.search.check() == SearchProgress::Finished {
      self.board.replace(self.search.results.clone());
      self.expanded = None;
      if self.board.is_empty() {
        self.list_state.select(None);
        if self.search.error.is_none() {
          self.info_message = Some("No results found.".to_string());
        }
      } else {
        self.list_state.select(Some(0));
        self.mode = AppMode::Results;
      }
    }

    for CardEffect { video, effect } in self.board.drain() {
      match effect {
        Effect::Play(result) => {
          let item = NowPlaying::from_result(&result, &video.title);
          self.open_player(item).await;
        }
        Effect::Record { format, result } => {
          self.history.record(HistoryEntry::new(&video, format, &result));
        }
      }
    }

    if let Some(mut rx) = self.save_rx.take() {
      match rx.try_recv() {
        Ok(result) => {
          self.status_message = None;
          match result {
            Ok(path) => self.info_message = Some(format!("Saved to {}", path.display())),
            Err(e) => self.set_error(format!("Save failed: {:#}", e)),
          }
        }
        Err(oneshot::error::TryRecvError::Empty) => {
          self.save_rx = Some(rx);
        }
        Err(oneshot::error::TryRecvError::Closed) => {
          self.status_message = None;
          self.set_error("Save task failed.".to_string());
        }
      }
    }

    self.player.check_status();
    self.expire_error();
    Ok(())
  }

  /// Stop everything that outlives a frame: polls and the player.
  pub async fn shutdown(&mut self) -> Result<()> {
    self.board.clear();
    self.player.stop().await
  }
}
