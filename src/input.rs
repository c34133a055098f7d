use anyhow::Result;
use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

use crate::api::Format;
use crate::app::{App, AppMode, Modal};
use crate::job::JobState;

// --- Helpers ---

/// Convert a char index to a byte offset within the string.
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
  s.char_indices().nth(char_idx).map_or(s.len(), |(i, _)| i)
}

fn step(current: Option<usize>, count: usize, forward: bool) -> Option<usize> {
  if count == 0 {
    return None;
  }
  Some(match (current, forward) {
    (None, _) => 0,
    (Some(i), true) => (i + 1) % count,
    (Some(0), false) => count - 1,
    (Some(i), false) => i - 1,
  })
}

// --- Event Handling ---

pub async fn handle_key_event(app: &mut App, key: event::KeyEvent) -> Result<()> {
  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
    app.should_quit = true;
    return Ok(());
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('t') {
    app.toggle_theme();
    return Ok(());
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('r') {
    app.open_modal(Modal::History);
    return Ok(());
  }

  if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('p') {
    app.open_modal(Modal::Settings);
    return Ok(());
  }

  // Overlays capture input in stacking order.
  if app.player.is_open() {
    return handle_player_key(app, key).await;
  }
  if let Some(modal) = app.modal {
    handle_modal_key(app, modal, key);
    return Ok(());
  }

  match app.mode {
    AppMode::Input => handle_input_key(app, key),
    AppMode::Results => handle_results_key(app, key).await,
  }
  Ok(())
}

async fn handle_player_key(app: &mut App, key: event::KeyEvent) -> Result<()> {
  match key.code {
    KeyCode::Esc | KeyCode::Char('q') => app.close_player().await,
    KeyCode::Char(' ') => {
      if app.player.is_playing()
        && let Err(e) = app.player.toggle_pause().await
      {
        app.set_error(format!("Pause error: {}", e));
      }
    }
    _ => {}
  }
  Ok(())
}

fn handle_modal_key(app: &mut App, modal: Modal, key: event::KeyEvent) {
  match key.code {
    KeyCode::Esc | KeyCode::Char('q') => app.close_modal(),
    KeyCode::Down | KeyCode::Char('j') if modal == Modal::History => {
      let next = step(app.history_state.selected(), app.history.len(), true);
      app.history_state.select(next);
    }
    KeyCode::Up | KeyCode::Char('k') if modal == Modal::History => {
      let next = step(app.history_state.selected(), app.history.len(), false);
      app.history_state.select(next);
    }
    KeyCode::Char('c') if modal == Modal::History => app.clear_history(),
    _ => {}
  }
}

fn handle_input_key(app: &mut App, key: event::KeyEvent) {
  app.clear_error();
  match key.code {
    KeyCode::Enter => {
      app.trigger_search();
    }
    KeyCode::Char(c) => {
      let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
      app.input.insert(byte_idx, c);
      app.cursor_position += 1;
    }
    KeyCode::Backspace => {
      if app.cursor_position > 0 {
        app.cursor_position -= 1;
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Delete => {
      if app.cursor_position < app.input.chars().count() {
        let byte_idx = char_to_byte_index(&app.input, app.cursor_position);
        app.input.remove(byte_idx);
      }
    }
    KeyCode::Left => {
      app.cursor_position = app.cursor_position.saturating_sub(1);
    }
    KeyCode::Right => {
      if app.cursor_position < app.input.chars().count() {
        app.cursor_position += 1;
      }
    }
    KeyCode::Home => {
      app.cursor_position = 0;
    }
    KeyCode::End => {
      app.cursor_position = app.input.chars().count();
    }
    KeyCode::Esc => {
      if !app.input.is_empty() {
        app.input.clear();
        app.cursor_position = 0;
        app.input_scroll = 0;
      } else if !app.board.is_empty() {
        app.mode = AppMode::Results;
      } else {
        app.should_quit = true;
      }
    }
    KeyCode::Down | KeyCode::Tab => {
      if !app.board.is_empty() {
        app.mode = AppMode::Results;
      }
    }
    _ => {}
  }
}

async fn handle_results_key(app: &mut App, key: event::KeyEvent) {
  let Some(index) = app.list_state.selected() else {
    if matches!(key.code, KeyCode::Esc | KeyCode::Char('/')) {
      app.mode = AppMode::Input;
    }
    return;
  };
  let state = app.board.cards().get(index).map(|c| c.state().clone()).unwrap_or_default();

  match (key.code, &state) {
    (KeyCode::Down | KeyCode::Char('j'), _) => {
      let next = step(Some(index), app.board.len(), true);
      app.list_state.select(next);
    }
    (KeyCode::Up | KeyCode::Char('k'), _) => {
      let next = step(Some(index), app.board.len(), false);
      app.list_state.select(next);
    }
    (KeyCode::Esc | KeyCode::Char('/'), _) => {
      app.expanded = None;
      app.mode = AppMode::Input;
    }
    (KeyCode::Char('w') | KeyCode::Enter, JobState::Idle | JobState::Failed { .. }) => app.watch(index),
    (KeyCode::Char('d'), JobState::Idle | JobState::Failed { .. }) => app.toggle_formats(index),
    (KeyCode::Char('v'), _) => app.convert(index, Format::Mp4),
    (KeyCode::Char('a'), _) => app.convert(index, Format::Mp3),
    (KeyCode::Char('p') | KeyCode::Enter, JobState::Completed { .. }) => app.play_completed(index).await,
    (KeyCode::Char('s'), JobState::Completed { .. }) => app.save_completed(index),
    _ => {}
  }
}
