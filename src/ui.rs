use ratatui::{
  Frame,
  layout::{Alignment, Constraint, Flex, Layout, Rect},
  style::{Modifier, Style, Stylize},
  text::{Line, Span},
  widgets::{Block, BorderType, Clear, List, ListItem, Padding, Paragraph, Wrap},
};

use crate::app::{App, AppMode, Modal};
use crate::constants::constants;
use crate::job::{JobController, JobState};
use crate::theme::Theme;

// --- Helpers ---

/// Compute the display width of the first `n` chars (accounting for double-width CJK).
pub fn display_width(s: &str, n: usize) -> usize {
  use unicode_width::UnicodeWidthChar;
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// Horizontal scroll that keeps the cursor column inside a box `inner_w` columns wide.
fn input_scroll(cursor_col: usize, scroll: usize, inner_w: usize) -> usize {
  if inner_w == 0 || cursor_col < scroll {
    cursor_col.min(scroll)
  } else if cursor_col >= scroll + inner_w {
    cursor_col + 1 - inner_w
  } else {
    scroll
  }
}

fn rounded(theme: &Theme) -> Block<'static> {
  Block::bordered().border_type(BorderType::Rounded).border_style(Style::default().fg(theme.border))
}

fn centered(area: Rect, width_pct: u16, height: u16) -> Rect {
  let [row] = Layout::vertical([Constraint::Length(height.min(area.height))]).flex(Flex::Center).areas(area);
  let [cell] = Layout::horizontal([Constraint::Percentage(width_pct)]).flex(Flex::Center).areas(row);
  cell
}

fn key_hint<'a>(theme: &Theme, key: &'a str, action: &'a str) -> Vec<Span<'a>> {
  vec![
    Span::styled(format!(" {} ", key), Style::default().fg(theme.key_fg).bg(theme.key_bg)),
    Span::styled(format!(" {} ", action), Style::default().fg(theme.muted)),
  ]
}

// --- UI Rendering ---

pub fn ui(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();

  frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), frame.area());

  let [header_area, input_area, status_area, main_area, footer_area] = Layout::vertical([
    Constraint::Length(1),
    Constraint::Length(3),
    Constraint::Length(1),
    Constraint::Min(3),
    Constraint::Length(1),
  ])
  .areas(frame.area());

  render_header(frame, theme, header_area);
  render_input(frame, app, input_area);
  render_status(frame, app, status_area);
  render_main(frame, app, main_area);
  render_footer(frame, app, footer_area);

  if app.player.is_open() {
    render_player(frame, app);
  } else if let Some(modal) = app.modal {
    match modal {
      Modal::History => render_history(frame, app),
      Modal::Settings => render_settings(frame, app),
    }
  }
}

fn render_header(frame: &mut Frame, theme: &Theme, area: Rect) {
  let left = Line::from(Span::styled(
    format!(" ▶ {} ", constants().app_name),
    Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
  ));
  frame.render_widget(left, area);

  let version = format!("v{} ", env!("CARGO_PKG_VERSION"));
  let right = Line::from(Span::styled(&version, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(version.len() as u16), width: version.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

fn render_input(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  let focused = app.mode == AppMode::Input && !app.player.is_open() && app.modal.is_none();
  let border_color = if focused { theme.accent } else { theme.border };
  let title = if app.search.busy { format!(" {} Searching… ", app.spinner()) } else { " Video name or link ".to_string() };
  let input_block = Block::bordered()
    .title(title)
    .title_style(Style::default().fg(border_color))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(border_color))
    .padding(Padding::horizontal(1));

  let inner_w = area.width.saturating_sub(4) as usize;
  let cursor_col = display_width(&app.input, app.cursor_position);

  app.input_scroll = input_scroll(cursor_col, app.input_scroll, inner_w);

  let visible: String = app
    .input
    .chars()
    .scan(0usize, |col, c| {
      let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
      let start = *col;
      *col += w;
      Some((start, *col, c))
    })
    .skip_while(|(_, end, _)| *end <= app.input_scroll)
    .take_while(|(start, _, _)| *start < app.input_scroll + inner_w)
    .map(|(_, _, c)| c)
    .collect();

  let paragraph = Paragraph::new(visible).style(Style::default().fg(theme.fg)).block(input_block);
  frame.render_widget(paragraph, area);

  if focused && inner_w > 0 {
    let cursor_x = area.x + 2 + cursor_col.saturating_sub(app.input_scroll) as u16;
    frame.set_cursor_position((cursor_x, area.y + 1));
  }
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let (text, style) = if let Some(err) = &app.search.error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(msg) = &app.status_message {
    (format!(" {} {}", app.spinner(), msg), Style::default().fg(theme.status))
  } else if let Some(err) = &app.last_error {
    (format!(" ⚠  {}", err), Style::default().fg(theme.error))
  } else if let Some(info) = &app.info_message {
    (format!(" ℹ  {}", info), Style::default().fg(theme.muted))
  } else {
    (" Ready".to_string(), Style::default().fg(theme.muted))
  };
  frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_main(frame: &mut Frame, app: &mut App, area: Rect) {
  if app.search.busy {
    render_skeletons(frame, app.theme(), area);
  } else if !app.board.is_empty() {
    render_results(frame, app, area);
  } else {
    render_welcome(frame, app.theme(), area);
  }
}

fn render_welcome(frame: &mut Frame, theme: &Theme, area: Rect) {
  let text = vec![
    Line::from(""),
    Line::from(Span::styled(
      format!("▶  Welcome to {}", constants().app_name),
      Style::default().fg(theme.accent).add_modifier(Modifier::BOLD),
    )),
    Line::from(""),
    Line::from(Span::styled("Search videos. Watch them, or keep them as MP4 or MP3.", Style::default().fg(theme.fg))),
    Line::from(""),
    Line::from(Span::styled("Type a name or paste a link above and press Enter.", Style::default().fg(theme.muted))),
  ];
  let paragraph = Paragraph::new(text).alignment(Alignment::Center).block(rounded(theme));
  frame.render_widget(paragraph, area);
}

fn render_skeletons(frame: &mut Frame, theme: &Theme, area: Rect) {
  let inner_w = area.width.saturating_sub(4) as usize;
  let bar = |pct: usize| Span::styled("▁".repeat(inner_w * pct / 100), Style::default().fg(theme.skeleton));
  let items: Vec<ListItem> = (0..constants().skeleton_cards)
    .map(|_| ListItem::new(vec![Line::from(bar(75)), Line::from(bar(50)), Line::from("")]))
    .collect();
  let list = List::new(items).block(rounded(theme).title(" Results "));
  frame.render_widget(list, area);
}

/// The action/status line at the bottom of a card.
fn job_line<'a>(app: &App, theme: &'a Theme, card: &'a JobController) -> Line<'a> {
  match card.state() {
    JobState::Idle => {
      Line::from([key_hint(theme, "w", "Watch"), vec![Span::raw(" ")], key_hint(theme, "d", "Download")].concat())
    }
    JobState::Pending { format, .. } => Line::from(Span::styled(
      format!("{} Processing {}…", app.spinner(), format.label()),
      Style::default().fg(theme.status).add_modifier(Modifier::BOLD),
    )),
    JobState::Completed { format, .. } => Line::from(
      [
        vec![Span::styled(format!("✔ {} ready  ", format.label()), Style::default().fg(theme.success))],
        key_hint(theme, "p", "Play"),
        vec![Span::raw(" ")],
        key_hint(theme, "s", "Save"),
      ]
      .concat(),
    ),
    JobState::Failed { error } => Line::from(vec![
      Span::styled(format!("✖ {}", error), Style::default().fg(theme.error)),
      Span::styled("  (w/d to retry)", Style::default().fg(theme.muted)),
    ]),
  }
}

fn render_results(frame: &mut Frame, app: &mut App, area: Rect) {
  let theme = app.theme();
  // Inner width: area minus 2 borders minus 2 chars for highlight symbol ("▶ ")
  let inner_w = area.width.saturating_sub(4) as usize;

  let items: Vec<ListItem> = app
    .board
    .cards()
    .iter()
    .enumerate()
    .map(|(i, card)| {
      let bg = if i % 2 == 1 { theme.stripe_bg } else { theme.bg };
      let video = &card.video;
      let duration = video.duration.as_deref().unwrap_or("");
      let title_max = inner_w.saturating_sub(duration.chars().count() + 2);
      let title = truncate_str(&video.title, title_max);
      let gap = inner_w.saturating_sub(title.chars().count() + duration.chars().count());

      let mut lines = vec![
        Line::from(vec![
          Span::styled(title, Style::default().fg(theme.fg).add_modifier(Modifier::BOLD)),
          Span::raw(" ".repeat(gap)),
          Span::styled(duration.to_string(), Style::default().fg(theme.muted)),
        ]),
        Line::from(Span::styled(truncate_str(&video.channel, inner_w), Style::default().fg(theme.muted))),
        job_line(app, theme, card),
      ];
      if app.expanded == Some(i) {
        lines.push(Line::from(
          [vec![Span::raw("  ")], key_hint(theme, "v", "MP4"), vec![Span::raw(" ")], key_hint(theme, "a", "MP3")]
            .concat(),
        ));
      }
      lines.push(Line::from(""));
      ListItem::new(lines).bg(bg)
    })
    .collect();

  let title = format!(" Results ({}) ", app.board.len());
  let list = List::new(items)
    .block(
      rounded(theme).title(title).title_style(Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)),
    )
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().bg(theme.highlight_bg));

  frame.render_stateful_widget(list, area, &mut app.list_state);
}

fn render_player(frame: &mut Frame, app: &App) {
  let theme = app.theme();
  let Some(item) = &app.player.now_playing else { return };
  let area = centered(frame.area(), 80, 12);
  let inner_w = area.width.saturating_sub(4) as usize;

  let mut lines = vec![
    Line::from(Span::styled(truncate_str(&item.title, inner_w), Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))),
    Line::from(""),
  ];
  if let Some(channel) = &item.channel {
    lines.push(Line::from(vec![
      Span::styled("Channel   ", Style::default().fg(theme.muted)),
      Span::styled(truncate_str(channel, inner_w.saturating_sub(10)), Style::default().fg(theme.fg)),
    ]));
  }
  if let Some(duration) = &item.duration {
    lines.push(Line::from(vec![
      Span::styled("Duration  ", Style::default().fg(theme.muted)),
      Span::styled(duration.as_str(), Style::default().fg(theme.fg)),
    ]));
  }
  lines.push(Line::from(Span::styled(
    truncate_str(&item.url, inner_w),
    Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED),
  )));
  lines.push(Line::from(""));
  let status = match (app.player.paused, app.player.last_status()) {
    (true, _) => "⏸ Paused".to_string(),
    (false, Some(status)) => format!("♪ {}", status),
    (false, None) => format!("{} Starting player…", app.spinner()),
  };
  lines.push(Line::from(Span::styled(truncate_str(&status, inner_w), Style::default().fg(theme.status))));
  lines.push(Line::from(""));
  lines.push(Line::from([key_hint(theme, "Space", "Pause"), key_hint(theme, "Esc", "Close")].concat()));

  let block = Block::bordered()
    .title(Span::styled(" Now Playing ", Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.accent))
    .padding(Padding::horizontal(1))
    .style(Style::default().bg(theme.bg));

  frame.render_widget(Clear, area);
  frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn modal_block(theme: &Theme, title: &str) -> Block<'static> {
  Block::bordered()
    .title(Span::styled(format!(" {} ", title), Style::default().fg(theme.accent).add_modifier(Modifier::BOLD)))
    .border_type(BorderType::Rounded)
    .border_style(Style::default().fg(theme.accent))
    .padding(Padding::horizontal(1))
    .style(Style::default().bg(theme.bg))
}

fn render_history(frame: &mut Frame, app: &mut App) {
  let theme = app.theme();
  let area = centered(frame.area(), 70, frame.area().height.saturating_sub(4));
  let block = modal_block(theme, "Download History");
  frame.render_widget(Clear, area);

  if app.history.is_empty() {
    let text = vec![
      Line::from(""),
      Line::from(Span::styled("Nothing in your history yet.", Style::default().fg(theme.muted))),
    ];
    frame.render_widget(Paragraph::new(text).alignment(Alignment::Center).block(block), area);
    return;
  }

  let inner_w = area.width.saturating_sub(6) as usize;
  let items: Vec<ListItem> = app
    .history
    .entries()
    .iter()
    .map(|entry| {
      let mut meta = Vec::new();
      if let Some(channel) = &entry.channel {
        meta.push(channel.clone());
      }
      meta.push(entry.format.label().to_string());
      meta.push(entry.recorded_at.format("%Y-%m-%d %H:%M").to_string());
      ListItem::new(vec![
        Line::from(Span::styled(truncate_str(&entry.title, inner_w), Style::default().fg(theme.fg).add_modifier(Modifier::BOLD))),
        Line::from(Span::styled(truncate_str(&meta.join(" · "), inner_w), Style::default().fg(theme.muted))),
      ])
    })
    .collect();

  let list = List::new(items)
    .block(block.title_bottom(Line::from(" c clear · Esc close ").right_aligned()))
    .highlight_symbol("▶ ")
    .highlight_style(Style::default().fg(theme.highlight_fg).bg(theme.highlight_bg));
  frame.render_stateful_widget(list, area, &mut app.history_state);
}

fn render_settings(frame: &mut Frame, app: &App) {
  let theme = app.theme();
  let area = centered(frame.area(), 70, 16);
  let mut lines = vec![
    Line::from(Span::styled(
      "This app uses the following RapidAPI services. Visit them to check limits and status.",
      Style::default().fg(theme.fg),
    )),
    Line::from(""),
  ];
  for (i, (name, url)) in constants().provider_links.iter().enumerate() {
    lines.push(Line::from(vec![
      Span::styled(format!("{}. {}  ", i + 1, name), Style::default().fg(theme.fg)),
      Span::styled(url.as_str(), Style::default().fg(theme.accent).add_modifier(Modifier::UNDERLINED)),
    ]));
  }
  lines.push(Line::from(""));
  let path_line = |label: &'static str, path: Option<String>| {
    Line::from(vec![
      Span::styled(label, Style::default().fg(theme.muted)),
      Span::styled(path.unwrap_or_else(|| "(unavailable)".to_string()), Style::default().fg(theme.fg)),
    ])
  };
  lines.push(path_line("Config    ", app.settings.config_path.as_ref().map(|p| p.display().to_string())));
  lines.push(path_line("Logs      ", app.settings.log_dir.as_ref().map(|p| p.display().to_string())));
  lines.push(path_line("Saves     ", Some(app.settings.download_dir.display().to_string())));
  lines.push(path_line("Theme     ", Some(format!("{} (^t to toggle)", theme.name))));

  frame.render_widget(Clear, area);
  frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }).block(modal_block(theme, "Settings")), area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
  let theme = app.theme();
  let keys: Vec<(&str, &str)> = if app.player.is_open() {
    vec![("Space", "Pause"), ("Esc", "Close player")]
  } else if app.modal.is_some() {
    vec![("j/k", "Navigate"), ("Esc", "Close")]
  } else {
    match app.mode {
      AppMode::Input => {
        let mut k = vec![("Enter", "Search")];
        if !app.board.is_empty() {
          k.push(("↓", "Results"));
        }
        k.extend([("^r", "History"), ("^p", "Settings"), ("^t", "Theme"), ("^c", "Quit")]);
        k
      }
      AppMode::Results => {
        let mut k = vec![("j/k", "Navigate")];
        match app.selected_card().map(|c| c.state()) {
          Some(JobState::Idle | JobState::Failed { .. }) => {
            k.push(("w", "Watch"));
            k.push(("d", "Download"));
          }
          Some(JobState::Completed { .. }) => {
            k.push(("p", "Play"));
            k.push(("s", "Save"));
          }
          _ => {}
        }
        k.extend([("^r", "History"), ("^t", "Theme"), ("Esc", "Search")]);
        k
      }
    }
  };

  let spans: Vec<Span> = keys
    .iter()
    .enumerate()
    .flat_map(|(i, (key, action))| {
      let mut s = key_hint(theme, key, action);
      if i < keys.len() - 1 {
        s.push(Span::raw(" "));
      }
      s
    })
    .collect();

  frame.render_widget(Line::from(spans), area);

  let theme_label = format!("{} ", theme.name);
  let right = Line::from(Span::styled(&theme_label, Style::default().fg(theme.muted)));
  let right_area =
    Rect { x: area.x + area.width.saturating_sub(theme_label.len() as u16), width: theme_label.len() as u16, ..area };
  frame.render_widget(right, right_area);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truncate_adds_ellipsis() {
    assert_eq!(truncate_str("hello", 10), "hello");
    assert_eq!(truncate_str("hello world", 6), "hello…");
  }

  #[test]
  fn display_width_counts_wide_chars() {
    assert_eq!(display_width("ab", 2), 2);
    assert_eq!(display_width("日本", 2), 4);
    assert_eq!(display_width("日本", 1), 2);
  }

  #[test]
  fn input_scroll_follows_cursor() {
    assert_eq!(input_scroll(3, 0, 10), 0);
    assert_eq!(input_scroll(12, 0, 10), 3);
    assert_eq!(input_scroll(2, 5, 10), 2);
  }

  #[test]
  fn input_scroll_never_passes_cursor_in_a_collapsed_box() {
    for cursor in [0, 1, 7] {
      let scroll = input_scroll(cursor, 0, 0);
      assert!(scroll <= cursor);
      assert_eq!(input_scroll(cursor, 9, 0), cursor);
    }
  }

  #[test]
  fn centered_popup_fits_area() {
    let area = Rect::new(0, 0, 100, 40);
    let popup = centered(area, 80, 12);
    assert_eq!(popup.width, 80);
    assert_eq!(popup.height, 12);
    assert_eq!(popup.x, 10);
    assert_eq!(popup.y, 14);
    assert_eq!(centered(Rect::new(0, 0, 50, 5), 50, 12).height, 5);
  }
}
