mod api;
mod app;
mod config;
mod constants;
mod download;
mod error;
mod history;
mod input;
mod job;
mod player;
mod search;
mod storage;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use ratatui::{
  DefaultTerminal,
  crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyEventKind},
    execute,
  },
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use api::{RapidApiClient, VideoApi};
use app::{App, AppSettings};
use config::Config;
use download::resolve_download_dir;
use input::handle_key_event;
use storage::{FileBackend, Store};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// Path to config.toml (default: the platform config directory)
  #[arg(short, long)]
  config: Option<PathBuf>,
}

// --- Logging ---

/// Log to a daily file under the data directory; the terminal belongs to the UI.
fn init_logging() -> (Option<PathBuf>, Option<tracing_appender::non_blocking::WorkerGuard>) {
  let env_filter =
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "uyatube=info".into());

  let Some(log_dir) = ProjectDirs::from("", "", "uyatube").map(|dirs| dirs.data_dir().join("logs")) else {
    return (None, None);
  };
  if let Err(err) = std::fs::create_dir_all(&log_dir) {
    eprintln!("Warning: failed to create logs directory: {}", err);
    return (None, None);
  }

  let file_appender = tracing_appender::rolling::daily(&log_dir, "uyatube.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
  let file_layer = tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false).with_filter(env_filter);
  tracing_subscriber::registry().with(file_layer).init();
  (Some(log_dir), Some(guard))
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let (log_dir, _log_guard) = init_logging();

  let config_path = match args.config {
    Some(path) => path,
    None => Config::default_path().context("Could not determine a config directory; pass --config <path>")?,
  };
  let config = Config::load(&config_path)?;
  config.require_api_key(&config_path)?;
  info!(config = %config_path.display(), "starting");

  let client = RapidApiClient::new(&config.api);
  let http = client.http_client();
  let api: Arc<dyn VideoApi> = Arc::new(client);

  let store = match FileBackend::from_project_dirs() {
    Some(backend) => Store::new(backend),
    None => {
      warn!("no data directory, preferences will not persist");
      Store::detached()
    }
  };

  let settings = AppSettings {
    player: config.player_binary().to_string(),
    download_dir: resolve_download_dir(config.download_dir.as_deref()),
    config_path: Some(config_path),
    log_dir,
  };
  let mut app = App::new(api, http, store, settings);

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    let _ = execute!(std::io::stdout(), DisableBracketedPaste);
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  execute!(std::io::stdout(), EnableBracketedPaste).context("Failed to enable bracketed paste")?;
  let result = run(&mut terminal, &mut app).await;
  let shutdown = app.shutdown().await;
  let _ = execute!(std::io::stdout(), DisableBracketedPaste);
  ratatui::restore();
  info!("exiting");
  result.and(shutdown)
}

async fn run(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
  loop {
    app.check_pending().await?;

    terminal.draw(|frame| ui::ui(frame, app))?;

    if event::poll(Duration::from_millis(100))? {
      match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
          handle_key_event(app, key).await?;
        }
        Event::Paste(text) => app.paste(&text),
        _ => {}
      }
    }

    if app.should_quit {
      break;
    }
  }
  Ok(())
}
