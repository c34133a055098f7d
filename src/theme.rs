use ratatui::style::Color;
use serde::{Deserialize, Serialize};

/// Persisted colour scheme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
  Light,
  #[default]
  Dark,
}

impl ThemeMode {
  pub fn toggled(self) -> Self {
    match self {
      ThemeMode::Light => ThemeMode::Dark,
      ThemeMode::Dark => ThemeMode::Light,
    }
  }

  pub fn palette(self) -> &'static Theme {
    match self {
      ThemeMode::Light => &LIGHT,
      ThemeMode::Dark => &DARK,
    }
  }
}

pub struct Theme {
  pub name: &'static str,
  pub bg: Color,
  pub fg: Color,
  pub accent: Color,
  pub muted: Color,
  pub border: Color,
  pub highlight_fg: Color,
  pub highlight_bg: Color,
  pub stripe_bg: Color,
  pub status: Color,
  pub error: Color,
  pub success: Color,
  pub skeleton: Color,
  pub key_fg: Color,
  pub key_bg: Color,
}

pub static DARK: Theme = Theme {
  name: "dark",
  bg: Color::Rgb(17, 24, 39),
  fg: Color::Rgb(243, 244, 246),
  accent: Color::Rgb(168, 85, 247),
  muted: Color::Rgb(156, 163, 175),
  border: Color::Rgb(55, 65, 81),
  highlight_fg: Color::Rgb(255, 255, 255),
  highlight_bg: Color::Rgb(88, 28, 135),
  stripe_bg: Color::Rgb(31, 41, 55),
  status: Color::Rgb(236, 72, 153),
  error: Color::Rgb(248, 113, 113),
  success: Color::Rgb(74, 222, 128),
  skeleton: Color::Rgb(55, 65, 81),
  key_fg: Color::Rgb(17, 24, 39),
  key_bg: Color::Rgb(168, 85, 247),
};

pub static LIGHT: Theme = Theme {
  name: "light",
  bg: Color::Rgb(243, 244, 246),
  fg: Color::Rgb(31, 41, 55),
  accent: Color::Rgb(147, 51, 234),
  muted: Color::Rgb(107, 114, 128),
  border: Color::Rgb(209, 213, 219),
  highlight_fg: Color::Rgb(255, 255, 255),
  highlight_bg: Color::Rgb(147, 51, 234),
  stripe_bg: Color::Rgb(229, 231, 235),
  status: Color::Rgb(219, 39, 119),
  error: Color::Rgb(220, 38, 38),
  success: Color::Rgb(22, 163, 74),
  skeleton: Color::Rgb(209, 213, 219),
  key_fg: Color::Rgb(255, 255, 255),
  key_bg: Color::Rgb(147, 51, 234),
};
