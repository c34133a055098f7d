use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{Format, JobResult, VideoSummary};
use crate::constants::constants;
use crate::storage::{Persisted, Store};

pub const HISTORY_KEY: &str = "history";

/// Snapshot of a finished conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
  pub video_id: String,
  pub title: String,
  pub channel: Option<String>,
  pub thumbnail: Option<String>,
  pub download_url: String,
  pub format: Format,
  pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
  /// Provider metadata wins; the search listing fills the gaps.
  pub fn new(video: &VideoSummary, format: Format, result: &JobResult) -> Self {
    Self {
      video_id: video.id.clone(),
      title: result.title.clone().filter(|t| !t.is_empty()).unwrap_or_else(|| video.title.clone()),
      channel: result.channel.clone().or_else(|| Some(video.channel.clone()).filter(|c| !c.is_empty())),
      thumbnail: result.thumbnail.clone().or_else(|| video.thumbnail.clone()),
      download_url: result.download_url.clone(),
      format,
      recorded_at: Utc::now(),
    }
  }
}

/// Recency-ordered, de-duplicated list of past conversions.
pub struct History {
  entries: Persisted<Vec<HistoryEntry>>,
  limit: usize,
}

impl History {
  pub fn load(store: Store) -> Self {
    Self::with_limit(store, constants().history_limit)
  }

  pub fn with_limit(store: Store, limit: usize) -> Self {
    let mut entries = Persisted::load(store, HISTORY_KEY, Vec::new());
    if entries.get().len() > limit {
      entries.update(|list| list.truncate(limit));
    }
    Self { entries, limit }
  }

  pub fn entries(&self) -> &[HistoryEntry] {
    self.entries.get()
  }

  pub fn len(&self) -> usize {
    self.entries.get().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.get().is_empty()
  }

  /// Put `entry` first, replacing any earlier entry for the same video.
  pub fn record(&mut self, entry: HistoryEntry) {
    info!(video_id = %entry.video_id, format = entry.format.label(), "history: recorded");
    let limit = self.limit;
    self.entries.update(|list| {
      list.retain(|e| e.video_id != entry.video_id);
      list.insert(0, entry);
      list.truncate(limit);
    });
  }

  pub fn clear(&mut self) {
    self.entries.set(Vec::new());
  }
}
