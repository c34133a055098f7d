use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::api::{VideoApi, VideoSummary};
use crate::error::Error;

type SearchReply = Result<Vec<VideoSummary>, Error>;

/// Result list, busy flag and global error for the search box.
#[derive(Default)]
pub struct SearchSession {
  pub results: Vec<VideoSummary>,
  pub busy: bool,
  pub error: Option<String>,
  rx: Option<oneshot::Receiver<SearchReply>>,
}

/// Outcome of draining the in-flight search.
#[derive(Debug, PartialEq, Eq)]
pub enum SearchProgress {
  Idle,
  Waiting,
  Finished,
}

impl SearchSession {
  /// Start a search. Blank queries are ignored and leave the current results in place.
  ///
  /// Returns `true` when a request went out; the caller should then drop anything built on the
  /// previous results.
  pub fn begin(&mut self, query: &str, api: Arc<dyn VideoApi>) -> bool {
    self.error = None;
    let query = query.trim().to_string();
    if query.is_empty() {
      return false;
    }
    info!(query = %query, "search triggered");
    self.results.clear();
    self.busy = true;

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      let _ = tx.send(api.search(&query).await);
    });
    self.rx = Some(rx);
    true
  }

  pub fn check(&mut self) -> SearchProgress {
    let Some(mut rx) = self.rx.take() else { return SearchProgress::Idle };
    match rx.try_recv() {
      Ok(reply) => {
        self.busy = false;
        match reply {
          Ok(results) => {
            info!(count = results.len(), "search finished");
            self.results = results;
          }
          Err(e) => {
            warn!(err = %e, "search failed");
            self.results.clear();
            self.error = Some(format!("Search failed: {}", e));
          }
        }
        SearchProgress::Finished
      }
      Err(oneshot::error::TryRecvError::Empty) => {
        self.rx = Some(rx);
        SearchProgress::Waiting
      }
      Err(oneshot::error::TryRecvError::Closed) => {
        self.busy = false;
        self.results.clear();
        self.error = Some("Search task failed.".to_string());
        SearchProgress::Finished
      }
    }
  }
}
