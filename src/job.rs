//! Per-card conversion jobs.
//!
//! Every result card owns one [`JobController`]. A job cycle is: submit the conversion, then
//! poll the status endpoint on a fixed interval until the provider reports a terminal status.
//! State changes go through the pure [`transition`] function; the async side only produces
//! [`JobEvent`]s, tagged with the card index and a board-wide ticket so that updates from a
//! cancelled or replaced cycle are dropped on arrival.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ConversionRequest, Format, JobResult, JobStatus, VideoApi, VideoSummary};
use crate::constants::constants;
use crate::error::Error;

// --- State machine ---

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobState {
  #[default]
  Idle,
  /// Submitted; `remote_job_id` is set once the provider accepted the request.
  Pending { format: Format, remote_job_id: Option<String> },
  Completed { format: Format, result: JobResult },
  Failed { error: Error },
}

impl JobState {
  pub fn is_pending(&self) -> bool {
    matches!(self, JobState::Pending { .. })
  }

  pub fn result(&self) -> Option<&JobResult> {
    match self {
      JobState::Completed { result, .. } => Some(result),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&Error> {
    match self {
      JobState::Failed { error } => Some(error),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
  Submitted(Format),
  Accepted(String),
  Rejected(Error),
  Polled(JobStatus),
  PollFailed(Error),
}

/// Side effects the owner of the board has to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
  Play(JobResult),
  Record { format: Format, result: JobResult },
}

#[derive(Debug, PartialEq, Eq)]
pub struct Transition {
  pub next: JobState,
  pub effects: Vec<Effect>,
}

impl Transition {
  fn to(next: JobState) -> Self {
    Self { next, effects: Vec::new() }
  }

  fn stay(state: &JobState) -> Self {
    Self::to(state.clone())
  }
}

pub fn transition(state: &JobState, event: JobEvent) -> Transition {
  match (state, event) {
    (JobState::Pending { .. }, JobEvent::Submitted(_)) => Transition::stay(state),
    (_, JobEvent::Submitted(format)) => Transition::to(JobState::Pending { format, remote_job_id: None }),

    (JobState::Pending { format, .. }, JobEvent::Accepted(job_id)) => {
      Transition::to(JobState::Pending { format: *format, remote_job_id: Some(job_id) })
    }
    (JobState::Pending { .. }, JobEvent::Rejected(error)) => Transition::to(JobState::Failed { error: error.normalized() }),

    (JobState::Pending { format, .. }, JobEvent::Polled(status)) => match status {
      JobStatus::Completed(result) if *format == Format::Watch => Transition {
        next: JobState::Idle,
        effects: vec![Effect::Play(result.clone()), Effect::Record { format: *format, result }],
      },
      JobStatus::Completed(result) => Transition {
        next: JobState::Completed { format: *format, result: result.clone() },
        effects: vec![Effect::Record { format: *format, result }],
      },
      JobStatus::Failed(message) => {
        let message = message.unwrap_or_else(|| constants().failed_fallback_message.clone());
        Transition::to(JobState::Failed { error: Error::from_provider(&message) })
      }
      JobStatus::InProgress(_) => Transition::stay(state),
    },
    (JobState::Pending { .. }, JobEvent::PollFailed(error)) => {
      // Provider messages (quota on a 429) go through the rule table; transport errors stay raw.
      let error = match error {
        Error::Provider(message) => Error::from_provider(&message),
        other => other,
      };
      Transition::to(JobState::Failed { error })
    }

    // Late updates for a cycle that already ended.
    (_, _) => Transition::stay(state),
  }
}

// --- Poll task ---

/// Update produced by a job task.
#[derive(Debug)]
pub struct JobUpdate {
  pub card: usize,
  pub ticket: u64,
  pub event: JobEvent,
}

/// Handle to the task driving one job cycle. Cancelling is idempotent and also happens on drop.
#[derive(Default)]
pub struct PollHandle {
  handle: Option<JoinHandle<()>>,
}

impl PollHandle {
  pub fn cancel(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.abort();
    }
  }

  pub fn is_active(&self) -> bool {
    self.handle.as_ref().is_some_and(|h| !h.is_finished())
  }
}

impl Drop for PollHandle {
  fn drop(&mut self) {
    self.cancel();
  }
}

/// Submit, then poll until terminal. Polls are serialized: the next sleep starts only after the
/// previous response resolved.
fn spawn_job(
  api: Arc<dyn VideoApi>,
  request: ConversionRequest,
  interval: Duration,
  card: usize,
  ticket: u64,
  tx: mpsc::UnboundedSender<JobUpdate>,
) -> PollHandle {
  let handle = tokio::spawn(async move {
    let send = |event: JobEvent| tx.send(JobUpdate { card, ticket, event }).is_ok();

    let job_id = match api.submit(&request).await {
      Ok(job_id) => job_id,
      Err(e) => {
        send(JobEvent::Rejected(e));
        return;
      }
    };
    if !send(JobEvent::Accepted(job_id.clone())) {
      return;
    }

    loop {
      tokio::time::sleep(interval).await;
      match api.status(&job_id).await {
        Ok(status) => {
          debug!(ticket, job_id = %job_id, ?status, "job: poll tick");
          let terminal = status.is_terminal();
          if !send(JobEvent::Polled(status)) || terminal {
            return;
          }
        }
        Err(e) => {
          send(JobEvent::PollFailed(e));
          return;
        }
      }
    }
  });
  PollHandle { handle: Some(handle) }
}

// --- Controller ---

pub struct JobController {
  pub video: VideoSummary,
  state: JobState,
  ticket: Option<u64>,
  poller: PollHandle,
}

impl JobController {
  pub fn new(video: VideoSummary) -> Self {
    Self { video, state: JobState::Idle, ticket: None, poller: PollHandle::default() }
  }

  pub fn state(&self) -> &JobState {
    &self.state
  }

  pub fn is_polling(&self) -> bool {
    self.poller.is_active()
  }

  /// Move to `Pending` under a new ticket. Returns `false` if a job is already running.
  fn begin(&mut self, format: Format, ticket: u64) -> bool {
    if self.state.is_pending() {
      warn!(video_id = %self.video.id, "job: submit while pending ignored");
      return false;
    }
    self.poller.cancel();
    self.state = transition(&self.state, JobEvent::Submitted(format)).next;
    self.ticket = Some(ticket);
    true
  }

  /// Apply an update; anything carrying a stale ticket is dropped.
  pub fn apply(&mut self, ticket: u64, event: JobEvent) -> Vec<Effect> {
    if self.ticket != Some(ticket) {
      debug!(video_id = %self.video.id, ticket, "job: stale update dropped");
      return Vec::new();
    }
    let Transition { next, effects } = transition(&self.state, event);
    self.state = next;
    if !self.state.is_pending() {
      self.poller.cancel();
    }
    match &self.state {
      JobState::Failed { error } => info!(video_id = %self.video.id, err = %error, "job: failed"),
      JobState::Completed { format, .. } => info!(video_id = %self.video.id, format = format.label(), "job: completed"),
      _ => {}
    }
    effects
  }

  /// Stop polling; any update still in flight will be dropped.
  pub fn teardown(&mut self) {
    self.poller.cancel();
    self.ticket = None;
  }
}

impl Drop for JobController {
  fn drop(&mut self) {
    self.teardown();
  }
}

/// An effect together with the card it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardEffect {
  pub video: VideoSummary,
  pub effect: Effect,
}

/// Arena of job controllers, one per rendered result.
pub struct JobBoard {
  api: Arc<dyn VideoApi>,
  interval: Duration,
  cards: Vec<JobController>,
  next_ticket: u64,
  tx: mpsc::UnboundedSender<JobUpdate>,
  rx: mpsc::UnboundedReceiver<JobUpdate>,
}

impl JobBoard {
  pub fn new(api: Arc<dyn VideoApi>, interval: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { api, interval, cards: Vec::new(), next_ticket: 0, tx, rx }
  }

  pub fn cards(&self) -> &[JobController] {
    &self.cards
  }

  pub fn len(&self) -> usize {
    self.cards.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cards.is_empty()
  }

  /// Tear down every card and start over with `videos`.
  pub fn replace(&mut self, videos: Vec<VideoSummary>) {
    for card in &mut self.cards {
      card.teardown();
    }
    self.cards = videos.into_iter().map(JobController::new).collect();
  }

  pub fn clear(&mut self) {
    self.replace(Vec::new());
  }

  /// Start a job cycle on `index`. No-op if the card is already pending.
  pub fn submit(&mut self, index: usize, format: Format) -> bool {
    let ticket = self.next_ticket;
    let Some(card) = self.cards.get_mut(index) else { return false };
    if !card.begin(format, ticket) {
      return false;
    }
    self.next_ticket += 1;
    info!(video_id = %card.video.id, format = format.label(), ticket, "job: submitted");
    let request = ConversionRequest { video_id: card.video.id.clone(), format };
    card.poller = spawn_job(self.api.clone(), request, self.interval, index, ticket, self.tx.clone());
    true
  }

  /// Apply every queued update and return the effects they produced.
  pub fn drain(&mut self) -> Vec<CardEffect> {
    let mut out = Vec::new();
    while let Ok(update) = self.rx.try_recv() {
      let Some(card) = self.cards.get_mut(update.card) else { continue };
      for effect in card.apply(update.ticket, update.event) {
        out.push(CardEffect { video: card.video.clone(), effect });
      }
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::parse_submit_response;
  use async_trait::async_trait;
  use std::collections::VecDeque;
  use std::sync::Mutex as StdMutex;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn video(id: &str) -> VideoSummary {
    VideoSummary {
      id: id.to_string(),
      title: format!("Video {}", id),
      channel: "Chan".into(),
      thumbnail: None,
      duration: None,
    }
  }

  fn result(url: &str) -> JobResult {
    JobResult { download_url: url.to_string(), title: Some("T".into()), ..Default::default() }
  }

  fn pending(format: Format) -> JobState {
    JobState::Pending { format, remote_job_id: Some("j1".into()) }
  }

  // --- transition ---

  #[test]
  fn submit_from_idle_and_failed_enters_pending() {
    for state in [JobState::Idle, JobState::Failed { error: Error::Provider("x".into()) }] {
      let t = transition(&state, JobEvent::Submitted(Format::Mp4));
      assert_eq!(t.next, JobState::Pending { format: Format::Mp4, remote_job_id: None });
      assert!(t.next.error().is_none());
    }
  }

  #[test]
  fn submit_while_pending_is_noop() {
    let state = pending(Format::Mp3);
    assert_eq!(transition(&state, JobEvent::Submitted(Format::Mp4)).next, state);
  }

  #[test]
  fn accepted_records_job_id() {
    let state = JobState::Pending { format: Format::Mp3, remote_job_id: None };
    let next = transition(&state, JobEvent::Accepted("j9".into())).next;
    assert_eq!(next, JobState::Pending { format: Format::Mp3, remote_job_id: Some("j9".into()) });
  }

  #[test]
  fn rejection_is_normalized() {
    let state = JobState::Pending { format: Format::Mp3, remote_job_id: None };
    let t = transition(&state, JobEvent::Rejected(Error::Provider("You have exceeded the MONTHLY quota".into())));
    assert_eq!(t.next, JobState::Failed { error: Error::QuotaExceeded });
  }

  #[test]
  fn completed_file_job_keeps_result() {
    let t = transition(&pending(Format::Mp4), JobEvent::Polled(JobStatus::Completed(result("u"))));
    assert_eq!(t.next.result(), Some(&result("u")));
    assert!(t.next.error().is_none());
    assert_eq!(t.effects, vec![Effect::Record { format: Format::Mp4, result: result("u") }]);
  }

  #[test]
  fn completed_watch_job_plays_and_returns_to_idle() {
    let t = transition(&pending(Format::Watch), JobEvent::Polled(JobStatus::Completed(result("u"))));
    assert_eq!(t.next, JobState::Idle);
    assert_eq!(t.effects, vec![Effect::Play(result("u")), Effect::Record { format: Format::Watch, result: result("u") }]);
  }

  #[test]
  fn failed_status_uses_normalized_message() {
    let message = "Sorry, this video is longer than 15 minutes and cannot be converted".to_string();
    let t = transition(&pending(Format::Mp3), JobEvent::Polled(JobStatus::Failed(Some(message))));
    let error = t.next.error().unwrap();
    assert_eq!(error.to_string(), "This video is too long to be processed.");
    assert!(t.next.result().is_none());
  }

  #[test]
  fn failed_status_without_message_uses_fallback() {
    let t = transition(&pending(Format::Mp3), JobEvent::Polled(JobStatus::Failed(None)));
    assert_eq!(t.next.error().unwrap().to_string(), constants().failed_fallback_message);
  }

  #[test]
  fn in_progress_keeps_pending() {
    let state = pending(Format::Mp3);
    let t = transition(&state, JobEvent::Polled(JobStatus::InProgress("processing".into())));
    assert_eq!(t.next, state);
    assert!(t.effects.is_empty());
  }

  #[test]
  fn poll_error_keeps_raw_message() {
    let t = transition(&pending(Format::Mp3), JobEvent::PollFailed(Error::Network("connection reset".into())));
    assert_eq!(t.next.error().unwrap().to_string(), "connection reset");
  }

  #[test]
  fn events_outside_pending_are_ignored() {
    let done = JobState::Completed { format: Format::Mp4, result: result("u") };
    let t = transition(&done, JobEvent::Polled(JobStatus::Failed(Some("late".into()))));
    assert_eq!(t.next, done);
    assert!(transition(&JobState::Idle, JobEvent::Accepted("j".into())).next == JobState::Idle);
  }

  #[test]
  fn every_tick_yields_one_consistent_state() {
    let ticks = [
      JobEvent::Polled(JobStatus::InProgress("queued".into())),
      JobEvent::Polled(JobStatus::Completed(result("u"))),
      JobEvent::Polled(JobStatus::Failed(Some("boom".into()))),
      JobEvent::PollFailed(Error::MalformedResponse("eof".into())),
    ];
    for format in [Format::Watch, Format::Mp4, Format::Mp3] {
      for tick in ticks.clone() {
        let next = transition(&pending(format), tick).next;
        assert!(!(next.result().is_some() && next.error().is_some()));
        match next {
          JobState::Pending { .. } | JobState::Idle => {}
          JobState::Completed { .. } => assert!(next.result().is_some()),
          JobState::Failed { .. } => assert!(next.error().is_some()),
        }
      }
    }
  }

  // --- controller ---

  #[test]
  fn stale_ticket_is_dropped() {
    let mut card = JobController::new(video("a"));
    assert!(card.begin(Format::Mp3, 7));
    assert!(card.apply(6, JobEvent::Accepted("old".into())).is_empty());
    assert_eq!(card.state(), &JobState::Pending { format: Format::Mp3, remote_job_id: None });

    card.teardown();
    let effects = card.apply(7, JobEvent::Polled(JobStatus::Completed(result("u"))));
    assert!(effects.is_empty());
    assert!(card.state().is_pending());
  }

  // --- board with a scripted provider ---

  struct FakeApi {
    submit: Result<String, Error>,
    statuses: StdMutex<VecDeque<Result<JobStatus, Error>>>,
    status_delay: Duration,
    submits: AtomicUsize,
    polls: AtomicUsize,
  }

  impl FakeApi {
    fn new(submit: Result<String, Error>, statuses: Vec<Result<JobStatus, Error>>) -> Arc<Self> {
      Arc::new(Self {
        submit,
        statuses: StdMutex::new(statuses.into()),
        status_delay: Duration::ZERO,
        submits: AtomicUsize::new(0),
        polls: AtomicUsize::new(0),
      })
    }

    fn slow(statuses: Vec<Result<JobStatus, Error>>, delay: Duration) -> Arc<Self> {
      Arc::new(Self {
        submit: Ok("j1".into()),
        statuses: StdMutex::new(statuses.into()),
        status_delay: delay,
        submits: AtomicUsize::new(0),
        polls: AtomicUsize::new(0),
      })
    }
  }

  #[async_trait]
  impl VideoApi for FakeApi {
    async fn search(&self, _query: &str) -> Result<Vec<VideoSummary>, Error> {
      Ok(Vec::new())
    }

    async fn submit(&self, _request: &ConversionRequest) -> Result<String, Error> {
      self.submits.fetch_add(1, Ordering::SeqCst);
      self.submit.clone()
    }

    async fn status(&self, _job_id: &str) -> Result<JobStatus, Error> {
      self.polls.fetch_add(1, Ordering::SeqCst);
      if !self.status_delay.is_zero() {
        tokio::time::sleep(self.status_delay).await;
      }
      let next = self.statuses.lock().unwrap().pop_front();
      next.unwrap_or_else(|| Ok(JobStatus::InProgress("processing".into())))
    }
  }

  fn board(api: Arc<FakeApi>) -> JobBoard {
    let mut board = JobBoard::new(api, Duration::from_secs(4));
    board.replace(vec![video("a"), video("b")]);
    board
  }

  async fn wait(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
  }

  #[tokio::test(start_paused = true)]
  async fn rejected_submission_fails_without_polling() {
    let api = FakeApi::new(parse_submit_response(r#"{"success": false}"#).map(|_| String::new()), vec![]);
    let mut board = board(api.clone());
    assert!(board.submit(0, Format::Mp3));
    wait(1).await;
    assert!(board.drain().is_empty());

    let card = &board.cards()[0];
    assert_eq!(card.state().error().unwrap().to_string(), constants().submit_fallback_message);
    assert!(!card.is_polling());
    wait(20).await;
    assert_eq!(api.polls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn never_finishing_job_stays_pending() {
    let api = FakeApi::new(Ok("j1".into()), vec![]);
    let mut board = board(api.clone());
    board.submit(0, Format::Mp3);
    wait(41).await;
    assert!(board.drain().is_empty());

    assert_eq!(board.cards()[0].state(), &JobState::Pending {
      format: Format::Mp3,
      remote_job_id: Some("j1".into())
    });
    assert_eq!(api.polls.load(Ordering::SeqCst), 10);
    assert!(board.cards()[0].is_polling());
    assert_eq!(board.cards()[1].state(), &JobState::Idle);
  }

  #[tokio::test(start_paused = true)]
  async fn file_job_completes_and_records_once() {
    let api = FakeApi::new(Ok("j1".into()), vec![
      Ok(JobStatus::InProgress("processing".into())),
      Ok(JobStatus::Completed(result("https://cdn/a.mp4"))),
    ]);
    let mut board = board(api.clone());
    board.submit(0, Format::Mp4);
    wait(9).await;

    let effects = board.drain();
    assert_eq!(effects, vec![CardEffect {
      video: video("a"),
      effect: Effect::Record { format: Format::Mp4, result: result("https://cdn/a.mp4") }
    }]);
    assert_eq!(board.cards()[0].state().result().unwrap().download_url, "https://cdn/a.mp4");
    wait(20).await;
    assert!(board.drain().is_empty());
    assert_eq!(api.polls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn watch_job_hands_off_to_player() {
    let api = FakeApi::new(Ok("j1".into()), vec![Ok(JobStatus::Completed(result("https://cdn/w.mp4")))]);
    let mut board = board(api);
    board.submit(1, Format::Watch);
    wait(5).await;

    let effects: Vec<Effect> = board.drain().into_iter().map(|e| e.effect).collect();
    assert!(matches!(effects.as_slice(), [Effect::Play(_), Effect::Record { format: Format::Watch, .. }]));
    assert_eq!(board.cards()[1].state(), &JobState::Idle);
  }

  #[tokio::test(start_paused = true)]
  async fn failed_status_is_normalized_on_the_card() {
    let api = FakeApi::new(Ok("j1".into()), vec![Ok(JobStatus::Failed(Some(
      "Video is longer than 15 minutes".into(),
    )))]);
    let mut board = board(api);
    board.submit(0, Format::Mp3);
    wait(5).await;
    board.drain();
    assert_eq!(board.cards()[0].state(), &JobState::Failed { error: Error::ContentTooLong });
  }

  #[tokio::test(start_paused = true)]
  async fn poll_error_fails_the_job() {
    let api = FakeApi::new(Ok("j1".into()), vec![Err(Error::Network("timed out".into()))]);
    let mut board = board(api.clone());
    board.submit(0, Format::Mp3);
    wait(13).await;
    board.drain();
    assert_eq!(board.cards()[0].state().error().unwrap().to_string(), "timed out");
    assert_eq!(api.polls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn quota_answer_while_polling_fails_the_job() {
    let quota = "You have exceeded the MONTHLY quota for Requests on your current plan".to_string();
    let api = FakeApi::new(Ok("j1".into()), vec![Err(Error::Provider(quota))]);
    let mut board = board(api.clone());
    board.submit(0, Format::Mp3);
    wait(20).await;
    board.drain();
    assert_eq!(board.cards()[0].state(), &JobState::Failed { error: Error::QuotaExceeded });
    assert!(!board.cards()[0].is_polling());
    assert_eq!(api.polls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn second_submit_while_pending_is_ignored() {
    let api = FakeApi::new(Ok("j1".into()), vec![]);
    let mut board = board(api.clone());
    assert!(board.submit(0, Format::Mp3));
    assert!(!board.submit(0, Format::Mp4));
    wait(1).await;
    board.drain();
    assert_eq!(api.submits.load(Ordering::SeqCst), 1);
    assert!(matches!(board.cards()[0].state(), JobState::Pending { format: Format::Mp3, .. }));
  }

  #[tokio::test(start_paused = true)]
  async fn retry_after_failure_clears_error() {
    let api = FakeApi::new(Ok("j1".into()), vec![Ok(JobStatus::Failed(Some("boom".into())))]);
    let mut board = board(api);
    board.submit(0, Format::Mp3);
    wait(5).await;
    board.drain();
    assert!(board.cards()[0].state().error().is_some());

    assert!(board.submit(0, Format::Mp3));
    assert!(board.cards()[0].state().error().is_none());
    assert!(board.cards()[0].state().is_pending());
  }

  #[tokio::test(start_paused = true)]
  async fn queued_update_after_replace_is_discarded() {
    let api = FakeApi::new(Ok("j1".into()), vec![Ok(JobStatus::Completed(result("u")))]);
    let mut board = board(api);
    board.submit(0, Format::Mp4);
    wait(5).await;

    // The completion is sitting in the channel; a new search replaces the cards first.
    board.replace(vec![video("a")]);
    assert!(board.drain().is_empty());
    assert_eq!(board.cards()[0].state(), &JobState::Idle);
  }

  #[tokio::test(start_paused = true)]
  async fn teardown_mid_flight_stops_everything() {
    let api = FakeApi::slow(vec![Ok(JobStatus::Completed(result("u")))], Duration::from_secs(2));
    let mut board = board(api.clone());
    board.submit(0, Format::Mp4);
    wait(5).await;
    assert_eq!(api.polls.load(Ordering::SeqCst), 1);

    board.clear();
    wait(30).await;
    assert!(board.drain().is_empty());
    assert!(board.is_empty());
    assert_eq!(api.polls.load(Ordering::SeqCst), 1);
  }
}
