use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ApiConfig;
use crate::constants::constants;
use crate::error::Error;

// --- Domain types ---

/// A playable search hit, normalized from the provider's listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSummary {
  pub id: String,
  pub title: String,
  pub channel: String,
  /// Highest-resolution thumbnail the provider listed.
  pub thumbnail: Option<String>,
  pub duration: Option<String>,
}

/// Rendition requested from the conversion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
  /// Stream straight into the player; the card does not keep the result.
  Watch,
  Mp4,
  Mp3,
}

impl Format {
  pub fn label(self) -> &'static str {
    match self {
      Format::Watch => "watch",
      Format::Mp4 => "MP4",
      Format::Mp3 => "MP3",
    }
  }

  pub fn extension(self) -> &'static str {
    match self {
      Format::Mp3 => "mp3",
      Format::Watch | Format::Mp4 => "mp4",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
  pub video_id: String,
  pub format: Format,
}

impl ConversionRequest {
  pub fn source_url(&self) -> String {
    format!("{}{}", constants().watch_url_prefix, self.video_id)
  }
}

/// What a completed conversion hands back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobResult {
  pub download_url: String,
  pub title: Option<String>,
  pub thumbnail: Option<String>,
  pub channel: Option<String>,
  pub duration: Option<String>,
}

/// Classified answer of the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
  Completed(JobResult),
  Failed(Option<String>),
  InProgress(String),
}

impl JobStatus {
  pub fn is_terminal(&self) -> bool {
    !matches!(self, JobStatus::InProgress(_))
  }
}

/// The remote services the UI talks to.
#[async_trait]
pub trait VideoApi: Send + Sync {
  async fn search(&self, query: &str) -> Result<Vec<VideoSummary>, Error>;
  /// Start a conversion and return the provider's job handle.
  async fn submit(&self, request: &ConversionRequest) -> Result<String, Error>;
  async fn status(&self, job_id: &str) -> Result<JobStatus, Error>;
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
  #[serde(default)]
  contents: Vec<ContentItem>,
  message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentItem {
  video: Option<RawVideo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVideo {
  video_id: String,
  #[serde(default)]
  title: String,
  #[serde(default)]
  channel_name: String,
  #[serde(default)]
  thumbnails: Vec<Thumbnail>,
  length_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
  url: String,
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
  url: String,
  format: &'a Format,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
  success: Option<bool>,
  job_id: Option<Value>,
  message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
  status: Option<String>,
  download_url: Option<String>,
  title: Option<String>,
  thumbnail: Option<String>,
  channel: Option<String>,
  uploader: Option<String>,
  duration: Option<Value>,
  message: Option<String>,
}

// --- Parsing ---

/// Render a loosely typed scalar (string or number) as text.
fn scalar_text(value: Option<Value>) -> Option<String> {
  match value? {
    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, Error> {
  serde_json::from_str(body).map_err(|e| Error::MalformedResponse(e.to_string()))
}

/// Turn a search payload into summaries, dropping channel and playlist entries.
pub fn parse_search_response(body: &str) -> Result<Vec<VideoSummary>, Error> {
  let response: SearchResponse = parse_json(body)?;
  if let Some(message) = response.message {
    return Err(Error::Provider(message));
  }
  Ok(
    response
      .contents
      .into_iter()
      .filter_map(|item| item.video)
      .map(|v| VideoSummary {
        id: v.video_id,
        title: v.title,
        channel: v.channel_name,
        thumbnail: v.thumbnails.into_iter().last().map(|t| t.url),
        duration: v.length_text.filter(|s| !s.is_empty()),
      })
      .collect(),
  )
}

/// Extract the job handle from a submission payload.
pub fn parse_submit_response(body: &str) -> Result<String, Error> {
  let response: SubmitResponse = parse_json(body)?;
  match (response.success, scalar_text(response.job_id)) {
    (Some(true), Some(job_id)) => Ok(job_id),
    _ => Err(Error::Provider(response.message.unwrap_or_else(|| constants().submit_fallback_message.clone()))),
  }
}

pub fn parse_status_response(body: &str) -> Result<JobStatus, Error> {
  let response: StatusResponse = parse_json(body)?;
  let status = response.status.unwrap_or_default();
  match status.as_str() {
    "completed" => {
      let download_url = response
        .download_url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::MalformedResponse("completed job has no download URL".to_string()))?;
      Ok(JobStatus::Completed(JobResult {
        download_url,
        title: response.title,
        thumbnail: response.thumbnail,
        channel: response.channel.or(response.uploader),
        duration: scalar_text(response.duration),
      }))
    }
    "failed" => Ok(JobStatus::Failed(response.message)),
    _ => Ok(JobStatus::InProgress(status)),
  }
}

/// Reject non-2xx answers. The provider reports quota errors as JSON with a 429, so a `message`
/// in the body is kept as a provider error; anything else becomes the bare HTTP status.
pub fn check_body(status: StatusCode, body: String) -> Result<String, Error> {
  if status.is_success() {
    return Ok(body);
  }
  let message = serde_json::from_str::<Value>(&body)
    .ok()
    .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
    .filter(|m| !m.trim().is_empty());
  match message {
    Some(message) => Err(Error::Provider(message)),
    None => Err(Error::Network(format!("HTTP {}", status))),
  }
}

// --- HTTP client ---

/// Client for the RapidAPI-hosted search and conversion services.
pub struct RapidApiClient {
  http: Client,
  key: String,
  search_host: String,
  download_host: String,
}

impl RapidApiClient {
  pub fn new(config: &ApiConfig) -> Self {
    Self {
      http: Client::new(),
      key: config.key.clone(),
      search_host: config.search_host.clone(),
      download_host: config.download_host.clone(),
    }
  }

  pub fn http_client(&self) -> Client {
    self.http.clone()
  }

  async fn read_body(response: reqwest::Response) -> Result<String, Error> {
    let status = response.status();
    let body = response.text().await?;
    check_body(status, body)
  }
}

#[async_trait]
impl VideoApi for RapidApiClient {
  async fn search(&self, query: &str) -> Result<Vec<VideoSummary>, Error> {
    let url = Url::parse_with_params(&format!("https://{}/search", self.search_host), &[("query", query)])
      .map_err(|e| Error::Network(e.to_string()))?;
    let response = self
      .http
      .get(url)
      .header("X-RapidAPI-Key", &self.key)
      .header("X-RapidAPI-Host", &self.search_host)
      .send()
      .await?;
    let body = Self::read_body(response).await?;
    parse_search_response(&body)
  }

  async fn submit(&self, request: &ConversionRequest) -> Result<String, Error> {
    let body = SubmitBody { url: request.source_url(), format: &request.format };
    let response = self
      .http
      .post(format!("https://{}/download", self.download_host))
      .header("X-RapidAPI-Key", &self.key)
      .header("X-RapidAPI-Host", &self.download_host)
      .json(&body)
      .send()
      .await?;
    let body = Self::read_body(response).await?;
    parse_submit_response(&body)
  }

  async fn status(&self, job_id: &str) -> Result<JobStatus, Error> {
    let response = self
      .http
      .get(format!("https://{}/{}", self.download_host, job_id))
      .header("X-RapidAPI-Key", &self.key)
      .header("X-RapidAPI-Host", &self.download_host)
      .send()
      .await?;
    let body = Self::read_body(response).await?;
    let status = parse_status_response(&body)?;
    debug!(job_id, ?status, "status response");
    Ok(status)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SEARCH_BODY: &str = r#"{
    "contents": [
      {"video": {"videoId": "abc", "title": "First", "channelName": "Chan",
        "lengthText": "3:12",
        "thumbnails": [{"url": "small.jpg", "width": 120}, {"url": "big.jpg", "width": 720}]}},
      {"channel": {"channelId": "UC1", "title": "Some channel"}},
      {"playlist": {"playlistId": "PL1"}},
      {"video": {"videoId": "def", "title": "Second", "channelName": "Other", "thumbnails": []}}
    ],
    "estimatedResults": "100"
  }"#;

  #[test]
  fn search_keeps_only_videos() {
    let results = parse_search_response(SEARCH_BODY).unwrap();
    let ids: Vec<&str> = results.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, ["abc", "def"]);
  }

  #[test]
  fn search_picks_last_thumbnail() {
    let results = parse_search_response(SEARCH_BODY).unwrap();
    assert_eq!(results[0].thumbnail.as_deref(), Some("big.jpg"));
    assert_eq!(results[0].duration.as_deref(), Some("3:12"));
    assert_eq!(results[1].thumbnail, None);
  }

  #[test]
  fn search_message_is_an_error() {
    let err = parse_search_response(r#"{"message": "Invalid API key"}"#).unwrap_err();
    assert_eq!(err, Error::Provider("Invalid API key".into()));
  }

  #[test]
  fn search_without_contents_is_empty() {
    assert!(parse_search_response("{}").unwrap().is_empty());
  }

  #[test]
  fn search_garbage_is_malformed() {
    assert!(matches!(parse_search_response("<html>"), Err(Error::MalformedResponse(_))));
  }

  #[test]
  fn submit_needs_success_and_job_id() {
    assert_eq!(parse_submit_response(r#"{"success": true, "jobId": "j1"}"#).unwrap(), "j1");
    assert_eq!(parse_submit_response(r#"{"success": true, "jobId": 42}"#).unwrap(), "42");

    let err = parse_submit_response(r#"{"success": false}"#).unwrap_err();
    assert_eq!(err, Error::Provider(constants().submit_fallback_message.clone()));

    let err = parse_submit_response(r#"{"success": true, "message": "no handle"}"#).unwrap_err();
    assert_eq!(err, Error::Provider("no handle".into()));
  }

  #[test]
  fn status_classification() {
    let done = parse_status_response(
      r#"{"status": "completed", "downloadUrl": "https://cdn/x.mp4", "title": "T", "uploader": "U", "duration": 95}"#,
    )
    .unwrap();
    let JobStatus::Completed(result) = done else { panic!("expected completed") };
    assert_eq!(result.download_url, "https://cdn/x.mp4");
    assert_eq!(result.channel.as_deref(), Some("U"));
    assert_eq!(result.duration.as_deref(), Some("95"));

    assert_eq!(
      parse_status_response(r#"{"status": "failed", "message": "boom"}"#).unwrap(),
      JobStatus::Failed(Some("boom".into()))
    );
    assert_eq!(
      parse_status_response(r#"{"status": "processing"}"#).unwrap(),
      JobStatus::InProgress("processing".into())
    );
    assert_eq!(parse_status_response("{}").unwrap(), JobStatus::InProgress(String::new()));
  }

  #[test]
  fn completed_without_url_is_malformed() {
    assert!(matches!(parse_status_response(r#"{"status": "completed"}"#), Err(Error::MalformedResponse(_))));
  }

  #[test]
  fn error_status_without_message_is_a_failed_search() {
    let err = check_body(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error": "upstream down"}"#.into()).unwrap_err();
    assert_eq!(err, Error::Network("HTTP 500 Internal Server Error".into()));
    let err = check_body(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>".into()).unwrap_err();
    assert_eq!(err.to_string(), "HTTP 502 Bad Gateway");
  }

  #[test]
  fn error_status_keeps_provider_message() {
    let body = r#"{"message": "You have exceeded the MONTHLY quota for Requests on your current plan"}"#;
    let err = check_body(StatusCode::TOO_MANY_REQUESTS, body.into()).unwrap_err();
    assert!(matches!(&err, Error::Provider(m) if m.contains("MONTHLY quota")));
    assert_eq!(err.normalized(), Error::QuotaExceeded);
  }

  #[test]
  fn success_status_passes_body_through() {
    assert_eq!(check_body(StatusCode::OK, "{}".into()).unwrap(), "{}");
  }

  #[test]
  fn request_url_points_at_watch_page() {
    let req = ConversionRequest { video_id: "abc".into(), format: Format::Mp3 };
    assert_eq!(req.source_url(), "https://www.youtube.com/watch?v=abc");
    assert_eq!(serde_json::to_string(&Format::Mp3).unwrap(), "\"mp3\"");
  }
}
