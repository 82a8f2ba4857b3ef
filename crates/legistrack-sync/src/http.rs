//! HTTP client for the hosted database (PostgREST) and the analysis trigger function.

use async_trait::async_trait;
use legistrack_core::{AnalysisRecord, TriggerOutcome};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{AnalysisBackend, SyncError};

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Project URL, e.g. `https://abcd.supabase.co` (no trailing slash needed).
    pub base_url: String,
    /// Public API key sent as the `apikey` header.
    pub api_key: String,
    /// Signed-in user's access token. Falls back to `api_key` when absent.
    pub access_token: Option<String>,
    pub table: String,
    pub subject_column: String,
    pub trigger_function: String,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            access_token: None,
            table: "bill_analyses".into(),
            subject_column: "bill_id".into(),
            trigger_function: "analyze-bill".into(),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// [`AnalysisBackend`] backed by the hosted REST API.
pub struct RestBackend {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl RestBackend {
    pub fn new(mut config: RemoteConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn bearer(&self) -> &str {
        self.config
            .access_token
            .as_deref()
            .unwrap_or(&self.config.api_key)
    }

    fn latest_request(&self, subject_id: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/rest/v1/{}", self.config.base_url, self.config.table);
        self.client
            .get(url)
            .query(&[
                ("select", "*".to_string()),
                (self.config.subject_column.as_str(), format!("eq.{subject_id}")),
                ("order", "created_at.desc".to_string()),
                ("limit", "1".to_string()),
            ])
            .header("apikey", &self.config.api_key)
            .bearer_auth(self.bearer())
    }

    fn trigger_request(&self, subject_id: &str) -> reqwest::RequestBuilder {
        let url = format!(
            "{}/functions/v1/{}",
            self.config.base_url, self.config.trigger_function
        );
        self.client
            .post(url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(self.bearer())
            .json(&serde_json::json!({ "bill_id": subject_id }))
    }
}

#[async_trait]
impl AnalysisBackend for RestBackend {
    async fn fetch_latest(&self, subject_id: &str) -> Result<Option<AnalysisRecord>, SyncError> {
        debug!(subject = %subject_id, "fetching latest analysis");
        let resp = self.latest_request(subject_id).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }
        parse_latest(&body)
    }

    async fn trigger(&self, subject_id: &str) -> Result<TriggerOutcome, SyncError> {
        info!(subject = %subject_id, "requesting analysis");
        let resp = self.trigger_request(subject_id).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let outcome = parse_trigger(status, &body);
        match &outcome {
            Ok(o) => info!(subject = %subject_id, outcome = ?o, "analysis request accepted"),
            Err(e) => warn!(subject = %subject_id, status = status.as_u16(), error = %e, "analysis request rejected"),
        }
        outcome
    }
}

/// Newest row of a PostgREST result array.
fn parse_latest(body: &str) -> Result<Option<AnalysisRecord>, SyncError> {
    let rows: Vec<AnalysisRecord> = serde_json::from_str(body)?;
    Ok(rows.into_iter().max_by_key(|r| r.created_at))
}

fn parse_trigger(status: StatusCode, body: &str) -> Result<TriggerOutcome, SyncError> {
    if status.is_success() {
        return Ok(serde_json::from_str(body)?);
    }
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("analysis request failed")
                .to_string()
        });
    Err(SyncError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RestBackend {
        let mut config = RemoteConfig::new("https://demo.example.co/", "anon-key");
        config.access_token = Some("user-jwt".into());
        RestBackend::new(config)
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        assert_eq!(backend().config.base_url, "https://demo.example.co");
    }

    #[test]
    fn latest_request_filters_and_orders() {
        let req = backend().latest_request("hr 1234").build().unwrap();
        assert_eq!(req.method(), reqwest::Method::GET);
        assert_eq!(
            req.url().as_str(),
            "https://demo.example.co/rest/v1/bill_analyses?select=*&bill_id=eq.hr+1234&order=created_at.desc&limit=1"
        );
        assert_eq!(req.headers()["apikey"], "anon-key");
        assert_eq!(req.headers()["authorization"], "Bearer user-jwt");
    }

    #[test]
    fn trigger_request_posts_bill_id() {
        let req = backend().trigger_request("hr-1234").build().unwrap();
        assert_eq!(req.method(), reqwest::Method::POST);
        assert_eq!(
            req.url().as_str(),
            "https://demo.example.co/functions/v1/analyze-bill"
        );
        let body = req.body().and_then(|b| b.as_bytes()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(json["bill_id"], "hr-1234");
    }

    #[test]
    fn bearer_falls_back_to_api_key() {
        let backend = RestBackend::new(RemoteConfig::new("https://demo.example.co", "anon-key"));
        let req = backend.trigger_request("hr-1").build().unwrap();
        assert_eq!(req.headers()["authorization"], "Bearer anon-key");
    }

    #[test]
    fn latest_empty_is_none() {
        assert!(parse_latest("[]").unwrap().is_none());
    }

    #[test]
    fn latest_picks_newest_row() {
        let body = r#"[
            {"id":"old","bill_id":"hr-1","created_at":"2025-07-01T00:00:00Z","content":""},
            {"id":"new","bill_id":"hr-1","created_at":"2025-07-09T00:00:00Z","content":""}
        ]"#;
        assert_eq!(parse_latest(body).unwrap().unwrap().id, "new");
    }

    #[test]
    fn latest_malformed_is_json_error() {
        assert!(matches!(parse_latest("{oops"), Err(SyncError::Json(_))));
    }

    #[test]
    fn trigger_success_statuses() {
        assert_eq!(
            parse_trigger(StatusCode::OK, r#"{"status":"current"}"#).unwrap(),
            TriggerOutcome::Current
        );
        assert_eq!(
            parse_trigger(StatusCode::ACCEPTED, r#"{"status":"queued"}"#).unwrap(),
            TriggerOutcome::Queued
        );
    }

    #[test]
    fn trigger_rejection_uses_message_field() {
        let err = parse_trigger(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"message":"rate limited"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::Rejected { status: 500, .. }));
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn trigger_rejection_falls_back_to_error_then_body_then_reason() {
        let err = parse_trigger(StatusCode::UNAUTHORIZED, r#"{"error":"invalid JWT"}"#).unwrap_err();
        assert_eq!(err.to_string(), "invalid JWT");

        let err = parse_trigger(StatusCode::BAD_GATEWAY, "upstream down\n").unwrap_err();
        assert_eq!(err.to_string(), "upstream down");

        let err = parse_trigger(StatusCode::SERVICE_UNAVAILABLE, "").unwrap_err();
        assert_eq!(err.to_string(), "Service Unavailable");
    }
}
