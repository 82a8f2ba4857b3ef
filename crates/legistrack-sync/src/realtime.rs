//! Insert notifications from the hosted realtime service.
//!
//! The service speaks Phoenix channels over a websocket. A client joins a
//! topic carrying a `postgres_changes` filter, sends a heartbeat every 30 s,
//! and then receives one `postgres_changes` frame per inserted row.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use legistrack_core::AnalysisRecord;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::{ChangeNotifier, RemoteConfig, Subscription, SyncError};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// [`ChangeNotifier`] backed by the hosted realtime websocket.
///
/// Every subscription owns one socket task. The task reconnects with backoff
/// and exits once the subscription is dropped.
#[derive(Debug, Clone)]
pub struct RealtimeNotifier {
    config: RemoteConfig,
}

impl RealtimeNotifier {
    pub fn new(mut config: RemoteConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self { config }
    }
}

impl ChangeNotifier for RealtimeNotifier {
    fn subscribe(&self, subject_id: &str) -> Result<Subscription, SyncError> {
        let url = socket_url(&self.config)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SyncError::Other(format!("realtime feed needs a tokio runtime: {e}")))?;
        let (tx, subscription) = Subscription::channel(subject_id);
        let feed = Feed {
            subject_id: subject_id.to_string(),
            url,
            join: join_message(&self.config, subject_id),
        };
        runtime.spawn(feed.run(tx));
        debug!(subject = %subject_id, "opened realtime subscription");
        Ok(subscription)
    }
}

struct Feed {
    subject_id: String,
    url: String,
    join: String,
}

impl Feed {
    async fn run(self, tx: mpsc::UnboundedSender<AnalysisRecord>) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.session(&tx, &mut backoff).await {
                Ok(()) => break,
                Err(e) => warn!(subject = %self.subject_id, error = %e, "realtime feed dropped"),
            }
            tokio::select! {
                () = tx.closed() => break,
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        debug!(subject = %self.subject_id, "realtime feed stopped");
    }

    /// One socket connection. `Ok` means the subscriber went away.
    async fn session(
        &self,
        tx: &mpsc::UnboundedSender<AnalysisRecord>,
        backoff: &mut Duration,
    ) -> Result<(), SyncError> {
        let (mut ws, _) = tokio::select! {
            () = tx.closed() => return Ok(()),
            connected = connect_async(self.url.as_str()) => connected?,
        };
        ws.send(Message::Text(self.join.clone())).await?;
        info!(subject = %self.subject_id, "realtime feed joined");
        *backoff = INITIAL_BACKOFF;

        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
        let mut next_ref: u64 = 1;
        loop {
            tokio::select! {
                () = tx.closed() => {
                    let _ = ws.close(None).await;
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    next_ref += 1;
                    ws.send(Message::Text(heartbeat_message(next_ref))).await?;
                }
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        Frame::Insert(record) => {
                            debug!(subject = %self.subject_id, record = %record.id, "realtime insert");
                            if tx.send(record).is_err() {
                                return Ok(());
                            }
                        }
                        Frame::Refused(reason) => {
                            return Err(SyncError::Other(format!("realtime join refused: {reason}")));
                        }
                        Frame::Ignored => {}
                    },
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(SyncError::FeedClosed(self.subject_id.clone())),
                },
            }
        }
    }
}

/// Websocket endpoint for the project URL (`https` becomes `wss`).
fn socket_url(config: &RemoteConfig) -> Result<String, SyncError> {
    let base = &config.base_url;
    let host = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(SyncError::Other(format!("unsupported project URL: {base}")));
    };
    Ok(format!(
        "{host}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        config.api_key
    ))
}

fn join_message(config: &RemoteConfig, subject_id: &str) -> String {
    let filter = format!("{}=eq.{subject_id}", config.subject_column);
    json!({
        "topic": format!("realtime:{}:{filter}", config.table),
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "INSERT",
                    "schema": "public",
                    "table": config.table,
                    "filter": filter,
                }],
            },
            "access_token": config.access_token.as_deref().unwrap_or(&config.api_key),
        },
        "ref": "1",
        "join_ref": "1",
    })
    .to_string()
}

fn heartbeat_message(msg_ref: u64) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug)]
enum Frame {
    Insert(AnalysisRecord),
    Refused(String),
    Ignored,
}

fn parse_frame(text: &str) -> Frame {
    let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
        return Frame::Ignored;
    };
    let payload = envelope.payload;
    match envelope.event.as_str() {
        "postgres_changes" => {
            let data = &payload["data"];
            if data["type"] != "INSERT" {
                return Frame::Ignored;
            }
            match serde_json::from_value(data["record"].clone()) {
                Ok(record) => Frame::Insert(record),
                Err(e) => {
                    warn!(error = %e, "unreadable realtime insert");
                    Frame::Ignored
                }
            }
        }
        "phx_reply" if payload["status"] == "error" => Frame::Refused(
            payload["response"]["reason"]
                .as_str()
                .unwrap_or("join refused")
                .to_string(),
        ),
        "phx_error" => Frame::Refused("channel error".to_string()),
        _ => Frame::Ignored,
    }
}
