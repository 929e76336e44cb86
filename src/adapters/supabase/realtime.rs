//! Row change feed over the realtime websocket (Phoenix channel protocol).
//!
//! Each channel owns one socket. A lost socket is reported once as
//! `Closed`; the channel then stays quiet until `resubscribe` reconnects.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{
    ChangeKind, ChangeSubscription, ChannelEvent, ChannelStatus, RealtimeChannel,
    RealtimeTransport, RowChange, Table,
};

use super::client::SupabaseConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HEARTBEAT_TOPIC: &str = "phoenix";

/// Socket timing.
#[derive(Debug, Clone, Copy)]
pub struct RealtimeSettings {
    pub heartbeat_interval: Duration,
    /// How long a join may wait for its reply.
    pub join_timeout: Duration,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: JsonValue,
    #[serde(default, rename = "ref")]
    reference: Option<String>,
}

pub struct SupabaseRealtime {
    url: String,
    access_token: Arc<RwLock<Option<SecretString>>>,
    settings: RealtimeSettings,
}

impl SupabaseRealtime {
    pub fn new(config: &SupabaseConfig) -> Self {
        Self {
            url: config.realtime_url(),
            access_token: Arc::new(RwLock::new(None)),
            settings: RealtimeSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RealtimeSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[async_trait]
impl RealtimeTransport for SupabaseRealtime {
    async fn set_auth(&self, access_token: &str) {
        let mut slot = self.access_token.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(SecretString::new(access_token.to_string()));
    }

    async fn open_channel(
        &self,
        name: &str,
        subscriptions: Vec<ChangeSubscription>,
    ) -> Result<Box<dyn RealtimeChannel>, DomainError> {
        let mut channel = SocketChannel {
            name: name.to_string(),
            topic: format!("realtime:{}", name),
            url: self.url.clone(),
            subscriptions,
            access_token: self.access_token.clone(),
            settings: self.settings,
            socket: None,
            joined: false,
            closed: false,
            next_ref: 0,
            bindings: HashMap::new(),
            pending: VecDeque::new(),
            next_heartbeat: Instant::now(),
        };
        channel.connect_and_join().await?;
        Ok(Box::new(channel))
    }
}

enum Step {
    Message(Option<Result<Message, tungstenite::Error>>),
    Heartbeat,
}

struct SocketChannel {
    name: String,
    topic: String,
    url: String,
    subscriptions: Vec<ChangeSubscription>,
    access_token: Arc<RwLock<Option<SecretString>>>,
    settings: RealtimeSettings,
    socket: Option<Socket>,
    joined: bool,
    closed: bool,
    next_ref: u64,
    /// Server-assigned binding id to subscription index.
    bindings: HashMap<i64, usize>,
    pending: VecDeque<ChannelEvent>,
    next_heartbeat: Instant,
}

impl SocketChannel {
    fn make_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    fn token(&self) -> Option<String> {
        let slot = self.access_token.read().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|t| t.expose_secret().clone())
    }

    async fn send(&mut self, frame: Frame) -> Result<(), DomainError> {
        let text = serde_json::to_string(&frame)
            .map_err(|e| DomainError::new(ErrorCode::SerializationError, e.to_string()))?;
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| realtime_error("socket not connected"))?;
        socket.send(Message::Text(text)).await.map_err(realtime_error)
    }

    async fn connect_and_join(&mut self) -> Result<(), DomainError> {
        if self.socket.is_none() {
            let (socket, _) = connect_async(self.url.as_str())
                .await
                .map_err(realtime_error)?;
            debug!(channel = %self.name, "realtime socket connected");
            self.socket = Some(socket);
            self.next_heartbeat = Instant::now() + self.settings.heartbeat_interval;
        }

        let join_ref = self.make_ref();
        let payload = join_payload(&self.subscriptions, self.token().as_deref());
        let frame = Frame {
            topic: self.topic.clone(),
            event: "phx_join".to_string(),
            payload,
            reference: Some(join_ref.clone()),
        };
        let joined = match self.send(frame).await {
            Ok(()) => timeout(self.settings.join_timeout, self.await_reply(&join_ref))
                .await
                .unwrap_or_else(|_| Err(realtime_error("join timed out"))),
            Err(e) => Err(e),
        };

        match joined {
            Ok(response) => {
                self.bindings = bind(&self.subscriptions, &response);
                self.joined = true;
                self.pending.push_back(ChannelEvent::Status(ChannelStatus::Subscribed));
                info!(channel = %self.name, bindings = self.bindings.len(), "channel joined");
                Ok(())
            }
            Err(e) => {
                self.drop_socket();
                Err(e)
            }
        }
    }

    /// Reads frames until the reply to `join_ref` arrives.
    async fn await_reply(&mut self, join_ref: &str) -> Result<JsonValue, DomainError> {
        loop {
            let socket = self
                .socket
                .as_mut()
                .ok_or_else(|| realtime_error("socket not connected"))?;
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let Some(frame) = parse_frame(&text) else {
                        continue;
                    };
                    if frame.topic == self.topic
                        && frame.event == "phx_reply"
                        && frame.reference.as_deref() == Some(join_ref)
                    {
                        return reply_result(&frame.payload);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(realtime_error("socket closed during join"))
                }
                Some(Err(e)) => return Err(realtime_error(e)),
                Some(Ok(_)) => {}
            }
        }
    }

    fn drop_socket(&mut self) {
        self.socket = None;
        self.joined = false;
        self.bindings.clear();
    }

    /// Reports a lost socket once.
    fn lose_connection(&mut self, reason: &str) {
        if self.socket.is_some() {
            warn!(channel = %self.name, reason, "realtime socket lost");
            self.drop_socket();
            self.pending.push_back(ChannelEvent::Status(ChannelStatus::Closed));
        }
    }

    async fn heartbeat(&mut self) {
        self.next_heartbeat = Instant::now() + self.settings.heartbeat_interval;
        let frame = Frame {
            topic: HEARTBEAT_TOPIC.to_string(),
            event: "heartbeat".to_string(),
            payload: json!({}),
            reference: Some(self.make_ref()),
        };
        if let Err(e) = self.send(frame).await {
            self.lose_connection(&e.message);
        }
    }

    fn handle_text(&mut self, text: &str) {
        let Some(frame) = parse_frame(text) else {
            debug!(channel = %self.name, "ignoring undecodable frame");
            return;
        };
        if frame.topic != self.topic {
            return;
        }
        match frame.event.as_str() {
            "postgres_changes" => {
                let events = decode_changes(&frame.payload, &self.subscriptions, &self.bindings);
                self.pending.extend(events);
            }
            "phx_error" => self.fail(ChannelStatus::ChannelError),
            "phx_close" => self.fail(ChannelStatus::Closed),
            "system" if frame.payload.get("status").and_then(JsonValue::as_str) == Some("error") => {
                warn!(channel = %self.name, payload = %frame.payload, "realtime system error");
                self.fail(ChannelStatus::ChannelError);
            }
            other => trace!(channel = %self.name, event = other, "ignoring event"),
        }
    }

    fn fail(&mut self, status: ChannelStatus) {
        self.joined = false;
        self.pending.push_back(ChannelEvent::Status(status));
    }
}

#[async_trait]
impl RealtimeChannel for SocketChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_joined(&self) -> bool {
        self.joined
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.closed {
                return None;
            }
            let heartbeat_at = self.next_heartbeat;
            let step = match self.socket.as_mut() {
                None => return futures::future::pending().await,
                Some(socket) => tokio::select! {
                    message = socket.next() => Step::Message(message),
                    _ = sleep_until(heartbeat_at) => Step::Heartbeat,
                },
            };
            match step {
                Step::Message(Some(Ok(Message::Text(text)))) => self.handle_text(&text),
                Step::Message(Some(Ok(Message::Close(_)))) | Step::Message(None) => {
                    self.lose_connection("closed by server")
                }
                Step::Message(Some(Err(e))) => self.lose_connection(&e.to_string()),
                Step::Message(Some(Ok(_))) => {}
                Step::Heartbeat => self.heartbeat().await,
            }
        }
    }

    async fn resubscribe(&mut self) -> Result<(), DomainError> {
        if self.closed {
            return Err(realtime_error("channel closed"));
        }
        self.joined = false;
        self.connect_and_join().await
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.joined {
            let frame = Frame {
                topic: self.topic.clone(),
                event: "phx_leave".to_string(),
                payload: json!({}),
                reference: Some(self.make_ref()),
            };
            let _ = self.send(frame).await;
        }
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None).await;
        }
        self.joined = false;
        self.pending.clear();
    }
}

fn realtime_error(err: impl fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::RealtimeError, err.to_string())
}

fn parse_frame(text: &str) -> Option<Frame> {
    serde_json::from_str(text).ok()
}

fn join_payload(subscriptions: &[ChangeSubscription], access_token: Option<&str>) -> JsonValue {
    let changes: Vec<JsonValue> = subscriptions
        .iter()
        .map(|sub| {
            let mut binding = json!({
                "event": "*",
                "schema": "public",
                "table": sub.table.as_str(),
            });
            if let Some(filter) = &sub.filter {
                binding["filter"] = JsonValue::String(filter.to_string());
            }
            binding
        })
        .collect();

    let mut payload = json!({
        "config": {
            "broadcast": { "self": false },
            "presence": { "key": "" },
            "postgres_changes": changes,
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = JsonValue::String(token.to_string());
    }
    payload
}

fn reply_result(payload: &JsonValue) -> Result<JsonValue, DomainError> {
    let response = payload.get("response").cloned().unwrap_or(JsonValue::Null);
    match payload.get("status").and_then(JsonValue::as_str) {
        Some("ok") => Ok(response),
        status => Err(realtime_error(format!(
            "join rejected ({}): {}",
            status.unwrap_or("no status"),
            response
        ))),
    }
}

/// Maps the server's binding ids onto subscription indexes by table and
/// filter, each subscription taken at most once.
fn bind(subscriptions: &[ChangeSubscription], response: &JsonValue) -> HashMap<i64, usize> {
    let mut bindings = HashMap::new();
    let mut taken = vec![false; subscriptions.len()];
    let Some(entries) = response.get("postgres_changes").and_then(JsonValue::as_array) else {
        return bindings;
    };
    for entry in entries {
        let Some(id) = entry.get("id").and_then(JsonValue::as_i64) else {
            continue;
        };
        let table = entry.get("table").and_then(JsonValue::as_str);
        let filter = entry.get("filter").and_then(JsonValue::as_str).unwrap_or("");
        let found = subscriptions.iter().enumerate().position(|(i, sub)| {
            !taken[i]
                && Some(sub.table.as_str()) == table
                && sub.filter.as_ref().map(|f| f.to_string()).unwrap_or_default() == filter
        });
        if let Some(index) = found {
            taken[index] = true;
            bindings.insert(id, index);
        }
    }
    bindings
}

/// Decodes a `postgres_changes` payload into one event per matching
/// subscription.
fn decode_changes(
    payload: &JsonValue,
    subscriptions: &[ChangeSubscription],
    bindings: &HashMap<i64, usize>,
) -> Vec<ChannelEvent> {
    let data = &payload["data"];
    let (Some(table), Some(kind)) = (
        data["table"].as_str().and_then(Table::parse),
        data["type"].as_str().and_then(ChangeKind::parse),
    ) else {
        debug!(payload = %payload, "ignoring change for unknown table or type");
        return Vec::new();
    };
    let row = |key: &str| data.get(key).filter(|v| !v.is_null()).cloned();
    let change = RowChange {
        table,
        kind,
        new: row("record"),
        old: row("old_record"),
        commit_timestamp: data
            .get("commit_timestamp")
            .and_then(|v| serde_json::from_value::<Timestamp>(v.clone()).ok()),
    };

    let mut indexes: Vec<usize> = payload["ids"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(JsonValue::as_i64)
                .filter_map(|id| bindings.get(&id).copied())
                .collect()
        })
        .unwrap_or_default();
    if indexes.is_empty() {
        indexes = subscriptions
            .iter()
            .enumerate()
            .filter(|(_, sub)| sub.matches(&change))
            .map(|(i, _)| i)
            .collect();
    }
    indexes.sort_unstable();
    indexes.dedup();

    indexes
        .into_iter()
        .map(|subscription| ChannelEvent::Change {
            subscription,
            change: change.clone(),
        })
        .collect()
}
