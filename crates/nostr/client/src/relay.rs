//! Single relay connection management.

use crate::error::{ClientError, Result};
use crate::subscription::Subscription;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use nostr::Event;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type SubscriptionMap = Arc<Mutex<HashMap<String, Subscription>>>;
type PendingOks = Arc<Mutex<HashMap<String, oneshot::Sender<(bool, String)>>>>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Relay message received from a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event(String, Value),
    Ok(String, bool, String),
    Eose(String),
    Notice(String),
    Auth(String),
}

/// The relay's `OK` reply to a published event.
#[derive(Debug, Clone)]
pub struct PublishConfirmation {
    pub relay_url: String,
    pub event_id: String,
    pub accepted: bool,
    pub message: String,
}

/// Relay connection configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub connect_timeout: Duration,
    /// How long `publish` waits for the relay's `OK`.
    pub publish_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(10),
        }
    }
}

/// Relay connection.
///
/// `EVENT` and `EOSE` frames are routed to their subscription and `OK` frames
/// to the pending [`RelayConnection::publish`] call. Anything unclaimed is
/// logged and dropped.
pub struct RelayConnection {
    url: Url,
    config: RelayConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    writer: Arc<Mutex<Option<WsWriter>>>,
    subscriptions: SubscriptionMap,
    pending_oks: PendingOks,
    recv_task: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl RelayConnection {
    /// Create a new relay connection with default config.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, RelayConfig::default())
    }

    /// Create a new relay connection with custom config.
    pub fn with_config(url: &str, config: RelayConfig) -> Result<Self> {
        let parsed_url = Url::parse(url)?;
        if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed_url.scheme()
            )));
        }

        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            url: parsed_url,
            config,
            state: Arc::new(state),
            writer: Arc::new(Mutex::new(None)),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            pending_oks: Arc::new(Mutex::new(HashMap::new())),
            recv_task: Arc::new(Mutex::new(None)),
        })
    }

    /// Relay URL as string.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Resolves once the connection reaches [`ConnectionState::Connected`].
    pub async fn wait_connected(&self) -> Result<()> {
        let mut state = self.state.subscribe();
        state
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::NotConnected)
    }

    /// Connect to relay and start background receive loop.
    pub async fn connect(&self) -> Result<()> {
        if self.state() == ConnectionState::Connected {
            return Err(ClientError::AlreadyConnected);
        }
        self.state.send_replace(ConnectionState::Connecting);

        let connected = timeout(
            self.config.connect_timeout,
            connect_async(self.url.as_str()),
        )
        .await;
        let (stream, _response) = match connected {
            Ok(Ok(connected)) => connected,
            Ok(Err(error)) => {
                self.state.send_replace(ConnectionState::Disconnected);
                return Err(ClientError::WebSocket(error.to_string()));
            }
            Err(_) => {
                self.state.send_replace(ConnectionState::Disconnected);
                return Err(ClientError::Timeout(format!(
                    "connection timeout after {:?}",
                    self.config.connect_timeout
                )));
            }
        };

        let (writer, mut reader) = stream.split();
        *self.writer.lock().await = Some(writer);
        self.state.send_replace(ConnectionState::Connected);
        debug!(relay = %self.url, "relay connected");

        let subscriptions = Arc::clone(&self.subscriptions);
        let pending_oks = Arc::clone(&self.pending_oks);
        let state = Arc::clone(&self.state);
        let relay_url = self.url.to_string();

        let task = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match parse_relay_message(text.as_str()) {
                        Ok(Some(message)) => {
                            route_message(&subscriptions, &pending_oks, message, &relay_url).await;
                        }
                        Ok(None) => {}
                        Err(error) => {
                            warn!(relay = %relay_url, %error, "relay protocol parse error");
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        warn!(relay = %relay_url, %error, "websocket read error");
                        break;
                    }
                }
            }

            // Dropping the senders ends every pending subscription and publish.
            subscriptions.lock().await.clear();
            pending_oks.lock().await.clear();
            state.send_replace(ConnectionState::Disconnected);
            debug!(relay = %relay_url, "relay disconnected");
        });

        *self.recv_task.lock().await = Some(task);
        Ok(())
    }

    /// Disconnect from relay and stop background tasks.
    pub async fn disconnect(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer
                .send(Message::Close(None))
                .await
                .map_err(|error| ClientError::WebSocket(error.to_string()))?;
        }

        if let Some(task) = self.recv_task.lock().await.take() {
            task.abort();
        }

        self.subscriptions.lock().await.clear();
        self.pending_oks.lock().await.clear();
        self.state.send_replace(ConnectionState::Disconnected);
        Ok(())
    }

    /// Submit a signed event as `["EVENT", <event>]` and wait for the relay's
    /// `OK`. A rejection is returned with `accepted == false`.
    pub async fn publish(&self, event: &Event) -> Result<PublishConfirmation> {
        let frame = event.to_event_message()?;
        let (ok_tx, ok_rx) = oneshot::channel();
        self.pending_oks.lock().await.insert(event.id.clone(), ok_tx);
        if let Err(error) = self.send_text(frame).await {
            self.pending_oks.lock().await.remove(&event.id);
            return Err(error);
        }

        let reply = timeout(self.config.publish_timeout, ok_rx).await;
        let (accepted, message) = match reply {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => {
                return Err(ClientError::Connection(
                    "connection closed before OK".to_string(),
                ));
            }
            Err(_) => {
                self.pending_oks.lock().await.remove(&event.id);
                return Err(ClientError::Timeout(format!(
                    "no OK for {} after {:?}",
                    event.id, self.config.publish_timeout
                )));
            }
        };

        if !accepted {
            warn!(relay = %self.url, event_id = %event.id, %message, "relay rejected event");
        }
        Ok(PublishConfirmation {
            relay_url: self.url.to_string(),
            event_id: event.id.clone(),
            accepted,
            message,
        })
    }

    /// Register and send subscription request.
    pub async fn subscribe(&self, subscription: Subscription) -> Result<()> {
        let mut frame = vec![json!("REQ"), json!(subscription.id)];
        frame.extend(subscription.filters.iter().cloned());
        let frame = Value::Array(frame);
        // Register first so an immediate reply is never dropped.
        self.subscriptions
            .lock()
            .await
            .insert(subscription.id.clone(), subscription.clone());
        if let Err(error) = self.send_json(&frame).await {
            self.subscriptions.lock().await.remove(&subscription.id);
            return Err(error);
        }
        Ok(())
    }

    /// Close subscription on relay.
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        self.subscriptions.lock().await.remove(subscription_id);
        self.send_json(&json!(["CLOSE", subscription_id])).await
    }

    async fn send_json(&self, value: &Value) -> Result<()> {
        self.send_text(serde_json::to_string(value)?).await
    }

    async fn send_text(&self, text: String) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| ClientError::WebSocket(error.to_string()))
    }
}

/// Deliveries await the subscriber, so a full channel applies backpressure
/// to the socket instead of dropping records.
async fn route_message(
    subscriptions: &SubscriptionMap,
    pending_oks: &PendingOks,
    message: RelayMessage,
    relay_url: &str,
) {
    match message {
        RelayMessage::Event(subscription_id, record) => {
            let subscription = subscriptions.lock().await.get(&subscription_id).cloned();
            match subscription {
                Some(subscription) => {
                    if let Err(error) = subscription.handle_event(record).await {
                        debug!(
                            relay = %relay_url,
                            subscription = %subscription_id,
                            %error,
                            "event not delivered"
                        );
                    }
                }
                None => {
                    debug!(
                        relay = %relay_url,
                        subscription = %subscription_id,
                        "event for closed subscription dropped"
                    );
                }
            }
        }
        RelayMessage::Eose(subscription_id) => {
            let subscription = subscriptions.lock().await.get(&subscription_id).cloned();
            match subscription {
                Some(subscription) => {
                    if let Err(error) = subscription.mark_eose().await {
                        debug!(
                            relay = %relay_url,
                            subscription = %subscription_id,
                            %error,
                            "EOSE not delivered"
                        );
                    }
                }
                None => {
                    debug!(
                        relay = %relay_url,
                        subscription = %subscription_id,
                        "EOSE for closed subscription dropped"
                    );
                }
            }
        }
        RelayMessage::Ok(event_id, accepted, text) => {
            let waiter = pending_oks.lock().await.remove(&event_id);
            match waiter {
                Some(waiter) => {
                    let _ = waiter.send((accepted, text));
                }
                None => debug!(relay = %relay_url, %event_id, accepted, "unsolicited OK dropped"),
            }
        }
        RelayMessage::Notice(notice) => warn!(relay = %relay_url, %notice, "relay notice"),
        RelayMessage::Auth(_) => debug!(relay = %relay_url, "AUTH challenge ignored"),
    }
}

/// Parse relay protocol JSON text message into typed relay message.
pub fn parse_relay_message(text: &str) -> Result<Option<RelayMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let array = value
        .as_array()
        .ok_or_else(|| ClientError::Protocol("expected JSON array relay message".to_string()))?;
    let Some(first) = array.first() else {
        return Ok(None);
    };

    let kind = first
        .as_str()
        .ok_or_else(|| ClientError::Protocol("missing relay message kind".to_string()))?;

    let text_field = |index: usize, what: &str| -> Result<String> {
        array
            .get(index)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::Protocol(format!("invalid {what}")))
    };

    match kind {
        "EVENT" => {
            if array.len() < 3 {
                return Err(ClientError::Protocol("invalid EVENT message".to_string()));
            }
            let subscription_id = text_field(1, "EVENT subscription id")?;
            let record = array[2].clone();
            if !record.is_object() {
                return Err(ClientError::Protocol(
                    "invalid EVENT payload: expected object".to_string(),
                ));
            }
            Ok(Some(RelayMessage::Event(subscription_id, record)))
        }
        "OK" => {
            if array.len() < 4 {
                return Err(ClientError::Protocol("invalid OK message".to_string()));
            }
            let event_id = text_field(1, "OK event id")?;
            let accepted = array[2]
                .as_bool()
                .ok_or_else(|| ClientError::Protocol("invalid OK accepted flag".to_string()))?;
            let message = text_field(3, "OK message text")?;
            Ok(Some(RelayMessage::Ok(event_id, accepted, message)))
        }
        "EOSE" => {
            if array.len() < 2 {
                return Err(ClientError::Protocol("invalid EOSE message".to_string()));
            }
            Ok(Some(RelayMessage::Eose(text_field(1, "EOSE subscription id")?)))
        }
        "NOTICE" => {
            if array.len() < 2 {
                return Err(ClientError::Protocol("invalid NOTICE message".to_string()));
            }
            Ok(Some(RelayMessage::Notice(text_field(1, "NOTICE message text")?)))
        }
        "AUTH" => {
            if array.len() < 2 {
                return Err(ClientError::Protocol("invalid AUTH message".to_string()));
            }
            Ok(Some(RelayMessage::Auth(text_field(1, "AUTH challenge")?)))
        }
        _ => Ok(None),
    }
}
