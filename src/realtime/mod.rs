//! Realtime `postgres_changes` subscriptions over the Phoenix websocket

mod message;

use futures_util::{SinkExt, Stream, StreamExt};
use log::{debug, error, info, trace, warn};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::error::Error;

pub use message::*;

const JOIN_REF: &str = "1";

/// Realtime connection settings
#[derive(Debug, Clone)]
pub struct RealtimeOptions {
    pub heartbeat_interval: Duration,
    pub join_timeout: Duration,
}

impl Default for RealtimeOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            join_timeout: Duration::from_secs(10),
        }
    }
}

/// Client for Supabase Realtime
#[derive(Debug, Clone)]
pub struct RealtimeClient {
    url: String,
    key: String,
    options: RealtimeOptions,
}

impl RealtimeClient {
    /// Create a new RealtimeClient for the project at `url`
    pub fn new(url: &str, key: &str) -> Self {
        Self {
            url: url.to_string(),
            key: key.to_string(),
            options: RealtimeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RealtimeOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the WebSocket URL for the Realtime API
    pub fn get_url(&self) -> String {
        let url = self
            .url
            .replacen("http://", "ws://", 1)
            .replacen("https://", "wss://", 1);
        format!("{}/realtime/v1/websocket?apikey={}&vsn=1.0.0", url, self.key)
    }

    /// Join `channel` and stream the matching row changes.
    ///
    /// Returns once the server acknowledged the join. The stream ends when
    /// the socket closes; dropping the [`Subscription`] closes the socket.
    pub async fn subscribe(
        &self,
        channel: &str,
        changes: PostgresChanges,
        access_token: &str,
    ) -> Result<Subscription, Error> {
        let topic = format!("realtime:{}", channel);
        let ws_url = self.get_url();

        info!("connecting realtime channel {}", topic);
        let (ws_stream, _) = connect_async(ws_url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let join = json!({
            "topic": topic,
            "event": "phx_join",
            "payload": {
                "config": {
                    "broadcast": { "ack": false, "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [changes],
                },
                "access_token": access_token,
            },
            "ref": JOIN_REF,
            "join_ref": JOIN_REF,
        });
        write.send(Message::Text(join.to_string())).await?;

        tokio::time::timeout(self.options.join_timeout, wait_for_join(&mut read))
            .await
            .map_err(|_| Error::realtime("timed out waiting for join reply"))??;
        debug!("joined realtime channel {}", topic);

        let (tx, rx) = mpsc::channel::<PostgresChange>(64);
        let heartbeat_interval = self.options.heartbeat_interval;

        let task = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(heartbeat_interval);
            heartbeat.tick().await;
            let mut next_ref: u64 = 2;

            loop {
                tokio::select! {
                    frame = read.next() => {
                        let text = match frame {
                            Some(Ok(Message::Text(text))) => text,
                            Some(Ok(Message::Close(reason))) => {
                                debug!("realtime socket closed: {:?}", reason);
                                break;
                            }
                            Some(Ok(other)) => {
                                trace!("ignoring non-text frame: {:?}", other);
                                continue;
                            }
                            Some(Err(e)) => {
                                error!("realtime read error: {}", e);
                                break;
                            }
                            None => break,
                        };

                        let msg: RealtimeMessage = match serde_json::from_str(&text) {
                            Ok(msg) => msg,
                            Err(e) => {
                                warn!("ignoring unparseable realtime frame: {}", e);
                                continue;
                            }
                        };

                        match msg.event {
                            ChannelEvent::PostgresChanges => {
                                match serde_json::from_value::<PostgresChange>(msg.payload["data"].clone()) {
                                    Ok(change) => {
                                        if tx.send(change).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => warn!("malformed postgres_changes payload: {}", e),
                                }
                            }
                            ChannelEvent::PhxError | ChannelEvent::PhxClose if msg.topic != "phoenix" => {
                                warn!("realtime channel {} ended with {:?}", msg.topic, msg.event);
                                break;
                            }
                            _ => trace!("realtime event {:?} on {}", msg.event, msg.topic),
                        }
                    }
                    _ = heartbeat.tick() => {
                        let beat = json!({
                            "topic": "phoenix",
                            "event": "heartbeat",
                            "payload": {},
                            "ref": next_ref.to_string(),
                        });
                        next_ref += 1;
                        if let Err(e) = write.send(Message::Text(beat.to_string())).await {
                            error!("failed to send heartbeat: {}", e);
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                }
            }

            let _ = write.send(Message::Close(None)).await;
            debug!("realtime task for {} finished", topic);
        });

        Ok(Subscription {
            events: rx,
            task: Some(task),
        })
    }
}

async fn wait_for_join<S>(read: &mut S) -> Result<(), Error>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = read.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let msg: RealtimeMessage = match serde_json::from_str(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("ignoring unparseable realtime frame: {}", e);
                continue;
            }
        };
        if msg.event == ChannelEvent::PhxReply && msg.message_ref.as_deref() == Some(JOIN_REF) {
            return match msg.payload["status"].as_str() {
                Some("ok") => Ok(()),
                _ => Err(Error::realtime(format!("join rejected: {}", msg.payload["response"]))),
            };
        }
    }
    Err(Error::realtime("socket closed before join reply"))
}

/// A live channel subscription
pub struct Subscription {
    events: mpsc::Receiver<PostgresChange>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// The next change, or `None` once the socket is gone
    pub async fn next(&mut self) -> Option<PostgresChange> {
        self.events.recv().await
    }

    /// Build a subscription from an existing change stream
    pub fn from_receiver(events: mpsc::Receiver<PostgresChange>) -> Self {
        Self {
            events,
            task: None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
