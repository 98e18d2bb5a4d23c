//! Change feed over WebSocket.
//!
//! A client sends `subscribe` first and receives `subscribed`; from then on
//! every committed change of a subscribed table is pushed as a `change`
//! frame. A subscriber that falls behind receives an `error` frame and is
//! disconnected so it can reconnect and catch up.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use obra_core::{ChangeEvent, ChangeMatcher, FeedMessage};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::broadcast;

use super::auth::error_response;
use super::AppState;

const HUB_CAPACITY: usize = 256;

/// How long a new connection may take to send its `subscribe` frame.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fans committed changes out to every connected subscriber.
#[derive(Debug)]
pub struct ChangeHub {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, events: Vec<ChangeEvent>) {
        for event in events {
            // Ignore send errors (no subscribers)
            let _ = self.sender.send(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    apikey: Option<String>,
}

pub async fn feed_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<FeedParams>,
    State(state): State<AppState>,
) -> Response {
    let client = match params.apikey.as_deref().and_then(|k| state.api_keys.validate(k)) {
        Some(client) => client,
        None => return error_response(StatusCode::UNAUTHORIZED, "invalid_key", "Invalid API key"),
    };

    ws.on_upgrade(move |socket| async move {
        tracing::info!(client = %client.client, "Feed client connected");
        handle_feed(socket, state).await;
        tracing::info!(client = %client.client, "Feed client disconnected");
    })
}

async fn send_frame(
    socket: &mut futures::stream::SplitSink<WebSocket, Message>,
    frame: &FeedMessage,
) -> bool {
    match frame.encode() {
        Ok(text) => socket.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode feed frame");
            true
        }
    }
}

/// Waits for the client's `subscribe` frame.
async fn read_subscribe(
    receiver: &mut futures::stream::SplitStream<WebSocket>,
) -> Option<Vec<String>> {
    let wait = async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    return match FeedMessage::decode(text.as_str()) {
                        Ok(FeedMessage::Subscribe { tables }) => Some(tables),
                        _ => None,
                    };
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    };

    tokio::time::timeout(SUBSCRIBE_TIMEOUT, wait).await.ok().flatten()
}

async fn handle_feed(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Some(tables) = read_subscribe(&mut receiver).await else {
        let _ = send_frame(
            &mut sender,
            &FeedMessage::Error {
                message: "expected a subscribe frame".to_string(),
            },
        )
        .await;
        return;
    };

    let matcher = ChangeMatcher::tables(tables.iter().cloned());
    // Subscribe before acknowledging so no committed change is missed.
    let mut events = state.hub.subscribe();
    if !send_frame(&mut sender, &FeedMessage::Subscribed { tables }).await {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) if matcher.matches(&event.table) => {
                    if !send_frame(&mut sender, &FeedMessage::Change(event)).await {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Feed subscriber lagged; disconnecting");
                    let _ = send_frame(
                        &mut sender,
                        &FeedMessage::Error {
                            message: format!("subscriber lagged by {} events", skipped),
                        },
                    )
                    .await;
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {}
            }
        }
    }

    let _ = sender.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_hub_subscribe_and_publish() {
        let hub = ChangeHub::new();
        let mut rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        let row = serde_json::from_value(json!({"id": "t1"})).unwrap();
        hub.publish(vec![ChangeEvent::insert("tareas", row)]);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.table, "tareas");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = ChangeHub::new();
        let row = serde_json::from_value(json!({"id": "t1"})).unwrap();
        hub.publish(vec![ChangeEvent::insert("tareas", row)]);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
