//! WebSocket change-feed client.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::protocol::FeedMessage;
use super::{ChangeMatcher, ChangeStream, RemoteError};

/// Timeout for the subscribe/subscribed handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to the feed at `ws_url`, subscribes and returns the event stream.
pub(crate) async fn subscribe(
    ws_url: &str,
    matcher: &ChangeMatcher,
) -> Result<ChangeStream, RemoteError> {
    let (ws_stream, _) = connect_async(ws_url)
        .await
        .map_err(|e| RemoteError::WebSocket(e.to_string()))?;

    let (mut sender, mut receiver) = ws_stream.split();
    perform_handshake(&mut sender, &mut receiver, matcher).await?;

    tracing::debug!(tables = ?matcher.tables, "Subscribed to change feed");

    let stream = async_stream::stream! {
        // Keeps the write half open for the lifetime of the subscription.
        let _sender = sender;

        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match FeedMessage::decode(text.as_str()) {
                    Ok(FeedMessage::Change(event)) => yield Ok(event),
                    Ok(FeedMessage::Error { message }) => {
                        yield Err(RemoteError::Feed(message));
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Ignoring undecodable feed frame"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    yield Err(RemoteError::WebSocket(e.to_string()));
                    break;
                }
            }
        }
    };

    Ok(Box::pin(stream))
}

/// Sends `subscribe` and waits for `subscribed`.
async fn perform_handshake<S, R>(
    sender: &mut S,
    receiver: &mut R,
    matcher: &ChangeMatcher,
) -> Result<(), RemoteError>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
    R: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let subscribe = FeedMessage::Subscribe {
        tables: matcher.tables.clone(),
    };
    let encoded = subscribe
        .encode()
        .map_err(|e| RemoteError::Handshake(e.to_string()))?;

    sender
        .send(Message::Text(encoded.into()))
        .await
        .map_err(|e| RemoteError::WebSocket(e.to_string()))?;

    let response = timeout(HANDSHAKE_TIMEOUT, async {
        while let Some(msg_result) = receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    let msg = FeedMessage::decode(text.as_str())
                        .map_err(|e| RemoteError::Handshake(e.to_string()))?;

                    return match msg {
                        FeedMessage::Subscribed { .. } => Ok(()),
                        FeedMessage::Error { message } => Err(RemoteError::Handshake(message)),
                        other => Err(RemoteError::Handshake(format!(
                            "Unexpected message during handshake: {:?}",
                            other
                        ))),
                    };
                }
                Ok(Message::Close(_)) => {
                    return Err(RemoteError::Handshake(
                        "Server closed connection during handshake".to_string(),
                    ));
                }
                Ok(_) => {}
                Err(e) => return Err(RemoteError::WebSocket(e.to_string())),
            }
        }
        Err(RemoteError::Handshake(
            "Connection closed before handshake completed".to_string(),
        ))
    })
    .await;

    match response {
        Ok(result) => result,
        Err(_) => Err(RemoteError::HandshakeTimeout),
    }
}
