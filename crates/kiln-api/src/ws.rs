//! WebSocket plumbing shared by the watch endpoints

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use kiln::notifier::{Frame, FrameSink, Notifier, NotifyError};
use kiln::{InstanceId, RequestIndex};
use serde::de::DeserializeOwned;

/// Frames are written as JSON text messages
pub struct SocketSink {
    sender: SplitSink<WebSocket, Message>,
}

impl SocketSink {
    pub async fn close(mut self) {
        let _ = self.sender.close().await;
    }
}

#[async_trait]
impl FrameSink for SocketSink {
    async fn send(&mut self, frame: &Frame) -> kiln::notifier::Result<()> {
        let text = serde_json::to_string(frame)?;
        self.sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| NotifyError::Disconnected)
    }
}

pub fn split(socket: WebSocket) -> (SocketSink, SplitStream<WebSocket>) {
    let (sender, receiver) = socket.split();
    (SocketSink { sender }, receiver)
}

/// Read the subscribe frame; `None` if the client left first
pub async fn read_request<T>(receiver: &mut SplitStream<WebSocket>) -> Option<Result<T, String>>
where
    T: DeserializeOwned,
{
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                return Some(serde_json::from_str(text.as_str()).map_err(|e| e.to_string()));
            }
            Ok(Message::Binary(bytes)) => {
                return Some(serde_json::from_slice(&bytes).map_err(|e| e.to_string()));
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn closed(receiver: &mut SplitStream<WebSocket>) {
    while let Some(message) = receiver.next().await {
        if matches!(message, Ok(Message::Close(_)) | Err(_)) {
            return;
        }
    }
}

/// Run the notifier until its terminal frame or until the client goes away
pub async fn watch(
    notifier: &Notifier,
    index: &RequestIndex,
    id: &InstanceId,
    mut sink: SocketSink,
    mut receiver: SplitStream<WebSocket>,
) {
    tokio::select! {
        result = notifier.watch(index, id, &mut sink) => {
            if let Err(e) = result {
                tracing::debug!("watch of {} ended early: {}", id, e);
            }
        }
        _ = closed(&mut receiver) => {
            tracing::debug!("client stopped watching {}", id);
        }
    }

    sink.close().await;
}

/// Answer with a single error frame and close
pub async fn reject(mut sink: SocketSink, error: impl Into<String>) {
    let _ = sink.send(&Frame::error(error)).await;
    sink.close().await;
}
