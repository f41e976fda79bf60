use actix_web::web::Bytes;
use futures::channel::mpsc;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Frames a live-stream client receives over its long-lived response. The
/// stream itself never errors; fatal conditions just close the connection.
pub type FrameResult = Result<Bytes, Infallible>;

/// Per-client buffer. A client that falls this many frames behind has
/// stopped reading; its send fails and it is reaped.
const CLIENT_BUFFER: usize = 16;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

struct StreamClient {
    id: usize,
    tx: mpsc::Sender<FrameResult>,
}

fn data_frame(event: &Value) -> Bytes {
    Bytes::from(format!("data: {}\n\n", event))
}

fn comment_frame(text: &str) -> Bytes {
    Bytes::from(format!(": {}\n\n", text))
}

/// Fan-out of ingestion events to connected live-stream clients.
///
/// The client set lock is held only for membership changes; broadcasting
/// works on a snapshot of cloned senders and every send is non-blocking, so
/// one stalled client can never hold up the rest. Per-client ordering is
/// the channel's FIFO ordering.
pub struct StreamHub {
    clients: Mutex<Vec<StreamClient>>,
    next_id: AtomicUsize,
}

impl StreamHub {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Register a client. The current snapshot, when there is one, is
    /// queued immediately so the client doesn't sit silent until the next
    /// ingestion tick.
    pub fn subscribe(&self, initial: Option<&Value>) -> mpsc::Receiver<FrameResult> {
        let (mut tx, rx) = mpsc::channel::<FrameResult>(CLIENT_BUFFER);
        if let Some(event) = initial {
            let _ = tx.try_send(Ok(data_frame(event)));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut clients = self.clients.lock().expect("stream hub lock poisoned");
        clients.push(StreamClient { id, tx });
        info!("Stream client {} connected ({} active)", id, clients.len());
        rx
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().expect("stream hub lock poisoned").len()
    }

    fn send_to_all(&self, frame: Bytes) -> usize {
        // Snapshot under the lock, deliver outside it
        let snapshot: Vec<(usize, mpsc::Sender<FrameResult>)> = {
            let clients = self.clients.lock().expect("stream hub lock poisoned");
            clients.iter().map(|c| (c.id, c.tx.clone())).collect()
        };

        let mut dead = Vec::new();
        let mut delivered = 0usize;
        for (id, mut tx) in snapshot {
            match tx.try_send(Ok(frame.clone())) {
                Ok(()) => delivered += 1,
                Err(_) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut clients = self.clients.lock().expect("stream hub lock poisoned");
            clients.retain(|c| !dead.contains(&c.id));
            debug!("Reaped {} stream clients ({} left)", dead.len(), clients.len());
        }
        delivered
    }

    /// Push one event frame to every connected client.
    pub fn broadcast(&self, event: &Value) -> usize {
        self.send_to_all(data_frame(event))
    }

    /// Comment-style keepalive; also flushes out closed connections.
    pub fn heartbeat(&self) -> usize {
        self.send_to_all(comment_frame("hb"))
    }

    /// Final close event before shutdown; dropping the senders ends every
    /// client response.
    pub fn shutdown(&self) {
        let frame = Bytes::from("event: close\ndata: {}\n\n");
        self.send_to_all(frame);
        let mut clients = self.clients.lock().expect("stream hub lock poisoned");
        let count = clients.len();
        clients.clear();
        if count > 0 {
            info!("Stream hub closed {} clients on shutdown", count);
        }
    }
}

impl Default for StreamHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn frame_text(frame: Option<FrameResult>) -> String {
        String::from_utf8(frame.unwrap().unwrap().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_gets_initial_snapshot() {
        let hub = StreamHub::new();
        let mut rx = hub.subscribe(Some(&json!({"type": "wind_update", "speed": 12.0})));
        let text = frame_text(rx.next().await);
        assert!(text.starts_with("data: "));
        assert!(text.contains("wind_update"));
    }

    #[tokio::test]
    async fn test_broadcast_order_preserved() {
        let hub = StreamHub::new();
        let mut rx = hub.subscribe(None);

        for cycle in 0..5 {
            hub.broadcast(&json!({"type": "wind_update", "cycle": cycle}));
        }
        for cycle in 0..5 {
            let text = frame_text(rx.next().await);
            assert!(text.contains(&format!("\"cycle\":{}", cycle)), "got {}", text);
        }
    }

    #[tokio::test]
    async fn test_slow_client_reaped_others_unaffected() {
        let hub = StreamHub::new();
        let _stalled = hub.subscribe(None); // never reads
        let mut live = hub.subscribe(None);
        assert_eq!(hub.client_count(), 2);

        // Push past the stalled client's buffer while the live one drains
        for cycle in 0..CLIENT_BUFFER + 4 {
            hub.broadcast(&json!({"cycle": cycle}));
            let text = frame_text(live.next().await);
            assert!(text.contains(&format!("\"cycle\":{}", cycle)));
        }
        assert_eq!(hub.client_count(), 1);
    }

    #[tokio::test]
    async fn test_dropped_receiver_reaped_on_heartbeat() {
        let hub = StreamHub::new();
        let rx = hub.subscribe(None);
        drop(rx);
        assert_eq!(hub.client_count(), 1);
        hub.heartbeat();
        assert_eq!(hub.client_count(), 0);
    }
}
