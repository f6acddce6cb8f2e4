use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Client;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};

use crate::models::{AuctionUpdate, NotificationEvent};

/// Commit-side handle to the realtime stream. Publishing is non-blocking
/// and best-effort: a failed send never fails the commit that produced it.
#[derive(Clone)]
pub struct UpdatePublisher {
    tx: broadcast::Sender<String>,
}

impl UpdatePublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn publish(&self, update: &AuctionUpdate) {
        let raw = match serde_json::to_string(update) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize auction update: {}", e);
                return;
            }
        };
        // No receivers is normal at startup
        if let Err(e) = self.tx.send(raw) {
            debug!("Auction update dropped, no subscribers: {}", e);
        }
    }
}

/// Fire-and-forget appender for the notification stream. A delivery
/// worker drains the receiving end.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify(&self, event: NotificationEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            warn!("Notification stream closed, {} event dropped", kind);
        } else {
            info!("{} event appended to notification stream", kind);
        }
    }
}

/// Forwards the firehose to per-product subscriber queues, the
/// `product_{id}_update` topics clients actually listen on.
pub struct Relay {
    subscribers: Mutex<FxHashMap<u64, Vec<mpsc::UnboundedSender<String>>>>,
}

impl Relay {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn subscribe(&self, product_id: u64) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap()
            .entry(product_id)
            .or_default()
            .push(tx);
        rx
    }

    /// Route one raw message. Malformed payloads are logged and dropped;
    /// dead subscribers are pruned on the way through.
    pub fn dispatch(&self, raw: &str) {
        let update: AuctionUpdate = match serde_json::from_str(raw) {
            Ok(update) => update,
            Err(e) => {
                warn!("Dropping malformed auction update: {}", e);
                return;
            }
        };

        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(queue) = subscribers.get_mut(&update.product_id) {
            queue.retain(|tx| tx.send(raw.to_string()).is_ok());
            if queue.is_empty() {
                subscribers.remove(&update.product_id);
            }
        }
    }

    pub fn subscriber_count(&self, product_id: u64) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(&product_id)
            .map_or(0, |q| q.len())
    }

    /// Drain the broadcast stream until it closes. Lag only costs the
    /// missed messages, never the relay itself.
    pub async fn run(&self, mut rx: broadcast::Receiver<String>) {
        loop {
            match rx.recv().await {
                Ok(raw) => self.dispatch(&raw),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Relay lagged, {} updates skipped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Update stream closed, relay stopping");
                    break;
                }
            }
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

/// Optional HTTP bridge mirroring the realtime stream to an external
/// push server.
pub struct PushGateway {
    client: Client,
    api_url: String,
    api_key: String,
}

impl PushGateway {
    pub fn new(api_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_url,
            api_key,
        }
    }

    pub async fn publish<T: Serialize>(
        &self,
        channel: &str,
        data: &T,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let body = json!({
            "channel": channel,
            "data": data
        });

        let response = self
            .client
            .post(format!("{}/publish", self.api_url))
            .header("X-API-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Push publish failed: {} - {}", status, error_text).into());
        }

        Ok(())
    }

    /// Mirror the broadcast stream until it closes. Delivery failures
    /// are logged and skipped, same contract as the local relay.
    pub async fn run(&self, mut rx: broadcast::Receiver<String>) {
        loop {
            let raw = match rx.recv().await {
                Ok(raw) => raw,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Push gateway lagged, {} updates skipped", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let update: AuctionUpdate = match serde_json::from_str(&raw) {
                Ok(update) => update,
                Err(e) => {
                    warn!("Dropping malformed auction update: {}", e);
                    continue;
                }
            };

            let channel = format!("product_{}_update", update.product_id);
            if let Err(e) = self.publish(&channel, &update).await {
                warn!("Push delivery to {} failed: {}", channel, e);
            }
        }
    }
}
