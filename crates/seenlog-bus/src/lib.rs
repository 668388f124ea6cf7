use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use seenlog_schema::BusMessage;
use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum Topic {
    ReloadRequested,
    CycleCompleted,
    CatalogLoadFailed,
    BatchCompleted,
}

impl Topic {
    pub fn from_message(msg: &BusMessage) -> Self {
        match msg {
            BusMessage::ReloadRequested { .. } => Topic::ReloadRequested,
            BusMessage::CycleCompleted { .. } => Topic::CycleCompleted,
            BusMessage::CatalogLoadFailed { .. } => Topic::CatalogLoadFailed,
            BusMessage::BatchCompleted { .. } => Topic::BatchCompleted,
        }
    }
}

type Subscriber = mpsc::Sender<BusMessage>;

/// Announces reload requests, applied load cycles, catalog failures and
/// finished seen-store batches to whoever subscribed to their topic.
pub struct EventBus {
    subscribers: Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    pub async fn subscribe(&self, topic: Topic) -> mpsc::Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = self.subscribers.write().await;
        subs.entry(topic).or_default().push(tx);
        rx
    }

    pub async fn publish(&self, msg: BusMessage) -> Result<()> {
        deliver(&self.subscribers, msg).await
    }

    pub fn publisher(&self) -> BusPublisher {
        BusPublisher {
            subscribers: self.subscribers.clone(),
        }
    }
}

/// Cheap cloneable handle for components that only publish.
#[derive(Clone)]
pub struct BusPublisher {
    subscribers: Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>,
}

impl BusPublisher {
    pub async fn publish(&self, msg: BusMessage) -> Result<()> {
        deliver(&self.subscribers, msg).await
    }
}

async fn deliver(
    subscribers: &RwLock<HashMap<Topic, Vec<Subscriber>>>,
    msg: BusMessage,
) -> Result<()> {
    let topic = Topic::from_message(&msg);
    let subs = subscribers.read().await;
    if let Some(subscribers) = subs.get(&topic) {
        for tx in subscribers {
            if tx.try_send(msg.clone()).is_err() {
                tracing::debug!(?topic, "bus subscriber full or closed, dropping message");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};
    use uuid::Uuid;

    fn reload_message() -> BusMessage {
        BusMessage::ReloadRequested {
            reason: "batch committed".to_string(),
        }
    }

    #[tokio::test]
    async fn publish_to_no_subscribers_succeeds() {
        let bus = EventBus::new(8);
        let result = bus.publish(reload_message()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe(Topic::ReloadRequested).await;

        bus.publish(reload_message()).await.unwrap();

        let received = timeout(Duration::from_millis(100), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(received, BusMessage::ReloadRequested { .. }));
    }

    #[tokio::test]
    async fn multiple_subscribers_same_topic() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe(Topic::ReloadRequested).await;
        let mut rx2 = bus.subscribe(Topic::ReloadRequested).await;

        bus.publish(reload_message()).await.unwrap();

        let got1 = timeout(Duration::from_millis(100), rx1.recv())
            .await
            .unwrap()
            .unwrap();
        let got2 = timeout(Duration::from_millis(100), rx2.recv())
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(got1, BusMessage::ReloadRequested { .. }));
        assert!(matches!(got2, BusMessage::ReloadRequested { .. }));
    }

    #[tokio::test]
    async fn different_topics_no_crosstalk() {
        let bus = EventBus::new(8);
        let mut reload_rx = bus.subscribe(Topic::ReloadRequested).await;

        bus.publish(BusMessage::CatalogLoadFailed {
            cycle: 3,
            error: "timeout".into(),
        })
        .await
        .unwrap();

        let received = timeout(Duration::from_millis(100), reload_rx.recv()).await;
        assert!(received.is_err());
    }

    #[tokio::test]
    async fn bus_publisher_clone_works() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe(Topic::ReloadRequested).await;
        let publisher = bus.publisher();
        let publisher_clone = publisher.clone();

        publisher_clone.publish(reload_message()).await.unwrap();

        let received = timeout(Duration::from_millis(100), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(received, BusMessage::ReloadRequested { .. }));
    }

    #[tokio::test]
    async fn channel_backpressure_drops_when_full() {
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe(Topic::ReloadRequested).await;

        bus.publish(reload_message()).await.unwrap();
        bus.publish(reload_message()).await.unwrap();

        let first = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(first.is_ok());

        let second = timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(second.is_err());
    }

    #[test]
    fn topic_from_message_covers_all_variants() {
        let cases: Vec<(BusMessage, Topic)> = vec![
            (reload_message(), Topic::ReloadRequested),
            (
                BusMessage::CycleCompleted {
                    cycle: 1,
                    episodes: 51,
                    seen: 4,
                },
                Topic::CycleCompleted,
            ),
            (
                BusMessage::CatalogLoadFailed {
                    cycle: 2,
                    error: "e".into(),
                },
                Topic::CatalogLoadFailed,
            ),
            (
                BusMessage::BatchCompleted {
                    batch_id: Uuid::new_v4(),
                    mark_seen: true,
                    succeeded: vec![1],
                    failed: vec![],
                },
                Topic::BatchCompleted,
            ),
        ];

        for (msg, expected_topic) in cases {
            assert_eq!(Topic::from_message(&msg), expected_topic);
        }
    }
}
