use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::platform::ChatSender;

/// Smallest buffer the queue is ever created with
pub const MIN_CAPACITY: usize = 1000;

/// Pause after every message actually sent, to stay under chat rate limits
pub const PACING_INTERVAL: Duration = Duration::from_secs(4);

/// Producer side of the outgoing queue. Cheap to clone; one per handler is fine.
#[derive(Clone)]
pub struct OutgoingQueue {
    tx: mpsc::Sender<String>,
}

impl OutgoingQueue {
    /// Append `text` to the queue. When the buffer is full this waits for
    /// the delivery loop to make room. Once the loop has stopped the text is
    /// dropped.
    pub async fn enqueue(&self, text: String) {
        if let Err(mpsc::error::SendError(text)) = self.tx.send(text).await {
            debug!("Delivery loop stopped, dropping reply: {}", text);
        }
    }
}

/// Consumer side: the one task that talks to the chat.
pub struct DeliveryLoop {
    rx: mpsc::Receiver<String>,
    sender: Arc<dyn ChatSender>,
    interval: Duration,
    last_delivered: Option<String>,
}

/// Create a paced queue delivering through `sender`.
pub fn channel(
    sender: Arc<dyn ChatSender>,
    capacity: usize,
    interval: Duration,
) -> (OutgoingQueue, DeliveryLoop) {
    let (tx, rx) = mpsc::channel(capacity.max(MIN_CAPACITY));
    (
        OutgoingQueue { tx },
        DeliveryLoop {
            rx,
            sender,
            interval,
            last_delivered: None,
        },
    )
}

impl DeliveryLoop {
    /// Deliver queued messages in order until every `OutgoingQueue` is gone
    /// and the buffer is drained, or until `shutdown` resolves. Shutdown
    /// abandons whatever is still queued.
    pub async fn run<S>(mut self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let text = tokio::select! {
                _ = &mut shutdown => break,
                next = self.rx.recv() => match next {
                    Some(text) => text,
                    None => break,
                },
            };

            if self.last_delivered.as_deref() == Some(text.as_str()) {
                debug!("Skipping repeated reply: {}", text);
                continue;
            }

            info!("saying {}", text);
            if let Err(e) = self.sender.say(&text).await {
                warn!("Failed to deliver reply: {:#}", e);
            }
            self.last_delivered = Some(text);

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Delivery loop stopped");
    }

    #[cfg(test)]
    pub(crate) fn try_next(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    /// Records every line it is asked to say, with the (paused) clock time
    #[derive(Default)]
    pub(crate) struct RecordingSender {
        pub said: Mutex<Vec<(Instant, String)>>,
    }

    impl RecordingSender {
        pub async fn texts(&self) -> Vec<String> {
            self.said.lock().await.iter().map(|(_, t)| t.clone()).collect()
        }
    }

    #[async_trait]
    impl ChatSender for RecordingSender {
        async fn say(&self, text: &str) -> Result<()> {
            self.said.lock().await.push((Instant::now(), text.to_string()));
            Ok(())
        }
    }

    struct FailingSender;

    #[async_trait]
    impl ChatSender for FailingSender {
        async fn say(&self, _text: &str) -> Result<()> {
            anyhow::bail!("connection reset")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_duplicates_are_skipped() {
        let sender = Arc::new(RecordingSender::default());
        let (queue, delivery) = channel(sender.clone(), MIN_CAPACITY, PACING_INTERVAL);

        queue.enqueue("A".to_string()).await;
        queue.enqueue("A".to_string()).await;
        queue.enqueue("B".to_string()).await;
        drop(queue);
        delivery.run(std::future::pending()).await;

        let said = sender.said.lock().await;
        assert_eq!(said.len(), 2);
        assert_eq!(said[0].1, "A");
        assert_eq!(said[1].1, "B");
        assert!(said[1].0 - said[0].0 >= PACING_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_consecutive_repeats_are_skipped() {
        let sender = Arc::new(RecordingSender::default());
        let (queue, delivery) = channel(sender.clone(), MIN_CAPACITY, PACING_INTERVAL);

        for text in ["A", "B", "A"] {
            queue.enqueue(text.to_string()).await;
        }
        drop(queue);
        delivery.run(std::future::pending()).await;

        assert_eq!(sender.texts().await, vec!["A", "B", "A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_duplicate_does_not_add_pause() {
        let sender = Arc::new(RecordingSender::default());
        let (queue, delivery) = channel(sender.clone(), MIN_CAPACITY, PACING_INTERVAL);

        for text in ["A", "A", "A", "B"] {
            queue.enqueue(text.to_string()).await;
        }
        drop(queue);
        delivery.run(std::future::pending()).await;

        let said = sender.said.lock().await;
        assert_eq!(said.len(), 2);
        let gap = said[1].0 - said[0].0;
        assert!(gap >= PACING_INTERVAL);
        assert!(gap < PACING_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_keeps_fifo_order() {
        let sender = Arc::new(RecordingSender::default());
        let (queue, delivery) = channel(sender.clone(), MIN_CAPACITY, PACING_INTERVAL);

        let expected: Vec<String> = (0..20).map(|i| format!("reply {}", i)).collect();
        for text in &expected {
            queue.enqueue(text.clone()).await;
        }
        drop(queue);
        delivery.run(std::future::pending()).await;

        assert_eq!(sender.texts().await, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_queued_items() {
        let sender = Arc::new(RecordingSender::default());
        let (queue, delivery) = channel(sender.clone(), MIN_CAPACITY, PACING_INTERVAL);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        for text in ["A", "B", "C"] {
            queue.enqueue(text.to_string()).await;
        }
        let handle = tokio::spawn(delivery.run(async move {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_secs(1)).await;
        stop_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(sender.texts().await, vec!["A"]);

        // the queue handle outlives the loop without panicking
        queue.enqueue("D".to_string()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_still_counts_as_delivered() {
        let (queue, delivery) = channel(Arc::new(FailingSender), MIN_CAPACITY, PACING_INTERVAL);
        queue.enqueue("A".to_string()).await;
        queue.enqueue("A".to_string()).await;
        drop(queue);

        let start = Instant::now();
        delivery.run(std::future::pending()).await;
        let elapsed = Instant::now() - start;
        assert!(elapsed >= PACING_INTERVAL);
        assert!(elapsed < PACING_INTERVAL * 2);
    }

    #[test]
    fn test_capacity_floor() {
        let (queue, _delivery) = channel(
            Arc::new(RecordingSender::default()),
            10,
            PACING_INTERVAL,
        );
        assert_eq!(queue.tx.max_capacity(), MIN_CAPACITY);
    }
}
