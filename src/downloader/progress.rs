// Progress notifications from a running download to whoever listens

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Fan-out sender for progress percentages.
///
/// Every subscriber gets its own unbounded queue, so a slow reader sees every
/// value in emit order. Emitting never blocks and never fails: with no
/// subscriber the value is dropped.
#[derive(Debug, Clone, Default)]
pub struct ProgressEmitter {
    subscribers: Arc<Mutex<Vec<UnboundedSender<f64>>>>,
}

impl ProgressEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, percent: f64) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // A failed send means the subscription was dropped
        subscribers.retain(|tx| tx.send(percent).is_ok());
    }

    pub fn subscribe(&self) -> ProgressSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        ProgressSubscription { rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

/// Caller-owned handle on the progress stream
#[derive(Debug)]
pub struct ProgressSubscription {
    rx: UnboundedReceiver<f64>,
}

impl ProgressSubscription {
    /// Next value in emit order, or `None` once every emitter is gone
    pub async fn next(&mut self) -> Option<f64> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`next`](Self::next)
    pub fn try_next(&mut self) -> Option<f64> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_arrive_in_order_with_duplicates() {
        let emitter = ProgressEmitter::new();
        let mut sub = emitter.subscribe();
        for v in [1.5, 1.5, 40.0, 12.0] {
            emitter.emit(v);
        }
        drop(emitter);

        let mut seen = Vec::new();
        while let Some(v) = sub.next().await {
            seen.push(v);
        }
        assert_eq!(seen, vec![1.5, 1.5, 40.0, 12.0]);
    }

    #[tokio::test]
    async fn test_slow_subscriber_sees_every_value() {
        let emitter = ProgressEmitter::new();
        let mut sub = emitter.subscribe();
        let sent: Vec<f64> = (0..1000).map(|i| f64::from(i) / 10.0).collect();
        for &v in &sent {
            emitter.emit(v);
        }
        drop(emitter);

        let mut seen = Vec::new();
        while let Some(v) = sub.next().await {
            seen.push(v);
        }
        assert_eq!(seen, sent);
    }

    #[tokio::test]
    async fn test_next_waits_for_cloned_emitters() {
        let emitter = ProgressEmitter::new();
        let clone = emitter.clone();
        let mut sub = emitter.subscribe();
        drop(emitter);

        clone.emit(7.0);
        assert_eq!(sub.next().await, Some(7.0));
        drop(clone);
        assert_eq!(sub.next().await, None);
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let emitter = ProgressEmitter::new();
        emitter.emit(50.0);
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_releases_receiver() {
        let emitter = ProgressEmitter::new();
        let sub = emitter.subscribe();
        let other = emitter.subscribe();
        assert_eq!(emitter.subscriber_count(), 2);
        sub.unsubscribe();
        assert_eq!(emitter.subscriber_count(), 1);
        emitter.emit(1.0);
        drop(other);
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[test]
    fn test_try_next_drains_buffer() {
        let emitter = ProgressEmitter::new();
        let mut sub = emitter.subscribe();
        emitter.emit(10.0);
        assert_eq!(sub.try_next(), Some(10.0));
        assert_eq!(sub.try_next(), None);
    }
}
