use futures::future::BoxFuture;
use models::Cid;
use std::time::{Duration, Instant};

/// HeadCallback observes a head advance as `(head, previous)`.
/// Previous is `None` on the first observation.
pub type HeadCallback =
    Box<dyn Fn(Cid, Option<Cid>) -> BoxFuture<'static, ()> + Send + Sync + 'static>;

#[derive(Clone, Debug)]
pub struct NotifierConfig {
    /// How often to poll the remote indexer for the provider's head.
    pub interval: Duration,
    /// Log a warning when the head has not advanced for this long.
    pub staleness: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            staleness: Duration::from_secs(60 * 60),
        }
    }
}

/// HeadNotifier polls a remote indexer for the advertisement chain head
/// it holds for a publishing peer, and invokes callbacks when the head
/// advances.
///
/// Intermediate heads between polls are not individually delivered; the
/// guarantee is a monotonically advancing head relative to the
/// notifier's prior observation. Callbacks run serially, in
/// registration order, so cache invalidation stays ordered.
pub struct HeadNotifier {
    client: ipni::Client,
    peer: String,
    config: NotifierConfig,
    callbacks: Vec<HeadCallback>,
    head: Option<Cid>,
    advanced_at: Instant,
}

impl HeadNotifier {
    pub fn new(client: ipni::Client, peer: String, config: NotifierConfig) -> Self {
        Self {
            client,
            peer,
            config,
            callbacks: Vec::new(),
            head: None,
            advanced_at: Instant::now(),
        }
    }

    /// Register a callback. Registration order is invocation order.
    pub fn notify(&mut self, callback: HeadCallback) {
        self.callbacks.push(callback);
    }

    /// Poll until `shutdown` resolves.
    pub async fn run(mut self, shutdown: impl std::future::Future<Output = ()>) {
        let mut ticks = tokio::time::interval(self.config.interval);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticks.tick() => self.poll_once().await,
                () = &mut shutdown => {
                    tracing::info!("head notifier signaled to stop");
                    return;
                }
            }
        }
    }

    async fn poll_once(&mut self) {
        let status = match self.client.provider_info(&self.peer).await {
            Ok(status) => status,
            Err(ipni::Error::NotFound) => {
                tracing::debug!(peer = %self.peer, "provider not yet known to indexer");
                return;
            }
            Err(err) => {
                tracing::warn!(peer = %self.peer, ?err, "failed to read provider info");
                return;
            }
        };
        self.observe(status.last_advertisement).await
    }

    /// Apply one observation of the remote head. The stored head only
    /// advances after every callback has run.
    async fn observe(&mut self, latest: Option<Cid>) {
        match latest {
            Some(head) if self.head.as_ref() != Some(&head) => {
                let previous = self.head.clone();
                tracing::info!(%head, ?previous, "remote head advanced");

                for callback in &self.callbacks {
                    () = callback(head.clone(), previous.clone()).await;
                }
                self.head = Some(head);
                self.advanced_at = Instant::now();
            }
            _ => {
                let idle = self.advanced_at.elapsed();
                if idle > self.config.staleness {
                    tracing::warn!(
                        peer = %self.peer,
                        idle_secs = idle.as_secs(),
                        "remote head is stale"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn notifier() -> HeadNotifier {
        HeadNotifier::new(
            ipni::Client::new(
                reqwest::Client::new(),
                "https://indexer.example/".parse().unwrap(),
            ),
            "zPeer".to_string(),
            NotifierConfig::default(),
        )
    }

    fn recording(observed: &Arc<Mutex<Vec<(String, Cid, Option<Cid>)>>>, name: &str) -> HeadCallback {
        let observed = observed.clone();
        let name = name.to_string();
        Box::new(move |head, previous| {
            let observed = observed.clone();
            let name = name.clone();
            Box::pin(async move {
                observed.lock().unwrap().push((name, head, previous));
            })
        })
    }

    #[tokio::test]
    async fn test_observe_advances_monotonically() {
        let observed = Arc::new(Mutex::new(Vec::new()));
        let mut notifier = notifier();
        notifier.notify(recording(&observed, "a"));
        notifier.notify(recording(&observed, "b"));

        let first = Cid::from_block(models::DAG_CBOR, b"advert-1");
        let second = Cid::from_block(models::DAG_CBOR, b"advert-2");

        // Nothing to deliver before the indexer knows any head.
        notifier.observe(None).await;
        assert!(observed.lock().unwrap().is_empty());

        // First observation delivers (head, None) to callbacks in
        // registration order.
        notifier.observe(Some(first.clone())).await;
        {
            let observed = observed.lock().unwrap();
            assert_eq!(
                *observed,
                vec![
                    ("a".to_string(), first.clone(), None),
                    ("b".to_string(), first.clone(), None),
                ]
            );
        }

        // An unchanged head is not re-delivered.
        notifier.observe(Some(first.clone())).await;
        assert_eq!(observed.lock().unwrap().len(), 2);

        // An advance carries the prior observation.
        notifier.observe(Some(second.clone())).await;
        assert_eq!(
            observed.lock().unwrap()[2],
            ("a".to_string(), second.clone(), Some(first.clone()))
        );
        assert_eq!(
            observed.lock().unwrap()[3],
            ("b".to_string(), second, Some(first))
        );
    }
}
