use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::{
    error::EngineError,
    parsers::bundle::SnapshotBundle,
    topology::{source::SnapshotSource, store::SnapshotStore},
};

/// Polls a `SnapshotSource` and publishes every new bundle into the store.
///
/// Subscribers see the id of each published generation. A failed fetch or build leaves the
/// current generation in place.
pub struct SnapshotWatcher<S: SnapshotSource> {
    source: S,
    store: Arc<SnapshotStore>,
    interval: Duration,
    generation_tx: watch::Sender<Option<u64>>,
}

impl<S: SnapshotSource> SnapshotWatcher<S> {
    pub fn new(source: S, store: Arc<SnapshotStore>) -> Self {
        let interval = store.config().poll_interval;
        let (generation_tx, _) = watch::channel(store.current_id());
        Self {
            source,
            store,
            interval,
            generation_tx,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.generation_tx.subscribe()
    }

    /// Fetches once; returns the new generation id if something was published.
    pub async fn poll_once(&mut self) -> Result<Option<u64>, EngineError> {
        let Some(bundle) = self.source.fetch_if_changed().await? else {
            return Ok(None);
        };
        let id = self.publish(bundle).await?;
        self.generation_tx.send_replace(Some(id));
        Ok(Some(id))
    }

    async fn publish(&self, bundle: SnapshotBundle) -> Result<u64, EngineError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.publish(bundle).id)
            .await
            .map_err(|e| EngineError::Publish(e.to_string()))
    }

    /// Polls until `shutdown` turns true or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Watching {} every {}",
            self.source.describe(),
            humantime::format_duration(self.interval)
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(Some(id)) => tracing::debug!("Source {} produced generation {}", self.source.describe(), id),
                        Ok(None) => tracing::debug!("No change in {}", self.source.describe()),
                        Err(e) => tracing::warn!(
                            "Polling {} failed, keeping generation {:?}: {}",
                            self.source.describe(),
                            self.store.current_id(),
                            e
                        ),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Stopped watching {}", self.source.describe());
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        path::Path,
        time::SystemTime,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        config::EngineConfig,
        parsers::bundle::SnapshotError,
        test_support::{FIXTURE, fabric_bundle, fixture_bundle},
        topology::source::FileSnapshotSource,
    };

    /// Hands out queued results, then reports no change.
    struct ScriptedSource {
        results: VecDeque<Result<SnapshotBundle, SnapshotError>>,
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn fetch_if_changed(&mut self) -> Result<Option<SnapshotBundle>, SnapshotError> {
            self.results.pop_front().transpose()
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn store() -> Arc<SnapshotStore> {
        Arc::new(SnapshotStore::new(EngineConfig::default()).unwrap())
    }

    fn malformed() -> SnapshotError {
        SnapshotError::from(serde_json::from_str::<serde_json::Value>("{").unwrap_err())
    }

    #[tokio::test]
    async fn test_poll_once_publishes_and_notifies() {
        let store = store();
        let source = ScriptedSource {
            results: VecDeque::from([Ok(fixture_bundle())]),
        };
        let mut watcher = SnapshotWatcher::new(source, Arc::clone(&store));
        let mut rx = watcher.subscribe();
        assert_eq!(*rx.borrow(), None);

        assert_eq!(watcher.poll_once().await.unwrap(), Some(7));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(7));
        assert_eq!(store.current_id(), Some(7));

        assert_eq!(watcher.poll_once().await.unwrap(), None);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_generation() {
        let store = store();
        let source = ScriptedSource {
            results: VecDeque::from([Ok(fixture_bundle()), Err(malformed())]),
        };
        let mut watcher = SnapshotWatcher::new(source, Arc::clone(&store));
        watcher.poll_once().await.unwrap();

        let err = watcher.poll_once().await.unwrap_err();
        assert!(matches!(err, EngineError::Snapshot(SnapshotError::Malformed(_))));
        assert_eq!(store.current_id(), Some(7));
        assert!(store.current().unwrap().graph.device("leaf-a").is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = store();
        let source = ScriptedSource {
            results: VecDeque::from([
                Ok(fabric_bundle(&[("leaf-1", "spine-1")], &[("leaf-1", 2)])),
                Ok(fixture_bundle()),
            ]),
        };
        let watcher = SnapshotWatcher::new(source, Arc::clone(&store)).with_interval(Duration::from_millis(10));
        let mut generations = watcher.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        generations.wait_for(|id| *id == Some(7)).await.unwrap();
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(store.current_id(), Some(7));
    }

    #[tokio::test]
    async fn test_watch_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");
        std::fs::write(&path, FIXTURE).unwrap();

        let store = store();
        let mut watcher = SnapshotWatcher::new(FileSnapshotSource::new(&path), Arc::clone(&store));
        assert_eq!(watcher.poll_once().await.unwrap(), Some(7));
        assert_eq!(watcher.poll_once().await.unwrap(), None);

        rewrite(&path, &FIXTURE.replace("\"generation\": 7", "\"generation\": 12"));
        assert_eq!(watcher.poll_once().await.unwrap(), Some(12));
    }

    fn rewrite(path: &Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(10)).unwrap();
    }
}
