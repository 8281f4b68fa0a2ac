//! Coalesces bursts of tree changes into a single write.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::store::{CategoryRecord, TreeStore};

/// Background saver. Each [`schedule`](Self::schedule) hands over a full
/// snapshot; the newest snapshot seen within `window` of the first one is
/// written, the rest are dropped.
pub struct DebouncedSaver {
    tx: mpsc::UnboundedSender<Vec<CategoryRecord>>,
    handle: JoinHandle<()>,
}

impl DebouncedSaver {
    pub fn spawn(store: Arc<dyn TreeStore>, window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(store, window, rx));
        Self { tx, handle }
    }

    pub fn schedule(&self, snapshot: Vec<CategoryRecord>) {
        if self.tx.send(snapshot).is_err() {
            warn!("Saver task is gone, tree change not persisted");
        }
    }

    /// Writes whatever is pending right away and waits for the task to end.
    pub async fn flush(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Saver task failed");
        }
    }
}

async fn run(
    store: Arc<dyn TreeStore>,
    window: Duration,
    mut rx: mpsc::UnboundedReceiver<Vec<CategoryRecord>>,
) {
    while let Some(mut latest) = rx.recv().await {
        let deadline = Instant::now() + window;
        let mut closed = false;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                next = rx.recv() => match next {
                    Some(snapshot) => latest = snapshot,
                    None => {
                        closed = true;
                        break;
                    }
                },
            }
        }

        match store.save(&latest) {
            Ok(()) => debug!(categories = latest.len(), "Subscription tree persisted"),
            Err(e) => warn!(error = %e, "Failed to save subscription tree, skipping"),
        }
        if closed {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Result;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        saves: Mutex<Vec<Vec<CategoryRecord>>>,
    }

    impl RecordingStore {
        fn saves(&self) -> Vec<Vec<CategoryRecord>> {
            self.saves.lock().unwrap().clone()
        }
    }

    impl TreeStore for RecordingStore {
        fn load(&self) -> Result<Vec<CategoryRecord>> {
            Ok(Vec::new())
        }

        fn save(&self, records: &[CategoryRecord]) -> Result<()> {
            self.saves.lock().unwrap().push(records.to_vec());
            Ok(())
        }
    }

    fn snapshot(title: &str) -> Vec<CategoryRecord> {
        vec![CategoryRecord {
            title: title.into(),
            ..Default::default()
        }]
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_coalesced() {
        let store = Arc::new(RecordingStore::default());
        let saver = DebouncedSaver::spawn(store.clone(), Duration::from_millis(1000));

        saver.schedule(snapshot("one"));
        saver.schedule(snapshot("two"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(store.saves().is_empty());

        saver.schedule(snapshot("three"));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(store.saves(), vec![snapshot("three")]);

        saver.schedule(snapshot("four"));
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(store.saves().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_pending() {
        let store = Arc::new(RecordingStore::default());
        let saver = DebouncedSaver::spawn(store.clone(), Duration::from_secs(60));

        saver.schedule(snapshot("pending"));
        saver.flush().await;

        assert_eq!(store.saves(), vec![snapshot("pending")]);
    }
}
