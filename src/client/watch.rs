//! Polling watcher for backends without a push changefeed.
//!
//! Each watch is a tokio task that reads one path on a fixed interval and
//! invokes the callback when the serialized value differs from the last one
//! delivered. The first successful read is always delivered. Read errors are
//! logged and polling continues.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::store::{DocumentStore, normalize_path};

/// Poll interval used by [`watch`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Cancellation handle for a running watch.
///
/// Dropping the handle leaves the watch running; call [`WatchHandle::cancel`].
pub struct WatchHandle {
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Stop polling. No callback runs after this returns.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Watch `path` on `store`, polling every two seconds.
pub fn watch<S, F>(store: Arc<S>, path: &str, callback: F) -> WatchHandle
where
    S: DocumentStore + ?Sized + 'static,
    F: FnMut(Option<Value>) + Send + 'static,
{
    watch_with_interval(store, path, DEFAULT_POLL_INTERVAL, callback)
}

/// Watch `path` on `store`, polling every `interval`.
///
/// `callback` receives `None` while the document does not exist.
pub fn watch_with_interval<S, F>(
    store: Arc<S>,
    path: &str,
    interval: Duration,
    mut callback: F,
) -> WatchHandle
where
    S: DocumentStore + ?Sized + 'static,
    F: FnMut(Option<Value>) + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let path = normalize_path(path).to_string();

    let task = tokio::spawn(async move {
        info!(path = %path, interval_ms = interval.as_millis() as u64, "Watch started");

        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_delivered: Option<String> = None;

        loop {
            tick.tick().await;

            if flag.load(Ordering::SeqCst) {
                debug!(path = %path, "Watch cancelled");
                return;
            }

            let value = match store.get(&path).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(path = %path, error = %e, "Watch poll failed");
                    continue;
                }
            };

            let serialized = match &value {
                Some(v) => v.to_string(),
                None => Value::Null.to_string(),
            };
            if last_delivered.as_deref() == Some(serialized.as_str()) {
                continue;
            }

            // A cancel may have landed while the read was in flight.
            if flag.load(Ordering::SeqCst) {
                return;
            }
            last_delivered = Some(serialized);
            callback(value);
        }
    });

    WatchHandle { cancelled, task }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use serde_json::{Map, json};
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::{ClientError, Result};

    const TICK: Duration = Duration::from_millis(10);

    /// Replays a script of read results, then repeats the last one.
    struct ScriptedStore {
        script: Mutex<VecDeque<Option<Option<Value>>>>,
        last: Mutex<Option<Value>>,
        reads: AtomicUsize,
    }

    impl ScriptedStore {
        /// `None` entries in the script are read failures.
        fn new(script: Vec<Option<Option<Value>>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                reads: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DocumentStore for ScriptedStore {
        async fn get(&self, _path: &str) -> Result<Option<Value>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Some(value)) => {
                    *self.last.lock().unwrap() = value.clone();
                    Ok(value)
                }
                Some(None) => Err(ClientError::Transport {
                    url: "stub".into(),
                    reason: "connection refused".into(),
                }
                .into()),
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }

        async fn put(&self, _path: &str, _value: Value) -> Result<()> {
            Ok(())
        }

        async fn dump(&self) -> Result<Map<String, Value>> {
            Ok(Map::new())
        }

        async fn replace_all(&self, _data: Map<String, Value>) -> Result<()> {
            Ok(())
        }
    }

    async fn collect_for(rx: &mut mpsc::UnboundedReceiver<Option<Value>>, wait: Duration) -> Vec<Option<Value>> {
        tokio::time::sleep(wait).await;
        let mut seen = Vec::new();
        while let Ok(v) = rx.try_recv() {
            seen.push(v);
        }
        seen
    }

    fn channel_callback() -> (
        impl FnMut(Option<Value>) + Send + 'static,
        mpsc::UnboundedReceiver<Option<Value>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (move |v| {
            let _ = tx.send(v);
        }, rx)
    }

    #[tokio::test]
    async fn delivers_first_read_and_only_changes() {
        let a = json!({"title": "A"});
        let b = json!({"title": "B"});
        let store = ScriptedStore::new(vec![
            Some(Some(a.clone())),
            Some(Some(a.clone())),
            Some(Some(b.clone())),
            Some(Some(b.clone())),
            Some(Some(a.clone())),
        ]);
        let (callback, mut rx) = channel_callback();

        let handle = watch_with_interval(store, "sites/a", TICK, callback);
        let seen = collect_for(&mut rx, TICK * 15).await;
        handle.cancel();

        assert_eq!(seen, vec![Some(a.clone()), Some(b), Some(a)]);
    }

    #[tokio::test]
    async fn missing_document_is_delivered_once() {
        let store = ScriptedStore::new(vec![Some(None)]);
        let (callback, mut rx) = channel_callback();

        let handle = watch_with_interval(store, "sites/none", TICK, callback);
        let seen = collect_for(&mut rx, TICK * 8).await;
        handle.cancel();

        assert_eq!(seen, vec![None]);
    }

    #[tokio::test]
    async fn read_errors_are_skipped() {
        let a = json!({"v": 1});
        let b = json!({"v": 2});
        let store = ScriptedStore::new(vec![
            None,
            Some(Some(a.clone())),
            None,
            Some(Some(a.clone())),
            Some(Some(b.clone())),
        ]);
        let (callback, mut rx) = channel_callback();

        let handle = watch_with_interval(store.clone(), "p", TICK, callback);
        let seen = collect_for(&mut rx, TICK * 15).await;
        handle.cancel();

        assert_eq!(seen, vec![Some(a), Some(b)]);
        assert!(store.reads.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test]
    async fn cancel_stops_polling() {
        let store = ScriptedStore::new(vec![Some(Some(json!({"v": 1})))]);
        let (callback, mut rx) = channel_callback();

        let handle = watch_with_interval(store.clone(), "p", TICK, callback);
        let _ = collect_for(&mut rx, TICK * 5).await;
        handle.cancel();
        assert!(handle.is_cancelled());

        let reads_at_cancel = store.reads.load(Ordering::SeqCst);
        store
            .script
            .lock()
            .unwrap()
            .push_back(Some(Some(json!({"v": 2}))));
        let after = collect_for(&mut rx, TICK * 5).await;

        assert!(after.is_empty());
        assert!(store.reads.load(Ordering::SeqCst) <= reads_at_cancel + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn default_watch_reads_immediately_then_every_two_seconds() {
        assert_eq!(DEFAULT_POLL_INTERVAL, Duration::from_secs(2));
        let store = ScriptedStore::new(vec![
            Some(Some(json!({"v": 1}))),
            Some(Some(json!({"v": 2}))),
        ]);
        let (callback, mut rx) = channel_callback();

        let handle = watch(store.clone(), "sites/a", callback);

        assert_eq!(rx.recv().await, Some(Some(json!({"v": 1}))));
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1990)).await;
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(rx.recv().await, Some(Some(json!({"v": 2}))));
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);

        handle.cancel();
    }
}
