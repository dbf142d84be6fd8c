//! Background log directory scanner

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::tracker::TrackedFiles;
use super::{ProgressMap, ProgressSink};

/// Configuration for the log watcher
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Directory holding the plotter logs
    pub directory: PathBuf,
    /// Time between directory scans
    pub scan_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            scan_interval: Duration::from_secs(15),
        }
    }
}

/// Latest published snapshot. Only ever swapped whole.
type Published = Arc<Mutex<Arc<ProgressMap>>>;

struct Worker {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

/// Watches a log directory and keeps a snapshot of unfinished plots
pub struct LogWatcher {
    config: WatchConfig,
    published: Published,
    sink: Option<Arc<dyn ProgressSink>>,
    exited: Arc<Notify>,
    worker: Option<Worker>,
}

impl LogWatcher {
    /// Create a watcher. Nothing is scanned until [`LogWatcher::start`].
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            published: Arc::new(Mutex::new(Arc::new(ProgressMap::new()))),
            sink: None,
            exited: Arc::new(Notify::new()),
            worker: None,
        }
    }

    /// Forward every published snapshot to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Whether the background task is alive
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Start scanning in the background
    ///
    /// The first scan happens right away. Must be called from within a tokio
    /// runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            bail!("Log watcher already started");
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.exited = Arc::new(Notify::new());

        let task = ScanTask {
            directory: self.config.directory.clone(),
            interval: self.config.scan_interval,
            tracked: TrackedFiles::new(),
            published: Arc::clone(&self.published),
            sink: self.sink.clone(),
        };
        let exited = Arc::clone(&self.exited);

        let handle = tokio::spawn(async move {
            let result = task.run(shutdown_rx).await;
            exited.notify_one();
            result
        });

        self.worker = Some(Worker {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Stop scanning and wait for the background task to finish
    ///
    /// A scan in progress is allowed to complete. Returns the error that
    /// stopped the task if it had already died.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            bail!("Log watcher is not running");
        };

        // Fails only if the task already exited on its own
        let _ = worker.shutdown_tx.send(());

        worker.handle.await.context("Log watcher task panicked")?
    }

    /// Resolves once the background task has exited
    pub async fn stopped(&self) {
        self.exited.notified().await;
    }

    /// Current progress of every unfinished plot
    pub fn get_progress(&self) -> Arc<ProgressMap> {
        Arc::clone(&self.published.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

struct ScanTask {
    directory: PathBuf,
    interval: Duration,
    tracked: TrackedFiles,
    published: Published,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl ScanTask {
    async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        info!(
            "Log watcher started (interval: {}s, dir: {})",
            self.interval.as_secs(),
            self.directory.display()
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Also taken when the watcher is dropped
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once() {
                        error!("Log watcher stopping: {:#}", e);
                        return Err(e);
                    }
                }
            }
        }

        info!("Log watcher stopped");
        Ok(())
    }

    fn scan_once(&mut self) -> Result<()> {
        let snapshot = Arc::new(self.tracked.scan(&self.directory)?);

        debug!(
            in_progress = snapshot.len(),
            completed = self.tracked.completed_count(),
            "Scan finished"
        );

        *self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);

        if let Some(sink) = &self.sink {
            sink.set_progress(snapshot);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingSink {
        snapshots: Mutex<Vec<Arc<ProgressMap>>>,
    }

    impl ProgressSink for RecordingSink {
        fn set_progress(&self, progress: Arc<ProgressMap>) {
            self.snapshots.lock().unwrap().push(progress);
        }
    }

    fn config_for(directory: PathBuf) -> WatchConfig {
        WatchConfig {
            directory,
            scan_interval: Duration::from_millis(20),
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("running.log"), "Backpropagating on table 3\n").unwrap();
        fs::write(dir.path().join("done.log"), "Write checkpoint tables\n").unwrap();

        let mut watcher = LogWatcher::new(config_for(dir.path().to_path_buf()));
        assert!(watcher.get_progress().is_empty());

        watcher.start().unwrap();
        assert!(watcher.is_running());
        wait_for(|| !watcher.get_progress().is_empty()).await;

        let progress = watcher.get_progress();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress.get("running.log"), Some(&58));

        watcher.shutdown().await.unwrap();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let dir = tempdir().unwrap();
        let mut watcher = LogWatcher::new(config_for(dir.path().to_path_buf()));
        watcher.start().unwrap();
        assert!(watcher.start().is_err());
        watcher.shutdown().await.unwrap();
        assert!(watcher.shutdown().await.is_err());
    }

    #[tokio::test]
    async fn test_sink_receives_snapshots() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("plot.log"), "Compressing tables 3 and 4\n").unwrap();

        let sink = Arc::new(RecordingSink::default());
        let mut watcher = LogWatcher::new(config_for(dir.path().to_path_buf()))
            .with_sink(sink.clone());
        watcher.start().unwrap();
        wait_for(|| !sink.snapshots.lock().unwrap().is_empty()).await;
        watcher.shutdown().await.unwrap();

        let snapshots = sink.snapshots.lock().unwrap();
        assert_eq!(snapshots[0].get("plot.log"), Some(&79));
    }

    /// Holds the first `set_progress` call until released
    struct GatedSink {
        entered: Mutex<Option<std::sync::mpsc::Sender<()>>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
        published: AtomicUsize,
    }

    impl ProgressSink for GatedSink {
        fn set_progress(&self, _progress: Arc<ProgressMap>) {
            if let Some(entered) = self.entered.lock().unwrap().take() {
                entered.send(()).unwrap();
            }
            let _ = self.release.lock().unwrap().recv();
            self.published.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_waits_for_scan_in_progress() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("plot.log"), "Computing table 6\n").unwrap();

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let sink = Arc::new(GatedSink {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
            published: AtomicUsize::new(0),
        });

        let config = WatchConfig {
            directory: dir.path().to_path_buf(),
            scan_interval: Duration::from_secs(3600),
        };
        let mut watcher = LogWatcher::new(config).with_sink(sink.clone());
        watcher.start().unwrap();
        wait_for(|| entered_rx.try_recv().is_ok()).await;

        let shutdown = tokio::spawn(async move {
            let result = watcher.shutdown().await;
            (watcher, result)
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!shutdown.is_finished());
        assert_eq!(sink.published.load(Ordering::SeqCst), 0);

        release_tx.send(()).unwrap();
        let (watcher, result) = tokio::time::timeout(Duration::from_secs(5), shutdown)
            .await
            .expect("shutdown should finish once the scan completes")
            .unwrap();

        result.unwrap();
        assert_eq!(sink.published.load(Ordering::SeqCst), 1);
        assert_eq!(watcher.get_progress().get("plot.log"), Some(&36));
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn test_missing_directory_stops_watcher() {
        let dir = tempdir().unwrap();
        let mut watcher = LogWatcher::new(config_for(dir.path().join("missing")));
        watcher.start().unwrap();

        tokio::time::timeout(Duration::from_secs(5), watcher.stopped())
            .await
            .expect("watcher should stop on its own");

        let err = watcher.shutdown().await.unwrap_err();
        assert!(err.to_string().contains("Failed to read log directory"));
    }
}
