/// Background refresher
///
/// Calls `ensure_fresh` for both domains on a fixed period so readers
/// usually find a warm entry. It goes through the same gate as readers, so
/// running it alongside request-driven refreshes never doubles the fetch
/// rate.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::cache::store::{RefreshOutcome, SnapshotStore, StoreOptions};
use crate::ingest::Provider;
use crate::logging::{self, Source};
use crate::model::Domain;

/// Handle to a running refresher thread.
///
/// Dropping the handle stops the thread at its next wake-up; `stop` also
/// waits for it to exit.
pub struct RefresherHandle {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl RefresherHandle {
    /// Signals the thread and joins it.
    pub fn stop(mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                logging::error(Source::Cache, None, "refresher thread panicked");
            }
        }
    }
}

impl Drop for RefresherHandle {
    fn drop(&mut self) {
        // Closing the channel wakes the thread.
        self.shutdown.take();
    }
}

/// Spawns a thread that runs one refresh pass immediately and then one
/// every `period` until stopped.
pub fn spawn_refresher(store: Arc<SnapshotStore>, period: Duration) -> std::io::Result<RefresherHandle> {
    let (tx, rx) = mpsc::channel::<()>();

    let thread = std::thread::Builder::new()
        .name("airwatch-refresher".to_string())
        .spawn(move || {
            logging::info(
                Source::Cache,
                None,
                &format!("refresher started, period {}s", period.as_secs()),
            );
            loop {
                run_pass(&store);
                match rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            logging::info(Source::Cache, None, "refresher stopped");
        })?;

    Ok(RefresherHandle {
        shutdown: Some(tx),
        thread: Some(thread),
    })
}

/// Bootstraps a store synchronously, then starts the refresher on it.
///
/// Both domains have had one attempt before this returns, so readers never
/// race the refresher's first fetch for a placeholder.
pub fn bootstrap_and_spawn(
    options: StoreOptions,
    air_quality: Box<dyn Provider>,
    forecast: Box<dyn Provider>,
    period: Duration,
) -> std::io::Result<(Arc<SnapshotStore>, RefresherHandle)> {
    let store = Arc::new(SnapshotStore::bootstrap(options, air_quality, forecast));
    let handle = spawn_refresher(Arc::clone(&store), period)?;
    Ok((store, handle))
}

/// One gate pass over every domain.
pub fn run_pass(store: &SnapshotStore) -> Vec<(Domain, RefreshOutcome)> {
    Domain::ALL
        .into_iter()
        .map(|domain| {
            let outcome = store.ensure_fresh(domain);
            if outcome != RefreshOutcome::Fresh {
                logging::debug(
                    Source::Cache,
                    Some(domain.as_str()),
                    &format!("background pass: {:?}", outcome),
                );
            }
            (domain, outcome)
        })
        .collect()
}
