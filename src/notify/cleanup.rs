//! Delayed removal of snapshot artifacts.
//!
//! Snapshots only need to live long enough for the delivery channels to
//! read them. A single background thread keeps a due-time heap and removes
//! each file once its delay elapses; shutdown flushes whatever is pending.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const IDLE_WAIT: Duration = Duration::from_secs(60);

enum CleanerMsg {
    Remove(PathBuf),
    Stop,
}

/// Owner of the cleanup thread. Hand out [`CleanerHandle`]s to anything
/// that produces artifacts; `shutdown` stops the worker even while handles
/// are still outstanding.
pub struct ArtifactCleaner {
    tx: Sender<CleanerMsg>,
    delay: Duration,
    worker: Option<thread::JoinHandle<()>>,
}

/// Cheap cloneable submission side.
#[derive(Clone)]
pub struct CleanerHandle {
    tx: Sender<CleanerMsg>,
    delay: Duration,
}

impl CleanerHandle {
    /// Queue `path` for removal after the configured delay.
    pub fn schedule(&self, path: PathBuf) {
        log::debug!(
            "artifact {} scheduled for removal in {:?}",
            path.display(),
            self.delay
        );
        if self.tx.send(CleanerMsg::Remove(path)).is_err() {
            log::warn!("artifact cleaner already stopped; file will be left behind");
        }
    }
}

impl ArtifactCleaner {
    pub fn start(delay: Duration) -> Self {
        let (tx, rx) = unbounded::<CleanerMsg>();
        let worker = thread::Builder::new()
            .name("artifact-cleaner".to_string())
            .spawn(move || run_cleaner(rx, delay))
            .ok();
        if worker.is_none() {
            log::error!("could not spawn artifact cleaner; snapshots will not be removed");
        }
        Self { tx, delay, worker }
    }

    pub fn handle(&self) -> CleanerHandle {
        CleanerHandle {
            tx: self.tx.clone(),
            delay: self.delay,
        }
    }

    /// Stop the worker. Artifacts still waiting on their delay are removed
    /// immediately; by this point no delivery can still need them.
    pub fn shutdown(mut self) {
        if self.tx.send(CleanerMsg::Stop).is_err() {
            log::debug!("artifact cleaner already stopped");
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("artifact cleaner thread panicked");
            }
        }
    }
}

fn run_cleaner(rx: Receiver<CleanerMsg>, delay: Duration) {
    let mut pending: BinaryHeap<Reverse<(Instant, PathBuf)>> = BinaryHeap::new();
    loop {
        let wait = match pending.peek() {
            Some(Reverse((due, _))) => due.saturating_duration_since(Instant::now()),
            None => IDLE_WAIT,
        };
        match rx.recv_timeout(wait) {
            Ok(CleanerMsg::Remove(path)) => {
                pending.push(Reverse((Instant::now() + delay, path)));
            }
            Ok(CleanerMsg::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        let now = Instant::now();
        while matches!(pending.peek(), Some(Reverse((due, _))) if *due <= now) {
            if let Some(Reverse((_, path))) = pending.pop() {
                remove_artifact(&path);
            }
        }
    }
    // Flush: nothing can read these files anymore.
    while let Some(Reverse((_, path))) = pending.pop() {
        remove_artifact(&path);
    }
    for msg in rx.try_iter() {
        if let CleanerMsg::Remove(path) = msg {
            remove_artifact(&path);
        }
    }
}

fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => log::info!("removed artifact {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("artifact {} already gone", path.display());
        }
        Err(e) => log::warn!("could not remove artifact {}: {}", path.display(), e),
    }
}
