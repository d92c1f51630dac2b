//! Worker-pool fan-out of alert payloads.
//!
//! `dispatch` never blocks the detection loop: payloads go onto a bounded
//! queue and a fixed pool of worker threads performs the slow parts
//! (snapshot upload, webhook calls). When the queue is full the newest
//! alert is dropped and counted; the channels back off, the loop does not.

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{AlertChannel, AlertPayload, ChatChannel, CleanerHandle, EmailChannel, UploadChain};
use crate::config::SentinelConfig;

pub const DEFAULT_WORKERS: usize = 2;
const QUEUE_DEPTH_PER_WORKER: usize = 4;

#[derive(Default)]
struct DispatchCounters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time snapshot of the dispatch counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchStats {
    pub enqueued: u64,
    pub dropped: u64,
    pub processed: u64,
    pub delivered: u64,
    pub failed: u64,
}

struct WorkerContext {
    channels: Vec<Box<dyn AlertChannel>>,
    uploader: UploadChain,
    cleaner: CleanerHandle,
    counters: Arc<DispatchCounters>,
}

impl WorkerContext {
    fn process(&self, payload: AlertPayload) {
        let image_url = payload
            .snapshot
            .as_deref()
            .and_then(|path| self.uploader.upload(path));

        for channel in &self.channels {
            let report = channel.deliver(&payload, image_url.as_deref());
            self.counters
                .delivered
                .fetch_add(report.delivered as u64, Ordering::Relaxed);
            self.counters
                .failed
                .fetch_add(report.failed as u64, Ordering::Relaxed);
            if report.failed > 0 {
                log::warn!(
                    "{} channel: {} delivered, {} failed",
                    channel.name(),
                    report.delivered,
                    report.failed
                );
            } else if report.delivered > 0 {
                log::info!(
                    "{} channel: delivered to {} recipient(s)",
                    channel.name(),
                    report.delivered
                );
            }
        }

        if let Some(path) = payload.snapshot {
            self.cleaner.schedule(path);
        }
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Alert fan-out pool. Construction spawns the workers; `shutdown` drains
/// the queue and joins them.
pub struct Dispatcher {
    tx: Sender<AlertPayload>,
    done: Receiver<()>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<DispatchCounters>,
}

impl Dispatcher {
    pub fn new(
        channels: Vec<Box<dyn AlertChannel>>,
        uploader: UploadChain,
        cleaner: CleanerHandle,
        workers: usize,
    ) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = bounded::<AlertPayload>(workers * QUEUE_DEPTH_PER_WORKER);
        let (done_tx, done_rx) = bounded::<()>(0);
        let counters = Arc::new(DispatchCounters::default());
        let context = Arc::new(WorkerContext {
            channels,
            uploader,
            cleaner,
            counters: Arc::clone(&counters),
        });

        let handles = (0..workers)
            .map(|_| {
                let rx = rx.clone();
                let context = Arc::clone(&context);
                let done = done_tx.clone();
                std::thread::spawn(move || {
                    // Held for the thread's lifetime; dropping it signals exit.
                    let _done = done;
                    while let Ok(payload) = rx.recv() {
                        context.process(payload);
                    }
                })
            })
            .collect();

        Self {
            tx,
            done: done_rx,
            workers: handles,
            counters,
        }
    }

    /// Build the channels and upload chain described by the configuration.
    pub fn from_config(config: &SentinelConfig, cleaner: CleanerHandle) -> Result<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.upload.timeout)
            .build();
        let uploader = UploadChain::from_config(&config.upload, agent.clone())?;

        let mut channels: Vec<Box<dyn AlertChannel>> = Vec::new();
        if let Some(chat) = ChatChannel::from_config(&config.chat, agent.clone()) {
            channels.push(Box::new(chat));
        }
        if let Some(email) = EmailChannel::from_config(&config.email, agent) {
            channels.push(Box::new(email));
        }
        if channels.is_empty() {
            log::warn!("no delivery channels configured; alerts will only sound locally");
        }
        Ok(Self::new(channels, uploader, cleaner, DEFAULT_WORKERS))
    }

    /// Queue one alert. Returns `false` when the alert was dropped because
    /// the queue is full or the pool has stopped.
    pub fn dispatch(&self, payload: AlertPayload) -> bool {
        match self.tx.try_send(payload) {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("alert queue full; dropping alert");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("dispatcher is stopped; dropping alert");
                false
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Close the queue, let the workers drain it, and join them. Workers
    /// still mid-delivery after `timeout` are detached rather than awaited
    /// so shutdown cannot hang on a slow webhook.
    pub fn shutdown(self, timeout: Duration) {
        drop(self.tx);
        let deadline = Instant::now() + timeout;
        let drained = loop {
            match self.done.recv_deadline(deadline) {
                Ok(()) => {}
                Err(RecvTimeoutError::Disconnected) => break true,
                Err(RecvTimeoutError::Timeout) => break false,
            }
        };
        if drained {
            for worker in self.workers {
                if worker.join().is_err() {
                    log::error!("dispatch worker panicked");
                }
            }
        } else {
            log::warn!(
                "dispatch workers still delivering after {:?}; detaching",
                timeout
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ArtifactCleaner, DeliveryReport};
    use std::io::Write;
    use std::sync::Mutex;

    struct RecordingChannel {
        label: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl AlertChannel for RecordingChannel {
        fn name(&self) -> &'static str {
            self.label
        }

        fn deliver(&self, payload: &AlertPayload, _image_url: Option<&str>) -> DeliveryReport {
            self.seen.lock().unwrap().push(payload.message.clone());
            DeliveryReport {
                delivered: 1,
                failed: 0,
            }
        }
    }

    struct BlockingChannel {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl AlertChannel for BlockingChannel {
        fn name(&self) -> &'static str {
            "blocking"
        }

        fn deliver(&self, _payload: &AlertPayload, _image_url: Option<&str>) -> DeliveryReport {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            DeliveryReport::default()
        }
    }

    fn payload(message: &str) -> AlertPayload {
        AlertPayload::new(message.to_string(), None)
    }

    #[test]
    fn fan_out_reaches_every_channel() {
        let cleaner = ArtifactCleaner::start(Duration::ZERO);
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(
            vec![
                Box::new(RecordingChannel {
                    label: "first",
                    seen: Arc::clone(&first),
                }),
                Box::new(RecordingChannel {
                    label: "second",
                    seen: Arc::clone(&second),
                }),
            ],
            UploadChain::new(Vec::new()),
            cleaner.handle(),
            2,
        );

        assert!(dispatcher.dispatch(payload("intruder at the door")));
        let stats_ready = |dispatcher: &Dispatcher| dispatcher.stats().processed == 1;
        let deadline = Instant::now() + Duration::from_secs(2);
        while !stats_ready(&dispatcher) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        let stats = dispatcher.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.delivered, 2);
        assert_eq!(first.lock().unwrap().as_slice(), ["intruder at the door"]);
        assert_eq!(second.lock().unwrap().as_slice(), ["intruder at the door"]);
        dispatcher.shutdown(Duration::from_secs(1));
        cleaner.shutdown();
    }

    #[test]
    fn full_queue_drops_newest_alert() {
        let cleaner = ArtifactCleaner::start(Duration::ZERO);
        let (entered_tx, entered_rx) = bounded(16);
        let (release_tx, release_rx) = bounded(16);
        let dispatcher = Dispatcher::new(
            vec![Box::new(BlockingChannel {
                entered: entered_tx,
                release: release_rx,
            })],
            UploadChain::new(Vec::new()),
            cleaner.handle(),
            1,
        );

        // First payload is picked up and parks inside the channel.
        assert!(dispatcher.dispatch(payload("busy")));
        entered_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("worker should pick up the first alert");

        // Queue depth is workers * 4; fill it, then one more must drop.
        for n in 0..4 {
            assert!(dispatcher.dispatch(payload(&format!("queued {n}"))));
        }
        assert!(!dispatcher.dispatch(payload("overflow")));
        assert_eq!(dispatcher.stats().dropped, 1);
        assert_eq!(dispatcher.stats().enqueued, 5);

        for _ in 0..5 {
            release_tx.send(()).unwrap();
        }
        dispatcher.shutdown(Duration::from_secs(2));
        cleaner.shutdown();
    }

    #[test]
    fn shutdown_drains_queued_alerts() {
        let cleaner = ArtifactCleaner::start(Duration::ZERO);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(
            vec![Box::new(RecordingChannel {
                label: "only",
                seen: Arc::clone(&seen),
            })],
            UploadChain::new(Vec::new()),
            cleaner.handle(),
            1,
        );

        for n in 0..3 {
            assert!(dispatcher.dispatch(payload(&format!("alert {n}"))));
        }
        dispatcher.shutdown(Duration::from_secs(2));
        assert_eq!(seen.lock().unwrap().len(), 3);
        cleaner.shutdown();
    }

    #[test]
    fn snapshot_is_scheduled_for_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("detection.jpg");
        std::fs::File::create(&snapshot)
            .unwrap()
            .write_all(b"jpeg")
            .unwrap();

        let cleaner = ArtifactCleaner::start(Duration::ZERO);
        let dispatcher = Dispatcher::new(
            Vec::new(),
            UploadChain::new(Vec::new()),
            cleaner.handle(),
            1,
        );
        assert!(dispatcher.dispatch(AlertPayload::new(
            "with snapshot".to_string(),
            Some(snapshot.clone()),
        )));
        dispatcher.shutdown(Duration::from_secs(2));
        cleaner.shutdown();
        assert!(!snapshot.exists());
    }
}
