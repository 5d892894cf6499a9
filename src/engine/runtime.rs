use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::warn;

use crate::average::{AverageKind, AverageManager, AverageOptions};
use crate::core::Ensemble;
use crate::engine::dispatcher::{Dispatcher, WorkHandler};
use crate::observability::{MetricsSnapshot, PipelineMetrics};
use crate::recording::{encode_block, EnsembleRecorder, RecorderConfig};

/// Published whenever an averaging window closes.
#[derive(Debug, Clone)]
pub struct AveragedEvent {
    pub kind: AverageKind,
    pub ensemble: Ensemble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Running,
    Stopped,
}

/// Construction parameters for [`AveragingRuntime`].
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Depth of the ingest queue; arrivals beyond this are dropped and
    /// reported rather than growing memory without bound.
    pub queue_capacity: usize,
    /// Capacity of the averaged-event broadcast channel.
    pub event_capacity: usize,
    pub lta: AverageOptions,
    pub sta: AverageOptions,
    pub lta_enabled: bool,
    pub sta_enabled: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 512,
            event_capacity: 64,
            lta: AverageOptions::default(),
            sta: AverageOptions::default(),
            lta_enabled: true,
            sta_enabled: true,
        }
    }
}

struct ManagerSlot {
    enabled: bool,
    manager: AverageManager,
}

struct Shared {
    lta: Mutex<ManagerSlot>,
    sta: Mutex<ManagerSlot>,
    recorder: Mutex<Option<EnsembleRecorder>>,
    events: broadcast::Sender<AveragedEvent>,
    metrics: Arc<PipelineMetrics>,
}

impl Shared {
    fn slot(&self, kind: AverageKind) -> MutexGuard<'_, ManagerSlot> {
        let slot = match kind {
            AverageKind::LongTerm => &self.lta,
            AverageKind::ShortTerm => &self.sta,
        };
        slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn recorder(&self) -> MutexGuard<'_, Option<EnsembleRecorder>> {
        self.recorder
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Drain worker: forwards each ensemble to both managers and routes any
/// closed window to event publication and recording.
struct AveragingHandler {
    shared: Arc<Shared>,
}

#[async_trait]
impl WorkHandler<Ensemble> for AveragingHandler {
    async fn handle(&mut self, ensemble: Ensemble) -> Result<()> {
        // Run both managers even if the first errors; the dispatcher counts
        // and logs whatever comes back.
        let long = self.run_manager(AverageKind::LongTerm, &ensemble);
        let short = self.run_manager(AverageKind::ShortTerm, &ensemble);
        long.and(short)
    }
}

impl AveragingHandler {
    fn run_manager(&self, kind: AverageKind, ensemble: &Ensemble) -> Result<()> {
        let averaged = {
            let mut slot = self.shared.slot(kind);
            if !slot.enabled {
                return Ok(());
            }
            slot.manager.add_ensemble(ensemble)
        };
        let Some(averaged) = averaged else {
            return Ok(());
        };

        match kind {
            AverageKind::LongTerm => self.shared.metrics.record_long_term_emitted(),
            AverageKind::ShortTerm => self.shared.metrics.record_short_term_emitted(),
        }

        if let Some(recorder) = self.shared.recorder().as_ref() {
            let bytes = encode_block(&averaged).context("failed to encode averaged ensemble")?;
            // Write failures are logged and skipped; the chunk is lost but
            // the pipeline keeps running.
            if let Err(e) = recorder.record_data(&bytes) {
                self.shared.metrics.record_write_error();
                warn!("failed to record averaged ensemble: {e:#}");
            } else {
                self.shared.metrics.record_bytes_recorded(bytes.len() as u64);
            }
        }

        // No receivers is fine; subscribers come and go.
        let _ = self.shared.events.send(AveragedEvent { kind, ensemble: averaged });
        Ok(())
    }
}

/// Front door of the averaging pipeline.
///
/// Incoming ensembles are queued without blocking the producer; a single
/// worker drains them through the long-term and short-term managers, which
/// are configured independently and never share state. Averaged output is
/// published on a broadcast channel (dropping the receiver unsubscribes)
/// and, when recording is enabled, appended to the recording sink.
pub struct AveragingRuntime {
    dispatcher: Dispatcher<Ensemble>,
    shared: Arc<Shared>,
    status: RuntimeStatus,
}

impl AveragingRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shared = Arc::new(Shared {
            lta: Mutex::new(ManagerSlot {
                enabled: config.lta_enabled,
                manager: AverageManager::new(AverageKind::LongTerm, config.lta),
            }),
            sta: Mutex::new(ManagerSlot {
                enabled: config.sta_enabled,
                manager: AverageManager::new(AverageKind::ShortTerm, config.sta),
            }),
            recorder: Mutex::new(None),
            events,
            metrics: Arc::new(PipelineMetrics::new()),
        });

        let handler = AveragingHandler { shared: shared.clone() };
        let dispatcher = Dispatcher::spawn(config.queue_capacity.max(1), Box::new(handler));

        Self {
            dispatcher,
            shared,
            status: RuntimeStatus::Running,
        }
    }

    pub fn status(&self) -> RuntimeStatus {
        self.status
    }

    /// Entry point for each incoming ensemble from the instrument or
    /// playback source. Clones and enqueues; never blocks the caller.
    /// Returns false if the ensemble was dropped (full queue or stopped).
    pub fn average_ensemble(&self, ensemble: &Ensemble) -> bool {
        self.shared.metrics.record_received();
        let accepted = self.dispatcher.enqueue(ensemble.clone());
        if !accepted {
            self.shared.metrics.record_dropped();
        }
        accepted
    }

    /// Subscribe to averaged output. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<AveragedEvent> {
        self.shared.events.subscribe()
    }

    pub fn set_lta_options(&self, options: AverageOptions) {
        self.shared.slot(AverageKind::LongTerm).manager.configure(options);
    }

    pub fn set_sta_options(&self, options: AverageOptions) {
        self.shared.slot(AverageKind::ShortTerm).manager.configure(options);
    }

    pub fn lta_options(&self) -> AverageOptions {
        self.shared.slot(AverageKind::LongTerm).manager.options().clone()
    }

    pub fn sta_options(&self) -> AverageOptions {
        self.shared.slot(AverageKind::ShortTerm).manager.options().clone()
    }

    pub fn set_lta_enabled(&self, enabled: bool) {
        self.shared.slot(AverageKind::LongTerm).enabled = enabled;
    }

    pub fn set_sta_enabled(&self, enabled: bool) {
        self.shared.slot(AverageKind::ShortTerm).enabled = enabled;
    }

    /// Reset both managers, e.g. when the selected project changes.
    /// Discards in-progress windows; emits nothing.
    pub fn clear(&self) {
        self.shared.slot(AverageKind::LongTerm).manager.clear();
        self.shared.slot(AverageKind::ShortTerm).manager.clear();
    }

    /// Route subsequent averaged output to a recording sink.
    pub fn enable_recording(&self, config: RecorderConfig) -> Result<()> {
        let recorder = EnsembleRecorder::new(config).context("failed to start recording")?;
        *self.shared.recorder() = Some(recorder);
        Ok(())
    }

    /// Stop recording; flushes and returns the last file path, if any.
    pub fn disable_recording(&self) -> Result<Option<PathBuf>> {
        match self.shared.recorder().take() {
            Some(recorder) => recorder.close(),
            None => Ok(None),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recorder().is_some()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let mut snapshot = self.shared.metrics.snapshot();
        snapshot.handler_errors = self.dispatcher.handler_errors();
        snapshot
    }

    /// Drain the remaining queue, stop the worker, and close any open
    /// recording file.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.dispatcher.shutdown().await;
        if let Some(recorder) = self.shared.recorder().take() {
            recorder.close()?;
        }
        self.status = RuntimeStatus::Stopped;
        Ok(())
    }
}
