//! Background recompute driven by committed selection changes.
//!
//! Pane re-analysis is expensive relative to drag events, so committed
//! bounds go through a last-write-wins pending slot: a newer commit
//! replaces an unstarted older one, and a generation watermark lets a
//! running task detect that its result is already stale.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use selection::{Generation, SelectionObserver, ViewRange};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RecomputeError {
    #[error("recompute runtime stopped")]
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecomputeStatus {
    Pending,
    Running,
    Done,
    Superseded,
    Failed(String),
}

impl RecomputeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecomputeStatus::Pending | RecomputeStatus::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecomputeEvent {
    pub generation: Generation,
    pub range: ViewRange,
    pub status: RecomputeStatus,
}

/// Handed to the task so long computations can poll for supersession
/// and bail out instead of finishing work nobody will use.
pub struct Staleness {
    latest: Arc<AtomicU64>,
    generation: Generation,
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        self.latest.load(Ordering::SeqCst) != self.generation
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}

#[derive(Clone)]
pub struct RecomputeHandle {
    tx_submit: Sender<(Generation, ViewRange)>,
    pub rx_events: Receiver<RecomputeEvent>,
    latest: Arc<AtomicU64>,
}

impl RecomputeHandle {
    /// Records the commit as the sole pending request. Only the most
    /// recent bounds matter; a replaced request is reported superseded.
    pub fn submit(&self, range: ViewRange, generation: Generation) -> Result<(), RecomputeError> {
        self.latest.store(generation, Ordering::SeqCst);
        self.tx_submit
            .send((generation, range))
            .map_err(|_| RecomputeError::Stopped)
    }
}

impl SelectionObserver for RecomputeHandle {
    fn on_selection_committed(&mut self, range: ViewRange, generation: Generation) {
        if let Err(err) = self.submit(range, generation) {
            warn!(generation, "dropping selection commit: {err}");
        }
    }
}

pub struct RecomputeRuntime;

impl RecomputeRuntime {
    pub fn start<F>(num_workers: usize, task: F) -> RecomputeHandle
    where
        F: Fn(ViewRange, &Staleness) -> Result<()> + Send + Sync + 'static,
    {
        let (tx_submit, rx_submit) = unbounded::<(Generation, ViewRange)>();
        let (tx_events, rx_events) = unbounded::<RecomputeEvent>();
        let pending = Arc::new(Mutex::new(None::<(Generation, ViewRange)>));
        let latest = Arc::new(AtomicU64::new(0));
        let stopped = Arc::new(AtomicBool::new(false));
        let task = Arc::new(task);

        // Feeder thread: moves submissions into the pending slot and
        // reports the request it displaces.
        {
            let pending = pending.clone();
            let tx_e = tx_events.clone();
            let stopped = stopped.clone();
            thread::spawn(move || {
                while let Ok((generation, range)) = rx_submit.recv() {
                    let displaced = pending.lock().replace((generation, range));
                    if let Some((old_gen, old_range)) = displaced {
                        debug!(generation = old_gen, "pending recompute superseded");
                        let _ = tx_e.send(RecomputeEvent {
                            generation: old_gen,
                            range: old_range,
                            status: RecomputeStatus::Superseded,
                        });
                    }
                    let _ = tx_e.send(RecomputeEvent {
                        generation,
                        range,
                        status: RecomputeStatus::Pending,
                    });
                }
                // All handles dropped; let workers drain and exit.
                stopped.store(true, Ordering::SeqCst);
            });
        }

        for worker in 0..num_workers.max(1) {
            let pending = pending.clone();
            let tx_e = tx_events.clone();
            let latest = latest.clone();
            let stopped = stopped.clone();
            let task = task.clone();
            thread::spawn(move || loop {
                let job = pending.lock().take();
                let Some((generation, range)) = job else {
                    if stopped.load(Ordering::SeqCst) {
                        info!(worker, "recompute worker exiting");
                        break;
                    }
                    thread::sleep(Duration::from_millis(5));
                    continue;
                };

                let staleness = Staleness {
                    latest: latest.clone(),
                    generation,
                };
                if staleness.is_stale() {
                    let _ = tx_e.send(RecomputeEvent {
                        generation,
                        range,
                        status: RecomputeStatus::Superseded,
                    });
                    continue;
                }

                info!(worker, generation, "recompute started");
                let _ = tx_e.send(RecomputeEvent {
                    generation,
                    range,
                    status: RecomputeStatus::Running,
                });
                let status = match task(range, &staleness) {
                    Ok(()) if staleness.is_stale() => RecomputeStatus::Superseded,
                    Ok(()) => RecomputeStatus::Done,
                    Err(err) => {
                        warn!(worker, generation, "recompute failed: {err:#}");
                        RecomputeStatus::Failed(err.to_string())
                    }
                };
                let _ = tx_e.send(RecomputeEvent {
                    generation,
                    range,
                    status,
                });
            });
        }

        RecomputeHandle {
            tx_submit,
            rx_events,
            latest,
        }
    }
}
