use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc,
};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use super::{DistributionError, DistributionTarget};
use crate::core::types::{CertificateRecord, DispatchReport, DistributionOutcome};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Process-wide cancellation signal shared between the signal handler and
/// running dispatches.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs every target on its own thread and collects one outcome per target.
pub struct RunnerFanOut {
    cancellation: CancellationFlag,
    poll_interval: Duration,
}

impl RunnerFanOut {
    pub fn new(cancellation: CancellationFlag) -> Self {
        Self {
            cancellation,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Blocks until every target has finished or cancellation fires. Targets
    /// still running at cancellation are reported as failed; their threads
    /// are left to finish on their own.
    pub fn dispatch(
        &self,
        targets: &[Arc<dyn DistributionTarget>],
        hostnames: &[String],
        record: &CertificateRecord,
    ) -> DispatchReport {
        if targets.is_empty() {
            warn!("[fanout] no distribution targets configured");
            return DispatchReport::default();
        }

        let shared_hostnames: Arc<Vec<String>> = Arc::new(hostnames.to_vec());
        let shared_record = Arc::new(record.clone());
        let (tx, rx) = mpsc::channel();

        let mut slots: Vec<Option<DistributionOutcome>> = vec![None; targets.len()];
        let mut pending = targets.len();

        // Launch everything before waiting on anything.
        for (index, target) in targets.iter().enumerate() {
            let worker_tx = tx.clone();
            let worker_target = Arc::clone(target);
            let hostnames = Arc::clone(&shared_hostnames);
            let record = Arc::clone(&shared_record);
            let spawned = thread::Builder::new()
                .name(format!("runner-{}", target.name()))
                .spawn(move || {
                    info!("[fanout] {} started", worker_target.name());
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        worker_target.exec(&hostnames, &record)
                    }))
                    .unwrap_or_else(|payload| {
                        Err(DistributionError::Provider(format!(
                            "runner panicked: {}",
                            panic_message(payload.as_ref())
                        )))
                    });
                    let _ = worker_tx.send((index, result));
                });
            if let Err(err) = spawned {
                error!("[fanout] {} could not start: {}", target.name(), err);
                slots[index] = Some(DistributionOutcome::failure(
                    target.name(),
                    format!("failed to start worker thread: {err}"),
                ));
                pending -= 1;
            }
        }
        drop(tx);

        let mut cancelled = false;
        while pending > 0 {
            if self.cancellation.is_cancelled() {
                warn!("[fanout] cancelled with {} target(s) still running", pending);
                cancelled = true;
                break;
            }
            match rx.recv_timeout(self.poll_interval) {
                Ok((index, result)) => {
                    let name = targets[index].name();
                    let outcome = match result {
                        Ok(message) => {
                            info!("[fanout] {} finished", name);
                            DistributionOutcome::success(name, message)
                        }
                        Err(err) => {
                            error!("[fanout] {} failed: {}", name, err);
                            DistributionOutcome::failure(name, err.to_string())
                        }
                    };
                    if slots[index].replace(outcome).is_none() {
                        pending -= 1;
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        let outcomes = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| {
                    let reason = if cancelled {
                        DistributionError::Cancelled.to_string()
                    } else {
                        "runner exited without reporting a result".to_string()
                    };
                    DistributionOutcome::failure(target.name(), reason)
                })
            })
            .collect();
        let report = DispatchReport::from_outcomes(outcomes);
        info!(
            "[fanout] {} attempted, {} succeeded, {} failed",
            report.attempted, report.succeeded, report.failed
        );
        report
    }
}
