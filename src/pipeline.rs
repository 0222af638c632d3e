use crate::{
    config::Config,
    dataset::Record,
    error::StageError,
    outcome::Outcome,
    sampler::Sample,
    services::{Extractor, Ingestor, Locator, ResolvedLocation},
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Tells workers to stop taking new records. Chains already started run to completion.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            requested: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        match cfg.limits.run_timeout_seconds {
            0 => Self::new(),
            secs => Self::with_deadline(Duration::from_secs(secs)),
        }
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

pub struct RunOutput {
    /// Outcomes of every started record, in sample order.
    pub outcomes: Vec<Outcome>,
    /// Records never started because the run was stopped.
    pub pending: usize,
    pub stopped_early: bool,
}

pub struct Pipeline<L, I, X> {
    locator: L,
    ingestor: I,
    extractor: X,
    workers: usize,
    stop_on_credentials_rejected: bool,
}

impl<L: Locator, I: Ingestor, X: Extractor> Pipeline<L, I, X> {
    pub fn new(cfg: &Config, locator: L, ingestor: I, extractor: X) -> Self {
        Self {
            locator,
            ingestor,
            extractor,
            workers: cfg.global.max_parallel_records.max(1),
            stop_on_credentials_rejected: cfg.global.stop_on_credentials_rejected,
        }
    }

    /// Audits every sampled record, one outcome per started record.
    ///
    /// Up to `max_parallel_records` records are in flight; each worker makes one
    /// external call at a time. Outcomes land in slots indexed by sample position,
    /// so completion order never affects report order.
    pub fn run(&self, sample: &Sample, stop: &StopSignal) -> RunOutput {
        let records = sample.records();
        let total = records.len();
        let workers = self.workers.min(total.max(1));
        let cursor = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<Outcome>>> = Mutex::new(vec![None; total]);

        info!("auditing {total} records with {workers} worker(s)");

        std::thread::scope(|scope| {
            for worker in 0..workers {
                let cursor = &cursor;
                let slots = &slots;
                scope.spawn(move || {
                    loop {
                        if stop.is_stopped() {
                            debug!("worker {worker} stopping: stop signal raised");
                            break;
                        }
                        let idx = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(record) = records.get(idx) else {
                            break;
                        };
                        let outcome = self.audit_record(idx, record);
                        if self.stop_on_credentials_rejected
                            && outcome.reason().is_some_and(StageError::credentials_rejected)
                        {
                            warn!("credentials rejected at record {idx}; stopping intake");
                            stop.request();
                        }
                        let mut guard = slots.lock().unwrap_or_else(|e| e.into_inner());
                        guard[idx] = Some(outcome);
                    }
                });
            }
        });

        let slots = slots.into_inner().unwrap_or_else(|e| e.into_inner());
        let outcomes: Vec<Outcome> = slots.into_iter().flatten().collect();
        let pending = total - outcomes.len();
        if pending > 0 {
            warn!("run stopped early: {pending} of {total} records not started");
        }

        RunOutput {
            outcomes,
            pending,
            stopped_early: pending > 0,
        }
    }

    /// Runs locate -> ingest -> extract for one record. Never fails: every
    /// error becomes a failure outcome tagged with its stage.
    pub fn audit_record(&self, position: usize, record: &Record) -> Outcome {
        let key = record.key;
        info!("record {position} {key}: start");

        let outcome = match self.locator.locate(&key) {
            Err(reason) => Outcome::Failure {
                record: record.clone(),
                location: None,
                reason,
            },
            Ok(ResolvedLocation::Absent) => Outcome::Failure {
                record: record.clone(),
                location: Some(ResolvedLocation::Absent),
                reason: StageError::NotPublished,
            },
            Ok(ResolvedLocation::Present(address)) => self.ingest_and_extract(record, address),
        };

        match &outcome {
            Outcome::Success { result, .. } => {
                info!(
                    "record {position} {key}: ok result_chars={}",
                    result.as_str().len()
                );
            }
            Outcome::Failure { reason, .. } => {
                warn!(
                    "record {position} {key}: failed stage={} kind={} reason={reason}",
                    reason.stage(),
                    reason.kind()
                );
            }
        }
        outcome
    }

    fn ingest_and_extract(&self, record: &Record, address: String) -> Outcome {
        debug!("{}: document at {address}", record.key);
        let location = ResolvedLocation::Present(address);
        let address = location.address().unwrap_or_default();

        let text = match self.ingestor.ingest(address) {
            Ok(text) => text,
            Err(reason) => {
                return Outcome::Failure {
                    record: record.clone(),
                    location: Some(location),
                    reason,
                };
            }
        };
        if text.is_empty() {
            debug!("{}: OCR found no text; extracting anyway", record.key);
        } else {
            debug!("{}: OCR text chars={}", record.key, text.as_str().len());
        }

        match self.extractor.extract(&text) {
            Ok(result) => Outcome::Success {
                record: record.clone(),
                location,
                result,
            },
            Err(reason) => Outcome::Failure {
                record: record.clone(),
                location: Some(location),
                reason,
            },
        }
    }
}
