use acta_audit::{
    config::Config,
    dataset::{Record, RecordKey},
    error::{ServiceFailure, StageError},
    outcome::{Outcome, Stage},
    pipeline::{Pipeline, StopSignal},
    report::Report,
    sampler::sample,
    services::{ExtractedText, Extractor, Ingestor, Locator, ResolvedLocation, StructuredResult},
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct FakeLocator {
    absent: HashSet<RecordKey>,
    malformed: HashSet<RecordKey>,
}

impl Locator for FakeLocator {
    fn locate(&self, key: &RecordKey) -> Result<ResolvedLocation, StageError> {
        if self.absent.contains(key) {
            Ok(ResolvedLocation::Absent)
        } else if self.malformed.contains(key) {
            Err(StageError::MalformedResponse("missing field `casillas`".into()))
        } else {
            Ok(ResolvedLocation::Present(format!("https://docs/{key}.jpg")))
        }
    }
}

#[derive(Default)]
struct FakeIngestor {
    failures: HashMap<String, StageError>,
    blank: HashSet<String>,
    delay: Option<Duration>,
}

impl Ingestor for FakeIngestor {
    fn ingest(&self, address: &str) -> Result<ExtractedText, StageError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(err) = self.failures.get(address) {
            return Err(err.clone());
        }
        if self.blank.contains(address) {
            return Ok(ExtractedText::default());
        }
        Ok(ExtractedText(format!("text of {address}")))
    }
}

#[derive(Default)]
struct FakeExtractor {
    seen: Mutex<Vec<String>>,
    calls: AtomicUsize,
    fail_with: Option<StageError>,
}

impl Extractor for FakeExtractor {
    fn extract(&self, text: &ExtractedText) -> Result<StructuredResult, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(text.as_str().to_string());
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        Ok(StructuredResult(format!("parsed[{}]", text.as_str())))
    }
}

fn dataset(n: i64) -> Vec<Record> {
    (0..n).map(|i| Record::new(1 + i % 32, 1000 + i)).collect()
}

fn address(key: RecordKey) -> String {
    format!("https://docs/{key}.jpg")
}

fn cfg_with_workers(workers: usize) -> Config {
    let mut cfg = Config::default();
    cfg.global.max_parallel_records = workers;
    cfg
}

fn scenario(workers: usize) {
    let records = dataset(1000);
    let sample = sample(&records, 400, 1).unwrap();
    let keys: Vec<RecordKey> = sample.keys().collect();

    let locator = FakeLocator {
        absent: [3, 50, 100, 150, 399].iter().map(|&i| keys[i]).collect(),
        ..Default::default()
    };
    let mut ingestor = FakeIngestor::default();
    for i in [10, 20, 30] {
        ingestor.failures.insert(
            address(keys[i]),
            StageError::FetchError(ServiceFailure::new(Some(500), "Internal Server Error")),
        );
    }
    for i in [40, 41] {
        ingestor.failures.insert(
            address(keys[i]),
            StageError::OcrServiceError(ServiceFailure::new(None, "timed out")),
        );
    }

    let pipeline = Pipeline::new(&cfg_with_workers(workers), locator, ingestor, FakeExtractor::default());
    let out = pipeline.run(&sample, &StopSignal::new());
    assert_eq!(out.pending, 0);
    assert!(!out.stopped_early);

    let report = Report::aggregate(out.outcomes, out.pending);
    assert_eq!(report.outcomes.len(), 400);
    assert_eq!(report.successes(), 390);
    assert_eq!(report.failures(), 10);

    let by_stage = report.failures_by_stage();
    assert_eq!(by_stage.get(&Stage::Locate), Some(&5));
    assert_eq!(by_stage.get(&Stage::Fetch), Some(&3));
    assert_eq!(by_stage.get(&Stage::Ocr), Some(&2));
    assert_eq!(by_stage.get(&Stage::Extract), None);
    assert_eq!(report.failures_by_kind().get("not_published"), Some(&5));

    for (i, outcome) in report.outcomes.iter().enumerate() {
        assert_eq!(outcome.record().key, keys[i], "row {i} out of sample order");
        if let Outcome::Success { result, location, .. } = outcome {
            assert!(!result.as_str().is_empty());
            assert_eq!(location, &ResolvedLocation::Present(address(keys[i])));
        }
    }

    let rows = report.rows();
    assert_eq!(rows.len(), 400);
    assert_eq!(rows[3].stage, Some(Stage::Locate));
    assert_eq!(rows[10].stage, Some(Stage::Fetch));
    assert_eq!(rows[41].stage, Some(Stage::Ocr));
}

#[test]
fn sequential_run_matches_reference_scenario() {
    scenario(1);
}

#[test]
fn concurrent_run_keeps_sample_order() {
    scenario(8);
}

#[test]
fn blank_scan_still_reaches_extractor() {
    let records = dataset(3);
    let sample = sample(&records, 3, 1).unwrap();
    let keys: Vec<_> = sample.keys().collect();

    let mut ingestor = FakeIngestor::default();
    ingestor.blank.insert(address(keys[1]));
    let extractor = FakeExtractor::default();

    let pipeline = Pipeline::new(&Config::default(), FakeLocator::default(), ingestor, extractor);
    let out = pipeline.run(&sample, &StopSignal::new());

    assert_eq!(out.outcomes.len(), 3);
    assert!(out.outcomes.iter().all(Outcome::is_success));
    match &out.outcomes[1] {
        Outcome::Success { result, .. } => assert_eq!(result.as_str(), "parsed[]"),
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn malformed_listing_fails_at_locate_without_further_calls() {
    let records = dataset(2);
    let sample = sample(&records, 2, 1).unwrap();
    let keys: Vec<_> = sample.keys().collect();
    let locator = FakeLocator {
        malformed: [keys[0]].into_iter().collect(),
        ..Default::default()
    };

    let pipeline = Pipeline::new(&Config::default(), locator, FakeIngestor::default(), FakeExtractor::default());
    let first = pipeline.audit_record(0, &sample.records()[0]);
    match first {
        Outcome::Failure { location, reason, .. } => {
            assert_eq!(location, None);
            assert!(matches!(reason, StageError::MalformedResponse(_)));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn extractor_failure_is_recorded_at_extract_stage() {
    let records = dataset(4);
    let sample = sample(&records, 4, 9).unwrap();
    let extractor = FakeExtractor {
        fail_with: Some(StageError::ExtractionServiceError(ServiceFailure::new(
            Some(429),
            "rate limited",
        ))),
        ..Default::default()
    };

    let pipeline = Pipeline::new(&Config::default(), FakeLocator::default(), FakeIngestor::default(), extractor);
    let out = pipeline.run(&sample, &StopSignal::new());
    assert_eq!(out.outcomes.len(), 4);
    for o in &out.outcomes {
        assert_eq!(o.stage(), Some(Stage::Extract));
        match o {
            Outcome::Failure { location, .. } => assert!(matches!(location, Some(ResolvedLocation::Present(_)))),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}

#[test]
fn raised_stop_signal_starts_nothing() {
    let records = dataset(10);
    let sample = sample(&records, 10, 1).unwrap();
    let stop = StopSignal::new();
    stop.request();

    let pipeline = Pipeline::new(&Config::default(), FakeLocator::default(), FakeIngestor::default(), FakeExtractor::default());
    let out = pipeline.run(&sample, &stop);
    assert!(out.outcomes.is_empty());
    assert_eq!(out.pending, 10);
    assert!(out.stopped_early);
}

#[test]
fn expired_deadline_yields_ordered_partial_report() {
    let records = dataset(50);
    let sample = sample(&records, 50, 3).unwrap();
    let keys: Vec<_> = sample.keys().collect();
    let ingestor = FakeIngestor {
        delay: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let stop = StopSignal::with_deadline(Duration::from_millis(100));

    let pipeline = Pipeline::new(&cfg_with_workers(2), FakeLocator::default(), ingestor, FakeExtractor::default());
    let out = pipeline.run(&sample, &stop);

    assert!(out.stopped_early);
    assert!(!out.outcomes.is_empty());
    assert_eq!(out.outcomes.len() + out.pending, 50);
    for (i, o) in out.outcomes.iter().enumerate() {
        assert_eq!(o.record().key, keys[i]);
    }
}

#[test]
fn rejected_credentials_stop_intake() {
    let records = dataset(20);
    let sample = sample(&records, 20, 5).unwrap();
    let extractor = FakeExtractor {
        fail_with: Some(StageError::ExtractionServiceError(ServiceFailure::new(
            Some(401),
            "invalid api key",
        ))),
        ..Default::default()
    };

    let pipeline = Pipeline::new(&Config::default(), FakeLocator::default(), FakeIngestor::default(), extractor);
    let out = pipeline.run(&sample, &StopSignal::new());
    assert_eq!(out.outcomes.len(), 1);
    assert_eq!(out.pending, 19);
    assert!(out.outcomes[0].reason().unwrap().credentials_rejected());
}
