use acta_audit::{
    dataset::Record,
    error::{ServiceFailure, StageError},
    outcome::{Outcome, Stage},
    report::{ABSENT_MARKER, Report, RowStatus, load_rows},
    services::{ResolvedLocation, StructuredResult},
};
use tempfile::TempDir;

fn outcomes() -> Vec<Outcome> {
    vec![
        Outcome::Success {
            record: Record::new(9, 1234),
            location: ResolvedLocation::Present("https://docs/9_1234.jpg".into()),
            result: StructuredResult("PAN: 120\nMORENA, \"PT\": 340".into()),
        },
        Outcome::Failure {
            record: Record::new(1, 7),
            location: Some(ResolvedLocation::Absent),
            reason: StageError::NotPublished,
        },
        Outcome::Failure {
            record: Record::new(2, 8),
            location: None,
            reason: StageError::LocatorUnavailable(ServiceFailure::new(None, "connection refused")),
        },
        Outcome::Failure {
            record: Record::new(3, 9),
            location: Some(ResolvedLocation::Present("https://docs/3_9.jpg".into())),
            reason: StageError::FetchError(ServiceFailure::new(Some(500), "Internal Server Error")),
        },
        Outcome::Success {
            record: Record::new(4, 10),
            location: ResolvedLocation::Present("https://docs/4_10.jpg".into()),
            result: StructuredResult(String::new()),
        },
    ]
}

#[test]
fn persisted_report_reloads_without_loss() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("audit_report.csv");
    let report = Report::aggregate(outcomes(), 0);
    report.persist(&path).unwrap();

    let loaded = load_rows(&path).unwrap();
    assert_eq!(loaded, report.rows());

    assert_eq!(loaded[0].status, RowStatus::Success);
    assert_eq!(loaded[0].result, "PAN: 120\nMORENA, \"PT\": 340");
    assert_eq!(loaded[1].address, ABSENT_MARKER);
    assert_eq!(loaded[1].location(), Some(ResolvedLocation::Absent));
    assert_eq!(loaded[1].reason_kind.as_deref(), Some("not_published"));
    assert_eq!(loaded[2].location(), None);
    assert_eq!(loaded[2].stage, Some(Stage::Locate));
    assert_eq!(loaded[3].stage, Some(Stage::Fetch));
    assert!(loaded[3].result.contains("500"));
    assert_eq!(loaded[4].result, "");
    let positions: Vec<_> = loaded.iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![0, 1, 2, 3, 4]);
}

#[test]
fn persisting_overwrites_previous_report() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit_report.csv");
    Report::aggregate(outcomes(), 0).persist(&path).unwrap();
    Report::aggregate(outcomes()[..1].to_vec(), 0)
        .persist(&path)
        .unwrap();

    assert_eq!(load_rows(&path).unwrap().len(), 1);
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn summary_counts_by_stage_and_kind() {
    let report = Report::aggregate(outcomes(), 3);
    assert_eq!(report.successes(), 2);
    assert_eq!(report.failures(), 3);
    assert_eq!(report.failures_by_stage().get(&Stage::Locate), Some(&2));
    assert_eq!(report.failures_by_kind().get("fetch_error"), Some(&1));
    assert_eq!(report.pending, 3);
}
