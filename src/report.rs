use crate::{
    outcome::{Outcome, Stage},
    services::ResolvedLocation,
};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Written to the `address` column when the locator found no published document.
pub const ABSENT_MARKER: &str = "absent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Success,
    Failure,
}

/// One line of the persisted report. Success and failure rows share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub position: usize,
    pub entity: i64,
    pub section: i64,
    pub status: RowStatus,
    pub stage: Option<Stage>,
    pub reason_kind: Option<String>,
    /// URL, `ABSENT_MARKER`, or empty when the locator never answered.
    pub address: String,
    /// Structured result for successes, failure message otherwise.
    pub result: String,
}

impl ReportRow {
    pub fn from_outcome(position: usize, outcome: &Outcome) -> Self {
        let key = outcome.record().key;
        match outcome {
            Outcome::Success {
                location, result, ..
            } => Self {
                position,
                entity: key.entity,
                section: key.section,
                status: RowStatus::Success,
                stage: None,
                reason_kind: None,
                address: address_cell(Some(location)),
                result: result.as_str().to_string(),
            },
            Outcome::Failure {
                location, reason, ..
            } => Self {
                position,
                entity: key.entity,
                section: key.section,
                status: RowStatus::Failure,
                stage: Some(reason.stage()),
                reason_kind: Some(reason.kind().to_string()),
                address: address_cell(location.as_ref()),
                result: reason.to_string(),
            },
        }
    }

    /// Parses the `address` cell back into what the locator reported.
    pub fn location(&self) -> Option<ResolvedLocation> {
        match self.address.as_str() {
            "" => None,
            ABSENT_MARKER => Some(ResolvedLocation::Absent),
            url => Some(ResolvedLocation::Present(url.to_string())),
        }
    }
}

fn address_cell(location: Option<&ResolvedLocation>) -> String {
    match location {
        None => String::new(),
        Some(ResolvedLocation::Absent) => ABSENT_MARKER.to_string(),
        Some(ResolvedLocation::Present(url)) => url.clone(),
    }
}

/// Ordered outcomes of one run.
#[derive(Debug, Clone)]
pub struct Report {
    pub outcomes: Vec<Outcome>,
    pub pending: usize,
}

impl Report {
    /// Keeps the given (sample) order.
    pub fn aggregate(outcomes: Vec<Outcome>, pending: usize) -> Self {
        Self { outcomes, pending }
    }

    pub fn rows(&self) -> Vec<ReportRow> {
        self.outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| ReportRow::from_outcome(i, o))
            .collect()
    }

    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.len() - self.successes()
    }

    pub fn failures_by_stage(&self) -> BTreeMap<Stage, usize> {
        let mut out = BTreeMap::new();
        for stage in self.outcomes.iter().filter_map(Outcome::stage) {
            *out.entry(stage).or_insert(0) += 1;
        }
        out
    }

    pub fn failures_by_kind(&self) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for reason in self.outcomes.iter().filter_map(Outcome::reason) {
            *out.entry(reason.kind().to_string()).or_insert(0) += 1;
        }
        out
    }

    /// Writes the CSV next to its destination and renames it into place, replacing
    /// any earlier report there.
    pub fn persist(&self, dest: &Path) -> Result<()> {
        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        crate::util::ensure_dir(dir)?;
        let file_name = dest
            .file_name()
            .ok_or_else(|| anyhow!("report path has no file name: {}", dest.display()))?;
        let tmp = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));

        {
            let mut wtr = csv::Writer::from_path(&tmp)
                .with_context(|| format!("create report: {}", tmp.display()))?;
            for row in self.rows() {
                wtr.serialize(&row)?;
            }
            wtr.flush()?;
        }
        std::fs::rename(&tmp, dest)
            .with_context(|| format!("move report into place: {}", dest.display()))?;
        Ok(())
    }
}

pub fn load_rows(path: &Path) -> Result<Vec<ReportRow>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("open report: {}", path.display()))?;
    let mut rows = Vec::new();
    for row in rdr.deserialize::<ReportRow>() {
        rows.push(row.with_context(|| format!("parse report: {}", path.display()))?);
    }
    Ok(rows)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub job_name: String,
    pub started: String,
    pub finished: String,
    pub sample_size: usize,
    pub seed: u64,
    pub attempted: usize,
    pub successes: usize,
    pub failures: usize,
    pub failures_by_stage: BTreeMap<Stage, usize>,
    pub failures_by_kind: BTreeMap<String, usize>,
    pub pending: usize,
    pub stopped_early: bool,
    pub roster_rows: Option<usize>,
    pub report: String,
}
