use crate::{config::Config, error::AuditError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Identity of a polling station: (jurisdiction, section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub entity: i64,
    pub section: i64,
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.entity, self.section)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: RecordKey,
    /// Remaining columns of the source row, opaque to the pipeline.
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(entity: i64, section: i64) -> Self {
        Self {
            key: RecordKey { entity, section },
            fields: BTreeMap::new(),
        }
    }
}

/// A header + rows table kept as plain strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn preview(&self, n: usize) -> Vec<BTreeMap<String, String>> {
        self.rows
            .iter()
            .take(n)
            .map(|row| {
                self.headers
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// Reference table of contests and candidates; read-only, never consulted by the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateRoster {
    pub table: Table,
}

impl CandidateRoster {
    pub fn load(cfg: &Config, path: &Path) -> Result<Self, AuditError> {
        let table = read_table(path, cfg.dataset.delimiter)?;
        info!(
            "roster loaded rows={} columns={}",
            table.rows.len(),
            table.headers.len()
        );
        Ok(Self { table })
    }

    pub fn len(&self) -> usize {
        self.table.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.rows.is_empty()
    }
}

pub fn read_table(path: &Path, delimiter: char) -> Result<Table, AuditError> {
    let delimiter = u8::try_from(delimiter).map_err(|_| dataset_err(path, "delimiter must be ASCII"))?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| dataset_err(path, e))?;

    let headers = rdr
        .byte_headers()
        .map_err(|e| dataset_err(path, e))?
        .iter()
        .map(lossy)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for rec in rdr.byte_records() {
        let rec = rec.map_err(|e| dataset_err(path, e))?;
        rows.push(rec.iter().map(lossy).collect());
    }

    Ok(Table { headers, rows })
}

/// Loads the record source, coercing the identity columns to integers.
///
/// Rows repeating an already-seen (entity, section) pair are dropped so that
/// every record is a distinct polling-station identity.
pub fn load_records(cfg: &Config, path: &Path) -> Result<Vec<Record>, AuditError> {
    let table = read_table(path, cfg.dataset.delimiter)?;
    let records = records_from_table(cfg, &table)
        .map_err(|details| AuditError::Dataset {
            path: path.display().to_string(),
            details,
        })?;
    info!(
        "dataset loaded rows={} distinct_records={}",
        table.rows.len(),
        records.len()
    );
    Ok(records)
}

pub fn records_from_table(cfg: &Config, table: &Table) -> Result<Vec<Record>, String> {
    let col = |name: &str| {
        table
            .headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| format!("missing column {name}"))
    };
    let entity_idx = col(&cfg.dataset.entity_column)?;
    let section_idx = col(&cfg.dataset.section_column)?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (i, row) in table.rows.iter().enumerate() {
        // +2: one for the header, one for 1-based line numbers.
        let line = i + 2;
        let cell = |idx: usize, name: &str| -> Result<i64, String> {
            let raw = row.get(idx).map(String::as_str).unwrap_or("");
            coerce_int(raw).ok_or_else(|| format!("line {line}: {name}={raw:?} is not an integer"))
        };
        let key = RecordKey {
            entity: cell(entity_idx, &cfg.dataset.entity_column)?,
            section: cell(section_idx, &cfg.dataset.section_column)?,
        };
        if !seen.insert(key) {
            continue;
        }

        let fields = table
            .headers
            .iter()
            .zip(row.iter())
            .enumerate()
            .filter(|(idx, _)| *idx != entity_idx && *idx != section_idx)
            .map(|(_, (h, v))| (h.clone(), v.clone()))
            .collect();
        out.push(Record { key, fields });
    }

    let dropped = table.rows.len() - out.len();
    if dropped > 0 {
        debug!("collapsed {dropped} rows sharing an (entity, section) pair");
    }
    Ok(out)
}

/// Accepts "12", " 12 " and integral floats such as "12.0".
pub fn coerce_int(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn dataset_err(path: &Path, details: impl fmt::Display) -> AuditError {
    AuditError::Dataset {
        path: path.display().to_string(),
        details: details.to_string(),
    }
}
