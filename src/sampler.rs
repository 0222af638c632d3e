use crate::dataset::{Record, RecordKey};
use crate::error::AuditError;
use rand::seq::index;
use serde::Serialize;
use std::collections::HashSet;

/// SplitMix64. Kept in-tree so a given seed yields the same sample regardless
/// of which `rand` release is linked.
#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64_internal(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }
}

impl rand::RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64_internal() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next_u64_internal()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64_internal().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Ordered, duplicate-free subset of the record source.
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    records: Vec<Record>,
    #[serde(skip)]
    members: HashSet<RecordKey>,
}

impl Sample {
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.members.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = RecordKey> + '_ {
        self.records.iter().map(|r| r.key)
    }
}

/// Draws `min(n, |dataset|)` distinct records; identical inputs give an identical sample, order included.
///
/// Records repeating an identity already drawn are skipped, so callers may pass
/// raw rows. `n` larger than the dataset returns every distinct record.
pub fn sample(dataset: &[Record], n: usize, seed: u64) -> Result<Sample, AuditError> {
    if dataset.is_empty() && n > 0 {
        return Err(AuditError::InvalidArgument(format!(
            "cannot draw {n} records from an empty dataset"
        )));
    }

    let mut members = HashSet::with_capacity(dataset.len().min(n));
    let distinct: Vec<&Record> = dataset
        .iter()
        .filter(|r| members.insert(r.key))
        .collect();
    members.clear();

    let amount = n.min(distinct.len());
    let mut rng = DeterministicRng::new(seed);
    let picked = index::sample(&mut rng, distinct.len(), amount);

    let mut records = Vec::with_capacity(amount);
    for i in picked.iter() {
        let record = distinct[i];
        members.insert(record.key);
        records.push(record.clone());
    }

    Ok(Sample { records, members })
}
