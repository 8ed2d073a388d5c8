use tracing::info;

use crate::core::types::{MusterRollReference, Provenance, RecordSet};

/// Running collection of every record pulled during one run.
#[derive(Debug, Clone)]
pub struct RecordAggregator {
    work_identifier: String,
    records: RecordSet,
    per_roll: Vec<(String, usize)>,
}

impl RecordAggregator {
    pub fn new(work_identifier: impl Into<String>) -> Self {
        Self {
            work_identifier: work_identifier.into(),
            records: RecordSet::new(),
            per_roll: Vec::new(),
        }
    }

    /// Append the records of one muster roll, stamping both provenance
    /// columns so every stored record names the run and the roll.
    pub fn absorb(&mut self, reference: &MusterRollReference, records: RecordSet) {
        let provenance = Provenance::new(self.work_identifier.clone(), reference.label.clone());
        let count = records.len();
        self.records.extend(records.into_iter().map(|mut r| {
            provenance.stamp(&mut r);
            r
        }));
        self.per_roll.push((reference.label.clone(), count));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record count per muster roll, in processing order.
    pub fn counts(&self) -> &[(String, usize)] {
        &self.per_roll
    }

    pub fn finish(self) -> RecordSet {
        info!(
            "📦 {} record(s) from {} muster roll(s) for {}",
            self.records.len(),
            self.per_roll.len(),
            self.work_identifier
        );
        self.records
    }
}
