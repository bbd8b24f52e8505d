use crate::core::utils::average::Average;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Write};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AcceptanceRecord {
    pub trials: u64,
    pub accepted: u64,
    /// Mean-squared displacement over all trials, rejected ones counting as zero.
    pub msd: Average,
}

impl AcceptanceRecord {
    pub fn ratio(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.accepted as f64 / self.trials as f64
        }
    }
}

/// Running acceptance and mean-squared displacement, per key. Purely additive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptanceTracker<K: Ord> {
    records: BTreeMap<K, AcceptanceRecord>,
}

impl<K: Ord> Default for AcceptanceTracker<K> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone + Display> AcceptanceTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, key: &K, msd: f64) {
        let record = self.record(key);
        record.trials += 1;
        record.accepted += 1;
        record.msd.push(msd);
    }

    pub fn reject(&mut self, key: &K) {
        let record = self.record(key);
        record.trials += 1;
        record.msd.push(0.0);
    }

    pub fn get(&self, key: &K) -> Option<&AcceptanceRecord> {
        self.records.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &AcceptanceRecord)> {
        self.records.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All keys merged into one record.
    pub fn total(&self) -> AcceptanceRecord {
        self.records.values().fold(AcceptanceRecord::default(), |mut sum, r| {
            sum.trials += r.trials;
            sum.accepted += r.accepted;
            sum.msd.merge(&r.msd);
            sum
        })
    }

    /// Records keyed by their display string, for reporting.
    pub fn named(&self) -> BTreeMap<String, AcceptanceRecord> {
        self.records.iter().map(|(k, r)| (k.to_string(), *r)).collect()
    }

    /// Aligned text table, one line per key.
    pub fn info(&self) -> String {
        let mut out = String::new();
        if self.records.is_empty() {
            return out;
        }
        let _ = writeln!(
            out,
            "  {:<16}{:>12}{:>12}{:>14}",
            "key", "trials", "acc. %", "msd"
        );
        for (key, r) in &self.records {
            let _ = writeln!(
                out,
                "  {:<16}{:>12}{:>12.2}{:>14.4e}",
                key.to_string(),
                r.trials,
                100.0 * r.ratio(),
                r.msd.mean()
            );
        }
        out
    }

    fn record(&mut self, key: &K) -> &mut AcceptanceRecord {
        self.records.entry(key.clone()).or_default()
    }
}
