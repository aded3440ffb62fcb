//! Dataset Normalization Layer
//!
//! Turns loader output into a timestamp-ordered `Dataset` with known bounds,
//! optionally extending a single recorded day into a two-day horizon by
//! prepending a copy shifted back 24 hours.

use crate::sim::clock::{Nanos, NANOS_PER_DAY, NANOS_PER_HOUR};
use crate::sim::error::{Result, SimError};
use crate::sim::record::{EntityId, Record};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Synthetic horizon the dataset should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum HorizonHours {
    H24,
    H48,
}

impl HorizonHours {
    #[inline]
    pub fn hours(self) -> u32 {
        match self {
            HorizonHours::H24 => 24,
            HorizonHours::H48 => 48,
        }
    }

    #[inline]
    pub fn as_nanos(self) -> Nanos {
        self.hours() as Nanos * NANOS_PER_HOUR
    }
}

impl Default for HorizonHours {
    fn default() -> Self {
        HorizonHours::H48
    }
}

impl TryFrom<u32> for HorizonHours {
    type Error = SimError;

    fn try_from(hours: u32) -> Result<Self> {
        match hours {
            24 => Ok(HorizonHours::H24),
            48 => Ok(HorizonHours::H48),
            other => Err(SimError::configuration(
                "horizon_hours",
                format!("unsupported horizon {}h (expected 24 or 48)", other),
            )),
        }
    }
}

impl From<HorizonHours> for u32 {
    fn from(h: HorizonHours) -> u32 {
        h.hours()
    }
}

/// Timestamp-ordered, non-empty record sequence with known bounds.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<Record>,
    start: Nanos,
    end: Nanos,
    extended: bool,
}

impl Dataset {
    #[inline]
    pub fn start(&self) -> Nanos {
        self.start
    }

    #[inline]
    pub fn end(&self) -> Nanos {
        self.end
    }

    /// `end - start`; zero for a single-instant dataset.
    #[inline]
    pub fn span(&self) -> Nanos {
        self.end - self.start
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false: normalization rejects empty input.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the horizon extension was applied.
    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Distinct entity IDs in first-seen order.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|r| seen.insert(r.entity_id.as_str()))
            .map(|r| r.entity_id.clone())
            .collect()
    }
}

/// Sort `records` and extend them to `horizon` if needed.
///
/// Sorting is stable: records sharing a timestamp keep their input order, which
/// segmentation relies on. Only `H48` extends; a 24h horizon is the recorded day
/// itself. Extension happens when the intrinsic span is shorter than the horizon.
pub fn normalize(mut records: Vec<Record>, horizon: HorizonHours) -> Result<Dataset> {
    if records.is_empty() {
        return Err(SimError::invalid_input(
            "cannot normalize an empty record set: no time bounds",
        ));
    }

    let input_len = records.len();
    records.sort_by_key(|r| r.timestamp);

    let intrinsic_span = records[records.len() - 1].timestamp - records[0].timestamp;
    let extend = horizon == HorizonHours::H48 && horizon.as_nanos() > intrinsic_span;

    if extend {
        let mut merged = Vec::with_capacity(records.len() * 2);
        merged.extend(records.iter().map(|r| r.shifted(-NANOS_PER_DAY)));
        merged.append(&mut records);
        // A source longer than a day overlaps its shifted copy.
        merged.sort_by_key(|r| r.timestamp);
        records = merged;
    }

    let start = records[0].timestamp;
    let end = records[records.len() - 1].timestamp;

    debug!(
        input = input_len,
        output = records.len(),
        horizon_hours = horizon.hours(),
        extended = extend,
        "Normalized dataset"
    );

    Ok(Dataset {
        records,
        start,
        end,
        extended: extend,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::clock::NANOS_PER_MIN;

    const T0: Nanos = 1_710_028_800 * 1_000_000_000;

    fn day_of_records(n: usize) -> Vec<Record> {
        // n samples spaced evenly over exactly 24h, first and last inclusive.
        let step = NANOS_PER_DAY / (n as i64 - 1);
        (0..n)
            .map(|i| {
                Record::new(format!("cow-{}", i % 3), T0 + i as i64 * step).with("idx", i as f64)
            })
            .collect()
    }

    #[test]
    fn test_empty_input_rejected() {
        for horizon in [HorizonHours::H24, HorizonHours::H48] {
            match normalize(Vec::new(), horizon) {
                Err(SimError::InvalidInput { .. }) => {}
                other => panic!("expected InvalidInput, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_sort_is_stable_for_equal_timestamps() {
        let records = vec![
            Record::new("b", T0 + 10).with("order", 0.0),
            Record::new("a", T0).with("order", 1.0),
            Record::new("c", T0 + 10).with("order", 2.0),
            Record::new("a", T0 + 10).with("order", 3.0),
        ];
        let ds = normalize(records, HorizonHours::H24).unwrap();
        let order: Vec<f64> = ds.records().iter().map(|r| r.number("order").unwrap()).collect();
        assert_eq!(order, vec![1.0, 0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_no_extension_preserves_cardinality_and_order() {
        let mut records = day_of_records(49);
        records.reverse();
        let ds = normalize(records, HorizonHours::H24).unwrap();
        assert_eq!(ds.len(), 49);
        assert!(!ds.is_extended());
        assert!(ds.records().windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(ds.start(), T0);
        assert_eq!(ds.end(), T0 + NANOS_PER_DAY);
    }

    #[test]
    fn test_horizon_doubling() {
        let original = day_of_records(25);
        let n = original.len();
        let ds = normalize(original, HorizonHours::H48).unwrap();

        assert!(ds.is_extended());
        assert_eq!(ds.len(), 2 * n);
        assert!(ds.records().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(ds.end(), T0 + NANOS_PER_DAY);
        assert_eq!(ds.start(), T0 - NANOS_PER_DAY);

        // First N are the shifted copy of the last N.
        for i in 0..n {
            let copy = &ds.records()[i];
            let orig = &ds.records()[i + n];
            assert_eq!(copy.timestamp, orig.timestamp - NANOS_PER_DAY);
            assert_eq!(copy.entity_id, orig.entity_id);
            assert_eq!(copy.fields, orig.fields);
        }
    }

    #[test]
    fn test_no_extension_when_span_covers_horizon() {
        let records = vec![
            Record::new("a", T0),
            Record::new("a", T0 + 48 * NANOS_PER_HOUR + NANOS_PER_MIN),
        ];
        let ds = normalize(records, HorizonHours::H48).unwrap();
        assert_eq!(ds.len(), 2);
        assert!(!ds.is_extended());
    }

    #[test]
    fn test_single_record_bounds() {
        let ds = normalize(vec![Record::new("a", T0)], HorizonHours::H24).unwrap();
        assert_eq!(ds.start(), ds.end());
        assert_eq!(ds.span(), 0);
    }

    #[test]
    fn test_entities_first_seen_order() {
        let ds = normalize(day_of_records(6), HorizonHours::H24).unwrap();
        assert_eq!(ds.entities(), vec!["cow-0", "cow-1", "cow-2"]);
    }

    #[test]
    fn test_horizon_from_hours() {
        assert_eq!(HorizonHours::try_from(24).unwrap(), HorizonHours::H24);
        assert_eq!(HorizonHours::try_from(48).unwrap(), HorizonHours::H48);
        assert!(matches!(
            HorizonHours::try_from(36),
            Err(SimError::Configuration { field: "horizon_hours", .. })
        ));
    }
}
