//! Run-Length State Segmentation
//!
//! Compresses a dense per-sample categorical stream into maximal same-state
//! intervals per entity, the shape timeline renderers consume.
//!
//! Design: sort once by `(entity_id, timestamp)`, then a single pass holding one
//! open interval. O(n log n) sort, O(n) scan.

use crate::sim::clock::Nanos;
use crate::sim::record::{EntityId, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One record reduced to a discrete state label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSample<S> {
    pub entity_id: EntityId,
    pub timestamp: Nanos,
    pub state: S,
}

impl<S> StateSample<S> {
    pub fn new(entity_id: impl Into<EntityId>, timestamp: Nanos, state: S) -> Self {
        Self {
            entity_id: entity_id.into(),
            timestamp,
            state,
        }
    }
}

/// Maximal contiguous run of one state for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval<S> {
    pub entity_id: EntityId,
    pub state: S,
    pub start: Nanos,
    pub end: Nanos,
    /// Samples covered by this run.
    pub samples: usize,
}

impl<S> Interval<S> {
    #[inline]
    pub fn duration(&self) -> Nanos {
        self.end - self.start
    }
}

/// Run-length segment `samples` into per-entity intervals.
///
/// Output is grouped by entity (ascending ID) and time-ordered within an entity.
/// Adjacent intervals of one entity never share a state and every sample lands
/// in exactly one interval.
pub fn segment<S: PartialEq>(mut samples: Vec<StateSample<S>>) -> Vec<Interval<S>> {
    samples.sort_by(|a, b| {
        a.entity_id
            .cmp(&b.entity_id)
            .then(a.timestamp.cmp(&b.timestamp))
    });

    let mut out = Vec::new();
    let mut open: Option<Interval<S>> = None;

    for sample in samples {
        if let Some(cur) = open.as_mut() {
            if cur.entity_id == sample.entity_id && cur.state == sample.state {
                cur.end = sample.timestamp;
                cur.samples += 1;
                continue;
            }
        }
        let next = Interval {
            entity_id: sample.entity_id,
            state: sample.state,
            start: sample.timestamp,
            end: sample.timestamp,
            samples: 1,
        };
        if let Some(done) = open.replace(next) {
            out.push(done);
        }
    }

    if let Some(done) = open {
        out.push(done);
    }
    out
}

/// Intervals keyed by entity, order within each entity preserved.
pub fn group_by_entity<S>(intervals: Vec<Interval<S>>) -> BTreeMap<EntityId, Vec<Interval<S>>> {
    let mut grouped: BTreeMap<EntityId, Vec<Interval<S>>> = BTreeMap::new();
    for interval in intervals {
        grouped
            .entry(interval.entity_id.clone())
            .or_default()
            .push(interval);
    }
    grouped
}

/// Reduces a record to a state label.
pub trait StateExtractor {
    type State: Clone + PartialEq;

    /// `None` drops the record from the timeline.
    fn extract(&self, record: &Record) -> Option<Self::State>;
}

/// State read from a categorical field.
#[derive(Debug, Clone)]
pub struct CategoryField(pub String);

impl StateExtractor for CategoryField {
    type State = String;

    fn extract(&self, record: &Record) -> Option<String> {
        record.category(&self.0).map(str::to_string)
    }
}

/// State = name of the largest membership fraction among `fields`.
/// Ties go to the field listed first.
#[derive(Debug, Clone)]
pub struct DominantFraction(pub Vec<String>);

impl StateExtractor for DominantFraction {
    type State = String;

    fn extract(&self, record: &Record) -> Option<String> {
        let mut best: Option<(&str, f64)> = None;
        for name in &self.0 {
            let Some(v) = record.number(name) else {
                continue;
            };
            if best.map_or(true, |(_, b)| v > b) {
                best = Some((name.as_str(), v));
            }
        }
        best.map(|(name, _)| name.to_string())
    }
}

pub fn samples_from_records<E: StateExtractor>(
    records: &[Record],
    extractor: &E,
) -> Vec<StateSample<E::State>> {
    records
        .iter()
        .filter_map(|r| {
            extractor
                .extract(r)
                .map(|state| StateSample::new(r.entity_id.clone(), r.timestamp, state))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(entity: &str, state: u8, start: Nanos, end: Nanos, samples: usize) -> Interval<u8> {
        Interval {
            entity_id: entity.into(),
            state,
            start,
            end,
            samples,
        }
    }

    #[test]
    fn test_reference_example() {
        let states = [0u8, 0, 1, 1, 1, 0];
        let samples = states
            .iter()
            .enumerate()
            .map(|(i, &s)| StateSample::new("A", i as Nanos * 10, s))
            .collect();

        let out = segment(samples);
        assert_eq!(
            out,
            vec![iv("A", 0, 0, 10, 2), iv("A", 1, 20, 40, 3), iv("A", 0, 50, 50, 1)]
        );
        let durations: Vec<Nanos> = out.iter().map(Interval::duration).collect();
        assert_eq!(durations, vec![10, 20, 0]);
    }

    #[test]
    fn test_empty_input() {
        assert!(segment::<u8>(Vec::new()).is_empty());
    }

    #[test]
    fn test_unordered_multi_entity_input() {
        let samples = vec![
            StateSample::new("B", 20, 1u8),
            StateSample::new("A", 10, 0),
            StateSample::new("B", 0, 1),
            StateSample::new("A", 0, 0),
            StateSample::new("B", 10, 2),
            StateSample::new("A", 20, 0),
        ];
        let out = segment(samples);
        assert_eq!(
            out,
            vec![
                iv("A", 0, 0, 20, 3),
                iv("B", 1, 0, 0, 1),
                iv("B", 2, 10, 10, 1),
                iv("B", 1, 20, 20, 1),
            ]
        );
    }

    #[test]
    fn test_same_state_across_entities_is_split() {
        let samples = vec![StateSample::new("A", 0, 5u8), StateSample::new("B", 1, 5)];
        assert_eq!(segment(samples).len(), 2);
    }

    #[test]
    fn test_round_trip_covers_every_sample() {
        // Deterministic pseudo-random stream over three entities.
        let mut x: u64 = 0x2545F4914F6CDD1D;
        let mut samples = Vec::new();
        for t in 0..300i64 {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            let entity = ["e1", "e2", "e3"][(x % 3) as usize];
            samples.push(StateSample::new(entity, t, ((x >> 8) % 3) as u8));
        }

        let out = segment(samples.clone());

        let total: usize = out.iter().map(|i| i.samples).sum();
        assert_eq!(total, samples.len());

        for (entity, runs) in group_by_entity(out) {
            let mut expected: Vec<_> = samples.iter().filter(|s| s.entity_id == entity).collect();
            expected.sort_by_key(|s| s.timestamp);

            let mut cursor = 0;
            for run in &runs {
                let covered = &expected[cursor..cursor + run.samples];
                assert!(covered.iter().all(|s| s.state == run.state));
                assert_eq!(covered.first().unwrap().timestamp, run.start);
                assert_eq!(covered.last().unwrap().timestamp, run.end);
                cursor += run.samples;
            }
            assert_eq!(cursor, expected.len());
            assert!(runs.windows(2).all(|w| w[0].state != w[1].state));
            assert!(runs.windows(2).all(|w| w[0].end < w[1].start));
        }
    }

    #[test]
    fn test_extractors() {
        let r = Record::new("cow-1", 100)
            .with("lying", 0.2)
            .with("standing", 0.7)
            .with("feeding", 0.7)
            .with("posture", "standing");

        let dominant = DominantFraction(vec!["lying".into(), "standing".into(), "feeding".into()]);
        assert_eq!(dominant.extract(&r), Some("standing".to_string()));
        assert_eq!(CategoryField("posture".into()).extract(&r), Some("standing".to_string()));
        assert_eq!(CategoryField("missing".into()).extract(&r), None);
        assert_eq!(DominantFraction(vec!["none".into()]).extract(&r), None);
    }

    #[test]
    fn test_samples_from_records_skips_unlabelled() {
        let records = vec![
            Record::new("a", 0).with("posture", "lying"),
            Record::new("a", 10),
            Record::new("a", 20).with("posture", "lying"),
        ];
        let samples = samples_from_records(&records, &CategoryField("posture".into()));
        assert_eq!(samples.len(), 2);
        let out = segment(samples);
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].start, out[0].end, out[0].samples), (0, 20, 2));
    }
}
