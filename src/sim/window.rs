//! Window Slicer
//!
//! Computes the prefix of the dataset visible at a virtual time. In LIVE mode the
//! most recent visible record is swapped for a jittered copy so the view looks like
//! a sensor feed rather than a static table.
//!
//! # Noise Semantics
//!
//! Each field listed in the `NoiseProfile` receives an independent uniform draw in
//! `[-bound, +bound]`, then is clamped to its own valid range. Mutually exclusive
//! membership fractions are clamped one by one and never renormalized, so their sum
//! may drift slightly away from 1.

use crate::sim::clock::Nanos;
use crate::sim::config::SimMode;
use crate::sim::dataset::Dataset;
use crate::sim::error::{Result, SimError};
use crate::sim::record::{FieldValue, Record};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Jitter bound and valid range for one numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldNoise {
    /// Maximum absolute perturbation.
    pub bound: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl FieldNoise {
    pub fn unbounded(bound: f64) -> Self {
        Self {
            bound,
            min: None,
            max: None,
        }
    }

    /// Membership fraction kept inside `[0, 1]`.
    pub fn fraction(bound: f64) -> Self {
        Self {
            bound,
            min: Some(0.0),
            max: Some(1.0),
        }
    }

    pub fn non_negative(bound: f64) -> Self {
        Self {
            bound,
            min: Some(0.0),
            max: None,
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, value: f64, rng: &mut R) -> f64 {
        let mut v = value + rng.gen_range(-self.bound..=self.bound);
        if let Some(min) = self.min {
            v = v.max(min);
        }
        if let Some(max) = self.max {
            v = v.min(max);
        }
        v
    }
}

/// Per-field noise bounds for live-sensor quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseProfile {
    pub fields: BTreeMap<String, FieldNoise>,
}

impl Default for NoiseProfile {
    fn default() -> Self {
        let mut fields = BTreeMap::new();
        // Behavior memberships: half a percentage point.
        for name in ["lying", "standing", "feeding", "ruminating", "walking"] {
            fields.insert(name.to_string(), FieldNoise::fraction(0.005));
        }
        fields.insert("temperature".into(), FieldNoise::unbounded(0.1));
        fields.insert("activity".into(), FieldNoise::non_negative(2.0));
        // Positions in meters.
        fields.insert("pos_x".into(), FieldNoise::unbounded(3.0));
        fields.insert("pos_y".into(), FieldNoise::unbounded(3.0));
        fields.insert("thi".into(), FieldNoise::unbounded(0.3));
        Self { fields }
    }
}

impl NoiseProfile {
    pub fn none() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, noise: FieldNoise) -> Self {
        self.fields.insert(name.into(), noise);
        self
    }

    pub fn validate(&self) -> Result<()> {
        for (name, noise) in &self.fields {
            if !noise.bound.is_finite() || noise.bound < 0.0 {
                return Err(SimError::configuration(
                    "noise",
                    format!("field {} has invalid bound {}", name, noise.bound),
                ));
            }
            if let (Some(min), Some(max)) = (noise.min, noise.max) {
                if min > max {
                    return Err(SimError::configuration(
                        "noise",
                        format!("field {} has min {} > max {}", name, min, max),
                    ));
                }
            }
        }
        Ok(())
    }

    /// New record with every profiled numeric field jittered.
    /// Categorical and unprofiled fields are copied as-is.
    pub fn perturb<R: Rng + ?Sized>(&self, record: &Record, rng: &mut R) -> Record {
        let mut out = record.clone();
        for (name, value) in out.fields.iter_mut() {
            if let Some(noise) = self.fields.get(name) {
                if let FieldValue::Number(v) = value {
                    *v = noise.apply(*v, rng);
                }
            }
        }
        out
    }
}

/// Records visible at a virtual time, in dataset order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Window {
    records: Vec<Record>,
    /// True when the last record is a jittered copy.
    perturbed: bool,
}

impl Window {
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_perturbed(&self) -> bool {
        self.perturbed
    }

    pub fn latest(&self) -> Option<&Record> {
        self.records.last()
    }

    /// 0 for the most recent record, increasing towards the oldest.
    pub fn recency_rank(&self, index: usize) -> Option<usize> {
        (index < self.records.len()).then(|| self.records.len() - 1 - index)
    }

    /// Most recent record of each entity.
    pub fn latest_per_entity(&self) -> BTreeMap<&str, &Record> {
        let mut latest = BTreeMap::new();
        for r in &self.records {
            latest.insert(r.entity_id.as_str(), r);
        }
        latest
    }
}

/// Number of leading dataset records with `timestamp <= now`.
#[inline]
pub fn visible_len(dataset: &Dataset, now: Nanos) -> usize {
    dataset.records().partition_point(|r| r.timestamp <= now)
}

/// Slices windows and owns the jitter RNG.
pub struct WindowSlicer {
    noise: NoiseProfile,
    live_noise: bool,
    rng: ChaCha8Rng,
}

impl WindowSlicer {
    /// `seed` makes LIVE jitter reproducible; `None` seeds from entropy.
    pub fn new(noise: NoiseProfile, live_noise: bool, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            noise,
            live_noise,
            rng,
        }
    }

    pub fn slice(&mut self, dataset: &Dataset, now: Nanos, mode: SimMode) -> Window {
        let mut records = dataset.records()[..visible_len(dataset, now)].to_vec();
        let mut perturbed = false;

        if mode == SimMode::Live && self.live_noise {
            if let Some(last) = records.last_mut() {
                *last = self.noise.perturb(last, &mut self.rng);
                perturbed = true;
            }
        }

        Window { records, perturbed }
    }
}
