//! Candidate search space.
//!
//! Pairs are the cross product of resolutions and bitrates (resolutions outer,
//! bitrates inner, both in caller order), repeated for every assignment of the
//! pipeline variables. A pair survives when the filter accepts it and, for a
//! resolution carrying a `BitrateRange`, the bitrate lies inside the range.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use autoabr_core::hash::{hash_serde, Hash256};
use autoabr_core::{CandidatePair, Resolution, ResolutionTarget, Variables};
use serde::Serialize;

/// Engineering-chosen steps from 150 kbit/s to 9000 kbit/s.
pub const DEFAULT_BITRATES: [u64; 32] = [
    150_000, 300_000, 400_000, 500_000, 600_000, 700_000, 800_000, 900_000, 1_000_000, 1_200_000,
    1_400_000, 1_600_000, 1_800_000, 2_000_000, 2_200_000, 2_400_000, 2_600_000, 2_800_000,
    3_000_000, 3_400_000, 3_800_000, 4_200_000, 4_600_000, 5_000_000, 5_500_000, 6_000_000,
    6_500_000, 7_000_000, 7_500_000, 8_000_000, 8_500_000, 9_000_000,
];

/// 360p through 1080p.
pub const DEFAULT_RESOLUTIONS: [Resolution; 5] = [
    Resolution::new(640, 360),
    Resolution::new(768, 432),
    Resolution::new(960, 540),
    Resolution::new(1280, 720),
    Resolution::new(1920, 1080),
];

type FilterFn = dyn Fn(u64, &Resolution) -> bool + Send + Sync;

/// Predicate deciding whether a (bitrate, resolution) pair is worth encoding.
#[derive(Clone)]
pub enum PairFilter {
    /// `min ≤ bitrate / (width·height) ≤ max`.
    BitsPerPixel { min: f64, max: f64 },
    AcceptAll,
    Custom(Arc<FilterFn>),
}

impl Default for PairFilter {
    fn default() -> Self {
        PairFilter::BitsPerPixel { min: 0.3, max: 8.0 }
    }
}

impl PairFilter {
    pub fn custom(f: impl Fn(u64, &Resolution) -> bool + Send + Sync + 'static) -> Self {
        PairFilter::Custom(Arc::new(f))
    }

    pub fn accepts(&self, bitrate: u64, resolution: &Resolution) -> bool {
        match self {
            PairFilter::BitsPerPixel { min, max } => {
                let pixels = resolution.pixels() as f64;
                let b = bitrate as f64;
                b >= pixels * min && b <= pixels * max
            }
            PairFilter::AcceptAll => true,
            PairFilter::Custom(f) => f(bitrate, resolution),
        }
    }
}

impl fmt::Debug for PairFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairFilter::BitsPerPixel { min, max } => write!(f, "BitsPerPixel({min}..={max})"),
            PairFilter::AcceptAll => f.write_str("AcceptAll"),
            PairFilter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchSpace {
    pub resolutions: Vec<ResolutionTarget>,
    pub bitrates: Vec<u64>,
    /// Named value lists expanded into a cross product of assignments.
    pub variables: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    pub filter: PairFilter,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            resolutions: DEFAULT_RESOLUTIONS.iter().copied().map(ResolutionTarget::from).collect(),
            bitrates: DEFAULT_BITRATES.to_vec(),
            variables: BTreeMap::new(),
            filter: PairFilter::default(),
        }
    }
}

impl SearchSpace {
    pub fn new(resolutions: Vec<ResolutionTarget>, bitrates: Vec<u64>) -> Self {
        Self {
            resolutions,
            bitrates,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: PairFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, Vec<String>>) -> Self {
        self.variables = variables;
        self
    }

    /// Digest of resolutions, bitrates and variables (the filter is not serializable).
    pub fn digest(&self) -> autoabr_core::Result<Hash256> {
        hash_serde(self)
    }

    pub fn pairs(&self) -> Vec<CandidatePair> {
        generate_pairs(self)
    }
}

/// Cross product of variable assignments, in key order then value order.
///
/// No variables yields a single empty assignment. A name with no values is ignored.
pub fn expand_variables(variables: &BTreeMap<String, Vec<String>>) -> Vec<Variables> {
    let mut out = vec![Variables::new()];
    for (name, values) in variables.iter().filter(|(_, v)| !v.is_empty()) {
        out = out
            .into_iter()
            .flat_map(|assignment| {
                values.iter().map(move |value| {
                    let mut next = assignment.clone();
                    next.insert(name.clone(), value.clone());
                    next
                })
            })
            .collect();
    }
    out
}

/// Deterministic, duplicate-free candidate pairs for `space`.
pub fn generate_pairs(space: &SearchSpace) -> Vec<CandidatePair> {
    let assignments = expand_variables(&space.variables);
    let mut seen = HashSet::new();
    let mut pairs = Vec::new();

    for target in &space.resolutions {
        for &bitrate in &space.bitrates {
            if !space.filter.accepts(bitrate, &target.resolution) || !target.allows(bitrate) {
                continue;
            }
            for variables in &assignments {
                let pair = CandidatePair::new(target.resolution, bitrate).with_variables(variables.clone());
                if seen.insert(pair.clone()) {
                    pairs.push(pair);
                }
            }
        }
    }
    pairs
}
