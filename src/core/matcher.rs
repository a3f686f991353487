use crate::common::config::MatchingConfig;
use crate::core::extractor::{CellHistograms, Descriptor};
use serde::{Deserialize, Serialize};

/// Score of two descriptors with nothing in common. Scores read as an
/// estimated false-accept probability scaled to this value.
pub const PROBABILITY_ONE: i32 = 0x7FFF_FFFF;

/// Dissimilarity score; lower is more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(i32);

impl Score {
    pub const MAX: Score = Score(PROBABILITY_ONE);

    pub fn new(value: i32) -> Self {
        Self(value.clamp(0, PROBABILITY_ONE))
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub trait Matcher: Send + Sync {
    fn compare(&self, a: &Descriptor, b: &Descriptor) -> Score;
}

/// Mean L1 distance between cell histograms, mapped onto the
/// `PROBABILITY_ONE` scale with a sixth-power curve.
#[derive(Debug, Default, Clone, Copy)]
pub struct HistogramMatcher;

impl HistogramMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl Matcher for HistogramMatcher {
    fn compare(&self, a: &Descriptor, b: &Descriptor) -> Score {
        let (a, b) = match (CellHistograms::decode(a), CellHistograms::decode(b)) {
            (Ok(a), Ok(b)) if a.values.dim() == b.values.dim() => (a, b),
            _ => return Score::MAX,
        };

        let (grid, _, _) = a.values.dim();
        let cells = (grid * grid) as f64;
        let l1: f64 = a.values
            .iter()
            .zip(b.values.iter())
            .map(|(x, y)| (x - y).abs() as f64)
            .sum();

        let distance = (l1 / (cells * 2.0 * 255.0)).clamp(0.0, 1.0);
        Score::new((distance.powi(6) * PROBABILITY_ONE as f64).round() as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub score: Score,
    pub matched: bool,
}

/// Match decision: `score < threshold`.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    threshold: Score,
}

impl MatchPolicy {
    pub fn new(threshold: i32) -> Self {
        Self { threshold: Score::new(threshold) }
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(config.far_threshold)
    }

    pub fn decide(&self, score: Score) -> bool {
        score < self.threshold
    }

    pub fn evaluate(&self, score: Score) -> MatchResult {
        MatchResult { score, matched: self.decide(score) }
    }
}
