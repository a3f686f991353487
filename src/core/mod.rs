pub mod enrollment;
pub mod extractor;
pub mod identification;
pub mod matcher;
pub mod progress;
pub mod quality;

#[cfg(test)]
pub(crate) mod testing;

pub use enrollment::{Enrollment, EnrollmentOrchestrator, EnrollmentSettings};
pub use extractor::{Descriptor, FeatureExtractor, OrientationExtractor};
pub use identification::{IdentificationOrchestrator, MatchOutcome};
pub use matcher::{HistogramMatcher, MatchPolicy, MatchResult, Matcher, Score, PROBABILITY_ONE};
pub use progress::{Progress, RetryReason};
pub use quality::QualityAssessment;
