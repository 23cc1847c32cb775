//! Flags updates whose overall magnitude strays from what a participant usually submits.

use std::collections::HashMap;

use comms::ParameterSet;

use super::AnomalyDetector;
use crate::coordinator::ParticipantId;

pub const DEFAULT_THRESHOLD: f64 = 3.;
pub const DEFAULT_WARMUP: u64 = 5;
/// The fewest updates a standard deviation can be taken over.
pub const MIN_WARMUP: u64 = 2;
/// The spread assumed around a baseline whose updates barely vary, relative to its mean.
const MIN_RELATIVE_SPREAD: f64 = 0.01;

/// Welford's running mean and variance of a participant's update norms.
#[derive(Debug, Default, Clone, Copy)]
struct NormStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl NormStats {
    fn learn(&mut self, norm: f64) {
        self.count += 1;
        let delta = norm - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (norm - self.mean);
    }

    fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.;
        }

        (self.m2 / (self.count - 1) as f64).sqrt()
    }

    /// The standard deviation, floored so that a steady baseline still tolerates jitter.
    fn spread(&self) -> f64 {
        self.std_dev()
            .max(self.mean.abs() * MIN_RELATIVE_SPREAD)
            .max(f64::EPSILON)
    }
}

/// Tracks the L2 norm of every participant's updates.
///
/// The first `warmup` updates of a participant only build its baseline, never fewer than
/// `MIN_WARMUP`. After that an update whose norm deviates from the running mean by more than
/// `threshold` standard deviations is flagged and kept out of the baseline, any other update is
/// learned from. The deviation never drops below a small fraction of the mean, a participant
/// submitting the same norm over and over isn't flagged for the slightest change.
#[derive(Debug)]
pub struct MagnitudeDetector {
    threshold: f64,
    warmup: u64,
    stats: HashMap<ParticipantId, NormStats>,
    verdicts: HashMap<ParticipantId, bool>,
}

impl MagnitudeDetector {
    /// Creates a new `MagnitudeDetector`.
    ///
    /// # Arguments
    /// * `threshold` - How many standard deviations away from the mean an update may land.
    /// * `warmup` - The amount of updates needed before judging a participant.
    pub fn new(threshold: f64, warmup: u64) -> Self {
        Self {
            threshold,
            warmup: warmup.max(MIN_WARMUP),
            stats: HashMap::new(),
            verdicts: HashMap::new(),
        }
    }

    fn judge(&mut self, participant: ParticipantId, norm: f64) -> bool {
        let stats = self.stats.entry(participant).or_default();

        if stats.count < self.warmup {
            stats.learn(norm);
            return false;
        }

        if (norm - stats.mean).abs() > self.threshold * stats.spread() {
            return true;
        }

        stats.learn(norm);
        false
    }
}

impl Default for MagnitudeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_WARMUP)
    }
}

impl AnomalyDetector for MagnitudeDetector {
    fn observe(&mut self, participant: ParticipantId, params: &ParameterSet) {
        let verdict = self.judge(participant, params.l2_norm());
        self.verdicts.insert(participant, verdict);
    }

    fn poll(&mut self, participant: ParticipantId) -> bool {
        self.verdicts.remove(&participant).unwrap_or(false)
    }

    fn forget(&mut self, participant: ParticipantId) {
        self.stats.remove(&participant);
        self.verdicts.remove(&participant);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: ParticipantId = ParticipantId::new(1);

    fn norm(value: f32) -> ParameterSet {
        ParameterSet::from_vecs(vec![vec![value]])
    }

    fn feed(detector: &mut MagnitudeDetector, id: ParticipantId, value: f32) -> bool {
        detector.observe(id, &norm(value));
        detector.poll(id)
    }

    #[test]
    fn warmup_never_flags() {
        let mut detector = MagnitudeDetector::new(3., 5);

        for value in [1., 1000., 1., 1000., 1.] {
            assert!(!feed(&mut detector, ID, value));
        }
    }

    #[test]
    fn outlier_after_warmup() {
        let mut detector = MagnitudeDetector::new(3., 5);

        for value in [1., 1.1, 0.9, 1.05, 0.95] {
            assert!(!feed(&mut detector, ID, value));
        }

        assert!(!feed(&mut detector, ID, 1.02));
        assert!(feed(&mut detector, ID, 50.));
        // Flagged updates don't shift the baseline.
        assert!(feed(&mut detector, ID, 50.));
        assert!(!feed(&mut detector, ID, 1.));
    }

    #[test]
    fn participants_are_judged_separately() {
        let mut detector = MagnitudeDetector::new(3., 2);
        let other = ParticipantId::new(2);

        for _ in 0..2 {
            feed(&mut detector, ID, 1.);
            feed(&mut detector, other, 100.);
        }

        assert!(!feed(&mut detector, other, 100.));
        assert!(feed(&mut detector, ID, 100.));
    }

    #[test]
    fn steady_baseline_tolerates_jitter() {
        let mut detector = MagnitudeDetector::new(3., 1);
        feed(&mut detector, ID, 1.);

        for value in [1.01, 0.99, 1., 1.02, 0.98] {
            assert!(!feed(&mut detector, ID, value), "{value} was flagged");
        }

        assert!(feed(&mut detector, ID, 2.));
    }

    #[test]
    fn warmup_is_at_least_two_updates() {
        let mut detector = MagnitudeDetector::new(3., 0);

        for _ in 0..3 {
            assert!(!feed(&mut detector, ID, 1.));
        }

        assert_eq!(detector.stats[&ID].count, 3);
        assert!(feed(&mut detector, ID, 10.));
    }

    #[test]
    fn poll_consumes_the_verdict() {
        let mut detector = MagnitudeDetector::new(3., 2);
        detector.stats.insert(ID, NormStats { count: 3, mean: 1., m2: 0. });

        detector.observe(ID, &norm(10.));
        assert!(detector.poll(ID));
        assert!(!detector.poll(ID));
    }

    #[test]
    fn forget() {
        let mut detector = MagnitudeDetector::new(3., 2);
        feed(&mut detector, ID, 1.);
        feed(&mut detector, ID, 1.);

        detector.forget(ID);
        assert!(!feed(&mut detector, ID, 500.));
    }
}
