use itertools::Itertools;

use crate::{cfg::Method, constants::MEDIAN_STD_DEV_FACTOR};

/// Quality of a candidate solution
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Score {
    /// Number of samples classified as inliers
    pub inliers: usize,
    /// Method dependent cost, the lower the better:
    /// - RANSAC, PROSAC: sum of the inlier residuals
    /// - MSAC: Σ min(r², t²)
    /// - LMedS, PROMedS: median of the squared residuals
    pub cost: f64,
}

/// Scores candidates the way the selected [Method] does.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Scorer {
    /// Fixed threshold: inlier count first (RANSAC, PROSAC)
    Count { threshold: f64 },
    /// Fixed threshold: truncated quadratic cost (MSAC)
    Truncated { threshold: f64 },
    /// Median of squared residuals (LMedS, PROMedS)
    Median {
        stop_threshold: f64,
        inlier_factor: f64,
        subset_size: usize,
    },
}

impl Scorer {
    pub fn new(
        method: Method,
        threshold: f64,
        stop_threshold: f64,
        inlier_factor: f64,
        subset_size: usize,
    ) -> Self {
        match method {
            Method::Ransac | Method::Prosac => Self::Count { threshold },
            Method::Msac => Self::Truncated { threshold },
            Method::LMedS | Method::PROMedS => Self::Median {
                stop_threshold,
                inlier_factor,
                subset_size,
            },
        }
    }

    /// Scores a candidate from its absolute residuals (one per sample).
    /// Non finite residuals are never inliers.
    pub fn score(&self, residuals: &[f64]) -> Score {
        match self {
            Self::Count { threshold } => {
                let (inliers, cost) = residuals
                    .iter()
                    .filter(|r| r.is_finite() && **r <= *threshold)
                    .fold((0, 0.0), |(n, sum), r| (n + 1, sum + r));
                Score { inliers, cost }
            },
            Self::Truncated { threshold } => {
                let t2 = threshold.powi(2);
                let (inliers, cost) = residuals.iter().fold((0, 0.0), |(n, sum), r| {
                    let r2 = r.powi(2);
                    if r.is_finite() && r2 <= t2 {
                        (n + 1, sum + r2)
                    } else {
                        (n, sum + t2)
                    }
                });
                Score { inliers, cost }
            },
            Self::Median { .. } => {
                let cost = median_squared(residuals);
                let threshold = self.threshold(cost, residuals.len());
                let inliers = residuals
                    .iter()
                    .filter(|r| r.is_finite() && **r <= threshold)
                    .count();
                Score { inliers, cost }
            },
        }
    }

    /// Inlier classification threshold, for a solution of given `cost`.
    /// Median scorers deduce it from a robust standard deviation estimate
    /// (Rousseeuw), floored by the stop threshold.
    pub fn threshold(&self, cost: f64, num_samples: usize) -> f64 {
        match self {
            Self::Count { threshold } | Self::Truncated { threshold } => *threshold,
            Self::Median {
                stop_threshold,
                inlier_factor,
                subset_size,
            } => {
                let dof = num_samples.saturating_sub(*subset_size).max(1) as f64;
                let sigma = MEDIAN_STD_DEV_FACTOR * (1.0 + 5.0 / dof) * cost.sqrt();
                (inlier_factor * sigma).max(*stop_threshold)
            },
        }
    }

    /// True if `score` is strictly better than `best`
    pub fn is_better(&self, score: &Score, best: &Score) -> bool {
        match self {
            Self::Count { .. } => {
                score.inliers > best.inliers
                    || (score.inliers == best.inliers && score.cost < best.cost)
            },
            Self::Truncated { .. } | Self::Median { .. } => {
                score.cost < best.cost || (score.cost == best.cost && score.inliers > best.inliers)
            },
        }
    }

    /// Number of inliers driving the adaptive iteration count.
    /// Median scorers classify samples against their own median, which
    /// inflates the count of poor candidates: it is capped at the 50% breakdown point.
    pub fn consensus_size(&self, score: &Score, num_samples: usize) -> usize {
        match self {
            Self::Median { subset_size, .. } => {
                score.inliers.min((num_samples / 2).max(*subset_size))
            },
            _ => score.inliers,
        }
    }

    /// True when `score` is good enough to interrupt the sampling loop
    pub fn should_stop(&self, score: &Score) -> bool {
        match self {
            Self::Median { stop_threshold, .. } => score.cost.sqrt() <= *stop_threshold,
            _ => false,
        }
    }
}

/// Median of the squared residuals. Non finite residuals rank last.
fn median_squared(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return f64::INFINITY;
    }

    let sorted = residuals
        .iter()
        .map(|r| if r.is_finite() { r.powi(2) } else { f64::INFINITY })
        .sorted_by(f64::total_cmp)
        .collect::<Vec<_>>();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod test {
    use super::{median_squared, Score, Scorer};
    use crate::cfg::Method;

    #[test]
    fn median() {
        assert_eq!(median_squared(&[3.0, 1.0, 2.0]), 4.0);
        assert_eq!(median_squared(&[1.0, 2.0, 3.0, 4.0]), 6.5);
        assert_eq!(median_squared(&[1.0, f64::NAN, 0.0]), 1.0);
        assert!(median_squared(&[]).is_infinite());
    }

    #[test]
    fn counting_scorer() {
        let scorer = Scorer::new(Method::Ransac, 1.0, 0.0, 1.5, 3);
        let score = scorer.score(&[0.5, 0.25, 3.0, f64::NAN]);
        assert_eq!(score.inliers, 2);
        assert_eq!(score.cost, 0.75);

        let more = Score {
            inliers: 3,
            cost: 10.0,
        };
        assert!(scorer.is_better(&more, &score));
        let tied = Score {
            inliers: 2,
            cost: 0.5,
        };
        assert!(scorer.is_better(&tied, &score));
        assert!(!scorer.is_better(&score, &score));
        assert!(!scorer.should_stop(&tied));
    }

    #[test]
    fn truncated_scorer() {
        let scorer = Scorer::new(Method::Msac, 1.0, 0.0, 1.5, 3);
        let score = scorer.score(&[0.5, 3.0, f64::INFINITY]);
        assert_eq!(score.inliers, 1);
        assert_eq!(score.cost, 0.25 + 1.0 + 1.0);

        let lower = Score {
            inliers: 0,
            cost: 1.0,
        };
        assert!(scorer.is_better(&lower, &score));
    }

    #[test]
    fn median_scorer() {
        let scorer = Scorer::new(Method::LMedS, 0.0, 0.01, 1.5, 3);

        // exact data: threshold floored at the stop threshold
        let score = scorer.score(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0]);
        assert_eq!(score.cost, 0.0);
        assert_eq!(score.inliers, 8);
        assert!(scorer.should_stop(&score));
        assert_eq!(scorer.threshold(score.cost, 9), 0.01);

        let noisy = scorer.score(&[0.1, 0.1, 0.1, 0.1, 0.1, 5.0, 5.0, 5.0]);
        assert!((noisy.cost - 0.01).abs() < 1.0E-12);
        assert_eq!(noisy.inliers, 5);
        assert!(!scorer.should_stop(&noisy));
        assert!(scorer.is_better(&score, &noisy));
    }

    #[test]
    fn consensus_size() {
        let median = Scorer::new(Method::LMedS, 0.0, 1.0E-6, 1.5, 2);

        // poor candidate: its own median makes everything an inlier
        let poor = median.score(&[40.0, 50.0, 60.0, 45.0, 55.0, 35.0, 1000.0, 52.0, 48.0, 41.0]);
        assert!(poor.inliers >= 9);
        assert_eq!(median.consensus_size(&poor, 10), 5);

        let few = Score {
            inliers: 3,
            cost: 1.0,
        };
        assert_eq!(median.consensus_size(&few, 10), 3);

        // every sample is needed
        let tiny = Scorer::new(Method::PROMedS, 0.0, 1.0E-6, 1.5, 3);
        let all = Score {
            inliers: 3,
            cost: 0.0,
        };
        assert_eq!(tiny.consensus_size(&all, 3), 3);

        let counting = Scorer::new(Method::Ransac, 1.0, 0.0, 1.5, 2);
        let score = counting.score(&[0.5; 10]);
        assert_eq!(counting.consensus_size(&score, 10), 10);
    }
}
