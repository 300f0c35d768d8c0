//! Robust (resampling) estimation engine
use log::{debug, trace};
use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    cfg::{Method, RobustOpts},
    prelude::Error,
};

mod event;
mod inliers;
mod sampler;
mod score;
mod state;

pub use event::{Event, Listener};
pub use inliers::InliersData;
pub use score::Score;
pub use state::EstimatorState;

use sampler::Sampler;
use score::Scorer;

/// A [ConsensusProblem] is any model that can be hypothesized from a
/// minimal subset of samples, and then verified against every sample.
pub trait ConsensusProblem {
    /// Model hypothesized from minimal subsets
    type Solution: Clone;

    /// Total number of samples
    fn num_samples(&self) -> usize;

    /// Minimal subset size
    fn subset_size(&self) -> usize;

    /// True when this problem may be estimated
    fn is_ready(&self) -> bool {
        self.subset_size() > 0 && self.num_samples() >= self.subset_size()
    }

    /// Candidate solutions for given minimal subset (possibly none,
    /// for degenerate subsets).
    fn candidates(&self, subset: &[usize]) -> Vec<Self::Solution>;

    /// Residual of sample `index` with respect to `solution`.
    fn residual(&self, solution: &Self::Solution, index: usize) -> f64;
}

/// Best solution found by the [RobustEstimator]
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus<S> {
    /// Winning solution
    pub solution: S,
    /// Its [Score]
    pub score: Score,
    /// [InliersData], when kept
    pub inliers: Option<InliersData>,
    /// Number of subsets that were drawn
    pub iterations: usize,
    /// Inlier indices, always available
    pub(crate) inlier_indices: Vec<usize>,
}

impl<S> Consensus<S> {
    /// Indices of the inlier samples
    pub fn inlier_indices(&self) -> &[usize] {
        &self.inlier_indices
    }
}

/// Number of draws needed to pick at least one outlier free subset with
/// `confidence`, given the inlier ratio and the subset size, capped at `max`.
pub(crate) fn required_iterations(
    confidence: f64,
    inliers: usize,
    num_samples: usize,
    subset_size: usize,
    max: usize,
) -> usize {
    if num_samples == 0 || inliers == 0 {
        return max;
    }

    let ratio = (inliers as f64 / num_samples as f64).powi(subset_size as i32);

    if ratio >= 1.0 {
        return 1;
    }

    let iterations = (1.0 - confidence).ln() / (1.0 - ratio).ln();

    if iterations.is_finite() {
        (iterations.ceil() as usize).clamp(1, max)
    } else {
        max
    }
}

/// [RobustEstimator] draws minimal subsets, hypothesizes solutions
/// and keeps the best one according to the selected [Method].
pub struct RobustEstimator {
    method: Method,
    confidence: f64,
    max_iterations: usize,
    progress_delta: f32,
    threshold: f64,
    stop_threshold: f64,
    inlier_factor: f64,
    seed: u64,
    keep_inliers: bool,
    keep_residuals: bool,
    quality_scores: Option<Vec<f64>>,
    listener: Option<Listener>,
    state: EstimatorState,
}

impl Default for RobustEstimator {
    fn default() -> Self {
        Self::new(Method::default())
    }
}

impl RobustEstimator {
    /// Builds new [RobustEstimator] using [Method] and default options.
    /// Inlier threshold defaults to 1 and stop threshold to 1E-6, in
    /// the units of the residuals.
    pub fn new(method: Method) -> Self {
        let opts = RobustOpts::default();
        Self {
            method,
            confidence: opts.confidence,
            max_iterations: opts.max_iterations,
            progress_delta: opts.progress_delta,
            inlier_factor: opts.inlier_factor,
            seed: opts.seed,
            keep_inliers: opts.keep_inliers,
            keep_residuals: opts.keep_residuals,
            threshold: 1.0,
            stop_threshold: 1.0E-6,
            quality_scores: None,
            listener: None,
            state: EstimatorState::Idle,
        }
    }

    /// Builds new [RobustEstimator] from [RobustOpts] and thresholds
    /// expressed in the units of the residuals.
    pub fn from_opts(
        opts: &RobustOpts,
        threshold: f64,
        stop_threshold: f64,
    ) -> Result<Self, Error> {
        opts.validate()?;
        let mut s = Self::new(opts.method);
        s.confidence = opts.confidence;
        s.max_iterations = opts.max_iterations;
        s.progress_delta = opts.progress_delta;
        s.inlier_factor = opts.inlier_factor;
        s.seed = opts.seed;
        s.keep_inliers = opts.keep_inliers;
        s.keep_residuals = opts.keep_residuals;
        s.set_threshold(threshold)?;
        s.set_stop_threshold(stop_threshold)?;
        Ok(s)
    }

    /// Current [EstimatorState]
    pub fn state(&self) -> EstimatorState {
        self.state
    }

    /// Selected [Method]
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn stop_threshold(&self) -> f64 {
        self.stop_threshold
    }

    pub fn quality_scores(&self) -> Option<&[f64]> {
        self.quality_scores.as_deref()
    }

    pub fn set_method(&mut self, method: Method) -> Result<(), Error> {
        self.state.check_unlocked()?;
        self.method = method;
        Ok(())
    }

    /// Updates the confidence, within ]0, 1[.
    pub fn set_confidence(&mut self, confidence: f64) -> Result<(), Error> {
        self.state.check_unlocked()?;
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(Error::InvalidConfidence);
        }
        self.confidence = confidence;
        Ok(())
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<(), Error> {
        self.state.check_unlocked()?;
        if max_iterations == 0 {
            return Err(Error::InvalidMaxIterations);
        }
        self.max_iterations = max_iterations;
        Ok(())
    }

    /// Updates the progress notification step, within [0, 1].
    pub fn set_progress_delta(&mut self, delta: f32) -> Result<(), Error> {
        self.state.check_unlocked()?;
        if !(0.0..=1.0).contains(&delta) {
            return Err(Error::InvalidProgressDelta);
        }
        self.progress_delta = delta;
        Ok(())
    }

    /// Updates the inlier threshold (RANSAC, MSAC, PROSAC)
    pub fn set_threshold(&mut self, threshold: f64) -> Result<(), Error> {
        self.state.check_unlocked()?;
        if !(threshold > 0.0) {
            return Err(Error::InvalidThreshold);
        }
        self.threshold = threshold;
        Ok(())
    }

    /// Updates the stop threshold (LMedS, PROMedS)
    pub fn set_stop_threshold(&mut self, threshold: f64) -> Result<(), Error> {
        self.state.check_unlocked()?;
        if !(threshold > 0.0) {
            return Err(Error::InvalidStopThreshold);
        }
        self.stop_threshold = threshold;
        Ok(())
    }

    /// Updates the inlier factor (LMedS, PROMedS)
    pub fn set_inlier_factor(&mut self, factor: f64) -> Result<(), Error> {
        self.state.check_unlocked()?;
        if !(factor > 0.0) {
            return Err(Error::InvalidInlierFactor);
        }
        self.inlier_factor = factor;
        Ok(())
    }

    pub fn set_seed(&mut self, seed: u64) -> Result<(), Error> {
        self.state.check_unlocked()?;
        self.seed = seed;
        Ok(())
    }

    pub fn set_keep_inliers(&mut self, keep: bool) -> Result<(), Error> {
        self.state.check_unlocked()?;
        self.keep_inliers = keep;
        Ok(())
    }

    pub fn set_keep_residuals(&mut self, keep: bool) -> Result<(), Error> {
        self.state.check_unlocked()?;
        self.keep_residuals = keep;
        Ok(())
    }

    /// Defines the quality scores (one per sample, higher is better),
    /// required by PROSAC and PROMedS.
    pub fn set_quality_scores(&mut self, scores: Option<Vec<f64>>) -> Result<(), Error> {
        self.state.check_unlocked()?;
        self.quality_scores = scores;
        Ok(())
    }

    /// Registers the [Event]s [Listener]
    pub fn set_listener(&mut self, listener: Option<Listener>) -> Result<(), Error> {
        self.state.check_unlocked()?;
        self.listener = listener;
        Ok(())
    }

    /// Robust estimation of the [ConsensusProblem].
    /// ## Returns
    /// - [Consensus] on success
    /// - [Error::Locked] when already running
    /// - [Error::NotReady] if the problem cannot be estimated
    /// - [Error::QualityScoresMismatch] on PROSAC / PROMedS quality scores issue
    /// - [Error::NotEnoughInliers] if no solution gathered enough inliers
    pub fn estimate<P: ConsensusProblem>(
        &mut self,
        problem: &P,
    ) -> Result<Consensus<P::Solution>, Error> {
        self.state.check_unlocked()?;

        let mut listener = self.listener.take();
        let mut notify = |event: &Event| {
            if let Some(listener) = listener.as_mut() {
                listener(event);
            }
        };

        notify(&Event::Start);
        let ret = self.run(problem, &mut notify);
        notify(&Event::End);

        self.listener = listener;
        ret
    }

    /// Runs the sampling loop, notifying iterations and progress only.
    pub(crate) fn run<P: ConsensusProblem>(
        &mut self,
        problem: &P,
        notify: &mut dyn FnMut(&Event),
    ) -> Result<Consensus<P::Solution>, Error> {
        self.state.lock()?;
        let ret = self.sample(problem, notify);
        self.state.release(ret.is_ok());
        ret
    }

    fn quality_scores_for(&self, num_samples: usize) -> Result<&[f64], Error> {
        let scores = self.quality_scores.as_deref().ok_or(Error::NotReady)?;
        if scores.len() != num_samples {
            return Err(Error::QualityScoresMismatch {
                expected: num_samples,
                provided: scores.len(),
            });
        }
        Ok(scores)
    }

    fn sample<P: ConsensusProblem>(
        &self,
        problem: &P,
        notify: &mut dyn FnMut(&Event),
    ) -> Result<Consensus<P::Solution>, Error> {
        let num_samples = problem.num_samples();
        let subset_size = problem.subset_size();

        if !problem.is_ready() || subset_size == 0 || num_samples < subset_size {
            return Err(Error::NotReady);
        }

        let mut sampler = if self.method.requires_quality_scores() {
            let scores = self.quality_scores_for(num_samples)?;
            Sampler::prosac(scores, subset_size, self.max_iterations)
        } else {
            Sampler::uniform(num_samples)
        };

        let scorer = Scorer::new(
            self.method,
            self.threshold,
            self.stop_threshold,
            self.inlier_factor,
            subset_size,
        );

        debug!(
            "{} - {} samples (subsets of {})",
            self.method, num_samples, subset_size
        );

        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut subset = vec![0; subset_size];
        let mut residuals = vec![0.0; num_samples];

        let mut best: Option<(P::Solution, Score)> = None;
        let mut required = self.max_iterations;
        let mut iterations = 0;
        let mut last_progress = 0.0_f32;

        'sampling: while iterations < required {
            sampler.draw(&mut rng, &mut subset);

            let mut stop = false;

            for candidate in problem.candidates(&subset) {
                evaluate(problem, &candidate, &mut residuals);
                let score = scorer.score(&residuals);

                let improved = match &best {
                    Some((_, best)) => scorer.is_better(&score, best),
                    None => true,
                };

                if improved {
                    trace!(
                        "{} - iter={} inliers={} cost={:.6E}",
                        self.method,
                        iterations,
                        score.inliers,
                        score.cost
                    );

                    required = required_iterations(
                        self.confidence,
                        scorer.consensus_size(&score, num_samples),
                        num_samples,
                        subset_size,
                        self.max_iterations,
                    );

                    stop = scorer.should_stop(&score);
                    best = Some((candidate, score));

                    if stop {
                        break;
                    }
                }
            }

            iterations += 1;
            notify(&Event::Iteration(iterations));

            let progress = (iterations as f32 / required.max(1) as f32).min(1.0);
            if progress - last_progress >= self.progress_delta && progress > last_progress {
                last_progress = progress;
                notify(&Event::Progress(progress));
            }

            if stop {
                debug!("{} - stop threshold reached", self.method);
                break 'sampling;
            }
        }

        let (solution, score) = best.ok_or(Error::NotEnoughInliers)?;

        evaluate(problem, &solution, &mut residuals);
        let threshold = scorer.threshold(score.cost, num_samples);
        let mut inliers = InliersData::classify(&residuals, threshold);

        if inliers.num_inliers < subset_size {
            debug!(
                "{} - best solution only has {} inliers",
                self.method, inliers.num_inliers
            );
            return Err(Error::NotEnoughInliers);
        }

        debug!(
            "{} - {}/{} inliers after {} iterations",
            self.method, inliers.num_inliers, num_samples, iterations
        );

        let inlier_indices = inliers.indices();

        if !self.keep_residuals {
            inliers.residuals = None;
        }

        Ok(Consensus {
            solution,
            score,
            iterations,
            inlier_indices,
            inliers: if self.keep_inliers {
                Some(inliers)
            } else {
                None
            },
        })
    }
}

/// Absolute residuals of each sample. Non finite values are mapped to infinity.
fn evaluate<P: ConsensusProblem>(problem: &P, solution: &P::Solution, residuals: &mut [f64]) {
    for (index, residual) in residuals.iter_mut().enumerate() {
        let r = problem.residual(solution, index).abs();
        *residual = if r.is_finite() { r } else { f64::INFINITY };
    }
}
