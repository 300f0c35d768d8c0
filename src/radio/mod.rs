//! Radio source estimation: position, transmitted power and path loss exponent
use itertools::Itertools;
use log::{debug, error, warn};
use nalgebra::DMatrix;

use crate::{
    cfg::Config,
    fitting::LevenbergMarquardt,
    lateration::{Lateration, Sphere},
    prelude::{Covariance, Error, Point, Reading},
    robust::{Consensus, ConsensusProblem, EstimatorState, Event, Listener, RobustEstimator},
};

mod estimate;
mod ranging;
mod rssi;

pub use estimate::{RadioSourceEstimate, Refinement, StageReport};

use estimate::block_diagonal;
use ranging::RangingProblem;
use rssi::{RssiObservation, RssiProblem, RssiSolution, Unknowns};

/// Progress window allocated to one stage
#[derive(Debug, Clone, Copy)]
struct Window {
    /// Progress when the stage starts
    offset: f32,
    /// Share of the total progress
    span: f32,
    /// Iterations performed by previous stages
    iterations: usize,
}

/// Stages of a run, deduced from the readings and the [Config]
#[derive(Debug, Clone)]
struct Plan {
    /// Readings used by the ranging stage, if it takes place
    ranging: Option<Vec<usize>>,
    /// Readings and unknowns of the RSSI stage, if it takes place
    rssi: Option<(Vec<usize>, Unknowns)>,
}

/// Output of the ranging stage
struct RangingOutput<const D: usize> {
    position: Point<D>,
    covariance: Option<Covariance<D>>,
    report: StageReport,
}

/// Output of the RSSI stage
struct RssiOutput<const D: usize> {
    solution: RssiSolution<D>,
    covariance: Option<DMatrix<f64>>,
    report: StageReport,
}

fn report<S>(consensus: Consensus<S>, refinement: Refinement) -> StageReport {
    StageReport {
        num_inliers: consensus.inlier_indices.len(),
        iterations: consensus.iterations,
        inliers: consensus.inliers,
        refinement,
    }
}

/// [RadioSourceEstimator] locates a radio source and characterizes its emission
/// (transmitted power, path loss exponent) from a set of [Reading]s.
///
/// Readings carrying a distance are solved first (robust lateration), the resulting
/// position is then frozen to estimate the emission parameters from the readings
/// carrying a received power. Without enough distances, the position is fitted jointly
/// with the emission parameters from the received powers alone.
pub struct RadioSourceEstimator<const D: usize> {
    readings: Vec<Reading<D>>,
    cfg: Config,
    initial_position: Option<Point<D>>,
    initial_power_dbm: Option<f64>,
    initial_exponent: Option<f64>,
    quality_scores: Option<Vec<f64>>,
    listener: Option<Listener>,
    state: EstimatorState,
}

impl<const D: usize> Default for RadioSourceEstimator<D> {
    fn default() -> Self {
        Self {
            readings: Vec::new(),
            cfg: Config::default(),
            initial_position: None,
            initial_power_dbm: None,
            initial_exponent: None,
            quality_scores: None,
            listener: None,
            state: EstimatorState::Idle,
        }
    }
}

impl<const D: usize> RadioSourceEstimator<D> {
    /// Builds new [RadioSourceEstimator] from a [Config], which is verified.
    pub fn new(cfg: Config) -> Result<Self, Error> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            ..Default::default()
        })
    }

    /// Builds new [RadioSourceEstimator] from a [Config] and [Reading]s.
    pub fn from_readings(cfg: Config, readings: Vec<Reading<D>>) -> Result<Self, Error> {
        let mut s = Self::new(cfg)?;
        s.readings = readings;
        Ok(s)
    }

    /// Current [EstimatorState]
    pub fn state(&self) -> EstimatorState {
        self.state
    }

    /// [Config] in use
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn readings(&self) -> &[Reading<D>] {
        &self.readings
    }

    pub fn initial_position(&self) -> Option<Point<D>> {
        self.initial_position
    }

    pub fn initial_power_dbm(&self) -> Option<f64> {
        self.initial_power_dbm
    }

    /// Initial path loss exponent, defaults to the configured one.
    pub fn initial_exponent(&self) -> f64 {
        self.initial_exponent.unwrap_or(self.cfg.rssi.initial_exponent)
    }

    pub fn quality_scores(&self) -> Option<&[f64]> {
        self.quality_scores.as_deref()
    }

    /// Replaces the [Config], which is verified first.
    pub fn set_config(&mut self, cfg: Config) -> Result<(), Error> {
        self.state.check_unlocked()?;
        cfg.validate()?;
        self.cfg = cfg;
        Ok(())
    }

    pub fn set_readings(&mut self, readings: Vec<Reading<D>>) -> Result<(), Error> {
        self.state.check_unlocked()?;
        self.readings = readings;
        Ok(())
    }

    pub fn add_reading<R: Into<Reading<D>>>(&mut self, reading: R) -> Result<(), Error> {
        self.state.check_unlocked()?;
        self.readings.push(reading.into());
        Ok(())
    }

    /// Initial position: seeds the iterative solvers, and is
    /// held fixed when the position is not estimated.
    pub fn set_initial_position(&mut self, position: Option<Point<D>>) -> Result<(), Error> {
        self.state.check_unlocked()?;
        self.initial_position = position;
        Ok(())
    }

    /// Initial transmitted power (dBm): held fixed when not estimated.
    pub fn set_initial_power_dbm(&mut self, power_dbm: Option<f64>) -> Result<(), Error> {
        self.state.check_unlocked()?;
        self.initial_power_dbm = power_dbm;
        Ok(())
    }

    /// Initial path loss exponent: held fixed when not estimated.
    pub fn set_initial_exponent(&mut self, exponent: Option<f64>) -> Result<(), Error> {
        self.state.check_unlocked()?;
        self.initial_exponent = exponent;
        Ok(())
    }

    /// Quality scores, one per [Reading] (higher is better),
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

    /// RSSI unknowns (power, exponent) being estimated
    fn rssi_unknowns(&self, position: bool) -> Unknowns {
        Unknowns {
            position,
            power: self.cfg.rssi.estimate_power,
            exponent: self.cfg.rssi.estimate_exponent,
        }
    }

    /// Minimal number of [Reading]s, deduced from the minimum of each stage.
    pub fn min_readings(&self) -> usize {
        let rssi = self.rssi_unknowns(false).min_observations::<D>();
        if self.cfg.estimate_position {
            Lateration::<D>::MIN_SPHERES.max(D + rssi)
        } else {
            rssi
        }
    }

    /// True when [Self::estimate] may be invoked
    pub fn is_ready(&self) -> bool {
        self.plan().is_ok()
    }

    fn plan(&self) -> Result<Plan, Error> {
        let cfg = &self.cfg;
        let num_rssi = cfg.rssi.num_unknowns();

        if !cfg.estimate_position && num_rssi == 0 {
            debug!("nothing to estimate");
            return Err(Error::NotReady);
        }

        if !cfg.estimate_position && self.initial_position.is_none() {
            debug!("position is not estimated: initial position is required");
            return Err(Error::NotReady);
        }

        let min_readings = self.min_readings();
        if self.readings.len() < min_readings {
            debug!(
                "not enough readings: {} provided, {} required",
                self.readings.len(),
                min_readings
            );
            return Err(Error::NotReady);
        }

        match &self.quality_scores {
            Some(scores) if scores.len() != self.readings.len() => {
                return Err(Error::QualityScoresMismatch {
                    expected: self.readings.len(),
                    provided: scores.len(),
                });
            },
            None if cfg.robust.method.requires_quality_scores() => {
                debug!("{} requires quality scores", cfg.robust.method);
                return Err(Error::NotReady);
            },
            _ => {},
        }

        let ranging_indices = self
            .readings
            .iter()
            .positions(|r| r.ranging().is_some())
            .collect::<Vec<_>>();

        let rssi_indices = self
            .readings
            .iter()
            .positions(|r| r.rssi().is_some())
            .collect::<Vec<_>>();

        let use_ranging =
            cfg.estimate_position && ranging_indices.len() >= Lateration::<D>::MIN_SPHERES;

        if cfg.estimate_position && !use_ranging && !ranging_indices.is_empty() {
            debug!(
                "only {} ranging readings: position solved from received powers",
                ranging_indices.len()
            );
        }

        let joint = cfg.estimate_position && !use_ranging;

        let rssi = if joint || num_rssi > 0 {
            let unknowns = self.rssi_unknowns(joint);
            if !unknowns.power && self.initial_power_dbm.is_none() {
                debug!("transmitted power is not estimated: initial power is required");
                return Err(Error::NotReady);
            }
            let required = unknowns.min_observations::<D>();
            if rssi_indices.len() < required {
                debug!(
                    "not enough rssi readings: {} provided, {} required",
                    rssi_indices.len(),
                    required
                );
                return Err(Error::NotReady);
            }
            Some((rssi_indices, unknowns))
        } else {
            None
        };

        Ok(Plan {
            ranging: if use_ranging {
                Some(ranging_indices)
            } else {
                None
            },
            rssi,
        })
    }

    /// Radio source estimation.
    /// ## Returns
    /// - [RadioSourceEstimate] on success
    /// - [Error::Locked] when already running
    /// - [Error::NotReady] when the readings or the setup do not allow estimation
    /// - [Error::QualityScoresMismatch] if quality scores do not match the readings
    /// - [Error::NotEnoughInliers] if a stage did not reach a consensus
    pub fn estimate(&mut self) -> Result<RadioSourceEstimate<D>, Error> {
        self.state.lock()?;

        let mut listener = self.listener.take();
        let mut notify = |event: &Event| {
            if let Some(listener) = listener.as_mut() {
                listener(event);
            }
        };

        notify(&Event::Start);
        let ret = self.run(&mut notify);
        notify(&Event::End);

        self.listener = listener;
        self.state.release(ret.is_ok());

        if let Err(e) = &ret {
            error!("radio source estimation failed: {}", e);
        }

        ret
    }

    fn run(&self, notify: &mut dyn FnMut(&Event)) -> Result<RadioSourceEstimate<D>, Error> {
        let plan = self.plan()?;

        let num_stages = plan.ranging.is_some() as usize + plan.rssi.is_some() as usize;
        let span = 1.0 / num_stages.max(1) as f32;

        let mut window = Window {
            offset: 0.0,
            span,
            iterations: 0,
        };

        let ranging = match &plan.ranging {
            Some(indices) => {
                let output = self.ranging_stage(indices, window, notify)?;
                window.offset += span;
                window.iterations += output.report.iterations;
                Some(output)
            },
            None => None,
        };

        let mut position = ranging
            .as_ref()
            .map(|output| output.position)
            .or(self.initial_position);

        let mut position_covariance = ranging.as_ref().and_then(|output| output.covariance);

        let rssi = match &plan.rssi {
            Some((indices, unknowns)) => {
                Some(self.rssi_stage(indices, *unknowns, position, window, notify)?)
            },
            None => None,
        };

        let mut transmitted_power_dbm = self.initial_power_dbm;
        let mut transmitted_power_variance = None;
        let mut path_loss_exponent = self.initial_exponent();
        let mut path_loss_exponent_variance = None;

        if let Some((_, unknowns)) = &plan.rssi {
            if let Some(output) = &rssi {
                if unknowns.position {
                    position = Some(output.solution.position);
                }
                if unknowns.power {
                    transmitted_power_dbm = Some(output.solution.power_dbm);
                }
                if unknowns.exponent {
                    path_loss_exponent = output.solution.exponent;
                }

                if let Some(covariance) = &output.covariance {
                    let mut col = 0;
                    if unknowns.position {
                        position_covariance =
                            Some(Covariance::<D>::from_fn(|i, j| covariance[(i, j)]));
                        col = D;
                    }
                    if unknowns.power {
                        transmitted_power_variance = Some(covariance[(col, col)]);
                        col += 1;
                    }
                    if unknowns.exponent {
                        path_loss_exponent_variance = Some(covariance[(col, col)]);
                    }
                }
            }
        }

        let position = position.ok_or(Error::NotReady)?;

        // ranging and RSSI stages are assumed independent
        let covariance = match (&ranging, &rssi) {
            (Some(ranging), Some(rssi)) => match (&ranging.covariance, &rssi.covariance) {
                (Some(position_block), Some(rssi_block)) => {
                    let position_block =
                        DMatrix::from_column_slice(D, D, position_block.as_slice());
                    Some(block_diagonal(&[&position_block, rssi_block]))
                },
                _ => None,
            },
            (Some(ranging), None) => ranging
                .covariance
                .map(|covariance| DMatrix::from_column_slice(D, D, covariance.as_slice())),
            (None, Some(rssi)) => rssi.covariance.clone(),
            (None, None) => None,
        };

        debug!(
            "radio source: position={:?} power={:?} dBm exponent={}",
            position.as_slice(),
            transmitted_power_dbm,
            path_loss_exponent
        );

        Ok(RadioSourceEstimate {
            position,
            position_covariance,
            transmitted_power_dbm,
            transmitted_power_variance,
            path_loss_exponent,
            path_loss_exponent_variance,
            covariance,
            ranging: ranging.map(|output| output.report),
            rssi: rssi.map(|output| output.report),
        })
    }

    /// Quality scores of the readings used by one stage
    fn stage_scores(&self, indices: &[usize]) -> Option<Vec<f64>> {
        self.quality_scores
            .as_ref()
            .map(|scores| indices.iter().map(|i| scores[*i]).collect())
    }

    /// Runs the robust estimator over one stage, forwarding its [Event]s
    /// within the stage [Window].
    fn robust_stage<P: ConsensusProblem>(
        &self,
        problem: &P,
        thresholds: (f64, f64),
        scores: Option<Vec<f64>>,
        window: Window,
        notify: &mut dyn FnMut(&Event),
    ) -> Result<Consensus<P::Solution>, Error> {
        let (threshold, stop_threshold) = thresholds;

        let mut engine = RobustEstimator::from_opts(&self.cfg.robust, threshold, stop_threshold)?;
        engine.set_quality_scores(scores)?;

        let mut forward = |event: &Event| match event {
            Event::Iteration(n) => notify(&Event::Iteration(window.iterations + n)),
            Event::Progress(p) => notify(&Event::Progress(window.offset + p * window.span)),
            Event::Start | Event::End => {},
        };

        engine.run(problem, &mut forward)
    }

    fn ranging_stage(
        &self,
        indices: &[usize],
        window: Window,
        notify: &mut dyn FnMut(&Event),
    ) -> Result<RangingOutput<D>, Error> {
        let opts = &self.cfg.ranging;

        let spheres = indices
            .iter()
            .filter_map(|i| {
                let reading = &self.readings[*i];
                let (distance, std_dev) = reading.ranging()?;
                Some(Sphere::new(
                    *reading.reference(),
                    distance,
                    std_dev.unwrap_or(opts.default_distance_std_dev_m),
                ))
            })
            .collect::<Vec<_>>();

        if opts.use_position_covariance
            && spheres.iter().all(|s| s.reference.covariance.is_none())
        {
            warn!("position covariance folding requested, but no reference covariance is known");
        }

        let mut lateration = Lateration::<D>::new(opts.solver)
            .with_solver_opts(&self.cfg.solver)
            .with_position_covariance(opts.use_position_covariance)
            .with_covariance_adjustment(self.cfg.adjust_covariance);

        if let Some(initial) = self.initial_position {
            lateration = lateration.with_initial_position(initial);
        }

        let problem = RangingProblem::new(&spheres, &lateration);

        let consensus = self.robust_stage(
            &problem,
            (opts.threshold_m, opts.stop_threshold_m),
            self.stage_scores(indices),
            window,
            notify,
        )?;

        let (position, covariance, refinement) = if self.cfg.refine {
            match lateration.nonlinear(&spheres, consensus.inlier_indices(), consensus.solution) {
                Ok(solution) => (
                    solution.position,
                    solution.covariance,
                    Refinement::Refined {
                        iterations: solution.iterations,
                    },
                ),
                Err(e) => {
                    warn!("ranging refinement failed: {}", e);
                    (consensus.solution, None, Refinement::Failed(e))
                },
            }
        } else {
            (consensus.solution, None, Refinement::NotRequested)
        };

        debug!(
            "ranging stage: {:?} ({}/{} inliers, {} iterations)",
            position.as_slice(),
            consensus.inlier_indices().len(),
            spheres.len(),
            consensus.iterations
        );

        Ok(RangingOutput {
            position,
            covariance,
            report: report(consensus, refinement),
        })
    }

    fn rssi_stage(
        &self,
        indices: &[usize],
        unknowns: Unknowns,
        position: Option<Point<D>>,
        window: Window,
        notify: &mut dyn FnMut(&Event),
    ) -> Result<RssiOutput<D>, Error> {
        let opts = &self.cfg.rssi;

        let observations = indices
            .iter()
            .filter_map(|i| {
                let reading = &self.readings[*i];
                let (rssi_dbm, std_dev) = reading.rssi()?;
                Some(RssiObservation {
                    reference: reading.reference().position,
                    rssi_dbm,
                    std_dev_db: std_dev.unwrap_or(opts.default_rssi_std_dev_db),
                })
            })
            .collect::<Vec<_>>();

        let problem = RssiProblem::new(
            &observations,
            unknowns,
            position,
            self.initial_power_dbm,
            self.initial_exponent(),
            opts.reference_distance_m,
            LevenbergMarquardt::from(&self.cfg.solver),
        )
        .ok_or(Error::NotReady)?;

        let consensus = self.robust_stage(
            &problem,
            (opts.threshold_db, opts.stop_threshold_db),
            self.stage_scores(indices),
            window,
            notify,
        )?;

        let (solution, covariance, refinement) = if self.cfg.refine {
            match problem.fit(consensus.inlier_indices(), &consensus.solution) {
                Ok((solution, fit)) => {
                    let covariance = match fit.covariance(self.cfg.adjust_covariance) {
                        Ok(covariance) => Some(covariance),
                        Err(e) => {
                            debug!("rssi covariance: {}", e);
                            None
                        },
                    };
                    (
                        solution,
                        covariance,
                        Refinement::Refined {
                            iterations: fit.iterations,
                        },
                    )
                },
                Err(e) => {
                    warn!("rssi refinement failed: {}", e);
                    (consensus.solution, None, Refinement::Failed(e))
                },
            }
        } else {
            (consensus.solution, None, Refinement::NotRequested)
        };

        debug!(
            "rssi stage: power={:.3} dBm exponent={:.3} ({}/{} inliers, {} iterations)",
            solution.power_dbm,
            solution.exponent,
            consensus.inlier_indices().len(),
            observations.len(),
            consensus.iterations
        );

        Ok(RssiOutput {
            solution,
            covariance,
            report: report(consensus, refinement),
        })
    }
}
