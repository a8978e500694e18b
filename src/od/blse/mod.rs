/*
    Nyx, blazing fast astrodynamics
    Copyright (C) 2018-onwards Christopher Rabotin <christopher.rabotin@gmail.com>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use crate::io::ConfigRepr;
use crate::linalg::{DMatrix, DVector};
use crate::od::models::{ObservationModelSet, ObservationModelSettings};
use crate::od::partials::{numerical, EvaluatedObservation, PartialContext};
use crate::od::simulator::{ObservationSimulationSettings, ObservationSimulator};
use crate::od::{
    DimensionMismatchSnafu, Environment, LinkEndType, LinkEnds, ODError, ODPropSnafu,
    ObservableType, ObservationCollection, ObservationRecord, ParameterKind, ParameterSet,
    TooFewMeasurementsSnafu,
};
use crate::propagators::{Propagator, VariationalHistory};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use typed_builder::TypedBuilder;

mod solution;
pub use solution::{EstimationOutput, IterationRecord, Termination};

/// Solver of the normal equations
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Solver {
    /// Standard Normal Equations: (H^T W H) dx = H^T W dy
    #[default]
    #[serde(rename = "normal_equations")]
    NormalEquations,
    /// Levenberg-Marquardt: (H^T W H + lambda * D^T D) dx = H^T W dy
    #[serde(rename = "levenberg_marquardt")]
    LevenbergMarquardt,
}

/// Configuration of the batch least squares estimation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(default)]
#[builder(doc)]
pub struct EstimationConfig {
    #[builder(default)]
    pub solver: Solver,
    /// Maximum number of parameter corrections
    #[builder(default = 10)]
    pub max_iterations: usize,
    /// Convergence tolerance on the relative change of the residual RMS between two iterations
    #[builder(default = 1e-3)]
    pub relative_tolerance: f64,
    /// The estimation has converged when the residual RMS falls below this value
    #[builder(default = 1e-9)]
    pub absolute_tolerance: f64,
    #[builder(default = 3)]
    pub max_iterations_without_improvement: usize,
    /// Initial damping factor for Levenberg-Marquardt
    #[builder(default = 10.0)]
    pub lm_lambda_init: f64,
    /// Factor to decrease lambda by in LM
    #[builder(default = 10.0)]
    pub lm_lambda_decrease: f64,
    /// Factor to increase lambda by in LM
    #[builder(default = 10.0)]
    pub lm_lambda_increase: f64,
    #[builder(default = 1e-12)]
    pub lm_lambda_min: f64,
    #[builder(default = 1e12)]
    pub lm_lambda_max: f64,
    /// Use diagonal scaling (D = sqrt(diag(H^T W H))) in LM
    #[builder(default = true)]
    pub lm_use_diag_scaling: bool,
    /// Normal equations with a larger condition number, after column normalization, are degenerate
    #[builder(default = 1e14)]
    pub max_condition_number: f64,
    /// Compute the observations and partials of different epochs in parallel
    #[builder(default = true)]
    pub parallel: bool,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ConfigRepr for EstimationConfig {}

impl fmt::Display for EstimationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} with at most {} iterations (relative tolerance {:e}, absolute tolerance {:e})",
            self.solver, self.max_iterations, self.relative_tolerance, self.absolute_tolerance
        )
    }
}

/// Observations to fit and their weighting.
#[derive(Clone, Debug, TypedBuilder)]
pub struct EstimationInput {
    pub observations: ObservationCollection,
    /// Weight of each observable type, unity if absent. The weight of a record takes precedence.
    #[builder(default)]
    pub weights: IndexMap<ObservableType, f64>,
    /// Inverse of the a priori covariance of the parameters
    #[builder(default, setter(strip_option))]
    pub inverse_apriori_covariance: Option<DMatrix<f64>>,
    /// A priori parameters, the initial parameters if absent
    #[builder(default, setter(strip_option))]
    pub apriori_values: Option<DVector<f64>>,
}

impl EstimationInput {
    fn weight(&self, record: &ObservationRecord) -> f64 {
        record
            .weight
            .or_else(|| self.weights.get(&record.observable).copied())
            .unwrap_or(1.0)
    }
}

/// Normal equations at one parameter vector.
#[derive(Clone, Debug)]
struct Linearization {
    values: DVector<f64>,
    normal: DMatrix<f64>,
    rhs: DVector<f64>,
    rms: f64,
    residuals: Vec<Option<DVector<f64>>>,
}

impl Linearization {
    fn valid_count(&self) -> usize {
        self.residuals.iter().filter(|r| r.is_some()).count()
    }
}

/// Holds the environment, the observation models, the propagator and the estimated parameters,
/// and runs simulations and batch least squares estimations on them.
///
/// The parameter values live in the environment and in the propagator, and are only changed
/// between two linearizations.
#[derive(Debug)]
pub struct OrbitDeterminationManager {
    env: Environment,
    models: ObservationModelSet,
    propagator: Option<Box<dyn Propagator>>,
    params: ParameterSet,
    variational: Option<Arc<VariationalHistory>>,
    cancel: Arc<AtomicBool>,
}

impl OrbitDeterminationManager {
    /// Builds the manager and propagates the initial trajectory, if there is a propagator.
    pub fn new(
        env: Environment,
        models: ObservationModelSet,
        propagator: Option<Box<dyn Propagator>>,
        parameters: Vec<ParameterKind>,
    ) -> Result<Self, ODError> {
        let params = ParameterSet::new(parameters, &env, propagator.as_deref())?;
        let mut manager = Self {
            env,
            models,
            propagator,
            params,
            variational: None,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        manager.propagate()?;
        info!(
            "orbit determination of {} with {} observation models",
            manager.params,
            manager.models.len()
        );
        Ok(manager)
    }

    /// Builds the observation models from their settings, registering their corrections and
    /// biases in the environment.
    pub fn from_settings(
        mut env: Environment,
        model_settings: &[ObservationModelSettings],
        propagator: Option<Box<dyn Propagator>>,
        parameters: Vec<ParameterKind>,
    ) -> Result<Self, ODError> {
        let models = ObservationModelSet::from_settings(model_settings, &mut env)?;
        Self::new(env, models, propagator, parameters)
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn models(&self) -> &ObservationModelSet {
        &self.models
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    pub fn propagator(&self) -> Option<&dyn Propagator> {
        self.propagator.as_deref()
    }

    pub fn variational(&self) -> Option<&VariationalHistory> {
        self.variational.as_deref()
    }

    /// Setting this flag stops the estimation after the current iteration.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn propagate(&mut self) -> Result<(), ODError> {
        if let Some(prop) = &self.propagator {
            let result = prop.propagate(&self.env).context(ODPropSnafu)?;
            debug!(
                "propagated {} over [{}, {}] s",
                result.body,
                result.ephemeris.start_epoch_s(),
                result.ephemeris.end_epoch_s()
            );
            self.variational = Some(result.install(&mut self.env));
        }
        Ok(())
    }

    pub fn parameter_values(&self) -> Result<DVector<f64>, ODError> {
        self.params.values(&self.env, self.propagator.as_deref())
    }

    /// Sets the parameters, and propagates again if they change the trajectory.
    pub fn set_parameter_values(&mut self, values: &DVector<f64>) -> Result<(), ODError> {
        self.params
            .apply(values, &mut self.env, self.propagator.as_deref_mut())?;
        if self.params.affects_dynamics() {
            self.propagate()?;
        }
        Ok(())
    }

    /// Simulates observations with the current parameters.
    pub fn simulate_observations(
        &self,
        requests: &[ObservationSimulationSettings],
        simulator: &mut ObservationSimulator,
    ) -> Result<ObservationCollection, ODError> {
        simulator.simulate(requests, &self.models, &self.env)
    }

    /// Computes one observation and its analytic partials with the current parameters.
    pub fn evaluate(
        &self,
        observable: ObservableType,
        link_ends: &LinkEnds,
        epoch_s: f64,
        anchor: LinkEndType,
    ) -> Result<EvaluatedObservation, ODError> {
        let ctx = PartialContext::new(&self.env, self.variational.as_deref());
        self.models
            .get(observable, link_ends)?
            .evaluate(epoch_s, anchor, &self.params, &ctx)
    }

    /// Central difference partials of one observation, see [`numerical::central_difference`].
    pub fn central_difference(
        &mut self,
        observable: ObservableType,
        link_ends: &LinkEnds,
        epoch_s: f64,
        anchor: LinkEndType,
        steps: &[f64],
    ) -> Result<DMatrix<f64>, ODError> {
        let model = self.models.get(observable, link_ends)?;
        numerical::central_difference(
            model,
            epoch_s,
            anchor,
            &self.params,
            &mut self.env,
            self.propagator.as_deref_mut(),
            steps,
        )
    }

    fn linearize(
        &self,
        input: &EstimationInput,
        apriori_values: &DVector<f64>,
        parallel: bool,
    ) -> Result<Linearization, ODError> {
        let values = self.parameter_values()?;
        let ctx = PartialContext::new(&self.env, self.variational.as_deref());
        let evaluate = |record: &ObservationRecord| -> Result<EvaluatedObservation, ODError> {
            self.models
                .get(record.observable, &record.link_ends)?
                .evaluate(record.epoch_s(), record.anchor, &self.params, &ctx)
        };
        let records = &input.observations.records;
        let evaluated: Vec<_> = if parallel {
            records.par_iter().map(evaluate).collect()
        } else {
            records.iter().map(evaluate).collect()
        };

        let n = self.params.size();
        let mut normal = DMatrix::zeros(n, n);
        let mut rhs = DVector::zeros(n);
        let mut sum_sq = 0.0;
        let mut count = 0;
        let mut residuals = Vec::with_capacity(records.len());

        for (record, result) in records.iter().zip(evaluated) {
            match result {
                Ok(computed) => {
                    ensure!(
                        record.value.len() == computed.value.len(),
                        DimensionMismatchSnafu {
                            action: "observed value",
                            expected: computed.value.len(),
                            got: record.value.len(),
                        }
                    );
                    let residual = &record.value - &computed.value;
                    let weight = input.weight(record);
                    let jt = computed.jacobian.transpose();
                    normal += &jt * &computed.jacobian * weight;
                    rhs += &jt * &residual * weight;
                    sum_sq += weight * residual.norm_squared();
                    count += residual.len();
                    residuals.push(Some(residual));
                }
                Err(e) if e.is_epoch_recoverable() => {
                    warn!("excluding {record}: {e}");
                    residuals.push(None);
                }
                Err(e) => return Err(e),
            }
        }

        ensure!(
            count > 0,
            TooFewMeasurementsSnafu {
                need: 1_usize,
                action: "a linearization"
            }
        );

        if let Some(p_inv) = &input.inverse_apriori_covariance {
            normal += p_inv;
            rhs += p_inv * (apriori_values - &values);
        }

        Ok(Linearization {
            values,
            normal,
            rhs,
            rms: (sum_sq / count as f64).sqrt(),
            residuals,
        })
    }

    /// Estimates the parameters from the observations with batch least squares.
    ///
    /// Each iteration computes every observation and its partials with the current parameters,
    /// then solves the normal equations for a correction. Epochs which cannot be computed are
    /// excluded from that iteration only. On return, the manager holds the parameters of the
    /// output, which are the last accepted ones whose residuals were computed. Once a first
    /// linearization succeeded, a later failure stops the estimation with [`Termination::Failed`]
    /// instead of an error.
    pub fn estimate(
        &mut self,
        input: &EstimationInput,
        config: &EstimationConfig,
    ) -> Result<EstimationOutput, ODError> {
        let n = self.params.size();
        let measurements = input.observations.measurement_count();
        ensure!(
            !input.observations.is_empty()
                && (measurements >= n || input.inverse_apriori_covariance.is_some()),
            TooFewMeasurementsSnafu {
                need: n.max(1),
                action: "an estimation without a priori"
            }
        );
        if let Some(p_inv) = &input.inverse_apriori_covariance {
            ensure!(
                p_inv.nrows() == n && p_inv.ncols() == n,
                DimensionMismatchSnafu {
                    action: "inverse a priori covariance",
                    expected: n * n,
                    got: p_inv.len(),
                }
            );
        }
        let apriori_values = match &input.apriori_values {
            Some(values) => {
                ensure!(
                    values.len() == n,
                    DimensionMismatchSnafu {
                        action: "a priori parameters",
                        expected: n,
                        got: values.len(),
                    }
                );
                values.clone()
            }
            None => self.parameter_values()?,
        };

        info!(
            "estimating {} from {} observations ({measurements} measurements) with {config}",
            self.params,
            input.observations.len(),
        );

        let mut lambda = config.lm_lambda_init;
        let mut accepted: Option<Linearization> = None;
        let mut iterations = Vec::new();
        let mut best_rms = f64::INFINITY;
        let mut stale = 0;
        let mut iteration = 0;

        let termination = loop {
            if iteration > 0 && self.cancel.load(Ordering::Relaxed) {
                info!("estimation cancelled after {iteration} iterations");
                break Termination::Cancelled;
            }

            let lin = match self.linearize(input, &apriori_values, config.parallel) {
                Ok(lin) => lin,
                Err(e) if accepted.is_some() => {
                    warn!("iteration {iteration} failed, stopping: {e}");
                    break Termination::Failed {
                        reason: e.to_string(),
                    };
                }
                Err(e) => return Err(e),
            };
            info!(
                "[{iteration}/{}] RMS {:.6e} over {}/{} observations",
                config.max_iterations,
                lin.rms,
                lin.valid_count(),
                input.observations.len()
            );
            let mut record = IterationRecord {
                iteration,
                values: lin.values.clone(),
                rms: lin.rms,
                valid_observations: lin.valid_count(),
                correction: None,
                lambda: None,
                accepted: true,
            };

            let rejected = config.solver == Solver::LevenbergMarquardt
                && accepted.as_ref().is_some_and(|prev| lin.rms > prev.rms);

            let mut converged = false;
            if rejected {
                record.accepted = false;
                lambda = (lambda * config.lm_lambda_increase).min(config.lm_lambda_max);
                stale += 1;
                debug!("LM: step rejected, increasing lambda to {lambda:e}");
            } else {
                if let Some(prev) = &accepted {
                    let change = (prev.rms - lin.rms).abs() / prev.rms.max(f64::MIN_POSITIVE);
                    converged = change < config.relative_tolerance;
                    if config.solver == Solver::LevenbergMarquardt {
                        lambda = (lambda / config.lm_lambda_decrease).max(config.lm_lambda_min);
                    }
                }
                converged |= lin.rms < config.absolute_tolerance;
                if lin.rms < best_rms {
                    best_rms = lin.rms;
                    stale = 0;
                } else {
                    stale += 1;
                }
                accepted = Some(lin);
            }

            if converged {
                iterations.push(record);
                break Termination::Converged;
            }
            if stale >= config.max_iterations_without_improvement {
                iterations.push(record);
                warn!("no improvement of the RMS in {stale} iterations");
                break Termination::NoImprovement;
            }
            if iteration >= config.max_iterations {
                iterations.push(record);
                break Termination::MaxIterations;
            }

            // Always Some: the first linearization cannot be rejected
            if let Some(base) = &accepted {
                let damping = (config.solver == Solver::LevenbergMarquardt).then_some(lambda);
                match solve_normal_equations(base, config, damping) {
                    Ok(correction) => {
                        let next = &base.values + &correction;
                        record.lambda = damping;
                        record.correction = Some(correction);
                        iterations.push(record);
                        if let Err(e) = self.set_parameter_values(&next) {
                            warn!("could not apply the correction, stopping: {e}");
                            break Termination::Failed {
                                reason: e.to_string(),
                            };
                        }
                    }
                    Err(condition_number) => {
                        warn!(
                            "normal equations are singular (condition number {condition_number:e}), stopping with the last parameters"
                        );
                        iterations.push(record);
                        break Termination::Degenerate { condition_number };
                    }
                }
            }
            iteration += 1;
        };

        let last = match accepted {
            Some(lin) => lin,
            None => {
                return TooFewMeasurementsSnafu {
                    need: 1_usize,
                    action: "an estimation",
                }
                .fail()
            }
        };
        if self.parameter_values()? != last.values {
            self.set_parameter_values(&last.values)?;
        }

        let covariance = last.normal.clone().try_inverse();
        if covariance.is_none() {
            warn!("final normal matrix is singular, no covariance available");
        }
        info!(
            "estimation {termination} after {} iterations, RMS {:.6e}",
            iterations.len(),
            last.rms
        );

        Ok(EstimationOutput {
            parameters: self.params.iter().map(|p| p.kind.clone()).collect(),
            column_names: self.params.column_names(),
            values: last.values,
            covariance,
            iterations,
            valid: last.residuals.iter().map(|r| r.is_some()).collect(),
            residuals: last.residuals,
            rms: last.rms,
            termination,
        })
    }
}

/// Solves the normal equations after normalizing their columns, returning the condition number
/// of the normalized matrix if it is degenerate.
fn solve_normal_equations(
    lin: &Linearization,
    config: &EstimationConfig,
    damping: Option<f64>,
) -> Result<DVector<f64>, f64> {
    let n = lin.normal.nrows();
    let scale = lin
        .normal
        .diagonal()
        .map(|d| if d > 0.0 { 1.0 / d.sqrt() } else { 1.0 });
    let mut scaled = DMatrix::from_fn(n, n, |i, j| lin.normal[(i, j)] * scale[i] * scale[j]);
    let scaled_rhs = lin.rhs.component_mul(&scale);

    let singular_values = scaled.singular_values();
    let min = singular_values.min();
    let condition_number = if min > 0.0 {
        singular_values.max() / min
    } else {
        f64::INFINITY
    };
    if !(condition_number <= config.max_condition_number) {
        return Err(condition_number);
    }
    trace!("normalized condition number {condition_number:e}");

    if let Some(lambda) = damping {
        for i in 0..n {
            let d_sq = if config.lm_use_diag_scaling {
                scaled[(i, i)]
            } else {
                scale[i].powi(2)
            };
            scaled[(i, i)] += lambda * d_sq;
        }
    }

    match scaled.cholesky() {
        Some(chol) => Ok(chol.solve(&scaled_rhs).component_mul(&scale)),
        None => Err(condition_number),
    }
}
