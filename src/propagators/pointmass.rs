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

use super::rk::{rk_step, RK4Fixed};
use super::{
    DynamicsSnafu, InvalidSpanSnafu, InvalidStepSnafu, NonFiniteSnafu, PropEphemerisSnafu,
    PropagationError, PropagationResult, Propagator, VariationalHistory,
};
use crate::cosmic::{position, CartesianState, TabulatedEphemeris};
use crate::dynamics::{DynamicsError, PointMasses};
use crate::io::ConfigRepr;
use crate::linalg::{DMatrix, DVector, Matrix3, Matrix6};
use crate::od::Environment;
use serde_derive::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};
use typed_builder::TypedBuilder;

/// Configuration of a [`PointMassPropagator`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct PropagatorSettings {
    pub body: String,
    pub attractors: Vec<String>,
    pub start_epoch_s: f64,
    pub end_epoch_s: f64,
    #[builder(default = 60.0)]
    #[serde(default = "default_step_s")]
    pub step_s: f64,
    /// Position (km) and velocity (km/s) at the start epoch
    pub initial_state: [f64; 6],
}

fn default_step_s() -> f64 {
    60.0
}

impl ConfigRepr for PropagatorSettings {}

/// Propagates one body under the point mass gravity of its attractors with a fixed step RK4,
/// together with its state transition matrix and its sensitivity to the gravitational parameters
/// of the attractors.
#[derive(Clone, Debug, PartialEq)]
pub struct PointMassPropagator {
    body: String,
    dynamics: PointMasses,
    start_epoch_s: f64,
    end_epoch_s: f64,
    step_s: f64,
    initial_state: CartesianState,
}

impl PointMassPropagator {
    pub fn new(
        body: impl Into<String>,
        dynamics: PointMasses,
        span_s: (f64, f64),
        step_s: f64,
        initial_state: CartesianState,
    ) -> Result<Self, PropagationError> {
        let body = body.into();
        ensure!(
            step_s > 0.0 && step_s.is_finite(),
            InvalidStepSnafu { step_s }
        );
        let (start_s, end_s) = span_s;
        ensure!(end_s > start_s, InvalidSpanSnafu { start_s, end_s });
        if dynamics.attractors.contains(&body) {
            return Err(PropagationError::Dynamics {
                source: DynamicsError::SelfAttraction { body },
            });
        }
        Ok(Self {
            body,
            dynamics,
            start_epoch_s: start_s,
            end_epoch_s: end_s,
            step_s,
            initial_state,
        })
    }

    pub fn from_settings(settings: &PropagatorSettings) -> Result<Self, PropagationError> {
        Self::new(
            settings.body.clone(),
            PointMasses {
                attractors: settings.attractors.clone(),
            },
            (settings.start_epoch_s, settings.end_epoch_s),
            settings.step_s,
            CartesianState::from_column_slice(&settings.initial_state),
        )
    }

    pub fn dynamics(&self) -> &PointMasses {
        &self.dynamics
    }

    /// Time derivative of the augmented state [x, Φ, S], all matrices stored column major.
    fn derivative(
        &self,
        epoch_s: f64,
        y: &DVector<f64>,
        env: &Environment,
    ) -> Result<DVector<f64>, PropagationError> {
        let n_gm = self.dynamics.attractors.len();
        let state = CartesianState::from_column_slice(&y.as_slice()[..6]);
        ensure!(
            state.iter().all(|x| x.is_finite()),
            NonFiniteSnafu {
                body: self.body.clone(),
                epoch_s
            }
        );
        let radius = position(&state);

        let (acc, grad) = self
            .dynamics
            .dual_eom(epoch_s, &radius, env)
            .context(DynamicsSnafu)?;
        let gm_partials = self
            .dynamics
            .gm_partials(epoch_s, &radius, env)
            .context(DynamicsSnafu)?;

        // A = [[0, I], [∂a/∂r, 0]]
        let mut a_mat = Matrix6::zeros();
        a_mat
            .fixed_view_mut::<3, 3>(0, 3)
            .copy_from(&Matrix3::identity());
        a_mat.fixed_view_mut::<3, 3>(3, 0).copy_from(&grad);

        let stm = Matrix6::from_column_slice(&y.as_slice()[6..42]);
        let stm_dot = a_mat * stm;

        let sens = DMatrix::from_column_slice(6, n_gm, &y.as_slice()[42..]);
        let mut sens_dot = DMatrix::from_column_slice(6, 6, a_mat.as_slice()) * sens;
        for (j, partial) in gm_partials.iter().enumerate() {
            for i in 0..3 {
                sens_dot[(i + 3, j)] += partial[i];
            }
        }

        let mut dy = DVector::zeros(y.len());
        for i in 0..3 {
            dy[i] = state[i + 3];
            dy[i + 3] = acc[i];
        }
        dy.as_mut_slice()[6..42].copy_from_slice(stm_dot.as_slice());
        dy.as_mut_slice()[42..].copy_from_slice(sens_dot.as_slice());
        Ok(dy)
    }
}

impl Propagator for PointMassPropagator {
    fn body(&self) -> &str {
        &self.body
    }

    fn attractors(&self) -> &[String] {
        &self.dynamics.attractors
    }

    fn initial_state(&self) -> CartesianState {
        self.initial_state
    }

    fn set_initial_state(&mut self, state: CartesianState) {
        self.initial_state = state;
    }

    fn span(&self) -> (f64, f64) {
        (self.start_epoch_s, self.end_epoch_s)
    }

    fn propagate(&self, env: &Environment) -> Result<PropagationResult, PropagationError> {
        let n_gm = self.dynamics.attractors.len();
        let duration_s = self.end_epoch_s - self.start_epoch_s;
        // Uniform steps, no longer than the configured step, landing exactly on the end epoch
        let steps = (duration_s / self.step_s).ceil().max(1.0) as usize;
        let step_s = duration_s / steps as f64;

        let mut y = DVector::zeros(42 + 6 * n_gm);
        y.as_mut_slice()[..6].copy_from_slice(self.initial_state.as_slice());
        y.as_mut_slice()[6..42].copy_from_slice(Matrix6::<f64>::identity().as_slice());

        let mut epochs_s = Vec::with_capacity(steps + 1);
        let mut states = Vec::with_capacity(steps + 1);
        let mut derivatives = Vec::with_capacity(steps + 1);
        let mut stms = Vec::with_capacity(steps + 1);
        let mut stm_dots = Vec::with_capacity(steps + 1);
        let mut sensitivities = Vec::with_capacity(steps + 1);
        let mut sensitivity_dots = Vec::with_capacity(steps + 1);

        for k in 0..=steps {
            let epoch_s = self.start_epoch_s + k as f64 * step_s;
            let dy = self.derivative(epoch_s, &y, env)?;

            epochs_s.push(epoch_s);
            states.push(CartesianState::from_column_slice(&y.as_slice()[..6]));
            derivatives.push(CartesianState::from_column_slice(&dy.as_slice()[..6]));
            stms.push(Matrix6::from_column_slice(&y.as_slice()[6..42]));
            stm_dots.push(Matrix6::from_column_slice(&dy.as_slice()[6..42]));
            sensitivities.push(DMatrix::from_column_slice(6, n_gm, &y.as_slice()[42..]));
            sensitivity_dots.push(DMatrix::from_column_slice(6, n_gm, &dy.as_slice()[42..]));

            if k < steps {
                y = rk_step::<RK4Fixed, _, _>(epoch_s, &y, step_s, dy, |t, yi| {
                    self.derivative(t, yi, env)
                })?;
            }
        }

        debug!(
            "propagated {} over [{}, {}] s in {steps} steps of {step_s} s",
            self.body, self.start_epoch_s, self.end_epoch_s
        );

        let ephemeris =
            TabulatedEphemeris::new(self.body.clone(), epochs_s.clone(), states, derivatives)
                .context(PropEphemerisSnafu)?;

        Ok(PropagationResult {
            body: self.body.clone(),
            ephemeris,
            variational: VariationalHistory {
                body: self.body.clone(),
                gm_bodies: self.dynamics.attractors.clone(),
                epochs_s,
                stms,
                stm_dots,
                sensitivities,
                sensitivity_dots,
            },
        })
    }
}

#[cfg(test)]
mod ut_pointmass {
    use super::*;
    use crate::cosmic::{Body, ConstantEphemeris, Ephemeris};
    use crate::linalg::{Vector3, Vector6};
    use std::sync::Arc;

    const GM_EARTH: f64 = 398_600.435_436;

    fn setup() -> (Environment, PointMassPropagator) {
        let env = Environment::new().with_body(Body::new(
            "Earth",
            GM_EARTH,
            Arc::new(ConstantEphemeris::new(Vector3::zeros())),
        ));
        let prop = PointMassPropagator::from_settings(
            &PropagatorSettings::builder()
                .body("sat".to_string())
                .attractors(vec!["Earth".to_string()])
                .start_epoch_s(0.0)
                .end_epoch_s(3000.0)
                .step_s(10.0)
                .initial_state([7000.0, 0.0, 0.0, 0.0, 7.546, 0.5])
                .build(),
        )
        .unwrap();
        (env, prop)
    }

    #[test]
    fn conserves_energy() {
        let (env, prop) = setup();
        let result = prop.propagate(&env).unwrap();
        let energy = |s: &Vector6<f64>| {
            0.5 * s.fixed_rows::<3>(3).norm_squared() - GM_EARTH / s.fixed_rows::<3>(0).norm()
        };
        let e0 = energy(&prop.initial_state());
        let ef = energy(&result.ephemeris.state(3000.0).unwrap());
        assert!(((ef - e0) / e0).abs() < 1e-8, "{e0} {ef}");
        assert_eq!(result.ephemeris.len(), 301);
    }

    #[test]
    fn stm_and_sensitivity_match_finite_differences() {
        let (env, mut prop) = setup();
        let nominal = prop.propagate(&env).unwrap();
        let epoch_s = 1234.5;
        let stm = nominal.variational.stm(epoch_s).unwrap();

        let x0 = prop.initial_state();
        for (j, h) in [(0, 1e-2), (4, 1e-5)] {
            let mut plus = x0;
            let mut minus = x0;
            plus[j] += h;
            minus[j] -= h;
            prop.set_initial_state(plus);
            let xp = prop.propagate(&env).unwrap().ephemeris.state(epoch_s).unwrap();
            prop.set_initial_state(minus);
            let xm = prop.propagate(&env).unwrap().ephemeris.state(epoch_s).unwrap();
            let fd = (xp - xm) / (2.0 * h);
            for i in 0..6 {
                assert!(
                    (fd[i] - stm[(i, j)]).abs() < 1e-6 * stm.column(j).amax().max(1.0),
                    "Φ[{i},{j}]: {} vs {}",
                    fd[i],
                    stm[(i, j)]
                );
            }
        }
        prop.set_initial_state(x0);

        let sens = nominal.variational.gm_sensitivity("Earth", epoch_s).unwrap();
        let h = 1.0;
        let mut env_p = env.clone();
        env_p.body_mut("Earth").unwrap().gm_km3_s2 += h;
        let mut env_m = env.clone();
        env_m.body_mut("Earth").unwrap().gm_km3_s2 -= h;
        let xp = prop.propagate(&env_p).unwrap().ephemeris.state(epoch_s).unwrap();
        let xm = prop.propagate(&env_m).unwrap().ephemeris.state(epoch_s).unwrap();
        let fd = (xp - xm) / (2.0 * h);
        for i in 0..6 {
            assert!((fd[i] - sens[i]).abs() < 1e-6 * sens.amax(), "S[{i}]");
        }
        assert_eq!(
            nominal.variational.gm_sensitivity("Moon", epoch_s).unwrap(),
            Vector6::zeros()
        );
        assert!(nominal.variational.stm(4000.0).is_err());
    }

    #[test]
    fn invalid_settings() {
        let dynamics = PointMasses::new(&["Earth"]);
        let state = CartesianState::zeros();
        assert!(matches!(
            PointMassPropagator::new("sat", dynamics.clone(), (0.0, 10.0), 0.0, state),
            Err(PropagationError::InvalidStep { .. })
        ));
        assert!(matches!(
            PointMassPropagator::new("sat", dynamics.clone(), (10.0, 0.0), 1.0, state),
            Err(PropagationError::InvalidSpan { .. })
        ));
        assert!(matches!(
            PointMassPropagator::new("Earth", dynamics, (0.0, 10.0), 1.0, state),
            Err(PropagationError::Dynamics { .. })
        ));
    }
}
