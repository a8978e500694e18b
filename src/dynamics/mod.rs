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

use crate::cosmic::{position, CartesianState, EphemerisError};
use crate::linalg::{Matrix3, Vector3, U4};
use crate::od::Environment;
use hyperdual::linalg::norm;
use hyperdual::{hyperspace_from_vector, Float, OHyperdual};
use snafu::prelude::*;

#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DynamicsError {
    #[snafu(display("dynamics could not fetch the state of an attractor: {source}"))]
    DynamicsEphemeris { source: EphemerisError },
    #[snafu(display("{body} is both propagated and an attractor"))]
    SelfAttraction { body: String },
    #[snafu(display("singular gravity field of {body} at {epoch_s} s (distance {distance_km} km)"))]
    Singularity {
        body: String,
        epoch_s: f64,
        distance_km: f64,
    },
}

/// Point mass gravity of any number of attractors, whose states are read from the environment.
///
/// The frame is inertial, so the acceleration has no indirect term.
#[derive(Clone, Debug, PartialEq)]
pub struct PointMasses {
    pub attractors: Vec<String>,
}

impl PointMasses {
    pub fn new(attractors: &[&str]) -> Self {
        Self {
            attractors: attractors.iter().map(|name| name.to_string()).collect(),
        }
    }

    /// Position of the particle relative to each attractor, with the attractor's gravitational
    /// parameter.
    fn relative_positions(
        &self,
        epoch_s: f64,
        radius: &Vector3<f64>,
        env: &Environment,
    ) -> Result<Vec<(f64, Vector3<f64>)>, DynamicsError> {
        let mut rels = Vec::with_capacity(self.attractors.len());
        for name in &self.attractors {
            let body = env.body(name).context(DynamicsEphemerisSnafu)?;
            let rel = radius - position(&body.state(epoch_s).context(DynamicsEphemerisSnafu)?);
            let distance_km = rel.norm();
            ensure!(
                distance_km > 0.0 && distance_km.is_finite(),
                SingularitySnafu {
                    body: name.clone(),
                    epoch_s,
                    distance_km
                }
            );
            rels.push((body.gm_km3_s2, rel));
        }
        Ok(rels)
    }

    /// Equations of motion: the time derivative of the Cartesian state.
    pub fn eom(
        &self,
        epoch_s: f64,
        state: &CartesianState,
        env: &Environment,
    ) -> Result<CartesianState, DynamicsError> {
        let mut d_x = CartesianState::zeros();
        d_x.fixed_rows_mut::<3>(0).copy_from(&state.fixed_rows::<3>(3));
        for (gm, rel) in self.relative_positions(epoch_s, &position(state), env)? {
            let acc = -gm / rel.norm().powi(3) * rel;
            for i in 0..3 {
                d_x[i + 3] += acc[i];
            }
        }
        Ok(d_x)
    }

    /// Acceleration and its gradient with respect to the position, computed with hyperdual numbers.
    pub fn dual_eom(
        &self,
        epoch_s: f64,
        radius: &Vector3<f64>,
        env: &Environment,
    ) -> Result<(Vector3<f64>, Matrix3<f64>), DynamicsError> {
        let mut fx = Vector3::zeros();
        let mut grad = Matrix3::zeros();

        for (gm, rel) in self.relative_positions(epoch_s, radius, env)? {
            // The attractor position is constant, so the dual parts of rel are those of the radius
            let rel_d: Vector3<OHyperdual<f64, U4>> = hyperspace_from_vector(&rel);
            let rmag3 = norm(&rel_d).powi(3);
            let acc_d = rel_d * (OHyperdual::<f64, U4>::from_real(-gm) / rmag3);

            for i in 0..3 {
                fx[i] += acc_d[i].real();
                for j in 1..4 {
                    grad[(i, j - 1)] += acc_d[i][j];
                }
            }
        }

        Ok((fx, grad))
    }

    /// Partial of the acceleration with respect to the gravitational parameter of each attractor,
    /// in the order of the attractors.
    pub fn gm_partials(
        &self,
        epoch_s: f64,
        radius: &Vector3<f64>,
        env: &Environment,
    ) -> Result<Vec<Vector3<f64>>, DynamicsError> {
        Ok(self
            .relative_positions(epoch_s, radius, env)?
            .into_iter()
            .map(|(_, rel)| -rel / rel.norm().powi(3))
            .collect())
    }
}
