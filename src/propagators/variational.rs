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

use crate::cosmic::{EphemerisError, OutOfSpanSnafu};
use crate::linalg::{DMatrix, Matrix6, Vector6};
use crate::polyfit::{bracket, HermiteBasis};

/// History of the solutions of the variational equations of one propagated body: the state
/// transition matrix Φ(t, t0) and the sensitivity S(t) = ∂x(t)/∂μ to the gravitational parameter
/// of each attractor.
///
/// Both are interpolated with cubic Hermite polynomials from their tabulated values and time
/// derivatives, on the same nodes as the state history.
#[derive(Clone, Debug, PartialEq)]
pub struct VariationalHistory {
    pub(crate) body: String,
    pub(crate) gm_bodies: Vec<String>,
    pub(crate) epochs_s: Vec<f64>,
    pub(crate) stms: Vec<Matrix6<f64>>,
    pub(crate) stm_dots: Vec<Matrix6<f64>>,
    pub(crate) sensitivities: Vec<DMatrix<f64>>,
    pub(crate) sensitivity_dots: Vec<DMatrix<f64>>,
}

impl VariationalHistory {
    /// Name of the propagated body
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Bodies whose gravitational parameter has a sensitivity, in column order
    pub fn gm_bodies(&self) -> &[String] {
        &self.gm_bodies
    }

    pub fn start_epoch_s(&self) -> f64 {
        self.epochs_s[0]
    }

    pub fn end_epoch_s(&self) -> f64 {
        self.epochs_s[self.epochs_s.len() - 1]
    }

    fn basis(&self, epoch_s: f64) -> Result<(usize, HermiteBasis), EphemerisError> {
        let idx = bracket(&self.epochs_s, epoch_s).ok_or_else(|| {
            OutOfSpanSnafu {
                name: format!("{} variational history", self.body),
                epoch_s,
                start_s: self.start_epoch_s(),
                end_s: self.end_epoch_s(),
            }
            .build()
        })?;
        Ok((
            idx,
            HermiteBasis::new(self.epochs_s[idx], self.epochs_s[idx + 1], epoch_s),
        ))
    }

    /// State transition matrix from the initial epoch to the provided epoch.
    pub fn stm(&self, epoch_s: f64) -> Result<Matrix6<f64>, EphemerisError> {
        let (idx, basis) = self.basis(epoch_s)?;
        Ok(basis.interpolate(
            &self.stms[idx],
            &self.stm_dots[idx],
            &self.stms[idx + 1],
            &self.stm_dots[idx + 1],
        ))
    }

    /// Sensitivity of the state to the gravitational parameter of this body, which is zero if the
    /// body does not attract the propagated body.
    pub fn gm_sensitivity(
        &self,
        gm_body: &str,
        epoch_s: f64,
    ) -> Result<Vector6<f64>, EphemerisError> {
        let (idx, basis) = self.basis(epoch_s)?;
        match self.gm_bodies.iter().position(|name| name == gm_body) {
            Some(col) => {
                let column =
                    |m: &DMatrix<f64>| Vector6::from_iterator(m.column(col).iter().copied());
                Ok(basis.interpolate(
                    &column(&self.sensitivities[idx]),
                    &column(&self.sensitivity_dots[idx]),
                    &column(&self.sensitivities[idx + 1]),
                    &column(&self.sensitivity_dots[idx + 1]),
                ))
            }
            None => Ok(Vector6::zeros()),
        }
    }
}
