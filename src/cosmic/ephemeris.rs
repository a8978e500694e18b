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

use super::{
    cartesian, position, velocity, CartesianState, Ephemeris, EphemerisError,
    InvalidTableSnafu, OutOfSpanSnafu,
};
use crate::linalg::Vector3;
use crate::polyfit::{bracket, HermiteBasis};
use snafu::ensure;

/// A body that never moves
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConstantEphemeris {
    pub state: CartesianState,
}

impl ConstantEphemeris {
    pub fn new(position_km: Vector3<f64>) -> Self {
        Self {
            state: cartesian(&position_km, &Vector3::zeros()),
        }
    }
}

impl Ephemeris for ConstantEphemeris {
    fn state(&self, _epoch_s: f64) -> Result<CartesianState, EphemerisError> {
        Ok(self.state)
    }
}

/// Rectilinear motion at a constant velocity.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LinearEphemeris {
    pub reference_epoch_s: f64,
    pub reference_state: CartesianState,
}

impl LinearEphemeris {
    pub fn new(reference_epoch_s: f64, reference_state: CartesianState) -> Self {
        Self {
            reference_epoch_s,
            reference_state,
        }
    }
}

impl Ephemeris for LinearEphemeris {
    fn state(&self, epoch_s: f64) -> Result<CartesianState, EphemerisError> {
        let v = velocity(&self.reference_state);
        let r = position(&self.reference_state) + v * (epoch_s - self.reference_epoch_s);
        Ok(cartesian(&r, &v))
    }
}

/// A state history interpolated with cubic Hermite polynomials.
///
/// Positions are interpolated from the tabulated positions and velocities, and velocities from
/// the tabulated velocities and accelerations, i.e. `derivatives[i]` is the time derivative of
/// `states[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct TabulatedEphemeris {
    name: String,
    epochs_s: Vec<f64>,
    states: Vec<CartesianState>,
    derivatives: Vec<CartesianState>,
}

impl TabulatedEphemeris {
    pub fn new(
        name: impl Into<String>,
        epochs_s: Vec<f64>,
        states: Vec<CartesianState>,
        derivatives: Vec<CartesianState>,
    ) -> Result<Self, EphemerisError> {
        let name = name.into();
        ensure!(
            epochs_s.len() >= 2,
            InvalidTableSnafu {
                name: name.clone(),
                details: format!("{} samples, need at least two", epochs_s.len())
            }
        );
        ensure!(
            epochs_s.len() == states.len() && states.len() == derivatives.len(),
            InvalidTableSnafu {
                name: name.clone(),
                details: format!(
                    "{} epochs, {} states, {} derivatives",
                    epochs_s.len(),
                    states.len(),
                    derivatives.len()
                )
            }
        );
        ensure!(
            epochs_s.windows(2).all(|w| w[1] > w[0]),
            InvalidTableSnafu {
                name: name.clone(),
                details: "epochs are not strictly increasing".to_string()
            }
        );

        Ok(Self {
            name,
            epochs_s,
            states,
            derivatives,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_epoch_s(&self) -> f64 {
        self.epochs_s[0]
    }

    pub fn end_epoch_s(&self) -> f64 {
        self.epochs_s[self.epochs_s.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.epochs_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs_s.is_empty()
    }

    /// Tabulated epochs, in seconds past J2000 TDB
    pub fn epochs_s(&self) -> &[f64] {
        &self.epochs_s
    }
}

impl Ephemeris for TabulatedEphemeris {
    fn state(&self, epoch_s: f64) -> Result<CartesianState, EphemerisError> {
        let idx = bracket(&self.epochs_s, epoch_s).ok_or_else(|| {
            OutOfSpanSnafu {
                name: self.name.clone(),
                epoch_s,
                start_s: self.start_epoch_s(),
                end_s: self.end_epoch_s(),
            }
            .build()
        })?;

        let basis = HermiteBasis::new(self.epochs_s[idx], self.epochs_s[idx + 1], epoch_s);
        Ok(basis.interpolate(
            &self.states[idx],
            &self.derivatives[idx],
            &self.states[idx + 1],
            &self.derivatives[idx + 1],
        ))
    }
}

#[cfg(test)]
mod ut_ephemeris {
    use super::*;

    fn circular(epoch_s: f64) -> (CartesianState, CartesianState) {
        let (r, w) = (7000.0, 1e-3);
        let (s, c) = (w * epoch_s).sin_cos();
        let state = CartesianState::new(r * c, r * s, 0.0, -r * w * s, r * w * c, 0.0);
        let deriv = CartesianState::new(
            -r * w * s,
            r * w * c,
            0.0,
            -r * w * w * c,
            -r * w * w * s,
            0.0,
        );
        (state, deriv)
    }

    #[test]
    fn tabulated_circular_motion() {
        let epochs_s: Vec<f64> = (0..=100).map(|i| i as f64 * 30.0).collect();
        let (states, derivatives): (Vec<_>, Vec<_>) =
            epochs_s.iter().map(|t| circular(*t)).unzip();
        let eph = TabulatedEphemeris::new("sat", epochs_s, states, derivatives).unwrap();

        for t in [0.0, 15.0, 1234.5, 2999.9, 3000.0] {
            let err = eph.state(t).unwrap() - circular(t).0;
            assert!(position(&err).norm() < 1e-4, "{t}: {err}");
        }

        assert_eq!(
            eph.state(3000.1),
            Err(EphemerisError::OutOfSpan {
                name: "sat".to_string(),
                epoch_s: 3000.1,
                start_s: 0.0,
                end_s: 3000.0
            })
        );
    }

    #[test]
    fn invalid_tables() {
        let s = CartesianState::zeros();
        assert!(TabulatedEphemeris::new("x", vec![0.0], vec![s], vec![s]).is_err());
        assert!(TabulatedEphemeris::new("x", vec![0.0, 1.0], vec![s], vec![s, s]).is_err());
        assert!(TabulatedEphemeris::new("x", vec![1.0, 0.0], vec![s, s], vec![s, s]).is_err());
    }

    #[test]
    fn linear_motion() {
        let eph = LinearEphemeris::new(10.0, CartesianState::new(1.0, 2.0, 3.0, 0.1, 0.0, -0.1));
        let state = eph.state(20.0).unwrap();
        assert_eq!(state, CartesianState::new(2.0, 2.0, 2.0, 0.1, 0.0, -0.1));
    }
}
