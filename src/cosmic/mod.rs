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

use crate::linalg::{Vector3, Vector6};
use crate::time::Epoch;
use snafu::prelude::*;
use std::fmt;

mod bodies;
pub use bodies::Body;

mod ephemeris;
pub use ephemeris::{ConstantEphemeris, LinearEphemeris, TabulatedEphemeris};

mod rotations;
pub use rotations::{ConstantRotation, RotationModel, SimpleRotation};

/// Speed of light in vacuum, in km/s. Every link in this crate propagates at this speed.
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Cartesian position (km) and velocity (km/s) in the inertial frame.
pub type CartesianState = Vector6<f64>;

#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EphemerisError {
    #[snafu(display("no body named `{name}` in the environment"))]
    UnknownBody { name: String },
    #[snafu(display("no station `{station}` on `{body}`"))]
    UnknownStation { body: String, station: String },
    #[snafu(display(
        "{epoch_s} s past J2000 TDB is outside of the ephemeris span of {name} [{start_s}, {end_s}]"
    ))]
    OutOfSpan {
        name: String,
        epoch_s: f64,
        start_s: f64,
        end_s: f64,
    },
    #[snafu(display("invalid tabulated ephemeris for {name}: {details}"))]
    InvalidTable { name: String, details: String },
}

/// A state provider: maps a time to the inertial state of a body's center.
///
/// Implementations must be deterministic and free of side effects for a fixed parameter set.
pub trait Ephemeris: Send + Sync + fmt::Debug {
    /// Returns the inertial state at the provided time, in seconds past J2000 TDB.
    fn state(&self, epoch_s: f64) -> Result<CartesianState, EphemerisError>;
}

/// Returns the position part of a Cartesian state.
pub fn position(state: &CartesianState) -> Vector3<f64> {
    state.fixed_rows::<3>(0).into_owned()
}

/// Returns the velocity part of a Cartesian state.
pub fn velocity(state: &CartesianState) -> Vector3<f64> {
    state.fixed_rows::<3>(3).into_owned()
}

/// Builds a Cartesian state from its position and velocity.
pub fn cartesian(position: &Vector3<f64>, velocity: &Vector3<f64>) -> CartesianState {
    CartesianState::new(
        position.x, position.y, position.z, velocity.x, velocity.y, velocity.z,
    )
}

/// Converts an epoch to the seconds past J2000 TDB used throughout the computations.
pub fn epoch_to_seconds(epoch: Epoch) -> f64 {
    epoch.to_tdb_seconds()
}

/// Converts seconds past J2000 TDB back to an epoch.
pub fn seconds_to_epoch(epoch_s: f64) -> Epoch {
    Epoch::from_tdb_seconds(epoch_s)
}
