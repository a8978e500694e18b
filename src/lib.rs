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

/*! # tracklink

Light time consistent tracking observables between moving link ends, their analytic partial
derivatives, and batch least squares estimation of the parameters they depend on.

Observation models compute one way range, n-way range, differenced range, and angular position
observables by iteratively solving for the light time of each leg. Their partials with respect to
initial states, gravitational parameters, station positions, and observation biases feed an
orbit determination manager which simulates observations and estimates the parameters.
*/

/// Provides the propagator of the estimated body and its variational equations.
pub mod propagators;

/// Point mass gravity dynamics and their hyperdual partials.
pub mod dynamics;

/// Provides the bodies, their ephemerides and rotation models.
pub mod cosmic;

/// Utility functions shared by different modules, and which may be useful to engineers.
pub mod utils;

/// YAML configuration loading.
pub mod io;

/// Observation models, partials, and orbit determination.
pub mod od;

/// Polynomial interpolation of tabulated states.
pub mod polyfit;

#[macro_use]
extern crate log;
extern crate hifitime;
extern crate nalgebra as na;

/// Re-export of hifitime
pub mod time {
    pub use hifitime::*;
}

/// Re-export nalgebra
pub mod linalg {
    pub use na::base::*;
}

/// Re-export some useful things
pub use self::cosmic::{Body, CartesianState};
pub use self::od::{LinkEndId, LinkEndType, LinkEnds, ObservableType};
