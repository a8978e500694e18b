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

use crate::cosmic::{Body, CartesianState, EphemerisError, TabulatedEphemeris};
use crate::dynamics::DynamicsError;
use crate::io::ConfigError;
use crate::od::Environment;
use snafu::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Runge Kutta tableaux and stepping.
pub mod rk;
pub use rk::{RK4Fixed, RK};

mod pointmass;
pub use pointmass::{PointMassPropagator, PropagatorSettings};

mod variational;
pub use variational::VariationalHistory;

#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PropagationError {
    #[snafu(display("encountered a dynamics error {source}"))]
    Dynamics { source: DynamicsError },
    #[snafu(display("step size must be positive and finite, got {step_s} s"))]
    InvalidStep { step_s: f64 },
    #[snafu(display("propagation span must end after it starts, got [{start_s}, {end_s}] s"))]
    InvalidSpan { start_s: f64, end_s: f64 },
    #[snafu(display("state of {body} is not finite at {epoch_s} s"))]
    NonFinite { body: String, epoch_s: f64 },
    #[snafu(display("{body} is not propagated by this propagator"))]
    UnknownPropagatedBody { body: String },
    #[snafu(display("could not tabulate the propagated states: {source}"))]
    PropEphemeris { source: EphemerisError },
    #[snafu(display("propagation failed because {source}"))]
    PropConfigError { source: ConfigError },
}

/// A propagator of one body, which produces its state history and variational history from the
/// current parameter values held in the environment.
pub trait Propagator: Send + Sync + fmt::Debug {
    /// Name of the propagated body
    fn body(&self) -> &str;

    /// Bodies whose gravity acts on the propagated body
    fn attractors(&self) -> &[String];

    fn initial_state(&self) -> CartesianState;

    fn set_initial_state(&mut self, state: CartesianState);

    /// Start and end of the propagation, in seconds past J2000 TDB
    fn span(&self) -> (f64, f64);

    fn propagate(&self, env: &Environment) -> Result<PropagationResult, PropagationError>;
}

/// The output of a propagation.
#[derive(Clone, Debug)]
pub struct PropagationResult {
    pub body: String,
    pub ephemeris: TabulatedEphemeris,
    pub variational: VariationalHistory,
}

impl PropagationResult {
    /// Replaces the ephemeris of the propagated body in the environment, adding the body if
    /// needed, and returns the variational history.
    pub fn install(self, env: &mut Environment) -> Arc<VariationalHistory> {
        let ephemeris = Arc::new(self.ephemeris);
        match env.body_mut(&self.body) {
            Ok(body) => body.set_ephemeris(ephemeris),
            Err(_) => env.add_body(Body::new(self.body.clone(), 0.0, ephemeris)),
        }
        Arc::new(self.variational)
    }
}
