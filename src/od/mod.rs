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

use crate::cosmic::EphemerisError;
use crate::io::ConfigError;
use crate::propagators::PropagationError;
use snafu::prelude::Snafu;

/// Link ends and their roles along a signal path
pub mod links;
pub use links::{LinkEndId, LinkEndType, LinkEnds};

/// Observable types and observation collections
pub mod msr;
pub use msr::{ObservableType, ObservationCollection, ObservationRecord};

/// The arena of bodies, light time corrections, and biases read by the observation models
mod environment;
pub use environment::{BiasId, CorrectionId, Environment};

/// Iterative light time solution and light time corrections
pub mod lighttime;
pub use lighttime::{LightTimeCalculator, LightTimeConvergence, LightTimeSolution};

/// Observation models of every observable type
pub mod models;
pub use models::{LinkEndData, ObservationBias, ObservationModel, ObservationModelSet};

/// Analytic partial derivatives of observables
pub mod partials;

/// Estimatable parameters
pub mod params;
pub use params::{EstimatableParameter, ParameterKind, ParameterSet};

/// Simulation of observations from the observation models
pub mod simulator;

/// Batch least squares orbit determination
pub mod blse;

#[allow(unused_imports)]
pub mod prelude {
    pub use super::blse::*;
    pub use super::lighttime::*;
    pub use super::models::*;
    pub use super::msr::*;
    pub use super::params::*;
    pub use super::partials::*;
    pub use super::simulator::*;
    pub use super::*;

    pub use crate::cosmic::*;
    pub use crate::propagators::*;
    pub use crate::time::{Duration, Epoch, TimeUnits, Unit};
}

#[derive(Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ODError {
    #[snafu(display("{role} is not part of the link ends {link_ends}"))]
    InvalidLinkEndRole { role: LinkEndType, link_ends: LinkEnds },
    #[snafu(display("invalid link ends for {observable}: {details}"))]
    InvalidLinkEnds {
        observable: ObservableType,
        details: String,
    },
    #[snafu(display(
        "light time from {transmitter} to {receiver} did not converge in {iterations} iterations (last change {last_change_s:e} s)"
    ))]
    NonConvergence {
        transmitter: LinkEndId,
        receiver: LinkEndId,
        iterations: usize,
        last_change_s: f64,
    },
    #[snafu(display(
        "invalid geometry from {transmitter} to {receiver}: light time of {light_time_s} s"
    ))]
    InvalidGeometry {
        transmitter: LinkEndId,
        receiver: LinkEndId,
        light_time_s: f64,
    },
    #[snafu(display("{observable} scaling is not defined with the {fixed} time fixed"))]
    IncompatibleLinkEnd {
        fixed: LinkEndType,
        observable: ObservableType,
    },
    #[snafu(display("normal equations are singular (condition number {condition_number:e})"))]
    EstimationDegenerate { condition_number: f64 },
    #[snafu(display("no {observable} model for {link_ends}"))]
    ModelNotFound {
        observable: ObservableType,
        link_ends: LinkEnds,
    },
    #[snafu(display("parameter {parameter} cannot be used: {details}"))]
    ParameterNotFound { parameter: String, details: String },
    #[snafu(display("no light time correction {id}"))]
    UnknownCorrection { id: CorrectionId },
    #[snafu(display("no observation bias {id}"))]
    UnknownBias { id: BiasId },
    #[snafu(display("at least {need} measurements required for {action}"))]
    TooFewMeasurements { need: usize, action: &'static str },
    #[snafu(display("{action} expects {expected} elements, got {got}"))]
    DimensionMismatch {
        action: &'static str,
        expected: usize,
        got: usize,
    },
    #[snafu(display("during an orbit determination, encountered {source}"))]
    ODEphemerisError { source: EphemerisError },
    #[snafu(display("during an orbit determination, encountered {source}"))]
    ODPropError { source: PropagationError },
    #[snafu(display("OD failed because {source}"))]
    ODConfigError { source: ConfigError },
}

impl ODError {
    /// Whether this error only invalidates the epoch being processed, as opposed to a setup defect
    /// which must abort the whole run.
    pub fn is_epoch_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NonConvergence { .. }
                | Self::InvalidGeometry { .. }
                | Self::ODEphemerisError {
                    source: EphemerisError::OutOfSpan { .. }
                }
        )
    }
}

impl From<EphemerisError> for ODError {
    fn from(source: EphemerisError) -> Self {
        Self::ODEphemerisError { source }
    }
}
