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
    CorrectionId, Environment, InvalidGeometrySnafu, LinkEndId, NonConvergenceSnafu, ODError,
};
use crate::cosmic::{position, CartesianState, SPEED_OF_LIGHT_KM_S};
use crate::io::ConfigRepr;
use serde_derive::{Deserialize, Serialize};
use snafu::ensure;
use std::fmt;
use typed_builder::TypedBuilder;

mod corrections;
pub use corrections::{
    ConstantDelay, CorrectionPartial, FirstOrderRelativistic, LightTimeCorrection,
};

/// Which end of a leg has its time fixed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegAnchor {
    /// The transmission time is known, the reception time is solved for
    Transmitter,
    /// The reception time is known, the transmission time is solved for
    Receiver,
}

/// Convergence settings of the light time iteration.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct LightTimeConvergence {
    /// Absolute tolerance on the change of the light time between iterations, in seconds.
    /// Corrections may be numerically small, so this is never a relative tolerance.
    #[builder(default = 1e-12)]
    #[serde(default = "default_tolerance_s")]
    pub tolerance_s: f64,
    #[builder(default = 50)]
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_tolerance_s() -> f64 {
    1e-12
}

fn default_max_iterations() -> usize {
    50
}

impl Default for LightTimeConvergence {
    fn default() -> Self {
        Self {
            tolerance_s: default_tolerance_s(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl ConfigRepr for LightTimeConvergence {}

impl fmt::Display for LightTimeConvergence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "light time converged to {:e} s within {} iterations",
            self.tolerance_s, self.max_iterations
        )
    }
}

/// Endpoint states and times of one leg.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LegEndpoints {
    pub transmitter: CartesianState,
    pub transmission_epoch_s: f64,
    pub receiver: CartesianState,
    pub reception_epoch_s: f64,
}

impl LegEndpoints {
    /// Geometric distance between the transmitter at transmission and the receiver at reception.
    pub fn range_km(&self) -> f64 {
        (position(&self.receiver) - position(&self.transmitter)).norm()
    }

    pub fn midpoint_epoch_s(&self) -> f64 {
        0.5 * (self.transmission_epoch_s + self.reception_epoch_s)
    }
}

/// The self-consistent solution of one leg.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LightTimeSolution {
    /// Light time including corrections, in seconds, always positive
    pub light_time_s: f64,
    pub endpoints: LegEndpoints,
    pub iterations: usize,
}

/// Solves the light time of one leg between a transmitter and a receiver.
///
/// The calculator holds handles to its corrections, which live in the [`Environment`].
#[derive(Clone, Debug, PartialEq)]
pub struct LightTimeCalculator {
    pub transmitter: LinkEndId,
    pub receiver: LinkEndId,
    pub corrections: Vec<CorrectionId>,
    pub convergence: LightTimeConvergence,
}

impl LightTimeCalculator {
    pub fn new(transmitter: LinkEndId, receiver: LinkEndId) -> Self {
        Self {
            transmitter,
            receiver,
            corrections: Vec::new(),
            convergence: LightTimeConvergence::default(),
        }
    }

    pub fn with_corrections(mut self, corrections: Vec<CorrectionId>) -> Self {
        self.corrections = corrections;
        self
    }

    pub fn with_convergence(mut self, convergence: LightTimeConvergence) -> Self {
        self.convergence = convergence;
        self
    }

    /// Sum of all corrections of this leg, in seconds.
    pub fn correction_s(&self, leg: &LegEndpoints, env: &Environment) -> Result<f64, ODError> {
        let mut total = 0.0;
        for id in &self.corrections {
            total += env.correction(*id)?.delay_s(leg, env)?;
        }
        Ok(total)
    }

    /// Light time only, see [`Self::solve`].
    pub fn light_time_s(
        &self,
        epoch_s: f64,
        anchor: LegAnchor,
        env: &Environment,
    ) -> Result<f64, ODError> {
        Ok(self.solve(epoch_s, anchor, env)?.light_time_s)
    }

    /// Solves for the light time by fixed-point iteration, with `epoch_s` being the transmission
    /// or the reception time depending on the anchor.
    ///
    /// The returned endpoint times satisfy `reception - transmission = light_time_s` to rounding.
    pub fn solve(
        &self,
        epoch_s: f64,
        anchor: LegAnchor,
        env: &Environment,
    ) -> Result<LightTimeSolution, ODError> {
        let fixed_id = match anchor {
            LegAnchor::Transmitter => &self.transmitter,
            LegAnchor::Receiver => &self.receiver,
        };
        let free_id = match anchor {
            LegAnchor::Transmitter => &self.receiver,
            LegAnchor::Receiver => &self.transmitter,
        };
        let fixed_state = env.link_end_state(fixed_id, epoch_s)?;
        let free_epoch_s = |light_time_s: f64| match anchor {
            LegAnchor::Transmitter => epoch_s + light_time_s,
            LegAnchor::Receiver => epoch_s - light_time_s,
        };
        let endpoints = |free_state: CartesianState, light_time_s: f64| match anchor {
            LegAnchor::Transmitter => LegEndpoints {
                transmitter: fixed_state,
                transmission_epoch_s: epoch_s,
                receiver: free_state,
                reception_epoch_s: free_epoch_s(light_time_s),
            },
            LegAnchor::Receiver => LegEndpoints {
                transmitter: free_state,
                transmission_epoch_s: free_epoch_s(light_time_s),
                receiver: fixed_state,
                reception_epoch_s: epoch_s,
            },
        };

        // Initial guess from both endpoints at the anchor time
        let mut light_time_s = (position(&env.link_end_state(free_id, epoch_s)?)
            - position(&fixed_state))
        .norm()
            / SPEED_OF_LIGHT_KM_S;
        let mut change_s = f64::INFINITY;

        for iteration in 1..=self.convergence.max_iterations {
            let free_state = env.link_end_state(free_id, free_epoch_s(light_time_s))?;
            let leg = endpoints(free_state, light_time_s);
            let new_light_time_s =
                leg.range_km() / SPEED_OF_LIGHT_KM_S + self.correction_s(&leg, env)?;

            ensure!(
                new_light_time_s.is_finite() && new_light_time_s > 0.0,
                InvalidGeometrySnafu {
                    transmitter: self.transmitter.clone(),
                    receiver: self.receiver.clone(),
                    light_time_s: new_light_time_s,
                }
            );

            change_s = (new_light_time_s - light_time_s).abs();
            light_time_s = new_light_time_s;
            trace!(
                "{} -> {} @ {epoch_s} s: iteration {iteration}, light time {light_time_s} s (change {change_s:e} s)",
                self.transmitter,
                self.receiver
            );

            if change_s < self.convergence.tolerance_s {
                // Endpoints consistent with the converged light time
                let free_state = env.link_end_state(free_id, free_epoch_s(light_time_s))?;
                return Ok(LightTimeSolution {
                    light_time_s,
                    endpoints: endpoints(free_state, light_time_s),
                    iterations: iteration,
                });
            }
        }

        NonConvergenceSnafu {
            transmitter: self.transmitter.clone(),
            receiver: self.receiver.clone(),
            iterations: self.convergence.max_iterations,
            last_change_s: change_s,
        }
        .fail()
    }
}
