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

use super::LegEndpoints;
use crate::cosmic::{position, SPEED_OF_LIGHT_KM_S};
use crate::linalg::DVector;
use crate::od::{Environment, ODError, ParameterKind};
use std::fmt;

/// Partial derivative of a light time correction with respect to one parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrectionPartial {
    /// Derivative of the delay (in seconds) with respect to each element of the parameter
    pub partial: DVector<f64>,
    /// Time at which the partial is evaluated
    pub epoch_s: f64,
}

/// A correction to the geometric light time of one leg.
///
/// Corrections are stateless: they read any parameter they depend on from the environment, so
/// that a parameter update is seen by every leg using the correction. The dependence of the
/// correction on the endpoint positions is neglected in the partials.
pub trait LightTimeCorrection: Send + Sync + fmt::Debug {
    fn name(&self) -> String;

    /// Delay added to the geometric light time, in seconds.
    fn delay_s(&self, leg: &LegEndpoints, env: &Environment) -> Result<f64, ODError>;

    /// Partial of the delay with respect to the parameter, or None if the delay does not depend
    /// on it.
    fn partial(
        &self,
        _parameter: &ParameterKind,
        _leg: &LegEndpoints,
        _env: &Environment,
    ) -> Result<Option<CorrectionPartial>, ODError> {
        Ok(None)
    }
}

/// First order relativistic (Shapiro) delay due to the gravity fields of perturbing bodies.
#[derive(Clone, Debug, PartialEq)]
pub struct FirstOrderRelativistic {
    pub perturbing_bodies: Vec<String>,
}

impl FirstOrderRelativistic {
    pub fn new(perturbing_bodies: Vec<String>) -> Self {
        Self { perturbing_bodies }
    }

    /// Delay of a unit gravitational parameter with unit (1 + gamma), in s/(km^3/s^2).
    ///
    /// The perturbing body is placed at the middle of the leg.
    fn unit_delay(
        &self,
        body: &str,
        leg: &LegEndpoints,
        env: &Environment,
    ) -> Result<f64, ODError> {
        let r_body = position(&env.body(body)?.state(leg.midpoint_epoch_s())?);
        let r_tx = (position(&leg.transmitter) - r_body).norm();
        let r_rx = (position(&leg.receiver) - r_body).norm();
        let r_tx_rx = leg.range_km();
        Ok(((r_tx + r_rx + r_tx_rx) / (r_tx + r_rx - r_tx_rx)).ln() / SPEED_OF_LIGHT_KM_S.powi(3))
    }
}

impl LightTimeCorrection for FirstOrderRelativistic {
    fn name(&self) -> String {
        format!("first order relativistic ({})", self.perturbing_bodies.join(", "))
    }

    fn delay_s(&self, leg: &LegEndpoints, env: &Environment) -> Result<f64, ODError> {
        let mut delay_s = 0.0;
        for body in &self.perturbing_bodies {
            delay_s += env.body(body)?.gm_km3_s2 * self.unit_delay(body, leg, env)?;
        }
        Ok((1.0 + env.ppn_gamma) * delay_s)
    }

    fn partial(
        &self,
        parameter: &ParameterKind,
        leg: &LegEndpoints,
        env: &Environment,
    ) -> Result<Option<CorrectionPartial>, ODError> {
        let partial = match parameter {
            ParameterKind::GravitationalParameter { body }
                if self.perturbing_bodies.contains(body) =>
            {
                (1.0 + env.ppn_gamma) * self.unit_delay(body, leg, env)?
            }
            ParameterKind::PpnGamma => {
                let mut partial = 0.0;
                for body in &self.perturbing_bodies {
                    partial += env.body(body)?.gm_km3_s2 * self.unit_delay(body, leg, env)?;
                }
                partial
            }
            _ => return Ok(None),
        };

        Ok(Some(CorrectionPartial {
            partial: DVector::from_element(1, partial),
            epoch_s: leg.midpoint_epoch_s(),
        }))
    }
}

/// A fixed delay, e.g. a calibrated transponder or cable delay.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConstantDelay {
    pub delay_s: f64,
}

impl LightTimeCorrection for ConstantDelay {
    fn name(&self) -> String {
        format!("constant delay of {} s", self.delay_s)
    }

    fn delay_s(&self, _leg: &LegEndpoints, _env: &Environment) -> Result<f64, ODError> {
        Ok(self.delay_s)
    }
}
