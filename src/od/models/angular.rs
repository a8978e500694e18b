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

use super::range::single_leg_anchor;
use super::LinkEndData;
use crate::cosmic::position;
use crate::linalg::Vector2;
use crate::od::lighttime::LightTimeCalculator;
use crate::od::{Environment, LinkEndType, LinkEnds, ODError};
use crate::utils::right_ascension_declination;

/// Right ascension and declination of the transmitter as seen by the receiver, in radians,
/// accounting for the light time.
#[derive(Clone, Debug, PartialEq)]
pub struct AngularPosition {
    pub calculator: LightTimeCalculator,
}

impl AngularPosition {
    pub fn compute(
        &self,
        epoch_s: f64,
        anchor: LinkEndType,
        link_ends: &LinkEnds,
        env: &Environment,
    ) -> Result<(Vector2<f64>, LinkEndData), ODError> {
        let leg_anchor = single_leg_anchor(anchor, link_ends)?;
        let solution = self.calculator.solve(epoch_s, leg_anchor, env)?;
        let line_of_sight =
            position(&solution.endpoints.transmitter) - position(&solution.endpoints.receiver);
        let mut data = LinkEndData::default();
        data.push_leg(&solution.endpoints);
        Ok((right_ascension_declination(&line_of_sight), data))
    }
}
