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

use super::LinkEndData;
use crate::cosmic::SPEED_OF_LIGHT_KM_S;
use crate::od::lighttime::{LegAnchor, LightTimeCalculator};
use crate::od::{
    DimensionMismatchSnafu, Environment, InvalidLinkEndRoleSnafu, LinkEndType, LinkEnds, ODError,
};
use snafu::ensure;

/// Range of a single leg: the light time multiplied by the speed of light.
#[derive(Clone, Debug, PartialEq)]
pub struct OneWayRange {
    pub calculator: LightTimeCalculator,
}

impl OneWayRange {
    /// Returns the range in km and the endpoints of the leg.
    pub fn compute(
        &self,
        epoch_s: f64,
        anchor: LinkEndType,
        link_ends: &LinkEnds,
        env: &Environment,
    ) -> Result<(f64, LinkEndData), ODError> {
        let leg_anchor = single_leg_anchor(anchor, link_ends)?;
        let solution = self.calculator.solve(epoch_s, leg_anchor, env)?;
        let mut data = LinkEndData::default();
        data.push_leg(&solution.endpoints);
        Ok((SPEED_OF_LIGHT_KM_S * solution.light_time_s, data))
    }
}

/// Maps the anchor role of a two-ended link onto the end of its single leg.
pub(crate) fn single_leg_anchor(
    anchor: LinkEndType,
    link_ends: &LinkEnds,
) -> Result<LegAnchor, ODError> {
    match anchor {
        LinkEndType::Transmitter if link_ends.contains(anchor) => Ok(LegAnchor::Transmitter),
        LinkEndType::Receiver if link_ends.contains(anchor) => Ok(LegAnchor::Receiver),
        _ => InvalidLinkEndRoleSnafu {
            role: anchor,
            link_ends: link_ends.clone(),
        }
        .fail(),
    }
}

/// Range along a chain of legs, from the transmitter through every retransmitter to the
/// receiver. The range includes the retransmission delays.
#[derive(Clone, Debug, PartialEq)]
pub struct NWayRange {
    /// Leg `i` goes from the link end `i` to the link end `i + 1`
    pub legs: Vec<LightTimeCalculator>,
    /// Delay between reception and retransmission at each retransmitter, in seconds
    pub retransmission_delays_s: Vec<f64>,
}

impl NWayRange {
    pub fn new(
        legs: Vec<LightTimeCalculator>,
        retransmission_delays_s: Vec<f64>,
    ) -> Result<Self, ODError> {
        ensure!(
            !legs.is_empty() && retransmission_delays_s.len() + 1 == legs.len(),
            DimensionMismatchSnafu {
                action: "retransmission delays",
                expected: legs.len().saturating_sub(1),
                got: retransmission_delays_s.len(),
            }
        );
        Ok(Self {
            legs,
            retransmission_delays_s,
        })
    }

    /// Returns the range in km and the endpoints of every leg, in signal-flow order.
    ///
    /// When a retransmitter is the anchor, `epoch_s` is its reception time. Legs after the anchor
    /// are solved with their transmission time fixed, legs before it with their reception time
    /// fixed.
    pub fn compute(
        &self,
        epoch_s: f64,
        anchor: LinkEndType,
        link_ends: &LinkEnds,
        env: &Environment,
    ) -> Result<(f64, LinkEndData), ODError> {
        let anchor_index = link_ends
            .index_of(anchor)
            .filter(|idx| *idx <= self.legs.len())
            .ok_or_else(|| {
                InvalidLinkEndRoleSnafu {
                    role: anchor,
                    link_ends: link_ends.clone(),
                }
                .build()
            })?;

        let mut total_s = 0.0;
        let mut legs = Vec::with_capacity(self.legs.len());

        // Backward from the anchor
        let mut reception_s = epoch_s;
        for i in (0..anchor_index).rev() {
            let solution = self.legs[i].solve(reception_s, LegAnchor::Receiver, env)?;
            total_s += solution.light_time_s;
            if i > 0 {
                total_s += self.retransmission_delays_s[i - 1];
                reception_s =
                    solution.endpoints.transmission_epoch_s - self.retransmission_delays_s[i - 1];
            }
            legs.push(solution.endpoints);
        }
        legs.reverse();

        // Forward from the anchor
        let mut transmission_s = if anchor_index > 0 && anchor_index < self.legs.len() {
            total_s += self.retransmission_delays_s[anchor_index - 1];
            epoch_s + self.retransmission_delays_s[anchor_index - 1]
        } else {
            epoch_s
        };
        for i in anchor_index..self.legs.len() {
            let solution = self.legs[i].solve(transmission_s, LegAnchor::Transmitter, env)?;
            total_s += solution.light_time_s;
            if i + 1 < self.legs.len() {
                total_s += self.retransmission_delays_s[i];
                transmission_s =
                    solution.endpoints.reception_epoch_s + self.retransmission_delays_s[i];
            }
            legs.push(solution.endpoints);
        }

        let mut data = LinkEndData::default();
        for leg in &legs {
            data.push_leg(leg);
        }
        debug!(
            "{link_ends} anchored at {anchor} @ {epoch_s} s: {total_s} s over {} legs",
            legs.len()
        );
        Ok((SPEED_OF_LIGHT_KM_S * total_s, data))
    }
}
