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

use super::range::{NWayRange, OneWayRange};
use super::LinkEndData;
use crate::od::lighttime::LightTimeCalculator;
use crate::od::msr::ObservableType;
use crate::od::{Environment, LinkEndType, LinkEnds, ODError};

/// The range observable underlying a differenced range.
#[derive(Clone, Debug, PartialEq)]
pub enum RangeKind {
    OneWay(OneWayRange),
    NWay(NWayRange),
}

impl RangeKind {
    pub fn compute(
        &self,
        epoch_s: f64,
        anchor: LinkEndType,
        link_ends: &LinkEnds,
        env: &Environment,
    ) -> Result<(f64, LinkEndData), ODError> {
        match self {
            Self::OneWay(model) => model.compute(epoch_s, anchor, link_ends, env),
            Self::NWay(model) => model.compute(epoch_s, anchor, link_ends, env),
        }
    }

    pub fn legs(&self) -> &[LightTimeCalculator] {
        match self {
            Self::OneWay(model) => std::slice::from_ref(&model.calculator),
            Self::NWay(model) => &model.legs,
        }
    }
}

/// Difference of the range at the anchor time and the range one integration time earlier, with
/// the same link end anchored at both times.
///
/// An averaged difference is divided by the integration time: it is the mean range rate over the
/// interval, as measured by averaged Doppler.
#[derive(Clone, Debug, PartialEq)]
pub struct DifferencedRange {
    pub base: RangeKind,
    pub integration_time_s: f64,
    pub averaged: bool,
}

impl DifferencedRange {
    pub fn observable(&self) -> ObservableType {
        match (&self.base, self.averaged) {
            (RangeKind::OneWay(_), false) => ObservableType::OneWayDifferencedRange,
            (RangeKind::NWay(_), false) => ObservableType::NWayDifferencedRange,
            (RangeKind::OneWay(_), true) => ObservableType::OneWayRangeRate,
            (RangeKind::NWay(_), true) => ObservableType::NWayRangeRate,
        }
    }

    /// Divides the range difference into the observable: the integration time if averaged.
    pub fn divisor(&self) -> f64 {
        if self.averaged {
            self.integration_time_s
        } else {
            1.0
        }
    }

    /// Returns the differenced range in km (or the range rate in km/s), and the link end data of
    /// the start of the interval followed by that of its end.
    pub fn compute(
        &self,
        epoch_s: f64,
        anchor: LinkEndType,
        link_ends: &LinkEnds,
        env: &Environment,
    ) -> Result<(f64, LinkEndData), ODError> {
        let (start_km, mut data) =
            self.base
                .compute(epoch_s - self.integration_time_s, anchor, link_ends, env)?;
        let (end_km, end_data) = self.base.compute(epoch_s, anchor, link_ends, env)?;
        data.extend(end_data);
        Ok(((end_km - start_km) / self.divisor(), data))
    }
}
