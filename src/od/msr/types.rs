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

use serde_derive::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObservableType {
    #[serde(rename = "one_way_range")]
    OneWayRange,
    #[serde(rename = "n_way_range")]
    NWayRange,
    #[serde(rename = "one_way_differenced_range")]
    OneWayDifferencedRange,
    #[serde(rename = "n_way_differenced_range")]
    NWayDifferencedRange,
    /// Average range rate over the integration time, i.e. averaged Doppler
    #[serde(rename = "one_way_range_rate")]
    OneWayRangeRate,
    #[serde(rename = "n_way_range_rate")]
    NWayRangeRate,
    #[serde(rename = "angular_position")]
    AngularPosition,
}

impl ObservableType {
    /// Number of scalar components of this observable
    pub fn size(self) -> usize {
        match self {
            Self::AngularPosition => 2,
            _ => 1,
        }
    }

    /// Returns the expected unit of this observable
    pub fn unit(self) -> &'static str {
        match self {
            Self::AngularPosition => "rad",
            Self::OneWayRangeRate | Self::NWayRangeRate => "km/s",
            _ => "km",
        }
    }

    /// Whether this observable requires exactly one transmitter and one receiver
    pub fn is_single_leg(self) -> bool {
        matches!(
            self,
            Self::OneWayRange
                | Self::OneWayDifferencedRange
                | Self::OneWayRangeRate
                | Self::AngularPosition
        )
    }

    /// Whether this observable is computed from the ranges at both ends of an integration time
    pub fn is_differenced(self) -> bool {
        matches!(
            self,
            Self::OneWayDifferencedRange
                | Self::NWayDifferencedRange
                | Self::OneWayRangeRate
                | Self::NWayRangeRate
        )
    }

    pub fn is_range_rate(self) -> bool {
        matches!(self, Self::OneWayRangeRate | Self::NWayRangeRate)
    }
}

impl fmt::Display for ObservableType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::OneWayRange => write!(f, "one-way range"),
            Self::NWayRange => write!(f, "n-way range"),
            Self::OneWayDifferencedRange => write!(f, "one-way differenced range"),
            Self::NWayDifferencedRange => write!(f, "n-way differenced range"),
            Self::OneWayRangeRate => write!(f, "one-way range rate"),
            Self::NWayRangeRate => write!(f, "n-way range rate"),
            Self::AngularPosition => write!(f, "angular position"),
        }
    }
}
