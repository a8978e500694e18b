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

use crate::linalg::Matrix3;
use crate::utils::{r3, r3_dot};
use std::fmt;

/// Orientation of a body-fixed frame with respect to the inertial frame.
pub trait RotationModel: Send + Sync + fmt::Debug {
    /// Direction cosine matrix from the body-fixed frame to the inertial frame.
    fn dcm_to_inertial(&self, epoch_s: f64) -> Matrix3<f64>;
    /// Time derivative of the direction cosine matrix, in 1/s.
    fn dcm_to_inertial_dot(&self, epoch_s: f64) -> Matrix3<f64>;
}

/// A fixed orientation
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConstantRotation {
    pub dcm: Matrix3<f64>,
}

impl ConstantRotation {
    pub fn identity() -> Self {
        Self {
            dcm: Matrix3::identity(),
        }
    }
}

impl RotationModel for ConstantRotation {
    fn dcm_to_inertial(&self, _epoch_s: f64) -> Matrix3<f64> {
        self.dcm
    }

    fn dcm_to_inertial_dot(&self, _epoch_s: f64) -> Matrix3<f64> {
        Matrix3::zeros()
    }
}

/// A uniform spin about the body-fixed z axis.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SimpleRotation {
    pub reference_epoch_s: f64,
    /// Rotation angle at the reference epoch, in radians
    pub angle_at_reference_rad: f64,
    /// Spin rate, in rad/s
    pub rate_rad_s: f64,
}

impl SimpleRotation {
    /// Sidereal rotation rate of the Earth (IERS conventions)
    pub const EARTH_RATE_RAD_S: f64 = 7.292_115_146_706_979e-5;

    pub fn new(reference_epoch_s: f64, angle_at_reference_rad: f64, rate_rad_s: f64) -> Self {
        Self {
            reference_epoch_s,
            angle_at_reference_rad,
            rate_rad_s,
        }
    }

    /// An Earth-like spin starting at a zero angle at the reference epoch.
    pub fn earth_like(reference_epoch_s: f64) -> Self {
        Self::new(reference_epoch_s, 0.0, Self::EARTH_RATE_RAD_S)
    }

    fn angle(&self, epoch_s: f64) -> f64 {
        self.angle_at_reference_rad + self.rate_rad_s * (epoch_s - self.reference_epoch_s)
    }
}

impl RotationModel for SimpleRotation {
    fn dcm_to_inertial(&self, epoch_s: f64) -> Matrix3<f64> {
        // r3 rotates a frame, so the body-to-inertial matrix is its transpose
        r3(self.angle(epoch_s)).transpose()
    }

    fn dcm_to_inertial_dot(&self, epoch_s: f64) -> Matrix3<f64> {
        r3_dot(self.angle(epoch_s)).transpose() * self.rate_rad_s
    }
}
