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

use crate::linalg::{Matrix2x3, Matrix3, Vector2, Vector3};

/// Returns the frame rotation matrix about the third axis, angle in radians.
pub fn r3(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Derivative of [`r3`] with respect to its angle.
pub fn r3_dot(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(-s, c, 0.0, -c, -s, 0.0, 0.0, 0.0, 0.0)
}

/// Returns the tilde matrix from the provided Vector3, such that tilde(a) * b = a x b.
pub fn tilde_matrix(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v[2], v[1], //
        v[2], 0.0, -v[0], //
        -v[1], v[0], 0.0,
    )
}

/// Right ascension and declination, in radians, of the provided direction.
pub fn right_ascension_declination(u: &Vector3<f64>) -> Vector2<f64> {
    Vector2::new(u.y.atan2(u.x), (u.z / u.norm()).asin())
}

/// Partial derivatives of the right ascension (first row) and the declination (second row)
/// with respect to the Cartesian components of the direction vector.
pub fn right_ascension_declination_partials(u: &Vector3<f64>) -> Matrix2x3<f64> {
    let rho_sq = u.x.powi(2) + u.y.powi(2);
    let rho = rho_sq.sqrt();
    let r_sq = rho_sq + u.z.powi(2);
    Matrix2x3::new(
        -u.y / rho_sq,
        u.x / rho_sq,
        0.0,
        -u.x * u.z / (r_sq * rho),
        -u.y * u.z / (r_sq * rho),
        rho / r_sq,
    )
}
