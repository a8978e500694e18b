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

use std::ops::{Add, Mul};

/// Two-node cubic Hermite basis evaluated at a single abscissa.
///
/// The interpolant is linear in the node values and node derivatives, so interpolating a state
/// history and interpolating its variational history with the same basis yields exactly
/// consistent partial derivatives.
///
/// ```
/// use tracklink::polyfit::HermiteBasis;
///
/// let basis = HermiteBasis::new(0.0, 1.0, 0.5);
/// // Interpolate x^3 from its values and derivatives at 0 and 1.
/// let y = basis.interpolate(&0.0, &0.0, &1.0, &3.0);
/// assert!((y - 0.125_f64).abs() < 1e-15);
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HermiteBasis {
    h00: f64,
    h10: f64,
    h01: f64,
    h11: f64,
}

impl HermiteBasis {
    /// Builds the basis between the nodes `x0` and `x1`, evaluated at `x`.
    pub fn new(x0: f64, x1: f64, x: f64) -> Self {
        let step = x1 - x0;
        let s = (x - x0) / step;
        let s2 = s * s;
        let s3 = s2 * s;
        Self {
            h00: 2.0 * s3 - 3.0 * s2 + 1.0,
            h10: (s3 - 2.0 * s2 + s) * step,
            h01: -2.0 * s3 + 3.0 * s2,
            h11: (s3 - s2) * step,
        }
    }

    /// Combines the node values and derivatives.
    pub fn interpolate<T>(&self, y0: &T, dy0: &T, y1: &T, dy1: &T) -> T
    where
        T: Clone + Mul<f64, Output = T> + Add<Output = T>,
    {
        y0.clone() * self.h00
            + dy0.clone() * self.h10
            + y1.clone() * self.h01
            + dy1.clone() * self.h11
    }
}

/// Returns the index `i` such that `abscissas[i] <= x <= abscissas[i + 1]`, or None if `x` is
/// outside of the tabulated span. The abscissas must be strictly increasing.
pub fn bracket(abscissas: &[f64], x: f64) -> Option<usize> {
    let n = abscissas.len();
    if n < 2 || !x.is_finite() || x < abscissas[0] || x > abscissas[n - 1] {
        return None;
    }
    let upper = abscissas.partition_point(|xi| *xi <= x);
    Some(upper.saturating_sub(1).min(n - 2))
}
