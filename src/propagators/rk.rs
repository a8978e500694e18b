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

use crate::linalg::DVector;

/// The `RK` trait defines an explicit Runge Kutta integrator from its Butcher table.
#[allow(clippy::upper_case_acronyms)]
pub trait RK
where
    Self: Sized,
{
    /// Order of this integrator
    const ORDER: u8;

    /// Number of stages, used for indexing
    const STAGES: usize;

    /// The strictly lower triangular A coefficients of the Butcher table, row by row, of length
    /// STAGES * (STAGES - 1) / 2.
    /// *Warning:* the nodes are computed as c_i = \sum_j a_{ij}.
    const A_COEFFS: &'static [f64];

    /// The b_i weights of the Butcher table, of length STAGES.
    const B_COEFFS: &'static [f64];
}

/// The classical fourth order Runge Kutta, used with a fixed step.
pub struct RK4Fixed {}

impl RK for RK4Fixed {
    const ORDER: u8 = 4;
    const STAGES: usize = 4;
    const A_COEFFS: &'static [f64] = &[0.5, 0.0, 0.5, 0.0, 0.0, 1.0];
    const B_COEFFS: &'static [f64] = &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0];
}

/// Takes one step of size `step` from `(t, y)`, where `k1` is the derivative at `(t, y)`.
pub fn rk_step<M, F, E>(
    t: f64,
    y: &DVector<f64>,
    step: f64,
    k1: DVector<f64>,
    mut derivative: F,
) -> Result<DVector<f64>, E>
where
    M: RK,
    F: FnMut(f64, &DVector<f64>) -> Result<DVector<f64>, E>,
{
    let mut ks = Vec::with_capacity(M::STAGES);
    ks.push(k1);

    let mut a_idx = 0;
    for _ in 1..M::STAGES {
        let mut ci = 0.0;
        let mut wi = DVector::zeros(y.len());
        for kj in &ks {
            let a_ij = M::A_COEFFS[a_idx];
            ci += a_ij;
            wi += kj * a_ij;
            a_idx += 1;
        }
        let yi = y + wi * step;
        ks.push(derivative(t + ci * step, &yi)?);
    }

    let mut next = y.clone();
    for (ki, bi) in ks.iter().zip(M::B_COEFFS.iter()) {
        next += ki * (bi * step);
    }
    Ok(next)
}

#[cfg(test)]
mod ut_rk {
    use super::*;

    #[test]
    fn tableau_consistency() {
        assert_eq!(
            RK4Fixed::A_COEFFS.len(),
            RK4Fixed::STAGES * (RK4Fixed::STAGES - 1) / 2
        );
        assert_eq!(RK4Fixed::B_COEFFS.len(), RK4Fixed::STAGES);
        let sum: f64 = RK4Fixed::B_COEFFS.iter().sum();
        assert!((sum - 1.0).abs() < 1e-15);
    }

    #[test]
    fn exponential_decay() {
        // y' = -y, so one unit of time later y = e^-1
        let f = |_t: f64, y: &DVector<f64>| -> Result<DVector<f64>, ()> { Ok(-y) };
        let mut y = DVector::from_element(1, 1.0);
        let step = 0.01;
        for i in 0..100 {
            let t = i as f64 * step;
            let k1 = f(t, &y).unwrap();
            y = rk_step::<RK4Fixed, _, _>(t, &y, step, k1, f).unwrap();
        }
        assert!((y[0] - (-1.0_f64).exp()).abs() < 1e-10);
    }
}
