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

use crate::linalg::{DMatrix, DVector};
use crate::od::{ODError, ParameterKind};
use std::fmt;

/// Why the estimation stopped.
#[derive(Clone, Debug, PartialEq)]
pub enum Termination {
    /// The residual RMS stopped changing, or fell below the absolute tolerance
    Converged,
    MaxIterations,
    /// The residual RMS did not improve for too many iterations
    NoImprovement,
    /// Stopped between two iterations on request
    Cancelled,
    /// The normal equations are singular or too ill-conditioned to be solved
    Degenerate { condition_number: f64 },
    /// An iteration after the first could not be computed, e.g. the corrected trajectory could
    /// not be propagated or no observation remained valid
    Failed { reason: String },
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::MaxIterations => write!(f, "maximum iterations reached"),
            Self::NoImprovement => write!(f, "no improvement"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Degenerate { condition_number } => {
                write!(f, "degenerate (condition number {condition_number:.3e})")
            }
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// One linearization of the estimation.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Parameters the observations were computed with, before this iteration's correction
    pub values: DVector<f64>,
    /// Weighted residual RMS
    pub rms: f64,
    pub valid_observations: usize,
    /// Correction computed in this iteration, none if the estimation stopped before solving
    pub correction: Option<DVector<f64>>,
    /// Levenberg-Marquardt damping used for the correction
    pub lambda: Option<f64>,
    /// Whether these parameters were kept. A rejected Levenberg-Marquardt step increased the RMS
    pub accepted: bool,
}

/// Result of an estimation: the last accepted parameters with their residuals.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimationOutput {
    pub parameters: Vec<ParameterKind>,
    /// Name of each scalar of the parameter vector
    pub column_names: Vec<String>,
    pub values: DVector<f64>,
    /// Inverse of the final normal matrix, none if it is singular
    pub covariance: Option<DMatrix<f64>>,
    pub iterations: Vec<IterationRecord>,
    /// Whether each observation could be computed with the final parameters, in input order
    pub valid: Vec<bool>,
    /// Observed minus computed of each valid observation
    pub residuals: Vec<Option<DVector<f64>>>,
    pub rms: f64,
    pub termination: Termination,
}

impl EstimationOutput {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }

    /// Reports a degenerate estimation as an error, keeping every other termination as a result.
    pub fn result(&self) -> Result<(), ODError> {
        match self.termination {
            Termination::Degenerate { condition_number } => {
                Err(ODError::EstimationDegenerate { condition_number })
            }
            _ => Ok(()),
        }
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// One sigma of each parameter, from the covariance.
    pub fn sigmas(&self) -> Option<DVector<f64>> {
        self.covariance
            .as_ref()
            .map(|covar| covar.diagonal().map(|v| v.abs().sqrt()))
    }
}

impl fmt::Display for EstimationOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Termination: {}", self.termination)?;
        writeln!(f, "Iterations: {}", self.iterations.len())?;
        writeln!(
            f,
            "Valid observations: {}/{}",
            self.valid_count(),
            self.valid.len()
        )?;
        writeln!(f, "Final RMS: {:.6e}", self.rms)?;
        let sigmas = self.sigmas();
        for (i, name) in self.column_names.iter().enumerate() {
            match &sigmas {
                Some(sigmas) => {
                    writeln!(f, "  {name} = {:.9e} ± {:.3e}", self.values[i], sigmas[i])?
                }
                None => writeln!(f, "  {name} = {:.9e}", self.values[i])?,
            }
        }
        Ok(())
    }
}
