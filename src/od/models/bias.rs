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
use serde_derive::{Deserialize, Serialize};

/// Measurement bias applied to the ideal observation, after the light time solution.
#[derive(Clone, Debug, PartialEq)]
pub enum ObservationBias {
    /// Constant additive offset
    Constant { offset: DVector<f64> },
    /// Offset proportional to the ideal observation
    Relative { factor: DVector<f64> },
    /// Offset drifting linearly in time from a reference epoch
    TimeDrift {
        offset: DVector<f64>,
        drift_per_s: DVector<f64>,
        reference_epoch_s: f64,
    },
}

impl ObservationBias {
    pub fn constant(offset: &[f64]) -> Self {
        Self::Constant {
            offset: DVector::from_column_slice(offset),
        }
    }

    pub fn relative(factor: &[f64]) -> Self {
        Self::Relative {
            factor: DVector::from_column_slice(factor),
        }
    }

    pub fn time_drift(offset: &[f64], drift_per_s: &[f64], reference_epoch_s: f64) -> Self {
        Self::TimeDrift {
            offset: DVector::from_column_slice(offset),
            drift_per_s: DVector::from_column_slice(drift_per_s),
            reference_epoch_s,
        }
    }

    /// Number of observable components this bias applies to
    pub fn size(&self) -> usize {
        match self {
            Self::Constant { offset } => offset.len(),
            Self::Relative { factor } => factor.len(),
            Self::TimeDrift { offset, .. } => offset.len(),
        }
    }

    /// The bias at this epoch, to be added to the ideal observation.
    pub fn value(&self, epoch_s: f64, ideal: &DVector<f64>) -> DVector<f64> {
        match self {
            Self::Constant { offset } => offset.clone(),
            Self::Relative { factor } => factor.component_mul(ideal),
            Self::TimeDrift {
                offset,
                drift_per_s,
                reference_epoch_s,
            } => offset + drift_per_s * (epoch_s - reference_epoch_s),
        }
    }

    /// Additive offset, if this bias has one.
    pub fn offset(&self) -> Option<&DVector<f64>> {
        match self {
            Self::Constant { offset } | Self::TimeDrift { offset, .. } => Some(offset),
            Self::Relative { .. } => None,
        }
    }

    pub fn offset_mut(&mut self) -> Option<&mut DVector<f64>> {
        match self {
            Self::Constant { offset } | Self::TimeDrift { offset, .. } => Some(offset),
            Self::Relative { .. } => None,
        }
    }

    pub fn factor(&self) -> Option<&DVector<f64>> {
        match self {
            Self::Relative { factor } => Some(factor),
            _ => None,
        }
    }

    pub fn factor_mut(&mut self) -> Option<&mut DVector<f64>> {
        match self {
            Self::Relative { factor } => Some(factor),
            _ => None,
        }
    }

    pub fn drift(&self) -> Option<&DVector<f64>> {
        match self {
            Self::TimeDrift { drift_per_s, .. } => Some(drift_per_s),
            _ => None,
        }
    }

    pub fn drift_mut(&mut self) -> Option<&mut DVector<f64>> {
        match self {
            Self::TimeDrift { drift_per_s, .. } => Some(drift_per_s),
            _ => None,
        }
    }

    /// Elapsed time used by the drift, zero for biases without drift.
    pub fn drift_elapsed_s(&self, epoch_s: f64) -> f64 {
        match self {
            Self::TimeDrift {
                reference_epoch_s, ..
            } => epoch_s - reference_epoch_s,
            _ => 0.0,
        }
    }
}

/// Serializable form of an [`ObservationBias`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BiasSettings {
    #[serde(rename = "constant")]
    Constant { offset: Vec<f64> },
    #[serde(rename = "relative")]
    Relative { factor: Vec<f64> },
    #[serde(rename = "time_drift")]
    TimeDrift {
        offset: Vec<f64>,
        drift_per_s: Vec<f64>,
        reference_epoch_s: f64,
    },
}

impl From<&BiasSettings> for ObservationBias {
    fn from(settings: &BiasSettings) -> Self {
        match settings {
            BiasSettings::Constant { offset } => Self::constant(offset),
            BiasSettings::Relative { factor } => Self::relative(factor),
            BiasSettings::TimeDrift {
                offset,
                drift_per_s,
                reference_epoch_s,
            } => Self::time_drift(offset, drift_per_s, *reference_epoch_s),
        }
    }
}
