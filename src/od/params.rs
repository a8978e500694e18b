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

use super::{BiasId, DimensionMismatchSnafu, Environment, ODError, ParameterNotFoundSnafu};
use crate::cosmic::CartesianState;
use crate::linalg::{DVector, Vector3};
use crate::propagators::Propagator;
use serde_derive::{Deserialize, Serialize};
use snafu::{ensure, OptionExt};
use std::fmt;

/// Identifies what an estimated parameter is and which object owns it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Cartesian state of the propagated body at the start of the propagation
    InitialState { body: String },
    GravitationalParameter { body: String },
    /// Parametrized post-Newtonian gamma
    PpnGamma,
    /// Body-fixed position of a ground station
    StationPosition { body: String, station: String },
    ConstantBias { bias: BiasId },
    RelativeBias { bias: BiasId },
    BiasDrift { bias: BiasId },
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InitialState { body } => write!(f, "initial state of {body}"),
            Self::GravitationalParameter { body } => write!(f, "GM of {body}"),
            Self::PpnGamma => write!(f, "PPN gamma"),
            Self::StationPosition { body, station } => write!(f, "position of {body}/{station}"),
            Self::ConstantBias { bias } => write!(f, "constant {bias}"),
            Self::RelativeBias { bias } => write!(f, "relative {bias}"),
            Self::BiasDrift { bias } => write!(f, "drift of {bias}"),
        }
    }
}

impl ParameterKind {
    fn not_found(&self, details: impl Into<String>) -> ODError {
        ParameterNotFoundSnafu {
            parameter: self.to_string(),
            details: details.into(),
        }
        .build()
    }

    /// Current value of this parameter.
    pub fn value(
        &self,
        env: &Environment,
        propagator: Option<&dyn Propagator>,
    ) -> Result<DVector<f64>, ODError> {
        match self {
            Self::InitialState { body } => match propagator {
                Some(prop) if prop.body() == body.as_str() => {
                    Ok(DVector::from_column_slice(prop.initial_state().as_slice()))
                }
                _ => Err(self.not_found("no propagator for this body")),
            },
            Self::GravitationalParameter { body } => {
                Ok(DVector::from_element(1, env.body(body)?.gm_km3_s2))
            }
            Self::PpnGamma => Ok(DVector::from_element(1, env.ppn_gamma)),
            Self::StationPosition { body, station } => {
                let r = env.body(body)?.station_position(station)?;
                Ok(DVector::from_column_slice(r.as_slice()))
            }
            Self::ConstantBias { bias } => env
                .bias(*bias)?
                .offset()
                .cloned()
                .with_context(|| ParameterNotFoundSnafu {
                    parameter: self.to_string(),
                    details: "this bias has no offset".to_string(),
                }),
            Self::RelativeBias { bias } => env
                .bias(*bias)?
                .factor()
                .cloned()
                .with_context(|| ParameterNotFoundSnafu {
                    parameter: self.to_string(),
                    details: "this bias is not relative".to_string(),
                }),
            Self::BiasDrift { bias } => env
                .bias(*bias)?
                .drift()
                .cloned()
                .with_context(|| ParameterNotFoundSnafu {
                    parameter: self.to_string(),
                    details: "this bias does not drift".to_string(),
                }),
        }
    }

    /// Sets this parameter in the environment, or in the propagator for an initial state.
    pub fn set(
        &self,
        value: &[f64],
        env: &mut Environment,
        propagator: Option<&mut (dyn Propagator + '_)>,
    ) -> Result<(), ODError> {
        match self {
            Self::InitialState { body } => match propagator {
                Some(prop) if prop.body() == body.as_str() => {
                    prop.set_initial_state(CartesianState::from_column_slice(value));
                    Ok(())
                }
                _ => Err(self.not_found("no propagator for this body")),
            },
            Self::GravitationalParameter { body } => {
                env.body_mut(body)?.gm_km3_s2 = value[0];
                Ok(())
            }
            Self::PpnGamma => {
                env.ppn_gamma = value[0];
                Ok(())
            }
            Self::StationPosition { body, station } => {
                env.body_mut(body)?
                    .set_station_position(station, Vector3::from_column_slice(value))?;
                Ok(())
            }
            Self::ConstantBias { bias } => {
                let offset = env
                    .bias_mut(*bias)?
                    .offset_mut()
                    .with_context(|| ParameterNotFoundSnafu {
                        parameter: self.to_string(),
                        details: "this bias has no offset".to_string(),
                    })?;
                offset.copy_from_slice(value);
                Ok(())
            }
            Self::RelativeBias { bias } => {
                let factor = env
                    .bias_mut(*bias)?
                    .factor_mut()
                    .with_context(|| ParameterNotFoundSnafu {
                        parameter: self.to_string(),
                        details: "this bias is not relative".to_string(),
                    })?;
                factor.copy_from_slice(value);
                Ok(())
            }
            Self::BiasDrift { bias } => {
                let drift = env
                    .bias_mut(*bias)?
                    .drift_mut()
                    .with_context(|| ParameterNotFoundSnafu {
                        parameter: self.to_string(),
                        details: "this bias does not drift".to_string(),
                    })?;
                drift.copy_from_slice(value);
                Ok(())
            }
        }
    }

    /// Whether the trajectory of the propagated body must be recomputed when this parameter
    /// changes.
    pub fn affects_dynamics(&self) -> bool {
        matches!(
            self,
            Self::InitialState { .. } | Self::GravitationalParameter { .. }
        )
    }

    pub fn bias(&self) -> Option<BiasId> {
        match self {
            Self::ConstantBias { bias }
            | Self::RelativeBias { bias }
            | Self::BiasDrift { bias } => Some(*bias),
            _ => None,
        }
    }
}

/// A parameter being estimated, with its size fixed when the parameter set is built.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatableParameter {
    pub kind: ParameterKind,
    pub size: usize,
}

impl EstimatableParameter {
    /// Validates that the parameter exists and reads its size.
    pub fn new(
        kind: ParameterKind,
        env: &Environment,
        propagator: Option<&dyn Propagator>,
    ) -> Result<Self, ODError> {
        let size = kind.value(env, propagator)?.len();
        Ok(Self { kind, size })
    }

    pub fn value(
        &self,
        env: &Environment,
        propagator: Option<&dyn Propagator>,
    ) -> Result<DVector<f64>, ODError> {
        self.kind.value(env, propagator)
    }
}

impl fmt::Display for EstimatableParameter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.size)
    }
}

/// The ordered parameters being estimated. Each parameter occupies `size` consecutive columns of
/// the Jacobian, starting at its offset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterSet {
    parameters: Vec<EstimatableParameter>,
    offsets: Vec<usize>,
    size: usize,
}

impl ParameterSet {
    pub fn new(
        kinds: Vec<ParameterKind>,
        env: &Environment,
        propagator: Option<&dyn Propagator>,
    ) -> Result<Self, ODError> {
        let mut set = Self::default();
        for kind in kinds {
            ensure!(
                !set.parameters.iter().any(|p| p.kind == kind),
                ParameterNotFoundSnafu {
                    parameter: kind.to_string(),
                    details: "estimated twice".to_string()
                }
            );
            let param = EstimatableParameter::new(kind, env, propagator)?;
            set.offsets.push(set.size);
            set.size += param.size;
            set.parameters.push(param);
        }
        Ok(set)
    }

    /// Total number of scalar parameters, i.e. the number of Jacobian columns
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EstimatableParameter> {
        self.parameters.iter()
    }

    /// Parameters with their column offset
    pub fn with_offsets(&self) -> impl Iterator<Item = (usize, &EstimatableParameter)> {
        self.offsets.iter().copied().zip(self.parameters.iter())
    }

    pub fn offset_of(&self, kind: &ParameterKind) -> Option<usize> {
        self.parameters
            .iter()
            .position(|p| &p.kind == kind)
            .map(|i| self.offsets[i])
    }

    /// Whether any parameter requires a new propagation when it changes.
    pub fn affects_dynamics(&self) -> bool {
        self.parameters.iter().any(|p| p.kind.affects_dynamics())
    }

    /// Stacked current values of all parameters.
    pub fn values(
        &self,
        env: &Environment,
        propagator: Option<&dyn Propagator>,
    ) -> Result<DVector<f64>, ODError> {
        let mut values = DVector::zeros(self.size);
        for (offset, param) in self.with_offsets() {
            let value = param.value(env, propagator)?;
            values.rows_mut(offset, param.size).copy_from(&value);
        }
        Ok(values)
    }

    /// Sets all parameters from their stacked values. The caller must propagate again if any
    /// parameter affects the dynamics.
    pub fn apply(
        &self,
        values: &DVector<f64>,
        env: &mut Environment,
        mut propagator: Option<&mut (dyn Propagator + '_)>,
    ) -> Result<(), ODError> {
        ensure!(
            values.len() == self.size,
            DimensionMismatchSnafu {
                action: "parameter values",
                expected: self.size,
                got: values.len(),
            }
        );
        for (offset, param) in self.with_offsets() {
            let value = &values.as_slice()[offset..offset + param.size];
            param.kind.set(value, env, propagator.as_deref_mut())?;
        }
        Ok(())
    }

    /// Names of each column, e.g. for reports.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.size);
        for param in &self.parameters {
            if param.size == 1 {
                names.push(param.kind.to_string());
            } else {
                for i in 0..param.size {
                    names.push(format!("{}[{i}]", param.kind));
                }
            }
        }
        names
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<String> = self.parameters.iter().map(|p| format!("{p}")).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
