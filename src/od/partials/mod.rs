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

use crate::cosmic::SPEED_OF_LIGHT_KM_S;
use crate::linalg::{DMatrix, DVector};
use crate::od::models::{LinkEndData, ObservationBias, ObservationModel};
use crate::od::{
    DimensionMismatchSnafu, EstimatableParameter, Environment, LinkEndType, ODError,
    ParameterKind, ParameterSet,
};
use crate::propagators::VariationalHistory;
use snafu::OptionExt;

mod position;
mod scaling;
pub use scaling::{
    AngularPositionScaling, DifferencedRangeScaling, LightTimeTerm, NWayRangeScaling,
    OneWayRangeScaling, PositionPartialScaling, PositionTerm,
};

/// Central difference partials, used to validate the analytic partials.
pub mod numerical;

/// What the partials read: the environment and the variational history of the propagated body,
/// if any.
#[derive(Copy, Clone, Debug)]
pub struct PartialContext<'a> {
    pub env: &'a Environment,
    pub variational: Option<&'a VariationalHistory>,
}

impl<'a> PartialContext<'a> {
    pub fn new(env: &'a Environment, variational: Option<&'a VariationalHistory>) -> Self {
        Self { env, variational }
    }
}

/// One contribution to the partial of an observable, evaluated at its own time.
#[derive(Clone, Debug, PartialEq)]
pub struct PartialEntry {
    /// Observable size by parameter size matrix
    pub partial: DMatrix<f64>,
    pub epoch_s: f64,
}

/// Partial of an observable with respect to one parameter, kept as separate contributions: one
/// per link end position and one per light time correction of each leg.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationPartial {
    pub parameter: ParameterKind,
    pub rows: usize,
    pub cols: usize,
    pub entries: Vec<PartialEntry>,
}

impl ObservationPartial {
    /// Sum of all contributions, zero if the observable does not depend on the parameter.
    pub fn total(&self) -> DMatrix<f64> {
        self.entries
            .iter()
            .fold(DMatrix::zeros(self.rows, self.cols), |acc, entry| {
                acc + &entry.partial
            })
    }
}

/// Computes the partial of the observation of this model with respect to one parameter.
///
/// The scaling must have been updated with the link end data, the same fixed link end and the
/// ideal observation of this evaluation. `epoch_s` is the time of the observation, at which bias
/// partials are evaluated.
#[allow(clippy::too_many_arguments)]
pub fn calculate_partial(
    model: &ObservationModel,
    parameter: &EstimatableParameter,
    data: &LinkEndData,
    ideal: &DVector<f64>,
    epoch_s: f64,
    fixed: LinkEndType,
    scaling: &PositionPartialScaling,
    ctx: &PartialContext,
) -> Result<ObservationPartial, ODError> {
    let size = model.size();
    let kind = &parameter.kind;
    let mut entries = Vec::new();

    for term in scaling.position_terms(fixed)? {
        let link_end = model.link_ends().require(term.role)?;
        let term_epoch_s = *data.epochs_s.get(term.data_index).context(DimensionMismatchSnafu {
            action: "position partial link end data",
            expected: term.data_index + 1,
            got: data.len(),
        })?;
        if let Some(position_partial) =
            position::link_end_position_partial(kind, link_end, term_epoch_s, ctx)?
        {
            entries.push(PartialEntry {
                partial: &term.scaling * position_partial,
                epoch_s: term_epoch_s,
            });
        }
    }

    for term in scaling.light_time_terms(fixed)? {
        let leg = data
            .leg_at(2 * term.data_leg)
            .context(DimensionMismatchSnafu {
                action: "light time partial link end data",
                expected: 2 * term.data_leg + 2,
                got: data.len(),
            })?;
        let calculator = model.legs().get(term.model_leg).context(DimensionMismatchSnafu {
            action: "light time partial legs",
            expected: term.model_leg + 1,
            got: model.legs().len(),
        })?;
        for id in &calculator.corrections {
            if let Some(correction) = ctx.env.correction(*id)?.partial(kind, &leg, ctx.env)? {
                entries.push(PartialEntry {
                    partial: &term.factor * correction.partial.transpose() * SPEED_OF_LIGHT_KM_S,
                    epoch_s: correction.epoch_s,
                });
            }
        }
    }

    if let Some(id) = model.bias() {
        let bias = ctx.env.bias(id)?;
        // The observation of a relative bias is the ideal observation scaled by (1 + factor)
        if let ObservationBias::Relative { factor } = bias {
            let scale = DMatrix::from_diagonal(&factor.add_scalar(1.0));
            for entry in &mut entries {
                entry.partial = &scale * &entry.partial;
            }
        }

        if kind.bias() == Some(id) {
            let partial = match kind {
                ParameterKind::ConstantBias { .. } => DMatrix::identity(size, size),
                ParameterKind::RelativeBias { .. } => DMatrix::from_diagonal(ideal),
                _ => DMatrix::identity(size, size) * bias.drift_elapsed_s(epoch_s),
            };
            entries.push(PartialEntry { partial, epoch_s });
        }
    }

    Ok(ObservationPartial {
        parameter: kind.clone(),
        rows: size,
        cols: parameter.size,
        entries,
    })
}

/// An observation with everything the estimator needs from it.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluatedObservation {
    /// Observation including the bias
    pub value: DVector<f64>,
    pub ideal: DVector<f64>,
    pub data: LinkEndData,
    pub partials: Vec<ObservationPartial>,
    /// Observable size by parameter set size
    pub jacobian: DMatrix<f64>,
}

impl ObservationModel {
    /// Computes the observation and its partials with respect to every parameter of the set.
    pub fn evaluate(
        &self,
        epoch_s: f64,
        anchor: LinkEndType,
        params: &ParameterSet,
        ctx: &PartialContext,
    ) -> Result<EvaluatedObservation, ODError> {
        let (ideal, data) =
            self.compute_ideal_observation_with_link_end_data(epoch_s, anchor, ctx.env)?;
        let value = match self.bias() {
            Some(id) => &ideal + ctx.env.bias(id)?.value(epoch_s, &ideal),
            None => ideal.clone(),
        };

        let mut scaling = PositionPartialScaling::for_model(self.kind());
        scaling.update(&data, anchor, &ideal)?;

        let mut jacobian = DMatrix::zeros(self.size(), params.size());
        let mut partials = Vec::with_capacity(params.len());
        for (offset, param) in params.with_offsets() {
            let partial =
                calculate_partial(self, param, &data, &ideal, epoch_s, anchor, &scaling, ctx)?;
            jacobian
                .view_mut((0, offset), (self.size(), param.size))
                .copy_from(&partial.total());
            partials.push(partial);
        }

        Ok(EvaluatedObservation {
            value,
            ideal,
            data,
            partials,
            jacobian,
        })
    }

    /// Partial of the observation with respect to every parameter of the set, as one matrix.
    pub fn jacobian(
        &self,
        epoch_s: f64,
        anchor: LinkEndType,
        params: &ParameterSet,
        ctx: &PartialContext,
    ) -> Result<DMatrix<f64>, ODError> {
        Ok(self.evaluate(epoch_s, anchor, params, ctx)?.jacobian)
    }
}
