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

use super::PartialContext;
use crate::linalg::DMatrix;
use crate::od::{LinkEndId, ODError, ParameterKind, ParameterNotFoundSnafu};
use snafu::OptionExt;

/// Partial of the inertial position of a link end with respect to a parameter, at a fixed time.
///
/// Returns None when the position does not depend on the parameter. A station moves with its body,
/// so the initial state and gravitational parameter partials of a propagated body also apply to
/// its stations.
pub(crate) fn link_end_position_partial(
    parameter: &ParameterKind,
    link_end: &LinkEndId,
    epoch_s: f64,
    ctx: &PartialContext,
) -> Result<Option<DMatrix<f64>>, ODError> {
    match parameter {
        ParameterKind::InitialState { body } if *body == link_end.body => {
            let history = ctx
                .variational
                .filter(|history| history.body() == body.as_str())
                .with_context(|| ParameterNotFoundSnafu {
                    parameter: parameter.to_string(),
                    details: "no variational history for this body".to_string(),
                })?;
            let stm = history.stm(epoch_s)?;
            Ok(Some(DMatrix::from_fn(3, 6, |i, j| stm[(i, j)])))
        }
        ParameterKind::GravitationalParameter { body } => match ctx.variational {
            Some(history) if history.body() == link_end.body.as_str() => {
                let sensitivity = history.gm_sensitivity(body, epoch_s)?;
                Ok(Some(DMatrix::from_column_slice(
                    3,
                    1,
                    &sensitivity.as_slice()[..3],
                )))
            }
            _ => Ok(None),
        },
        ParameterKind::StationPosition { body, station }
            if *body == link_end.body && link_end.station.as_ref() == Some(station) =>
        {
            let dcm = ctx.env.body(body)?.dcm_to_inertial(epoch_s);
            Ok(Some(DMatrix::from_column_slice(3, 3, dcm.as_slice())))
        }
        _ => Ok(None),
    }
}
