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
use crate::od::models::ObservationModel;
use crate::od::{
    DimensionMismatchSnafu, Environment, LinkEndType, ODError, ODPropSnafu, ParameterSet,
};
use crate::propagators::Propagator;
use snafu::{ensure, ResultExt};

/// Sets the parameters and propagates again if they change the trajectory.
pub(crate) fn apply_and_propagate(
    params: &ParameterSet,
    values: &DVector<f64>,
    env: &mut Environment,
    mut propagator: Option<&mut (dyn Propagator + '_)>,
) -> Result<(), ODError> {
    params.apply(values, env, propagator.as_deref_mut())?;
    if params.affects_dynamics() {
        if let Some(prop) = propagator {
            let result = prop.propagate(env).context(ODPropSnafu)?;
            result.install(env);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn column(
    model: &ObservationModel,
    epoch_s: f64,
    anchor: LinkEndType,
    params: &ParameterSet,
    nominal: &DVector<f64>,
    index: usize,
    step: f64,
    env: &mut Environment,
    mut propagator: Option<&mut (dyn Propagator + '_)>,
) -> Result<DVector<f64>, ODError> {
    let mut values = nominal.clone();
    values[index] = nominal[index] + step;
    apply_and_propagate(params, &values, env, propagator.as_deref_mut())?;
    let up = model.compute_observation(epoch_s, anchor, env)?;

    values[index] = nominal[index] - step;
    apply_and_propagate(params, &values, env, propagator.as_deref_mut())?;
    let down = model.compute_observation(epoch_s, anchor, env)?;

    Ok((up - down) / (2.0 * step))
}

/// Partials of the observation with respect to every scalar of the parameter set, by central
/// differences with one step per scalar.
///
/// The propagator, if any, is run again for each perturbation of a parameter affecting the
/// dynamics. The nominal parameters and trajectory are restored before returning, including on
/// error.
pub fn central_difference(
    model: &ObservationModel,
    epoch_s: f64,
    anchor: LinkEndType,
    params: &ParameterSet,
    env: &mut Environment,
    mut propagator: Option<&mut (dyn Propagator + '_)>,
    steps: &[f64],
) -> Result<DMatrix<f64>, ODError> {
    ensure!(
        steps.len() == params.size(),
        DimensionMismatchSnafu {
            action: "central difference steps",
            expected: params.size(),
            got: steps.len(),
        }
    );

    let nominal = params.values(env, propagator.as_deref())?;
    let mut partials = DMatrix::zeros(model.size(), params.size());
    let mut outcome = Ok(());
    for (index, step) in steps.iter().enumerate() {
        match column(
            model,
            epoch_s,
            anchor,
            params,
            &nominal,
            index,
            *step,
            env,
            propagator.as_deref_mut(),
        ) {
            Ok(col) => partials.set_column(index, &col),
            Err(e) => {
                outcome = Err(e);
                break;
            }
        }
    }

    apply_and_propagate(params, &nominal, env, propagator)?;
    outcome.map(|_| partials)
}
