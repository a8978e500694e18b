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

use super::models::ObservationModelSet;
use super::{
    DimensionMismatchSnafu, Environment, LinkEndType, LinkEnds, ODError, ObservableType,
    ObservationCollection, ObservationRecord,
};
use crate::cosmic::epoch_to_seconds;
use crate::io::ConfigError;
use crate::linalg::DVector;
use crate::time::{Duration, Epoch, TimeSeries};
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use rand_pcg::Pcg64Mcg;
use snafu::ensure;
use typed_builder::TypedBuilder;

/// Which observations to simulate for one observation model.
#[derive(Clone, Debug, PartialEq, TypedBuilder)]
pub struct ObservationSimulationSettings {
    pub observable: ObservableType,
    pub link_ends: LinkEnds,
    /// Link end whose time tags the observations
    #[builder(default = LinkEndType::Receiver)]
    pub anchor: LinkEndType,
    pub epochs: Vec<Epoch>,
    /// One sigma of the white noise added to each component, none if empty
    #[builder(default)]
    pub noise_sigma: Vec<f64>,
    #[builder(default, setter(strip_option))]
    pub weight: Option<f64>,
}

/// Epochs from `start` to `end` included, every `step`.
pub fn uniform_epochs(start: Epoch, end: Epoch, step: Duration) -> Vec<Epoch> {
    TimeSeries::inclusive(start, end, step).collect()
}

/// Simulates observations from the observation models, optionally with white noise.
///
/// # Choice of the random number generator
/// The Pcg64Mcg is fast, space efficient, and seeding it makes the simulation repeatable.
#[derive(Clone, Debug)]
pub struct ObservationSimulator {
    rng: Pcg64Mcg,
}

impl ObservationSimulator {
    pub fn new() -> Self {
        Self {
            rng: Pcg64Mcg::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Pcg64Mcg::new(u128::from(seed)),
        }
    }

    /// Simulates every requested observation with the current state of the environment.
    ///
    /// Epochs which cannot be observed, e.g. because they fall outside of an ephemeris, are skipped
    /// with a warning. Any other error aborts the simulation.
    pub fn simulate(
        &mut self,
        requests: &[ObservationSimulationSettings],
        models: &ObservationModelSet,
        env: &Environment,
    ) -> Result<ObservationCollection, ODError> {
        let mut collection = ObservationCollection::default();
        for request in requests {
            let model = models.get(request.observable, &request.link_ends)?;
            let noise = noise_distributions(request)?;

            let mut skipped = 0;
            for epoch in &request.epochs {
                let value = match model.compute_observation(
                    epoch_to_seconds(*epoch),
                    request.anchor,
                    env,
                ) {
                    Ok(value) => value,
                    Err(e) if e.is_epoch_recoverable() => {
                        warn!(
                            "{} on {} @ {epoch} skipped: {e}",
                            request.observable, request.link_ends
                        );
                        skipped += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let value = match &noise {
                    Some(distributions) => DVector::from_iterator(
                        value.len(),
                        value
                            .iter()
                            .zip(distributions)
                            .map(|(v, dist)| v + self.rng.sample(dist)),
                    ),
                    None => value,
                };

                let mut record = ObservationRecord::new(
                    request.observable,
                    request.link_ends.clone(),
                    *epoch,
                    request.anchor,
                    value,
                );
                record.weight = request.weight;
                collection.push(record);
            }

            info!(
                "simulated {} {} observations on {} ({skipped} skipped)",
                request.epochs.len() - skipped,
                request.observable,
                request.link_ends
            );
        }
        Ok(collection)
    }
}

impl Default for ObservationSimulator {
    fn default() -> Self {
        Self::new()
    }
}

fn noise_distributions(
    request: &ObservationSimulationSettings,
) -> Result<Option<Vec<Normal<f64>>>, ODError> {
    if request.noise_sigma.is_empty() {
        return Ok(None);
    }
    ensure!(
        request.noise_sigma.len() == request.observable.size(),
        DimensionMismatchSnafu {
            action: "simulation noise",
            expected: request.observable.size(),
            got: request.noise_sigma.len(),
        }
    );
    request
        .noise_sigma
        .iter()
        .map(|sigma| {
            Normal::new(0.0, *sigma).map_err(|e| ODError::ODConfigError {
                source: ConfigError::InvalidConfig {
                    msg: format!("invalid noise sigma {sigma}: {e}"),
                },
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}
