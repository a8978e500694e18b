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

use super::lighttime::LightTimeCorrection;
use super::models::ObservationBias;
use super::{LinkEndId, ODError, UnknownBiasSnafu, UnknownCorrectionSnafu};
use crate::cosmic::{Body, CartesianState, EphemerisError, UnknownBodySnafu};
use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};
use snafu::OptionExt;
use std::fmt;
use std::sync::Arc;

/// Handle of a light time correction registered in an [`Environment`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrectionId(pub usize);

impl fmt::Display for CorrectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "correction #{}", self.0)
    }
}

/// Handle of an observation bias registered in an [`Environment`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BiasId(pub usize);

impl fmt::Display for BiasId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "bias #{}", self.0)
    }
}

/// Everything the observation models read and the estimator may adjust: the bodies with their
/// ephemerides and stations, the PPN gamma parameter, the light time corrections, and the
/// observation biases.
///
/// Corrections and biases are owned here and referred to by handle, so observation models and
/// partials never own them.
#[derive(Clone, Debug)]
pub struct Environment {
    bodies: IndexMap<String, Body>,
    /// Parametrized post-Newtonian gamma, unity in general relativity
    pub ppn_gamma: f64,
    corrections: Vec<Arc<dyn LightTimeCorrection>>,
    biases: Vec<ObservationBias>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            bodies: IndexMap::new(),
            ppn_gamma: 1.0,
            corrections: Vec::new(),
            biases: Vec::new(),
        }
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a body, replacing any body of the same name.
    pub fn with_body(mut self, body: Body) -> Self {
        self.add_body(body);
        self
    }

    pub fn add_body(&mut self, body: Body) {
        if self.bodies.insert(body.name.clone(), body).is_some() {
            warn!("replaced an existing body in the environment");
        }
    }

    pub fn body(&self, name: &str) -> Result<&Body, EphemerisError> {
        self.bodies.get(name).context(UnknownBodySnafu { name })
    }

    pub fn body_mut(&mut self, name: &str) -> Result<&mut Body, EphemerisError> {
        self.bodies.get_mut(name).context(UnknownBodySnafu { name })
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    /// Inertial state of a link end, either a body's center of mass or one of its stations.
    pub fn link_end_state(
        &self,
        id: &LinkEndId,
        epoch_s: f64,
    ) -> Result<CartesianState, EphemerisError> {
        let body = self.body(&id.body)?;
        match &id.station {
            Some(station) => body.station_state(station, epoch_s),
            None => body.state(epoch_s),
        }
    }

    pub fn register_correction(
        &mut self,
        correction: Arc<dyn LightTimeCorrection>,
    ) -> CorrectionId {
        self.corrections.push(correction);
        CorrectionId(self.corrections.len() - 1)
    }

    pub fn correction(&self, id: CorrectionId) -> Result<&dyn LightTimeCorrection, ODError> {
        self.corrections
            .get(id.0)
            .map(|c| c.as_ref())
            .context(UnknownCorrectionSnafu { id })
    }

    pub fn register_bias(&mut self, bias: ObservationBias) -> BiasId {
        self.biases.push(bias);
        BiasId(self.biases.len() - 1)
    }

    pub fn bias(&self, id: BiasId) -> Result<&ObservationBias, ODError> {
        self.biases.get(id.0).context(UnknownBiasSnafu { id })
    }

    pub fn bias_mut(&mut self, id: BiasId) -> Result<&mut ObservationBias, ODError> {
        self.biases.get_mut(id.0).context(UnknownBiasSnafu { id })
    }
}
