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

use super::{
    cartesian, CartesianState, Ephemeris, EphemerisError, RotationModel, UnknownStationSnafu,
};
use crate::linalg::{Matrix3, Vector3};
use indexmap::IndexMap;
use snafu::OptionExt;
use std::sync::Arc;

/// A celestial body or spacecraft, with its ground (or surface) stations.
#[derive(Clone, Debug)]
pub struct Body {
    pub name: String,
    /// Gravitational parameter in km^3/s^2, zero for massless bodies
    pub gm_km3_s2: f64,
    ephemeris: Arc<dyn Ephemeris>,
    rotation: Option<Arc<dyn RotationModel>>,
    /// Body-fixed station positions, in km
    stations: IndexMap<String, Vector3<f64>>,
}

impl Body {
    pub fn new(name: impl Into<String>, gm_km3_s2: f64, ephemeris: Arc<dyn Ephemeris>) -> Self {
        Self {
            name: name.into(),
            gm_km3_s2,
            ephemeris,
            rotation: None,
            stations: IndexMap::new(),
        }
    }

    /// Sets the orientation model used to place stations in the inertial frame.
    pub fn with_rotation(mut self, rotation: Arc<dyn RotationModel>) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_station(mut self, name: impl Into<String>, position_km: Vector3<f64>) -> Self {
        self.stations.insert(name.into(), position_km);
        self
    }

    pub fn ephemeris(&self) -> &Arc<dyn Ephemeris> {
        &self.ephemeris
    }

    pub fn set_ephemeris(&mut self, ephemeris: Arc<dyn Ephemeris>) {
        self.ephemeris = ephemeris;
    }

    pub fn state(&self, epoch_s: f64) -> Result<CartesianState, EphemerisError> {
        self.ephemeris.state(epoch_s)
    }

    /// Body-fixed to inertial rotation, identity if the body has no rotation model.
    pub fn dcm_to_inertial(&self, epoch_s: f64) -> Matrix3<f64> {
        match &self.rotation {
            Some(rot) => rot.dcm_to_inertial(epoch_s),
            None => Matrix3::identity(),
        }
    }

    fn dcm_to_inertial_dot(&self, epoch_s: f64) -> Matrix3<f64> {
        match &self.rotation {
            Some(rot) => rot.dcm_to_inertial_dot(epoch_s),
            None => Matrix3::zeros(),
        }
    }

    pub fn station_names(&self) -> impl Iterator<Item = &String> {
        self.stations.keys()
    }

    pub fn station_position(&self, station: &str) -> Result<Vector3<f64>, EphemerisError> {
        self.stations
            .get(station)
            .copied()
            .context(UnknownStationSnafu {
                body: self.name.clone(),
                station,
            })
    }

    pub fn set_station_position(
        &mut self,
        station: &str,
        position_km: Vector3<f64>,
    ) -> Result<(), EphemerisError> {
        let body = self.name.clone();
        let pos = self
            .stations
            .get_mut(station)
            .context(UnknownStationSnafu { body, station })?;
        *pos = position_km;
        Ok(())
    }

    /// Inertial state of a station: the body's state plus the rotated body-fixed offset.
    pub fn station_state(
        &self,
        station: &str,
        epoch_s: f64,
    ) -> Result<CartesianState, EphemerisError> {
        let r_bf = self.station_position(station)?;
        let offset = cartesian(
            &(self.dcm_to_inertial(epoch_s) * r_bf),
            &(self.dcm_to_inertial_dot(epoch_s) * r_bf),
        );
        Ok(self.state(epoch_s)? + offset)
    }
}
