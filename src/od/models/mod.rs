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

use super::lighttime::{
    ConstantDelay, FirstOrderRelativistic, LegEndpoints, LightTimeCalculator,
    LightTimeConvergence, LightTimeCorrection,
};
use super::{
    BiasId, DimensionMismatchSnafu, Environment, InvalidLinkEndsSnafu, LinkEndType, LinkEnds,
    ModelNotFoundSnafu, ODConfigSnafu, ODError, ObservableType,
};
use crate::cosmic::CartesianState;
use crate::io::{ConfigError, ConfigRepr};
use crate::linalg::DVector;
use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use std::sync::Arc;
use typed_builder::TypedBuilder;

mod angular;
mod bias;
mod differenced;
mod range;

pub use angular::AngularPosition;
pub use bias::{BiasSettings, ObservationBias};
pub use differenced::{DifferencedRange, RangeKind};
pub use range::{NWayRange, OneWayRange};

/// Times and states of the link ends actually used to compute an observation.
///
/// Entries come in pairs per leg, in signal-flow order: the transmitter at transmission time,
/// then the receiver at reception time. A differenced observable stores the legs of the start of
/// its interval first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinkEndData {
    pub epochs_s: Vec<f64>,
    pub states: Vec<CartesianState>,
}

impl LinkEndData {
    pub(crate) fn push_leg(&mut self, leg: &LegEndpoints) {
        self.epochs_s.push(leg.transmission_epoch_s);
        self.states.push(leg.transmitter);
        self.epochs_s.push(leg.reception_epoch_s);
        self.states.push(leg.receiver);
    }

    pub(crate) fn extend(&mut self, other: LinkEndData) {
        self.epochs_s.extend(other.epochs_s);
        self.states.extend(other.states);
    }

    pub fn len(&self) -> usize {
        self.epochs_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs_s.is_empty()
    }

    pub fn leg_count(&self) -> usize {
        self.len() / 2
    }

    /// Endpoints of the leg whose transmitter entry is at `index`.
    pub fn leg_at(&self, index: usize) -> Option<LegEndpoints> {
        Some(LegEndpoints {
            transmitter: *self.states.get(index)?,
            transmission_epoch_s: *self.epochs_s.get(index)?,
            receiver: *self.states.get(index + 1)?,
            reception_epoch_s: *self.epochs_s.get(index + 1)?,
        })
    }

    /// Splits these data in two at the provided entry index.
    pub fn split_at(&self, index: usize) -> (LinkEndData, LinkEndData) {
        let index = index.min(self.len());
        (
            LinkEndData {
                epochs_s: self.epochs_s[..index].to_vec(),
                states: self.states[..index].to_vec(),
            },
            LinkEndData {
                epochs_s: self.epochs_s[index..].to_vec(),
                states: self.states[index..].to_vec(),
            },
        )
    }
}

/// The strategy computing the ideal value of an observable.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelKind {
    OneWayRange(OneWayRange),
    NWayRange(NWayRange),
    AngularPosition(AngularPosition),
    DifferencedRange(DifferencedRange),
}

impl ModelKind {
    pub fn observable(&self) -> ObservableType {
        match self {
            Self::OneWayRange(_) => ObservableType::OneWayRange,
            Self::NWayRange(_) => ObservableType::NWayRange,
            Self::AngularPosition(_) => ObservableType::AngularPosition,
            Self::DifferencedRange(model) => model.observable(),
        }
    }

    /// Light time calculators of each leg, in signal-flow order.
    pub fn legs(&self) -> &[LightTimeCalculator] {
        match self {
            Self::OneWayRange(model) => std::slice::from_ref(&model.calculator),
            Self::AngularPosition(model) => std::slice::from_ref(&model.calculator),
            Self::NWayRange(model) => &model.legs,
            Self::DifferencedRange(model) => model.base.legs(),
        }
    }
}

/// An observation model: the dispatcher of one observable type on one set of link ends,
/// applying the measurement bias after the ideal observation.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationModel {
    observable: ObservableType,
    link_ends: LinkEnds,
    kind: ModelKind,
    bias: Option<BiasId>,
}

impl ObservationModel {
    /// Builds a model from its strategy, whose legs must follow the link ends.
    pub fn new(
        link_ends: LinkEnds,
        kind: ModelKind,
        bias: Option<BiasId>,
    ) -> Result<Self, ODError> {
        let observable = kind.observable();
        link_ends.validate_for(observable)?;
        let legs = kind.legs();
        ensure!(
            legs.len() + 1 == link_ends.len(),
            InvalidLinkEndsSnafu {
                observable,
                details: format!("{} legs for {} link ends", legs.len(), link_ends.len())
            }
        );
        for (i, leg) in legs.iter().enumerate() {
            let tx = link_ends.get(link_ends.role_at(i));
            let rx = link_ends.get(link_ends.role_at(i + 1));
            ensure!(
                tx == Some(&leg.transmitter) && rx == Some(&leg.receiver),
                InvalidLinkEndsSnafu {
                    observable,
                    details: format!(
                        "leg {i} from {} to {} does not follow {link_ends}",
                        leg.transmitter, leg.receiver
                    )
                }
            );
        }

        Ok(Self {
            observable,
            link_ends,
            kind,
            bias,
        })
    }

    /// Builds a model from its settings, registering its corrections and bias in the environment.
    pub fn from_settings(
        settings: &ObservationModelSettings,
        env: &mut Environment,
    ) -> Result<Self, ODError> {
        let observable = settings.observable;
        let link_ends = settings.link_ends.clone();
        link_ends.validate_for(observable)?;

        // One registration per model, shared by all of its legs
        let corrections: Vec<_> = settings
            .corrections
            .iter()
            .map(|correction| env.register_correction(correction.build()))
            .collect();

        let ends: Vec<_> = link_ends.iter().map(|(_, id)| id.clone()).collect();
        let legs: Vec<LightTimeCalculator> = ends
            .windows(2)
            .map(|pair| {
                LightTimeCalculator::new(pair[0].clone(), pair[1].clone())
                    .with_corrections(corrections.clone())
                    .with_convergence(settings.light_time)
            })
            .collect();

        let invalid = |msg: String| ODError::ODConfigError {
            source: ConfigError::InvalidConfig { msg },
        };
        if observable.is_single_leg() && !settings.retransmission_delays_s.is_empty() {
            return Err(invalid(format!("{observable} has no retransmitter to delay")));
        }
        if !observable.is_differenced() && settings.integration_time_s.is_some() {
            return Err(invalid(format!("{observable} does not use an integration time")));
        }

        let delays = if settings.retransmission_delays_s.is_empty() {
            vec![0.0; legs.len() - 1]
        } else {
            settings.retransmission_delays_s.clone()
        };

        let differenced = |base: RangeKind| -> Result<ModelKind, ODError> {
            match settings.integration_time_s {
                Some(dt) if dt > 0.0 => Ok(ModelKind::DifferencedRange(DifferencedRange {
                    base,
                    integration_time_s: dt,
                    averaged: observable.is_range_rate(),
                })),
                _ => Err(invalid(format!("{observable} requires a positive integration time"))),
            }
        };

        let kind = match observable {
            ObservableType::OneWayRange => ModelKind::OneWayRange(OneWayRange {
                calculator: legs[0].clone(),
            }),
            ObservableType::NWayRange => ModelKind::NWayRange(NWayRange::new(legs, delays)?),
            ObservableType::AngularPosition => ModelKind::AngularPosition(AngularPosition {
                calculator: legs[0].clone(),
            }),
            ObservableType::OneWayDifferencedRange | ObservableType::OneWayRangeRate => {
                differenced(RangeKind::OneWay(OneWayRange {
                    calculator: legs[0].clone(),
                }))?
            }
            ObservableType::NWayDifferencedRange | ObservableType::NWayRangeRate => {
                differenced(RangeKind::NWay(NWayRange::new(legs, delays)?))?
            }
        };

        let bias = match &settings.bias {
            Some(bias_settings) => {
                let bias = ObservationBias::from(bias_settings);
                ensure!(
                    bias.size() == observable.size(),
                    DimensionMismatchSnafu {
                        action: "observation bias",
                        expected: observable.size(),
                        got: bias.size(),
                    }
                );
                Some(env.register_bias(bias))
            }
            None => None,
        };

        Self::new(link_ends, kind, bias)
    }

    pub fn observable(&self) -> ObservableType {
        self.observable
    }

    pub fn link_ends(&self) -> &LinkEnds {
        &self.link_ends
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    pub fn bias(&self) -> Option<BiasId> {
        self.bias
    }

    /// Number of components of the observable
    pub fn size(&self) -> usize {
        self.observable.size()
    }

    /// Light time calculators of each leg, in signal-flow order.
    pub fn legs(&self) -> &[LightTimeCalculator] {
        self.kind.legs()
    }

    /// Ideal observation, i.e. without bias, at the provided time of the anchor link end.
    pub fn compute_ideal_observation(
        &self,
        epoch_s: f64,
        anchor: LinkEndType,
        env: &Environment,
    ) -> Result<DVector<f64>, ODError> {
        Ok(self
            .compute_ideal_observation_with_link_end_data(epoch_s, anchor, env)?
            .0)
    }

    /// Ideal observation and the link end times and states used to compute it.
    pub fn compute_ideal_observation_with_link_end_data(
        &self,
        epoch_s: f64,
        anchor: LinkEndType,
        env: &Environment,
    ) -> Result<(DVector<f64>, LinkEndData), ODError> {
        self.link_ends.require(anchor)?;
        let link_ends = &self.link_ends;
        match &self.kind {
            ModelKind::OneWayRange(model) => model
                .compute(epoch_s, anchor, link_ends, env)
                .map(|(range_km, data)| (DVector::from_element(1, range_km), data)),
            ModelKind::NWayRange(model) => model
                .compute(epoch_s, anchor, link_ends, env)
                .map(|(range_km, data)| (DVector::from_element(1, range_km), data)),
            ModelKind::DifferencedRange(model) => model
                .compute(epoch_s, anchor, link_ends, env)
                .map(|(delta, data)| (DVector::from_element(1, delta), data)),
            ModelKind::AngularPosition(model) => model
                .compute(epoch_s, anchor, link_ends, env)
                .map(|(angles, data)| (DVector::from_column_slice(angles.as_slice()), data)),
        }
    }

    /// Observation including the bias.
    pub fn compute_observation(
        &self,
        epoch_s: f64,
        anchor: LinkEndType,
        env: &Environment,
    ) -> Result<DVector<f64>, ODError> {
        Ok(self
            .compute_observation_with_link_end_data(epoch_s, anchor, env)?
            .0)
    }

    pub fn compute_observation_with_link_end_data(
        &self,
        epoch_s: f64,
        anchor: LinkEndType,
        env: &Environment,
    ) -> Result<(DVector<f64>, LinkEndData), ODError> {
        let (ideal, data) =
            self.compute_ideal_observation_with_link_end_data(epoch_s, anchor, env)?;
        let observation = match self.bias {
            Some(id) => &ideal + env.bias(id)?.value(epoch_s, &ideal),
            None => ideal,
        };
        Ok((observation, data))
    }
}

/// Serializable form of a light time correction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CorrectionSettings {
    #[serde(rename = "first_order_relativistic")]
    FirstOrderRelativistic { perturbing_bodies: Vec<String> },
    #[serde(rename = "constant_delay")]
    ConstantDelay { delay_s: f64 },
}

impl CorrectionSettings {
    pub fn build(&self) -> Arc<dyn LightTimeCorrection> {
        match self {
            Self::FirstOrderRelativistic { perturbing_bodies } => {
                Arc::new(FirstOrderRelativistic::new(perturbing_bodies.clone()))
            }
            Self::ConstantDelay { delay_s } => Arc::new(ConstantDelay { delay_s: *delay_s }),
        }
    }
}

/// Configuration of one observation model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, TypedBuilder)]
pub struct ObservationModelSettings {
    pub observable: ObservableType,
    /// Link ends in signal-flow order
    pub link_ends: LinkEnds,
    /// Corrections applied to every leg
    #[serde(default)]
    #[builder(default)]
    pub corrections: Vec<CorrectionSettings>,
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub bias: Option<BiasSettings>,
    /// Delay at each retransmitter, zero if empty
    #[serde(default)]
    #[builder(default)]
    pub retransmission_delays_s: Vec<f64>,
    /// Count interval of differenced observables and range rates
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub integration_time_s: Option<f64>,
    #[serde(default)]
    #[builder(default)]
    pub light_time: LightTimeConvergence,
}

impl ConfigRepr for ObservationModelSettings {}

/// Observation models, one per observable type and link ends.
#[derive(Clone, Debug, Default)]
pub struct ObservationModelSet {
    models: IndexMap<(ObservableType, LinkEnds), ObservationModel>,
}

impl ObservationModelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(
        settings: &[ObservationModelSettings],
        env: &mut Environment,
    ) -> Result<Self, ODError> {
        let mut set = Self::new();
        for model_settings in settings {
            set.insert(ObservationModel::from_settings(model_settings, env)?);
        }
        Ok(set)
    }

    /// Inserts a model, returning the model it replaced if any.
    pub fn insert(&mut self, model: ObservationModel) -> Option<ObservationModel> {
        self.models
            .insert((model.observable(), model.link_ends().clone()), model)
    }

    pub fn get(
        &self,
        observable: ObservableType,
        link_ends: &LinkEnds,
    ) -> Result<&ObservationModel, ODError> {
        self.models
            .get(&(observable, link_ends.clone()))
            .context(ModelNotFoundSnafu {
                observable,
                link_ends: link_ends.clone(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservationModel> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Loads model settings from YAML and reports a configuration error as an OD error.
pub fn load_model_settings(path: &str) -> Result<Vec<ObservationModelSettings>, ODError> {
    ObservationModelSettings::load_many(path).context(ODConfigSnafu)
}
