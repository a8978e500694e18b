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

use crate::cosmic::{position, velocity, SPEED_OF_LIGHT_KM_S};
use crate::linalg::{DMatrix, DVector, Matrix2x3, Matrix3, Vector2, Vector3};
use crate::od::lighttime::LegEndpoints;
use crate::od::links::{role_at, role_index};
use crate::od::models::{LinkEndData, ModelKind};
use crate::od::{
    DimensionMismatchSnafu, IncompatibleLinkEndSnafu, LinkEndType, ODError, ObservableType,
};
use crate::utils::right_ascension_declination_partials;
use snafu::{ensure, OptionExt};

/// Contribution of the position of one link end entry to the observable.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionTerm {
    /// Index of the entry in the link end data
    pub data_index: usize,
    pub role: LinkEndType,
    /// Observable size by 3 matrix multiplying the partial of the entry's position
    pub scaling: DMatrix<f64>,
}

/// Contribution of the light time corrections of one leg to the observable.
#[derive(Clone, Debug, PartialEq)]
pub struct LightTimeTerm {
    /// Index of the leg in the link end data
    pub data_leg: usize,
    /// Index of the leg in the observation model, whose corrections apply
    pub model_leg: usize,
    /// Multiplies the speed of light times the partial of the corrections of that leg
    pub factor: DVector<f64>,
}

/// Line of sight and transit rates of one leg.
///
/// With ŝ the unit vector from the transmitter at transmission to the receiver at reception,
/// `transmitter_rate` is 1 - ŝ·v_tx/c and `receiver_rate` is 1 - ŝ·v_rx/c. They are the ratios of
/// the reception time derivative to the transmission time derivative and its inverse.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
struct LegGeometry {
    line_of_sight: Vector3<f64>,
    transmitter_rate: f64,
    receiver_rate: f64,
}

impl LegGeometry {
    fn new(leg: &LegEndpoints) -> Self {
        let los = position(&leg.receiver) - position(&leg.transmitter);
        let line_of_sight = los / los.norm();
        Self {
            line_of_sight,
            transmitter_rate: 1.0
                - line_of_sight.dot(&velocity(&leg.transmitter)) / SPEED_OF_LIGHT_KM_S,
            receiver_rate: 1.0 - line_of_sight.dot(&velocity(&leg.receiver)) / SPEED_OF_LIGHT_KM_S,
        }
    }

    fn row(&self, factor: f64) -> DMatrix<f64> {
        DMatrix::from_row_slice(1, 3, (self.line_of_sight * factor).as_slice())
    }
}

fn check_update(
    observable: ObservableType,
    data: &LinkEndData,
    observation: &DVector<f64>,
) -> Result<(), ODError> {
    ensure!(
        observation.len() == observable.size(),
        DimensionMismatchSnafu {
            action: "scaling update observation",
            expected: observable.size(),
            got: observation.len(),
        }
    );
    ensure!(
        data.len() >= 2 && data.len() % 2 == 0,
        DimensionMismatchSnafu {
            action: "scaling update link end data",
            expected: 2 * (data.len() / 2).max(1),
            got: data.len(),
        }
    );
    Ok(())
}

fn sum_role(terms: &[PositionTerm], role: LinkEndType, size: usize) -> DMatrix<f64> {
    terms
        .iter()
        .filter(|term| term.role == role)
        .fold(DMatrix::zeros(size, 3), |acc, term| acc + &term.scaling)
}

fn leg_factor(
    terms: Vec<LightTimeTerm>,
    leg: usize,
    observable: ObservableType,
    fixed: LinkEndType,
) -> Result<DVector<f64>, ODError> {
    terms
        .into_iter()
        .find(|term| term.data_leg == leg)
        .map(|term| term.factor)
        .context(IncompatibleLinkEndSnafu { fixed, observable })
}

/// Scaling of a one-way range.
///
/// With the reception time fixed, the receiver position enters with ŝ and the transmitter with
/// -ŝ, both divided by the transmitter rate. With the transmission time fixed, the divisor is the
/// receiver rate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OneWayRangeScaling {
    geometry: LegGeometry,
}

impl OneWayRangeScaling {
    pub fn update(
        &mut self,
        data: &LinkEndData,
        fixed: LinkEndType,
        observation: &DVector<f64>,
    ) -> Result<(), ODError> {
        check_update(ObservableType::OneWayRange, data, observation)?;
        self.factor(fixed)?;
        let leg = data.leg_at(0).context(DimensionMismatchSnafu {
            action: "one-way range link end data",
            expected: 2_usize,
            got: data.len(),
        })?;
        self.geometry = LegGeometry::new(&leg);
        Ok(())
    }

    fn factor(&self, fixed: LinkEndType) -> Result<f64, ODError> {
        match fixed {
            LinkEndType::Receiver => Ok(1.0 / self.geometry.transmitter_rate),
            LinkEndType::Transmitter => Ok(1.0 / self.geometry.receiver_rate),
            LinkEndType::Retransmitter(_) => IncompatibleLinkEndSnafu {
                fixed,
                observable: ObservableType::OneWayRange,
            }
            .fail(),
        }
    }

    pub fn position_terms(&self, fixed: LinkEndType) -> Result<Vec<PositionTerm>, ODError> {
        let k = self.factor(fixed)?;
        Ok(vec![
            PositionTerm {
                data_index: 0,
                role: LinkEndType::Transmitter,
                scaling: self.geometry.row(-k),
            },
            PositionTerm {
                data_index: 1,
                role: LinkEndType::Receiver,
                scaling: self.geometry.row(k),
            },
        ])
    }

    pub fn light_time_terms(&self, fixed: LinkEndType) -> Result<Vec<LightTimeTerm>, ODError> {
        Ok(vec![LightTimeTerm {
            data_leg: 0,
            model_leg: 0,
            factor: DVector::from_element(1, self.factor(fixed)?),
        }])
    }

    pub fn scaling_factor(
        &self,
        differentiated: LinkEndType,
        fixed: LinkEndType,
    ) -> Result<DMatrix<f64>, ODError> {
        let k = self.factor(fixed)?;
        match differentiated {
            LinkEndType::Transmitter => Ok(self.geometry.row(-k)),
            LinkEndType::Receiver => Ok(self.geometry.row(k)),
            LinkEndType::Retransmitter(_) => IncompatibleLinkEndSnafu {
                fixed: differentiated,
                observable: ObservableType::OneWayRange,
            }
            .fail(),
        }
    }

    pub fn light_time_partial_scaling_factor(&self, fixed: LinkEndType) -> Result<f64, ODError> {
        self.factor(fixed)
    }
}

/// Scaling of a range along a chain of legs.
///
/// A perturbation of the geometry of a leg changes its light time, which shifts every time
/// downstream of the fixed link end. Legs after the fixed link end propagate the shift forward
/// through the ratio of transit rates of the following legs, legs before it propagate it
/// backward.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NWayRangeScaling {
    legs: Vec<LegGeometry>,
}

impl NWayRangeScaling {
    pub fn update(
        &mut self,
        data: &LinkEndData,
        fixed: LinkEndType,
        observation: &DVector<f64>,
    ) -> Result<(), ODError> {
        check_update(ObservableType::NWayRange, data, observation)?;
        let legs: Vec<LegGeometry> = (0..data.leg_count())
            .filter_map(|i| data.leg_at(2 * i))
            .map(|leg| LegGeometry::new(&leg))
            .collect();
        self.fixed_index(fixed, legs.len())?;
        self.legs = legs;
        Ok(())
    }

    fn fixed_index(&self, fixed: LinkEndType, leg_count: usize) -> Result<usize, ODError> {
        role_index(fixed, leg_count + 1).context(IncompatibleLinkEndSnafu {
            fixed,
            observable: ObservableType::NWayRange,
        })
    }

    /// Factor of the light time change of each leg in the total range rate.
    fn betas(&self, fixed: LinkEndType) -> Result<Vec<f64>, ODError> {
        let n = self.legs.len();
        let k = self.fixed_index(fixed, n)?;
        let betas = (0..n)
            .map(|i| {
                if i >= k {
                    self.legs[i + 1..]
                        .iter()
                        .fold(1.0 / self.legs[i].receiver_rate, |beta, leg| {
                            beta * leg.transmitter_rate / leg.receiver_rate
                        })
                } else {
                    self.legs[..i]
                        .iter()
                        .fold(1.0 / self.legs[i].transmitter_rate, |beta, leg| {
                            beta * leg.receiver_rate / leg.transmitter_rate
                        })
                }
            })
            .collect();
        Ok(betas)
    }

    pub fn position_terms(&self, fixed: LinkEndType) -> Result<Vec<PositionTerm>, ODError> {
        let count = self.legs.len() + 1;
        let betas = self.betas(fixed)?;
        let mut terms = Vec::with_capacity(2 * self.legs.len());
        for (i, (leg, beta)) in self.legs.iter().zip(betas).enumerate() {
            terms.push(PositionTerm {
                data_index: 2 * i,
                role: role_at(i, count),
                scaling: leg.row(-beta),
            });
            terms.push(PositionTerm {
                data_index: 2 * i + 1,
                role: role_at(i + 1, count),
                scaling: leg.row(beta),
            });
        }
        Ok(terms)
    }

    pub fn light_time_terms(&self, fixed: LinkEndType) -> Result<Vec<LightTimeTerm>, ODError> {
        Ok(self
            .betas(fixed)?
            .into_iter()
            .enumerate()
            .map(|(i, beta)| LightTimeTerm {
                data_leg: i,
                model_leg: i,
                factor: DVector::from_element(1, beta),
            })
            .collect())
    }

    /// Sum of the scalings of every appearance of the differentiated link end: a retransmitter
    /// receives and transmits.
    pub fn scaling_factor(
        &self,
        differentiated: LinkEndType,
        fixed: LinkEndType,
    ) -> Result<DMatrix<f64>, ODError> {
        self.fixed_index(differentiated, self.legs.len())?;
        Ok(sum_role(&self.position_terms(fixed)?, differentiated, 1))
    }

    pub fn light_time_partial_scaling_factor(
        &self,
        leg: usize,
        fixed: LinkEndType,
    ) -> Result<f64, ODError> {
        Ok(leg_factor(self.light_time_terms(fixed)?, leg, ObservableType::NWayRange, fixed)?[0])
    }
}

/// Scaling of the right ascension and declination of the line of sight u = r_tx - r_rx.
///
/// With A the partials of the angles with respect to u, û its direction and v the velocity of the
/// free link end, the transmitter position enters with A (I - v ûᵀ / (c + û·v)) and the receiver
/// with the opposite.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AngularPositionScaling {
    angle_partials: Matrix2x3<f64>,
    unit: Vector3<f64>,
    transmitter_velocity: Vector3<f64>,
    receiver_velocity: Vector3<f64>,
}

impl AngularPositionScaling {
    pub fn update(
        &mut self,
        data: &LinkEndData,
        fixed: LinkEndType,
        observation: &DVector<f64>,
    ) -> Result<(), ODError> {
        check_update(ObservableType::AngularPosition, data, observation)?;
        self.free_velocity(fixed)?;
        let leg = data.leg_at(0).context(DimensionMismatchSnafu {
            action: "angular position link end data",
            expected: 2_usize,
            got: data.len(),
        })?;
        let u = position(&leg.transmitter) - position(&leg.receiver);
        self.angle_partials = right_ascension_declination_partials(&u);
        self.unit = u / u.norm();
        self.transmitter_velocity = velocity(&leg.transmitter);
        self.receiver_velocity = velocity(&leg.receiver);
        Ok(())
    }

    fn free_velocity(&self, fixed: LinkEndType) -> Result<Vector3<f64>, ODError> {
        match fixed {
            LinkEndType::Receiver => Ok(self.transmitter_velocity),
            LinkEndType::Transmitter => Ok(self.receiver_velocity),
            LinkEndType::Retransmitter(_) => IncompatibleLinkEndSnafu {
                fixed,
                observable: ObservableType::AngularPosition,
            }
            .fail(),
        }
    }

    fn transmitter_scaling(&self, fixed: LinkEndType) -> Result<Matrix2x3<f64>, ODError> {
        let v = self.free_velocity(fixed)?;
        let denom = SPEED_OF_LIGHT_KM_S + self.unit.dot(&v);
        Ok(self.angle_partials * (Matrix3::identity() - v * self.unit.transpose() / denom))
    }

    pub fn position_terms(&self, fixed: LinkEndType) -> Result<Vec<PositionTerm>, ODError> {
        let scaling = self.transmitter_scaling(fixed)?;
        Ok(vec![
            PositionTerm {
                data_index: 0,
                role: LinkEndType::Transmitter,
                scaling: DMatrix::from_column_slice(2, 3, scaling.as_slice()),
            },
            PositionTerm {
                data_index: 1,
                role: LinkEndType::Receiver,
                scaling: DMatrix::from_column_slice(2, 3, (-scaling).as_slice()),
            },
        ])
    }

    pub fn light_time_terms(&self, fixed: LinkEndType) -> Result<Vec<LightTimeTerm>, ODError> {
        Ok(vec![LightTimeTerm {
            data_leg: 0,
            model_leg: 0,
            factor: DVector::from_column_slice(
                self.light_time_partial_scaling_factor(fixed)?.as_slice(),
            ),
        }])
    }

    pub fn scaling_factor(
        &self,
        differentiated: LinkEndType,
        fixed: LinkEndType,
    ) -> Result<DMatrix<f64>, ODError> {
        let scaling = self.transmitter_scaling(fixed)?;
        match differentiated {
            LinkEndType::Transmitter => Ok(DMatrix::from_column_slice(2, 3, scaling.as_slice())),
            LinkEndType::Receiver => Ok(DMatrix::from_column_slice(2, 3, (-scaling).as_slice())),
            LinkEndType::Retransmitter(_) => IncompatibleLinkEndSnafu {
                fixed: differentiated,
                observable: ObservableType::AngularPosition,
            }
            .fail(),
        }
    }

    /// Rate of change of the angles with the light time, divided by the speed of light.
    pub fn light_time_partial_scaling_factor(
        &self,
        fixed: LinkEndType,
    ) -> Result<Vector2<f64>, ODError> {
        let v = self.free_velocity(fixed)?;
        let denom = SPEED_OF_LIGHT_KM_S + self.unit.dot(&v);
        Ok(-(self.angle_partials * v) / denom)
    }
}

/// Scaling of a differenced range: the terms of the end of the interval minus those of its start.
/// The terms of a range rate are further divided by the integration time.
#[derive(Clone, Debug, PartialEq)]
pub struct DifferencedRangeScaling {
    observable: ObservableType,
    start: Box<PositionPartialScaling>,
    end: Box<PositionPartialScaling>,
    start_len: usize,
    divisor: f64,
}

impl DifferencedRangeScaling {
    fn new(observable: ObservableType, base: PositionPartialScaling) -> Self {
        Self {
            observable,
            start: Box::new(base.clone()),
            end: Box::new(base),
            start_len: 0,
            divisor: 1.0,
        }
    }

    pub fn update(
        &mut self,
        data: &LinkEndData,
        fixed: LinkEndType,
        observation: &DVector<f64>,
    ) -> Result<(), ODError> {
        check_update(self.observable, data, observation)?;
        ensure!(
            data.len() % 4 == 0,
            DimensionMismatchSnafu {
                action: "differenced range link end data",
                expected: 4 * (data.len() / 4).max(1),
                got: data.len(),
            }
        );
        let half = data.len() / 2;
        let (start, end) = data.split_at(half);
        self.start.update(&start, fixed, observation)?;
        self.end.update(&end, fixed, observation)?;
        self.start_len = half;
        Ok(())
    }

    pub fn position_terms(&self, fixed: LinkEndType) -> Result<Vec<PositionTerm>, ODError> {
        let mut terms: Vec<PositionTerm> = self
            .start
            .position_terms(fixed)?
            .into_iter()
            .map(|term| PositionTerm {
                scaling: -term.scaling / self.divisor,
                ..term
            })
            .collect();
        terms.extend(
            self.end
                .position_terms(fixed)?
                .into_iter()
                .map(|term| PositionTerm {
                    data_index: term.data_index + self.start_len,
                    scaling: term.scaling / self.divisor,
                    ..term
                }),
        );
        Ok(terms)
    }

    pub fn light_time_terms(&self, fixed: LinkEndType) -> Result<Vec<LightTimeTerm>, ODError> {
        let start_legs = self.start_len / 2;
        let mut terms: Vec<LightTimeTerm> = self
            .start
            .light_time_terms(fixed)?
            .into_iter()
            .map(|term| LightTimeTerm {
                factor: -term.factor / self.divisor,
                ..term
            })
            .collect();
        terms.extend(
            self.end
                .light_time_terms(fixed)?
                .into_iter()
                .map(|term| LightTimeTerm {
                    data_leg: term.data_leg + start_legs,
                    factor: term.factor / self.divisor,
                    ..term
                }),
        );
        Ok(terms)
    }

    pub fn scaling_factor(
        &self,
        differentiated: LinkEndType,
        fixed: LinkEndType,
    ) -> Result<DMatrix<f64>, ODError> {
        Ok((self.end.scaling_factor(differentiated, fixed)?
            - self.start.scaling_factor(differentiated, fixed)?)
            / self.divisor)
    }
}

/// Link end scaling of any observable, converting the partial of a link end position at fixed
/// light time into the partial of the observable.
///
/// The scaling depends on which link end has its time fixed, so it must be updated with the link
/// end data of every observation before use.
#[derive(Clone, Debug, PartialEq)]
pub enum PositionPartialScaling {
    OneWayRange(OneWayRangeScaling),
    NWayRange(NWayRangeScaling),
    AngularPosition(AngularPositionScaling),
    DifferencedRange(DifferencedRangeScaling),
}

impl PositionPartialScaling {
    /// Scaling of an observable, where a range rate is scaled as the range difference over a unit
    /// integration time. See [`Self::for_model`].
    pub fn for_observable(observable: ObservableType) -> Self {
        match observable {
            ObservableType::OneWayRange => Self::OneWayRange(OneWayRangeScaling::default()),
            ObservableType::NWayRange => Self::NWayRange(NWayRangeScaling::default()),
            ObservableType::AngularPosition => {
                Self::AngularPosition(AngularPositionScaling::default())
            }
            ObservableType::OneWayDifferencedRange | ObservableType::OneWayRangeRate => {
                Self::DifferencedRange(DifferencedRangeScaling::new(
                    observable,
                    Self::OneWayRange(OneWayRangeScaling::default()),
                ))
            }
            ObservableType::NWayDifferencedRange | ObservableType::NWayRangeRate => {
                Self::DifferencedRange(DifferencedRangeScaling::new(
                    observable,
                    Self::NWayRange(NWayRangeScaling::default()),
                ))
            }
        }
    }

    /// Scaling of the observable of a model, with the integration time of a range rate.
    pub fn for_model(kind: &ModelKind) -> Self {
        let mut scaling = Self::for_observable(kind.observable());
        if let (Self::DifferencedRange(differenced), ModelKind::DifferencedRange(model)) =
            (&mut scaling, kind)
        {
            differenced.divisor = model.divisor();
        }
        scaling
    }

    pub fn observable(&self) -> ObservableType {
        match self {
            Self::OneWayRange(_) => ObservableType::OneWayRange,
            Self::NWayRange(_) => ObservableType::NWayRange,
            Self::AngularPosition(_) => ObservableType::AngularPosition,
            Self::DifferencedRange(scaling) => scaling.observable,
        }
    }

    /// Recomputes the scaling from the link end data of an observation. Only the size of the
    /// observation is used.
    pub fn update(
        &mut self,
        data: &LinkEndData,
        fixed: LinkEndType,
        observation: &DVector<f64>,
    ) -> Result<(), ODError> {
        match self {
            Self::OneWayRange(scaling) => scaling.update(data, fixed, observation),
            Self::NWayRange(scaling) => scaling.update(data, fixed, observation),
            Self::AngularPosition(scaling) => scaling.update(data, fixed, observation),
            // The base of a differenced range sees the differenced observation
            Self::DifferencedRange(scaling) => scaling.update(data, fixed, observation),
        }
    }

    /// Scaling of the position partial of the differentiated link end, as an observable size by 3
    /// matrix.
    pub fn scaling_factor(
        &self,
        differentiated: LinkEndType,
        fixed: LinkEndType,
    ) -> Result<DMatrix<f64>, ODError> {
        match self {
            Self::OneWayRange(scaling) => scaling.scaling_factor(differentiated, fixed),
            Self::NWayRange(scaling) => scaling.scaling_factor(differentiated, fixed),
            Self::AngularPosition(scaling) => scaling.scaling_factor(differentiated, fixed),
            Self::DifferencedRange(scaling) => scaling.scaling_factor(differentiated, fixed),
        }
    }

    /// Factor multiplying the speed of light times the partial of a light time correction of the
    /// provided leg of the link end data.
    pub fn light_time_partial_scaling_factor(
        &self,
        leg: usize,
        fixed: LinkEndType,
    ) -> Result<DVector<f64>, ODError> {
        leg_factor(self.light_time_terms(fixed)?, leg, self.observable(), fixed)
    }

    /// Position contributions of every entry of the link end data.
    pub fn position_terms(&self, fixed: LinkEndType) -> Result<Vec<PositionTerm>, ODError> {
        match self {
            Self::OneWayRange(scaling) => scaling.position_terms(fixed),
            Self::NWayRange(scaling) => scaling.position_terms(fixed),
            Self::AngularPosition(scaling) => scaling.position_terms(fixed),
            Self::DifferencedRange(scaling) => scaling.position_terms(fixed),
        }
    }

    /// Light time correction contributions of every leg of the link end data.
    pub fn light_time_terms(&self, fixed: LinkEndType) -> Result<Vec<LightTimeTerm>, ODError> {
        match self {
            Self::OneWayRange(scaling) => scaling.light_time_terms(fixed),
            Self::NWayRange(scaling) => scaling.light_time_terms(fixed),
            Self::AngularPosition(scaling) => scaling.light_time_terms(fixed),
            Self::DifferencedRange(scaling) => scaling.light_time_terms(fixed),
        }
    }
}
