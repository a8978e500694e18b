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

use super::msr::ObservableType;
use super::{InvalidLinkEndRoleSnafu, InvalidLinkEndsSnafu, ODError};
use serde_derive::{Deserialize, Serialize};
use snafu::{ensure, OptionExt};
use std::collections::BTreeMap;
use std::fmt;

/// A physical point where a signal is emitted, relayed, or received: a body's center of mass or
/// one of its stations.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkEndId {
    pub body: String,
    #[serde(default)]
    pub station: Option<String>,
}

impl LinkEndId {
    /// A link end at the center of mass of a body, e.g. a spacecraft.
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            station: None,
        }
    }

    /// A link end at a station fixed on a body.
    pub fn station(body: impl Into<String>, station: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            station: Some(station.into()),
        }
    }
}

impl fmt::Display for LinkEndId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.station {
            Some(station) => write!(f, "{}/{station}", self.body),
            None => write!(f, "{}", self.body),
        }
    }
}

/// Role of a link end. The ordering of the variants is the signal-flow order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkEndType {
    Transmitter,
    /// Retransmitters are numbered from 1 in signal-flow order
    Retransmitter(usize),
    Receiver,
}

impl fmt::Display for LinkEndType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Transmitter => write!(f, "transmitter"),
            Self::Retransmitter(n) => write!(f, "retransmitter #{n}"),
            Self::Receiver => write!(f, "receiver"),
        }
    }
}

/// The set of link ends of one observable, keyed by role and iterated in signal-flow order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<LinkEndId>", into = "Vec<LinkEndId>")]
pub struct LinkEnds {
    ends: BTreeMap<LinkEndType, LinkEndId>,
}

impl LinkEnds {
    pub fn one_way(transmitter: LinkEndId, receiver: LinkEndId) -> Self {
        let mut ends = BTreeMap::new();
        ends.insert(LinkEndType::Transmitter, transmitter);
        ends.insert(LinkEndType::Receiver, receiver);
        Self { ends }
    }

    /// Builds the link ends from the signal path, transmitter first and receiver last.
    pub fn from_path(path: Vec<LinkEndId>) -> Result<Self, ODError> {
        let n = path.len();
        ensure!(
            n >= 2,
            InvalidLinkEndsSnafu {
                observable: ObservableType::NWayRange,
                details: format!("a signal path needs at least two link ends, got {n}")
            }
        );
        let ends = path
            .into_iter()
            .enumerate()
            .map(|(i, id)| (role_at(i, n), id))
            .collect();
        Ok(Self { ends })
    }

    /// Inserts or replaces the link end of the provided role.
    pub fn insert(&mut self, role: LinkEndType, id: LinkEndId) -> Option<LinkEndId> {
        self.ends.insert(role, id)
    }

    pub fn get(&self, role: LinkEndType) -> Option<&LinkEndId> {
        self.ends.get(&role)
    }

    /// Returns the link end of this role, or an `InvalidLinkEndRole` error.
    pub fn require(&self, role: LinkEndType) -> Result<&LinkEndId, ODError> {
        self.ends.get(&role).context(InvalidLinkEndRoleSnafu {
            role,
            link_ends: self.clone(),
        })
    }

    pub fn contains(&self, role: LinkEndType) -> bool {
        self.ends.contains_key(&role)
    }

    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Iterates over the link ends in signal-flow order.
    pub fn iter(&self) -> impl Iterator<Item = (&LinkEndType, &LinkEndId)> {
        self.ends.iter()
    }

    /// Position of this role along the signal path.
    pub fn index_of(&self, role: LinkEndType) -> Option<usize> {
        self.ends.keys().position(|r| *r == role)
    }

    /// Role of the link end at this position along the signal path.
    pub fn role_at(&self, index: usize) -> LinkEndType {
        role_at(index, self.len())
    }

    /// Checks that these link ends form a valid topology for the provided observable: one
    /// transmitter, one receiver, and contiguously numbered retransmitters in between.
    pub fn validate_for(&self, observable: ObservableType) -> Result<(), ODError> {
        let n = self.len();
        ensure!(
            self.contains(LinkEndType::Transmitter) && self.contains(LinkEndType::Receiver),
            InvalidLinkEndsSnafu {
                observable,
                details: format!("{self} lacks a transmitter or a receiver")
            }
        );
        for (i, role) in self.ends.keys().enumerate() {
            ensure!(
                *role == role_at(i, n),
                InvalidLinkEndsSnafu {
                    observable,
                    details: format!("unexpected {role} at position {i} of {n}")
                }
            );
        }
        if observable.is_single_leg() {
            ensure!(
                n == 2,
                InvalidLinkEndsSnafu {
                    observable,
                    details: format!("expected two link ends, got {n}")
                }
            );
        }
        Ok(())
    }
}

pub(crate) fn role_at(index: usize, count: usize) -> LinkEndType {
    if index == 0 {
        LinkEndType::Transmitter
    } else if index + 1 == count {
        LinkEndType::Receiver
    } else {
        LinkEndType::Retransmitter(index)
    }
}

/// Position of a role along a signal path of `count` link ends, if the role exists on it.
pub(crate) fn role_index(role: LinkEndType, count: usize) -> Option<usize> {
    match role {
        _ if count < 2 => None,
        LinkEndType::Transmitter => Some(0),
        LinkEndType::Receiver => Some(count - 1),
        LinkEndType::Retransmitter(n) if n >= 1 && n + 1 < count => Some(n),
        LinkEndType::Retransmitter(_) => None,
    }
}

impl TryFrom<Vec<LinkEndId>> for LinkEnds {
    type Error = ODError;

    fn try_from(path: Vec<LinkEndId>) -> Result<Self, Self::Error> {
        Self::from_path(path)
    }
}

impl From<LinkEnds> for Vec<LinkEndId> {
    fn from(link_ends: LinkEnds) -> Self {
        link_ends.ends.into_values().collect()
    }
}

impl fmt::Display for LinkEnds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let path: Vec<String> = self.ends.values().map(|id| format!("{id}")).collect();
        write!(f, "{}", path.join(" -> "))
    }
}
