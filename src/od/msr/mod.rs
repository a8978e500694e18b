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

use super::{LinkEndType, LinkEnds};
use crate::cosmic::epoch_to_seconds;
use crate::linalg::DVector;
use crate::time::{Duration, Epoch};
use indexmap::IndexSet;
use std::fmt;

mod types;
pub use types::ObservableType;

/// One observation: a value of an observable on a set of link ends, time tagged at its anchor.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationRecord {
    pub observable: ObservableType,
    pub link_ends: LinkEnds,
    /// Time of the anchor link end
    pub epoch: Epoch,
    pub anchor: LinkEndType,
    pub value: DVector<f64>,
    /// Overrides the weight of the observable for this record only
    pub weight: Option<f64>,
}

impl ObservationRecord {
    pub fn new(
        observable: ObservableType,
        link_ends: LinkEnds,
        epoch: Epoch,
        anchor: LinkEndType,
        value: DVector<f64>,
    ) -> Self {
        Self {
            observable,
            link_ends,
            epoch,
            anchor,
            value,
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Anchor time in seconds past J2000 TDB.
    pub fn epoch_s(&self) -> f64 {
        epoch_to_seconds(self.epoch)
    }
}

impl fmt::Display for ObservationRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} on {} @ {} ({}): {:?} {}",
            self.observable,
            self.link_ends,
            self.epoch,
            self.anchor,
            self.value.as_slice(),
            self.observable.unit()
        )
    }
}

/// An ordered set of observations, real or simulated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObservationCollection {
    pub records: Vec<ObservationRecord>,
    /// Source of the observations, if known
    pub source: Option<String>,
}

impl ObservationCollection {
    pub fn new(records: Vec<ObservationRecord>) -> Self {
        Self {
            records,
            source: None,
        }
    }

    pub fn push(&mut self, record: ObservationRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservationRecord> {
        self.records.iter()
    }

    /// Total number of scalar measurements, i.e. the number of rows of the stacked residuals.
    pub fn measurement_count(&self) -> usize {
        self.records.iter().map(|r| r.value.len()).sum()
    }

    /// Returns the unique observable types in this collection
    pub fn unique_types(&self) -> IndexSet<ObservableType> {
        self.records.iter().map(|r| r.observable).collect()
    }

    /// Returns the unique link ends in this collection
    pub fn unique_link_ends(&self) -> IndexSet<LinkEnds> {
        self.records.iter().map(|r| r.link_ends.clone()).collect()
    }

    pub fn start_epoch(&self) -> Option<Epoch> {
        self.records.iter().map(|r| r.epoch).min()
    }

    pub fn end_epoch(&self) -> Option<Epoch> {
        self.records.iter().map(|r| r.epoch).max()
    }

    /// Sorts the records by epoch, keeping the relative order of simultaneous records.
    pub fn sort_by_epoch(&mut self) {
        self.records.sort_by_key(|r| r.epoch);
    }

    /// Returns a new collection that only contains this observable type.
    pub fn filter_by_observable(&self, observable: ObservableType) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|r| r.observable == observable)
                .cloned()
                .collect(),
            source: self.source.clone(),
        }
    }

    /// Returns a new collection with the records from the start epoch plus the provided offsets.
    pub fn filter_by_offset(&self, from: Duration, to: Duration) -> Self {
        match self.start_epoch() {
            Some(start) => Self {
                records: self
                    .records
                    .iter()
                    .filter(|r| r.epoch >= start + from && r.epoch <= start + to)
                    .cloned()
                    .collect(),
                source: self.source.clone(),
            },
            None => self.clone(),
        }
    }
}

impl fmt::Display for ObservationCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start_epoch(), self.end_epoch()) {
            (Some(start), Some(end)) => {
                let src = match &self.source {
                    Some(src) => format!(" (source: {src})"),
                    None => String::new(),
                };
                let types: Vec<String> =
                    self.unique_types().iter().map(|t| format!("{t}")).collect();
                write!(
                    f,
                    "{} observations of {} over {} (from {start} to {end}){src}",
                    self.len(),
                    types.join(", "),
                    end - start
                )
            }
            _ => write!(f, "Empty observation collection"),
        }
    }
}
