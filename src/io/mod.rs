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

use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::prelude::*;
use std::fmt::Debug;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("failed to read configuration file: {source}"))]
    ReadError { source: io::Error },

    #[snafu(display("failed to parse YAML configuration: {source}"))]
    ParseError { source: serde_yaml::Error },

    #[snafu(display("invalid configuration: {msg}"))]
    InvalidConfig { msg: String },
}

impl PartialEq for ConfigError {
    /// Errors of the same kind match, and invalid configurations must also share their message.
    /// I/O and YAML errors cannot be compared themselves.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidConfig { msg }, Self::InvalidConfig { msg: other_msg }) => {
                msg == other_msg
            }
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

/// A configuration which can be read from YAML.
pub trait ConfigRepr: Debug + Sized + Serialize + DeserializeOwned {
    /// Builds the configuration representation from the path to a yaml
    fn load<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path).context(ReadSnafu)?;
        let reader = BufReader::new(file);

        serde_yaml::from_reader(reader).context(ParseSnafu)
    }

    /// Builds a sequence of "Selves" from the provided path to a yaml
    fn load_many<P>(path: P) -> Result<Vec<Self>, ConfigError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path).context(ReadSnafu)?;
        let reader = BufReader::new(file);

        serde_yaml::from_reader(reader).context(ParseSnafu)
    }

    /// Builds "Self" from the provided string of a yaml
    fn loads(data: &str) -> Result<Self, ConfigError> {
        debug!("Loading YAML:\n{data}");
        serde_yaml::from_str(data).context(ParseSnafu)
    }

    /// Builds a sequence of "Selves" from the provided string of a yaml
    fn loads_many(data: &str) -> Result<Vec<Self>, ConfigError> {
        debug!("Loading YAML:\n{data}");
        serde_yaml::from_str(data).context(ParseSnafu)
    }
}

#[cfg(test)]
mod ut_io {
    use super::*;
    use crate::od::lighttime::LightTimeConvergence;

    #[test]
    fn config_errors() {
        let missing = LightTimeConvergence::load("this/file/does/not/exist.yaml");
        assert!(matches!(missing, Err(ConfigError::ReadError { .. })));

        let malformed = LightTimeConvergence::loads("tolerance_s: [1, 2]");
        assert!(matches!(malformed, Err(ConfigError::ParseError { .. })));

        let cfg = LightTimeConvergence::loads("max_iterations: 10").unwrap();
        assert_eq!(cfg.max_iterations, 10);
        assert_eq!(cfg.tolerance_s, 1e-12);
    }

    #[test]
    fn config_error_eq() {
        let invalid = |msg: &str| ConfigError::InvalidConfig {
            msg: msg.to_string(),
        };
        assert_eq!(invalid("no legs"), invalid("no legs"));
        assert_ne!(invalid("no legs"), invalid("no delays"));

        let missing = || LightTimeConvergence::load("this/file/does/not/exist.yaml").unwrap_err();
        assert_eq!(missing(), missing());
        let malformed = || LightTimeConvergence::loads("tolerance_s: [1, 2]").unwrap_err();
        assert_eq!(malformed(), malformed());
        assert_ne!(missing(), malformed());
        assert_ne!(malformed(), invalid("no legs"));
    }
}
