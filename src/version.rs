use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// a pin version, ordered by (major, minor)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
}

impl Version {
    /// version written by `init`
    pub const INITIAL: Version = Version { major: 0, minor: 1 };

    pub fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// next version in the same major line; `InvalidVersion` if the minor
    /// is already at its maximum
    pub fn bump_minor(self) -> Result<Self> {
        let minor = self
            .minor
            .checked_add(1)
            .ok_or_else(|| Error::InvalidVersion(self.to_string()))?;
        Ok(Self {
            major: self.major,
            minor,
        })
    }

    /// the version immediately before this one in the same major line.
    ///
    /// lineage is not tracked across majors: `1.0` has no predecessor even if
    /// `0.7` exists, and a pin whose predecessor record is missing diffs against
    /// an empty set.
    pub fn predecessor(self) -> Option<Self> {
        if self.minor <= 1 {
            return None;
        }
        Some(Self {
            major: self.major,
            minor: self.minor - 1,
        })
    }

    /// parse `"major.minor"`, tolerating surrounding whitespace
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let (major, minor) = trimmed
            .split_once('.')
            .ok_or_else(|| Error::InvalidVersion(text.to_string()))?;

        let parse_part = |part: &str| -> Result<u64> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::InvalidVersion(text.to_string()));
            }
            part.parse()
                .map_err(|_| Error::InvalidVersion(text.to_string()))
        };

        Ok(Self {
            major: parse_part(major)?,
            minor: parse_part(minor)?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

/// sort version strings ascending by (major, minor), dropping unparseable ones
pub fn sort_versions<I, S>(names: I) -> Vec<Version>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut versions: Vec<Version> = names
        .into_iter()
        .filter_map(|n| Version::parse(n.as_ref()).ok())
        .collect();
    versions.sort();
    versions
}
