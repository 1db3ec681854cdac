//! Schema versions.
//!
//! Versions are dotted strings with optional pre-release markers such as
//! `1.7.2-rc7` or `2.0-a7`. Pre-release markers order as
//! `dev` < `alpha`/`a` < `beta`/`b` < `RC`/`rc` < plain release < `pl`/`p`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors produced when parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// The string has no components.
    #[error("Version string is empty")]
    Empty,

    /// The string contains a character that cannot appear in a version.
    #[error("Invalid character '{character}' in version '{version}'")]
    InvalidCharacter {
        /// The offending version string.
        version: String,
        /// The first invalid character.
        character: char,
    },
}

/// Rank of a plain number when compared with a pre-release marker.
const NUMBER_RANK: i8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Number(u64),
    Marker(i8),
}

impl Part {
    fn parse(text: &str) -> Self {
        if text.bytes().all(|b| b.is_ascii_digit()) {
            // Overlong numbers saturate instead of failing.
            return Self::Number(text.parse().unwrap_or(u64::MAX));
        }
        let rank = match text {
            "dev" => 0,
            "alpha" | "a" => 1,
            "beta" | "b" => 2,
            "RC" | "rc" => 3,
            "#" => NUMBER_RANK,
            "pl" | "p" => 5,
            _ => -6,
        };
        Self::Marker(rank)
    }

    const fn rank(&self) -> i8 {
        match self {
            Self::Number(_) => NUMBER_RANK,
            Self::Marker(rank) => *rank,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// A parsed, ordered schema version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    raw: String,
    parts: Vec<Part>,
}

impl SchemaVersion {
    /// Parses a version string.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let raw = raw.trim();
        let mut canonical = String::with_capacity(raw.len() * 2);
        let mut previous: Option<char> = None;

        for c in raw.chars() {
            match c {
                '-' | '_' | '+' | '.' => canonical.push('.'),
                c if c.is_ascii_alphanumeric() || c == '#' => {
                    if let Some(p) = previous {
                        let boundary = p.is_ascii_digit() != c.is_ascii_digit()
                            && !matches!(p, '-' | '_' | '+' | '.');
                        if boundary {
                            canonical.push('.');
                        }
                    }
                    canonical.push(c);
                }
                character => {
                    return Err(VersionError::InvalidCharacter {
                        version: raw.to_string(),
                        character,
                    });
                }
            }
            previous = Some(c);
        }

        let parts: Vec<Part> = canonical
            .split('.')
            .filter(|p| !p.is_empty())
            .map(Part::parse)
            .collect();
        if parts.is_empty() {
            return Err(VersionError::Empty);
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    /// Returns the version as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut left = self.parts.iter();
        let mut right = other.parts.iter();
        loop {
            match (left.next(), right.next()) {
                (Some(a), Some(b)) => match a.compare(b) {
                    Ordering::Equal => continue,
                    unequal => return unequal,
                },
                (None, None) => return Ordering::Equal,
                // Only the first leftover component decides.
                (Some(a), None) => {
                    return match a {
                        Part::Number(_) => Ordering::Greater,
                        Part::Marker(rank) => rank.cmp(&NUMBER_RANK),
                    };
                }
                (None, Some(b)) => {
                    return match b {
                        Part::Number(_) => Ordering::Less,
                        Part::Marker(rank) => NUMBER_RANK.cmp(rank),
                    };
                }
            }
        }
    }
}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SchemaVersion {}

impl FromStr for SchemaVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SchemaVersion> for String {
    fn from(version: SchemaVersion) -> Self {
        version.raw
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
