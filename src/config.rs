use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Who may read a file or directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(Error::InvalidVisibility(other.to_string())),
        }
    }
}

/// Per-call options handed to a backend.
///
/// Keys and values are opaque strings. [`ReplicateStorage`](crate::ReplicateStorage)
/// forwards the same `Config` to both backends without looking inside; only the
/// backends interpret it.
///
/// ```
/// use replicate::{Config, Visibility};
///
/// let config = Config::new().with(Config::VISIBILITY, "private");
/// assert_eq!(config.visibility().unwrap(), Some(Visibility::Private));
/// assert_eq!(config.get("missing"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Config {
    options: BTreeMap<String, String>,
}

impl Config {
    /// Visibility applied to written files.
    pub const VISIBILITY: &'static str = "visibility";
    /// Visibility applied to created directories.
    pub const DIRECTORY_VISIBILITY: &'static str = "directory_visibility";

    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option, returning the updated config.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parsed `visibility` option, if set.
    pub fn visibility(&self) -> Result<Option<Visibility>> {
        self.get(Self::VISIBILITY).map(str::parse::<Visibility>).transpose()
    }

    /// Parsed `directory_visibility` option, if set.
    pub fn directory_visibility(&self) -> Result<Option<Visibility>> {
        self.get(Self::DIRECTORY_VISIBILITY)
            .map(str::parse::<Visibility>)
            .transpose()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Config {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Config {
            options: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
