//! Versioned plugin identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Immutable `(id, major, minor)` identity of a plugin.
///
/// Strong names key every registry in the runtime. The [`Display`] form,
/// `"{id} {major}.{minor}"`, doubles as the per-plugin directory name under
/// `views/` and `plugindata/`, and [`FromStr`] accepts it back.
///
/// [`Display`]: fmt::Display
///
/// # Example
///
/// ```
/// use colloquy_runtime::PluginStrongName;
///
/// let name = PluginStrongName::new("weather", 1, 0);
/// assert_eq!(name.to_string(), "weather 1.0");
/// assert_eq!("weather 1.0".parse::<PluginStrongName>().ok(), Some(name));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PluginStrongName {
    plugin_id: String,
    major_version: u32,
    minor_version: u32,
}

impl PluginStrongName {
    /// Creates a strong name.
    #[must_use]
    pub fn new(plugin_id: impl Into<String>, major_version: u32, minor_version: u32) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            major_version,
            minor_version,
        }
    }

    /// Plugin identifier without version.
    #[must_use]
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Major version component.
    #[must_use]
    pub const fn major_version(&self) -> u32 {
        self.major_version
    }

    /// Minor version component.
    #[must_use]
    pub const fn minor_version(&self) -> u32 {
        self.minor_version
    }
}

impl fmt::Display for PluginStrongName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}",
            self.plugin_id, self.major_version, self.minor_version
        )
    }
}

/// Errors raised when parsing a [`PluginStrongName`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrongNameParseError {
    /// The text has no `" major.minor"` suffix.
    #[error("strong name '{text}' has no version suffix")]
    MissingVersion {
        /// Text that failed to parse.
        text: String,
    },
    /// The plugin identifier is empty.
    #[error("strong name '{text}' has an empty plugin id")]
    EmptyId {
        /// Text that failed to parse.
        text: String,
    },
    /// The version suffix is not two unsigned integers.
    #[error("strong name '{text}' has an invalid version")]
    InvalidVersion {
        /// Text that failed to parse.
        text: String,
    },
}

impl FromStr for PluginStrongName {
    type Err = StrongNameParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (id, version) =
            text.rsplit_once(' ')
                .ok_or_else(|| StrongNameParseError::MissingVersion {
                    text: text.to_owned(),
                })?;
        if id.trim().is_empty() {
            return Err(StrongNameParseError::EmptyId {
                text: text.to_owned(),
            });
        }
        let invalid = || StrongNameParseError::InvalidVersion {
            text: text.to_owned(),
        };
        let (major, minor) = version.split_once('.').ok_or_else(invalid)?;
        let major_version = major.parse().map_err(|_| invalid())?;
        let minor_version = minor.parse().map_err(|_| invalid())?;
        Ok(Self::new(id, major_version, minor_version))
    }
}
