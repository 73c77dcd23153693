use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Output formats accepted for host and guest telemetry.
///
/// Guest processes speak their protocol on stdout, so every format is
/// rendered to stderr regardless of the choice made here.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened into the top level.
    #[default]
    Json,
    /// Single line human-readable output.
    Compact,
    /// Multi-line output with source locations, for local debugging.
    Pretty,
}

impl LogFormat {
    /// Reports whether the format is meant for machine ingestion.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;
