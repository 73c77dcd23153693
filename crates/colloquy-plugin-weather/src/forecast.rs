//! Forecast data read from the plugin's data directory.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Deserialize;
use thiserror::Error;

/// Which day a forecast answers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Day {
    /// The current day.
    Today,
    /// The following day.
    Tomorrow,
}

impl Day {
    /// Picks the day an utterance asks about.
    #[must_use]
    pub fn from_utterance(utterance: &str) -> Self {
        if utterance.to_lowercase().contains("tomorrow") {
            Self::Tomorrow
        } else {
            Self::Today
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Tomorrow => "Tomorrow",
        }
    }
}

/// Conditions for one day.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DailyForecast {
    /// Temperature in degrees Celsius.
    pub temperature_c: i32,
    /// Short description, for example `light rain`.
    pub condition: String,
}

/// Forecast for one city.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CityForecast {
    /// Display name.
    pub name: String,
    /// Conditions today.
    pub today: DailyForecast,
    /// Conditions tomorrow.
    pub tomorrow: DailyForecast,
}

impl CityForecast {
    /// Conditions for `day`.
    #[must_use]
    pub const fn on(&self, day: Day) -> &DailyForecast {
        match day {
            Day::Today => &self.today,
            Day::Tomorrow => &self.tomorrow,
        }
    }

    /// Sentence describing the forecast for `day`.
    #[must_use]
    pub fn describe(&self, day: Day) -> String {
        let forecast = self.on(day);
        format!(
            "{} in {}: {} degrees and {}.",
            day.label(),
            self.name,
            forecast.temperature_c,
            forecast.condition
        )
    }
}

/// Errors raised while reading forecast data.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// The file is not a JSON list of city forecasts.
    #[error("forecast data is malformed: {0}")]
    Malformed(#[source] serde_json::Error),
    /// Two entries share a city name.
    #[error("forecast data lists '{name}' more than once")]
    Duplicate {
        /// Repeated city.
        name: String,
    },
}

/// Forecasts keyed by lower-cased city name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForecastTable {
    cities: BTreeMap<String, CityForecast>,
}

impl ForecastTable {
    /// Parses a JSON list of [`CityForecast`] values.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError`] for malformed JSON or repeated cities.
    pub fn from_json(text: &str) -> Result<Self, ForecastError> {
        let forecasts: Vec<CityForecast> =
            serde_json::from_str(text).map_err(ForecastError::Malformed)?;
        let mut cities = BTreeMap::new();
        for forecast in forecasts {
            match cities.entry(forecast.name.to_lowercase()) {
                Entry::Vacant(slot) => {
                    slot.insert(forecast);
                }
                Entry::Occupied(_) => {
                    return Err(ForecastError::Duplicate {
                        name: forecast.name,
                    });
                }
            }
        }
        Ok(Self { cities })
    }

    /// Looks up a city, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn lookup(&self, location: &str) -> Option<&CityForecast> {
        self.cities.get(&location.trim().to_lowercase())
    }

    /// First known city named anywhere in `utterance`.
    #[must_use]
    pub fn mentioned_in(&self, utterance: &str) -> Option<&CityForecast> {
        let lowered = utterance.to_lowercase();
        self.cities
            .iter()
            .find(|(key, _)| lowered.contains(key.as_str()))
            .map(|(_, forecast)| forecast)
    }

    /// Number of cities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cities.len()
    }

    /// Reports whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}
