//! Sample weather plugin for the Colloquy runtime.
//!
//! [`WeatherPlugin`] owns the `Weather` domain. It reads a forecast table
//! from `forecasts.json` in its data directory when it loads, answers
//! forecast requests through [`HANDLE_FORECAST`], and hands follow-up turns
//! ("and tomorrow?") to [`HANDLE_FOLLOW_UP`] by naming it as the result's
//! continuation. The `colloquy-weather-guest` binary hosts the plugin in a
//! guest process.

mod forecast;

use std::sync::Arc;

use async_trait::async_trait;
use camino::Utf8Path;
use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info};

use colloquy_runtime::services::Entity;
use colloquy_runtime::{
    CrossDomainContext, CrossDomainRequestData, CrossDomainResponseData, DialogPlugin,
    EntryPointTable, MultiTurnBehavior, PluginFault, PluginFileSystem, PluginInformation,
    PluginResult, PluginServices, PluginStrongName, QueryWithContext, TriggerKind, TriggerResult,
};

pub use forecast::{CityForecast, DailyForecast, Day, ForecastError, ForecastTable};

/// Entry point answering a forecast request.
pub const HANDLE_FORECAST: &str = "WeatherPlugin.HandleForecast";

/// Entry point answering a follow-up about the last city.
pub const HANDLE_FOLLOW_UP: &str = "WeatherPlugin.HandleFollowUp";

/// File in the plugin's data directory holding the forecast table.
pub const FORECAST_FILE: &str = "forecasts.json";

/// Slot carrying the requested city.
pub const LOCATION_SLOT: &str = "location";

/// Session key remembering the last city answered for.
pub const SESSION_LOCATION: &str = "weather.location";

/// Intent another domain can hand off to this plugin.
pub const FORECAST_INTENT: &str = "get_forecast";

const WEATHER_TARGET: &str = "colloquy_plugin_weather";

/// Weather dialog plugin.
#[derive(Debug, Default)]
pub struct WeatherPlugin {
    forecasts: RwLock<Option<Arc<ForecastTable>>>,
}

impl WeatherPlugin {
    /// Creates the plugin with no forecasts loaded.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            forecasts: RwLock::new(None),
        }
    }

    fn table(&self) -> Result<Arc<ForecastTable>, PluginFault> {
        self.forecasts
            .read()
            .clone()
            .ok_or_else(|| PluginFault::unhandled("forecast data is not loaded"))
    }

    async fn handle_forecast(
        self: Arc<Self>,
        query: QueryWithContext,
        services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        self.answer(&query, &services, true)
    }

    /// Follow-ups without a known city decline the turn instead of asking.
    async fn handle_follow_up(
        self: Arc<Self>,
        query: QueryWithContext,
        services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        self.answer(&query, &services, false)
    }

    fn answer(
        &self,
        query: &QueryWithContext,
        services: &PluginServices,
        prompt_for_city: bool,
    ) -> Result<PluginResult, PluginFault> {
        let table = self.table()?;
        let Some(location) = requested_location(&table, query, services) else {
            return Ok(if prompt_for_city {
                PluginResult::success()
                    .with_text("Which city would you like the forecast for?")
                    .with_continuation(HANDLE_FORECAST)
            } else {
                PluginResult::skip()
            });
        };
        let Some(forecast) = table.lookup(&location) else {
            debug!(target: WEATHER_TARGET, location = %location, "no forecast for location");
            return Ok(PluginResult::failure(format!(
                "no forecast is available for '{location}'"
            )));
        };

        remember(services, forecast);
        let day = Day::from_utterance(&query.understanding.utterance);
        Ok(PluginResult::success()
            .with_text(forecast.describe(day))
            .with_data(LOCATION_SLOT, forecast.name.clone())
            .with_continuation(HANDLE_FOLLOW_UP)
            .with_multi_turn(MultiTurnBehavior::ContinuePassively))
    }
}

/// City from the slot, a city named in the utterance, or the session.
fn requested_location(
    table: &ForecastTable,
    query: &QueryWithContext,
    services: &PluginServices,
) -> Option<String> {
    if let Some(slot) = query.understanding.slot(LOCATION_SLOT) {
        return Some(slot.to_owned());
    }
    if let Some(forecast) = table.mentioned_in(&query.understanding.utterance) {
        return Some(forecast.name.clone());
    }
    services.session().get_str(SESSION_LOCATION).map(str::to_owned)
}

fn remember(services: &PluginServices, forecast: &CityForecast) {
    services
        .session()
        .put(SESSION_LOCATION, forecast.name.clone());
    services.entity_context().insert(place_entity(forecast));
}

fn place_entity(forecast: &CityForecast) -> Entity {
    Entity::new(format!("place:{}", forecast.name.to_lowercase()), "Place")
        .with_data(json!({ "name": forecast.name }))
}

#[async_trait]
impl DialogPlugin for WeatherPlugin {
    fn strong_name(&self) -> PluginStrongName {
        PluginStrongName::new("weather", 1, 0)
    }

    fn lu_domain(&self) -> &str {
        "Weather"
    }

    fn entry_points(&self) -> EntryPointTable {
        EntryPointTable::builder::<Self>()
            .scope("WeatherPlugin", |scope| {
                scope
                    .instance("HandleForecast", Self::handle_forecast)
                    .instance("HandleFollowUp", Self::handle_follow_up)
            })
            .with_default(HANDLE_FORECAST)
            .build()
    }

    async fn on_load(&self, services: &PluginServices) -> Result<(), PluginFault> {
        let path = services.data_directory().join(FORECAST_FILE);
        let text = services.file_system().read_to_string(&path)?;
        let table = ForecastTable::from_json(&text)
            .map_err(|error| PluginFault::unhandled(error.to_string()))?;
        info!(target: WEATHER_TARGET, cities = table.len(), "forecast data loaded");
        *self.forecasts.write() = Some(Arc::new(table));
        Ok(())
    }

    async fn on_unload(&self, _services: &PluginServices) -> Result<(), PluginFault> {
        *self.forecasts.write() = None;
        Ok(())
    }

    async fn trigger(
        &self,
        query: &QueryWithContext,
        _services: &PluginServices,
    ) -> Result<Option<TriggerResult>, PluginFault> {
        let table = self.table()?;
        Ok(table.mentioned_in(&query.understanding.utterance).map(|forecast| {
            TriggerResult::new(TriggerKind::Boost)
                .with_description(format!("the forecast for {}", forecast.name))
        }))
    }

    async fn cross_domain_request(
        &self,
        target_intent: &str,
    ) -> Result<Option<CrossDomainRequestData>, PluginFault> {
        Ok((target_intent == FORECAST_INTENT).then(|| CrossDomainRequestData {
            requested_slots: vec![LOCATION_SLOT.to_owned()],
        }))
    }

    async fn cross_domain_response(
        &self,
        context: &CrossDomainContext,
        services: &PluginServices,
    ) -> Result<Option<CrossDomainResponseData>, PluginFault> {
        let table = self.table()?;
        let Some(forecast) = context
            .slots
            .iter()
            .find(|slot| slot.name == LOCATION_SLOT)
            .and_then(|slot| table.lookup(&slot.value))
        else {
            return Ok(None);
        };
        services.entity_context().insert(place_entity(forecast));
        Ok(Some(CrossDomainResponseData {
            callback_intent: "forecast_ready".to_owned(),
            filled_slots: context.slots.clone(),
        }))
    }

    fn plugin_information(
        &self,
        _file_system: &dyn PluginFileSystem,
        _data_directory: &Utf8Path,
    ) -> Option<PluginInformation> {
        Some(PluginInformation {
            display_name: "Weather".to_owned(),
            short_description: "Current and next-day forecasts".to_owned(),
            sample_queries: vec![
                "what's the weather in Seattle".to_owned(),
                "and tomorrow?".to_owned(),
            ],
            icon_path: Some("icon.svg".to_owned()),
            ..PluginInformation::default()
        })
    }
}

#[cfg(test)]
mod tests;
