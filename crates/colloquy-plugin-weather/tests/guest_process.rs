//! The weather plugin hosted in its guest binary.

use std::time::Duration;

use rstest::{fixture, rstest};
use time::OffsetDateTime;
use tokio::process::Command;

use colloquy_plugin_weather::{HANDLE_FOLLOW_UP, HANDLE_FORECAST};
use colloquy_runtime::{
    IsolatedPluginProvider, IsolationOptions, PluginError, PluginProvider, PluginStrongName,
    QueryWithContext, RecognizedIntent, RequestContext,
};

fn guest_command() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_colloquy-weather-guest"));
    command
        .env("COLLOQUY_CONTENT_ROOT", concat!(env!("CARGO_MANIFEST_DIR"), "/content"))
        .env("COLLOQUY_LOG_FILTER", "warn")
        .env("COLLOQUY_LOG_FORMAT", "compact");
    command
}

#[fixture]
fn weather() -> PluginStrongName {
    PluginStrongName::new("weather", 1, 0)
}

fn spawn_guest() -> IsolatedPluginProvider {
    IsolatedPluginProvider::spawn(
        guest_command(),
        IsolationOptions::new().with_response_timeout(Duration::from_secs(20)),
    )
    .expect("guest should start")
}

fn said(utterance: &str) -> QueryWithContext {
    QueryWithContext::new(RecognizedIntent::new("Weather", "get_weather").with_utterance(utterance))
}

#[rstest]
#[tokio::test]
async fn guest_holds_a_conversation_across_turns(weather: PluginStrongName) {
    let guest = spawn_guest();

    assert_eq!(
        guest.available_plugins().await.expect("listing"),
        vec![weather.clone()]
    );
    guest.load(&weather).await.expect("weather should load in the guest");

    let first = guest
        .launch(&weather, HANDLE_FORECAST, said("weather in seattle"), RequestContext::traced())
        .await
        .expect("first turn");
    assert_eq!(
        first.result.response_text(),
        Some("Today in Seattle: 14 degrees and light rain.")
    );
    assert_eq!(first.result.continuation(), Some(HANDLE_FOLLOW_UP));

    let session = first
        .side_effects
        .expect("side effects cross the channel")
        .session;
    let follow_up = guest
        .launch(
            &weather,
            HANDLE_FOLLOW_UP,
            said("and tomorrow?"),
            RequestContext {
                session,
                ..RequestContext::traced()
            },
        )
        .await
        .expect("follow-up turn");
    assert_eq!(
        follow_up.result.response_text(),
        Some("Tomorrow in Seattle: 17 degrees and partly cloudy.")
    );

    assert!(guest.unload(&weather).await.expect("unload"));
}

#[rstest]
#[tokio::test]
async fn guest_reports_lifecycle_errors(weather: PluginStrongName) {
    let guest = spawn_guest();

    let error = guest
        .launch(&weather, HANDLE_FORECAST, said("weather in lisbon"), RequestContext::traced())
        .await
        .expect_err("launch before load must fail");

    assert!(matches!(error, PluginError::NotLoaded { .. }), "{error}");
}

#[rstest]
#[tokio::test]
async fn guest_serves_conditional_view_requests(weather: PluginStrongName) {
    let guest = spawn_guest();
    let later = OffsetDateTime::now_utc() + time::Duration::hours(1);

    let full = guest
        .fetch_view_data(&weather, "forecast.html", None)
        .await
        .expect("view lookup")
        .expect("page exists");
    let cached = guest
        .fetch_view_data(&weather, "forecast.html", Some(later))
        .await
        .expect("view lookup")
        .expect("page exists");
    let missing = guest
        .fetch_view_data(&weather, "radar.png", None)
        .await
        .expect("view lookup");

    assert_eq!(full.mime_type(), "text/html");
    assert!(!full.data().is_empty());
    assert!(cached.is_not_modified());
    assert!(cached.lifetime_seconds() >= 1);
    assert!(missing.is_none());
}
