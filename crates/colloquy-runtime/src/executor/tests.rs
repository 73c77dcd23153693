//! Unit tests for plugin lifecycle and invocation.

use std::sync::Arc;
use std::time::Duration;

use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::dialog::{DialogOutcome, TriggerKind};
use crate::services::RequestContext;
use crate::tests::support::{EchoPlugin, echo_instance, query, services_for, services_with};

struct Harness {
    plugin: Arc<EchoPlugin>,
    instance: PluginInstance,
    executor: PluginExecutor,
}

impl Harness {
    fn services(&self) -> PluginServices {
        services_for(self.instance.strong_name())
    }

    async fn load(&self) -> bool {
        self.executor
            .load(&self.instance, &self.services())
            .await
            .expect("load")
    }

    async fn invoke(&self, entry_point: &str) -> DialogProcessingResponse {
        self.executor
            .invoke(&self.instance, entry_point, query("hello"), self.services())
            .await
            .expect("invoke")
    }
}

fn harness_with(options: ExecutorOptions) -> Harness {
    let (plugin, instance) = echo_instance("echo", "Echo");
    Harness {
        plugin,
        instance,
        executor: PluginExecutor::new(options),
    }
}

#[fixture]
fn harness() -> Harness {
    harness_with(ExecutorOptions::new())
}

#[fixture]
fn strict() -> Harness {
    harness_with(ExecutorOptions::new().with_fail_fast(true))
}

#[rstest]
#[tokio::test]
async fn load_moves_plugin_to_loaded(harness: Harness) {
    assert!(harness.load().await);
    let strong_name = harness.instance.strong_name();
    assert_eq!(harness.executor.phase(strong_name), Some(LifecyclePhase::Loaded));
    assert_eq!(harness.plugin.loads(), 1);
    assert!(harness.executor.continuations(strong_name).is_some());
}

#[rstest]
#[tokio::test]
async fn double_load_is_a_lifecycle_error(harness: Harness) {
    harness.load().await;
    let error = harness
        .executor
        .load(&harness.instance, &harness.services())
        .await
        .expect_err("second load must fail");
    assert!(matches!(error, PluginError::Lifecycle { .. }));
    assert_eq!(harness.plugin.loads(), 1);
}

#[rstest]
#[tokio::test]
async fn unload_without_load_fails_even_when_lenient(harness: Harness) {
    let error = harness
        .executor
        .unload(&harness.instance, &harness.services())
        .await
        .expect_err("unload must fail");
    assert!(
        error.to_string().contains("unload without matching load"),
        "unexpected error: {error}"
    );
}

#[rstest]
#[tokio::test]
async fn reload_starts_with_an_empty_cache(harness: Harness) {
    harness.load().await;
    harness.invoke("Echo.Execute").await;
    let strong_name = harness.instance.strong_name().clone();
    let first = harness.executor.continuations(&strong_name).expect("registry");
    assert_eq!(first.len(), 1);

    assert!(harness
        .executor
        .unload(&harness.instance, &harness.services())
        .await
        .expect("unload"));
    assert_eq!(harness.executor.phase(&strong_name), None);

    harness.load().await;
    let second = harness.executor.continuations(&strong_name).expect("registry");
    assert!(second.is_empty());
    assert!(!Arc::ptr_eq(&first, &second));
}

#[rstest]
#[tokio::test]
async fn failed_load_hook_leaves_plugin_unloaded() {
    let plugin = Arc::new(EchoPlugin::new("echo", "Echo").failing_load(PluginFault::unhandled("no")));
    let instance = PluginInstance::new(Arc::clone(&plugin));
    let executor = PluginExecutor::new(ExecutorOptions::new());

    let loaded = executor
        .load(&instance, &services_for(instance.strong_name()))
        .await
        .expect("lenient load");

    assert!(!loaded);
    assert_eq!(executor.phase(instance.strong_name()), None);
}

#[rstest]
#[tokio::test]
async fn failed_unload_hook_still_discards_state() {
    let plugin =
        Arc::new(EchoPlugin::new("echo", "Echo").failing_unload(PluginFault::unhandled("no")));
    let instance = PluginInstance::new(Arc::clone(&plugin));
    let executor = PluginExecutor::new(ExecutorOptions::new().with_fail_fast(true));
    let services = services_for(instance.strong_name());
    executor.load(&instance, &services).await.expect("load");

    let error = executor
        .unload(&instance, &services)
        .await
        .expect_err("fail-fast unload must propagate");

    assert!(matches!(error, PluginError::Unhandled { .. }));
    assert_eq!(executor.phase(instance.strong_name()), None);
    assert_eq!(plugin.unloads(), 1);
}

#[rstest]
#[tokio::test]
async fn invoke_before_load_is_rejected(harness: Harness) {
    let error = harness
        .executor
        .invoke(&harness.instance, "Echo.Execute", query("hi"), harness.services())
        .await
        .expect_err("not loaded");
    assert!(matches!(error, PluginError::NotLoaded { .. }));
}

#[rstest]
#[tokio::test]
async fn invoke_returns_result_and_side_effects(harness: Harness) {
    harness.load().await;
    let response = harness.invoke("Echo.Execute").await;

    assert_eq!(response.result.response_text(), Some("echo says hello"));
    assert_eq!(response.result.continuation(), Some("Echo.Again"));
    let side_effects = response.side_effects.expect("side effects");
    assert_eq!(side_effects.session.get_str("last_utterance"), Some("hello"));
}

#[rstest]
#[tokio::test]
async fn empty_name_selects_default_entry_point(harness: Harness) {
    harness.load().await;
    let response = harness.invoke("").await;
    assert_eq!(response.result.response_text(), Some("echo says hello"));
}

#[rstest]
#[tokio::test]
async fn plugin_failure_results_keep_side_effects(harness: Harness) {
    harness.load().await;
    let response = harness.invoke("Echo.Decline").await;

    assert_eq!(response.result.outcome(), DialogOutcome::Failure);
    let side_effects = response.side_effects.expect("side effects");
    assert!(side_effects.local_profile.get("declined").is_some());
}

#[rstest]
#[case::no_scope("Execute")]
#[case::unknown_scope("Nope.Execute")]
#[case::unknown_member("Echo.Missing")]
#[case::not_a_continuation("Echo.Format")]
#[tokio::test]
async fn unresolvable_names_become_failure_results(harness: Harness, #[case] name: &str) {
    harness.load().await;
    let response = harness.invoke(name).await;

    assert_eq!(response.result.outcome(), DialogOutcome::Failure);
    assert!(response.result.error_message().is_some_and(|m| m.contains(name)));
    assert!(response.side_effects.is_none());
    assert_eq!(harness.plugin.invocations(), 0);
}

#[rstest]
#[case::fault("Echo.Fail")]
#[case::panic("Echo.Panic")]
#[tokio::test]
async fn lenient_mode_contains_faults(harness: Harness, #[case] name: &str) {
    harness.load().await;
    let response = harness.invoke(name).await;

    assert_eq!(response.result.outcome(), DialogOutcome::Failure);
    assert!(response.side_effects.is_none());
    assert_eq!(
        harness.executor.phase(harness.instance.strong_name()),
        Some(LifecyclePhase::Loaded)
    );
}

#[rstest]
#[case::fault("Echo.Fail")]
#[case::panic("Echo.Panic")]
#[tokio::test]
async fn fail_fast_propagates_faults(strict: Harness, #[case] name: &str) {
    strict.load().await;
    let error = strict
        .executor
        .invoke(&strict.instance, name, query("hi"), strict.services())
        .await
        .expect_err("fault must propagate");
    assert!(matches!(error, PluginError::Unhandled { .. }));
}

#[rstest]
#[tokio::test]
async fn panics_are_reported_with_their_message(strict: Harness) {
    strict.load().await;
    let error = strict
        .executor
        .invoke(&strict.instance, "Echo.Panic", query("hi"), strict.services())
        .await
        .expect_err("panic must propagate");
    let PluginError::Unhandled { fault, .. } = error else {
        panic!("expected unhandled error, got {error:?}");
    };
    assert_eq!(
        fault,
        PluginFault::Panicked {
            message: "echo panicked".to_owned()
        }
    );
}

#[rstest]
#[tokio::test]
async fn security_violations_never_propagate(strict: Harness) {
    strict.load().await;
    let response = strict.invoke("Echo.Snoop").await;

    assert_eq!(response.result.outcome(), DialogOutcome::Failure);
    assert!(response
        .result
        .error_message()
        .is_some_and(|m| m.contains("security violation")));
    assert!(response.side_effects.is_none());
}

#[rstest]
#[tokio::test]
async fn cancellation_interrupts_a_stalled_entry_point(harness: Harness) {
    harness.load().await;
    let token = CancellationToken::new();
    let services = services_with(
        harness.instance.strong_name(),
        RequestContext::default().with_cancellation(token.clone()),
    );
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let error = harness
        .executor
        .invoke(&harness.instance, "Echo.Stall", query("hi"), services)
        .await
        .expect_err("cancelled");

    canceller.await.expect("canceller");
    assert!(matches!(error, PluginError::Cancelled { .. }));
    assert_eq!(
        harness.executor.phase(harness.instance.strong_name()),
        Some(LifecyclePhase::Loaded)
    );
}

#[rstest]
#[tokio::test]
async fn trigger_reports_result_and_contains_faults(harness: Harness) {
    harness.load().await;
    let services = harness.services();

    let boosted = harness
        .executor
        .trigger(&harness.instance, &query("echo this"), &services)
        .await
        .expect("trigger");
    assert_eq!(boosted.result.map(|r| r.kind), Some(TriggerKind::Boost));
    assert!(boosted.side_effects.is_some());

    let exploded = harness
        .executor
        .trigger(&harness.instance, &query("explode"), &harness.services())
        .await
        .expect("contained");
    assert!(exploded.result.is_none());
    assert!(exploded.side_effects.is_none());
}

#[rstest]
#[tokio::test]
async fn cross_domain_hooks_run_on_loaded_plugins(harness: Harness) {
    harness.load().await;
    let request = harness
        .executor
        .cross_domain_request(&harness.instance, "confirm")
        .await
        .expect("request");
    assert_eq!(
        request.map(|data| data.requested_slots),
        Some(vec!["utterance".to_owned()])
    );

    let contained = harness
        .executor
        .cross_domain_request(&harness.instance, "explode")
        .await
        .expect("contained");
    assert!(contained.is_none());
}
