//! Unit tests for service templates and per-request services.

use std::sync::Arc;

use camino::Utf8Path;
use rstest::{fixture, rstest};

use super::*;
use crate::error::PluginError;
use crate::fs::FsError;
use crate::tests::support::{content, services_with, template_for};

#[fixture]
fn echo() -> PluginStrongName {
    PluginStrongName::new("echo", 1, 0)
}

#[rstest]
fn plugin_sees_only_its_own_views_and_data(echo: PluginStrongName) {
    let template = template_for(&echo);
    let services = PluginServices::for_lifecycle(template);
    let fs = services.file_system();

    assert_eq!(
        fs.read_to_string(Utf8Path::new("views/index.html")).expect("view"),
        "<h1>echo</h1>"
    );
    assert!(fs.exists(&services.data_directory().join("tree.json")));
    assert!(!fs.exists(Utf8Path::new("plugindata/other 1.0/secret.txt")));
}

#[rstest]
#[case::parent("../other 1.0/secret.txt")]
#[case::nested_parent("data/../../other 1.0/secret.txt")]
#[case::absolute("/plugindata/other 1.0/secret.txt")]
#[case::unmounted("secrets/key")]
fn escaping_paths_are_denied(echo: PluginStrongName, #[case] path: &str) {
    let services = PluginServices::for_lifecycle(template_for(&echo));
    let error = services
        .file_system()
        .read(Utf8Path::new(path))
        .expect_err("escape must be denied");
    assert!(matches!(error, FsError::AccessDenied { .. }), "got {error:?}");
}

#[rstest]
fn request_state_is_seeded_from_context(echo: PluginStrongName) {
    let mut request = RequestContext::traced();
    request.session.put("turn", 3);
    request.contextual_entities.push(ContextualEntity {
        entity: Entity::new("city-1", "City"),
        relevance: 0.5,
    });
    let trace_id = request.trace_id;

    let services = services_with(&echo, request);

    assert_eq!(services.trace_id(), trace_id);
    assert_eq!(services.session().get("turn"), Some(&serde_json::json!(3)));
    assert_eq!(services.contextual_entities().len(), 1);
    assert!(services.dialog_actions().is_empty());
    assert!(services.web_data().is_empty());
}

#[rstest]
fn clones_share_request_stores(echo: PluginStrongName) {
    let services = services_with(&echo, RequestContext::default());
    let clone = services.clone();

    clone.global_profile().put("units", "metric");
    let id = clone.web_data().store(WebData {
        data: b"{}".to_vec(),
        mime_type: "application/json".to_owned(),
        lifetime_seconds: 60,
    });

    let side_effects = services.side_effects();
    assert_eq!(side_effects.global_profile.get_str("units"), Some("metric"));
    assert!(side_effects.web_data.get(&id).is_some());
}

#[rstest]
fn separate_requests_do_not_share_state(echo: PluginStrongName) {
    let template = template_for(&echo);
    let first = PluginServices::new(Arc::clone(&template), RequestContext::default());
    let second = PluginServices::new(template, RequestContext::default());

    first.session().put("owner", "first");

    assert!(second.session().get("owner").is_none());
}

#[rstest]
fn language_generation_is_built_per_plugin(echo: PluginStrongName) {
    let mut builder = MockLanguageGenerationBuilder::new();
    builder
        .expect_build()
        .withf(|plugin, files| {
            plugin.plugin_id() == "echo" && files.exists(Utf8Path::new("views/index.html"))
        })
        .times(1)
        .returning(|_, _| {
            let mut generator = MockLanguageGenerator::new();
            generator
                .expect_render()
                .returning(|name, _, _| Ok(format!("rendered {name}")));
            Ok(Arc::new(generator) as Arc<dyn LanguageGenerator>)
        });
    let factory = DefaultServiceContextFactory::new(content())
        .with_language_generation(Arc::new(builder));

    let template = factory.build_template(&echo).expect("template");
    let services = PluginServices::for_lifecycle(Arc::new(template));
    let generator = services.language_generator().expect("generator");

    let text = generator
        .render("greeting", &std::collections::BTreeMap::new(), "en-GB")
        .expect("render");
    assert_eq!(text, "rendered greeting");
}

#[rstest]
fn language_generation_failures_name_the_plugin(echo: PluginStrongName) {
    let mut builder = MockLanguageGenerationBuilder::new();
    builder
        .expect_build()
        .returning(|_, _| Err(CollaboratorError::new("language generation", "no templates")));
    let factory = DefaultServiceContextFactory::new(content())
        .with_language_generation(Arc::new(builder));

    let error = factory.build_template(&echo).expect_err("build must fail");

    let PluginError::ServiceContext { strong_name, message } = error else {
        panic!("unexpected error: {error:?}");
    };
    assert_eq!(strong_name, echo);
    assert!(message.contains("no templates"));
}
