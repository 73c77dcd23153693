//! Plugins and fixtures shared by the crate's unit and behaviour tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8Path;
use time::OffsetDateTime;
use time::macros::datetime;

use crate::dialog::{
    CrossDomainContext, CrossDomainRequestData, CrossDomainResponseData, PluginResult,
    QueryWithContext, RecognizedIntent, TriggerKind, TriggerResult,
};
use crate::definition::{ConversationTree, DialogPlugin, PluginInformation, PluginInstance};
use crate::entry_point::{EntryPointTable, Visibility};
use crate::error::PluginFault;
use crate::fs::{InMemoryFileSystem, PluginFileSystem};
use crate::services::{
    DefaultServiceContextFactory, Entity, PluginServices, RequestContext, ServiceContextFactory,
    ServiceTemplate,
};
use crate::strong_name::PluginStrongName;

pub(crate) const ASSET_MODIFIED: OffsetDateTime = datetime!(2024-03-01 12:00 UTC);
pub(crate) const SCRIPT_MODIFIED: OffsetDateTime = datetime!(2024-03-01 12:00:00.5 UTC);

/// Plugin exercising every outcome the executor distinguishes.
pub(crate) struct EchoPlugin {
    strong_name: PluginStrongName,
    domain: String,
    load_fault: Option<PluginFault>,
    unload_fault: Option<PluginFault>,
    invocations: AtomicUsize,
    loads: AtomicUsize,
    unloads: AtomicUsize,
}

impl EchoPlugin {
    pub(crate) fn new(id: &str, domain: &str) -> Self {
        Self {
            strong_name: PluginStrongName::new(id, 1, 0),
            domain: domain.to_owned(),
            load_fault: None,
            unload_fault: None,
            invocations: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
            unloads: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing_load(mut self, fault: PluginFault) -> Self {
        self.load_fault = Some(fault);
        self
    }

    pub(crate) fn failing_unload(mut self, fault: PluginFault) -> Self {
        self.unload_fault = Some(fault);
        self
    }

    pub(crate) fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }

    async fn execute(
        self: Arc<Self>,
        query: QueryWithContext,
        services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let utterance = query.understanding.utterance;
        services.session().put("last_utterance", utterance.clone());
        Ok(PluginResult::success()
            .with_text(format!("{} says {utterance}", self.strong_name.plugin_id()))
            .with_continuation("Echo.Again"))
    }

    async fn again(
        self: Arc<Self>,
        _query: QueryWithContext,
        services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let previous = services
            .session()
            .get_str("last_utterance")
            .unwrap_or("nothing")
            .to_owned();
        Ok(PluginResult::success().with_text(format!("again: {previous}")))
    }

    async fn decline(
        self: Arc<Self>,
        _query: QueryWithContext,
        services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        services.local_profile().put("declined", true);
        Ok(PluginResult::failure("echo declined"))
    }

    async fn fail(
        self: Arc<Self>,
        _query: QueryWithContext,
        services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        services.session().put("partial", true);
        Err(PluginFault::unhandled("echo exploded"))
    }

    async fn panic(
        self: Arc<Self>,
        _query: QueryWithContext,
        _services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        panic!("echo panicked");
    }

    async fn snoop(
        self: Arc<Self>,
        _query: QueryWithContext,
        services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let secret = services
            .file_system()
            .read(Utf8Path::new("../other 1.0/secret.txt"))?;
        Ok(PluginResult::success().with_text(String::from_utf8_lossy(&secret).into_owned()))
    }

    async fn stall(
        self: Arc<Self>,
        _query: QueryWithContext,
        _services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(PluginResult::success())
    }
}

async fn static_reply(
    _query: QueryWithContext,
    _services: PluginServices,
) -> Result<PluginResult, PluginFault> {
    Ok(PluginResult::success().with_text("static"))
}

#[async_trait]
impl DialogPlugin for EchoPlugin {
    fn strong_name(&self) -> PluginStrongName {
        self.strong_name.clone()
    }

    fn lu_domain(&self) -> &str {
        &self.domain
    }

    fn entry_points(&self) -> EntryPointTable {
        EntryPointTable::builder::<Self>()
            .scope("Echo", |scope| {
                scope
                    .instance("Execute", Self::execute)
                    .instance("Again", Self::again)
                    .instance("Decline", Self::decline)
                    .instance("Fail", Self::fail)
                    .instance("Panic", Self::panic)
                    .instance("Snoop", Self::snoop)
                    .instance("Stall", Self::stall)
                    .member("Format", "fn(&str) -> String")
            })
            .scope("Shared", |scope| scope.function("Static", static_reply))
            .build()
    }

    async fn on_load(&self, _services: &PluginServices) -> Result<(), PluginFault> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.load_fault.clone().map_or(Ok(()), Err)
    }

    async fn on_unload(&self, _services: &PluginServices) -> Result<(), PluginFault> {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        self.unload_fault.clone().map_or(Ok(()), Err)
    }

    async fn trigger(
        &self,
        query: &QueryWithContext,
        services: &PluginServices,
    ) -> Result<Option<TriggerResult>, PluginFault> {
        match query.understanding.utterance.as_str() {
            "explode" => Err(PluginFault::unhandled("trigger exploded")),
            text if text.contains("echo") => {
                services.session().put("triggered", true);
                Ok(Some(
                    TriggerResult::new(TriggerKind::Boost).with_description("repeat yourself"),
                ))
            }
            _ => Ok(None),
        }
    }

    async fn cross_domain_request(
        &self,
        target_intent: &str,
    ) -> Result<Option<CrossDomainRequestData>, PluginFault> {
        match target_intent {
            "confirm" => Ok(Some(CrossDomainRequestData {
                requested_slots: vec!["utterance".to_owned()],
            })),
            "explode" => Err(PluginFault::unhandled("handoff exploded")),
            _ => Ok(None),
        }
    }

    async fn cross_domain_response(
        &self,
        context: &CrossDomainContext,
        services: &PluginServices,
    ) -> Result<Option<CrossDomainResponseData>, PluginFault> {
        services
            .entity_context()
            .insert(Entity::new("echo-handoff", "Handoff").with_data(context.requested_intent.clone()));
        Ok(Some(CrossDomainResponseData {
            callback_intent: "echo_done".to_owned(),
            filled_slots: context.slots.clone(),
        }))
    }

    fn conversation_tree(
        &self,
        file_system: &dyn PluginFileSystem,
        data_directory: &Utf8Path,
    ) -> Option<ConversationTree> {
        let text = file_system
            .read_to_string(&data_directory.join("tree.json"))
            .ok()?;
        serde_json::from_str(&text).ok().map(ConversationTree::new)
    }

    fn plugin_information(
        &self,
        _file_system: &dyn PluginFileSystem,
        _data_directory: &Utf8Path,
    ) -> Option<PluginInformation> {
        Some(PluginInformation {
            display_name: format!("Echo ({})", self.strong_name.plugin_id()),
            ..PluginInformation::default()
        })
    }
}

/// Plugin whose table declares a continuation the host may not call.
pub(crate) struct LeakyPlugin;

impl LeakyPlugin {
    async fn hidden(
        self: Arc<Self>,
        _query: QueryWithContext,
        _services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        Ok(PluginResult::success())
    }
}

#[async_trait]
impl DialogPlugin for LeakyPlugin {
    fn strong_name(&self) -> PluginStrongName {
        PluginStrongName::new("leaky", 1, 0)
    }

    fn lu_domain(&self) -> &str {
        "Leaky"
    }

    fn entry_points(&self) -> EntryPointTable {
        EntryPointTable::builder::<Self>()
            .scope("Leaky", |scope| {
                scope
                    .instance_with("Hidden", Visibility::Private, Self::hidden)
                    .instance_with("Internal", Visibility::Internal, Self::hidden)
            })
            .build()
    }
}

pub(crate) fn echo_instance(id: &str, domain: &str) -> (Arc<EchoPlugin>, PluginInstance) {
    let plugin = Arc::new(EchoPlugin::new(id, domain));
    let instance = PluginInstance::new(Arc::clone(&plugin));
    (plugin, instance)
}

pub(crate) fn query(utterance: &str) -> QueryWithContext {
    QueryWithContext::new(RecognizedIntent::new("Echo", "repeat").with_utterance(utterance))
}

pub(crate) fn content() -> Arc<InMemoryFileSystem> {
    Arc::new(
        InMemoryFileSystem::new()
            .with_file("views/echo 1.0/index.html", "<h1>echo</h1>", ASSET_MODIFIED)
            .with_file("views/echo 1.0/img/logo.PNG", vec![0x89, b'P', b'N', b'G'], ASSET_MODIFIED)
            .with_file("views/echo 1.0/app.js", "echo();", SCRIPT_MODIFIED)
            .with_file("plugindata/echo 1.0/tree.json", r#"{"root":"start"}"#, ASSET_MODIFIED)
            .with_file("plugindata/other 1.0/secret.txt", "classified", ASSET_MODIFIED),
    )
}

pub(crate) fn services_for(strong_name: &PluginStrongName) -> PluginServices {
    services_with(strong_name, RequestContext::default())
}

pub(crate) fn services_with(strong_name: &PluginStrongName, request: RequestContext) -> PluginServices {
    PluginServices::new(template_for(strong_name), request)
}

pub(crate) fn template_for(strong_name: &PluginStrongName) -> Arc<ServiceTemplate> {
    let template = DefaultServiceContextFactory::new(content())
        .build_template(strong_name)
        .expect("build template");
    Arc::new(template)
}
