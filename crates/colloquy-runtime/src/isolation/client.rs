use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ISOLATION_TARGET;
use super::protocol::{GuestCall, GuestReply, GuestRequest, GuestResponse};
use crate::definition::LoadedPluginInformation;
use crate::dialog::{
    CrossDomainContext, CrossDomainRequestData, CrossDomainResponseResponse,
    DialogProcessingResponse, QueryWithContext, TriggerProcessingResponse,
};
use crate::error::PluginError;
use crate::provider::PluginProvider;
use crate::services::RequestContext;
use crate::strong_name::PluginStrongName;
use crate::view::CachedAsset;

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

type PendingReplies = Arc<DashMap<u64, oneshot::Sender<GuestReply>>>;
type GuestWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Settings for talking to a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolationOptions {
    response_timeout: Duration,
}

impl Default for IsolationOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl IsolationOptions {
    /// Options with a 30 second response timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    /// Sets how long a call waits for the guest's reply.
    #[must_use]
    pub const fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// How long a call waits for the guest's reply.
    #[must_use]
    pub const fn response_timeout(self) -> Duration {
        self.response_timeout
    }
}

/// Provider forwarding every call to a guest process.
///
/// Calls are multiplexed over one channel: each request carries an id and a
/// background task routes replies back to the waiting caller, so turns run
/// concurrently. Once the guest closes its output every pending and future
/// call fails with [`PluginError::GuestClosed`].
pub struct IsolatedPluginProvider {
    writer: tokio::sync::Mutex<GuestWriter>,
    pending: PendingReplies,
    next_id: AtomicU64,
    closed: CancellationToken,
    options: IsolationOptions,
    tasks: Vec<JoinHandle<()>>,
    child: Mutex<Option<Child>>,
}

impl IsolatedPluginProvider {
    /// Talks to a guest over an existing channel.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn connect<R, W>(reader: R, writer: W, options: IsolationOptions) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingReplies = Arc::new(DashMap::new());
        let closed = CancellationToken::new();
        let router = tokio::spawn(route_replies(
            reader,
            Arc::clone(&pending),
            closed.clone(),
        ));
        Self {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            closed,
            options,
            tasks: vec![router],
            child: Mutex::new(None),
        }
    }

    /// Starts `command` as a guest speaking over its stdin and stdout.
    ///
    /// The guest's stderr is forwarded to tracing and the process is killed
    /// when the provider is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Spawn`] if the process cannot be started.
    pub fn spawn(mut command: Command, options: IsolationOptions) -> Result<Self, PluginError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(
            target: ISOLATION_TARGET,
            program = ?command.as_std().get_program(),
            "spawning guest process"
        );
        let mut child = command.spawn().map_err(|error| PluginError::Spawn {
            message: String::from("failed to start guest process"),
            source: Some(Arc::new(error)),
        })?;
        let stdin = child.stdin.take().ok_or_else(|| PluginError::Spawn {
            message: String::from("failed to capture guest stdin"),
            source: None,
        })?;
        let stdout = child.stdout.take().ok_or_else(|| PluginError::Spawn {
            message: String::from("failed to capture guest stdout"),
            source: None,
        })?;
        let stderr = child.stderr.take();

        let mut provider = Self::connect(stdout, stdin, options);
        if let Some(output) = stderr {
            provider.tasks.push(tokio::spawn(drain_stderr(output)));
        }
        *provider.child.lock() = Some(child);
        Ok(provider)
    }

    /// Reports whether the guest has closed the channel.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Waits until the guest closes the channel.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    // `Ok(None)` means the caller's token fired first.
    async fn call(
        &self,
        call: GuestCall,
        cancellation: &CancellationToken,
    ) -> Result<Option<GuestReply>, PluginError> {
        if self.is_closed() {
            return Err(PluginError::GuestClosed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let operation = call.name();
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(id, sender);
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(PluginError::GuestClosed);
        }
        if let Err(error) = self.send(&GuestRequest { id, call }).await {
            self.pending.remove(&id);
            return Err(error);
        }
        debug!(target: ISOLATION_TARGET, id, operation, "sent guest request");

        let timeout = self.options.response_timeout();
        tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                self.pending.remove(&id);
                self.cancel(id).await;
                Ok(None)
            }
            reply = tokio::time::timeout(timeout, receiver) => match reply {
                Ok(Ok(reply)) => Ok(Some(reply)),
                Ok(Err(_)) => Err(PluginError::GuestClosed),
                Err(_) => {
                    self.pending.remove(&id);
                    warn!(target: ISOLATION_TARGET, id, operation, ?timeout, "guest reply timed out");
                    self.cancel(id).await;
                    Err(PluginError::Timeout { timeout })
                }
            },
        }
    }

    async fn call_uncancellable(&self, call: GuestCall) -> Result<GuestReply, PluginError> {
        self.call(call, &CancellationToken::new())
            .await?
            .ok_or(PluginError::GuestClosed)
    }

    async fn cancel(&self, target: u64) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = GuestRequest {
            id,
            call: GuestCall::Cancel { target },
        };
        if let Err(error) = self.send(&request).await {
            debug!(target: ISOLATION_TARGET, target_id = target, %error, "could not forward cancellation");
        }
    }

    async fn send(&self, request: &GuestRequest) -> Result<(), PluginError> {
        let mut line = serde_json::to_vec(request).map_err(PluginError::SerializeMessage)?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await.map_err(PluginError::io)?;
        writer.flush().await.map_err(PluginError::io)
    }
}

impl Drop for IsolatedPluginProvider {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for IsolatedPluginProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedPluginProvider")
            .field("options", &self.options)
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn unpack<T>(
    reply: GuestReply,
    expected: &'static str,
    pick: impl FnOnce(GuestReply) -> Result<T, GuestReply>,
) -> Result<T, PluginError> {
    match pick(reply) {
        Ok(value) => Ok(value),
        Err(GuestReply::Error { error }) => Err(error.into()),
        Err(_) => Err(PluginError::UnexpectedReply { expected }),
    }
}

fn cancelled(strong_name: &PluginStrongName) -> PluginError {
    PluginError::Cancelled {
        strong_name: strong_name.clone(),
    }
}

#[async_trait]
impl PluginProvider for IsolatedPluginProvider {
    async fn available_plugins(&self) -> Result<Vec<PluginStrongName>, PluginError> {
        let reply = self.call_uncancellable(GuestCall::AvailablePlugins).await?;
        unpack(reply, "available_plugins", |reply| match reply {
            GuestReply::AvailablePlugins { plugins } => Ok(plugins),
            other => Err(other),
        })
    }

    async fn load(
        &self,
        strong_name: &PluginStrongName,
    ) -> Result<LoadedPluginInformation, PluginError> {
        let reply = self
            .call_uncancellable(GuestCall::Load {
                strong_name: strong_name.clone(),
            })
            .await?;
        unpack(reply, "loaded", |reply| match reply {
            GuestReply::Loaded { information } => Ok(information),
            other => Err(other),
        })
    }

    async fn unload(&self, strong_name: &PluginStrongName) -> Result<bool, PluginError> {
        let reply = self
            .call_uncancellable(GuestCall::Unload {
                strong_name: strong_name.clone(),
            })
            .await?;
        unpack(reply, "unloaded", |reply| match reply {
            GuestReply::Unloaded { clean } => Ok(clean),
            other => Err(other),
        })
    }

    async fn launch(
        &self,
        strong_name: &PluginStrongName,
        entry_point: &str,
        query: QueryWithContext,
        context: RequestContext,
    ) -> Result<DialogProcessingResponse, PluginError> {
        let cancellation = context.cancellation.clone();
        let call = GuestCall::Launch {
            strong_name: strong_name.clone(),
            entry_point: entry_point.to_owned(),
            query,
            context,
        };
        let reply = self
            .call(call, &cancellation)
            .await?
            .ok_or_else(|| cancelled(strong_name))?;
        unpack(reply, "dialog", |reply| match reply {
            GuestReply::Dialog { response } => Ok(response),
            other => Err(other),
        })
    }

    async fn trigger(
        &self,
        strong_name: &PluginStrongName,
        query: QueryWithContext,
        context: RequestContext,
    ) -> Result<TriggerProcessingResponse, PluginError> {
        let cancellation = context.cancellation.clone();
        let call = GuestCall::Trigger {
            strong_name: strong_name.clone(),
            query,
            context,
        };
        let reply = self
            .call(call, &cancellation)
            .await?
            .ok_or_else(|| cancelled(strong_name))?;
        unpack(reply, "trigger", |reply| match reply {
            GuestReply::Trigger { response } => Ok(response),
            other => Err(other),
        })
    }

    async fn cross_domain_request(
        &self,
        strong_name: &PluginStrongName,
        target_intent: &str,
    ) -> Result<Option<CrossDomainRequestData>, PluginError> {
        let reply = self
            .call_uncancellable(GuestCall::CrossDomainRequest {
                strong_name: strong_name.clone(),
                target_intent: target_intent.to_owned(),
            })
            .await?;
        unpack(reply, "cross_domain_request", |reply| match reply {
            GuestReply::CrossDomainRequest { data } => Ok(data),
            other => Err(other),
        })
    }

    async fn cross_domain_response(
        &self,
        strong_name: &PluginStrongName,
        context: CrossDomainContext,
        request: RequestContext,
    ) -> Result<CrossDomainResponseResponse, PluginError> {
        let cancellation = request.cancellation.clone();
        let call = GuestCall::CrossDomainResponse {
            strong_name: strong_name.clone(),
            context,
            request,
        };
        let reply = self
            .call(call, &cancellation)
            .await?
            .ok_or_else(|| cancelled(strong_name))?;
        unpack(reply, "cross_domain_response", |reply| match reply {
            GuestReply::CrossDomainResponse { response } => Ok(response),
            other => Err(other),
        })
    }

    async fn fetch_view_data(
        &self,
        strong_name: &PluginStrongName,
        path: &str,
        if_modified_since: Option<OffsetDateTime>,
    ) -> Result<Option<CachedAsset>, PluginError> {
        let reply = self
            .call_uncancellable(GuestCall::FetchViewData {
                strong_name: strong_name.clone(),
                path: path.to_owned(),
                if_modified_since,
            })
            .await?;
        unpack(reply, "view_data", |reply| match reply {
            GuestReply::ViewData { asset } => Ok(asset),
            other => Err(other),
        })
    }
}

async fn route_replies<R>(reader: R, pending: PendingReplies, closed: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<GuestResponse>(&line) {
                Ok(response) => match pending.remove(&response.id) {
                    Some((_, sender)) => {
                        if sender.send(response.reply).is_err() {
                            debug!(target: ISOLATION_TARGET, id = response.id, "caller stopped waiting");
                        }
                    }
                    None => {
                        debug!(target: ISOLATION_TARGET, id = response.id, "reply for abandoned request");
                    }
                },
                Err(error) => {
                    warn!(
                        target: ISOLATION_TARGET,
                        error = %PluginError::DeserializeMessage(error),
                        "discarding undecodable guest reply"
                    );
                }
            },
            Ok(None) => break,
            Err(error) => {
                warn!(target: ISOLATION_TARGET, %error, "reading from guest failed");
                break;
            }
        }
    }
    debug!(target: ISOLATION_TARGET, pending = pending.len(), "guest channel closed");
    closed.cancel();
    pending.clear();
}

async fn drain_stderr<R>(stderr: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: ISOLATION_TARGET, stderr = %line.trim_end(), "guest stderr output");
    }
}
