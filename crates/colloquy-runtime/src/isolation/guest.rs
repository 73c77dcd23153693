use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ISOLATION_TARGET;
use super::protocol::{GuestCall, GuestReply, GuestRequest, GuestResponse, RemoteError};
use crate::error::PluginError;
use crate::provider::PluginProvider;

/// Serves requests read from `reader` against `provider`, writing replies to
/// `writer`.
///
/// Requests run concurrently. The loop ends when `reader` reaches end of
/// input, after every in-flight request has been answered.
///
/// # Errors
///
/// Returns [`PluginError::Io`] when reading requests or writing replies
/// fails.
pub async fn serve<R, W>(
    provider: Arc<dyn PluginProvider>,
    reader: R,
    writer: W,
) -> Result<(), PluginError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (replies, outgoing) = mpsc::unbounded_channel::<GuestResponse>();
    let writer_task = tokio::spawn(write_replies(writer, outgoing));
    let inflight: Arc<DashMap<u64, CancellationToken>> = Arc::new(DashMap::new());
    let mut requests = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();
    info!(target: ISOLATION_TARGET, "guest serving requests");

    while let Some(line) = lines.next_line().await.map_err(PluginError::io)? {
        while requests.try_join_next().is_some() {}
        if line.trim().is_empty() {
            continue;
        }
        let request: GuestRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(error) => {
                warn!(
                    target: ISOLATION_TARGET,
                    error = %PluginError::DeserializeMessage(error),
                    "discarding undecodable request"
                );
                continue;
            }
        };
        let GuestRequest { id, call } = request;
        if let GuestCall::Cancel { target } = call {
            if let Some(token) = inflight.get(&target) {
                debug!(target: ISOLATION_TARGET, target_id = target, "cancelling request");
                token.cancel();
            }
            continue;
        }

        let token = CancellationToken::new();
        inflight.insert(id, token.clone());
        let handler = Arc::clone(&provider);
        let reply_sender = replies.clone();
        let running = Arc::clone(&inflight);
        requests.spawn(async move {
            debug!(target: ISOLATION_TARGET, id, operation = call.name(), "handling request");
            let reply = dispatch(handler.as_ref(), call, token).await;
            running.remove(&id);
            if reply_sender.send(GuestResponse { id, reply }).is_err() {
                warn!(target: ISOLATION_TARGET, id, "reply writer has stopped");
            }
        });
    }

    while requests.join_next().await.is_some() {}
    drop(replies);
    info!(target: ISOLATION_TARGET, "guest input closed");
    writer_task.await.map_err(|error| PluginError::Remote {
        message: error.to_string(),
    })?
}

async fn write_replies<W>(
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<GuestResponse>,
) -> Result<(), PluginError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = outgoing.recv().await {
        let mut line = serde_json::to_vec(&response).map_err(PluginError::SerializeMessage)?;
        line.push(b'\n');
        writer.write_all(&line).await.map_err(PluginError::io)?;
        writer.flush().await.map_err(PluginError::io)?;
    }
    Ok(())
}

async fn dispatch(
    provider: &dyn PluginProvider,
    call: GuestCall,
    token: CancellationToken,
) -> GuestReply {
    let outcome = match call {
        GuestCall::AvailablePlugins => provider
            .available_plugins()
            .await
            .map(|plugins| GuestReply::AvailablePlugins { plugins }),
        GuestCall::Load { strong_name } => provider
            .load(&strong_name)
            .await
            .map(|information| GuestReply::Loaded { information }),
        GuestCall::Unload { strong_name } => provider
            .unload(&strong_name)
            .await
            .map(|clean| GuestReply::Unloaded { clean }),
        GuestCall::Launch {
            strong_name,
            entry_point,
            query,
            context,
        } => provider
            .launch(
                &strong_name,
                &entry_point,
                query,
                context.with_cancellation(token),
            )
            .await
            .map(|response| GuestReply::Dialog { response }),
        GuestCall::Trigger {
            strong_name,
            query,
            context,
        } => provider
            .trigger(&strong_name, query, context.with_cancellation(token))
            .await
            .map(|response| GuestReply::Trigger { response }),
        GuestCall::CrossDomainRequest {
            strong_name,
            target_intent,
        } => provider
            .cross_domain_request(&strong_name, &target_intent)
            .await
            .map(|data| GuestReply::CrossDomainRequest { data }),
        GuestCall::CrossDomainResponse {
            strong_name,
            context,
            request,
        } => provider
            .cross_domain_response(&strong_name, context, request.with_cancellation(token))
            .await
            .map(|response| GuestReply::CrossDomainResponse { response }),
        GuestCall::FetchViewData {
            strong_name,
            path,
            if_modified_since,
        } => provider
            .fetch_view_data(&strong_name, &path, if_modified_since)
            .await
            .map(|asset| GuestReply::ViewData { asset }),
        GuestCall::Cancel { .. } => Err(PluginError::Remote {
            message: String::from("cancel carries no reply"),
        }),
    };
    outcome.unwrap_or_else(|error| GuestReply::Error {
        error: RemoteError::from(&error),
    })
}
