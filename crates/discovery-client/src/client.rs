//! The public discovery client.
//!
//! [`DiscoveryClient`] registers members with lease heartbeats and reads
//! group state. Every call goes through the [`Dispatcher`], which fails
//! over between discovery servers within the call. Retrying across time
//! (re-heartbeating before the lease runs out) is the caller's job.
//!
//! ```no_run
//! # async fn example() -> discovery_client::DiscoveryResult<()> {
//! use discovery_client::{DiscoveryClient, DiscoveryConfig};
//! use discovery_types::Member;
//! use tokio_util::sync::CancellationToken;
//!
//! let client = DiscoveryClient::new_static(&DiscoveryConfig::with_servers(["ds-1:9020"]))?;
//! let ctx = CancellationToken::new();
//! let member = Member::new("worker-1").with_priority(1).with_revision(1);
//! client.heartbeat(&ctx, "/service/workers", &member, 60_000_000, None).await?;
//! client.stop();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use discovery_types::{
    validate, GetGroupMetaOptions, GroupMeta, HeartbeatOptions, LeaseTimeoutMicros,
    ListMembersOptions, Member,
};

use crate::config::{DiscoveryConfig, SupersededPolicy};
use crate::dispatcher::{CallContext, Dispatcher};
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::grpc::GrpcTransport;
use crate::resolver::{AddressResolver, DnsResolver};
use crate::server_set::{ServerSet, ServerStatus};
use crate::transport::{
    DiscoveryRequest, DiscoveryResponse, HeartbeatRequest, ListMembersRequest, Transport,
};

#[derive(Default)]
struct Lifecycle {
    stopped: bool,
    refresh: Option<JoinHandle<()>>,
}

pub struct DiscoveryClient {
    dispatcher: Dispatcher,
    resolver: Option<Arc<dyn AddressResolver>>,
    superseded: SupersededPolicy,
    request_timeout: Option<Duration>,
    /// Cancelled by `stop`; aborts in-flight attempts.
    shutdown: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl DiscoveryClient {
    /// Client over gRPC for a static server list.
    pub fn new_static(config: &DiscoveryConfig) -> DiscoveryResult<Self> {
        let transport = Arc::new(GrpcTransport::new(config.rpc_timeout()));
        Self::with_transport(config, transport)
    }

    /// Client for a static server list over a caller-supplied transport.
    pub fn with_transport(
        config: &DiscoveryConfig,
        transport: Arc<dyn Transport>,
    ) -> DiscoveryResult<Self> {
        config.validate_settings()?;
        let servers = ServerSet::new(
            config.discovery_servers.iter().cloned(),
            config.server_ban_timeout(),
        )?;
        Ok(Self::assemble(config, servers, transport, None))
    }

    /// Client over gRPC from config, using DNS resolution when no static
    /// servers are configured.
    pub async fn connect(config: &DiscoveryConfig) -> DiscoveryResult<Self> {
        config.validate()?;
        if !config.discovery_servers.is_empty() {
            return Self::new_static(config);
        }

        let target = config
            .discovery_dns
            .clone()
            .ok_or_else(|| DiscoveryError::Config("discovery_dns is not set".into()))?;
        let transport = Arc::new(GrpcTransport::new(config.rpc_timeout()));
        Self::with_resolver(config, Arc::new(DnsResolver::new(target)), transport).await
    }

    /// Client whose server list comes from `resolver`.
    ///
    /// Resolves once up front, then re-resolves every
    /// `refresh_interval` in a background task until [`stop`](Self::stop).
    /// Must be called from within a tokio runtime.
    pub async fn with_resolver(
        config: &DiscoveryConfig,
        resolver: Arc<dyn AddressResolver>,
        transport: Arc<dyn Transport>,
    ) -> DiscoveryResult<Self> {
        config.validate_settings()?;
        let addresses = resolver.resolve().await?;
        let servers = ServerSet::new(addresses, config.server_ban_timeout())?;
        let client = Self::assemble(config, servers, transport, Some(resolver.clone()));

        let handle = tokio::spawn(run_refresh_loop(
            resolver,
            client.dispatcher.servers().clone(),
            config.refresh_interval(),
            client.shutdown.clone(),
        ));
        client.lifecycle.lock().refresh = Some(handle);

        Ok(client)
    }

    fn assemble(
        config: &DiscoveryConfig,
        servers: ServerSet,
        transport: Arc<dyn Transport>,
        resolver: Option<Arc<dyn AddressResolver>>,
    ) -> Self {
        info!(servers = servers.len(), "discovery client created");
        Self {
            dispatcher: Dispatcher::new(
                Arc::new(servers),
                transport,
                config.rpc_timeout(),
                config.max_attempts,
            ),
            resolver,
            superseded: config.superseded_heartbeats,
            request_timeout: config.request_timeout(),
            shutdown: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Create or renew `member` in `group_path` for `lease_timeout_micros`.
    pub async fn heartbeat(
        &self,
        ctx: &CancellationToken,
        group_path: &str,
        member: &Member,
        lease_timeout_micros: LeaseTimeoutMicros,
        options: Option<&HeartbeatOptions>,
    ) -> DiscoveryResult<()> {
        self.ensure_running()?;
        validate::heartbeat(group_path, member, lease_timeout_micros)?;

        let request = DiscoveryRequest::Heartbeat(HeartbeatRequest::new(
            group_path,
            member,
            lease_timeout_micros,
        ));
        let timeout = options.and_then(|o| o.timeout);

        match self.call(ctx, &request, timeout).await {
            Ok(DiscoveryResponse::Heartbeat) => Ok(()),
            Ok(_) => Err(unexpected(&request)),
            Err(DiscoveryError::Superseded { member_id, message })
                if self.superseded == SupersededPolicy::Ignore =>
            {
                warn!(group = %group_path, %member_id, %message, "heartbeat superseded, ignoring");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_group_meta(
        &self,
        ctx: &CancellationToken,
        group_path: &str,
        options: Option<&GetGroupMetaOptions>,
    ) -> DiscoveryResult<GroupMeta> {
        self.ensure_running()?;
        validate::group_path(group_path)?;

        let request = DiscoveryRequest::GetGroupMeta {
            group_path: group_path.to_string(),
        };
        let timeout = options.and_then(|o| o.timeout);

        match self.call(ctx, &request, timeout).await? {
            DiscoveryResponse::GroupMeta(meta) => Ok(meta),
            _ => Err(unexpected(&request)),
        }
    }

    /// List members of `group_path`, at most `options.limit` of them.
    ///
    /// Order is chosen by the server and may differ between calls.
    pub async fn list_members(
        &self,
        ctx: &CancellationToken,
        group_path: &str,
        options: Option<&ListMembersOptions>,
    ) -> DiscoveryResult<Vec<Member>> {
        self.ensure_running()?;
        validate::group_path(group_path)?;
        let options = options.cloned().unwrap_or_default();
        validate::list_options(&options)?;

        let request = DiscoveryRequest::ListMembers(ListMembersRequest {
            group_path: group_path.to_string(),
            limit: options.limit,
            attribute_keys: options.attribute_keys,
        });

        match self.call(ctx, &request, options.timeout).await? {
            DiscoveryResponse::Members(mut members) => {
                if let Some(limit) = options.limit {
                    members.truncate(limit as usize);
                }
                Ok(members)
            }
            _ => Err(unexpected(&request)),
        }
    }

    /// Release background resources and fail every later call.
    ///
    /// Idempotent. In-flight calls are aborted with
    /// [`DiscoveryError::Stopped`]; this method does not wait for them.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.stopped {
            return;
        }
        lifecycle.stopped = true;
        self.shutdown.cancel();
        if let Some(handle) = lifecycle.refresh.take() {
            handle.abort();
        }
        info!("discovery client stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.lifecycle.lock().stopped
    }

    /// Current server list with health annotations.
    pub fn servers(&self) -> Vec<ServerStatus> {
        self.dispatcher.servers().snapshot()
    }

    /// Re-resolve the server list once. Returns whether it changed.
    pub async fn refresh_servers(&self) -> DiscoveryResult<bool> {
        self.ensure_running()?;
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| DiscoveryError::Config("client uses a static server list".into()))?;
        refresh_once(resolver.as_ref(), self.dispatcher.servers()).await
    }

    fn ensure_running(&self) -> DiscoveryResult<()> {
        if self.lifecycle.lock().stopped {
            return Err(DiscoveryError::Stopped);
        }
        Ok(())
    }

    async fn call(
        &self,
        ctx: &CancellationToken,
        request: &DiscoveryRequest,
        timeout: Option<Duration>,
    ) -> DiscoveryResult<DiscoveryResponse> {
        // A timeout too large to represent means no deadline.
        let deadline = timeout
            .or(self.request_timeout)
            .and_then(|t| Instant::now().checked_add(t));
        self.dispatcher
            .dispatch(
                request,
                CallContext {
                    cancel: ctx,
                    shutdown: &self.shutdown,
                    deadline,
                },
            )
            .await
    }
}

impl Drop for DiscoveryClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.lifecycle.get_mut().refresh.take() {
            handle.abort();
        }
    }
}

fn unexpected(request: &DiscoveryRequest) -> DiscoveryError {
    DiscoveryError::Rejected(format!("unexpected response to {}", request.method()))
}

async fn refresh_once(resolver: &dyn AddressResolver, servers: &ServerSet) -> DiscoveryResult<bool> {
    let addresses = resolver.resolve().await?;
    if addresses.is_empty() {
        return Err(DiscoveryError::Resolve("resolver returned no addresses".into()));
    }
    let changed = servers.replace(addresses)?;
    if changed {
        info!(servers = servers.len(), "discovery server set refreshed");
    }
    Ok(changed)
}

async fn run_refresh_loop(
    resolver: Arc<dyn AddressResolver>,
    servers: Arc<ServerSet>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    debug!(?interval, "server refresh loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                if let Err(e) = refresh_once(resolver.as_ref(), &servers).await {
                    warn!(error = %e, "discovery server refresh failed, keeping current set");
                }
            }
            _ = shutdown.cancelled() => {
                debug!("server refresh loop shutting down");
                break;
            }
        }
    }
}
