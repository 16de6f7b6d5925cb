//! Server selection and failover.
//!
//! One logical call becomes a sequence of attempts, one server at a time,
//! following the [`ServerSet`] plan. Transport failures ban the server and
//! move on; server rejections end the call immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AttemptFailure, DiscoveryError, DiscoveryResult, TransportError};
use crate::server_set::ServerSet;
use crate::transport::{DiscoveryRequest, DiscoveryResponse, Transport};

/// Signals that end a call early.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    /// Caller cancellation.
    pub cancel: &'a CancellationToken,
    /// Client shutdown.
    pub shutdown: &'a CancellationToken,
    pub deadline: Option<Instant>,
}

pub struct Dispatcher {
    servers: Arc<ServerSet>,
    transport: Arc<dyn Transport>,
    rpc_timeout: Duration,
    max_attempts: Option<usize>,
}

impl Dispatcher {
    pub fn new(
        servers: Arc<ServerSet>,
        transport: Arc<dyn Transport>,
        rpc_timeout: Duration,
        max_attempts: Option<usize>,
    ) -> Self {
        Self {
            servers,
            transport,
            rpc_timeout,
            max_attempts,
        }
    }

    pub fn servers(&self) -> &Arc<ServerSet> {
        &self.servers
    }

    /// Send `request`, failing over across servers on transport errors.
    pub async fn dispatch(
        &self,
        request: &DiscoveryRequest,
        ctx: CallContext<'_>,
    ) -> DiscoveryResult<DiscoveryResponse> {
        let method = request.method();
        let group = request.group_path();
        let plan = self.servers.plan(self.max_attempts.unwrap_or(usize::MAX));
        let mut failures: Vec<AttemptFailure> = Vec::with_capacity(plan.len());

        for (attempt, address) in plan.into_iter().enumerate() {
            debug!(method, %group, %address, attempt, "dispatching discovery request");

            let outcome = tokio::select! {
                biased;
                _ = ctx.shutdown.cancelled() => return Err(DiscoveryError::Stopped),
                _ = ctx.cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                _ = wait_deadline(ctx.deadline) => return Err(DiscoveryError::DeadlineExceeded),
                result = tokio::time::timeout(
                    self.rpc_timeout,
                    self.transport.call(&address, request),
                ) => result.unwrap_or(Err(TransportError::Timeout(self.rpc_timeout))),
            };

            match outcome {
                Ok(response) => {
                    self.servers.mark_healthy(&address);
                    return Ok(response);
                }
                Err(TransportError::Remote { code, message }) => {
                    // The server answered, so it is reachable.
                    self.servers.mark_healthy(&address);
                    debug!(method, %group, %address, %code, %message, "discovery request rejected");
                    return Err(DiscoveryError::from_remote(code, message, request.member_id()));
                }
                Err(error) => {
                    warn!(method, %group, %address, attempt, %error, "discovery attempt failed");
                    self.servers.mark_unhealthy(&address);
                    failures.push(AttemptFailure { address, error });
                }
            }
        }

        Err(DiscoveryError::Unavailable { attempts: failures })
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
