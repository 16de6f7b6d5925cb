//! `discoveryctl heartbeat`: keep a member registered.
//!
//! Renews the lease every `--interval` until Ctrl-C. Transient failures
//! are logged and retried on the next tick; the lease covers the gap as
//! long as the interval is shorter than the lease.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use discovery_client::config::parse_duration;
use discovery_client::{DiscoveryClient, DiscoveryConfig, DiscoveryError};
use discovery_types::Member;

pub struct HeartbeatArgs {
    pub group: String,
    pub member: String,
    pub priority: i64,
    pub revision: i64,
    pub attrs: Vec<String>,
    pub lease: String,
    pub interval: String,
    pub once: bool,
}

pub async fn run(config: &DiscoveryConfig, args: HeartbeatArgs) -> Result<()> {
    let lease = duration_arg("lease", &args.lease)?;
    let interval = duration_arg("interval", &args.interval)?;
    if !args.once && interval >= lease {
        bail!("--interval ({interval:?}) must be shorter than --lease ({lease:?})");
    }
    let lease_micros = i64::try_from(lease.as_micros())?;
    let member = build_member(&args)?;

    let client = DiscoveryClient::connect(config).await?;
    let ctx = CancellationToken::new();

    let signal = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal.cancel();
        }
    });

    let result = renew(&client, &ctx, &args, &member, lease_micros, interval).await;
    client.stop();
    result
}

async fn renew(
    client: &DiscoveryClient,
    ctx: &CancellationToken,
    args: &HeartbeatArgs,
    member: &Member,
    lease_micros: i64,
    interval: Duration,
) -> Result<()> {
    loop {
        match client
            .heartbeat(ctx, &args.group, member, lease_micros, None)
            .await
        {
            Ok(()) => info!(group = %args.group, member = %member.id, "heartbeat sent"),
            Err(DiscoveryError::Cancelled) => return Ok(()),
            Err(e) if e.is_retryable() && !args.once => {
                warn!(error = %e, "heartbeat failed, retrying next interval");
            }
            Err(e) => return Err(e.into()),
        }

        if args.once {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = ctx.cancelled() => return Ok(()),
        }
    }
}

fn duration_arg(name: &str, value: &str) -> Result<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(anyhow!("invalid --{name}: {value:?}")),
    }
}

fn build_member(args: &HeartbeatArgs) -> Result<Member> {
    let mut member = Member::new(args.member.clone())
        .with_priority(args.priority)
        .with_revision(args.revision);
    for attr in &args.attrs {
        let (key, value) = parse_attribute(attr)?;
        member = member.with_attribute(key, value);
    }
    Ok(member)
}

/// Split `key=value`. The value may itself contain `=`.
pub fn parse_attribute(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => bail!("attribute must be key=value, got {s:?}"),
    }
}
