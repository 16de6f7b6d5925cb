//! Discovery client integration tests.
//!
//! Drives the public client API against `MemoryTransport`, an in-process
//! discovery tier with real lease expiry and `(priority, revision)`
//! ordering. Assertions use the tier's observable responses only.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use discovery_client::*;
use discovery_types::{GetGroupMetaOptions, HeartbeatOptions, ListMembersOptions, Member};

const LEASE: i64 = 60 * 1000 * 1000;

fn tier(addrs: &[&str]) -> Arc<MemoryTransport> {
    Arc::new(MemoryTransport::new(addrs.iter().copied()))
}

fn client_for(transport: &Arc<MemoryTransport>) -> DiscoveryClient {
    let config = DiscoveryConfig::with_servers(transport.addresses());
    DiscoveryClient::with_transport(&config, transport.clone()).unwrap()
}

fn member(i: usize) -> Member {
    Member::new(format!("member{i}"))
        .with_priority(1)
        .with_revision(1)
        .with_attribute("host", format!("host{i}"))
        .with_attribute("monitoring_port", "9020")
}

async fn init_members(client: &DiscoveryClient, group: &str, count: usize) -> Vec<Member> {
    let ctx = CancellationToken::new();
    let mut members = Vec::with_capacity(count);
    for i in 1..=count {
        let m = member(i);
        client.heartbeat(&ctx, group, &m, LEASE, None).await.unwrap();
        members.push(m);
    }
    members
}

// ── Heartbeat and reads ────────────────────────────────────────

#[tokio::test]
async fn heartbeat_then_list_includes_member() {
    let transport = tier(&["ds-1", "ds-2", "ds-3"]);
    let client = client_for(&transport);
    let ctx = CancellationToken::new();

    client
        .heartbeat(&ctx, "/test/heartbeat", &member(1), LEASE, None)
        .await
        .unwrap();

    let meta = client.get_group_meta(&ctx, "/test/heartbeat", None).await.unwrap();
    assert_eq!(meta.member_count, 1);

    let members = client.list_members(&ctx, "/test/heartbeat", None).await.unwrap();
    assert!(members.iter().any(|m| m.id == "member1"));
    assert_eq!(members[0].attribute("host"), Some(&b"host1"[..]));
    assert_eq!(members[0].attribute("monitoring_port"), Some(&b"9020"[..]));
}

#[tokio::test]
async fn group_meta_counts_distinct_members() {
    let transport = tier(&["ds-1", "ds-2"]);
    let client = client_for(&transport);
    init_members(&client, "/test/get_group_meta", 3).await;

    let ctx = CancellationToken::new();
    let meta = client.get_group_meta(&ctx, "/test/get_group_meta", None).await.unwrap();
    assert_eq!(meta.member_count, 3);
}

#[tokio::test]
async fn list_members_respects_limit() {
    let transport = tier(&["ds-1"]);
    let client = client_for(&transport);
    init_members(&client, "/test/list_members", 3).await;
    let ctx = CancellationToken::new();

    let all = client
        .list_members(&ctx, "/test/list_members", Some(&ListMembersOptions::with_limit(10)))
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let capped = client
        .list_members(&ctx, "/test/list_members", Some(&ListMembersOptions::with_limit(2)))
        .await
        .unwrap();
    assert_eq!(capped.len(), 2);
}

#[tokio::test]
async fn list_members_filters_attributes() {
    let transport = tier(&["ds-1"]);
    let client = client_for(&transport);
    init_members(&client, "/test/attrs", 1).await;
    let ctx = CancellationToken::new();

    let options = ListMembersOptions {
        attribute_keys: vec!["monitoring_port".into()],
        ..Default::default()
    };
    let members = client.list_members(&ctx, "/test/attrs", Some(&options)).await.unwrap();
    assert_eq!(members[0].attributes.len(), 1);
    assert_eq!(members[0].attributes[0].key, "monitoring_port");
}

#[tokio::test]
async fn unknown_group_is_not_found() {
    let transport = tier(&["ds-1", "ds-2"]);
    let client = client_for(&transport);
    let ctx = CancellationToken::new();

    let err = client.get_group_meta(&ctx, "/test/missing", None).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::NotFound(_)));
    assert!(!err.is_retryable());
    assert_eq!(transport.total_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn member_disappears_after_lease() {
    let transport = tier(&["ds-1"]);
    let client = client_for(&transport);
    let ctx = CancellationToken::new();

    client
        .heartbeat(&ctx, "/test/lease", &member(1), 2_000_000, None)
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(1)).await;
    client
        .heartbeat(&ctx, "/test/lease", &member(2), 2_000_000, None)
        .await
        .unwrap();

    tokio::time::advance(Duration::from_millis(1500)).await;
    let members = client.list_members(&ctx, "/test/lease", None).await.unwrap();
    let ids: Vec<_> = members.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["member2"]);

    tokio::time::advance(Duration::from_secs(1)).await;
    let err = client.get_group_meta(&ctx, "/test/lease", None).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::NotFound(_)));
}

// ── Argument validation ────────────────────────────────────────

#[tokio::test]
async fn invalid_arguments_never_reach_the_network() {
    let transport = tier(&["ds-1", "ds-2"]);
    let client = client_for(&transport);
    let ctx = CancellationToken::new();

    let cases = [
        client.heartbeat(&ctx, "", &member(1), LEASE, None).await,
        client.heartbeat(&ctx, "/g", &Member::new(""), LEASE, None).await,
        client.heartbeat(&ctx, "/g", &member(1), 0, None).await,
        client
            .heartbeat(
                &ctx,
                "/g",
                &Member::new("m").with_attribute("k", "1").with_attribute("k", "2"),
                LEASE,
                None,
            )
            .await,
    ];
    for result in cases {
        assert!(matches!(result, Err(DiscoveryError::InvalidArgument(_))), "{result:?}");
    }

    let err = client
        .list_members(&ctx, "/g", Some(&ListMembersOptions::with_limit(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidArgument(_)));

    let err = client.get_group_meta(&ctx, "", None).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidArgument(_)));

    assert_eq!(transport.total_calls(), 0);
}

// ── Failover ───────────────────────────────────────────────────

#[tokio::test]
async fn succeeds_via_last_server() {
    let transport = tier(&["ds-1", "ds-2", "ds-3"]);
    transport.set_reachable("ds-1", false);
    transport.set_reachable("ds-2", false);
    let client = client_for(&transport);
    let ctx = CancellationToken::new();

    client
        .heartbeat(&ctx, "/test/failover", &member(1), LEASE, None)
        .await
        .unwrap();
    assert_eq!(transport.total_calls(), 3);

    let health: Vec<_> = client.servers().into_iter().map(|s| (s.address, s.healthy)).collect();
    assert_eq!(
        health,
        vec![
            ("ds-1".to_string(), false),
            ("ds-2".to_string(), false),
            ("ds-3".to_string(), true),
        ]
    );
}

#[tokio::test]
async fn banned_servers_skipped_on_next_call() {
    let transport = tier(&["ds-1", "ds-2", "ds-3"]);
    transport.set_reachable("ds-1", false);
    transport.set_reachable("ds-2", false);
    let client = client_for(&transport);
    let ctx = CancellationToken::new();

    client.heartbeat(&ctx, "/g", &member(1), LEASE, None).await.unwrap();
    transport.reset_calls();

    client.get_group_meta(&ctx, "/g", None).await.unwrap();
    assert_eq!(transport.calls_to("ds-3"), 1);
    assert_eq!(transport.total_calls(), 1);
}

#[tokio::test]
async fn unavailable_server_fails_over() {
    let transport = tier(&["ds-1", "ds-2"]);
    transport.set_fault("ds-1", Fault::Unavailable);
    let client = client_for(&transport);
    let ctx = CancellationToken::new();

    client.heartbeat(&ctx, "/g", &member(1), LEASE, None).await.unwrap();
    assert_eq!(transport.calls_to("ds-1"), 1);
    assert_eq!(transport.calls_to("ds-2"), 1);
}

#[tokio::test]
async fn all_servers_down_aggregates_errors() {
    let transport = tier(&["ds-1", "ds-2", "ds-3"]);
    for addr in ["ds-1", "ds-2", "ds-3"] {
        transport.set_reachable(addr, false);
    }
    let client = client_for(&transport);
    let ctx = CancellationToken::new();

    let err = client
        .heartbeat(&ctx, "/g", &member(1), LEASE, None)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    match &err {
        DiscoveryError::Unavailable { attempts } => {
            assert_eq!(attempts.len(), 3);
            assert!(attempts.iter().all(|a| a.error.is_transient()));
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(transport.total_calls(), 3);
}

#[tokio::test]
async fn recovered_server_used_again() {
    let transport = tier(&["ds-1"]);
    transport.set_reachable("ds-1", false);
    let client = client_for(&transport);
    let ctx = CancellationToken::new();

    assert!(client.heartbeat(&ctx, "/g", &member(1), LEASE, None).await.is_err());

    transport.set_reachable("ds-1", true);
    client.heartbeat(&ctx, "/g", &member(1), LEASE, None).await.unwrap();
    assert!(client.servers()[0].healthy);
}

// ── Cancellation, deadlines, stop ──────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancel_before_response_is_cancelled() {
    let transport = tier(&["ds-1", "ds-2"]);
    transport.set_latency("ds-1", Duration::from_secs(3));
    let client = Arc::new(client_for(&transport));
    let ctx = CancellationToken::new();

    let task = {
        let client = client.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            client
                .heartbeat(&ctx, "/test/cancel", &member(1), LEASE, None)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    ctx.cancel();

    let result = task.await.unwrap();
    assert_eq!(result, Err(DiscoveryError::Cancelled));
    assert_eq!(transport.calls_to("ds-2"), 0);
    assert!(client.servers().iter().all(|s| s.healthy));
}

#[tokio::test(start_paused = true)]
async fn heartbeat_deadline_is_distinct_from_server_errors() {
    let transport = tier(&["ds-1"]);
    transport.set_latency("ds-1", Duration::from_secs(2));
    let client = client_for(&transport);
    let ctx = CancellationToken::new();

    let options = HeartbeatOptions {
        timeout: Some(Duration::from_millis(500)),
    };
    let err = client
        .heartbeat(&ctx, "/g", &member(1), LEASE, Some(&options))
        .await
        .unwrap_err();
    assert_eq!(err, DiscoveryError::DeadlineExceeded);
}

#[tokio::test]
async fn calls_after_stop_fail_fast() {
    let transport = tier(&["ds-1"]);
    let client = client_for(&transport);
    let ctx = CancellationToken::new();
    client.stop();

    assert_eq!(
        client.heartbeat(&ctx, "/g", &member(1), LEASE, None).await,
        Err(DiscoveryError::Stopped)
    );
    assert_eq!(
        client.get_group_meta(&ctx, "/g", None).await,
        Err(DiscoveryError::Stopped)
    );
    assert_eq!(
        client.list_members(&ctx, "/g", None).await,
        Err(DiscoveryError::Stopped)
    );
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_aborts_in_flight_call() {
    let transport = tier(&["ds-1"]);
    transport.set_latency("ds-1", Duration::from_secs(10));
    let client = Arc::new(client_for(&transport));

    let task = {
        let client = client.clone();
        tokio::spawn(async move {
            let ctx = CancellationToken::new();
            let options = GetGroupMetaOptions::default();
            client.get_group_meta(&ctx, "/g", Some(&options)).await
        })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    client.stop();

    assert_eq!(task.await.unwrap(), Err(DiscoveryError::Stopped));
    assert_eq!(transport.total_calls(), 1);
}

// ── Concurrency ────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_heartbeats_for_many_members() {
    let transport = tier(&["ds-1", "ds-2", "ds-3"]);
    let client = Arc::new(client_for(&transport));

    let mut tasks = Vec::new();
    for i in 0..32 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let ctx = CancellationToken::new();
            client
                .heartbeat(&ctx, "/test/concurrent", &member(i), LEASE, None)
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let ctx = CancellationToken::new();
    let meta = client.get_group_meta(&ctx, "/test/concurrent", None).await.unwrap();
    assert_eq!(meta.member_count, 32);

    // Rotation spreads load over every replica.
    for addr in ["ds-1", "ds-2", "ds-3"] {
        assert!(transport.calls_to(addr) > 0, "{addr} never used");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_heartbeats_same_member_resolved_by_rank() {
    let transport = tier(&["ds-1", "ds-2"]);
    let client = Arc::new(client_for(&transport));

    let mut tasks = Vec::new();
    for revision in 1..=8 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let ctx = CancellationToken::new();
            let m = Member::new("leader").with_priority(1).with_revision(revision);
            client.heartbeat(&ctx, "/test/race", &m, LEASE, None).await
        }));
    }
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) | Err(DiscoveryError::Superseded { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let ctx = CancellationToken::new();
    let members = client.list_members(&ctx, "/test/race", None).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].revision, 8);
}

// ── Superseded heartbeats ──────────────────────────────────────

async fn offer_stale_heartbeat(
    behavior: SupersedeBehavior,
    policy: SupersededPolicy,
) -> (DiscoveryResult<()>, Vec<Member>) {
    let transport = Arc::new(MemoryTransport::new(["ds-1"]).with_supersede(behavior));
    let mut config = DiscoveryConfig::with_servers(transport.addresses());
    config.superseded_heartbeats = policy;
    let client = DiscoveryClient::with_transport(&config, transport.clone()).unwrap();
    let ctx = CancellationToken::new();

    let held = Member::new("m1").with_priority(2).with_revision(1);
    client.heartbeat(&ctx, "/g", &held, LEASE, None).await.unwrap();

    let stale = Member::new("m1").with_priority(1).with_revision(5);
    let result = client.heartbeat(&ctx, "/g", &stale, LEASE, None).await;
    let members = client.list_members(&ctx, "/g", None).await.unwrap();
    (result, members)
}

#[tokio::test]
async fn superseded_rejection_surfaces_as_error() {
    let (result, members) =
        offer_stale_heartbeat(SupersedeBehavior::Reject, SupersededPolicy::Error).await;
    assert!(matches!(
        result,
        Err(DiscoveryError::Superseded { ref member_id, .. }) if member_id == "m1"
    ));
    assert_eq!(members[0].priority, 2);
}

#[tokio::test]
async fn superseded_rejection_can_be_ignored() {
    let (result, members) =
        offer_stale_heartbeat(SupersedeBehavior::Reject, SupersededPolicy::Ignore).await;
    assert!(result.is_ok());
    assert_eq!(members[0].priority, 2);
}

#[tokio::test]
async fn silently_ignored_heartbeat_reports_success() {
    let (result, members) =
        offer_stale_heartbeat(SupersedeBehavior::Ignore, SupersededPolicy::Error).await;
    assert!(result.is_ok());
    assert_eq!(members[0].priority, 2);
}

#[tokio::test]
async fn silently_ignored_heartbeat_with_ignore_policy() {
    let (result, members) =
        offer_stale_heartbeat(SupersedeBehavior::Ignore, SupersededPolicy::Ignore).await;
    assert!(result.is_ok());
    assert_eq!(members[0].priority, 2);
}

#[tokio::test]
async fn superseded_not_retried_on_other_servers() {
    let transport = tier(&["ds-1", "ds-2", "ds-3"]);
    let client = client_for(&transport);
    let ctx = CancellationToken::new();

    let held = Member::new("m1").with_priority(5);
    client.heartbeat(&ctx, "/g", &held, LEASE, None).await.unwrap();
    transport.reset_calls();

    let stale = Member::new("m1").with_priority(1);
    assert!(client.heartbeat(&ctx, "/g", &stale, LEASE, None).await.is_err());
    assert_eq!(transport.total_calls(), 1);
}

// ── Dynamic resolution ─────────────────────────────────────────

struct SwitchableResolver {
    addresses: Mutex<Vec<String>>,
}

impl SwitchableResolver {
    fn new(addresses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            addresses: Mutex::new(addresses.iter().map(|a| a.to_string()).collect()),
        })
    }

    fn set(&self, addresses: &[&str]) {
        *self.addresses.lock() = addresses.iter().map(|a| a.to_string()).collect();
    }
}

#[tonic::async_trait]
impl AddressResolver for SwitchableResolver {
    async fn resolve(&self) -> DiscoveryResult<Vec<String>> {
        Ok(self.addresses.lock().clone())
    }
}

fn server_addresses(client: &DiscoveryClient) -> Vec<String> {
    client.servers().into_iter().map(|s| s.address).collect()
}

#[tokio::test(start_paused = true)]
async fn refresh_loop_tracks_resolver_until_stop() {
    let transport = tier(&["ds-1", "ds-2", "ds-3"]);
    let resolver = SwitchableResolver::new(&["ds-1"]);
    let mut config = DiscoveryConfig::default();
    config.refresh_interval = Some("10s".into());

    let client = DiscoveryClient::with_resolver(&config, resolver.clone(), transport.clone())
        .await
        .unwrap();
    assert_eq!(server_addresses(&client), vec!["ds-1"]);

    resolver.set(&["ds-1", "ds-2"]);
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(server_addresses(&client), vec!["ds-1", "ds-2"]);

    // An empty answer keeps the current set.
    resolver.set(&[]);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(server_addresses(&client), vec!["ds-1", "ds-2"]);

    client.stop();
    resolver.set(&["ds-3"]);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(server_addresses(&client), vec!["ds-1", "ds-2"]);
}

#[tokio::test]
async fn manual_refresh_swaps_servers() {
    let transport = tier(&["ds-1", "ds-2"]);
    transport.set_reachable("ds-1", false);
    let resolver = SwitchableResolver::new(&["ds-1"]);

    let client = DiscoveryClient::with_resolver(&DiscoveryConfig::default(), resolver.clone(), transport.clone())
        .await
        .unwrap();
    let ctx = CancellationToken::new();
    assert!(client.heartbeat(&ctx, "/g", &member(1), LEASE, None).await.is_err());

    resolver.set(&["ds-2"]);
    assert!(client.refresh_servers().await.unwrap());
    client.heartbeat(&ctx, "/g", &member(1), LEASE, None).await.unwrap();

    client.stop();
    assert_eq!(client.refresh_servers().await, Err(DiscoveryError::Stopped));
}

#[tokio::test]
async fn resolver_with_no_addresses_rejected() {
    let transport = tier(&["ds-1"]);
    let resolver = SwitchableResolver::new(&[]);
    let result = DiscoveryClient::with_resolver(&DiscoveryConfig::default(), resolver, transport).await;
    assert!(matches!(result, Err(DiscoveryError::Config(_))));
}
