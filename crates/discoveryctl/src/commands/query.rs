//! Read-only commands: `meta`, `list`, `servers`.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use discovery_client::{DiscoveryClient, DiscoveryConfig, ServerStatus};
use discovery_types::{ListMembersOptions, Member};

#[derive(Debug, Serialize, PartialEq)]
struct MemberView {
    id: String,
    priority: i64,
    revision: i64,
    attributes: BTreeMap<String, String>,
}

impl From<&Member> for MemberView {
    fn from(m: &Member) -> Self {
        Self {
            id: m.id.clone(),
            priority: m.priority,
            revision: m.revision,
            attributes: m
                .attributes
                .iter()
                .map(|a| (a.key.clone(), String::from_utf8_lossy(&a.value).into_owned()))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ServerView<'a> {
    address: &'a str,
    healthy: bool,
    consecutive_failures: u32,
}

impl<'a> From<&'a ServerStatus> for ServerView<'a> {
    fn from(s: &'a ServerStatus) -> Self {
        Self {
            address: &s.address,
            healthy: s.healthy,
            consecutive_failures: s.consecutive_failures,
        }
    }
}

pub async fn meta(config: &DiscoveryConfig, group: &str) -> Result<()> {
    let client = DiscoveryClient::connect(config).await?;
    let result = client
        .get_group_meta(&CancellationToken::new(), group, None)
        .await;
    client.stop();

    println!("{}", serde_json::to_string_pretty(&result?)?);
    Ok(())
}

pub async fn list(
    config: &DiscoveryConfig,
    group: &str,
    limit: Option<i32>,
    keys: Vec<String>,
) -> Result<()> {
    let options = ListMembersOptions {
        limit,
        attribute_keys: keys,
        ..Default::default()
    };
    let client = DiscoveryClient::connect(config).await?;
    let result = client
        .list_members(&CancellationToken::new(), group, Some(&options))
        .await;
    client.stop();

    let members: Vec<MemberView> = result?.iter().map(MemberView::from).collect();
    println!("{}", serde_json::to_string_pretty(&members)?);
    Ok(())
}

pub async fn servers(config: &DiscoveryConfig) -> Result<()> {
    let client = DiscoveryClient::connect(config).await?;
    let servers = client.servers();
    client.stop();

    let view: Vec<ServerView<'_>> = servers.iter().map(ServerView::from).collect();
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
