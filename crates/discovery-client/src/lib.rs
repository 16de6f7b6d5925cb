//! discovery-client: lease heartbeats and group queries against a
//! replicated discovery tier.
//!
//! # Architecture
//!
//! ```text
//! DiscoveryClient
//!   ├── heartbeat() / get_group_meta() / list_members() / stop()
//!   ├── Dispatcher
//!   │   ├── ServerSet (rotating plan, healthy first, timed bans)
//!   │   └── Transport (GrpcTransport | MemoryTransport)
//!   └── Refresh loop (optional)
//!       └── AddressResolver (StaticResolver | DnsResolver)
//! ```
//!
//! # Failover
//!
//! Each call tries servers one at a time, at most once each. Transport
//! failures (refused, timed out, unavailable) ban the server for
//! `server_ban_timeout` and move on to the next. Server rejections such
//! as not-found end the call at once: another replica would say the same.
//!
//! # Cancellation
//!
//! Every call takes a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! and an optional deadline. Cancellation surfaces as
//! [`DiscoveryError::Cancelled`], an expired deadline as
//! [`DiscoveryError::DeadlineExceeded`], and a stopped client as
//! [`DiscoveryError::Stopped`].

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod grpc;
pub mod memory;
pub mod proto;
pub mod resolver;
pub mod server_set;
pub mod transport;

pub use client::DiscoveryClient;
pub use config::{DiscoveryConfig, SupersededPolicy};
pub use error::{AttemptFailure, DiscoveryError, DiscoveryResult, RemoteCode, TransportError};
pub use grpc::GrpcTransport;
pub use memory::{Fault, MemoryTransport, SupersedeBehavior};
pub use resolver::{AddressResolver, DnsResolver, StaticResolver};
pub use server_set::{ServerSet, ServerStatus};
pub use transport::{DiscoveryRequest, DiscoveryResponse, Transport};
