//! scyllactl - node replacement and status aggregation for ScyllaDB clusters
//! managed by the Scylla operator on Kubernetes.
//!
//! # Operations
//!
//! - **Cluster status**: runs `nodetool status` in every running member and
//!   merges the per-member views, flagging members that disagree.
//! - **Node replacement**: resolves a datacenter-wide ordinal to a rack
//!   member, checks that the node is down, labels its member service so the
//!   operator replaces it, then waits until the new node is Up and Normal.
//!
//! Both operations report progress as [`events::Event`]s on a bounded queue
//! and return their outcome separately.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  CLI: clap commands | event printer | config layering    │
//! ├──────────────────────────────────────────────────────────┤
//! │  Dispatcher: cluster status | node replace               │
//! ├──────────────────────────────────────────────────────────┤
//! │  Core: status parser | ordinal resolver | poller         │
//! ├──────────────────────────────────────────────────────────┤
//! │  ClusterBackend: kube API | pod exec                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use scyllactl::{channel, Client, ClusterRef, Context, Dispatcher, KubeBackend};
//!
//! #[tokio::main]
//! async fn main() -> scyllactl::Result<()> {
//!     let backend = KubeBackend::connect(None).await?;
//!     let client = Client::new(backend);
//!     let cluster = ClusterRef::new("scylla", "simple-cluster");
//!
//!     let (sink, stream) = channel(scyllactl::events::DEFAULT_EVENT_CAPACITY);
//!     let ctx = Context::new();
//!     let (result, events) = tokio::join!(
//!         client.cluster_status(&ctx, &cluster, sink),
//!         stream.collect(),
//!     );
//!
//!     println!("{} events", events.len());
//!     for node in result?.nodes {
//!         println!("{} {} {}", node.address, node.status, node.state);
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod backend;
pub mod cli;
pub mod config;
pub mod context;
pub mod crd;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod naming;
pub mod observability;
pub mod ordinal;
pub mod output;
pub mod poll;
pub mod replace;
pub mod status;

pub use backend::{ClusterBackend, ExecOutput, KubeBackend};
pub use context::Context;
pub use crd::{RackSpec, ScyllaCluster};
pub use dispatcher::{Client, ClusterRef, Dispatcher};
pub use error::{CtlError, ErrorKind, Result};
pub use events::{channel, Event, EventKind, EventSink, EventStream};
pub use replace::{ReplacePhase, ReplacementOptions, ReplacementTarget};
pub use status::{ClusterStatusResult, NodeRecord, NodeState, NodeStatus};
