//! The capability surface used by the CLI and by tests.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::aggregate;
use crate::backend::ClusterBackend;
use crate::context::Context;
use crate::crd::ScyllaCluster;
use crate::error::Result;
use crate::events::EventSink;
use crate::poll::{Clock, TokioClock};
use crate::replace::{self, ReplacementOptions};
use crate::status::ClusterStatusResult;

/// Namespaced name of a ScyllaCluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterRef {
    pub namespace: String,
    pub name: String,
}

impl ClusterRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Operations available on a ScyllaCluster.
///
/// Long-running operations report progress through the given sink and drop it
/// when they return, which ends the caller's event stream.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Fetch the cluster definition.
    async fn get_cluster(&self, ctx: &Context, cluster: &ClusterRef) -> Result<ScyllaCluster>;

    /// Aggregate the status of every running member.
    async fn cluster_status(
        &self,
        ctx: &Context,
        cluster: &ClusterRef,
        events: EventSink,
    ) -> Result<ClusterStatusResult>;

    /// Replace the failed node at `ordinal` of `datacenter`.
    async fn node_replace(
        &self,
        ctx: &Context,
        cluster: &ClusterRef,
        datacenter: &str,
        ordinal: i32,
        options: ReplacementOptions,
        events: EventSink,
    ) -> Result<()>;
}

/// [`Dispatcher`] over any [`ClusterBackend`].
pub struct Client<B, C = TokioClock> {
    backend: B,
    clock: C,
}

impl<B: ClusterBackend> Client<B> {
    pub fn new(backend: B) -> Self {
        Self::with_clock(backend, TokioClock)
    }
}

impl<B: ClusterBackend, C: Clock> Client<B, C> {
    /// Client whose polling loops run on `clock`.
    pub fn with_clock(backend: B, clock: C) -> Self {
        Self { backend, clock }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: ClusterBackend, C: Clock> Dispatcher for Client<B, C> {
    async fn get_cluster(&self, ctx: &Context, cluster: &ClusterRef) -> Result<ScyllaCluster> {
        aggregate::fetch_cluster(&self.backend, ctx, cluster).await
    }

    async fn cluster_status(
        &self,
        ctx: &Context,
        cluster: &ClusterRef,
        events: EventSink,
    ) -> Result<ClusterStatusResult> {
        aggregate::cluster_status(&self.backend, ctx, cluster, events).await
    }

    async fn node_replace(
        &self,
        ctx: &Context,
        cluster: &ClusterRef,
        datacenter: &str,
        ordinal: i32,
        options: ReplacementOptions,
        events: EventSink,
    ) -> Result<()> {
        replace::node_replace(
            &self.backend,
            &self.clock,
            ctx,
            cluster,
            datacenter,
            ordinal,
            options,
            events,
        )
        .await
    }
}
