//! Cluster-wide status aggregation.
//!
//! Every running member is asked for its own view of the ring with
//! `nodetool status`, one pod after the other, and the views are merged into a
//! single [`ClusterStatusResult`]. A member that cannot be queried is reported
//! and skipped; only failing to read the cluster itself aborts the call.

use k8s_openapi::api::core::v1::{Pod, Service};
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::backend::ClusterBackend;
use crate::context::Context;
use crate::crd::{RackSpec, ScyllaCluster};
use crate::dispatcher::ClusterRef;
use crate::error::{CtlError, ResourceKind, Result};
use crate::events::{EventPayload, EventSink};
use crate::naming::{self, NODETOOL_STATUS, SCYLLA_CONTAINER_NAME};
use crate::ordinal;
use crate::status::{
    parse_nodetool_status, ClusterStatusResult, MemberIdentity, NodeRecord, PodContext,
    StatusMerger,
};

/// Fetch a cluster definition, failing when it does not exist.
pub(crate) async fn fetch_cluster<B>(
    backend: &B,
    ctx: &Context,
    cluster: &ClusterRef,
) -> Result<ScyllaCluster>
where
    B: ClusterBackend + ?Sized,
{
    ctx.run(backend.get_cluster(&cluster.namespace, &cluster.name))
        .await?
        .ok_or_else(|| CtlError::not_found(ResourceKind::ScyllaCluster, cluster.to_string()))
}

/// Running members of a cluster and the address book used to attribute
/// status lines to them.
pub(crate) struct Members {
    pub running: Vec<Pod>,
    pub directory: PodContext,
}

/// List the cluster's pods and member services.
pub(crate) async fn discover_members<B>(
    backend: &B,
    ctx: &Context,
    sc: &ScyllaCluster,
) -> Result<Members>
where
    B: ClusterBackend + ?Sized,
{
    let namespace = sc.namespace().unwrap_or_default();
    let selector = naming::cluster_selector(&sc.name_any());

    let pods = ctx.run(backend.list_pods(&namespace, &selector)).await?;
    let services = ctx.run(backend.list_services(&namespace, &selector)).await?;

    let directory = member_directory(sc, &pods, &services);
    let running: Vec<Pod> = pods.into_iter().filter(is_running_member).collect();

    debug!(
        cluster = %sc.name_any(),
        running = running.len(),
        "Discovered cluster members"
    );
    Ok(Members { running, directory })
}

/// Map every known member address to the member it belongs to.
///
/// Members are addressed by their service's cluster IP and by their pod IP,
/// so either broadcast mode is attributed correctly. Only listed objects are
/// considered, whatever member counts the racks declare.
pub(crate) fn member_directory(sc: &ScyllaCluster, pods: &[Pod], services: &[Service]) -> PodContext {
    let cluster = sc.name_any();
    let mut directory = PodContext::default();

    let service_ips = services.iter().filter_map(|s| {
        let ip = s.spec.as_ref()?.cluster_ip.clone()?;
        Some((s.name_any(), ip))
    });
    let pod_ips = pods.iter().filter_map(|p| {
        let ip = p.status.as_ref()?.pod_ip.clone()?;
        Some((p.name_any(), ip))
    });

    for (name, address) in service_ips.chain(pod_ips) {
        if address.is_empty() || address == "None" {
            continue;
        }
        if let Some(identity) = member_identity(&cluster, sc.datacenter_name(), sc.racks(), &name) {
            directory.add_member(address, identity);
        }
    }

    directory
}

/// Rack address of the member called `name`, if it is one.
fn member_identity(
    cluster: &str,
    datacenter: &str,
    racks: &[RackSpec],
    name: &str,
) -> Option<MemberIdentity> {
    racks.iter().find_map(|rack| {
        let ordinal = naming::member_ordinal(cluster, datacenter, &rack.name, name)?;
        let flat_ordinal = ordinal::flatten(&rack.name, ordinal, racks)?;
        Some(MemberIdentity {
            name: name.to_string(),
            rack: rack.name.clone(),
            ordinal,
            flat_ordinal,
        })
    })
}

fn is_running_member(pod: &Pod) -> bool {
    let has_scylla = pod
        .spec
        .as_ref()
        .is_some_and(|spec| spec.containers.iter().any(|c| c.name == SCYLLA_CONTAINER_NAME));
    let running = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        == Some("Running");
    has_scylla && running
}

/// Run `nodetool status` in one pod and parse its view of the cluster.
pub(crate) async fn query_pod<B>(
    backend: &B,
    ctx: &Context,
    sc: &ScyllaCluster,
    directory: &PodContext,
    pod: &Pod,
) -> Result<Vec<NodeRecord>>
where
    B: ClusterBackend + ?Sized,
{
    let name = pod.name_any();
    let namespace = pod.namespace().or_else(|| sc.namespace()).unwrap_or_default();

    let output = ctx
        .run(backend.exec(&namespace, &name, SCYLLA_CONTAINER_NAME, &NODETOOL_STATUS))
        .await?;

    let records = parse_nodetool_status(&output.stdout, sc.datacenter_name(), &directory.for_pod(&name));
    if records.is_empty() {
        return Err(CtlError::Parse(format!(
            "no node records in output from pod {}",
            name
        )));
    }

    debug!(pod = %name, nodes = records.len(), "Parsed nodetool status");
    Ok(records)
}

/// Aggregate the status of every running member of a cluster.
pub async fn cluster_status<B>(
    backend: &B,
    ctx: &Context,
    cluster: &ClusterRef,
    events: EventSink,
) -> Result<ClusterStatusResult>
where
    B: ClusterBackend + ?Sized,
{
    info!(cluster = %cluster, "Collecting cluster status");
    let events = events.bound_to(ctx);

    events.progress("Retrieving ScyllaCluster resource").await;
    let sc = match fetch_cluster(backend, ctx, cluster).await {
        Ok(sc) => sc,
        Err(e) => {
            events.error("Failed to get ScyllaCluster", &e).await;
            return Err(e);
        }
    };
    events
        .progress(format!(
            "Found cluster with datacenter: {}",
            sc.datacenter_name()
        ))
        .await;

    events.progress("Discovering cluster pods").await;
    let members = match discover_members(backend, ctx, &sc).await {
        Ok(members) => members,
        Err(e) => {
            events.error("Failed to discover cluster pods", &e).await;
            return Err(e);
        }
    };
    events
        .progress(format!("Found {} pods in cluster", members.running.len()))
        .await;

    let mut merger = StatusMerger::new();
    for pod in &members.running {
        let pod_name = pod.name_any();
        events
            .progress(format!("Querying status from pod {}", pod_name))
            .await;

        let records = match query_pod(backend, ctx, &sc, &members.directory, pod).await {
            Ok(records) => records,
            Err(e) if e.is_canceled() => {
                events.error("Cluster status collection canceled", &e).await;
                return Err(e);
            }
            Err(e) => {
                warn!(pod = %pod_name, error = %e, "Skipping pod");
                events
                    .error(format!("Failed to get status from pod {}", pod_name), &e)
                    .await;
                continue;
            }
        };

        for divergence in merger.add(&pod_name, records) {
            events
                .status(
                    format!(
                        "Pod {} disagrees about node {}: {}/{} vs {}/{}",
                        divergence.reported_by,
                        divergence.conflicting.address,
                        divergence.conflicting.status,
                        divergence.conflicting.state,
                        divergence.existing.status,
                        divergence.existing.state,
                    ),
                    EventPayload::Divergence(divergence),
                )
                .await;
        }
    }

    let result = merger.finish(&cluster.name);
    info!(
        cluster = %cluster,
        nodes = result.nodes.len(),
        consistent = result.is_consistent(),
        "Cluster status collected"
    );
    events
        .completion(
            format!("Retrieved status for {} nodes", result.nodes.len()),
            Some(EventPayload::ClusterStatus(result.clone())),
        )
        .await;

    Ok(result)
}
