//! Node replacement orchestration.
//!
//! A replacement moves through a fixed sequence of [`ReplacePhase`]s and never
//! goes back:
//!
//! 1. resolve the flat ordinal to a rack member,
//! 2. check that the cluster does not report the member as up,
//! 3. label the member service so the operator starts the replacement,
//! 4. wait for the old pod to go away,
//! 5. wait for the new pod to become ready,
//! 6. wait for the cluster to report the member Up and Normal.
//!
//! Phases 4 to 6 share one deadline derived from
//! [`ReplacementOptions::timeout`].

use std::fmt;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregate::{self, Members};
use crate::backend::ClusterBackend;
use crate::context::Context;
use crate::crd::ScyllaCluster;
use crate::dispatcher::ClusterRef;
use crate::error::{CtlError, ResourceKind, Result};
use crate::events::{EventPayload, EventSink};
use crate::naming::{self, SCYLLA_CONTAINER_NAME};
use crate::ordinal;
use crate::poll::{Clock, Poller};
use crate::status::{NodeRecord, NodeStatus};

/// Default delay between two convergence samples.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default time allowed for the pod and the cluster to converge.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Tuning for one replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplacementOptions {
    /// Delay between two convergence samples
    #[serde(with = "crate::config::humantime_serde")]
    pub poll_interval: Duration,

    /// Deadline for the convergence phases, counted from the trigger
    #[serde(with = "crate::config::humantime_serde")]
    pub timeout: Duration,
}

impl Default for ReplacementOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ReplacementOptions {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(CtlError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.timeout <= self.poll_interval {
            return Err(CtlError::Config(format!(
                "timeout ({:?}) must be greater than poll interval ({:?})",
                self.timeout, self.poll_interval
            )));
        }
        Ok(())
    }
}

/// Steps of a replacement, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacePhase {
    Resolve,
    Precondition,
    Trigger,
    PodTeardown,
    PodReady,
    ClusterAgreement,
}

impl fmt::Display for ReplacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacePhase::Resolve => write!(f, "target resolution"),
            ReplacePhase::Precondition => write!(f, "precondition check"),
            ReplacePhase::Trigger => write!(f, "replacement trigger"),
            ReplacePhase::PodTeardown => write!(f, "old pod teardown"),
            ReplacePhase::PodReady => write!(f, "new pod readiness"),
            ReplacePhase::ClusterAgreement => write!(f, "cluster agreement"),
        }
    }
}

/// The member a replacement acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplacementTarget {
    pub cluster: ClusterRef,
    pub datacenter: String,
    pub rack: String,
    /// Ordinal within the rack
    pub ordinal: u32,
    /// Ordinal across the datacenter, as requested
    pub flat_ordinal: i32,
    /// Name shared by the member service and pod
    pub member: String,
}

/// Outcome of a successful precondition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The cluster reports the member as down.
    ConfirmedDown,
    /// The cluster does not know the member; it is presumed removed.
    Absent,
}

/// Decide whether a member may be replaced given one status snapshot.
///
/// A member that is not reported at all is treated like a down one.
pub fn check_precondition(records: &[NodeRecord], rack: &str, ordinal: u32) -> Result<Precondition> {
    match records.iter().find(|r| r.is_at(rack, ordinal)) {
        None => Ok(Precondition::Absent),
        Some(record) if record.status == NodeStatus::Down => Ok(Precondition::ConfirmedDown),
        Some(record) => Err(CtlError::PreconditionNotMet(format!(
            "node {} in rack {} at ordinal {} is {}/{}, not Down",
            record.address, rack, ordinal, record.status, record.state
        ))),
    }
}

/// How far a pod is from serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// The pod is not in the Running phase yet.
    NotRunning(String),
    /// The pod runs but the database container is not ready.
    ContainerNotReady,
}

/// Readiness of a member pod, judged on its database container.
pub fn pod_readiness(pod: &Pod) -> Readiness {
    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    if phase != "Running" {
        return Readiness::NotRunning(phase);
    }

    let ready = status
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.iter().find(|c| c.name == SCYLLA_CONTAINER_NAME))
        .is_some_and(|c| c.ready);
    if ready {
        Readiness::Ready
    } else {
        Readiness::ContainerNotReady
    }
}

enum PodObservation {
    Absent,
    Present(Box<Pod>),
    /// The lookup failed transiently.
    Unknown,
}

/// Replace the member at flat `ordinal` of `datacenter`.
///
/// Emits a Completion event on success. Any failure is reported as an Error
/// event naming the phase it happened in before it is returned.
#[allow(clippy::too_many_arguments)]
pub async fn node_replace<B, C>(
    backend: &B,
    clock: &C,
    ctx: &Context,
    cluster: &ClusterRef,
    datacenter: &str,
    ordinal: i32,
    options: ReplacementOptions,
    events: EventSink,
) -> Result<()>
where
    B: ClusterBackend + ?Sized,
    C: Clock + ?Sized,
{
    info!(
        cluster = %cluster,
        datacenter,
        ordinal,
        "Starting node replacement"
    );
    let events = events.bound_to(ctx);

    let mut replacement = NodeReplacement {
        backend,
        clock,
        ctx,
        cluster,
        options,
        events: &events,
        phase: ReplacePhase::Resolve,
        target: None,
    };

    match replacement.execute(datacenter, ordinal).await {
        Ok(()) => {
            info!(cluster = %cluster, datacenter, ordinal, "Node replacement completed");
            events
                .completion("Node replacement completed successfully", None)
                .await;
            Ok(())
        }
        Err(e) => {
            warn!(
                cluster = %cluster,
                phase = %replacement.phase,
                error = %e,
                "Node replacement failed"
            );
            events
                .error(
                    format!("Node replacement failed during {}", replacement.phase),
                    &e,
                )
                .await;
            Err(e)
        }
    }
}

struct NodeReplacement<'a, B: ?Sized, C: ?Sized> {
    backend: &'a B,
    clock: &'a C,
    ctx: &'a Context,
    cluster: &'a ClusterRef,
    options: ReplacementOptions,
    events: &'a EventSink,
    phase: ReplacePhase,
    target: Option<ReplacementTarget>,
}

impl<'a, B, C> NodeReplacement<'a, B, C>
where
    B: ClusterBackend + ?Sized,
    C: Clock + ?Sized,
{
    async fn execute(&mut self, datacenter: &str, flat_ordinal: i32) -> Result<()> {
        self.events
            .progress("Starting node replacement procedure")
            .await;
        self.enter(ReplacePhase::Resolve).await;
        self.options.validate()?;
        let (sc, target) = self.resolve(datacenter, flat_ordinal).await?;
        self.target = Some(target.clone());

        self.enter(ReplacePhase::Precondition).await;
        self.verify_node_is_down(&sc, &target).await?;

        // Remember which pod incarnation is being replaced.
        let old_uid = self
            .ctx
            .run(self.backend.get_pod(&self.cluster.namespace, &target.member))
            .await?
            .and_then(|pod| pod.uid());

        self.enter(ReplacePhase::Trigger).await;
        self.trigger(&target).await?;

        let deadline = self.clock.now() + self.options.timeout;

        self.enter(ReplacePhase::PodTeardown).await;
        self.wait_for_teardown(&target, old_uid.as_deref(), deadline)
            .await?;

        self.enter(ReplacePhase::PodReady).await;
        self.wait_for_ready(&target, deadline).await?;

        self.enter(ReplacePhase::ClusterAgreement).await;
        self.wait_for_agreement(&sc, &target, deadline).await
    }

    async fn enter(&mut self, phase: ReplacePhase) {
        self.phase = phase;
        debug!(phase = %phase, "Entering replacement phase");
        self.events
            .status(
                format!("Entering {}", phase),
                EventPayload::Phase {
                    phase,
                    target: self.target.clone(),
                },
            )
            .await;
    }

    async fn resolve(
        &self,
        datacenter: &str,
        flat_ordinal: i32,
    ) -> Result<(ScyllaCluster, ReplacementTarget)> {
        self.events
            .progress("Retrieving ScyllaCluster resource")
            .await;
        let sc = aggregate::fetch_cluster(self.backend, self.ctx, self.cluster).await?;

        if sc.datacenter_name() != datacenter {
            return Err(CtlError::InvalidDatacenter {
                requested: datacenter.to_string(),
                expected: sc.datacenter_name().to_string(),
            });
        }

        self.events
            .progress(format!("Looking for node at ordinal {}", flat_ordinal))
            .await;
        let slot = ordinal::resolve(flat_ordinal, sc.racks())?;
        self.events
            .progress(format!(
                "Target node is in rack {} with ordinal {}",
                slot.rack.name, slot.ordinal
            ))
            .await;

        let target = ReplacementTarget {
            cluster: self.cluster.clone(),
            datacenter: datacenter.to_string(),
            rack: slot.rack.name.clone(),
            ordinal: slot.ordinal,
            flat_ordinal,
            member: naming::member_name(&self.cluster.name, datacenter, &slot.rack.name, slot.ordinal),
        };
        Ok((sc, target))
    }

    async fn verify_node_is_down(&self, sc: &ScyllaCluster, target: &ReplacementTarget) -> Result<()> {
        self.events.progress("Verifying node status").await;
        let records = self.first_member_view(sc).await?;

        match check_precondition(&records, &target.rack, target.ordinal)? {
            Precondition::ConfirmedDown => {
                self.events.progress("Node confirmed as Down").await;
            }
            Precondition::Absent => {
                warn!(member = %target.member, "Node not reported by cluster, presuming it was removed");
                self.events
                    .progress("Node not found in cluster status, presuming it was already removed")
                    .await;
            }
        }
        Ok(())
    }

    /// Status as seen by the first running member.
    async fn first_member_view(&self, sc: &ScyllaCluster) -> Result<Vec<NodeRecord>> {
        let Members { running, directory } =
            aggregate::discover_members(self.backend, self.ctx, sc).await?;
        let pod = running.first().ok_or_else(|| {
            CtlError::not_found(
                ResourceKind::Pod,
                format!("running member of {}", self.cluster),
            )
        })?;
        aggregate::query_pod(self.backend, self.ctx, sc, &directory, pod).await
    }

    async fn trigger(&self, target: &ReplacementTarget) -> Result<()> {
        let namespace = &self.cluster.namespace;

        self.events.progress("Locating member service").await;
        let service = self
            .ctx
            .run(self.backend.get_service(namespace, &target.member))
            .await?
            .ok_or_else(|| {
                CtlError::not_found(
                    ResourceKind::Service,
                    format!("{}/{}", namespace, target.member),
                )
            })?;
        let service_name = service.name_any();
        self.events
            .progress(format!("Found member service: {}", service_name))
            .await;

        self.events
            .progress("Applying replace label to service")
            .await;
        self.ctx
            .run(
                self.backend
                    .patch_service(namespace, &service_name, &naming::replace_label_patch()),
            )
            .await?;
        info!(service = %service_name, "Replace label applied");
        self.events
            .progress("Replace label applied successfully")
            .await;
        Ok(())
    }

    async fn observe_pod(&self, name: &str) -> Result<PodObservation> {
        let lookup = self
            .ctx
            .run(self.backend.get_pod(&self.cluster.namespace, name))
            .await;
        Ok(match tolerate(lookup, "pod lookup")? {
            Some(Some(pod)) => PodObservation::Present(Box::new(pod)),
            Some(None) => PodObservation::Absent,
            None => PodObservation::Unknown,
        })
    }

    async fn wait_for_teardown(
        &self,
        target: &ReplacementTarget,
        old_uid: Option<&str>,
        deadline: std::time::Instant,
    ) -> Result<()> {
        self.events
            .progress(format!("Waiting for old pod {} to be deleted", target.member))
            .await;

        let mut poller = Poller::new(
            self.clock,
            self.ctx,
            self.options.poll_interval,
            deadline,
            format!("old pod {} to be deleted", target.member),
        );
        loop {
            poller.tick().await?;
            match self.observe_pod(&target.member).await? {
                PodObservation::Absent => break,
                PodObservation::Present(pod) => {
                    let uid = pod.uid();
                    if old_uid.is_none() || uid.as_deref() != old_uid {
                        debug!(pod = %target.member, "Pod was recreated between samples");
                        break;
                    }
                }
                PodObservation::Unknown => {}
            }
        }

        self.events
            .progress("Old pod deleted, waiting for new pod to be created")
            .await;
        Ok(())
    }

    async fn wait_for_ready(&self, target: &ReplacementTarget, deadline: std::time::Instant) -> Result<()> {
        let mut poller = Poller::new(
            self.clock,
            self.ctx,
            self.options.poll_interval,
            deadline,
            format!("new pod {} to be ready", target.member),
        );
        loop {
            poller.tick().await?;
            let pod = match self.observe_pod(&target.member).await? {
                PodObservation::Present(pod) => pod,
                PodObservation::Absent | PodObservation::Unknown => continue,
            };

            match pod_readiness(&pod) {
                Readiness::Ready => break,
                Readiness::NotRunning(phase) => {
                    self.events
                        .progress(format!("Pod status: {}", phase))
                        .await;
                }
                Readiness::ContainerNotReady => {
                    self.events
                        .progress("Pod running but scylla container not ready yet")
                        .await;
                }
            }
        }

        self.events
            .progress("New pod is running, verifying node status")
            .await;
        Ok(())
    }

    async fn wait_for_agreement(
        &self,
        sc: &ScyllaCluster,
        target: &ReplacementTarget,
        deadline: std::time::Instant,
    ) -> Result<()> {
        let mut poller = Poller::new(
            self.clock,
            self.ctx,
            self.options.poll_interval,
            deadline,
            format!("node {} to become Up/Normal", target.member),
        );
        loop {
            poller.tick().await?;
            let view = self.first_member_view(sc).await;
            let Some(records) = tolerate(view, "cluster status query")? else {
                continue;
            };

            let Some(record) = records
                .iter()
                .find(|r| r.is_at(&target.rack, target.ordinal))
            else {
                continue;
            };

            if record.is_up_normal() {
                self.events.progress("Node is Up and Normal").await;
                return Ok(());
            }
            self.events
                .progress(format!("Node status: {}/{}", record.status, record.state))
                .await;
        }
    }
}

/// Treat a transient failed sample as "not yet". Anything else aborts the poll.
fn tolerate<T>(result: Result<T>, what: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_retryable() => {
            warn!(error = %e, "Transient failure during {}, retrying", what);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
