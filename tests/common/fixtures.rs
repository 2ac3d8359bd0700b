// Test fixtures for ScyllaCluster scenarios
// Builds cluster definitions, member pods and services, and nodetool reports

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerStatus, Pod, PodSpec, PodStatus, Service, ServiceSpec,
};
use kube::api::ObjectMeta;

use scyllactl::crd::{DatacenterSpec, RackSpec, ScyllaCluster, ScyllaClusterSpec};
use scyllactl::naming::{self, CLUSTER_NAME_LABEL, SCYLLA_CONTAINER_NAME};

use super::cluster_sim::FakeBackend;

pub const NAMESPACE: &str = "scylla";
pub const CLUSTER: &str = "simple-cluster";
pub const DATACENTER: &str = "us-east-1";

/// One member of a simulated cluster.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub rack: String,
    pub ordinal: u32,
    /// Cluster IP of the member service, which is what nodetool reports
    pub address: String,
    pub pod_ip: String,
    pub host_id: String,
}

/// A cluster definition plus its members, loaded into a [`FakeBackend`].
pub struct SimulatedCluster {
    pub backend: FakeBackend,
    pub sc: ScyllaCluster,
    /// Members in flat ordinal order
    pub members: Vec<Member>,
}

impl SimulatedCluster {
    pub fn member(&self, flat_ordinal: usize) -> &Member {
        &self.members[flat_ordinal]
    }

    /// A `nodetool status` report listing every member, with `overrides`
    /// replacing the two-letter code of some members and `None` leaving a
    /// member out of the report.
    pub fn report(&self, overrides: &[(usize, Option<&str>)]) -> String {
        let mut lines = Vec::new();
        for (flat, member) in self.members.iter().enumerate() {
            let code = overrides
                .iter()
                .find(|(i, _)| *i == flat)
                .map_or(Some("UN"), |(_, code)| *code);
            if let Some(code) = code {
                lines.push((code, member));
            }
        }
        nodetool_report(DATACENTER, &lines)
    }

    /// Report where every member is Up/Normal.
    pub fn healthy_report(&self) -> String {
        self.report(&[])
    }
}

/// Builder for simulated clusters.
pub struct ClusterBuilder {
    name: String,
    namespace: String,
    datacenter: String,
    racks: Vec<RackSpec>,
    member_pods: bool,
}

impl ClusterBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: NAMESPACE.to_string(),
            datacenter: DATACENTER.to_string(),
            racks: Vec::new(),
            member_pods: true,
        }
    }

    pub fn rack(mut self, name: &str, members: i32) -> Self {
        self.racks.push(RackSpec::new(name, members));
        self
    }

    /// Skip creating running pods for the members.
    pub fn without_pods(mut self) -> Self {
        self.member_pods = false;
        self
    }

    pub fn build(self) -> SimulatedCluster {
        let backend = FakeBackend::new();
        let sc = scylla_cluster(&self.name, &self.namespace, &self.datacenter, self.racks.clone());
        backend.insert_cluster(sc.clone());

        let mut members = Vec::new();
        for rack in &self.racks {
            for ordinal in 0..rack.capacity() {
                let flat = members.len() + 1;
                let member = Member {
                    name: naming::member_name(&self.name, &self.datacenter, &rack.name, ordinal),
                    rack: rack.name.clone(),
                    ordinal,
                    address: format!("10.96.0.{}", flat),
                    pod_ip: format!("192.168.0.{}", flat),
                    host_id: format!("{:08x}-0000-4000-8000-{:012x}", flat, flat),
                };

                backend.add_service(member_service(
                    &self.name,
                    &self.namespace,
                    &member.name,
                    &member.address,
                ));
                if self.member_pods {
                    backend.add_pod(member_pod(
                        &self.name,
                        &self.namespace,
                        &member.name,
                        &member.pod_ip,
                        "Running",
                        true,
                        &format!("uid-{}-0", member.name),
                    ));
                }
                members.push(member);
            }
        }

        SimulatedCluster {
            backend,
            sc,
            members,
        }
    }
}

/// The three-member cluster most scenarios use: rack `us-east-1a` with two
/// members and rack `us-east-1b` with one.
pub fn three_node_cluster() -> SimulatedCluster {
    ClusterBuilder::new(CLUSTER)
        .rack("us-east-1a", 2)
        .rack("us-east-1b", 1)
        .build()
}

pub fn scylla_cluster(name: &str, namespace: &str, datacenter: &str, racks: Vec<RackSpec>) -> ScyllaCluster {
    let mut sc = ScyllaCluster::new(
        name,
        ScyllaClusterSpec {
            version: "5.4.0".to_string(),
            agent_version: None,
            datacenter: DatacenterSpec {
                name: datacenter.to_string(),
                racks,
            },
        },
    );
    sc.metadata.namespace = Some(namespace.to_string());
    sc
}

fn cluster_labels(cluster: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), cluster.to_string())])
}

pub fn member_service(cluster: &str, namespace: &str, name: &str, cluster_ip: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(cluster_labels(cluster)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some(cluster_ip.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn member_pod(
    cluster: &str,
    namespace: &str,
    name: &str,
    pod_ip: &str,
    phase: &str,
    ready: bool,
    uid: &str,
) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(uid.to_string()),
            labels: Some(cluster_labels(cluster)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: SCYLLA_CONTAINER_NAME.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            pod_ip: Some(pod_ip.to_string()),
            container_statuses: Some(vec![ContainerStatus {
                name: SCYLLA_CONTAINER_NAME.to_string(),
                ready,
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// Incarnation of a member pod, for scripted lookups.
pub fn pod_incarnation(member: &Member, phase: &str, ready: bool, generation: u32) -> Pod {
    member_pod(
        CLUSTER,
        NAMESPACE,
        &member.name,
        &member.pod_ip,
        phase,
        ready,
        &format!("uid-{}-{}", member.name, generation),
    )
}

/// Render a `nodetool status` report.
pub fn nodetool_report(datacenter: &str, nodes: &[(&str, &Member)]) -> String {
    let mut out = format!(
        "Datacenter: {}\n{}\nStatus=Up/Down\n|/ State=Normal/Leaving/Joining/Moving\n\
         --  Address      Load       Tokens  Owns  Host ID                               Rack\n",
        datacenter,
        "=".repeat(12 + datacenter.len()),
    );
    for (code, member) in nodes {
        out.push_str(&format!(
            "{}  {:<11}  254.07 KB  256     ?     {}  {}\n",
            code, member.address, member.host_id, member.rack
        ));
    }
    out
}
