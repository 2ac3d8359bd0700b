//! Client-side view of the ScyllaCluster custom resource.
//!
//! Only the fields scyllactl reads are modelled; everything else in the
//! operator's schema is ignored on deserialization.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ScyllaCluster is a ScyllaDB cluster managed by the Scylla operator.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "scylla.scylladb.com",
    version = "v1",
    kind = "ScyllaCluster",
    plural = "scyllaclusters",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ScyllaClusterSpec {
    /// ScyllaDB version
    #[serde(default)]
    pub version: String,

    /// Scylla Manager agent version
    #[serde(default)]
    pub agent_version: Option<String>,

    /// Datacenter the cluster runs in
    pub datacenter: DatacenterSpec,
}

/// Datacenter definition
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterSpec {
    /// Datacenter name
    pub name: String,

    /// Racks in declaration order
    #[serde(default)]
    pub racks: Vec<RackSpec>,
}

/// Rack definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RackSpec {
    /// Rack name
    pub name: String,

    /// Number of members in the rack
    #[serde(default)]
    pub members: i32,
}

impl RackSpec {
    /// Create a rack with the given member capacity.
    pub fn new(name: impl Into<String>, members: i32) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    /// Member capacity, with negative declarations counted as empty.
    pub fn capacity(&self) -> u32 {
        self.members.max(0) as u32
    }
}

impl ScyllaCluster {
    /// Name of the cluster's datacenter.
    pub fn datacenter_name(&self) -> &str {
        &self.spec.datacenter.name
    }

    /// Racks of the cluster's datacenter.
    pub fn racks(&self) -> &[RackSpec] {
        &self.spec.datacenter.racks
    }
}
