//! Names and labels shared with the Scylla operator.

use serde_json::json;

/// Label carrying the owning cluster's name on pods and services.
pub const CLUSTER_NAME_LABEL: &str = "scylla/cluster";

/// Label the operator watches on a member service to start a replacement.
pub const REPLACE_LABEL: &str = "scylla/replace";

/// Name of the database container in every member pod.
pub const SCYLLA_CONTAINER_NAME: &str = "scylla";

/// Command used to query a member's view of the cluster.
pub const NODETOOL_STATUS: [&str; 2] = ["nodetool", "status"];

/// Name of the StatefulSet backing one rack.
pub fn stateful_set_name(cluster: &str, datacenter: &str, rack: &str) -> String {
    format!("{}-{}-{}", cluster, datacenter, rack)
}

/// Name of the member at `ordinal` within a rack.
///
/// The member service and the member pod share this name.
pub fn member_name(cluster: &str, datacenter: &str, rack: &str, ordinal: u32) -> String {
    format!("{}-{}", stateful_set_name(cluster, datacenter, rack), ordinal)
}

/// Ordinal of `name` if it names a member of the given rack.
pub fn member_ordinal(cluster: &str, datacenter: &str, rack: &str, name: &str) -> Option<u32> {
    let suffix = name
        .strip_prefix(&stateful_set_name(cluster, datacenter, rack))?
        .strip_prefix('-')?;
    let ordinal: u32 = suffix.parse().ok()?;
    (ordinal.to_string() == suffix).then_some(ordinal)
}

/// Label selector matching every pod and service of a cluster.
pub fn cluster_selector(cluster: &str) -> String {
    format!("{}={}", CLUSTER_NAME_LABEL, cluster)
}

/// Merge patch that sets the replace label and leaves other metadata untouched.
pub fn replace_label_patch() -> serde_json::Value {
    json!({
        "metadata": {
            "labels": {
                REPLACE_LABEL: ""
            }
        }
    })
}
