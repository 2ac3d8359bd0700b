//! Node status records and the `nodetool status` parser.
//!
//! Parsing is a pure text-to-records transformation. It knows nothing about
//! pods or exec transports; everything it cannot read from the text itself
//! (which member a line belongs to) comes in through a [`PodContext`].

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// `<status><state>  <address>  <load>  <tokens>  <owns>  <host-id>  <rack>`
    ///
    /// Load is one or two tokens wide ("120 KB" or "120KB").
    static ref NODE_LINE: Regex =
        Regex::new(r"^([UD])(\S?)\s+(\S+)\s+(\S+\s*\S*)\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)")
            .expect("node line pattern is valid");
}

/// Up/down status as gossiped by the queried member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    Up,
    Down,
}

impl NodeStatus {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "U" => Some(NodeStatus::Up),
            "D" => Some(NodeStatus::Down),
            _ => None,
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Up => write!(f, "Up"),
            NodeStatus::Down => write!(f, "Down"),
        }
    }
}

/// Ring membership state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeState {
    #[default]
    Normal,
    Joining,
    Leaving,
    Moving,
}

impl NodeState {
    /// Unrecognized or missing codes read as `Normal`.
    fn from_code(code: &str) -> Self {
        match code {
            "L" => NodeState::Leaving,
            "J" => NodeState::Joining,
            "M" => NodeState::Moving,
            _ => NodeState::Normal,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Normal => write!(f, "Normal"),
            NodeState::Joining => write!(f, "Joining"),
            NodeState::Leaving => write!(f, "Leaving"),
            NodeState::Moving => write!(f, "Moving"),
        }
    }
}

/// A member's ordinal within its rack, when it could be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ordinal {
    Known(u32),
    #[default]
    Unknown,
}

impl Ordinal {
    pub fn known(self) -> Option<u32> {
        match self {
            Ordinal::Known(n) => Some(n),
            Ordinal::Unknown => None,
        }
    }
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ordinal::Known(n) => write!(f, "{}", n),
            Ordinal::Unknown => write!(f, "-"),
        }
    }
}

/// One node as seen by one member at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub datacenter: String,
    pub rack: String,
    pub ordinal: Ordinal,
    /// Position across the datacenter, the number `node replace` takes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat_ordinal: Option<u32>,
    pub pod_name: Option<String>,
    pub status: NodeStatus,
    pub state: NodeState,
    pub address: String,
    pub host_id: String,
    pub load: String,
    pub tokens: String,
    pub owns: String,
}

impl NodeRecord {
    /// Whether the record sits at the given rack address.
    pub fn is_at(&self, rack: &str, ordinal: u32) -> bool {
        self.rack == rack && self.ordinal == Ordinal::Known(ordinal)
    }

    /// Whether the node is fully serving.
    pub fn is_up_normal(&self) -> bool {
        self.status == NodeStatus::Up && self.state == NodeState::Normal
    }

    /// Token ownership as a fraction in `[0, 1]`, if the member reported one.
    ///
    /// Members report `?` when no keyspace is given to nodetool.
    pub fn ownership_fraction(&self) -> Option<f64> {
        let percent = self.owns.strip_suffix('%')?.trim().parse::<f64>().ok()?;
        Some(percent / 100.0)
    }
}

/// A cluster member a record can be attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberIdentity {
    /// Member name, shared by its pod and its member service
    pub name: String,
    pub rack: String,
    /// Ordinal within the rack
    pub ordinal: u32,
    /// Ordinal across the datacenter
    pub flat_ordinal: u32,
}

/// What the caller knows about the member being queried and its peers.
#[derive(Debug, Clone, Default)]
pub struct PodContext {
    pod_name: Option<String>,
    members: HashMap<String, MemberIdentity>,
}

impl PodContext {
    /// Context for a report taken from `pod_name`.
    pub fn new(pod_name: impl Into<String>) -> Self {
        Self {
            pod_name: Some(pod_name.into()),
            members: HashMap::new(),
        }
    }

    /// Register the member reachable at `address`.
    pub fn with_member(mut self, address: impl Into<String>, member: MemberIdentity) -> Self {
        self.add_member(address, member);
        self
    }

    pub fn add_member(&mut self, address: impl Into<String>, member: MemberIdentity) {
        self.members.insert(address.into(), member);
    }

    /// Same member knowledge, attributed to a report from `pod_name`.
    pub fn for_pod(&self, pod_name: impl Into<String>) -> Self {
        Self {
            pod_name: Some(pod_name.into()),
            members: self.members.clone(),
        }
    }

    /// Pod the report was taken from.
    pub fn pod_name(&self) -> Option<&str> {
        self.pod_name.as_deref()
    }

    pub fn member(&self, address: &str) -> Option<&MemberIdentity> {
        self.members.get(address)
    }
}

/// Point-in-time status of a whole cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatusResult {
    pub cluster_name: String,
    pub nodes: Vec<NodeRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub divergences: Vec<Divergence>,
}

impl ClusterStatusResult {
    /// Whether every queried member reported the same view.
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }

    /// Records for the member at a rack address.
    pub fn nodes_at<'a>(&'a self, rack: &'a str, ordinal: u32) -> impl Iterator<Item = &'a NodeRecord> {
        self.nodes.iter().filter(move |n| n.is_at(rack, ordinal))
    }
}

/// Two members reported different views of the same node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Divergence {
    /// Pod whose report disagreed with an earlier one
    pub reported_by: String,
    pub existing: NodeRecord,
    pub conflicting: NodeRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MemberKey {
    Ordinal(String, String, u32),
    Address(String, String, String),
}

impl MemberKey {
    fn of(record: &NodeRecord) -> Self {
        match record.ordinal {
            Ordinal::Known(n) => MemberKey::Ordinal(record.datacenter.clone(), record.rack.clone(), n),
            Ordinal::Unknown => MemberKey::Address(
                record.datacenter.clone(),
                record.rack.clone(),
                record.address.clone(),
            ),
        }
    }
}

/// Merges per-member reports into one snapshot.
///
/// Identical observations of a node collapse into one record. Observations
/// that disagree on status, state, address or host ID are all kept and the
/// disagreement is recorded as a [`Divergence`].
#[derive(Debug, Default)]
pub struct StatusMerger {
    nodes: Vec<NodeRecord>,
    index: HashMap<MemberKey, Vec<usize>>,
    divergences: Vec<Divergence>,
}

impl StatusMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one member's report, returning the divergences it introduced.
    pub fn add(&mut self, reported_by: &str, records: Vec<NodeRecord>) -> Vec<Divergence> {
        let mut introduced = Vec::new();

        for record in records {
            let slots = self.index.entry(MemberKey::of(&record)).or_default();
            if slots.iter().any(|&i| same_observation(&self.nodes[i], &record)) {
                continue;
            }

            if let Some(&first) = slots.first() {
                introduced.push(Divergence {
                    reported_by: reported_by.to_string(),
                    existing: self.nodes[first].clone(),
                    conflicting: record.clone(),
                });
            }
            slots.push(self.nodes.len());
            self.nodes.push(record);
        }

        self.divergences.extend(introduced.iter().cloned());
        introduced
    }

    pub fn finish(self, cluster_name: impl Into<String>) -> ClusterStatusResult {
        ClusterStatusResult {
            cluster_name: cluster_name.into(),
            nodes: self.nodes,
            divergences: self.divergences,
        }
    }
}

fn same_observation(a: &NodeRecord, b: &NodeRecord) -> bool {
    a.status == b.status && a.state == b.state && a.address == b.address && a.host_id == b.host_id
}

/// Parse a `nodetool status` report into node records.
///
/// Lines that are not node lines (headers, legends, blank lines, noise) are
/// skipped. The rack comes from the report itself; the ordinal and owning pod
/// come from `ctx` and stay unknown for addresses it does not know.
pub fn parse_nodetool_status(output: &str, datacenter: &str, ctx: &PodContext) -> Vec<NodeRecord> {
    output
        .lines()
        .filter_map(|line| parse_node_line(line.trim(), datacenter, ctx))
        .collect()
}

fn parse_node_line(line: &str, datacenter: &str, ctx: &PodContext) -> Option<NodeRecord> {
    let caps = NODE_LINE.captures(line)?;
    let status = NodeStatus::from_code(&caps[1])?;
    let address = caps[3].to_string();
    let member = ctx.member(&address);

    Some(NodeRecord {
        datacenter: datacenter.to_string(),
        rack: caps[8].to_string(),
        ordinal: member.map_or(Ordinal::Unknown, |m| Ordinal::Known(m.ordinal)),
        flat_ordinal: member.map(|m| m.flat_ordinal),
        pod_name: member.map(|m| m.name.clone()),
        status,
        state: NodeState::from_code(&caps[2]),
        address,
        load: caps[4].to_string(),
        tokens: caps[5].to_string(),
        owns: caps[6].to_string(),
        host_id: caps[7].to_string(),
    })
}
