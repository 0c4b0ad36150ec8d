use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Get,
    Set,
    Create,
    Update,
    Delete,
    CompareAndSwap,
    CompareAndDelete,
    Expire,
    #[serde(other)]
    Unknown,
}

/// A key or directory as reported by the keys API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Absent on the root listing, which decodes as an empty key.
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub dir: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_index: u64,
    #[serde(default)]
    pub created_index: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
}

impl Node {
    /// Last path segment of the key.
    #[must_use]
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or("")
    }

    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.nodes
    }

    /// Searches this node and its descendants for an exact key.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&Node> {
        if self.key == key {
            return Some(self);
        }
        self.nodes.iter().find_map(|child| child.find(key))
    }

    /// All non-directory descendants, depth-first in listing order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }
}

fn collect_leaves<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
    if !node.dir {
        out.push(node);
        return;
    }
    for child in &node.nodes {
        collect_leaves(child, out);
    }
}

/// Cluster position reported in the `X-Etcd-Index`, `X-Raft-Index` and
/// `X-Raft-Term` response headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterIndex {
    pub etcd_index: Option<u64>,
    pub raft_index: Option<u64>,
    pub raft_term: Option<u64>,
}

impl ClusterIndex {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
        };
        Self {
            etcd_index: read("x-etcd-index"),
            raft_index: read("x-raft-index"),
            raft_term: read("x-raft-term"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdResponse {
    pub action: Action,
    pub node: Node,
    #[serde(default)]
    pub prev_node: Option<Node>,
    #[serde(skip)]
    pub index: ClusterIndex,
}

impl EtcdResponse {
    /// Value of the returned node, if it is a key.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.node.value.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    #[serde(default)]
    pub etcdserver: String,
    #[serde(default)]
    pub etcdcluster: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "peerURLs", default)]
    pub peer_urls: Vec<String>,
    #[serde(rename = "clientURLs", default)]
    pub client_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MemberList {
    #[serde(default)]
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    #[serde(deserialize_with = "bool_or_string")]
    pub health: bool,
}

impl HealthStatus {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.health
    }
}

// Older servers report `"true"`, newer ones a JSON boolean.
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => b,
        Raw::Text(s) => s.trim().eq_ignore_ascii_case("true"),
    })
}
