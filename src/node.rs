use serde::{Deserialize, Serialize};

use crate::resources::{NetworkResource, NodeNetworkResource};

/// Externally-supplied node description the index is initialized from.
/// `node_resources`/`reserved_resources` are the current layout; `resources`
/// and `reserved` are the legacy one still reported by old clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub node_resources: Option<NodeResources>,
    pub reserved_resources: Option<NodeReservedResources>,
    pub resources: Option<Resources>,
    pub reserved: Option<Resources>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResources {
    pub networks: Vec<NetworkResource>,
    pub node_networks: Vec<NodeNetworkResource>,
    // Zero means "use the default bound".
    pub min_dynamic_port: u16,
    pub max_dynamic_port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReservedResources {
    pub networks: NodeReservedNetworkResources,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReservedNetworkResources {
    /// Range string of host ports reserved on every address, e.g. `"22,8000-8099"`.
    pub reserved_host_ports: String,
}

/// Legacy resource layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub networks: Vec<NetworkResource>,
}
