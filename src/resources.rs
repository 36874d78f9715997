use serde::{Deserialize, Serialize};

/// A labeled port requirement. `value` is caller-chosen for reserved ports
/// and filled in by the scheduler for dynamic ones. `to` is the mapped
/// target port inside the workload; `-1` means "same as the host value".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub label: String,
    pub value: i32,
    pub to: i32,
    pub host_network: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    pub servers: Vec<String>,
    pub searches: Vec<String>,
    pub options: Vec<String>,
}

/// A task-level network ask or offer. Carries a concrete CIDR on the node
/// side and a concrete IP once resolved into an offer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkResource {
    pub mode: String,
    pub device: String,
    pub cidr: String,
    pub ip: String,
    pub mbits: u32,
    pub dns: Option<DnsConfig>,
    pub reserved_ports: Vec<Port>,
    pub dynamic_ports: Vec<Port>,
}

/// A node-level network interface exposing one or more addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeNetworkResource {
    pub mode: String,
    pub device: String,
    pub mac_address: String,
    pub speed: u32,
    pub addresses: Vec<NodeNetworkAddress>,
}

/// One address on a node network. Multiple addresses may share an alias,
/// for example IPv4 and IPv6 loopback both aliased `"local"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeNetworkAddress {
    pub family: String,
    pub alias: String,
    pub address: String,
    pub reserved_ports: String,
    pub gateway: String,
}
