use std::collections::HashMap;
use std::net::IpAddr;

use ipnet::IpNet;
use rand::Rng;
use thiserror::Error;

use crate::alloc::{AllocatedPortMapping, AllocatedPorts, Allocation};
use crate::bitmap::Bitmap;
use crate::node::{Node, NodeResources};
use crate::pool::PORT_BITMAP_POOL;
use crate::port_range::{parse_port_ranges, PortRangeParseError};
use crate::resources::{NetworkResource, NodeNetworkAddress, NodeNetworkResource, Port};
use crate::selector::{dynamic_ports_precise, dynamic_ports_stochastic, PortSelectionError};
use crate::{DEFAULT_MAX_DYNAMIC_PORT, DEFAULT_MIN_DYNAMIC_PORT, MAX_VALID_PORT};

/// Errors out of [`NetworkIndex::set_node`]. Any of these indicate data that
/// upstream validation should have rejected; callers treat them as fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeInitError {
    #[error("error parsing reserved_ports: {0}")]
    ReservedHostPorts(#[source] PortRangeParseError),
    #[error("error parsing reserved_ports for network {alias:?}: {source}")]
    HostNetworkReservedPorts {
        alias: String,
        source: PortRangeParseError,
    },
    #[error("invalid port {0} for reserved_ports")]
    InvalidReservedPort(i32),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssignError {
    #[error("invalid port {0} (out of range)")]
    InvalidPort(i32),
    #[error("reserved port collision {label}={value}")]
    ReservedPortCollision { label: String, value: i32 },
    #[error("no addresses available for {0} network")]
    NoAddresses(String),
    #[error("bandwidth exceeded")]
    BandwidthExceeded,
    #[error("no networks available")]
    NoNetworks,
    #[error(transparent)]
    Selection(#[from] PortSelectionError),
}

/// Indexes the available and used network resources of a single node for one
/// placement attempt.
///
/// `used_ports` tracks reserved ports per IP address. A node with port 22
/// reserved on a dual-stack loopback interface carries
/// `{"127.0.0.1": {22}, "::1": {22}}`. An absent entry means the empty set.
///
/// Lifecycle: construct, `set_node`, any number of `add_allocs` /
/// `assign_ports`, then `release`. Preemption clones the index and replays
/// `set_node`/`add_allocs` rounds against the clone, clearing `used_ports`
/// via `release` in between.
#[derive(Debug, Clone)]
pub struct NetworkIndex {
    pub task_networks: Vec<NetworkResource>,
    pub group_networks: Vec<NodeNetworkResource>,
    pub host_networks: HashMap<String, Vec<NodeNetworkAddress>>,
    pub used_ports: HashMap<String, Bitmap>,
    // Deprecated bandwidth accounting, carried but never enforced.
    pub avail_bandwidth: HashMap<String, u32>,
    pub used_bandwidth: HashMap<String, u32>,
    pub min_dynamic_port: u16,
    pub max_dynamic_port: u16,
}

impl Default for NetworkIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkIndex {
    pub fn new() -> Self {
        Self {
            task_networks: Vec::new(),
            group_networks: Vec::new(),
            host_networks: HashMap::new(),
            used_ports: HashMap::new(),
            avail_bandwidth: HashMap::new(),
            used_bandwidth: HashMap::new(),
            min_dynamic_port: DEFAULT_MIN_DYNAMIC_PORT,
            max_dynamic_port: DEFAULT_MAX_DYNAMIC_PORT,
        }
    }

    fn used_ports_for(&mut self, ip: &str) -> &mut Bitmap {
        self.used_ports
            .entry(ip.to_string())
            .or_insert_with(|| match PORT_BITMAP_POOL.get() {
                Some(mut bitmap) => {
                    bitmap.clear_all();
                    bitmap
                }
                None => Bitmap::new(MAX_VALID_PORT),
            })
    }

    /// Initializes the index from a node description: available addresses,
    /// reserved ports, and the dynamic port range.
    ///
    /// Idempotent with respect to `used_ports`: re-running it on the same
    /// node after `release` reproduces bit-equal bitmaps. Errors indicate
    /// node data that client validation should have refused.
    pub fn set_node(&mut self, node: &Node) -> Result<(), NodeInitError> {
        // Task networks only serve legacy task-level asks. Prefer the
        // current node resources, fall back to the legacy layout.
        let mut task_networks: &[NetworkResource] = &[];
        if let Some(node_resources) = &node.node_resources {
            if !node_resources.networks.is_empty() {
                task_networks = &node_resources.networks;
            }
        }
        if task_networks.is_empty() {
            if let Some(resources) = &node.resources {
                task_networks = &resources.networks;
            }
        }

        // Reserved ports merge downward: the node-global set applies to every
        // address, and per-address sets add on top.
        let mut global_reserved: Vec<u16> = Vec::new();

        let reserved_spec = node
            .reserved_resources
            .as_ref()
            .map(|reserved| reserved.networks.reserved_host_ports.as_str())
            .unwrap_or("");
        if !reserved_spec.is_empty() {
            global_reserved =
                parse_port_ranges(reserved_spec).map_err(NodeInitError::ReservedHostPorts)?;
        } else if let Some(reserved) = &node.reserved {
            // Old clients report reserved ports per network instead.
            for network in &reserved.networks {
                let used = self.used_ports_for(&network.ip);
                for port in network.reserved_ports.iter().chain(&network.dynamic_ports) {
                    if port.value > MAX_VALID_PORT as i32 || port.value < 0 {
                        return Err(NodeInitError::InvalidReservedPort(port.value));
                    }
                    global_reserved.push(port.value as u16);
                    used.set(port.value as usize);
                }
                if !network.device.is_empty() {
                    *self.used_bandwidth.entry(network.device.clone()).or_default() +=
                        network.mbits;
                }
            }
        }

        // Task networks without a device (e.g. bridge) cannot fulfill asks.
        for network in task_networks {
            if network.device.is_empty() {
                continue;
            }
            self.task_networks.push(network.clone());
            self.avail_bandwidth
                .insert(network.device.clone(), network.mbits);

            let used = self.used_ports_for(&network.ip);
            for &port in &global_reserved {
                used.set(usize::from(port));
            }
        }

        let node_networks: &[NodeNetworkResource] = node
            .node_resources
            .as_ref()
            .map(|resources| resources.node_networks.as_slice())
            .unwrap_or(&[]);

        for network in node_networks {
            for address in &network.addresses {
                // Index addresses by alias for asks with a named host network.
                self.host_networks
                    .entry(address.alias.clone())
                    .or_default()
                    .push(address.clone());

                let address_reserved = if address.reserved_ports.is_empty() {
                    Vec::new()
                } else {
                    parse_port_ranges(&address.reserved_ports).map_err(|source| {
                        NodeInitError::HostNetworkReservedPorts {
                            alias: address.alias.clone(),
                            source,
                        }
                    })?
                };

                // A bit may be set by both the global and the per-address
                // set; that overlap is expected and silent.
                let used = self.used_ports_for(&address.address);
                for &port in global_reserved.iter().chain(&address_reserved) {
                    used.set(usize::from(port));
                }
            }
        }
        self.group_networks.extend(node_networks.iter().cloned());

        if let Some(node_resources) = &node.node_resources {
            if node_resources.min_dynamic_port > 0 {
                self.min_dynamic_port = node_resources.min_dynamic_port;
            }
            if node_resources.max_dynamic_port > 0 {
                self.max_dynamic_port = node_resources.max_dynamic_port;
            }
        }

        Ok(())
    }

    /// Folds a set of existing allocations into `used_ports`. Returns whether
    /// any port was already taken, with a description of the most recent
    /// collision. Processing always covers every allocation; collisions do
    /// not stop intake.
    pub fn add_allocs(&mut self, allocs: &[Allocation]) -> (bool, Option<String>) {
        let mut collide = false;
        let mut reason = None;

        for alloc in allocs {
            // Terminal allocations no longer occupy their ports.
            if alloc.terminal_status() {
                continue;
            }

            if let Some(resources) = &alloc.allocated_resources {
                // Prefer the shared port list when populated, otherwise fall
                // back to per-task network resources.
                if !resources.shared.ports.is_empty() {
                    let (c, reasons) = self.add_reserved_ports(&resources.shared.ports);
                    if c {
                        collide = true;
                        reason = Some(format!(
                            "collision when reserving port for alloc {}: {}",
                            alloc.id,
                            reasons.join(", ")
                        ));
                    }
                } else {
                    for network in &resources.shared.networks {
                        let (c, reasons) = self.add_reserved(network);
                        if c {
                            collide = true;
                            reason = Some(format!(
                                "collision when reserving port for network {} in alloc {}: {}",
                                network.ip,
                                alloc.id,
                                reasons.join(", ")
                            ));
                        }
                    }

                    for (task, task_resources) in &resources.tasks {
                        if let Some(network) = task_resources.networks.first() {
                            let (c, reasons) = self.add_reserved(network);
                            if c {
                                collide = true;
                                reason = Some(format!(
                                    "collision when reserving port for network {} in task {} of alloc {}: {}",
                                    network.ip,
                                    task,
                                    alloc.id,
                                    reasons.join(", ")
                                ));
                            }
                        }
                    }
                }
            } else {
                for (task, task_resources) in &alloc.task_resources {
                    if let Some(network) = task_resources.networks.first() {
                        let (c, reasons) = self.add_reserved(network);
                        if c {
                            collide = true;
                            reason = Some(format!(
                                "(deprecated) collision when reserving port for network {} in task {} of alloc {}: {}",
                                network.ip,
                                task,
                                alloc.id,
                                reasons.join(", ")
                            ));
                        }
                    }
                }
            }
        }

        (collide, reason)
    }

    /// Marks a legacy network resource's ports as used on its IP, reporting
    /// any already-taken ports.
    pub fn add_reserved(&mut self, network: &NetworkResource) -> (bool, Vec<String>) {
        let mut collide = false;
        let mut reasons = Vec::new();

        let used = self.used_ports_for(&network.ip);
        for port in network.reserved_ports.iter().chain(&network.dynamic_ports) {
            if port.value < 0 || port.value as usize >= MAX_VALID_PORT {
                return (true, vec![format!("invalid port {}", port.value)]);
            }
            if used.check(port.value as usize) {
                collide = true;
                reasons.push(format!("port {} already in use", port.value));
            } else {
                used.set(port.value as usize);
            }
        }

        *self.used_bandwidth.entry(network.device.clone()).or_default() += network.mbits;
        (collide, reasons)
    }

    /// Marks an allocated port list as used, keyed by each mapping's host IP.
    pub fn add_reserved_ports(&mut self, ports: &AllocatedPorts) -> (bool, Vec<String>) {
        let mut collide = false;
        let mut reasons = Vec::new();

        for port in ports {
            let used = self.used_ports_for(&port.host_ip);
            if port.value < 0 || port.value as usize >= MAX_VALID_PORT {
                return (true, vec![format!("invalid port {}", port.value)]);
            }
            if used.check(port.value as usize) {
                collide = true;
                reasons.push(format!("port {} already in use", port.value));
            } else {
                used.set(port.value as usize);
            }
        }

        (collide, reasons)
    }

    /// Probes a proposed list of port reservations against one IP.
    pub fn add_reserved_ports_for_ip(&mut self, ports: &[u64], ip: &str) -> (bool, Vec<String>) {
        let mut collide = false;
        let mut reasons = Vec::new();

        let used = self.used_ports_for(ip);
        for &port in ports {
            if port as usize >= MAX_VALID_PORT {
                return (true, vec![format!("invalid port {port}")]);
            }
            if used.check(port as usize) {
                collide = true;
                reasons.push(format!("port {port} already in use"));
            } else {
                used.set(port as usize);
            }
        }

        (collide, reasons)
    }

    /// Resolves a group-level network ask into an allocated port list,
    /// supporting multi-homed hosts through named host networks. Reads
    /// `used_ports` but never writes it.
    pub fn assign_ports(&self, ask: &NetworkResource) -> Result<AllocatedPorts, AssignError> {
        let mut offer = AllocatedPorts::default();
        let mut rng = rand::thread_rng();

        // Reserved ports per host network, excluded from dynamic selection
        // below so a dynamic pick cannot shadow a reservation from this ask.
        let mut reserved_idx: HashMap<String, Vec<Port>> = HashMap::new();

        for port in &ask.reserved_ports {
            reserved_idx
                .entry(port.host_network.clone())
                .or_default()
                .push(port.clone());

            let addresses = self
                .host_networks
                .get(&port.host_network)
                .map(|addresses| addresses.as_slice())
                .unwrap_or_default();

            let mut alloc_port = None;
            for address in addresses {
                if port.value < 0 || port.value as usize >= MAX_VALID_PORT {
                    return Err(AssignError::InvalidPort(port.value));
                }
                if self
                    .used_ports
                    .get(&address.address)
                    .is_some_and(|used| used.check(port.value as usize))
                {
                    return Err(AssignError::ReservedPortCollision {
                        label: port.label.clone(),
                        value: port.value,
                    });
                }

                alloc_port = Some(AllocatedPortMapping {
                    label: port.label.clone(),
                    value: port.value,
                    to: port.to,
                    host_ip: address.address.clone(),
                });
                break;
            }

            match alloc_port {
                Some(mapping) => offer.push(mapping),
                None => return Err(AssignError::NoAddresses(port.host_network.clone())),
            }
        }

        for port in &ask.dynamic_ports {
            let reserved = reserved_idx
                .get(&port.host_network)
                .map(|ports| ports.as_slice())
                .unwrap_or_default();
            let addresses = self
                .host_networks
                .get(&port.host_network)
                .map(|addresses| addresses.as_slice())
                .unwrap_or_default();

            let mut alloc_port = None;
            let mut last_err = None;
            for address in addresses {
                let used = self.used_ports.get(&address.address);

                // Stochastic probing is cheaper than a full range scan; only
                // fall back to the precise scan when the probes run dry.
                let picked = dynamic_ports_stochastic(
                    used,
                    self.min_dynamic_port,
                    self.max_dynamic_port,
                    reserved,
                    1,
                    &mut rng,
                )
                .or_else(|_| {
                    dynamic_ports_precise(
                        used,
                        self.min_dynamic_port,
                        self.max_dynamic_port,
                        reserved,
                        1,
                        &mut rng,
                    )
                });

                let value = match picked {
                    Ok(ports) => i32::from(ports[0]),
                    Err(err) => {
                        last_err = Some(err);
                        continue;
                    }
                };

                let mut mapping = AllocatedPortMapping {
                    label: port.label.clone(),
                    value,
                    to: port.to,
                    host_ip: address.address.clone(),
                };
                if mapping.to == -1 {
                    mapping.to = mapping.value;
                }
                alloc_port = Some(mapping);
                break;
            }

            match (alloc_port, last_err) {
                (Some(mapping), _) => offer.push(mapping),
                (None, Some(err)) => return Err(AssignError::Selection(err)),
                (None, None) => return Err(AssignError::NoAddresses(port.host_network.clone())),
            }
        }

        Ok(offer)
    }

    /// Resolves a task-level network ask against the node's task networks,
    /// enumerating candidate IPs from each network's CIDR. First successful
    /// offer wins; the error from the last failed candidate is surfaced when
    /// none succeeds. Deprecated in favor of [`NetworkIndex::assign_ports`].
    pub fn assign_task_network(
        &self,
        ask: &NetworkResource,
    ) -> Result<NetworkResource, AssignError> {
        let mut err = AssignError::NoNetworks;
        let mut rng = rand::thread_rng();

        for network in &self.task_networks {
            // Malformed CIDRs are skipped, not surfaced.
            let net: IpNet = match network.cidr.parse() {
                Ok(net) => net,
                Err(_) => continue,
            };

            let mut ip = net.network();
            while net.contains(&ip) {
                match self.offer_task_network(network, ask, ip, &mut rng) {
                    Ok(offer) => return Ok(offer),
                    Err(candidate_err) => err = candidate_err,
                }
                ip = increment_ip(ip);
            }
        }

        Err(err)
    }

    fn offer_task_network(
        &self,
        network: &NetworkResource,
        ask: &NetworkResource,
        ip: IpAddr,
        rng: &mut impl Rng,
    ) -> Result<NetworkResource, AssignError> {
        let ip_str = ip.to_string();

        let avail = self
            .avail_bandwidth
            .get(&network.device)
            .copied()
            .unwrap_or(0);
        let used_bandwidth = self
            .used_bandwidth
            .get(&network.device)
            .copied()
            .unwrap_or(0);
        if used_bandwidth + ask.mbits > avail {
            return Err(AssignError::BandwidthExceeded);
        }

        let used = self.used_ports.get(&ip_str);

        for port in &ask.reserved_ports {
            if port.value < 0 || port.value as usize >= MAX_VALID_PORT {
                return Err(AssignError::InvalidPort(port.value));
            }
            if used.is_some_and(|used| used.check(port.value as usize)) {
                return Err(AssignError::ReservedPortCollision {
                    label: port.label.clone(),
                    value: port.value,
                });
            }
        }

        let dynamic = dynamic_ports_stochastic(
            used,
            self.min_dynamic_port,
            self.max_dynamic_port,
            &ask.reserved_ports,
            ask.dynamic_ports.len(),
            rng,
        )
        .or_else(|_| {
            dynamic_ports_precise(
                used,
                self.min_dynamic_port,
                self.max_dynamic_port,
                &ask.reserved_ports,
                ask.dynamic_ports.len(),
                rng,
            )
        })?;

        let mut offer = NetworkResource {
            mode: ask.mode.clone(),
            device: network.device.clone(),
            cidr: String::new(),
            ip: ip_str,
            mbits: ask.mbits,
            dns: ask.dns.clone(),
            reserved_ports: ask.reserved_ports.clone(),
            dynamic_ports: ask.dynamic_ports.clone(),
        };

        for (slot, &value) in offer.dynamic_ports.iter_mut().zip(&dynamic) {
            slot.value = i32::from(value);
            // `to = -1` asks for the mapped port to follow the host port.
            if slot.to == -1 {
                slot.to = slot.value;
            }
        }

        Ok(offer)
    }

    /// Bandwidth accounting is deprecated; the counters are carried for
    /// layout compatibility and never enforced.
    pub fn overcommitted(&self) -> bool {
        false
    }

    /// Hands every used-port bitmap back to the pool. The index holds no
    /// bitmaps afterward; re-initialize with `set_node` before further use.
    pub fn release(&mut self) {
        for (_, bitmap) in self.used_ports.drain() {
            PORT_BITMAP_POOL.put(bitmap);
        }
    }
}

/// Materializes an offer back onto a legacy network resource: dynamic port
/// values are copied in by label and the IP is taken from the node's first
/// host-mode network.
pub fn allocated_ports_to_network_resource(
    ask: &NetworkResource,
    ports: &AllocatedPorts,
    node: &NodeResources,
) -> NetworkResource {
    let mut out = ask.clone();

    for port in out.dynamic_ports.iter_mut() {
        if let Some(mapping) = ports.get(&port.label) {
            port.value = mapping.value;
            port.to = mapping.to;
        }
    }

    if !node.node_networks.is_empty() {
        for network in &node.node_networks {
            if network.mode == "host" {
                if let Some(address) = network.addresses.first() {
                    out.ip = address.address.clone();
                }
                break;
            }
        }
    } else {
        for network in &node.networks {
            if network.mode == "host" {
                out.ip = network.ip.clone();
            }
        }
    }

    out
}

fn increment_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => {
            let mut octets = v4.octets();
            carry_increment(&mut octets);
            IpAddr::V4(octets.into())
        }
        IpAddr::V6(v6) => {
            let mut octets = v6.octets();
            carry_increment(&mut octets);
            IpAddr::V6(octets.into())
        }
    }
}

// Octets carry right to left; an octet that wraps to zero propagates the
// carry to its neighbor.
fn carry_increment(octets: &mut [u8]) {
    for octet in octets.iter_mut().rev() {
        *octet = octet.wrapping_add(1);
        if *octet > 0 {
            break;
        }
    }
}
