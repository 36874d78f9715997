use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resources::NetworkResource;

/// A resolved port binding: a labeled port value on a concrete host IP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedPortMapping {
    pub label: String,
    pub value: i32,
    pub to: i32,
    pub host_ip: String,
}

/// Ordered list of port bindings making up an offer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocatedPorts(pub Vec<AllocatedPortMapping>);

impl AllocatedPorts {
    pub fn get(&self, label: &str) -> Option<&AllocatedPortMapping> {
        self.0.iter().find(|port| port.label == label)
    }

    pub fn push(&mut self, port: AllocatedPortMapping) {
        self.0.push(port);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AllocatedPortMapping> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a AllocatedPorts {
    type Item = &'a AllocatedPortMapping;
    type IntoIter = std::slice::Iter<'a, AllocatedPortMapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedSharedResources {
    pub networks: Vec<NetworkResource>,
    pub ports: AllocatedPorts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedTaskResources {
    pub networks: Vec<NetworkResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedResources {
    pub shared: AllocatedSharedResources,
    pub tasks: BTreeMap<String, AllocatedTaskResources>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredStatus {
    #[default]
    Run,
    Stop,
    Evict,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
    Lost,
}

/// A placed workload instance as the index consumes it. Modern records carry
/// `allocated_resources`; fully legacy ones only have per-task resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    pub desired_status: DesiredStatus,
    pub client_status: ClientStatus,
    pub allocated_resources: Option<AllocatedResources>,
    pub task_resources: BTreeMap<String, AllocatedTaskResources>,
}

impl Allocation {
    /// Terminal allocations no longer hold their network resources.
    pub fn terminal_status(&self) -> bool {
        match self.desired_status {
            DesiredStatus::Stop | DesiredStatus::Evict => return true,
            DesiredStatus::Run => {}
        }
        matches!(
            self.client_status,
            ClientStatus::Complete | ClientStatus::Failed | ClientStatus::Lost
        )
    }
}
