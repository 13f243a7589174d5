// ABOUTME: The fixed kinds of stack in the cluster hierarchy and the node roles they host.
// ABOUTME: Root, network, etcd and control plane are singletons; node pools repeat.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::StackName;

pub const ROOT_STACK: &str = "root";
pub const NETWORK_STACK: &str = "network";
pub const ETCD_STACK: &str = "etcd";
pub const CONTROL_PLANE_STACK: &str = "control-plane";

/// Names node pools may not take because the singleton stacks own them.
pub const RESERVED_STACK_NAMES: [&str; 4] =
    [ROOT_STACK, NETWORK_STACK, ETCD_STACK, CONTROL_PLANE_STACK];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StackKind {
    Root,
    Network,
    Etcd,
    ControlPlane,
    NodePool,
}

impl StackKind {
    /// Key used in plugin declarations and template file names.
    pub fn key(&self) -> &'static str {
        match self {
            StackKind::Root => "root",
            StackKind::Network => "network",
            StackKind::Etcd => "etcd",
            StackKind::ControlPlane => "controlPlane",
            StackKind::NodePool => "nodePool",
        }
    }

    /// Machine role bootstrapped by stacks of this kind, if any.
    pub fn role(&self) -> Option<NodeRole> {
        match self {
            StackKind::Root | StackKind::Network => None,
            StackKind::Etcd => Some(NodeRole::Etcd),
            StackKind::ControlPlane => Some(NodeRole::Controller),
            StackKind::NodePool => Some(NodeRole::Worker),
        }
    }

    /// Stack name for the singleton kinds.
    pub fn singleton_name(&self) -> Option<StackName> {
        let name = match self {
            StackKind::Root => ROOT_STACK,
            StackKind::Network => NETWORK_STACK,
            StackKind::Etcd => ETCD_STACK,
            StackKind::ControlPlane => CONTROL_PLANE_STACK,
            StackKind::NodePool => return None,
        };
        Some(StackName::trusted(name))
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl StackName {
    pub fn root() -> Self {
        StackName::trusted(ROOT_STACK)
    }

    pub fn network() -> Self {
        StackName::trusted(NETWORK_STACK)
    }

    pub fn etcd() -> Self {
        StackName::trusted(ETCD_STACK)
    }

    pub fn control_plane() -> Self {
        StackName::trusted(CONTROL_PLANE_STACK)
    }
}

/// Machine roles that receive userdata and plugin contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeRole {
    Controller,
    Etcd,
    Worker,
}

impl NodeRole {
    pub fn key(&self) -> &'static str {
        match self {
            NodeRole::Controller => "controller",
            NodeRole::Etcd => "etcd",
            NodeRole::Worker => "worker",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
