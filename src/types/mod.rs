// ABOUTME: Validated domain types shared across the crate.
// ABOUTME: Stack names, stack kinds, node roles and operation targets.

mod stack_kind;
mod stack_name;
mod targets;

pub use stack_kind::{
    CONTROL_PLANE_STACK, ETCD_STACK, NETWORK_STACK, NodeRole, RESERVED_STACK_NAMES, ROOT_STACK,
    StackKind,
};
pub use stack_name::{StackName, StackNameError};
pub use targets::{ALL_TARGETS, OperationTargets, TargetsError};
