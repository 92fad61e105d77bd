//! Per-kind adapters. Each kind supplies its own `status` derivation and any extra
//! sort/filter fields; everything else falls through to the metadata defaults.

pub mod nodes;
pub mod pods;
pub mod storage;
pub mod workloads;

pub const STATUS_STOPPED: &str = "stopped";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_UPDATING: &str = "updating";

pub use nodes::Nodes;
pub use pods::Pods;
pub use storage::{Claims, Volumes};
pub use workloads::{DaemonSets, Deployments, Jobs, StatefulSets};
