pub mod cluster;
pub mod pacing;
pub mod pool;

pub use cluster::{ClusterOutcome, ClusterService, TaskRunner};
pub use pool::TaskPool;
