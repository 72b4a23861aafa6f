pub mod platform_cluster;

pub use platform_cluster::{
    ClusterCondition, ClusterConditionType, ClusterPhase, ConditionStatus,
    Database, EtcdConfig, ImageHub, NodeAvailPorts, PlatformCluster,
    PlatformClusterSpec, PlatformClusterStatus, StorageClassInfo,
};
