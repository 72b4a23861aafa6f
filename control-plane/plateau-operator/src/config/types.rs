use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Requeue interval while an installation is in progress.
    /// Env: PLATEAU_REQUEUE_SECS
    #[envconfig(from = "PLATEAU_REQUEUE_SECS", default = "30")]
    pub requeue_secs: u64,

    /// Re-probe interval once a cluster reports Running.
    /// Env: PLATEAU_RESYNC_SECS
    #[envconfig(from = "PLATEAU_RESYNC_SECS", default = "300")]
    pub resync_secs: u64,

    /// Requeue interval after a transient control-plane failure.
    /// Env: PLATEAU_TRANSIENT_REQUEUE_SECS
    #[envconfig(from = "PLATEAU_TRANSIENT_REQUEUE_SECS", default = "10")]
    pub transient_requeue_secs: u64,

    /// Deadline for one reconcile pass; handlers are not started past it.
    /// Env: PLATEAU_PASS_TIMEOUT_SECS
    #[envconfig(from = "PLATEAU_PASS_TIMEOUT_SECS", default = "120")]
    pub pass_timeout_secs: u64,

    /// Attempts for singleton updates racing other writers.
    /// Env: PLATEAU_CONFLICT_RETRIES
    #[envconfig(from = "PLATEAU_CONFLICT_RETRIES", default = "3")]
    pub conflict_retries: u32,

    /// Replica count for platform component workloads.
    /// Env: PLATEAU_COMPONENT_REPLICAS
    #[envconfig(from = "PLATEAU_COMPONENT_REPLICAS", default = "1")]
    pub component_replicas: i32,

    /// Env: PLATEAU_IMAGE_PULL_POLICY
    #[envconfig(from = "PLATEAU_IMAGE_PULL_POLICY", default = "IfNotPresent")]
    pub image_pull_policy: String,

    /// Env: PLATEAU_METRICS_SERVER_IMAGE
    #[envconfig(
        from = "PLATEAU_METRICS_SERVER_IMAGE",
        default = "registry.k8s.io/metrics-server/metrics-server:v0.7.1"
    )]
    pub metrics_server_image: String,

    /// Env: PLATEAU_IMAGE_HUB_IMAGE
    #[envconfig(from = "PLATEAU_IMAGE_HUB_IMAGE", default = "registry:2.8")]
    pub image_hub_image: String,
}
