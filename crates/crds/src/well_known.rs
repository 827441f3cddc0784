//! Well-known API groups, labels and annotations shared with Cluster API

/// API group of the kinds owned by this provider
pub const INFRASTRUCTURE_GROUP: &str = "infrastructure.cluster.x-k8s.io";

/// API version of the kinds owned by this provider
pub const INFRASTRUCTURE_VERSION: &str = "v1alpha1";

/// API group of the Cluster API core kinds (`Cluster`, `Machine`)
pub const CLUSTER_API_GROUP: &str = "cluster.x-k8s.io";

/// API group of the server-claim subsystem
pub const METAL_GROUP: &str = "metal.ironcore.dev";

/// Label carrying the logical cluster name on machines and infra machines
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Annotation that suspends reconciliation of the annotated object
pub const PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";
