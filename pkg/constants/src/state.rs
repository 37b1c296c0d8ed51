//! Resource store / event log constants.

/// Key prefix under which every resource is registered.
pub const REGISTRY_PREFIX: &str = "/registry";

/// How long events are kept before the housekeeping pass prunes them.
pub const DEFAULT_EVENT_RETENTION_SECS: u64 = 3600;

/// Capacity of the notification broadcast channel.
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 1024;

/// Namespace used when a resource does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Namespace holding seeded system workloads.
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Label applied to every pod a deployment creates.
pub const POD_TEMPLATE_HASH_LABEL: &str = "pod-template-hash";
