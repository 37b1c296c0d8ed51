//! Container engine constants.

/// Memory limit reported for containers that do not set one (2 GiB).
pub const DEFAULT_CONTAINER_MEMORY_LIMIT: u64 = 2 * 1024 * 1024 * 1024;

/// Memory limit reported for pods whose containers request nothing (512 MiB).
pub const DEFAULT_POD_MEMORY_LIMIT: u64 = 512 * 1024 * 1024;

/// Exit code recorded when a container fails to start.
pub const START_FAILURE_EXIT_CODE: i32 = 1;

/// Exit code recorded for a killed container (128 + SIGKILL).
pub const KILLED_EXIT_CODE: i32 = 137;

/// Images present in the local cache after a reset, with their sizes in bytes.
pub const SEED_IMAGES: &[(&str, u64)] = &[
    ("nginx:latest", 187_000_000),
    ("redis:7-alpine", 41_000_000),
    ("postgres:16", 432_000_000),
    ("busybox:latest", 4_300_000),
];

/// Bounds for the size of an image pulled on demand.
pub const PULLED_IMAGE_SIZE_RANGE: (u64, u64) = (5_000_000, 500_000_000);

/// Pods seeded into `kube-system` on reset, all labeled `tier=system`.
pub const SYSTEM_PODS: &[(&str, &str)] = &[
    ("coredns", "registry.k8s.io/coredns/coredns:v1.11.1"),
    ("kube-proxy", "registry.k8s.io/kube-proxy:v1.30.0"),
    ("metrics-server", "registry.k8s.io/metrics-server/metrics-server:v0.7.1"),
];
