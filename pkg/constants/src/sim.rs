//! Timing and fault-model defaults for the simulator.

/// Interval between housekeeping passes (perturbation, stats, pruning).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 5_000;

/// Lower bound of the randomized pod scheduling + image pull delay.
pub const DEFAULT_POD_START_DELAY_MIN_MS: u64 = 500;

/// Upper bound of the randomized pod scheduling + image pull delay.
pub const DEFAULT_POD_START_DELAY_MAX_MS: u64 = 2_000;

/// Delay between deployment status resyncs while pods are still pending.
pub const DEFAULT_DEPLOYMENT_SETTLE_DELAY_MS: u64 = 3_000;

/// Delay before a LoadBalancer service receives its ingress address.
pub const DEFAULT_LOAD_BALANCER_DELAY_MS: u64 = 5_000;

/// Delay between `restarting` and the next start attempt of a container.
pub const DEFAULT_CONTAINER_RESTART_DELAY_MS: u64 = 1_000;

/// Baseline load factor used by the stats emitter (0.0..=1.0).
pub const DEFAULT_BASELINE_LOAD: f64 = 0.3;

/// Number of simulated nodes pods are placed on.
pub const DEFAULT_NODE_COUNT: usize = 3;

/// CPU capacity of each simulated node, in millicores.
pub const NODE_CPU_MILLIS: u64 = 8_000;

/// Memory capacity of each simulated node, in bytes (32 GiB).
pub const NODE_MEMORY_BYTES: u64 = 32 * 1024 * 1024 * 1024;

/// Hard ceiling for any simulated network latency.
pub const MAX_LATENCY_MS: u64 = 30_000;

/// Latency of every API call under normal operation.
pub const NORMAL_LATENCY_MS: u64 = 10;

/// Per-tick probability that a running pod crashes under normal operation.
pub const NORMAL_CRASH_RATE: f64 = 0.01;

/// Latency under the network partition preset.
pub const PARTITION_LATENCY_MS: u64 = 5_000;

/// Latency under the resource exhaustion preset.
pub const EXHAUSTION_LATENCY_MS: u64 = 500;

/// Upper bound on `spec.replicas` of a deployment.
pub const MAX_DEPLOYMENT_REPLICAS: u32 = 10_000;

/// Length of the random suffix appended to deployment pod names.
pub const POD_NAME_SUFFIX_LEN: usize = 5;

/// Alphabet for generated name suffixes (no vowels, no ambiguous digits).
pub const NAME_SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// Start of simulated time for engines on a manual clock (2024-01-01T00:00:00Z).
pub const SIM_EPOCH_SECS: i64 = 1_704_067_200;

/// How often the background driver drains due tasks on the system clock.
pub const DRIVER_POLL_INTERVAL_MS: u64 = 100;
