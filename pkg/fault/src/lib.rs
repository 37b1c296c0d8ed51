//! Fault injection: the probability/latency model every simulated
//! operation consults.
//!
//! The profile is read at the moment a decision is made, never cached by the
//! caller, so switching presets mid-run affects transitions already in flight.

use parking_lot::{Mutex, RwLock};
use pkg_constants::sim::{MAX_LATENCY_MS, NAME_SUFFIX_ALPHABET};
use pkg_types::fault::FaultProfile;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::info;

pub struct FaultInjector {
    /// Profile restored by `restore_normal_operation`.
    baseline: FaultProfile,
    profile: RwLock<FaultProfile>,
    seed: Option<u64>,
    rng: Mutex<StdRng>,
}

fn new_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

impl FaultInjector {
    pub fn new(baseline: FaultProfile, seed: Option<u64>) -> Self {
        Self {
            baseline,
            profile: RwLock::new(baseline),
            seed,
            rng: Mutex::new(new_rng(seed)),
        }
    }

    pub fn profile(&self) -> FaultProfile {
        *self.profile.read()
    }

    pub fn set_profile(&self, profile: FaultProfile) {
        info!("Fault profile updated: {:?}", profile);
        *self.profile.write() = profile;
    }

    pub fn simulate_network_partition(&self) -> FaultProfile {
        info!("Simulating network partition");
        self.apply(FaultProfile::network_partition())
    }

    pub fn simulate_resource_exhaustion(&self) -> FaultProfile {
        info!("Simulating resource exhaustion");
        self.apply(FaultProfile::resource_exhaustion())
    }

    pub fn restore_normal_operation(&self) -> FaultProfile {
        info!("Restoring normal operation");
        self.apply(self.baseline)
    }

    fn apply(&self, profile: FaultProfile) -> FaultProfile {
        // One write covers every field, so readers never see a mix of presets.
        *self.profile.write() = profile;
        profile
    }

    /// Restore the baseline profile and restart the random sequence.
    pub fn reset(&self) {
        *self.profile.write() = self.baseline;
        *self.rng.lock() = new_rng(self.seed);
    }

    /// Latency every simulated network-bound call awaits, capped at
    /// `MAX_LATENCY_MS`.
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.profile.read().network_latency_ms.min(MAX_LATENCY_MS))
    }

    pub async fn delay(&self) {
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn pod_start_succeeds(&self) -> bool {
        let rate = self.profile.read().pod_start_success_rate;
        self.chance(rate)
    }

    pub fn pull_succeeds(&self) -> bool {
        let rate = self.profile.read().pull_success_rate;
        self.chance(rate)
    }

    pub fn container_start_succeeds(&self) -> bool {
        let rate = self.profile.read().container_start_success_rate;
        self.chance(rate)
    }

    pub fn provision_succeeds(&self) -> bool {
        let rate = self.profile.read().provision_success_rate;
        self.chance(rate)
    }

    pub fn crashes(&self) -> bool {
        let rate = self.profile.read().crash_rate;
        self.chance(rate)
    }

    /// Independent Bernoulli sample; `p` is clamped to `0.0..=1.0`.
    pub fn chance(&self, p: f64) -> bool {
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        self.rng.lock().random_bool(p)
    }

    /// Uniform delay in `[min, max]` at millisecond granularity.
    pub fn delay_between(&self, min: Duration, max: Duration) -> Duration {
        let lo = min.as_millis() as u64;
        let hi = (max.as_millis() as u64).max(lo);
        Duration::from_millis(self.rng.lock().random_range(lo..=hi))
    }

    pub fn range_u64(&self, lo: u64, hi: u64) -> u64 {
        self.rng.lock().random_range(lo..=hi.max(lo))
    }

    /// `center` scaled by a uniform factor in `[1 - spread, 1 + spread]`.
    pub fn jitter(&self, center: f64, spread: f64) -> f64 {
        let spread = spread.abs();
        if spread == 0.0 {
            return center;
        }
        center * self.rng.lock().random_range(1.0 - spread..=1.0 + spread)
    }

    pub fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.rng.lock().random_range(0..items.len());
        items.get(idx)
    }

    /// Random lowercase suffix for generated names (`web-x7kq2`).
    pub fn name_suffix(&self, len: usize) -> String {
        let mut rng = self.rng.lock();
        (0..len)
            .map(|_| {
                let idx = rng.random_range(0..NAME_SUFFIX_ALPHABET.len());
                NAME_SUFFIX_ALPHABET[idx] as char
            })
            .collect()
    }

    /// Random v4 uid drawn from the seeded generator, so seeded runs hand
    /// out the same uids.
    pub fn uid(&self) -> String {
        let bytes: [u8; 16] = self.rng.lock().random();
        uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string()
    }

    /// `n` random bytes rendered as lowercase hex.
    pub fn hex(&self, n: usize) -> String {
        let mut rng = self.rng.lock();
        (0..n).map(|_| format!("{:02x}", rng.random::<u8>())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn certain_and_impossible_rates() {
        let faults = FaultInjector::new(FaultProfile::reliable(), Some(1));
        assert!((0..100).all(|_| faults.pod_start_succeeds()));
        assert!((0..100).all(|_| !faults.crashes()));

        faults.set_profile(FaultProfile {
            pod_start_success_rate: 0.0,
            ..FaultProfile::reliable()
        });
        assert!((0..100).all(|_| !faults.pod_start_succeeds()));
    }

    #[test]
    fn out_of_range_rates_are_clamped() {
        let faults = FaultInjector::new(FaultProfile::reliable(), Some(2));
        assert!(faults.chance(7.5));
        assert!(!faults.chance(-1.0));
        assert!(!faults.chance(f64::NAN));
    }

    #[test]
    fn presets_overwrite_and_restore() {
        let baseline = FaultProfile::reliable();
        let faults = FaultInjector::new(baseline, Some(3));

        let partition = faults.simulate_network_partition();
        assert_eq!(faults.profile(), partition);
        assert!(partition.pull_success_rate < baseline.pull_success_rate);
        assert!(faults.latency() > Duration::ZERO);

        faults.simulate_resource_exhaustion();
        assert!(faults.profile().crash_rate > 0.0);

        assert_eq!(faults.restore_normal_operation(), baseline);
        assert_eq!(faults.latency(), Duration::ZERO);
    }

    #[test]
    fn latency_is_bounded() {
        let faults = FaultInjector::new(
            FaultProfile {
                network_latency_ms: u64::MAX,
                ..FaultProfile::reliable()
            },
            Some(4),
        );
        assert_eq!(faults.latency(), Duration::from_millis(MAX_LATENCY_MS));
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = FaultInjector::new(FaultProfile::default(), Some(42));
        let b = FaultInjector::new(FaultProfile::default(), Some(42));
        assert_eq!(a.name_suffix(16), b.name_suffix(16));
        assert_eq!(a.hex(8), b.hex(8));
        assert_eq!(a.uid(), b.uid());
        assert_eq!(a.uid().parse::<Uuid>().unwrap().get_version_num(), 4);

        let first = a.name_suffix(8);
        a.reset();
        let c = FaultInjector::new(FaultProfile::default(), Some(42));
        assert_eq!(a.name_suffix(16), c.name_suffix(16));
        assert_ne!(first.len(), 0);
    }

    #[test]
    fn delays_stay_within_bounds() {
        let faults = FaultInjector::new(FaultProfile::default(), Some(5));
        let min = Duration::from_millis(500);
        let max = Duration::from_millis(2000);
        for _ in 0..200 {
            let d = faults.delay_between(min, max);
            assert!(d >= min && d <= max);
        }
        assert_eq!(faults.delay_between(max, min), max);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_awaits_configured_latency() {
        let faults = FaultInjector::new(
            FaultProfile {
                network_latency_ms: 250,
                ..FaultProfile::reliable()
            },
            Some(6),
        );
        let start = tokio::time::Instant::now();
        faults.delay().await;
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
