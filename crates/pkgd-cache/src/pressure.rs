//! The §4.F memory-pressure signal: true once this process's resident set
//! exceeds 1 GiB, or once it exceeds 75% of total system memory.
//!
//! Grounded in `examples/other_examples/manifests/*/Cargo.toml`'s repeated
//! use of `sysinfo` (MystenLabs-sui, aptos-labs-aptos-core,
//! paritytech-polkadot-sdk, among others) for this kind of host-resource
//! probe; there is no OS-trap "heap usage" signal analogous to the
//! original's `runtime.MemStats`, so resident memory stands in for
//! heap-in-use and total system memory stands in for heap-reserved.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use sysinfo::{Pid, System};

const ONE_GIB: u64 = 1 << 30;
const HIGH_WATER_FRACTION: f64 = 0.75;

/// Injectable so tests can force eviction without allocating a gigabyte.
pub trait MemoryPressureSignal: Send + Sync {
    fn under_pressure(&self) -> bool;
}

/// Never reports pressure. Used by default in tests and anywhere the
/// memory-pressure sweep step should be a no-op.
pub struct NeverUnderPressure;

impl MemoryPressureSignal for NeverUnderPressure {
    fn under_pressure(&self) -> bool {
        false
    }
}

/// Reads this process's RSS and the host's total memory via `sysinfo`,
/// refreshing no more often than once per call (the sweeper already runs
/// on a 5-minute tick, so there's no need for an internal cache).
pub struct SysinfoPressureSignal {
    system: Mutex<System>,
    pid: Pid,
    last_heap_in_use: AtomicU64,
}

impl SysinfoPressureSignal {
    pub fn new() -> Self {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_processes();
        Self {
            system: Mutex::new(system),
            pid,
            last_heap_in_use: AtomicU64::new(0),
        }
    }

    /// The most recent resident-memory reading, in bytes. Populated by
    /// `under_pressure`; zero until the first check.
    pub fn last_heap_in_use(&self) -> u64 {
        self.last_heap_in_use.load(Ordering::Relaxed)
    }
}

impl Default for SysinfoPressureSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPressureSignal for SysinfoPressureSignal {
    fn under_pressure(&self) -> bool {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_processes();

        let heap_in_use = system
            .process(self.pid)
            .map(|p| p.memory())
            .unwrap_or(0);
        self.last_heap_in_use.store(heap_in_use, Ordering::Relaxed);

        if heap_in_use > ONE_GIB {
            return true;
        }

        let heap_reserved = system.total_memory();
        if heap_reserved == 0 {
            return false;
        }
        (heap_in_use as f64) > (heap_reserved as f64) * HIGH_WATER_FRACTION
    }
}
