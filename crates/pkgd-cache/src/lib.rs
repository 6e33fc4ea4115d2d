//! The in-memory package cache (§4.F): LRU eviction on access, a 24h TTL
//! sweep, and a memory-pressure-triggered quarter-eviction on top.

mod cache;
mod pressure;

pub use cache::{run_sweeper, PackageCache, SWEEP_INTERVAL, TTL};
pub use pressure::{MemoryPressureSignal, NeverUnderPressure, SysinfoPressureSignal};
