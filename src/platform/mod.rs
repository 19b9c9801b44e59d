//! Thin typed wrappers around the OS primitives the engine consumes.
//!
//! Everything OS-specific lives below this module; the engine itself is
//! platform-neutral and only sees the types re-exported here. Non-Windows
//! builds get inert stubs that fail `init` while keeping the portable
//! logic compiling.

pub mod clock;
pub mod host;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::{
    dxgi::enumerate_adapters,
    event::TickEvent,
    pdh::{Counter, CounterQuery},
    process::{
        enumerate_processes, terminate_processes_by_name, wallclock_ticks, ProcessHandle,
    },
};

#[cfg(not(windows))]
mod fallback;
#[cfg(not(windows))]
pub use fallback::{
    enumerate_adapters, enumerate_processes, terminate_processes_by_name, wallclock_ticks,
    Counter, CounterQuery, ProcessHandle, TickEvent,
};

/// One row of the host process enumeration.
#[derive(Clone, Debug)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent_pid: u32,
    pub image_name: String,
}

/// One adapter reported by the graphics enumerator.
#[derive(Clone, Debug)]
pub struct AdapterInfo {
    pub description: String,
    pub dedicated_video_memory: u64,
    pub vendor_id: u32,
}

/// Numeric format requested from a formatted counter read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterFormat {
    Double,
    Large,
}

/// Formatted value of a single counter instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CounterValue {
    Double(f64),
    Large(i64),
}

impl CounterValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            CounterValue::Double(value) => value,
            CounterValue::Large(value) => value as f64,
        }
    }

    pub fn as_u64(&self) -> u64 {
        match *self {
            CounterValue::Double(value) if value > 0.0 => value as u64,
            CounterValue::Double(_) => 0,
            CounterValue::Large(value) => value.max(0) as u64,
        }
    }
}

/// One `(instance name, formatted value)` item of a counter read.
#[derive(Clone, Debug)]
pub struct CounterItem {
    pub name: String,
    pub value: CounterValue,
}

impl CounterItem {
    pub fn new(name: impl Into<String>, value: CounterValue) -> Self {
        Self { name: name.into(), value }
    }
}

/// Opens the handle the tree tracker records for `pid`: the never-closed
/// current-process sentinel for our own pid, a real query handle otherwise.
pub fn open_tracked_handle(pid: u32) -> Option<ProcessHandle> {
    if pid == std::process::id() {
        Some(ProcessHandle::current())
    } else {
        ProcessHandle::open(pid).ok()
    }
}
