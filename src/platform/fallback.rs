//! Inert stand-ins for the Windows adapters. They keep the crate (and the
//! platform-neutral logic tests) building everywhere; `init` fails before
//! any of the unsupported paths can run.

use std::sync::{Condvar, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{MonitorError, Result};
use crate::platform::{AdapterInfo, CounterFormat, CounterItem, ProcessEntry};

pub struct ProcessHandle {
    is_current: bool,
}

impl ProcessHandle {
    pub fn open(_pid: u32) -> Result<Self> {
        Err(MonitorError::Unsupported)
    }

    pub fn current() -> Self {
        Self { is_current: true }
    }

    pub fn is_alive(&self) -> bool {
        self.is_current
    }

    pub fn cpu_times(&self) -> Result<u64> {
        Err(MonitorError::Unsupported)
    }

    pub fn working_set_bytes(&self) -> Result<u64> {
        Err(MonitorError::Unsupported)
    }
}

pub fn wallclock_ticks() -> u64 {
    // 100 ns ticks since the Unix epoch; same granularity, different origin
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64 / 100)
        .unwrap_or(0)
}

pub fn enumerate_processes() -> Result<Vec<ProcessEntry>> {
    Err(MonitorError::Unsupported)
}

pub fn terminate_processes_by_name(_image_name: &str, _exit_code: u32) -> usize {
    0
}

pub struct TickEvent {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl TickEvent {
    pub fn new() -> Result<Self> {
        Ok(Self { signalled: Mutex::new(false), condvar: Condvar::new() })
    }

    pub fn wait(&self) -> bool {
        let mut signalled = self.signalled.lock().unwrap();
        while !*signalled {
            signalled = self.condvar.wait(signalled).unwrap();
        }
        *signalled = false;
        true
    }

    pub fn signal(&self) {
        *self.signalled.lock().unwrap() = true;
        self.condvar.notify_one();
    }
}

pub struct CounterQuery;

impl CounterQuery {
    pub fn open() -> Result<Self> {
        Err(MonitorError::Unsupported)
    }

    pub fn add_counter(&self, _path: &str) -> Result<Counter> {
        Err(MonitorError::Unsupported)
    }

    pub fn start_periodic(&self, _interval_secs: u32, _event: &TickEvent) -> Result<()> {
        Err(MonitorError::Unsupported)
    }
}

pub struct Counter;

impl Counter {
    pub fn formatted_items(&self, _format: CounterFormat) -> Vec<CounterItem> {
        Vec::new()
    }
}

pub fn enumerate_adapters() -> Result<Vec<AdapterInfo>> {
    Err(MonitorError::Unsupported)
}
