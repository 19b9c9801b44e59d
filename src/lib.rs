//! Windows host resource sampler.
//!
//! A background sampler measures host-wide and per-process resource
//! utilisation (CPU, RAM, disk, network, GPU engines, GPU memory) every
//! five seconds and serves the most recent snapshot on demand. Consumers
//! register process ids — optionally folding the whole descendant tree of
//! a root into its figures — and poll the cached result.
//!
//! GPU figures come from one of two mutually exclusive back-ends chosen at
//! init: the structured OS performance counters, or the `nvidia-smi` CLI
//! when the counters are unavailable. A watchdog guarantees a stuck CLI
//! can never hang the sampler.
//!
//! ```no_run
//! use resource_monitor::ResourceMonitor;
//!
//! let mut monitor = ResourceMonitor::new();
//! assert!(monitor.init());
//! monitor.append_process(std::process::id(), true);
//! // ... after a tick or two ...
//! if let Some(usage) = monitor.get_process_resource(std::process::id()) {
//!     println!("cpu {:.1}% ram {} bytes", usage.cpu_pct, usage.ram_bytes);
//! }
//! monitor.shutdown();
//! ```

mod error;
mod models;
mod monitoring;
mod platform;
mod state;
mod utils;

pub use models::{GraphicsCard, ProcessResource, SystemResource};
pub use monitoring::sampler::TICK_INTERVAL_SECS;

use monitoring::sampler::Engine;

/// The sampler facade. `new` never fails; `init` starts the engine and
/// reports whether the mandatory back-ends came up. Every operation on an
/// uninitialised (or shut down) monitor fails cleanly.
pub struct ResourceMonitor {
    engine: Option<Engine>,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self { engine: None }
    }

    /// Starts (or restarts) the sampling engine. Optional counters that
    /// fail to come up are logged and skipped; a missing mandatory
    /// back-end tears the partial state down and returns `false`.
    pub fn init(&mut self) -> bool {
        self.shutdown();
        match Engine::start() {
            Ok(engine) => {
                self.engine = Some(engine);
                true
            }
            Err(err) => {
                log::error!("resource monitor init failure: {err}");
                false
            }
        }
    }

    /// Stops sampling and joins the background tasks. Idempotent; also
    /// runs on drop.
    pub fn shutdown(&mut self) {
        self.engine = None;
    }

    /// Registers `pid` for monitoring. With `as_tree`, descendants found
    /// on later samples are folded into the root's figures. Registering
    /// an existing root is a no-op that succeeds.
    pub fn append_process(&self, pid: u32, as_tree: bool) -> bool {
        self.engine
            .as_ref()
            .map_or(false, |engine| engine.append_process(pid, as_tree))
    }

    /// Unregisters a root and releases everything tracked under it.
    pub fn remove_process(&self, pid: u32) -> bool {
        self.engine.as_ref().map_or(false, |engine| engine.remove_process(pid))
    }

    /// The last completed sample for a registered root, with nested
    /// registrations folded in. Fails for pids that are not roots.
    pub fn get_process_resource(&self, pid: u32) -> Option<ProcessResource> {
        self.engine.as_ref().and_then(|engine| engine.get_process_resource(pid))
    }

    /// The last completed host-wide sample.
    pub fn get_system_resource(&self) -> Option<SystemResource> {
        self.engine.as_ref().and_then(|engine| engine.get_system_resource())
    }

    /// The graphics cards enumerated at init.
    pub fn get_graphics_cards(&self) -> Option<Vec<GraphicsCard>> {
        self.engine.as_ref().and_then(|engine| engine.get_graphics_cards())
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
