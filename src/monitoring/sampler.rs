use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::{counters, nvsmi, process_tree, usage, watchdog};
use crate::error::{MonitorError, Result};
use crate::models::{GraphicsCard, ProcessResource, SystemResource};
use crate::platform::host::HostProbe;
use crate::platform::{self, Counter, CounterFormat, CounterQuery, TickEvent};
use crate::state::SystemSnapshot;

/// Sampling cadence; the counter collector signals the tick event on it.
pub const TICK_INTERVAL_SECS: u32 = 5;

/// Microsoft Basic Render / software adapters carry this vendor id.
const SOFTWARE_ADAPTER_VENDOR_ID: u32 = 0x1414;

/// GPU measurement path, chosen once at init and never re-evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GpuPath {
    Structured,
    Cli,
}

struct CounterSet {
    processor: Option<Counter>,
    gpu_engine: Option<Counter>,
    gpu_memory: Option<Counter>,
    net_sent: Option<Counter>,
    net_recv: Option<Counter>,
}

struct Shared {
    running: Arc<AtomicBool>,
    snapshot: Mutex<SystemSnapshot>,
    host: Mutex<HostProbe>,
    // declaration order is release order: counters, then the query they
    // belong to, then the event the collector signals
    counters: CounterSet,
    query: CounterQuery,
    tick_event: TickEvent,
    gpu_path: GpuPath,
}

/// The running engine: owns the sampler, watchdog and CLI stream tasks
/// and the shared snapshot they feed.
pub struct Engine {
    shared: Arc<Shared>,
    sampler: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
    stream: Option<JoinHandle<()>>,
}

fn add_optional(query: &CounterQuery, path: &str) -> Option<Counter> {
    match query.add_counter(path) {
        Ok(counter) => Some(counter),
        Err(err) => {
            log::warn!("counter '{path}' unavailable: {err}");
            None
        }
    }
}

/// One-shot card list + dedicated memory totals, preferring the CLI when
/// it reports at least one card and falling back to the adapter
/// enumerator otherwise. No GPU at all is a reduced-functionality state,
/// not a failure.
fn populate_graphics_cards(snapshot: &mut SystemSnapshot) {
    if let Some(names) = nvsmi::query_card_names() {
        let per_card = nvsmi::query_memory_per_card().unwrap_or_default();
        let mut mem_total = 0u64;
        let mut mem_used = 0u64;
        for &(total_mib, free_mib) in &per_card {
            mem_total += total_mib * nvsmi::MIB;
            mem_used += total_mib.saturating_sub(free_mib) * nvsmi::MIB;
        }
        snapshot.graphics_cards = names
            .iter()
            .enumerate()
            .map(|(index, name)| GraphicsCard {
                name: name.clone(),
                dedicated_memory_bytes: per_card
                    .get(index)
                    .map(|&(total_mib, _)| total_mib * nvsmi::MIB)
                    .unwrap_or(0),
            })
            .collect();
        snapshot.system.gpu_count = snapshot.graphics_cards.len() as u64;
        snapshot.system.gpu_mem_total = mem_total;
        snapshot.system.gpu_mem_used = mem_used;
        if let Some(temperature) = nvsmi::query_temperature_c() {
            snapshot.system.gpu_temperature_c = temperature;
        }
        return;
    }

    match platform::enumerate_adapters() {
        Ok(adapters) => {
            for adapter in adapters {
                if adapter.vendor_id == SOFTWARE_ADAPTER_VENDOR_ID {
                    continue;
                }
                snapshot.system.gpu_mem_total += adapter.dedicated_video_memory;
                snapshot.graphics_cards.push(GraphicsCard {
                    name: adapter.description,
                    dedicated_memory_bytes: adapter.dedicated_video_memory,
                });
            }
            snapshot.system.gpu_count = snapshot.graphics_cards.len() as u64;
        }
        Err(err) => log::warn!("graphics adapter enumeration failed: {err}"),
    }
}

impl Engine {
    pub fn start() -> Result<Engine> {
        log::debug!("resource monitor init begin");

        let mut host = HostProbe::new();
        let mut snapshot = SystemSnapshot::default();

        let cpu_count = host.cpu_count();
        if cpu_count == 0 {
            return Err(MonitorError::CpuCount);
        }
        snapshot.system.cpu_count = cpu_count;

        let (ram_total, ram_used) = host.memory_usage();
        snapshot.system.ram_total = ram_total;
        snapshot.system.ram_used = ram_used;
        let (disk_total, disk_used) = host.disk_usage();
        snapshot.system.disk_total = disk_total;
        snapshot.system.disk_used = disk_used;

        populate_graphics_cards(&mut snapshot);

        let tick_event = TickEvent::new()?;
        let query = CounterQuery::open()?;

        let processor = add_optional(&query, counters::PROCESSOR_TIME_PATH);
        let gpu_engine = add_optional(&query, counters::GPU_ENGINE_PATH);
        let gpu_memory = add_optional(&query, counters::GPU_MEMORY_PATH);
        let net_sent = add_optional(&query, counters::NET_SENT_PATH);
        let net_recv = add_optional(&query, counters::NET_RECV_PATH);

        let gpu_path = if gpu_engine.is_some() && gpu_memory.is_some() {
            GpuPath::Structured
        } else {
            log::warn!("structured GPU counters unavailable, using the nvidia-smi backend");
            GpuPath::Cli
        };
        // the paths are mutually exclusive: a half-created counter pair
        // is released rather than half-used
        let (gpu_engine, gpu_memory) = match gpu_path {
            GpuPath::Structured => (gpu_engine, gpu_memory),
            GpuPath::Cli => (None, None),
        };

        query.start_periodic(TICK_INTERVAL_SECS, &tick_event)?;

        let shared = Arc::new(Shared {
            running: Arc::new(AtomicBool::new(true)),
            snapshot: Mutex::new(snapshot),
            host: Mutex::new(host),
            counters: CounterSet { processor, gpu_engine, gpu_memory, net_sent, net_recv },
            query,
            tick_event,
            gpu_path,
        });

        let sampler = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("resmon-sampler".into())
                .spawn(move || sampler_loop(&shared))?
        };

        let (watchdog, stream) = if gpu_path == GpuPath::Cli {
            let watchdog = {
                let running = Arc::clone(&shared.running);
                thread::Builder::new()
                    .name("resmon-watchdog".into())
                    .spawn(move || watchdog::run(running))
                    .map_err(|err| log::error!("watchdog task failed to start: {err}"))
                    .ok()
            };
            let stream = {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name("resmon-nvsmi".into())
                    .spawn(move || stream_loop(&shared))
                    .map_err(|err| log::error!("nvidia-smi task failed to start: {err}"))
                    .ok()
            };
            (watchdog, stream)
        } else {
            (None, None)
        };

        log::debug!("resource monitor init success");

        Ok(Engine { shared, sampler: Some(sampler), watchdog, stream })
    }

    pub fn append_process(&self, pid: u32, as_tree: bool) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) || pid == 0 {
            return false;
        }
        let mut snapshot = self.shared.snapshot.lock().unwrap();
        if snapshot.append_root(pid, as_tree) {
            log::debug!("append process ({pid}) tree ({as_tree}) success");
            true
        } else {
            log::error!("append process ({pid}) tree ({as_tree}) failure");
            false
        }
    }

    pub fn remove_process(&self, pid: u32) -> bool {
        if !self.shared.running.load(Ordering::SeqCst) || pid == 0 {
            return false;
        }
        let mut snapshot = self.shared.snapshot.lock().unwrap();
        if snapshot.remove_root(pid) {
            log::debug!("remove process ({pid}) success");
            true
        } else {
            log::error!("remove process ({pid}) failure");
            false
        }
    }

    pub fn get_process_resource(&self, pid: u32) -> Option<ProcessResource> {
        if !self.shared.running.load(Ordering::SeqCst) || pid == 0 {
            return None;
        }
        self.shared.snapshot.lock().unwrap().process_resource(pid)
    }

    pub fn get_system_resource(&self) -> Option<SystemResource> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.shared.snapshot.lock().unwrap().system)
    }

    pub fn get_graphics_cards(&self) -> Option<Vec<GraphicsCard>> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.shared.snapshot.lock().unwrap().graphics_cards.clone())
    }

    fn shutdown_inner(&mut self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        log::debug!("resource monitor exit begin");

        self.shared.tick_event.signal();
        if self.shared.gpu_path == GpuPath::Cli {
            // unblocks the stream task's stdout read
            platform::terminate_processes_by_name(
                nvsmi::NVSMI_IMAGE_NAME,
                watchdog::KILL_EXIT_CODE,
            );
        }

        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.stream.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.sampler.take() {
            let _ = handle.join();
        }

        log::debug!("resource monitor exit end");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

fn sampler_loop(shared: &Shared) {
    log::debug!("sampler task started");

    while shared.running.load(Ordering::SeqCst) {
        if !shared.tick_event.wait() {
            break;
        }
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }

        let mut snapshot = shared.snapshot.lock().unwrap();
        let mut host = shared.host.lock().unwrap();
        tick(&mut snapshot, &mut host, &shared.counters);
    }

    log::debug!("sampler task stopped");
}

/// One sample. Phase order is fixed: topology before accumulators,
/// zeroing before summation inside every counter pass.
fn tick(snapshot: &mut SystemSnapshot, host: &mut HostProbe, counter_set: &CounterSet) {
    match platform::enumerate_processes() {
        Ok(entries) => process_tree::rebuild(snapshot, &entries),
        Err(err) => log::warn!("process enumeration failed: {err}"),
    }

    usage::collect_cpu(snapshot);
    usage::collect_ram(snapshot);

    let (ram_total, ram_used) = host.memory_usage();
    snapshot.system.ram_total = ram_total;
    snapshot.system.ram_used = ram_used;
    let (disk_total, disk_used) = host.disk_usage();
    snapshot.system.disk_total = disk_total;
    snapshot.system.disk_used = disk_used;

    match &counter_set.processor {
        Some(counter) => {
            counters::apply_processor_items(
                snapshot,
                &counter.formatted_items(CounterFormat::Double),
            );
        }
        None => snapshot.system.cpu_pct = host.cpu_mean_percent(),
    }

    if let Some(counter) = &counter_set.gpu_engine {
        counters::apply_gpu_engine_items(
            snapshot,
            &counter.formatted_items(CounterFormat::Double),
        );
    }
    if let Some(counter) = &counter_set.gpu_memory {
        counters::apply_gpu_memory_items(
            snapshot,
            &counter.formatted_items(CounterFormat::Large),
        );
    }

    let sent_items = counter_set
        .net_sent
        .as_ref()
        .map(|counter| counter.formatted_items(CounterFormat::Double))
        .unwrap_or_default();
    let recv_items = counter_set
        .net_recv
        .as_ref()
        .map(|counter| counter.formatted_items(CounterFormat::Double))
        .unwrap_or_default();
    counters::apply_network_items(snapshot, &sent_items, &recv_items);
}

fn stream_loop(shared: &Shared) {
    log::debug!("nvidia-smi stream task started");

    nvsmi::stream_engine_details(&shared.running, |rates| {
        // spawned before the lock: nothing blocking runs under it
        let temperature = nvsmi::query_temperature_c();

        let mut snapshot = shared.snapshot.lock().unwrap();
        let system = &mut snapshot.system;
        system.gpu_3d_pct = rates.sm;
        system.gpu_enc_pct = rates.enc;
        system.gpu_dec_pct = rates.dec;
        if system.gpu_mem_total > 0 {
            system.gpu_mem_used = (rates.mem / 100.0 * system.gpu_mem_total as f64) as u64;
        }
        if let Some(temperature) = temperature {
            system.gpu_temperature_c = temperature;
        }
    });

    log::debug!("nvidia-smi stream task stopped");
}
